//! Task slot arena.
//!
//! One header table and one contiguous payload block, both sized once for
//! `capacity` slots. The payload block is addressed with a fixed stride equal
//! to the pool's maximum inline payload, so slot `n` lives at
//! `n * stride .. n * stride + stride` and no per-task allocation ever
//! happens after construction.

use crate::core::task::{DiscardedTask, Task, TaskFn, TaskHeader};
use crate::core::PoolError;

pub(crate) struct TaskArena<R, A> {
    headers: Box<[TaskHeader<R, A>]>,
    payloads: Box<[u8]>,
    stride: usize,
}

impl<R, A> TaskArena<R, A> {
    /// Reserves the arena. Fails with `OutOfMemory` instead of aborting.
    pub fn new(capacity: usize, stride: usize) -> Result<Self, PoolError> {
        let payload_bytes = capacity
            .checked_mul(stride)
            .ok_or(PoolError::OutOfMemory { bytes: usize::MAX })?;

        let mut headers = Vec::new();
        headers
            .try_reserve_exact(capacity)
            .map_err(|_| PoolError::OutOfMemory {
                bytes: capacity.saturating_mul(std::mem::size_of::<TaskHeader<R, A>>()),
            })?;
        headers.extend((0..capacity).map(|_| TaskHeader::empty()));

        let mut payloads = Vec::new();
        payloads
            .try_reserve_exact(payload_bytes)
            .map_err(|_| PoolError::OutOfMemory { bytes: payload_bytes })?;
        payloads.resize(payload_bytes, 0);

        Ok(Self {
            headers: headers.into_boxed_slice(),
            payloads: payloads.into_boxed_slice(),
            stride,
        })
    }

    pub fn capacity(&self) -> usize {
        self.headers.len()
    }

    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Total bytes held by the arena.
    pub fn footprint(&self) -> usize {
        self.payloads.len() + self.headers.len() * std::mem::size_of::<TaskHeader<R, A>>()
    }

    fn payload_mut(&mut self, index: usize) -> &mut [u8] {
        let stride = self.stride();
        let start = index * stride;
        &mut self.payloads[start..start + stride]
    }

    fn payload(&self, index: usize) -> &[u8] {
        let stride = self.stride();
        let start = index * stride;
        &self.payloads[start..start + stride]
    }

    /// Fills slot `index`. `bytes.len()` must not exceed the stride.
    pub fn write(
        &mut self,
        index: usize,
        function: TaskFn<R, A>,
        argument: Option<A>,
        bytes: &[u8],
        flags: u64,
    ) {
        debug_assert!(bytes.len() <= self.stride());
        self.payload_mut(index)[..bytes.len()].copy_from_slice(bytes);

        let header = &mut self.headers[index];
        header.function = Some(function);
        header.argument = argument;
        header.flags = flags;
        header.len = bytes.len();
    }

    /// Moves slot `index` into a worker's private copy, leaving the slot free.
    ///
    /// Any argument the previous task left behind in `task` must already have
    /// been released by the caller.
    pub fn take_into(&mut self, index: usize, task: &mut Task<R, A>) {
        let header = &mut self.headers[index];
        let len = header.len;
        task.function = header.function.take();
        task.argument = header.argument.take();
        task.flags = header.flags;
        task.len = len;
        header.len = 0;

        task.buffer[..len].copy_from_slice(&self.payload(index)[..len]);
    }

    /// Empties slot `index` for a task that will never run.
    pub fn discard(&mut self, index: usize) -> DiscardedTask<A> {
        let header = &mut self.headers[index];
        let len = header.len;
        let flags = header.flags;
        let argument = header.argument.take();
        header.function = None;
        header.len = 0;

        DiscardedTask {
            flags,
            argument,
            payload: self.payload(index)[..len].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ThreadContext;

    fn noop(_ctx: &mut ThreadContext<(), String>) {}

    #[test]
    fn test_arena_layout() {
        let arena = TaskArena::<(), String>::new(4, 16).unwrap();
        assert_eq!(arena.capacity(), 4);
        assert_eq!(arena.stride(), 16);
        assert!(arena.footprint() >= 64);
    }

    #[test]
    fn test_zero_stride_arena() {
        let mut arena = TaskArena::<(), String>::new(2, 0).unwrap();
        arena.write(1, noop, None, &[], 9);
        let mut task = Task::with_capacity(0);
        arena.take_into(1, &mut task);
        assert_eq!(task.flags(), 9);
        assert!(task.payload().is_empty());
    }

    #[test]
    fn test_slots_do_not_overlap() {
        let mut arena = TaskArena::<(), String>::new(3, 8).unwrap();
        arena.write(0, noop, None, &[1; 8], 0);
        arena.write(1, noop, Some("middle".into()), &[2; 5], 1);
        arena.write(2, noop, None, &[3; 8], 2);

        let mut task = Task::with_capacity(8);
        arena.take_into(1, &mut task);
        assert_eq!(task.payload(), &[2; 5]);
        assert_eq!(task.flags(), 1);
        assert_eq!(task.take_argument().as_deref(), Some("middle"));
        assert!(task.function.is_some());

        arena.take_into(2, &mut task);
        assert_eq!(task.payload(), &[3; 8]);
        arena.take_into(0, &mut task);
        assert_eq!(task.payload(), &[1; 8]);
    }

    #[test]
    fn test_take_frees_slot() {
        let mut arena = TaskArena::<(), String>::new(1, 4).unwrap();
        arena.write(0, noop, Some("a".into()), b"abcd", 5);
        let mut task = Task::with_capacity(4);
        arena.take_into(0, &mut task);

        let leftover = arena.discard(0);
        assert!(leftover.argument.is_none());
        assert!(leftover.payload.is_empty());
    }

    #[test]
    fn test_discard_returns_argument_and_payload() {
        let mut arena = TaskArena::<(), String>::new(2, 4).unwrap();
        arena.write(1, noop, Some("owned".into()), b"xy", 77);
        let discarded = arena.discard(1);
        assert_eq!(discarded.flags, 77);
        assert_eq!(discarded.argument.as_deref(), Some("owned"));
        assert_eq!(discarded.payload, b"xy");
    }

    #[test]
    fn test_oversized_arena_reports_out_of_memory() {
        let result = TaskArena::<(), String>::new(usize::MAX / 2, 4);
        assert!(matches!(result, Err(PoolError::OutOfMemory { .. })));
    }
}
