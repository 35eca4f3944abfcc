//! Bounded circular queue over the slot arena.

use crate::core::arena::TaskArena;
use crate::core::task::{DiscardedTask, Task, TaskFn};
use crate::core::PoolError;

/// Ring indices plus the arena they address. Only ever touched under the
/// pool lock.
pub(crate) struct RingQueue<R, A> {
    arena: TaskArena<R, A>,
    head: usize,
    tail: usize,
    count: usize,
}

impl<R, A> RingQueue<R, A> {
    pub const fn new(arena: TaskArena<R, A>) -> Self {
        Self {
            arena,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub const fn len(&self) -> usize {
        self.count
    }

    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn unused(&self) -> usize {
        self.capacity() - self.count
    }

    pub const fn arena(&self) -> &TaskArena<R, A> {
        &self.arena
    }

    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.capacity() {
            0
        } else {
            next
        }
    }

    /// Appends a task at `tail`.
    ///
    /// On a full queue the argument is handed back with the error.
    pub fn push(
        &mut self,
        function: TaskFn<R, A>,
        argument: Option<A>,
        bytes: &[u8],
        flags: u64,
    ) -> Result<(), (PoolError, Option<A>)> {
        if self.count == self.capacity() {
            return Err((PoolError::QueueFull, argument));
        }

        self.arena.write(self.tail, function, argument, bytes, flags);
        self.tail = self.advance(self.tail);
        self.count += 1;
        Ok(())
    }

    /// Copies the task at `head` into `task` and frees its slot.
    pub fn pop_into(&mut self, task: &mut Task<R, A>) -> bool {
        if self.count == 0 {
            return false;
        }

        self.arena.take_into(self.head, task);
        self.head = self.advance(self.head);
        self.count -= 1;
        true
    }

    /// Empties the queue in FIFO order without running anything.
    pub fn drain(&mut self) -> Vec<DiscardedTask<A>> {
        let mut discarded = Vec::with_capacity(self.count);
        while self.count > 0 {
            discarded.push(self.arena.discard(self.head));
            self.head = self.advance(self.head);
            self.count -= 1;
        }
        self.tail = self.head;
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::ThreadContext;

    fn noop(_ctx: &mut ThreadContext<(), u32>) {}

    fn queue(capacity: usize, stride: usize) -> RingQueue<(), u32> {
        RingQueue::new(TaskArena::new(capacity, stride).unwrap())
    }

    #[test]
    fn test_fills_to_capacity_then_rejects() {
        let mut q = queue(3, 4);
        for i in 0..3 {
            assert!(q.push(noop, Some(i), b"x", u64::from(i)).is_ok());
        }
        assert_eq!(q.unused(), 0);

        let (err, argument) = q.push(noop, Some(99), b"x", 99).unwrap_err();
        assert!(matches!(err, PoolError::QueueFull));
        assert_eq!(argument, Some(99));
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let mut q = queue(3, 1);
        let mut task = Task::with_capacity(1);
        let mut seen = Vec::new();

        for flags in 0..10_u64 {
            q.push(noop, None, &[u8::try_from(flags).unwrap()], flags).unwrap();
            if flags % 2 == 1 {
                while q.pop_into(&mut task) {
                    seen.push((task.flags(), task.payload()[0]));
                }
            }
        }

        let expected: Vec<_> = (0..10_u64).map(|f| (f, u8::try_from(f).unwrap())).collect();
        assert_eq!(seen, expected);
        assert!(q.is_empty());
    }

    #[test]
    fn test_pop_on_empty() {
        let mut q = queue(2, 0);
        let mut task = Task::with_capacity(0);
        assert!(!q.pop_into(&mut task));
    }

    #[test]
    fn test_drain_returns_pending_in_order() {
        let mut q = queue(4, 2);
        let mut task = Task::with_capacity(2);
        q.push(noop, Some(1), b"a", 1).unwrap();
        q.push(noop, Some(2), b"b", 2).unwrap();
        q.push(noop, Some(3), b"c", 3).unwrap();
        assert!(q.pop_into(&mut task));

        let drained = q.drain();
        let flags: Vec<_> = drained.iter().map(|t| t.flags).collect();
        assert_eq!(flags, vec![2, 3]);
        assert_eq!(drained[0].argument, Some(2));
        assert_eq!(drained[1].payload, b"c");
        assert!(q.is_empty());
        assert_eq!(q.unused(), 4);

        q.push(noop, None, b"z", 9).unwrap();
        assert!(q.pop_into(&mut task));
        assert_eq!(task.flags(), 9);
    }
}
