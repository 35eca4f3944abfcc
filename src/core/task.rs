//! Task header types and the per-worker private task copy.

use std::fmt;

use crate::core::context::ThreadContext;

/// Work routine executed by a worker.
///
/// Receives the worker's context, through which it reaches the task's flags,
/// inline payload, owned argument and the worker's resource.
pub type TaskFn<R, A> = fn(&mut ThreadContext<R, A>);

/// Fixed-size header stored in each arena slot.
pub(crate) struct TaskHeader<R, A> {
    pub function: Option<TaskFn<R, A>>,
    pub flags: u64,
    pub argument: Option<A>,
    pub len: usize,
}

impl<R, A> TaskHeader<R, A> {
    pub const fn empty() -> Self {
        Self {
            function: None,
            flags: 0,
            argument: None,
            len: 0,
        }
    }
}

/// A worker's private copy of the task it is executing.
///
/// The buffer is allocated once per worker with the pool's payload stride,
/// so dispatching a task never allocates.
pub struct Task<R, A> {
    pub(crate) function: Option<TaskFn<R, A>>,
    pub(crate) flags: u64,
    pub(crate) argument: Option<A>,
    pub(crate) len: usize,
    pub(crate) buffer: Box<[u8]>,
}

impl<R, A> Task<R, A> {
    pub(crate) fn with_capacity(max_payload: usize) -> Self {
        Self {
            function: None,
            flags: 0,
            argument: None,
            len: 0,
            buffer: vec![0; max_payload].into_boxed_slice(),
        }
    }

    /// Caller-defined 64-bit tag given at submission.
    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.flags
    }

    /// The inline payload copied at submission time.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Length of the inline payload in bytes.
    #[must_use]
    pub const fn payload_len(&self) -> usize {
        self.len
    }

    /// Borrows the owned argument, if one was supplied and not yet taken.
    #[must_use]
    pub const fn argument(&self) -> Option<&A> {
        self.argument.as_ref()
    }

    /// Takes ownership of the argument.
    ///
    /// An argument the routine leaves in place is dropped by the worker once
    /// the routine returns.
    pub fn take_argument(&mut self) -> Option<A> {
        self.argument.take()
    }
}

impl<R, A> fmt::Debug for Task<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("flags", &self.flags)
            .field("payload_len", &self.len)
            .field("has_argument", &self.argument.is_some())
            .finish_non_exhaustive()
    }
}

/// A queued task that was never dispatched because the pool shut down.
#[derive(Debug)]
pub struct DiscardedTask<A> {
    /// Caller-defined tag of the task.
    pub flags: u64,
    /// The owned argument, returned for release.
    pub argument: Option<A>,
    /// Copy of the inline payload.
    pub payload: Vec<u8>,
}
