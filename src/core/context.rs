//! Per-worker thread context and the worker table.

use std::fmt;

use serde::Serialize;

use crate::core::task::Task;
use crate::core::worker_pool::PoolHandle;

/// Everything a task routine can reach while running on a worker.
///
/// Each worker owns exactly one context for its whole life. The resource is
/// never visible to another thread, so routines may use it without locking.
pub struct ThreadContext<R, A> {
    id: usize,
    resource: R,
    pub(crate) task: Task<R, A>,
    pool: PoolHandle<R, A>,
}

impl<R, A> ThreadContext<R, A> {
    pub(crate) fn new(id: usize, resource: R, max_payload: usize, pool: PoolHandle<R, A>) -> Self {
        Self {
            id,
            resource,
            task: Task::with_capacity(max_payload),
            pool,
        }
    }

    /// 1-based worker id.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// The worker's long-lived resource.
    #[must_use]
    pub const fn resource(&self) -> &R {
        &self.resource
    }

    /// Mutable access to the worker's resource.
    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// The task currently executing on this worker.
    #[must_use]
    pub const fn task(&self) -> &Task<R, A> {
        &self.task
    }

    /// Shorthand for `task().flags()`.
    #[must_use]
    pub const fn flags(&self) -> u64 {
        self.task.flags
    }

    /// Shorthand for `task().payload()`.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.task.payload()
    }

    /// Takes ownership of the current task's argument.
    pub fn take_argument(&mut self) -> Option<A> {
        self.task.take_argument()
    }

    /// Handle to the owning pool, e.g. for enqueueing follow-up work.
    #[must_use]
    pub const fn pool(&self) -> &PoolHandle<R, A> {
        &self.pool
    }

    pub(crate) fn into_resource(self) -> R {
        self.resource
    }
}

impl<R, A> fmt::Debug for ThreadContext<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.id)
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

/// Lock-protected record mirroring one worker, readable from any thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerInfo {
    /// 1-based worker id.
    pub id: usize,
    /// OS thread name.
    pub thread_name: String,
    /// CPUs the affinity planner assigned, if pinning was requested.
    pub planned_cpus: Option<Vec<usize>>,
    /// CPUs the OS reports the worker may actually run on after pinning.
    pub granted_cpus: Option<Vec<usize>>,
    /// Flags of the task the worker is executing, `None` while idle.
    pub current_flags: Option<u64>,
    /// Number of tasks this worker has dequeued.
    pub dispatched: u64,
    /// Wall-clock time the worker reported ready, in ms since the epoch.
    pub started_at_ms: u128,
}

impl WorkerInfo {
    pub(crate) fn new(id: usize, planned_cpus: Option<Vec<usize>>) -> Self {
        Self {
            id,
            thread_name: worker_thread_name(id),
            planned_cpus,
            granted_cpus: None,
            current_flags: None,
            dispatched: 0,
            started_at_ms: 0,
        }
    }

    /// Whether the worker is currently running a task.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.current_flags.is_some()
    }
}

pub(crate) fn worker_thread_name(id: usize) -> String {
    format!("pool-worker-{id}")
}
