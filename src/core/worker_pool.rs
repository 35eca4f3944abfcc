//! Fixed-size worker pool over a bounded slot queue.
//!
//! A single `parking_lot::Mutex` guards the ring indices, the slot arena, the
//! lifecycle phase and the worker table; one `Condvar` wakes idle workers.
//! Producers never block: a full queue is reported immediately as
//! [`PoolError::QueueFull`] and backpressure is left to the caller.
//!
//! # Example
//!
//! ```
//! use slotted_pool::config::WorkerPoolConfig;
//! use slotted_pool::core::{ThreadContext, WorkerPool};
//!
//! fn greet(ctx: &mut ThreadContext<String, ()>) {
//!     let name = String::from_utf8_lossy(ctx.payload()).into_owned();
//!     ctx.resource_mut().push_str(&name);
//! }
//!
//! let config = WorkerPoolConfig::new()
//!     .with_thread_count(2)
//!     .with_queue_capacity(8)
//!     .with_max_task_payload(32);
//! let pool = WorkerPool::new(config, vec![String::new(), String::new()])?;
//! pool.add(greet, None, b"hello", 1)?;
//!
//! let report = pool.shutdown()?;
//! assert_eq!(report.resources.len(), 2);
//! # Ok::<(), slotted_pool::core::PoolError>(())
//! ```

mod queue;
mod worker;

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::WorkerPoolConfig;
use crate::core::affinity::{self, AffinityWidth};
use crate::core::arena::TaskArena;
use crate::core::context::WorkerInfo;
use crate::core::task::{DiscardedTask, TaskFn};
use crate::core::{PoolError, Rejected};

use self::queue::RingQueue;

/// Lifecycle of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPhase {
    /// Workers are being spawned.
    Initializing,
    /// Accepting and dispatching tasks.
    Running,
    /// Shutdown requested; workers are finishing in-flight tasks.
    ShuttingDown,
    /// Every worker has been joined.
    Terminated,
}

impl PoolPhase {
    /// Whether shutdown has begun.
    #[must_use]
    pub const fn is_stopping(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::Terminated)
    }
}

/// Snapshot of pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of worker threads.
    pub thread_count: usize,
    /// Total queue slots.
    pub queue_capacity: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Workers currently running a task.
    pub busy_workers: usize,
    /// Tasks accepted by `add`.
    pub submitted_tasks: u64,
    /// Submissions refused because the queue was full.
    pub queue_full_rejections: u64,
    /// Tasks that returned normally.
    pub completed_tasks: u64,
    /// Tasks that panicked.
    pub panicked_tasks: u64,
    /// Bytes reserved by the slot arena.
    pub arena_bytes: usize,
}

/// Everything handed back by [`WorkerPool::shutdown`].
pub struct ShutdownReport<R, A> {
    /// Resources of the workers that exited normally, in worker id order.
    /// Workers listed in `panicked_workers` have no entry, so an index here
    /// only equals `id - 1` when that list is empty.
    pub resources: Vec<R>,
    /// Tasks still queued at shutdown, in submission order. They never ran.
    pub discarded: Vec<DiscardedTask<A>>,
    /// Ids of workers whose thread ended in a panic; their resources are lost.
    pub panicked_workers: Vec<usize>,
}

impl<R, A> fmt::Debug for ShutdownReport<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownReport")
            .field("resources", &self.resources.len())
            .field("discarded", &self.discarded.len())
            .field("panicked_workers", &self.panicked_workers)
            .finish()
    }
}

/// State guarded by the pool lock.
struct PoolState<R, A> {
    phase: PoolPhase,
    queue: RingQueue<R, A>,
    workers: Vec<WorkerInfo>,
    submitted: u64,
    queue_full: u64,
    completed: u64,
    panicked: u64,
}

struct Shared<R, A> {
    state: Mutex<PoolState<R, A>>,
    notify: Condvar,
    thread_count: usize,
    queue_capacity: usize,
    max_task_payload: usize,
}

/// Cloneable handle to a pool, available to task routines through
/// [`ThreadContext::pool`](crate::core::ThreadContext::pool).
///
/// A handle can submit work and query the pool but cannot shut it down; only
/// the owning [`WorkerPool`] can.
pub struct PoolHandle<R, A> {
    shared: Arc<Shared<R, A>>,
}

impl<R, A> Clone for PoolHandle<R, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<R, A> fmt::Debug for PoolHandle<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("thread_count", &self.shared.thread_count)
            .field("queue_capacity", &self.shared.queue_capacity)
            .field("max_task_payload", &self.shared.max_task_payload)
            .finish_non_exhaustive()
    }
}

impl<R, A> PoolHandle<R, A> {
    /// Enqueues a task.
    ///
    /// `task_arg` is copied into the task's slot before this returns, so the
    /// caller may reuse its buffer immediately. `argument` is moved into the
    /// pool and handed to the routine; if the task is refused it comes back
    /// inside the [`Rejected`] value.
    ///
    /// # Errors
    ///
    /// - `PoolError::TaskArgOverflow` if `task_arg` exceeds the payload limit
    /// - `PoolError::ShuttingDown` if the pool is not running
    /// - `PoolError::QueueFull` if every slot is occupied
    pub fn add(
        &self,
        function: TaskFn<R, A>,
        argument: Option<A>,
        task_arg: &[u8],
        flags: u64,
    ) -> Result<(), Rejected<A>> {
        let max = self.shared.max_task_payload;
        if task_arg.len() > max {
            return Err(Rejected::new(
                PoolError::TaskArgOverflow {
                    len: task_arg.len(),
                    max,
                },
                argument,
            ));
        }

        let mut state = self.shared.state.lock();
        if state.phase != PoolPhase::Running {
            return Err(Rejected::new(PoolError::ShuttingDown, argument));
        }

        match state.queue.push(function, argument, task_arg, flags) {
            Ok(()) => {
                state.submitted += 1;
                self.shared.notify.notify_one();
                Ok(())
            }
            Err((error, argument)) => {
                state.queue_full += 1;
                drop(state);
                warn!(
                    flags = flags,
                    queue_capacity = self.shared.queue_capacity,
                    "Task queue is full"
                );
                Err(Rejected::new(error, argument))
            }
        }
    }

    /// Free slots in the queue.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Invalid` once the pool is shutting down.
    pub fn unused_capacity(&self) -> Result<usize, PoolError> {
        let state = self.shared.state.lock();
        if state.phase.is_stopping() {
            return Err(PoolError::Invalid("pool is shut down".into()));
        }
        Ok(state.queue.unused())
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.shared.thread_count
    }

    /// Total queue slots.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        self.shared.queue_capacity
    }

    /// Largest inline payload a task may carry.
    #[must_use]
    pub fn max_task_payload(&self) -> usize {
        self.shared.max_task_payload
    }

    /// Record of the worker with 1-based `id`.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Invalid` if `id` is outside `1..=thread_count`.
    pub fn context_by_id(&self, id: usize) -> Result<WorkerInfo, PoolError> {
        if id == 0 || id > self.shared.thread_count {
            return Err(PoolError::Invalid(format!(
                "worker id {id} outside 1..={}",
                self.shared.thread_count
            )));
        }
        Ok(self.shared.state.lock().workers[id - 1].clone())
    }

    /// Records of every worker, ordered by id.
    #[must_use]
    pub fn workers(&self) -> Vec<WorkerInfo> {
        self.shared.state.lock().workers.clone()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> PoolPhase {
        self.shared.state.lock().phase
    }

    /// Current utilization snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            thread_count: self.shared.thread_count,
            queue_capacity: self.shared.queue_capacity,
            queued_tasks: state.queue.len(),
            busy_workers: state.workers.iter().filter(|w| w.is_busy()).count(),
            submitted_tasks: state.submitted,
            queue_full_rejections: state.queue_full,
            completed_tasks: state.completed,
            panicked_tasks: state.panicked,
            arena_bytes: state.queue.arena().footprint(),
        }
    }

    /// Moves the pool into `ShuttingDown`, returning the tasks that will never
    /// run.
    fn begin_shutdown(&self) -> Result<Vec<DiscardedTask<A>>, PoolError> {
        let mut state = self.shared.state.lock();
        if state.phase.is_stopping() {
            return Err(PoolError::AlreadyShuttingDown);
        }
        state.phase = PoolPhase::ShuttingDown;
        let discarded = state.queue.drain();
        self.shared.notify.notify_all();
        Ok(discarded)
    }

    fn set_phase(&self, phase: PoolPhase) {
        self.shared.state.lock().phase = phase;
    }
}

/// Fixed-size pool of worker threads, each owning a resource `R`, executing
/// tasks whose owned argument has type `A`.
pub struct WorkerPool<R, A> {
    /// Resolved configuration.
    config: WorkerPoolConfig,
    handle: PoolHandle<R, A>,
    /// Worker thread handles, emptied by shutdown.
    workers: Mutex<Vec<JoinHandle<R>>>,
}

impl<R, A> WorkerPool<R, A>
where
    R: Send + 'static,
    A: Send + 'static,
{
    /// Creates a pool with one worker per resource.
    ///
    /// Zero thread count or queue capacity select the defaults; the number of
    /// resources must equal the resolved thread count. Either every worker
    /// starts and the pool is returned, or every started worker is joined and
    /// an error is returned.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidArgument` for out-of-range parameters
    /// - `PoolError::OutOfMemory` if the slot arena cannot be reserved
    /// - `PoolError::WorkerStart` / `PoolError::WorkerPanicked` if a worker fails to come up
    pub fn new(config: WorkerPoolConfig, resources: Vec<R>) -> Result<Self, PoolError> {
        let config = config.resolved()?;
        if resources.len() != config.thread_count {
            return Err(PoolError::InvalidArgument(format!(
                "{} resources supplied for {} workers",
                resources.len(),
                config.thread_count
            )));
        }

        let arena = TaskArena::new(config.queue_capacity, config.max_task_payload)?;
        let online = if config.affinity.is_enabled() {
            affinity::online_cpus()
        } else {
            0
        };
        let workers = (0..config.thread_count)
            .map(|index| {
                let planned = affinity::plan_cpus(index, config.affinity, online);
                WorkerInfo::new(index + 1, planned.map(Iterator::collect))
            })
            .collect();

        let handle = PoolHandle {
            shared: Arc::new(Shared {
                state: Mutex::new(PoolState {
                    phase: PoolPhase::Initializing,
                    queue: RingQueue::new(arena),
                    workers,
                    submitted: 0,
                    queue_full: 0,
                    completed: 0,
                    panicked: 0,
                }),
                notify: Condvar::new(),
                thread_count: config.thread_count,
                queue_capacity: config.queue_capacity,
                max_task_payload: config.max_task_payload,
            }),
        };

        let (ready_tx, ready_rx) = crossbeam_channel::bounded(config.thread_count);
        let mut threads = Vec::with_capacity(config.thread_count);

        for (index, resource) in resources.into_iter().enumerate() {
            let id = index + 1;
            let plan = affinity::plan_cpus(index, config.affinity, online);
            match worker::spawn_worker(
                id,
                resource,
                handle.clone(),
                plan,
                config.stack_size,
                ready_tx.clone(),
            ) {
                Ok(thread) => threads.push(thread),
                Err(source) => {
                    warn!(worker_id = id, error = %source, "Failed to spawn worker thread");
                    abort_startup(&handle, threads);
                    return Err(PoolError::WorkerStart { id, source });
                }
            }
        }
        drop(ready_tx);

        let mut ready = Vec::with_capacity(threads.len());
        while ready.len() < threads.len() {
            if let Ok(id) = ready_rx.recv() {
                ready.push(id);
                continue;
            }
            // Every sender is gone, so some worker died before reporting in.
            let id = (1..=threads.len()).find(|id| !ready.contains(id)).unwrap_or(0);
            abort_startup(&handle, threads);
            return Err(PoolError::WorkerPanicked { id });
        }

        handle.set_phase(PoolPhase::Running);

        info!(
            thread_count = config.thread_count,
            queue_capacity = config.queue_capacity,
            max_task_payload = config.max_task_payload,
            affinity = config.affinity.as_raw(),
            "WorkerPool initialized"
        );

        Ok(Self {
            config,
            handle,
            workers: Mutex::new(threads),
        })
    }

    /// Creates a pool whose resources come from `factory`, called with each
    /// 1-based worker id in order.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerPool::new`].
    pub fn with_resource_factory<F>(config: WorkerPoolConfig, factory: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> R,
    {
        let thread_count = config.resolved()?.thread_count;
        let resources = (1..=thread_count).map(factory).collect();
        Self::new(config, resources)
    }

    /// Enqueues a task. See [`PoolHandle::add`].
    ///
    /// # Errors
    ///
    /// See [`PoolHandle::add`].
    pub fn add(
        &self,
        function: TaskFn<R, A>,
        argument: Option<A>,
        task_arg: &[u8],
        flags: u64,
    ) -> Result<(), Rejected<A>> {
        self.handle.add(function, argument, task_arg, flags)
    }

    /// Stops the pool and joins every worker.
    ///
    /// Tasks already running finish; tasks still queued are not run and are
    /// returned in the report so their arguments can be released.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::AlreadyShuttingDown` on every call after the first.
    pub fn shutdown(&self) -> Result<ShutdownReport<R, A>, PoolError> {
        let discarded = self.handle.begin_shutdown()?;
        info!(discarded = discarded.len(), "Shutting down worker pool");
        if !discarded.is_empty() {
            warn!(
                discarded = discarded.len(),
                "Queued tasks discarded without running"
            );
        }

        let threads = std::mem::take(&mut *self.workers.lock());
        let mut resources = Vec::with_capacity(threads.len());
        let mut panicked_workers = Vec::new();

        for (index, thread) in threads.into_iter().enumerate() {
            match thread.join() {
                Ok(resource) => {
                    debug!(worker_id = index + 1, "Worker joined");
                    resources.push(resource);
                }
                Err(_) => {
                    warn!(worker_id = index + 1, "Worker panicked");
                    panicked_workers.push(index + 1);
                }
            }
        }

        self.handle.set_phase(PoolPhase::Terminated);
        info!(thread_count = self.config.thread_count, "Worker pool shut down complete");

        Ok(ShutdownReport {
            resources,
            discarded,
            panicked_workers,
        })
    }

    /// A cloneable handle for submitting from other threads or from tasks.
    #[must_use]
    pub fn handle(&self) -> PoolHandle<R, A> {
        self.handle.clone()
    }

    /// The resolved configuration the pool runs with.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Affinity the workers were planned with.
    #[must_use]
    pub const fn affinity(&self) -> AffinityWidth {
        self.config.affinity
    }

    /// See [`PoolHandle::unused_capacity`].
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Invalid` once the pool is shutting down.
    pub fn unused_capacity(&self) -> Result<usize, PoolError> {
        self.handle.unused_capacity()
    }

    /// Number of worker threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.handle.thread_count()
    }

    /// See [`PoolHandle::context_by_id`].
    ///
    /// # Errors
    ///
    /// Returns `PoolError::Invalid` if `id` is outside `1..=thread_count`.
    pub fn context_by_id(&self, id: usize) -> Result<WorkerInfo, PoolError> {
        self.handle.context_by_id(id)
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> PoolPhase {
        self.handle.phase()
    }

    /// Current utilization snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.handle.stats()
    }
}

impl<A> WorkerPool<(), A>
where
    A: Send + 'static,
{
    /// Creates a pool whose workers carry no resource.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerPool::new`].
    pub fn without_resources(config: WorkerPoolConfig) -> Result<Self, PoolError> {
        Self::with_resource_factory(config, |_| ())
    }
}

impl<R, A> fmt::Debug for WorkerPool<R, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl<R, A> Drop for WorkerPool<R, A> {
    fn drop(&mut self) {
        // Join here rather than detach: workers hold the resources.
        let Ok(discarded) = self.handle.begin_shutdown() else {
            return;
        };
        if !discarded.is_empty() {
            warn!(
                discarded = discarded.len(),
                "WorkerPool dropped with queued tasks; discarding them"
            );
        }
        for (index, thread) in std::mem::take(&mut *self.workers.lock())
            .into_iter()
            .enumerate()
        {
            if thread.join().is_err() {
                warn!(worker_id = index + 1, "Worker panicked; its resource is lost");
            }
        }
        self.handle.set_phase(PoolPhase::Terminated);
        debug!("WorkerPool dropped without explicit shutdown - workers joined");
    }
}

/// Stops and joins the workers started so far after a failed construction.
fn abort_startup<R, A>(handle: &PoolHandle<R, A>, threads: Vec<JoinHandle<R>>) {
    let _ = handle.begin_shutdown();
    for thread in threads {
        let _ = thread.join();
    }
    handle.set_phase(PoolPhase::Terminated);
}
