//! Worker thread start-up and run loop.

use std::any::Any;
use std::io;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::MutexGuard;
use tracing::{debug, error, warn};

use crate::core::affinity;
use crate::core::context::{worker_thread_name, ThreadContext};
use crate::util::clock::{now_ms, Stopwatch};

use super::PoolHandle;

/// Spawns worker `id` (1-based).
///
/// The worker pins itself, records the CPUs it was granted, reports on
/// `ready` and then serves the queue until shutdown. Its resource is returned
/// through the join handle.
pub(super) fn spawn_worker<R, A>(
    id: usize,
    resource: R,
    pool: PoolHandle<R, A>,
    plan: Option<Range<usize>>,
    stack_size: usize,
    ready: Sender<usize>,
) -> io::Result<JoinHandle<R>>
where
    R: Send + 'static,
    A: Send + 'static,
{
    let mut builder = thread::Builder::new().name(worker_thread_name(id));
    if stack_size > 0 {
        builder = builder.stack_size(stack_size);
    }

    builder.spawn(move || {
        debug!(worker_id = id, "Worker thread started");

        let granted = plan.and_then(|cpus| pin(id, cpus));
        {
            let mut state = pool.shared.state.lock();
            let info = &mut state.workers[id - 1];
            info.granted_cpus = granted;
            info.started_at_ms = now_ms();
        }
        let _ = ready.send(id);
        drop(ready);

        let max_payload = pool.max_task_payload();
        let mut ctx = ThreadContext::new(id, resource, max_payload, pool);
        run(&mut ctx);

        debug!(worker_id = id, "Worker thread exiting");
        ctx.into_resource()
    })
}

fn pin(id: usize, cpus: Range<usize>) -> Option<Vec<usize>> {
    match affinity::pin_current_thread(cpus.clone()) {
        Ok(granted) => {
            debug!(worker_id = id, cpus = ?granted, "Worker pinned");
            Some(granted)
        }
        Err(e) => {
            warn!(
                worker_id = id,
                planned = ?cpus,
                error = %e,
                "Could not pin worker; running unconstrained"
            );
            None
        }
    }
}

/// Serves the queue until the pool stops.
///
/// The lock is held only to wait, to copy a task out of its slot and to
/// update bookkeeping; the task itself always runs unlocked.
fn run<R, A>(ctx: &mut ThreadContext<R, A>) {
    let shared = Arc::clone(&ctx.pool().shared);
    let index = ctx.id() - 1;
    let mut state = shared.state.lock();

    loop {
        state.workers[index].current_flags = None;

        while state.queue.is_empty() && !state.phase.is_stopping() {
            shared.notify.wait(&mut state);
        }
        if state.phase.is_stopping() {
            break;
        }

        state.queue.pop_into(&mut ctx.task);
        let worker = &mut state.workers[index];
        worker.current_flags = Some(ctx.task.flags);
        worker.dispatched += 1;

        let finished = MutexGuard::unlocked(&mut state, || execute(ctx));
        if finished {
            state.completed += 1;
        } else {
            state.panicked += 1;
        }
    }
}

/// Runs the current task. Returns `false` if it panicked.
fn execute<R, A>(ctx: &mut ThreadContext<R, A>) -> bool {
    let Some(function) = ctx.task.function.take() else {
        return true;
    };
    let id = ctx.id();
    let flags = ctx.task.flags;
    let stopwatch = Stopwatch::start();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| function(ctx)));
    // An argument the routine did not claim is released here, off the lock.
    drop(ctx.task.argument.take());

    match outcome {
        Ok(()) => {
            debug!(
                worker_id = id,
                flags = flags,
                elapsed_us = stopwatch.elapsed_micros(),
                "Task completed"
            );
            true
        }
        Err(payload) => {
            error!(
                worker_id = id,
                flags = flags,
                panic = panic_message(payload.as_ref()),
                "Task panicked"
            );
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
