//! # Slotted Pool
//!
//! A fixed-size worker thread pool built around a bounded, allocation-free
//! task queue.
//!
//! Each worker is a long-lived OS thread that owns one resource for its whole
//! life (a database connection, a scratch arena, a model handle...). Tasks are
//! plain function pointers that receive the worker's [`ThreadContext`], so a
//! task can use the worker's resource without any locking.
//!
//! ## Key Features
//!
//! - **Slot arena**: the queue is one block of fixed-stride slots reserved at
//!   construction; enqueue and dispatch never allocate
//! - **Inline payloads**: up to `max_task_payload` bytes are copied into the
//!   slot on submission, so callers can reuse their buffers immediately
//! - **Owned arguments**: a typed argument moves into the pool and out to the
//!   routine that runs the task, or back to the caller if it is rejected
//! - **Fail-fast backpressure**: a full queue is an error, never a wait
//! - **Strict FIFO**: one shared queue, no work stealing, no reordering
//! - **CPU affinity planning**: workers can be pinned to groups of CPUs
//!
//! ```rust
//! use slotted_pool::config::WorkerPoolConfig;
//! use slotted_pool::core::{ThreadContext, WorkerPool};
//!
//! struct Connection {
//!     queries: u32,
//! }
//!
//! fn run_query(ctx: &mut ThreadContext<Connection, String>) {
//!     let _sql = ctx.take_argument();
//!     ctx.resource_mut().queries += 1;
//! }
//!
//! let pool = WorkerPool::with_resource_factory(
//!     WorkerPoolConfig::new().with_thread_count(4).with_queue_capacity(64),
//!     |_id| Connection { queries: 0 },
//! )?;
//!
//! pool.add(run_query, Some("SELECT 1".to_string()), &[], 1)?;
//!
//! let report = pool.shutdown()?;
//! assert_eq!(report.resources.len(), 4);
//! # Ok::<(), slotted_pool::core::PoolError>(())
//! ```
//!
//! [`ThreadContext`]: crate::core::ThreadContext

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Worker pool core: arena, contexts, affinity and coordination.
pub mod core;
/// Configuration models for worker pools.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Shared utilities.
pub mod util;
