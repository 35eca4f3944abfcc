//! Worker pool core: slot arena, worker contexts, affinity planning and the
//! coordinator.

pub mod affinity;
mod arena;
pub mod context;
pub mod error;
pub mod task;
pub mod worker_pool;

pub use affinity::{plan_cpus, AffinityWidth, CPU_ID_MAX};
pub use context::{ThreadContext, WorkerInfo};
pub use error::{ErrorCode, PoolError, Rejected};
pub use task::{DiscardedTask, Task, TaskFn};
pub use worker_pool::{PoolHandle, PoolPhase, PoolStats, ShutdownReport, WorkerPool};
