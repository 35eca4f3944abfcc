//! Configuration models for worker pools.

pub mod pool;

pub use pool::{
    PoolSetConfig, WorkerPoolConfig, DEFAULT_QUEUE, DEFAULT_THREADS, MAX_QUEUE, MAX_TASK_PAYLOAD,
    MAX_THREADS,
};
