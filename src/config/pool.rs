//! Worker pool configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::{AffinityWidth, PoolError};

/// Upper bound on worker threads per pool.
pub const MAX_THREADS: usize = 16384;
/// Upper bound on queue slots per pool.
pub const MAX_QUEUE: usize = 131_072;
/// Worker threads used when the configured count is 0.
pub const DEFAULT_THREADS: usize = 16;
/// Queue slots used when the configured capacity is 0.
pub const DEFAULT_QUEUE: usize = 256;
/// Upper bound on the inline payload of a single task, in bytes.
pub const MAX_TASK_PAYLOAD: usize = 16384;

/// Construction parameters for a [`WorkerPool`](crate::core::WorkerPool).
///
/// A zero `thread_count` or `queue_capacity` selects the defaults; a zero
/// `stack_size` keeps the platform default; a zero `max_task_payload`
/// disables inline payloads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    pub thread_count: usize,
    /// Number of task slots in the queue.
    pub queue_capacity: usize,
    /// Stack size hint for worker threads, in bytes.
    pub stack_size: usize,
    /// CPUs per worker; serialized as the raw integer form.
    pub affinity: AffinityWidth,
    /// Largest inline payload a task may carry, in bytes.
    pub max_task_payload: usize,
}

impl WorkerPoolConfig {
    /// All-defaults configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub const fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Sets the number of queue slots.
    #[must_use]
    pub const fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the worker stack size hint.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sets the affinity width.
    #[must_use]
    pub const fn with_affinity(mut self, affinity: AffinityWidth) -> Self {
        self.affinity = affinity;
        self
    }

    /// Sets the per-task inline payload limit.
    #[must_use]
    pub const fn with_max_task_payload(mut self, max_task_payload: usize) -> Self {
        self.max_task_payload = max_task_payload;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` naming the first offending field.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.thread_count > MAX_THREADS {
            return Err(PoolError::InvalidArgument(format!(
                "thread_count {} exceeds {MAX_THREADS}",
                self.thread_count
            )));
        }
        if self.queue_capacity > MAX_QUEUE {
            return Err(PoolError::InvalidArgument(format!(
                "queue_capacity {} exceeds {MAX_QUEUE}",
                self.queue_capacity
            )));
        }
        if self.max_task_payload > MAX_TASK_PAYLOAD {
            return Err(PoolError::InvalidArgument(format!(
                "max_task_payload {} exceeds {MAX_TASK_PAYLOAD}",
                self.max_task_payload
            )));
        }
        Ok(())
    }

    /// Validates and substitutes defaults for zero counts.
    ///
    /// # Errors
    ///
    /// Same as [`WorkerPoolConfig::validate`].
    pub fn resolved(&self) -> Result<Self, PoolError> {
        self.validate()?;
        let mut resolved = self.clone();
        if resolved.thread_count == 0 {
            resolved.thread_count = DEFAULT_THREADS;
        }
        if resolved.queue_capacity == 0 {
            resolved.queue_capacity = DEFAULT_QUEUE;
        }
        Ok(resolved)
    }

    /// Parse a pool configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, PoolError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| PoolError::InvalidArgument(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Several named pools, e.g. one per backend a service talks to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSetConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, WorkerPoolConfig>,
}

impl PoolSetConfig {
    /// Validate all pools and ensure at least one pool exists.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` naming the offending pool.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.pools.is_empty() {
            return Err(PoolError::InvalidArgument(
                "at least one pool must be defined".into(),
            ));
        }
        for (name, pool) in &self.pools {
            pool.validate().map_err(|e| {
                PoolError::InvalidArgument(format!("pool `{name}` invalid: {e}"))
            })?;
        }
        Ok(())
    }

    /// Parse a pool set from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::InvalidArgument` on malformed JSON or invalid values.
    pub fn from_json_str(input: &str) -> Result<Self, PoolError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| PoolError::InvalidArgument(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
