//! Builders to construct worker pools from configuration.

use std::collections::HashMap;

use crate::config::{PoolSetConfig, WorkerPoolConfig};
use crate::core::{AffinityWidth, PoolError, WorkerPool};

/// Fluent construction of a [`WorkerPool`].
///
/// ```
/// use slotted_pool::builders::PoolBuilder;
/// use slotted_pool::core::WorkerPool;
///
/// let pool: WorkerPool<u32, ()> = PoolBuilder::new()
///     .thread_count(3)
///     .queue_capacity(16)
///     .max_task_payload(64)
///     .build_with(|id| u32::try_from(id).unwrap_or(0))?;
/// assert_eq!(pool.thread_count(), 3);
/// # Ok::<(), slotted_pool::core::PoolError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoolBuilder {
    config: WorkerPoolConfig,
}

impl PoolBuilder {
    /// Builder starting from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder starting from an existing configuration.
    #[must_use]
    pub const fn from_config(config: WorkerPoolConfig) -> Self {
        Self { config }
    }

    /// Number of worker threads (0 selects the default).
    #[must_use]
    pub const fn thread_count(mut self, thread_count: usize) -> Self {
        self.config.thread_count = thread_count;
        self
    }

    /// Number of queue slots (0 selects the default).
    #[must_use]
    pub const fn queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.config.queue_capacity = queue_capacity;
        self
    }

    /// Worker stack size hint in bytes (0 keeps the platform default).
    #[must_use]
    pub const fn stack_size(mut self, stack_size: usize) -> Self {
        self.config.stack_size = stack_size;
        self
    }

    /// CPUs per worker.
    #[must_use]
    pub const fn affinity(mut self, affinity: AffinityWidth) -> Self {
        self.config.affinity = affinity;
        self
    }

    /// Per-task inline payload limit in bytes.
    #[must_use]
    pub const fn max_task_payload(mut self, max_task_payload: usize) -> Self {
        self.config.max_task_payload = max_task_payload;
        self
    }

    /// The configuration built so far.
    #[must_use]
    pub const fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    /// Builds a pool whose workers carry no resource.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn build<A>(self) -> Result<WorkerPool<(), A>, PoolError>
    where
        A: Send + 'static,
    {
        WorkerPool::without_resources(self.config)
    }

    /// Builds a pool with one worker per supplied resource.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn build_with_resources<R, A>(self, resources: Vec<R>) -> Result<WorkerPool<R, A>, PoolError>
    where
        R: Send + 'static,
        A: Send + 'static,
    {
        WorkerPool::new(self.config, resources)
    }

    /// Builds a pool, creating each worker's resource from its 1-based id.
    ///
    /// # Errors
    ///
    /// See [`WorkerPool::new`].
    pub fn build_with<R, A, F>(self, factory: F) -> Result<WorkerPool<R, A>, PoolError>
    where
        R: Send + 'static,
        A: Send + 'static,
        F: FnMut(usize) -> R,
    {
        WorkerPool::with_resource_factory(self.config, factory)
    }
}

/// Build every pool of a pool set, creating resources with `factory`, which
/// receives the pool name and the 1-based worker id.
///
/// # Errors
///
/// Returns the first configuration or start-up error; pools built before the
/// failure are shut down as they are dropped.
pub fn build_pools<R, A, F>(
    cfg: &PoolSetConfig,
    mut factory: F,
) -> Result<HashMap<String, WorkerPool<R, A>>, PoolError>
where
    R: Send + 'static,
    A: Send + 'static,
    F: FnMut(&str, usize) -> R,
{
    cfg.validate()?;

    let mut pools = HashMap::with_capacity(cfg.pools.len());
    for (name, pool_cfg) in &cfg.pools {
        let pool = WorkerPool::with_resource_factory(pool_cfg.clone(), |id| factory(name, id))?;
        pools.insert(name.clone(), pool);
    }

    Ok(pools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_every_field() {
        let builder = PoolBuilder::new()
            .thread_count(2)
            .queue_capacity(4)
            .stack_size(256 * 1024)
            .affinity(AffinityWidth::All)
            .max_task_payload(8);
        let cfg = builder.config();
        assert_eq!(cfg.thread_count, 2);
        assert_eq!(cfg.queue_capacity, 4);
        assert_eq!(cfg.stack_size, 256 * 1024);
        assert_eq!(cfg.affinity, AffinityWidth::All);
        assert_eq!(cfg.max_task_payload, 8);
    }

    #[test]
    fn test_build_with_factory_gives_ids_in_order() {
        let pool: WorkerPool<usize, ()> = PoolBuilder::new()
            .thread_count(3)
            .queue_capacity(2)
            .build_with(|id| id * 10)
            .unwrap();
        let report = pool.shutdown().unwrap();
        assert_eq!(report.resources, vec![10, 20, 30]);
    }

    #[test]
    fn test_build_pools_from_json() {
        let cfg = PoolSetConfig::from_json_str(
            r#"{ "pools": { "db": { "thread_count": 2, "queue_capacity": 4 },
                            "cache": { "thread_count": 1, "queue_capacity": 2 } } }"#,
        )
        .unwrap();

        let pools = build_pools::<String, (), _>(&cfg, |name, id| format!("{name}-{id}")).unwrap();
        assert_eq!(pools["db"].thread_count(), 2);
        assert_eq!(pools["cache"].thread_count(), 1);

        let report = pools["db"].shutdown().unwrap();
        assert_eq!(report.resources, vec!["db-1".to_string(), "db-2".to_string()]);
    }
}
