//! Wiring of the cache components around one shared backend.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{
    CacheBackend, CacheConfig, CacheState, InvalidationTrigger, MemoryBackend, QueryCacheManager,
    RedisBackend, VersionStore, VersionedCacheStore,
};

use super::error::InfraError;

/// Every cache component, sharing one backend and one version store.
#[derive(Clone)]
pub struct CacheServices {
    pub config: CacheConfig,
    pub store: Arc<VersionedCacheStore>,
    pub queries: Arc<QueryCacheManager>,
    pub trigger: Arc<InvalidationTrigger>,
}

impl CacheServices {
    /// Connects to Redis when a URL is configured, otherwise keeps entries
    /// in process.
    pub async fn from_config(config: CacheConfig) -> Result<Self, InfraError> {
        let backend: Arc<dyn CacheBackend> = match config.redis_url.as_deref() {
            Some(url) => {
                let redis = RedisBackend::connect(url, config.redis_pool_size)?;
                if let Err(err) = redis.health_check().await {
                    // Fail open: the pool reconnects once Redis is reachable.
                    warn!(error = %err, "redis unreachable at startup; cache reads will miss");
                }
                Arc::new(redis)
            }
            None => Arc::new(MemoryBackend::new(config.memory_capacity_non_zero())),
        };
        info!(
            backend = backend.name(),
            enabled = config.enabled,
            response_cache = config.response_cache_enabled(),
            "cache backend ready"
        );
        Ok(Self::with_backend(config, backend))
    }

    pub fn with_backend(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        let versions = Arc::new(VersionStore::new(backend.clone(), config.key_prefix.clone()));
        let store = Arc::new(VersionedCacheStore::new(backend, versions.clone()));
        let queries = Arc::new(QueryCacheManager::new(store.clone(), config.clone()));
        let trigger = Arc::new(InvalidationTrigger::new(config.clone(), versions));
        Self {
            config,
            store,
            queries,
            trigger,
        }
    }

    /// In-process backend sized from the config; used by tests and dev runs.
    pub fn in_memory(config: CacheConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new(config.memory_capacity_non_zero()));
        Self::with_backend(config, backend)
    }

    pub fn middleware_state(&self) -> CacheState {
        CacheState::new(self.config.clone(), self.store.clone())
    }

    pub fn versions(&self) -> &Arc<VersionStore> {
        self.store.versions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MutationKind;
    use crate::domain::types::Resource;

    #[tokio::test]
    async fn components_share_one_version_store() {
        let services = CacheServices::in_memory(CacheConfig::default());

        services
            .trigger
            .resource_changed(Resource::Projects, MutationKind::Updated)
            .await;

        assert_eq!(services.versions().current_version(Resource::Projects).await, 2);
        assert_eq!(services.versions().current_version(Resource::Skills).await, 2);
        assert_eq!(services.store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn memory_backend_without_redis_url() {
        let services = CacheServices::from_config(CacheConfig::default())
            .await
            .expect("memory backend");
        assert_eq!(services.store.backend_name(), "memory");
    }
}
