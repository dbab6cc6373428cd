//! Cache configuration.
//!
//! Controls the query/pagination cache, the response cache and the shared
//! backend they write to. Populated from the `[cache]` section of `folio.toml`.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::domain::types::Resource;

pub(crate) const DEFAULT_KEY_PREFIX: &str = "folio";
pub(crate) const DEFAULT_QUERY_TTL_SECS: u64 = 300;
pub(crate) const DEFAULT_RESPONSE_TTL_SECS: u64 = 300;
pub(crate) const DEFAULT_MAX_PAGE_SIZE: u64 = 10_000;
pub(crate) const DEFAULT_MAX_UNPAGINATED_ROWS: u64 = 1_000;
pub(crate) const DEFAULT_MEMORY_CAPACITY: usize = 10_000;
pub(crate) const DEFAULT_RESPONSE_BODY_LIMIT_BYTES: usize = 1024 * 1024;
pub(crate) const DEFAULT_REDIS_POOL_SIZE: usize = 16;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch for every cache layer.
    pub enabled: bool,
    /// Enable the HTTP response cache on top of the query cache.
    pub enable_response_cache: bool,
    /// Shared backend URL; the in-process backend is used when absent.
    pub redis_url: Option<String>,
    pub redis_pool_size: usize,
    /// Namespace prepended to every key written to the backend.
    pub key_prefix: String,
    pub query_ttl_secs: u64,
    pub response_ttl_secs: u64,
    /// Per-resource response TTL overrides.
    pub resource_ttl_secs: BTreeMap<Resource, u64>,
    /// Upper bound accepted for the `pageSize` query parameter.
    pub max_page_size: u64,
    /// Largest result set an unpaginated listing may return.
    pub max_unpaginated_rows: u64,
    /// Capacity of the in-process backend.
    pub memory_capacity: usize,
    /// Responses with larger bodies are served but never stored.
    pub response_body_limit_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_response_cache: true,
            redis_url: None,
            redis_pool_size: DEFAULT_REDIS_POOL_SIZE,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            query_ttl_secs: DEFAULT_QUERY_TTL_SECS,
            response_ttl_secs: DEFAULT_RESPONSE_TTL_SECS,
            resource_ttl_secs: BTreeMap::new(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            max_unpaginated_rows: DEFAULT_MAX_UNPAGINATED_ROWS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            response_body_limit_bytes: DEFAULT_RESPONSE_BODY_LIMIT_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            enable_response_cache: settings.enable_response_cache,
            redis_url: settings.redis_url.clone(),
            redis_pool_size: settings.redis_pool_size.get(),
            key_prefix: settings.key_prefix.clone(),
            query_ttl_secs: settings.query_ttl.as_secs(),
            response_ttl_secs: settings.response_ttl.as_secs(),
            resource_ttl_secs: settings.resource_ttl_secs.clone(),
            max_page_size: settings.max_page_size.get(),
            max_unpaginated_rows: settings.max_unpaginated_rows.get(),
            memory_capacity: settings.memory_capacity.get(),
            response_body_limit_bytes: settings.response_body_limit_bytes.get(),
        }
    }
}

impl CacheConfig {
    pub fn response_cache_enabled(&self) -> bool {
        self.enabled && self.enable_response_cache
    }

    pub fn query_ttl(&self) -> Duration {
        Duration::from_secs(self.query_ttl_secs)
    }

    /// Response TTL for `resource`, falling back to the global default.
    pub fn response_ttl_for(&self, resource: Resource) -> Duration {
        let secs = self
            .resource_ttl_secs
            .get(&resource)
            .copied()
            .unwrap_or(self.response_ttl_secs);
        Duration::from_secs(secs)
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert!(config.enable_response_cache);
        assert!(config.redis_url.is_none());
        assert_eq!(config.key_prefix, "folio");
        assert_eq!(config.query_ttl_secs, 300);
        assert_eq!(config.max_page_size, 10_000);
        assert_eq!(config.max_unpaginated_rows, 1_000);
    }

    #[test]
    fn response_cache_requires_master_switch() {
        let config = CacheConfig {
            enabled: false,
            enable_response_cache: true,
            ..Default::default()
        };
        assert!(!config.response_cache_enabled());
    }

    #[test]
    fn resource_ttl_overrides_default() {
        let mut config = CacheConfig::default();
        config.resource_ttl_secs.insert(Resource::Settings, 3600);

        assert_eq!(
            config.response_ttl_for(Resource::Settings),
            Duration::from_secs(3600)
        );
        assert_eq!(
            config.response_ttl_for(Resource::Blogs),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }
}
