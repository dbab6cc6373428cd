//! Per-resource version counters.
//!
//! The backend stores how many times a resource has been bumped; the version
//! handed to callers is that count plus one, so an untouched resource is at
//! version 1 and the backend's native increment (which starts absent keys at
//! zero) moves it straight to 2.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::domain::types::Resource;

use super::backend::{BackendError, CacheBackend};
use super::keys::{BaseKey, VersionedKey, version_counter_key};

pub(crate) const METRIC_BACKEND_ERROR_TOTAL: &str = "folio_cache_backend_error_total";
const METRIC_VERSION_BUMP_TOTAL: &str = "folio_cache_version_bump_total";

pub struct VersionStore {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
}

impl VersionStore {
    pub fn new(backend: Arc<dyn CacheBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Current version of `resource`, surfacing backend failures.
    pub async fn try_current_version(&self, resource: Resource) -> Result<u64, BackendError> {
        let key = version_counter_key(&self.prefix, resource);
        let raw = self
            .backend
            .get(&key)
            .await
            .inspect_err(|err| record_backend_error("version.get", err))?;

        match raw {
            None => Ok(1),
            Some(raw) => {
                let count = raw.trim().parse::<i64>().map_err(|_| {
                    let err = BackendError::command(
                        "version.get",
                        format!("counter `{key}` holds non-integer value"),
                    );
                    record_backend_error("version.get", &err);
                    err
                })?;
                Ok(version_from_count(count))
            }
        }
    }

    /// Current version of `resource`; backend failures read as version 1.
    pub async fn current_version(&self, resource: Resource) -> u64 {
        self.try_current_version(resource).await.unwrap_or(1)
    }

    /// Atomically bumps `resource` and returns its new version.
    pub async fn increment_version(&self, resource: Resource) -> Result<u64, BackendError> {
        let key = version_counter_key(&self.prefix, resource);
        let count = self
            .backend
            .increment(&key)
            .await
            .inspect_err(|err| record_backend_error("version.increment", err))?;
        let version = version_from_count(count);

        counter!(METRIC_VERSION_BUMP_TOTAL, "resource" => resource.as_str()).increment(1);
        info!(resource = resource.as_str(), version, "cache version bumped");
        Ok(version)
    }

    /// Versioned backend key of `base` at the current version of `resource`.
    ///
    /// Stable between bumps: two calls with no intervening increment return
    /// the same key.
    pub async fn versioned_key(&self, base: &BaseKey, resource: Resource) -> VersionedKey {
        let version = self.current_version(resource).await;
        VersionedKey::new(&self.prefix, base, version)
    }

    /// Current version of every resource, for diagnostics.
    pub async fn snapshot(&self) -> Vec<(Resource, u64)> {
        let mut versions = Vec::with_capacity(Resource::ALL.len());
        for resource in Resource::ALL {
            versions.push((resource, self.current_version(resource).await));
        }
        versions
    }
}

fn version_from_count(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0).saturating_add(1)
}

pub(crate) fn record_backend_error(op: &'static str, err: &BackendError) {
    counter!(METRIC_BACKEND_ERROR_TOTAL, "op" => op).increment(1);
    warn!(op, error = %err, "cache backend operation failed; continuing without cache");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryBackend;
    use crate::cache::testing::UnavailableBackend;
    use std::collections::BTreeMap;
    use std::num::NonZeroUsize;

    fn store() -> VersionStore {
        let backend = MemoryBackend::new(NonZeroUsize::new(64).expect("non-zero"));
        VersionStore::new(Arc::new(backend), "test")
    }

    #[tokio::test]
    async fn untouched_resource_is_version_one() {
        let store = store();
        assert_eq!(store.current_version(Resource::Blogs).await, 1);
        assert_eq!(
            store
                .try_current_version(Resource::Skills)
                .await
                .expect("memory backend"),
            1
        );
    }

    #[tokio::test]
    async fn increment_is_monotonic_and_isolated() {
        let store = store();
        assert_eq!(store.increment_version(Resource::Blogs).await.expect("bump"), 2);
        assert_eq!(store.increment_version(Resource::Blogs).await.expect("bump"), 3);
        assert_eq!(store.current_version(Resource::Blogs).await, 3);
        assert_eq!(store.current_version(Resource::Links).await, 1);
    }

    #[tokio::test]
    async fn versioned_key_is_stable_until_bumped() {
        let store = store();
        let base = BaseKey::query(Resource::Projects, &BTreeMap::new(), &[]);

        let first = store.versioned_key(&base, Resource::Projects).await;
        let second = store.versioned_key(&base, Resource::Projects).await;
        assert_eq!(first, second);

        store
            .increment_version(Resource::Projects)
            .await
            .expect("bump");
        let third = store.versioned_key(&base, Resource::Projects).await;
        assert_ne!(first, third);
        assert_eq!(third.version(), 2);
    }

    #[tokio::test]
    async fn unavailable_backend_reads_as_version_one() {
        let store = VersionStore::new(Arc::new(UnavailableBackend), "test");
        assert!(store.try_current_version(Resource::Blogs).await.is_err());
        assert_eq!(store.current_version(Resource::Blogs).await, 1);
        assert!(store.increment_version(Resource::Blogs).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_covers_every_resource() {
        let store = store();
        store.increment_version(Resource::Skills).await.expect("bump");
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.len(), Resource::ALL.len());
        assert!(snapshot.contains(&(Resource::Skills, 2)));
        assert!(snapshot.contains(&(Resource::Blogs, 1)));
    }
}
