//! Versioned cache store.
//!
//! Reads and writes payloads under `(fingerprint, version)` keys. Nothing is
//! ever deleted: a version bump makes older entries unreachable and the
//! backend expires them by TTL. Every backend failure degrades to a miss or
//! a dropped write.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};

use crate::domain::types::Resource;

use super::backend::{BackendError, CacheBackend};
use super::envelope::CachePayload;
use super::keys::{BaseKey, VersionedKey};
use super::version::{VersionStore, record_backend_error};

const METRIC_HIT_TOTAL: &str = "folio_cache_hit_total";
const METRIC_MISS_TOTAL: &str = "folio_cache_miss_total";
const METRIC_STORE_TOTAL: &str = "folio_cache_store_total";

pub struct VersionedCacheStore {
    backend: Arc<dyn CacheBackend>,
    versions: Arc<VersionStore>,
}

impl VersionedCacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, versions: Arc<VersionStore>) -> Self {
        Self { backend, versions }
    }

    pub fn versions(&self) -> &Arc<VersionStore> {
        &self.versions
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn health_check(&self) -> Result<(), BackendError> {
        self.backend.health_check().await
    }

    /// Pins the versioned key of `base` at the current version of `resource`.
    ///
    /// Returns `None` when the version cannot be read, in which case the
    /// caller should neither read nor write the cache.
    pub async fn resolve(&self, base: &BaseKey, resource: Resource) -> Option<VersionedKey> {
        match self.versions.try_current_version(resource).await {
            Ok(version) => Some(VersionedKey::new(self.versions.prefix(), base, version)),
            Err(_) => None,
        }
    }

    pub async fn get(&self, base: &BaseKey, resource: Resource) -> Option<CachePayload> {
        let key = self.resolve(base, resource).await?;
        self.get_at(&key).await
    }

    pub async fn set(
        &self,
        base: &BaseKey,
        resource: Resource,
        payload: &CachePayload,
        ttl: Duration,
    ) {
        if let Some(key) = self.resolve(base, resource).await {
            self.set_at(&key, payload, ttl).await;
        }
    }

    /// Looks up an already pinned key.
    pub async fn get_at(&self, key: &VersionedKey) -> Option<CachePayload> {
        let kind = key.kind().as_str();
        let raw = match self.backend.get(key.as_str()).await {
            Ok(raw) => raw,
            Err(err) => {
                record_backend_error("store.get", &err);
                None
            }
        };

        let payload = raw.and_then(|raw| match serde_json::from_str::<CachePayload>(&raw) {
            Ok(payload) => Some(payload),
            Err(err) => {
                warn!(key = key.as_str(), error = %err, "discarding undecodable cache entry");
                None
            }
        });

        match payload {
            Some(payload) => {
                counter!(METRIC_HIT_TOTAL, "kind" => kind).increment(1);
                debug!(cache = kind, outcome = "hit", version = key.version());
                Some(payload)
            }
            None => {
                counter!(METRIC_MISS_TOTAL, "kind" => kind).increment(1);
                debug!(cache = kind, outcome = "miss", version = key.version());
                None
            }
        }
    }

    /// Stores `payload` under an already pinned key.
    pub async fn set_at(&self, key: &VersionedKey, payload: &CachePayload, ttl: Duration) {
        let encoded = match serde_json::to_string(payload) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(key = key.as_str(), error = %err, "failed to encode cache payload");
                return;
            }
        };

        match self.backend.set(key.as_str(), &encoded, Some(ttl)).await {
            Ok(()) => {
                let kind = key.kind().as_str();
                counter!(METRIC_STORE_TOTAL, "kind" => kind).increment(1);
                debug!(
                    cache = kind,
                    outcome = "store",
                    version = key.version(),
                    ttl_secs = ttl.as_secs()
                );
            }
            Err(err) => record_backend_error("store.set", &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::envelope::PageEnvelope;
    use crate::cache::memory::MemoryBackend;
    use crate::cache::testing::UnavailableBackend;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::num::NonZeroUsize;

    const TTL: Duration = Duration::from_secs(60);

    fn memory_store() -> VersionedCacheStore {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(
            NonZeroUsize::new(128).expect("non-zero"),
        ));
        let versions = Arc::new(VersionStore::new(backend.clone(), "test"));
        VersionedCacheStore::new(backend, versions)
    }

    fn blogs_key() -> BaseKey {
        BaseKey::query(Resource::Blogs, &BTreeMap::new(), &["id".to_string()])
    }

    fn payload() -> CachePayload {
        CachePayload::EntityList(vec![json!({"id": 1, "title": "hello"})])
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = memory_store();
        store.set(&blogs_key(), Resource::Blogs, &payload(), TTL).await;
        assert_eq!(
            store.get(&blogs_key(), Resource::Blogs).await,
            Some(payload())
        );
    }

    #[tokio::test]
    async fn bump_hides_previous_entries() {
        let store = memory_store();
        store.set(&blogs_key(), Resource::Blogs, &payload(), TTL).await;

        store
            .versions()
            .increment_version(Resource::Blogs)
            .await
            .expect("bump");

        assert!(store.get(&blogs_key(), Resource::Blogs).await.is_none());
    }

    #[tokio::test]
    async fn pinned_key_ignores_later_bumps() {
        let store = memory_store();
        let pinned = store
            .resolve(&blogs_key(), Resource::Blogs)
            .await
            .expect("version readable");

        store
            .versions()
            .increment_version(Resource::Blogs)
            .await
            .expect("bump");
        store.set_at(&pinned, &payload(), TTL).await;

        // Written under the stale version, so readers at the new one miss.
        assert!(store.get(&blogs_key(), Resource::Blogs).await.is_none());
        assert_eq!(store.get_at(&pinned).await, Some(payload()));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(
            NonZeroUsize::new(8).expect("non-zero"),
        ));
        let versions = Arc::new(VersionStore::new(backend.clone(), "test"));
        let store = VersionedCacheStore::new(backend.clone(), versions);

        let key = store
            .resolve(&blogs_key(), Resource::Blogs)
            .await
            .expect("version readable");
        backend
            .set(key.as_str(), "{not json", Some(TTL))
            .await
            .expect("raw set");

        assert!(store.get_at(&key).await.is_none());
    }

    #[tokio::test]
    async fn unavailable_backend_fails_open() {
        let backend: Arc<dyn CacheBackend> = Arc::new(UnavailableBackend);
        let versions = Arc::new(VersionStore::new(backend.clone(), "test"));
        let store = VersionedCacheStore::new(backend, versions);

        assert!(store.resolve(&blogs_key(), Resource::Blogs).await.is_none());
        store.set(&blogs_key(), Resource::Blogs, &payload(), TTL).await;
        assert!(store.get(&blogs_key(), Resource::Blogs).await.is_none());
    }

    #[tokio::test]
    async fn page_payload_round_trips() {
        let store = memory_store();
        let key = BaseKey::page(Resource::Skills, &BTreeMap::new(), &[], 2, 10);
        let page = CachePayload::Page(PageEnvelope {
            items: vec![json!({"id": 11})],
            total_rows: 11,
            page: 2,
            page_size: 10,
        });
        store.set(&key, Resource::Skills, &page, TTL).await;
        assert_eq!(store.get(&key, Resource::Skills).await, Some(page));
    }
}
