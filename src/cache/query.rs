//! Query and pagination cache.
//!
//! Serves list requests from the versioned store, falling back to the content
//! repository on a miss. Cache failures never reach the caller; repository
//! failures always do.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::application::pagination::{ListRequest, Paging};
use crate::application::repos::{ContentRepo, PageWindow, RepoError};
use crate::domain::types::Resource;

use super::config::CacheConfig;
use super::envelope::{CachePayload, PageEnvelope};
use super::keys::BaseKey;
use super::store::VersionedCacheStore;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{resource} listing has {rows} rows, above the unpaginated limit of {limit}")]
    TooManyRows {
        resource: &'static str,
        rows: u64,
        limit: u64,
    },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

pub struct QueryCacheManager {
    store: Arc<VersionedCacheStore>,
    config: CacheConfig,
}

impl QueryCacheManager {
    pub fn new(store: Arc<VersionedCacheStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn handle_list_request(
        &self,
        resource: Resource,
        request: &ListRequest,
        repo: &dyn ContentRepo,
    ) -> Result<PageEnvelope, QueryError> {
        self.handle_list_request_with_ttl(resource, request, repo, self.config.query_ttl())
            .await
    }

    #[instrument(skip_all, fields(resource = resource.as_str()))]
    pub async fn handle_list_request_with_ttl(
        &self,
        resource: Resource,
        request: &ListRequest,
        repo: &dyn ContentRepo,
        ttl: Duration,
    ) -> Result<PageEnvelope, QueryError> {
        match request.paging {
            Paging::Unpaginated => self.unpaginated(resource, request, repo, ttl).await,
            Paging::Page { page, page_size } => {
                self.paginated(resource, request, repo, page, page_size, ttl)
                    .await
            }
        }
    }

    async fn unpaginated(
        &self,
        resource: Resource,
        request: &ListRequest,
        repo: &dyn ContentRepo,
        ttl: Duration,
    ) -> Result<PageEnvelope, QueryError> {
        let ordering = request.query.ordering_terms();
        let base = BaseKey::query(resource, &request.query.filters, &ordering);
        let key = if self.config.enabled {
            self.store.resolve(&base, resource).await
        } else {
            None
        };

        if let Some(key) = key.as_ref() {
            match self.store.get_at(key).await {
                Some(CachePayload::EntityList(items)) => {
                    return Ok(PageEnvelope::unpaginated(items));
                }
                Some(_) => debug!(cache = "query", "ignoring entry with unexpected payload"),
                None => {}
            }
        }

        let rows = repo.count(resource, &request.query).await?;
        let limit = self.config.max_unpaginated_rows;
        if rows > limit {
            return Err(QueryError::TooManyRows {
                resource: resource.as_str(),
                rows,
                limit,
            });
        }

        let items = repo.fetch(resource, &request.query, None).await?;
        if let Some(key) = key.as_ref() {
            self.store
                .set_at(key, &CachePayload::EntityList(items.clone()), ttl)
                .await;
        }
        Ok(PageEnvelope::unpaginated(items))
    }

    async fn paginated(
        &self,
        resource: Resource,
        request: &ListRequest,
        repo: &dyn ContentRepo,
        page: u64,
        page_size: u64,
        ttl: Duration,
    ) -> Result<PageEnvelope, QueryError> {
        let ordering = request.query.ordering_terms();
        let base = BaseKey::page(resource, &request.query.filters, &ordering, page, page_size);
        let key = if self.config.enabled {
            self.store.resolve(&base, resource).await
        } else {
            None
        };

        if let Some(key) = key.as_ref() {
            match self.store.get_at(key).await {
                Some(CachePayload::Page(envelope)) => return Ok(envelope),
                Some(_) => debug!(cache = "pagination", "ignoring entry with unexpected payload"),
                None => {}
            }
        }

        let total_rows = repo.count(resource, &request.query).await?;
        let window = PageWindow::for_page(page, page_size);
        let items = if window.offset >= total_rows {
            Vec::new()
        } else {
            repo.fetch(resource, &request.query, Some(window)).await?
        };

        let envelope = PageEnvelope {
            items,
            total_rows,
            page,
            page_size,
        };
        if let Some(key) = key.as_ref() {
            self.store
                .set_at(key, &CachePayload::Page(envelope.clone()), ttl)
                .await;
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::{ListQuery, OrderField};
    use crate::cache::backend::CacheBackend;
    use crate::cache::memory::MemoryBackend;
    use crate::cache::testing::UnavailableBackend;
    use crate::cache::version::VersionStore;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRepo {
        rows: u64,
        fetches: AtomicUsize,
    }

    impl CountingRepo {
        fn new(rows: u64) -> Self {
            Self {
                rows,
                fetches: AtomicUsize::new(0),
            }
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContentRepo for CountingRepo {
        async fn count(&self, _resource: Resource, _query: &ListQuery) -> Result<u64, RepoError> {
            Ok(self.rows)
        }

        async fn fetch(
            &self,
            _resource: Resource,
            _query: &ListQuery,
            window: Option<PageWindow>,
        ) -> Result<Vec<Value>, RepoError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let (start, end) = match window {
                Some(window) => (
                    window.offset.min(self.rows),
                    (window.offset + window.limit).min(self.rows),
                ),
                None => (0, self.rows),
            };
            Ok((start..end).map(|i| json!({"id": i + 1})).collect())
        }

        async fn find(&self, _resource: Resource, _id: i64) -> Result<Option<Value>, RepoError> {
            Ok(None)
        }
    }

    fn manager_with(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> QueryCacheManager {
        let versions = Arc::new(VersionStore::new(backend.clone(), "test"));
        let store = Arc::new(VersionedCacheStore::new(backend, versions));
        QueryCacheManager::new(store, config)
    }

    fn manager(config: CacheConfig) -> QueryCacheManager {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new(
            NonZeroUsize::new(256).expect("non-zero"),
        ));
        manager_with(backend, config)
    }

    fn page(page: u64, page_size: u64) -> ListRequest {
        ListRequest {
            query: ListQuery {
                filters: Default::default(),
                ordering: vec![OrderField::ascending("id")],
            },
            paging: Paging::Page { page, page_size },
        }
    }

    fn unpaginated() -> ListRequest {
        ListRequest {
            paging: Paging::Unpaginated,
            ..page(1, 1)
        }
    }

    #[tokio::test]
    async fn pages_split_rows() {
        let manager = manager(CacheConfig::default());
        let repo = CountingRepo::new(25);

        let mut sizes = Vec::new();
        for number in [1, 3, 4] {
            let envelope = manager
                .handle_list_request(Resource::Skills, &page(number, 10), &repo)
                .await
                .expect("page");
            assert_eq!(envelope.total_rows, 25);
            assert_eq!(envelope.page, number);
            assert_eq!(envelope.page_size, 10);
            sizes.push(envelope.items.len());
        }
        assert_eq!(sizes, vec![10, 5, 0]);
    }

    #[tokio::test]
    async fn repeated_page_is_served_from_cache() {
        let manager = manager(CacheConfig::default());
        let repo = CountingRepo::new(25);

        let first = manager
            .handle_list_request(Resource::Skills, &page(2, 10), &repo)
            .await
            .expect("page");
        let second = manager
            .handle_list_request(Resource::Skills, &page(2, 10), &repo)
            .await
            .expect("page");

        assert_eq!(first, second);
        assert_eq!(repo.fetches(), 1);
    }

    #[tokio::test]
    async fn unpaginated_result_is_cached_as_entity_list() {
        let manager = manager(CacheConfig::default());
        let repo = CountingRepo::new(3);

        let envelope = manager
            .handle_list_request(Resource::Links, &unpaginated(), &repo)
            .await
            .expect("list");
        assert_eq!(envelope.total_rows, 3);
        assert_eq!(envelope.page, 1);
        assert_eq!(envelope.page_size, 3);

        manager
            .handle_list_request(Resource::Links, &unpaginated(), &repo)
            .await
            .expect("list");
        assert_eq!(repo.fetches(), 1);
    }

    #[tokio::test]
    async fn unpaginated_above_cap_is_rejected() {
        let manager = manager(CacheConfig {
            max_unpaginated_rows: 2,
            ..Default::default()
        });
        let repo = CountingRepo::new(3);

        let err = manager
            .handle_list_request(Resource::Blogs, &unpaginated(), &repo)
            .await
            .expect_err("too many rows");
        assert!(matches!(
            err,
            QueryError::TooManyRows {
                rows: 3,
                limit: 2,
                ..
            }
        ));
        assert_eq!(repo.fetches(), 0);
    }

    #[tokio::test]
    async fn disabled_cache_always_hits_repository() {
        let manager = manager(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let repo = CountingRepo::new(5);

        for _ in 0..2 {
            manager
                .handle_list_request(Resource::Skills, &page(1, 10), &repo)
                .await
                .expect("page");
        }
        assert_eq!(repo.fetches(), 2);
    }

    #[tokio::test]
    async fn unavailable_backend_still_answers() {
        let manager = manager_with(Arc::new(UnavailableBackend), CacheConfig::default());
        let repo = CountingRepo::new(4);

        let envelope = manager
            .handle_list_request(Resource::Skills, &page(1, 10), &repo)
            .await
            .expect("page");
        assert_eq!(envelope.items.len(), 4);
    }
}
