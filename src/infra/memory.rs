//! In-process content repositories.
//!
//! Used when no database URL is configured and throughout the tests. Filter
//! and ordering semantics come from `application::filters`, the same
//! declarations the Postgres adapter compiles to SQL.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::application::filters;
use crate::application::repos::{
    ContentRepo, ContentWriteRepo, ListQuery, PageWindow, RepoError, with_id,
};
use crate::domain::types::Resource;

#[derive(Default)]
pub struct MemoryRepositories {
    documents: RwLock<HashMap<Resource, BTreeMap<i64, Value>>>,
    next_id: AtomicI64,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    async fn matching(&self, resource: Resource, query: &ListQuery) -> Vec<Value> {
        let guard = self.documents.read().await;
        let Some(rows) = guard.get(&resource) else {
            return Vec::new();
        };
        let mut matched: Vec<Value> = rows
            .iter()
            .map(|(id, document)| with_id(*id, document.clone()))
            .filter(|document| filters::matches(resource, document, query))
            .collect();
        matched.sort_by(|left, right| filters::compare(left, right, &query.ordering));
        matched
    }
}

#[async_trait]
impl ContentRepo for MemoryRepositories {
    async fn count(&self, resource: Resource, query: &ListQuery) -> Result<u64, RepoError> {
        Ok(self.matching(resource, query).await.len() as u64)
    }

    async fn fetch(
        &self,
        resource: Resource,
        query: &ListQuery,
        window: Option<PageWindow>,
    ) -> Result<Vec<Value>, RepoError> {
        let matched = self.matching(resource, query).await;
        Ok(match window {
            Some(window) => matched
                .into_iter()
                .skip(usize::try_from(window.offset).unwrap_or(usize::MAX))
                .take(usize::try_from(window.limit).unwrap_or(usize::MAX))
                .collect(),
            None => matched,
        })
    }

    async fn find(&self, resource: Resource, id: i64) -> Result<Option<Value>, RepoError> {
        let guard = self.documents.read().await;
        Ok(guard
            .get(&resource)
            .and_then(|rows| rows.get(&id))
            .map(|document| with_id(id, document.clone())))
    }
}

#[async_trait]
impl ContentWriteRepo for MemoryRepositories {
    async fn insert(&self, resource: Resource, document: Value) -> Result<Value, RepoError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut guard = self.documents.write().await;
        guard
            .entry(resource)
            .or_default()
            .insert(id, document.clone());
        Ok(with_id(id, document))
    }

    async fn update(
        &self,
        resource: Resource,
        id: i64,
        document: Value,
    ) -> Result<Value, RepoError> {
        let mut guard = self.documents.write().await;
        let slot = guard
            .get_mut(&resource)
            .and_then(|rows| rows.get_mut(&id))
            .ok_or(RepoError::NotFound)?;
        *slot = document.clone();
        Ok(with_id(id, document))
    }

    async fn delete(&self, resource: Resource, id: i64) -> Result<(), RepoError> {
        let mut guard = self.documents.write().await;
        guard
            .get_mut(&resource)
            .and_then(|rows| rows.remove(&id))
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::OrderField;
    use serde_json::json;

    async fn seeded() -> MemoryRepositories {
        let repo = MemoryRepositories::new();
        for name in ["rust", "go", "python"] {
            repo.insert(Resource::Skills, json!({"name": name, "icon": ""}))
                .await
                .expect("insert");
        }
        repo
    }

    #[tokio::test]
    async fn filters_order_and_window() {
        let repo = seeded().await;
        let query = ListQuery {
            filters: BTreeMap::from([("kw".to_string(), "O".to_string())]),
            ordering: vec![OrderField {
                field: "name".to_string(),
                descending: true,
            }],
        };

        assert_eq!(repo.count(Resource::Skills, &query).await.expect("count"), 2);
        let names: Vec<Value> = repo
            .fetch(Resource::Skills, &query, None)
            .await
            .expect("fetch")
            .into_iter()
            .map(|document| document["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("python"), json!("go")]);

        let window = repo
            .fetch(
                Resource::Skills,
                &query,
                Some(PageWindow {
                    offset: 1,
                    limit: 5,
                }),
            )
            .await
            .expect("fetch");
        assert_eq!(window.len(), 1);
    }

    #[tokio::test]
    async fn resources_are_isolated() {
        let repo = seeded().await;
        assert_eq!(
            repo.count(Resource::Links, &ListQuery::default())
                .await
                .expect("count"),
            0
        );
        assert!(repo.find(Resource::Links, 1).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let repo = seeded().await;
        let updated = repo
            .update(Resource::Skills, 1, json!({"name": "zig"}))
            .await
            .expect("update");
        assert_eq!(updated, json!({"id": 1, "name": "zig"}));

        repo.delete(Resource::Skills, 1).await.expect("delete");
        assert!(matches!(
            repo.delete(Resource::Skills, 1).await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.update(Resource::Skills, 42, json!({})).await,
            Err(RepoError::NotFound)
        ));
    }
}
