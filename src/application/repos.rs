//! Repository traits describing persistence adapters.
//!
//! Content is stored as one JSON document per row, tagged with its resource.
//! Adapters interpret `ListQuery` filters through `application::filters`, so
//! every adapter agrees on what a filter parameter means.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::types::Resource;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderField {
    pub field: String,
    pub descending: bool,
}

impl OrderField {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Wire form: the field name, prefixed with `-` when descending.
    pub fn term(&self) -> String {
        if self.descending {
            format!("-{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

/// Filters and ordering of a list request, without any paging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Declared filter parameters with non-empty values, keyed by name.
    pub filters: BTreeMap<String, String>,
    pub ordering: Vec<OrderField>,
}

impl ListQuery {
    pub fn ordering_terms(&self) -> Vec<String> {
        self.ordering.iter().map(OrderField::term).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u64,
}

impl PageWindow {
    /// Window of the 1-based `page` at `page_size` rows per page.
    pub fn for_page(page: u64, page_size: u64) -> Self {
        Self {
            offset: page.saturating_sub(1).saturating_mul(page_size),
            limit: page_size,
        }
    }
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn count(&self, resource: Resource, query: &ListQuery) -> Result<u64, RepoError>;

    /// Documents matching `query`, each carrying its `id`, in query order.
    async fn fetch(
        &self,
        resource: Resource,
        query: &ListQuery,
        window: Option<PageWindow>,
    ) -> Result<Vec<Value>, RepoError>;

    async fn find(&self, resource: Resource, id: i64) -> Result<Option<Value>, RepoError>;
}

#[async_trait]
pub trait ContentWriteRepo: Send + Sync {
    /// Stores a new document and returns it with its assigned `id`.
    async fn insert(&self, resource: Resource, document: Value) -> Result<Value, RepoError>;

    /// Replaces an existing document; `RepoError::NotFound` when absent.
    async fn update(&self, resource: Resource, id: i64, document: Value)
    -> Result<Value, RepoError>;

    /// Removes a document; `RepoError::NotFound` when absent.
    async fn delete(&self, resource: Resource, id: i64) -> Result<(), RepoError>;
}

/// Merge the storage id into a stored document for presentation.
pub fn with_id(id: i64, document: Value) -> Value {
    match document {
        Value::Object(mut map) => {
            map.insert("id".to_string(), Value::from(id));
            Value::Object(map)
        }
        other => {
            let mut map = serde_json::Map::new();
            map.insert("id".to_string(), Value::from(id));
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
    }
}
