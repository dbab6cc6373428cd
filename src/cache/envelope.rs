//! Payloads stored in the cache backend.
//!
//! The store never interprets items: list entries and page items are the
//! JSON documents handed back by the content repositories.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum CachePayload {
    /// Full result of an unpaginated query.
    EntityList(Vec<Value>),
    /// One page of a paginated query.
    Page(PageEnvelope),
    /// A complete HTTP response.
    Response(ResponseSnapshot),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEnvelope {
    pub items: Vec<Value>,
    pub total_rows: u64,
    pub page: u64,
    pub page_size: u64,
}

impl PageEnvelope {
    /// Envelope for an unpaginated result: a single page holding every row.
    pub fn unpaginated(items: Vec<Value>) -> Self {
        let total_rows = items.len() as u64;
        Self {
            items,
            total_rows,
            page: 1,
            page_size: total_rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
}
