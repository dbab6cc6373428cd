//! Shared key/value store behind the versioned cache.
//!
//! The cache layer only needs three primitives from its storage: read a
//! string, write a string with an optional TTL, and atomically increment an
//! integer counter. Anything providing those can host the cache for a whole
//! cluster of application instances.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {message}")]
    Unavailable { message: String },
    #[error("cache backend command `{op}` failed: {message}")]
    Command { op: &'static str, message: String },
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn command(op: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            op,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs and health reports.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Stores `value`; `None` means the entry never expires.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<(), BackendError>;

    /// Atomically adds one to the integer at `key` and returns the new value.
    ///
    /// An absent key counts as zero, so the first call returns 1.
    async fn increment(&self, key: &str) -> Result<i64, BackendError>;

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
