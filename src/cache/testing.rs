use std::time::Duration;

use async_trait::async_trait;

use super::backend::{BackendError, CacheBackend};

/// Backend whose every operation fails, as if the server were down.
pub(crate) struct UnavailableBackend;

#[async_trait]
impl CacheBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }

    async fn set(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }

    async fn increment(&self, _key: &str) -> Result<i64, BackendError> {
        Err(BackendError::unavailable("connection refused"))
    }
}
