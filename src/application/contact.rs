//! Contact form submissions.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::{Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, instrument};

use crate::application::error::AppError;
use crate::application::repos::ContentWriteRepo;
use crate::cache::{InvalidationTrigger, MutationKind};
use crate::domain::entities::ContactInput;
use crate::domain::types::{ContactStatus, Resource};

/// Where a submission came from, as far as the request can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactClient {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ContactClient {
    /// First `X-Forwarded-For` hop wins over the socket peer.
    pub fn from_parts(
        forwarded_for: Option<&str>,
        peer: Option<IpAddr>,
        user_agent: Option<&str>,
    ) -> Self {
        let forwarded = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        Self {
            ip_address: forwarded.or_else(|| peer.map(|ip| ip.to_string())),
            user_agent: user_agent.map(str::to_string),
        }
    }
}

#[derive(Clone)]
pub struct ContactService {
    writer: Arc<dyn ContentWriteRepo>,
    trigger: Arc<InvalidationTrigger>,
}

impl ContactService {
    pub fn new(writer: Arc<dyn ContentWriteRepo>, trigger: Arc<InvalidationTrigger>) -> Self {
        Self { writer, trigger }
    }

    /// Stores a validated submission and returns its id.
    #[instrument(skip_all)]
    pub async fn submit(&self, input: ContactInput, client: ContactClient) -> Result<i64, AppError> {
        input.validate()?;
        let created_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(|err| AppError::unexpected(format!("failed to format timestamp: {err}")))?;

        let document = json!({
            "full_name": input.full_name,
            "email": input.email,
            "subject": input.subject,
            "message": input.message,
            "status": ContactStatus::New,
            "ip_address": client.ip_address,
            "user_agent": client.user_agent,
            "admin_notes": Value::Null,
            "replied_at": Value::Null,
            "created_at": created_at,
        });

        let stored = self.writer.insert(Resource::Contacts, document).await?;
        let id = stored
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| AppError::unexpected("stored contact has no id"))?;

        self.trigger
            .resource_changed(Resource::Contacts, MutationKind::Created)
            .await;
        info!(id, "contact message stored");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::ContentRepo;
    use crate::cache::{CacheConfig, MemoryBackend, VersionStore};
    use crate::infra::memory::MemoryRepositories;
    use std::net::Ipv4Addr;
    use std::num::NonZeroUsize;

    fn input() -> ContactInput {
        ContactInput {
            full_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            message: "Nice portfolio".to_string(),
        }
    }

    #[test]
    fn forwarded_for_takes_first_hop() {
        let client = ContactClient::from_parts(
            Some(" 203.0.113.7 , 10.0.0.1"),
            Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            Some("curl/8"),
        );
        assert_eq!(client.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(client.user_agent.as_deref(), Some("curl/8"));

        let client =
            ContactClient::from_parts(None, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)), None);
        assert_eq!(client.ip_address.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn submission_is_stored_as_new() {
        let backend = Arc::new(MemoryBackend::new(NonZeroUsize::new(16).expect("non-zero")));
        let versions = Arc::new(VersionStore::new(backend, "test"));
        let trigger = Arc::new(InvalidationTrigger::new(CacheConfig::default(), versions));
        let repos = Arc::new(MemoryRepositories::new());
        let service = ContactService::new(repos.clone(), trigger);

        let id = service
            .submit(input(), ContactClient::default())
            .await
            .expect("stored");
        let stored = repos
            .find(Resource::Contacts, id)
            .await
            .expect("find")
            .expect("present");

        assert_eq!(stored["status"], "NEW");
        assert_eq!(stored["email"], "ada@example.com");
        assert_eq!(stored["admin_notes"], Value::Null);
    }

    #[tokio::test]
    async fn invalid_email_is_rejected() {
        let backend = Arc::new(MemoryBackend::new(NonZeroUsize::new(16).expect("non-zero")));
        let versions = Arc::new(VersionStore::new(backend, "test"));
        let trigger = Arc::new(InvalidationTrigger::new(CacheConfig::default(), versions));
        let service = ContactService::new(Arc::new(MemoryRepositories::new()), trigger);

        let err = service
            .submit(
                ContactInput {
                    email: "not-an-email".to_string(),
                    ..input()
                },
                ContactClient::default(),
            )
            .await
            .expect_err("invalid");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }
}
