use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::{pagination::PaginationError, repos::RepoError},
    cache::QueryError,
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Diagnostic chain attached to error responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Pagination(#[from] PaginationError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("resource not found")]
    NotFound,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::NotFound { .. })
            | AppError::Repo(RepoError::NotFound)
            | AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Domain(DomainError::Validation { .. })
            | AppError::Repo(RepoError::InvalidInput { .. })
            | AppError::Query(QueryError::TooManyRows { .. })
            | AppError::Pagination(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Query(QueryError::Repo(err)) => repo_status(err),
            AppError::Repo(err) => repo_status(err),
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn presentation_message(&self) -> &'static str {
        match self.status_code() {
            StatusCode::NOT_FOUND => "Resource not found",
            StatusCode::BAD_REQUEST => "Request could not be processed",
            StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable",
            _ => "Unexpected error occurred",
        }
    }

    /// Detail safe to show to API clients; only client errors carry one.
    pub fn public_detail(&self) -> Option<String> {
        self.status_code()
            .is_client_error()
            .then(|| self.to_string())
    }
}

fn repo_status(err: &RepoError) -> StatusCode {
    match err {
        RepoError::NotFound => StatusCode::NOT_FOUND,
        RepoError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        RepoError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        RepoError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpaginated_overflow_is_a_client_error() {
        let err = AppError::from(QueryError::TooManyRows {
            resource: "blogs",
            rows: 2_000,
            limit: 1_000,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.public_detail().is_some_and(|detail| detail.contains("2000")));
    }

    #[test]
    fn persistence_failures_hide_detail() {
        let err = AppError::from(RepoError::from_persistence("connection reset"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.presentation_message(), "Unexpected error occurred");
        assert!(err.public_detail().is_none());
    }

    #[test]
    fn missing_documents_map_to_not_found() {
        assert_eq!(
            AppError::from(DomainError::not_found("blogs")).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(RepoError::NotFound).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
