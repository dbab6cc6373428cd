//! JSON envelope shared by every route.
//!
//! Success bodies are `{status: "SUCCESS", message, data}`; failures are
//! `{status: "ERROR", message, errors?}` and carry an `ErrorReport` for the
//! logging middleware.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::application::error::{AppError, ErrorReport};
use crate::cache::PageEnvelope;

const STATUS_SUCCESS: &str = "SUCCESS";
const STATUS_ERROR: &str = "ERROR";
const MESSAGE_OK: &str = "OK";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: STATUS_SUCCESS,
            message: MESSAGE_OK,
            data: Some(data),
            errors: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// `201 Created` with the envelope.
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::ok(data))).into_response()
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Paging {
    pub total_rows: u64,
    pub page: u64,
    pub page_size: u64,
}

/// List payload: the rows of one page plus where that page sits.
#[derive(Debug, Serialize)]
pub struct ListData {
    pub data_list: Vec<Value>,
    pub paging: Paging,
}

impl From<PageEnvelope> for ListData {
    fn from(envelope: PageEnvelope) -> Self {
        Self {
            paging: Paging {
                total_rows: envelope.total_rows,
                page: envelope.page,
                page_size: envelope.page_size,
            },
            data_list: envelope.items,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    source: &'static str,
    error: AppError,
}

impl ApiError {
    pub fn new(source: &'static str, error: impl Into<AppError>) -> Self {
        Self {
            source,
            error: error.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(error: AppError) -> Self {
        Self::new("infra::http", error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        let body = ApiResponse::<()> {
            status: STATUS_ERROR,
            message: self.error.presentation_message(),
            data: None,
            errors: self.error.public_detail().map(Value::String),
        };
        let mut response = (status, Json(body)).into_response();
        ErrorReport::from_error(self.source, status, &self.error).attach(&mut response);
        response
    }
}
