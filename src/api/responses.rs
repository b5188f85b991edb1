//! Response envelope
//!
//! Every endpoint answers with
//!
//! ```json
//! { "status": "success", "message": "...", "data": {...}, "error": null }
//! ```
//!
//! and failures with `status: "error"` and `error: {code, details}`.
//! Lists are wrapped in [`Paginated`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::api::errors::ApiError;
use crate::models::PagedResult;

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub message: String,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl<T> Envelope<T> {
    pub fn success(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, code: &'static str, details: Option<Value>) -> Self {
        Self {
            status: "error",
            message: message.into(),
            data: None,
            error: Some(ErrorBody { code, details }),
        }
    }
}

/// Successful response: 200 by default, 201 for creates
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: String,
    data: Option<T>,
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: "OK".to_string(),
            data: Some(data),
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: "Created".to_string(),
            data: Some(data),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

impl ApiResponse<()> {
    /// 200 with `data: null`
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(Envelope::success(self.message, self.data)),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

/// `data` of every list endpoint
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> From<PagedResult<T>> for Paginated<T> {
    fn from(page: PagedResult<T>) -> Self {
        let meta = PageMeta {
            total: page.total,
            page: page.page,
            per_page: page.per_page,
            total_pages: page.total_pages(),
        };
        Self {
            items: page.items,
            meta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ListParams;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let body = serde_json::to_value(Envelope::success("OK", Some(json!({ "id": 1 })))).unwrap();
        assert_eq!(
            body,
            json!({ "status": "success", "message": "OK", "data": { "id": 1 }, "error": null })
        );
    }

    #[test]
    fn test_error_envelope_shape() {
        let body = serde_json::to_value(Envelope::<()>::error("Article not found", "not_found", None))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "status": "error",
                "message": "Article not found",
                "data": null,
                "error": { "code": "not_found" }
            })
        );
    }

    #[test]
    fn test_created_status() {
        let response = ApiResponse::created(json!({})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(ApiResponse::message("Done").into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_paginated_meta() {
        let page = PagedResult::new(vec![1, 2], 5, &ListParams::new(1, 2));
        let body = serde_json::to_value(Paginated::from(page)).unwrap();
        assert_eq!(body["items"], json!([1, 2]));
        assert_eq!(
            body["meta"],
            json!({ "total": 5, "page": 1, "per_page": 2, "total_pages": 3 })
        );
    }
}
