//! Error responses and exception reporting
//!
//! [`ExceptionHandler`] owns the mapping from [`ServiceError`] to HTTP status
//! and the log policy for failed requests:
//!
//! | error            | status | logged at |
//! |------------------|--------|-----------|
//! | `NotFound`       | 404    | warn      |
//! | `Unauthorized`   | 401    | warn      |
//! | `Forbidden`      | 403    | warn      |
//! | `Validation`     | 422    | -         |
//! | anything else    | 500    | error     |
//!
//! Internal errors never reach the client; the response carries a generic
//! message and the cause goes to the log together with the request context,
//! after sensitive fields have been redacted.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::api::responses::Envelope;
use crate::services::ServiceError;

pub const REDACTED: &str = "[REDACTED]";
const INTERNAL_MESSAGE: &str = "An unexpected error occurred. Please try again later.";

/// Error half of the response envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    /// Logged, never serialized
    cause: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", message)
    }

    /// Generic 500; `cause` is only logged
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        let mut error = Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            INTERNAL_MESSAGE,
        );
        error.cause = Some(format!("{:#}", cause));
        error
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        ExceptionHandler::render(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        Self::validation(error.body_text())
    }
}

/// What the exception middleware needs to log a failed request. Attached
/// to the response extensions by [`ApiError::into_response`].
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub cause: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = ErrorReport {
            status: self.status,
            code: self.code,
            message: self.message.clone(),
            cause: self.cause,
        };

        let body = Envelope::<()>::error(self.message, self.code, self.details);
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Request data logged alongside a failure
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
    pub query: Value,
    pub body: Value,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    sensitive_fields: HashSet<String>,
}

impl ExceptionHandler {
    /// Field names are matched case-insensitively
    pub fn new<S: AsRef<str>>(sensitive_fields: &[S]) -> Self {
        Self {
            sensitive_fields: sensitive_fields
                .iter()
                .map(|f| f.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn status_for(error: &ServiceError) -> StatusCode {
        match error {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// `None` means the failure is not logged
    pub fn level_for(status: StatusCode) -> Option<LogLevel> {
        match status {
            StatusCode::UNPROCESSABLE_ENTITY => None,
            s if s.is_server_error() => Some(LogLevel::Error),
            _ => Some(LogLevel::Warn),
        }
    }

    pub fn render(error: ServiceError) -> ApiError {
        let status = Self::status_for(&error);
        let code = error.code();
        match error {
            ServiceError::Validation { message, fields } => {
                let error = ApiError::new(status, code, message);
                if fields.is_empty() {
                    error
                } else {
                    error.with_details(json!(fields))
                }
            }
            ServiceError::Internal(cause) => ApiError::internal(cause),
            other => ApiError::new(status, code, other.to_string()),
        }
    }

    /// Replace the value of every sensitive key, at any depth, with
    /// [`REDACTED`]
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, v)| {
                        let v = if self.is_sensitive(key) {
                            Value::String(REDACTED.to_string())
                        } else {
                            self.redact(v)
                        };
                        (key.clone(), v)
                    })
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }

    pub fn is_sensitive(&self, key: &str) -> bool {
        self.sensitive_fields.contains(&key.to_lowercase())
    }

    /// Log a failed request according to the policy table
    pub fn report(&self, report: &ErrorReport, context: &RequestContext) {
        let Some(level) = Self::level_for(report.status) else {
            return;
        };

        let query = self.redact(&context.query);
        let body = self.redact(&context.body);
        match level {
            LogLevel::Warn => tracing::warn!(
                status = report.status.as_u16(),
                code = report.code,
                method = %context.method,
                path = %context.path,
                user_id = ?context.user_id,
                %query,
                %body,
                "{}",
                report.message
            ),
            LogLevel::Error => tracing::error!(
                status = report.status.as_u16(),
                code = report.code,
                method = %context.method,
                path = %context.path,
                user_id = ?context.user_id,
                cause = report.cause.as_deref().unwrap_or(""),
                %query,
                %body,
                "Request failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingConfig;

    fn handler() -> ExceptionHandler {
        ExceptionHandler::new(&LoggingConfig::default().sensitive_fields)
    }

    #[test]
    fn test_status_table() {
        let cases = [
            (ServiceError::not_found("Article"), 404),
            (ServiceError::unauthorized("no"), 401),
            (ServiceError::forbidden("no"), 403),
            (ServiceError::invalid("bad"), 422),
            (ServiceError::Internal(anyhow::anyhow!("boom")), 500),
        ];
        for (error, status) in cases {
            assert_eq!(ExceptionHandler::status_for(&error).as_u16(), status);
        }
    }

    #[test]
    fn test_log_policy() {
        assert_eq!(
            ExceptionHandler::level_for(StatusCode::UNPROCESSABLE_ENTITY),
            None
        );
        assert_eq!(
            ExceptionHandler::level_for(StatusCode::NOT_FOUND),
            Some(LogLevel::Warn)
        );
        assert_eq!(
            ExceptionHandler::level_for(StatusCode::FORBIDDEN),
            Some(LogLevel::Warn)
        );
        assert_eq!(
            ExceptionHandler::level_for(StatusCode::INTERNAL_SERVER_ERROR),
            Some(LogLevel::Error)
        );
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let error = ApiError::from(ServiceError::Internal(anyhow::anyhow!(
            "connection refused at 10.0.0.3"
        )));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.message(), INTERNAL_MESSAGE);

        let response = error.into_response();
        let report = response.extensions().get::<ErrorReport>().unwrap();
        assert!(report.cause.as_deref().unwrap().contains("10.0.0.3"));
    }

    #[test]
    fn test_validation_fields_become_details() {
        let error = ApiError::from(ServiceError::field("email", "The email is invalid"));
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.code(), "validation_failed");
        assert_eq!(
            error.details,
            Some(json!({ "email": ["The email is invalid"] }))
        );
    }

    #[test]
    fn test_redaction_is_recursive() {
        let input = json!({
            "username": "ada",
            "Password": "hunter2",
            "profile": {
                "token": "abc",
                "links": [{ "api_key": "k", "url": "https://example.com" }]
            }
        });

        let redacted = handler().redact(&input);
        assert_eq!(redacted["username"], "ada");
        assert_eq!(redacted["Password"], REDACTED);
        assert_eq!(redacted["profile"]["token"], REDACTED);
        assert_eq!(redacted["profile"]["links"][0]["api_key"], REDACTED);
        assert_eq!(redacted["profile"]["links"][0]["url"], "https://example.com");
    }

    #[test]
    fn test_custom_sensitive_fields() {
        let handler = ExceptionHandler::new(&["ssn"]);
        let redacted = handler.redact(&json!({ "ssn": "123", "password": "x" }));
        assert_eq!(redacted["ssn"], REDACTED);
        assert_eq!(redacted["password"], "x");
    }
}
