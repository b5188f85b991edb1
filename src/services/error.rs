//! Service error type
//!
//! Every service returns [`ServiceResult`]. The HTTP layer maps each variant
//! to a status code; see `api::errors`.

use std::collections::BTreeMap;

/// Field name to the messages reported against it
pub type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    Validation { message: String, fields: FieldErrors },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// `"{entity} not found"`
    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{} not found", entity))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Validation failure without field detail
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: FieldErrors::new(),
        }
    }

    /// Validation failure on a single field
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.clone()]);
        Self::Validation { message, fields }
    }

    /// Stable machine-readable code for the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Validation { .. } => "validation_failed",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Collects field errors before deciding whether input is valid
#[derive(Debug, Default)]
pub struct Validator {
    fields: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Record `message` against `field` unless `ok` holds
    pub fn check(&mut self, ok: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if !ok {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn finish(self) -> ServiceResult<()> {
        if self.fields.is_empty() {
            return Ok(());
        }
        Err(ServiceError::Validation {
            message: "The given data was invalid".to_string(),
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_carries_field() {
        match ServiceError::field("email", "Email is taken") {
            ServiceError::Validation { message, fields } => {
                assert_eq!(message, "Email is taken");
                assert_eq!(fields["email"], vec!["Email is taken".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_validator_collects_all_failures() {
        let mut v = Validator::new();
        v.check(false, "username", "too short")
            .check(true, "email", "bad")
            .check(false, "password", "too short");
        v.add("username", "bad characters");

        let err = v.finish().unwrap_err();
        match err {
            ServiceError::Validation { fields, .. } => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields["username"].len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_validator_passes() {
        assert!(Validator::new().finish().is_ok());
    }

    #[test]
    fn test_internal_from_anyhow() {
        let err: ServiceError = anyhow::anyhow!("db down").into();
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.to_string(), "db down");
    }
}
