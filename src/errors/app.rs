//! Typed application errors raised by handlers and services.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// The closed set of failure kinds a request can end in.
///
/// Declaration order is the classification order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    NotAuthorized,
    Forbidden,
    ServerError,
    ValidationError,
    /// Anything that is not one of ours. Always rendered as a generic 500.
    Unrecognized,
}

impl ErrorCategory {
    /// Transport status for the category.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::AlreadyExists => StatusCode::CONFLICT,
            ErrorCategory::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorCategory::NotAuthorized => StatusCode::UNAUTHORIZED,
            ErrorCategory::Forbidden => StatusCode::FORBIDDEN,
            ErrorCategory::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCategory::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCategory::Unrecognized => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::AlreadyExists => "AlreadyExists",
            ErrorCategory::InvalidArgument => "InvalidArgument",
            ErrorCategory::NotAuthorized => "NotAuthorized",
            ErrorCategory::Forbidden => "Forbidden",
            ErrorCategory::ServerError => "ServerError",
            ErrorCategory::ValidationError => "ValidationError",
            ErrorCategory::Unrecognized => "Unrecognized",
        }
    }

    /// Caller input problems are expected traffic; the rest are incidents.
    pub fn is_incident(self) -> bool {
        matches!(self, ErrorCategory::ServerError | ErrorCategory::Unrecognized)
    }
}

/// Field-level and form-level validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationDetails {
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub form_errors: Vec<String>,
}

impl ValidationDetails {
    /// Empty detail set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation against a named field.
    pub fn field(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors
            .entry(name.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record a violation that does not belong to a single field.
    pub fn form(mut self, message: impl Into<String>) -> Self {
        self.form_errors.push(message.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty() && self.form_errors.is_empty()
    }
}

/// An application error: a stable `code` plus a client-safe `message`.
///
/// Codes for the object-scoped categories are built from an object name and
/// the category suffix, so `AppError::not_found("User", ..)` carries
/// `UserNotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("[{code}] {message}")]
    NotFound { code: String, message: String },

    #[error("[{code}] {message}")]
    AlreadyExists { code: String, message: String },

    #[error("[{code}] {message}")]
    InvalidArgument { code: String, message: String },

    #[error("[{code}] {message}")]
    NotAuthorized { code: String, message: String },

    #[error("[{code}] {message}")]
    Forbidden { code: String, message: String },

    #[error("[{code}] {message}")]
    ServerError { code: String, message: String },

    #[error("[ValidationError] {message}")]
    Validation {
        message: String,
        details: ValidationDetails,
    },
}

pub const VALIDATION_ERROR_CODE: &str = "ValidationError";

fn scoped_code(object: &str, suffix: &str) -> String {
    let object = object.trim();
    if object.is_empty() {
        format!("Object{suffix}")
    } else {
        format!("{object}{suffix}")
    }
}

impl AppError {
    /// `<Object>NotFound`, 404.
    pub fn not_found(object: &str, message: impl Into<String>) -> Self {
        AppError::NotFound {
            code: scoped_code(object, "NotFound"),
            message: message.into(),
        }
    }

    /// `<Object>AlreadyExists`, 409.
    pub fn already_exists(object: &str, message: impl Into<String>) -> Self {
        AppError::AlreadyExists {
            code: scoped_code(object, "AlreadyExists"),
            message: message.into(),
        }
    }

    /// `<Object>InvalidArgument`, 400.
    pub fn invalid_argument(object: &str, message: impl Into<String>) -> Self {
        AppError::InvalidArgument {
            code: scoped_code(object, "InvalidArgument"),
            message: message.into(),
        }
    }

    /// `<Object>NotAuthorized`, 401.
    pub fn not_authorized(object: &str, message: impl Into<String>) -> Self {
        AppError::NotAuthorized {
            code: scoped_code(object, "NotAuthorized"),
            message: message.into(),
        }
    }

    /// `<Object>Forbidden`, 403.
    pub fn forbidden(object: &str, message: impl Into<String>) -> Self {
        AppError::Forbidden {
            code: scoped_code(object, "Forbidden"),
            message: message.into(),
        }
    }

    /// Internal fault with a caller-chosen code; an empty code falls back to
    /// `ServerError`.
    pub fn server(code: &str, message: impl Into<String>) -> Self {
        let code = if code.trim().is_empty() {
            "ServerError".to_string()
        } else {
            code.to_string()
        };
        AppError::ServerError {
            code,
            message: message.into(),
        }
    }

    /// `ValidationError`, 400, with field and form detail.
    pub fn validation(message: impl Into<String>, details: ValidationDetails) -> Self {
        AppError::Validation {
            message: message.into(),
            details,
        }
    }

    /// Category this error belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AppError::NotFound { .. } => ErrorCategory::NotFound,
            AppError::AlreadyExists { .. } => ErrorCategory::AlreadyExists,
            AppError::InvalidArgument { .. } => ErrorCategory::InvalidArgument,
            AppError::NotAuthorized { .. } => ErrorCategory::NotAuthorized,
            AppError::Forbidden { .. } => ErrorCategory::Forbidden,
            AppError::ServerError { .. } => ErrorCategory::ServerError,
            AppError::Validation { .. } => ErrorCategory::ValidationError,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            AppError::NotFound { code, .. }
            | AppError::AlreadyExists { code, .. }
            | AppError::InvalidArgument { code, .. }
            | AppError::NotAuthorized { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::ServerError { code, .. } => code,
            AppError::Validation { .. } => VALIDATION_ERROR_CODE,
        }
    }

    /// Client-safe message.
    pub fn message(&self) -> &str {
        match self {
            AppError::NotFound { message, .. }
            | AppError::AlreadyExists { message, .. }
            | AppError::InvalidArgument { message, .. }
            | AppError::NotAuthorized { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::ServerError { message, .. }
            | AppError::Validation { message, .. } => message,
        }
    }

    /// Validation detail, for `ValidationError` only.
    pub fn details(&self) -> Option<&ValidationDetails> {
        match self {
            AppError::Validation { details, .. } => Some(details),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_codes() {
        assert_eq!(AppError::not_found("User", "no such user").code(), "UserNotFound");
        assert_eq!(AppError::already_exists("Ticket", "dup").code(), "TicketAlreadyExists");
        assert_eq!(AppError::invalid_argument("", "bad").code(), "ObjectInvalidArgument");
        assert_eq!(AppError::not_authorized("Token", "expired").code(), "TokenNotAuthorized");
        assert_eq!(AppError::forbidden("Admin", "nope").code(), "AdminForbidden");
    }

    #[test]
    fn test_server_code_is_verbatim() {
        assert_eq!(AppError::server("MailerDown", "x").code(), "MailerDown");
        assert_eq!(AppError::server("  ", "x").code(), "ServerError");
    }

    #[test]
    fn test_validation_details_builder() {
        let details = ValidationDetails::new()
            .field("email", "required")
            .field("email", "must be an email")
            .form("passwords do not match");
        assert_eq!(details.field_errors["email"].len(), 2);
        assert_eq!(details.form_errors, vec!["passwords do not match".to_string()]);

        let err = AppError::validation("Invalid signup", details.clone());
        assert_eq!(err.code(), VALIDATION_ERROR_CODE);
        assert_eq!(err.category(), ErrorCategory::ValidationError);
        assert_eq!(err.details(), Some(&details));
    }

    #[test]
    fn test_category_status_table() {
        let table = [
            (ErrorCategory::NotFound, 404),
            (ErrorCategory::AlreadyExists, 409),
            (ErrorCategory::InvalidArgument, 400),
            (ErrorCategory::NotAuthorized, 401),
            (ErrorCategory::Forbidden, 403),
            (ErrorCategory::ServerError, 500),
            (ErrorCategory::ValidationError, 400),
            (ErrorCategory::Unrecognized, 500),
        ];
        for (category, status) in table {
            assert_eq!(category.status().as_u16(), status, "{}", category.as_str());
        }
    }
}
