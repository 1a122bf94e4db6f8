//! Failure classification.
//!
//! `classify` is pure: the same failure always yields the same
//! classification, and the failure is only borrowed.

use axum::http::StatusCode;
use serde::Serialize;

use super::app::{AppError, ErrorCategory, ValidationDetails};
use super::storage::StorageError;
use super::Failure;

pub const INTERNAL_SERVER_ERROR_CODE: &str = "InternalServerError";
pub const GENERIC_INTERNAL_MESSAGE: &str = "An unexpected error occurred";
pub const STORAGE_UNAVAILABLE_CODE: &str = "StorageServiceUnavailable";

/// Everything the dispatcher needs to log and render one failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub status: StatusCode,
    pub code: String,
    /// Client-safe message.
    pub message: String,
    pub details: Option<ValidationDetails>,
    /// Detail for the log sink only.
    pub internal: Option<String>,
}

impl Classification {
    fn from_app(err: &AppError) -> Self {
        Self {
            category: err.category(),
            status: err.category().status(),
            code: err.code().to_string(),
            message: err.message().to_string(),
            details: err.details().cloned(),
            internal: None,
        }
    }

    fn with_internal(mut self, internal: String) -> Self {
        self.internal = Some(internal);
        self
    }

    fn unrecognized(internal: String) -> Self {
        Self {
            category: ErrorCategory::Unrecognized,
            status: ErrorCategory::Unrecognized.status(),
            code: INTERNAL_SERVER_ERROR_CODE.to_string(),
            message: GENERIC_INTERNAL_MESSAGE.to_string(),
            details: None,
            internal: Some(internal),
        }
    }

    /// The client-facing body.
    pub fn envelope(&self) -> ErrorEnvelope<'_> {
        ErrorEnvelope {
            code: &self.code,
            message: &self.message,
            field_errors: self.details.as_ref().map(|d| &d.field_errors),
            form_errors: self.details.as_ref().map(|d| d.form_errors.as_slice()),
        }
    }
}

/// Uniform error body: `{ code, message, fieldErrors?, formErrors? }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope<'a> {
    pub code: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<&'a std::collections::BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_errors: Option<&'a [String]>,
}

/// Resolve a failure to exactly one of the eight buckets.
pub fn classify(failure: &Failure) -> Classification {
    match failure {
        Failure::App(err) => Classification::from_app(err),
        Failure::Storage(err) => classify_storage(err),
        Failure::Unexpected(err) => Classification::unrecognized(error_chain(&**err)),
        Failure::Panic(payload) => Classification::unrecognized(format!("panic: {payload}")),
    }
}

/// `outer: cause: root cause`
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

fn classify_storage(err: &StorageError) -> Classification {
    let internal = err.to_string();
    match err {
        StorageError::DuplicateKey(_) => Classification::from_app(&AppError::already_exists(
            "Object",
            "Duplicate value for unique field",
        ))
        .with_internal(internal),
        StorageError::Connectivity(_) | StorageError::Timeout(_) => {
            let mut classified = Classification::from_app(&AppError::server(
                STORAGE_UNAVAILABLE_CODE,
                "Error connecting to the storage server",
            ))
            .with_internal(internal);
            classified.status = StatusCode::SERVICE_UNAVAILABLE;
            classified
        }
        StorageError::SchemaValidation(_) => Classification::from_app(&AppError::invalid_argument(
            "Object",
            "Validation failed for one or more fields",
        ))
        .with_internal(internal),
        StorageError::MalformedIdentifier(_) => Classification::from_app(
            &AppError::invalid_argument("Object", "Invalid identifier or value for field"),
        )
        .with_internal(internal),
        StorageError::Other(_) => Classification::unrecognized(internal),
    }
}
