//! Error dispatch: the single place error responses are written.
//!
//! # Responsibilities
//! - Classify the failure
//! - Emit exactly one log record for it
//! - Render the uniform envelope with the category's status
//!
//! # Design Decisions
//! - Handlers return `Result<_, Failure>`; `IntoResponse for Failure` is the
//!   dispatcher, so `?` is the only propagation path
//! - Internal detail goes to the log record only
//! - Runs inside the request span, so records carry request id, method, path

use std::any::Any;

use axum::{
    body::Body,
    http::{Request, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::errors::{classify, AppError, Classification, Failure};
use crate::observability::{
    faults::{panic_message, within_request},
    metrics,
};

/// Classify, log and render one failure.
pub fn dispatch(failure: &Failure) -> Response {
    let classified = classify(failure);
    record(&classified);
    render(&classified)
}

fn record(classified: &Classification) {
    let status = classified.status.as_u16();
    let category = classified.category.as_str();
    metrics::record_error(category, status);

    if classified.category.is_incident() {
        tracing::error!(
            code = %classified.code,
            status,
            category,
            detail = classified.internal.as_deref().unwrap_or(&classified.message),
            "[{}] {}",
            classified.code,
            classified.message
        );
        return;
    }

    match &classified.details {
        Some(details) => tracing::warn!(
            code = %classified.code,
            status,
            category,
            field_errors = ?details.field_errors,
            form_errors = ?details.form_errors,
            "[{}] {}",
            classified.code,
            classified.message
        ),
        None => tracing::warn!(
            code = %classified.code,
            status,
            category,
            detail = classified.internal.as_deref(),
            "[{}] {}",
            classified.code,
            classified.message
        ),
    }
}

fn render(classified: &Classification) -> Response {
    (classified.status, Json(classified.envelope())).into_response()
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        dispatch(&self)
    }
}

/// Fallback for unmatched routes.
pub async fn not_found(uri: Uri) -> Failure {
    AppError::not_found("Uri", format!("Can't find the {} on the server", uri)).into()
}

/// Marks the request as handled so a panic below is reported only by
/// [`handle_panic`]. Must sit directly inside `CatchPanicLayer`.
pub async fn panic_scope(request: Request<Body>, next: Next) -> Response {
    within_request(next.run(request)).await
}

/// Panic handler for `CatchPanicLayer`: panics become unrecognized faults.
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    dispatch(&Failure::Panic(panic_message(payload.as_ref())))
}
