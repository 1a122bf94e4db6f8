//! Error taxonomy.
//!
//! # Data Flow
//! ```text
//! handler / validator / storage driver
//!     → app.rs (typed AppError) or storage.rs (driver fault)
//!     → Failure (closed set of everything a request can fail with)
//!     → classify.rs (pure: Failure → Classification)
//!     → http::dispatch (log + respond, exactly once)
//! ```
//!
//! # Design Decisions
//! - Every category maps to exactly one status; overrides only come from
//!   collaborator-specific rules (storage connectivity → 503)
//! - Classification never mutates or consumes the failure
//! - Internal detail lives on `Classification::internal`, never in the envelope

pub mod app;
pub mod classify;
pub mod storage;

use axum::extract::rejection::JsonRejection;
use thiserror::Error;

pub use app::{AppError, ErrorCategory, ValidationDetails};
pub use classify::{classify, Classification, ErrorEnvelope};
pub use storage::StorageError;

/// Any failure that can reach the error dispatcher.
#[derive(Debug, Error)]
pub enum Failure {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("storage fault: {0}")]
    Storage(#[from] StorageError),

    #[error("unexpected fault: {0}")]
    Unexpected(Box<dyn std::error::Error + Send + Sync>),

    /// A handler panicked; the payload is kept for the log only.
    #[error("panic: {0}")]
    Panic(String),
}

impl Failure {
    /// Wrap any foreign error as an unrecognized fault.
    pub fn unexpected<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Failure::Unexpected(Box::new(err))
    }
}

impl From<JsonRejection> for Failure {
    fn from(rejection: JsonRejection) -> Self {
        Failure::App(AppError::invalid_argument("Body", rejection.body_text()))
    }
}
