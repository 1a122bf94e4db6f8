//! Request-handling spine for a JSON API service.
//!
//! Handlers return `Result<_, Failure>`; the pipeline around them assigns a
//! request id, traces the request, enforces admission control, and turns
//! every failure into one uniform response and one log record.

pub mod config;
pub mod errors;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::Settings;
pub use errors::{AppError, Failure};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
