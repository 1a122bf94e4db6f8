//! HTTP request pipeline.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → request.rs (request id, deadline)
//!     → observability::spans (request span)
//!     → security (CORS, headers, admission gate)
//!     → routes (health.rs + caller-supplied routes)
//!     → dispatch.rs (any Failure → envelope + one log record)
//!     → Send to client
//! ```

pub mod dispatch;
pub mod health;
pub mod request;
pub mod server;

pub use dispatch::dispatch;
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
