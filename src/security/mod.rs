//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (CORS preflight, security response headers)
//!     → identity.rs (authenticated email, else peer IP)
//!     → rate_limit.rs (per-identity window; 429 when exhausted)
//!     → Pass to routes
//! ```
//!
//! # Design Decisions
//! - The health path bypasses admission control by exact match only
//! - The gate never fails a request for its own reasons: an unresolvable
//!   identity falls back to the network origin

pub mod headers;
pub mod identity;
pub mod rate_limit;

pub use identity::{AuthenticatedUser, IdentityResolver};
pub use rate_limit::{admission_middleware, AdmissionGate, Decision, Quota};
