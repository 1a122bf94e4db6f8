//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured, field-keyed)
//!     → metrics.rs (counters)
//!
//! logging.rs routes events, per environment, to:
//!     → console (dev / test)
//!     → rotating file, error file, store.rs, fault files (prod)
//!
//! faults.rs feeds the fault files:
//!     → panic hook (uncaught faults)
//!     → supervised background tasks (rejections)
//! ```
//!
//! # Design Decisions
//! - Destinations are chosen once at startup and never reconfigured
//! - Request id flows into every record through the request span
//! - Writers are non-blocking; the request path never waits on I/O for logs

pub mod faults;
pub mod logging;
pub mod metrics;
pub mod spans;
pub mod store;

pub use logging::{init, Destination, DestinationPlan, LogHandle, LoggingError};
