//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Settings → logging → metrics → bind → serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → stop accepting → drain requests → flush logs → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: logging before anything that can fail loudly
//! - Listener binds last, so traffic only arrives once the pipeline is ready
//! - Log destinations are flushed after the server has drained

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{run, StartupError};
