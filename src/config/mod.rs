//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! .env file (optional) → process environment
//!     → loader.rs (read every variable, apply defaults)
//!     → validation.rs (digits, ranges, URLs, choices)
//!     → Settings (validated, immutable)
//!     → shared by reference with every subsystem
//! ```
//!
//! # Design Decisions
//! - Settings are read once; an invalid environment is fatal at startup
//! - Every problem is reported in one pass
//! - Secrets are wrapped so `Debug` output is safe to log

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_from_env, load_from_vars, load_with_env_file, ConfigError};
pub use schema::{
    Environment, LoggingSettings, RateLimitSettings, Secret, ServerSettings, Settings,
};
pub use validation::ValidationError;
