//! Configuration schema definitions.
//!
//! This module defines the complete, validated settings structure. Values are
//! produced by `loader.rs` from the process environment and never change after
//! startup.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

/// Deployment environment (`NODE_ENV`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Dev,
    Test,
    Prod,
}

impl Environment {
    /// Parse a `NODE_ENV` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "dev" => Some(Environment::Dev),
            "test" => Some(Environment::Test),
            "prod" => Some(Environment::Prod),
            _ => None,
        }
    }

    /// Canonical name, as accepted by [`Environment::parse`].
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Prod => "prod",
        }
    }

    /// Whether production log destinations apply.
    pub fn is_production(self) -> bool {
        self == Environment::Prod
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value that must never appear in logs.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    /// Wrap a sensitive value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Never log it.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Root settings for the service.
#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: Environment,
    pub server: ServerSettings,
    pub frontend: FrontendUrls,
    pub security: SecuritySettings,
    pub rate_limit: RateLimitSettings,
    pub mailer: MailerSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
    /// Prometheus exporter bind address; exporter disabled when unset.
    pub metrics_address: Option<SocketAddr>,
}

/// Listener and routing settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub port: u16,
    /// API version segment, e.g. `v1` in `/api/v1/...`.
    pub api_version: String,
    pub request_timeout: Duration,
}

impl ServerSettings {
    /// Path of the liveness endpoint, exempt from admission control.
    pub fn health_path(&self) -> String {
        format!("/api/{}/health", self.api_version)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            api_version: "v1".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Outward-facing URLs handed to mail collaborators.
#[derive(Debug, Clone)]
pub struct FrontendUrls {
    pub verification: Url,
    pub password_recovery: Url,
    pub unlock_account: Url,
}

#[derive(Debug, Clone)]
pub struct SecuritySettings {
    /// Password hashing work factor (8..=15).
    pub salt_rounds: u32,
    pub allowed_origins: Vec<String>,
    pub jwt_secret: Secret,
    pub jwt_expires: Duration,
}

/// Admission control settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub window_minutes: u64,
    pub max_requests: u32,
}

impl RateLimitSettings {
    /// Window length as a duration.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes * 60)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            window_minutes: 15,
            max_requests: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    /// Connection URI; holds credentials.
    pub uri: Secret,
}

/// Log destination settings.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub environment: Environment,
    /// Directory for production log files.
    pub dir: String,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub level: String,
    /// Collector endpoint for the external log store (production only).
    pub store_url: Option<Url>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            environment: Environment::Dev,
            dir: "logs".to_string(),
            level: "info".to_string(),
            store_url: None,
        }
    }
}
