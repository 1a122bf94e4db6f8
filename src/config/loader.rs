//! Configuration loading from the process environment.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::{
    Environment, FrontendUrls, LoggingSettings, MailerSettings, RateLimitSettings, Secret,
    SecuritySettings, ServerSettings, Settings, StorageSettings,
};
use crate::config::validation::{EnvReader, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("invalid environment variables: {}", join(.0))]
    Invalid(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Prime the environment from a `.env` file, then load.
///
/// A missing default `.env` is not an error; an explicitly named file is.
pub fn load_with_env_file(path: Option<&Path>) -> Result<Settings, ConfigError> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)?;
        }
        None => match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        },
    }
    load_from_env()
}

/// Load and validate settings from the current process environment.
pub fn load_from_env() -> Result<Settings, ConfigError> {
    load_from_vars(std::env::vars())
}

/// Load and validate settings from an explicit variable set.
pub fn load_from_vars<I, K, V>(vars: I) -> Result<Settings, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut env = EnvReader::new(vars);

    let environment = match env.optional("NODE_ENV") {
        None => Environment::default(),
        Some(raw) => Environment::parse(&raw).unwrap_or_else(|| {
            env.fail(ValidationError::InvalidChoice {
                var: "NODE_ENV",
                allowed: "dev, test, prod",
            });
            Environment::default()
        }),
    };

    let server = ServerSettings {
        port: env.number_or("PORT", 3000),
        api_version: env.string_or("API_VERSION", "v1"),
        request_timeout: Duration::from_secs(env.number_or("REQUEST_TIMEOUT_SECS", 30)),
    };

    let frontend = (
        env.url("FRONTEND_VERIFICATION_URL"),
        env.url("FRONTEND_PASSWORD_RECOVERY_URL"),
        env.url("FRONTEND_UNLOCK_ACCOUNT_URL"),
    );

    let salt_rounds = env.bounded_or("SALT_ROUNDS", 11, 8, 15) as u32;
    let allowed_origins: Vec<String> = env
        .required("ALLOWED_ORIGINS")
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect();
    let security = SecuritySettings {
        salt_rounds,
        allowed_origins,
        jwt_secret: Secret::new(env.required("JWT_SECRET")),
        jwt_expires: Duration::from_secs(env.number_or("JWT_EXPIRES", 3600)),
    };

    let rate_limit = RateLimitSettings {
        window_minutes: env.bounded_or("RATE_LIMIT_WINDOW_MINUTES", 15, 1, 24 * 60),
        max_requests: env.bounded_or("RATE_LIMIT_MAX_REQUESTS", 100, 1, u64::from(u32::MAX)) as u32,
    };

    let mailer = MailerSettings {
        host: env.required("MAILER_HOST"),
        port: env.number_or("MAILER_PORT", 587),
        username: env.required("MAILER_USERNAME"),
        password: Secret::new(env.required("MAILER_PASSWORD")),
    };

    let storage = StorageSettings {
        uri: Secret::new(env.required("MONGODB_URI")),
    };

    let store_url = match env.optional("LOG_STORE_URL") {
        Some(raw) => env.parse_url("LOG_STORE_URL", &raw),
        None if environment.is_production() => {
            env.fail(ValidationError::Missing("LOG_STORE_URL"));
            None
        }
        None => None,
    };
    let logging = LoggingSettings {
        environment,
        dir: env.string_or("LOG_DIR", "logs"),
        level: env.string_or("LOG_LEVEL", "info"),
        store_url,
    };

    let metrics_address = env.optional("METRICS_ADDRESS").and_then(|raw| {
        raw.parse::<SocketAddr>()
            .map_err(|_| {
                env.fail(ValidationError::InvalidAddress {
                    var: "METRICS_ADDRESS",
                })
            })
            .ok()
    });

    env.finish().map_err(ConfigError::Invalid)?;

    let (Some(verification), Some(password_recovery), Some(unlock_account)) = frontend else {
        // finish() already reported the missing URLs
        return Err(ConfigError::Invalid(Vec::new()));
    };

    Ok(Settings {
        environment,
        server,
        frontend: FrontendUrls {
            verification,
            password_recovery,
            unlock_account,
        },
        security,
        rate_limit,
        mailer,
        storage,
        logging,
        metrics_address,
    })
}

#[cfg(test)]
pub(crate) fn minimal_vars() -> Vec<(&'static str, &'static str)> {
    vec![
        ("FRONTEND_VERIFICATION_URL", "https://app.example.com/verify"),
        ("FRONTEND_PASSWORD_RECOVERY_URL", "https://app.example.com/recover"),
        ("FRONTEND_UNLOCK_ACCOUNT_URL", "https://app.example.com/unlock"),
        ("ALLOWED_ORIGINS", "https://app.example.com, https://admin.example.com"),
        ("JWT_SECRET", "s3cret"),
        ("MAILER_HOST", "smtp.example.com"),
        ("MAILER_USERNAME", "mailer"),
        ("MAILER_PASSWORD", "mailer-pw"),
        ("MONGODB_URI", "mongodb://user:pw@localhost:27017/app"),
    ]
}
