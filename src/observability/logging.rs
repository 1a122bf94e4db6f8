//! Structured logging.
//!
//! # Responsibilities
//! - Choose the destination set from the deployment environment, once
//! - Install the process-wide subscriber
//! - Hand back a [`LogHandle`] that flushes every destination on shutdown
//!
//! # Destinations
//! | Environment | Destinations |
//! |---|---|
//! | dev / test | console |
//! | prod | rotating file, error file, external store, uncaught-fault file, rejection file |

use std::path::{Path, PathBuf};

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{Level, Metadata};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::{filter_fn, LevelFilter, ParseError, Targets},
    fmt::time::ChronoLocal,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

use crate::config::{Environment, LoggingSettings};
use crate::observability::faults::{self, REJECTION_TARGET, UNCAUGHT_TARGET};
use crate::observability::store::{
    HttpLogStore, StoreError, StoreLayer, StoreShipper, QUEUE_CAPACITY, STORE_TARGET,
};

const TIMESTAMP_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
const APP_LOG_FILE: &str = "api-spine.log";
const ERROR_LOG_FILE: &str = "error.log";
const EXCEPTIONS_LOG_FILE: &str = "exceptions.log";
const REJECTIONS_LOG_FILE: &str = "rejections.log";
const MAX_FILE_BYTES: u64 = 20 * 1024 * 1024;
const MAX_ROLLED_FILES: usize = 14;

/// A single log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Human-readable stream on stdout.
    Console,
    /// Every record, rolled daily or at 20 MiB; 14 rolled files kept.
    RotatingFile,
    /// ERROR records only.
    ErrorFile,
    /// INFO and above, shipped off-host.
    ExternalStore,
    /// Panics.
    UncaughtFaults,
    /// Failed or panicked background tasks.
    Rejections,
}

/// The destination set for one process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPlan {
    environment: Environment,
    destinations: Vec<Destination>,
}

impl DestinationPlan {
    /// Destination set for `environment`.
    pub fn for_environment(environment: Environment) -> Self {
        let destinations = match environment {
            Environment::Dev | Environment::Test => vec![Destination::Console],
            Environment::Prod => vec![
                Destination::RotatingFile,
                Destination::ErrorFile,
                Destination::ExternalStore,
                Destination::UncaughtFaults,
                Destination::Rejections,
            ],
        };
        Self {
            environment,
            destinations,
        }
    }

    /// Environment the plan was built for.
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Active destinations, in install order.
    pub fn destinations(&self) -> &[Destination] {
        &self.destinations
    }

    /// Whether `destination` is active.
    pub fn contains(&self, destination: Destination) -> bool {
        self.destinations.contains(&destination)
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("logging is already initialized")]
    AlreadyInitialized(#[from] TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot open log file: {0}")]
    Appender(#[from] InitError),

    #[error("the external log store needs a collector URL")]
    MissingStoreUrl,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Keeps the active destinations alive; flushes them on shutdown.
pub struct LogHandle {
    plan: DestinationPlan,
    guards: Vec<WorkerGuard>,
    shipper: Option<StoreShipper>,
}

impl LogHandle {
    /// The destination plan in effect.
    pub fn plan(&self) -> &DestinationPlan {
        &self.plan
    }

    /// Drain the external store queue and flush the file writers.
    pub async fn shutdown(self) {
        if let Some(shipper) = self.shipper {
            shipper.close().await;
        }
        drop(self.guards);
    }
}

fn timer() -> ChronoLocal {
    ChronoLocal::new(TIMESTAMP_FORMAT.to_string())
}

fn env_filter(level: &str) -> Result<EnvFilter, ParseError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level),
    }
}

fn ensure_dir(dir: &Path) -> Result<(), LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::File {
        path: dir.to_path_buf(),
        source,
    })
}

/// Size- and age-bounded appender for the application log.
fn rotating_appender(dir: &Path, max_bytes: u64) -> Result<BasicRollingFileAppender, LoggingError> {
    let path = dir.join(APP_LOG_FILE);
    let condition = RollingConditionBasic::new().daily().max_size(max_bytes);
    BasicRollingFileAppender::new(&path, condition, MAX_ROLLED_FILES)
        .map_err(|source| LoggingError::File { path, source })
}

fn rotating_writer(dir: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let appender = rotating_appender(dir, MAX_FILE_BYTES)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn plain_writer(dir: &Path, file: &str) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file)
        .build(dir)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn only_target(target: &'static str) -> Targets {
    Targets::new().with_target(target, Level::ERROR)
}

fn store_filter(metadata: &Metadata<'_>) -> bool {
    *metadata.level() <= Level::INFO && !metadata.target().starts_with(STORE_TARGET)
}

/// Install the global subscriber for the configured environment.
///
/// Must run inside a Tokio runtime when the plan includes the external
/// store. Fails if a global subscriber is already installed.
pub fn init(settings: &LoggingSettings) -> Result<LogHandle, LoggingError> {
    let plan = DestinationPlan::for_environment(settings.environment);
    let filter = env_filter(&settings.level)?;
    let dir = Path::new(&settings.dir);
    let mut guards = Vec::new();

    let console = if plan.contains(Destination::Console) {
        Some(
            tracing_subscriber::fmt::layer()
                .with_timer(timer())
                .with_target(true)
                .compact(),
        )
    } else {
        None
    };

    let needs_files = plan.destinations().iter().any(|d| {
        matches!(
            d,
            Destination::RotatingFile
                | Destination::ErrorFile
                | Destination::UncaughtFaults
                | Destination::Rejections
        )
    });
    if needs_files {
        ensure_dir(dir)?;
    }

    let rotating = if plan.contains(Destination::RotatingFile) {
        let (writer, guard) = rotating_writer(dir)?;
        guards.push(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer())
                .with_current_span(true)
                .with_ansi(false)
                .with_writer(writer),
        )
    } else {
        None
    };

    let error_file = if plan.contains(Destination::ErrorFile) {
        let (writer, guard) = plain_writer(dir, ERROR_LOG_FILE)?;
        guards.push(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(LevelFilter::ERROR),
        )
    } else {
        None
    };

    let exceptions = if plan.contains(Destination::UncaughtFaults) {
        let (writer, guard) = plain_writer(dir, EXCEPTIONS_LOG_FILE)?;
        guards.push(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(only_target(UNCAUGHT_TARGET)),
        )
    } else {
        None
    };

    let rejections = if plan.contains(Destination::Rejections) {
        let (writer, guard) = plain_writer(dir, REJECTIONS_LOG_FILE)?;
        guards.push(guard);
        Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_timer(timer())
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(only_target(REJECTION_TARGET)),
        )
    } else {
        None
    };

    let (store, shipper) = if plan.contains(Destination::ExternalStore) {
        let url = settings
            .store_url
            .clone()
            .ok_or(LoggingError::MissingStoreUrl)?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let shipper = StoreShipper::spawn(HttpLogStore::new(url)?, rx);
        (
            Some(StoreLayer::new(tx).with_filter(filter_fn(store_filter))),
            Some(shipper),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(rotating)
        .with(error_file)
        .with(exceptions)
        .with(rejections)
        .with(store)
        .try_init()?;

    faults::install_panic_hook();

    tracing::info!(
        environment = %plan.environment(),
        destinations = ?plan.destinations(),
        "Logging initialized"
    );

    Ok(LogHandle {
        plan,
        guards,
        shipper,
    })
}
