//! Startup orchestration.
//!
//! # Responsibilities
//! - Install logging for the configured environment
//! - Start the metrics exporter when configured
//! - Bind the listener and serve until a termination signal
//! - Flush every log destination on the way out
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::net::{Ipv4Addr, SocketAddr};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::http::HttpServer;
use crate::lifecycle::{shutdown::Shutdown, signals::wait_for_termination};
use crate::observability::{self, metrics, LoggingError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bring the service up around `routes` and run it to completion.
pub async fn run(settings: Settings, routes: Router) -> Result<(), StartupError> {
    let log_handle = observability::init(&settings.logging)?;

    let result = serve(&settings, routes).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Service stopped with an error");
    }

    tracing::info!("Shutdown complete");
    log_handle.shutdown().await;
    result
}

async fn serve(settings: &Settings, routes: Router) -> Result<(), StartupError> {
    tracing::info!(
        environment = %settings.environment,
        port = settings.server.port,
        api_version = %settings.server.api_version,
        rate_limit_window_minutes = settings.rate_limit.window_minutes,
        rate_limit_max_requests = settings.rate_limit.max_requests,
        "Configuration loaded"
    );

    if let Some(addr) = settings.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.server.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let shutdown = Shutdown::new();
    let server = HttpServer::new(settings, routes);
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    let joined = tokio::select! {
        joined = &mut server_task => joined,
        signal = wait_for_termination() => {
            match signal {
                Ok(name) => tracing::info!(signal = name, "Termination signal received"),
                Err(e) => tracing::error!(error = %e, "Cannot listen for signals, shutting down"),
            }
            shutdown.trigger();
            server_task.await
        }
    };

    match joined {
        Ok(result) => result.map_err(StartupError::Serve),
        Err(join_error) => Err(StartupError::Serve(std::io::Error::other(join_error))),
    }
}
