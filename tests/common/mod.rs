//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::time::Duration;

use api_spine::config::{load_from_vars, Settings};
use api_spine::errors::{AppError, Failure, StorageError, ValidationDetails};
use api_spine::http::HttpServer;
use api_spine::lifecycle::Shutdown;
use axum::{extract::rejection::JsonRejection, routing::get, routing::post, Json, Router};
use tokio::net::TcpListener;

/// A complete, valid environment with a small rate limit.
pub fn test_settings(max_requests: u32) -> Settings {
    let max = max_requests.to_string();
    let vars = vec![
        ("NODE_ENV", "test".to_string()),
        ("FRONTEND_VERIFICATION_URL", "https://app.example.com/verify".to_string()),
        ("FRONTEND_PASSWORD_RECOVERY_URL", "https://app.example.com/recover".to_string()),
        ("FRONTEND_UNLOCK_ACCOUNT_URL", "https://app.example.com/unlock".to_string()),
        ("ALLOWED_ORIGINS", "https://app.example.com".to_string()),
        ("JWT_SECRET", "integration-secret".to_string()),
        ("MAILER_HOST", "smtp.example.com".to_string()),
        ("MAILER_USERNAME", "mailer".to_string()),
        ("MAILER_PASSWORD", "mailer-pw".to_string()),
        ("MONGODB_URI", "mongodb://localhost:27017/test".to_string()),
        ("RATE_LIMIT_WINDOW_MINUTES", "1".to_string()),
        ("RATE_LIMIT_MAX_REQUESTS", max),
        ("REQUEST_TIMEOUT_SECS", "1".to_string()),
    ];
    load_from_vars(vars).unwrap()
}

/// Routes that fail in every way a handler can.
pub fn failing_routes() -> Router {
    Router::new()
        .route(
            "/api/v1/fail/not-found",
            get(|| async { fail(AppError::not_found("User", "No user with that id")) }),
        )
        .route(
            "/api/v1/fail/already-exists",
            get(|| async { fail(AppError::already_exists("User", "Email already registered")) }),
        )
        .route(
            "/api/v1/fail/invalid-argument",
            get(|| async { fail(AppError::invalid_argument("Page", "Page must be positive")) }),
        )
        .route(
            "/api/v1/fail/not-authorized",
            get(|| async { fail(AppError::not_authorized("Token", "Token expired")) }),
        )
        .route(
            "/api/v1/fail/forbidden",
            get(|| async { fail(AppError::forbidden("Role", "Admins only")) }),
        )
        .route(
            "/api/v1/fail/server",
            get(|| async { fail(AppError::server("MailerUnavailable", "Could not send mail")) }),
        )
        .route(
            "/api/v1/fail/validation",
            get(|| async {
                fail(AppError::validation(
                    "Invalid signup",
                    ValidationDetails::new()
                        .field("email", "Invalid email")
                        .field("password", "Too short"),
                ))
            }),
        )
        .route(
            "/api/v1/fail/unexpected",
            get(|| async {
                Err::<&str, Failure>(Failure::unexpected(std::io::Error::other(
                    "socket to 10.0.0.7 reset",
                )))
            }),
        )
        .route(
            "/api/v1/fail/duplicate",
            get(|| async { Err::<&str, Failure>(StorageError::DuplicateKey("email_1".into()).into()) }),
        )
        .route(
            "/api/v1/fail/storage-down",
            get(|| async { Err::<&str, Failure>(StorageError::Connectivity("no primary".into()).into()) }),
        )
        .route(
            "/api/v1/fail/panic",
            get(|| async {
                if true {
                    panic!("invariant broken");
                }
                "unreachable"
            }),
        )
        .route(
            "/api/v1/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        )
        .route(
            "/api/v1/echo",
            post(|body: Result<Json<serde_json::Value>, JsonRejection>| async move {
                let Json(body) = body?;
                Ok::<_, Failure>(Json(body))
            }),
        )
}

fn fail(err: AppError) -> Result<&'static str, Failure> {
    Err(err.into())
}

/// A server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start(settings: &Settings, routes: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = HttpServer::new(settings, routes);
        let task = tokio::spawn(server.run(listener, shutdown.subscribe()));
        Self {
            addr,
            shutdown,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}
