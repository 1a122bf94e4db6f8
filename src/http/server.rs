//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router around caller-supplied routes
//! - Wire up the pipeline (request id, tracing, panic capture, deadline,
//!   CORS, security headers, body limit, admission control)
//! - Route every failure, including panics and unmatched paths, to dispatch
//! - Serve with graceful shutdown and sweep stale rate windows

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::Settings;
use crate::http::dispatch::{handle_panic, not_found, panic_scope};
use crate::http::health::health;
use crate::http::request::{
    propagate_request_id_layer, set_request_id_layer, timeout_middleware,
};
use crate::observability::{faults::spawn_supervised, spans::http_trace_layer};
use crate::security::headers::{cors_layer, with_security_headers};
use crate::security::rate_limit::{admission_middleware, AdmissionGate};

/// Request bodies above this size are rejected during extraction.
pub const BODY_LIMIT_BYTES: usize = 10 * 1024;

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    gate: Arc<AdmissionGate>,
}

impl HttpServer {
    /// Build the server around `routes`, which are merged as-is and should
    /// use absolute paths under `/api/<version>`.
    pub fn new(settings: &Settings, routes: Router) -> Self {
        let gate = Arc::new(AdmissionGate::new(
            settings.rate_limit,
            settings.server.health_path(),
        ));
        Self::with_gate(settings, routes, gate)
    }

    /// Build the server with a preconfigured admission gate.
    pub fn with_gate(settings: &Settings, routes: Router, gate: Arc<AdmissionGate>) -> Self {
        let router = Self::build_router(settings, routes, gate.clone());
        Self { router, gate }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Layers added later wrap the ones before them, so the request id is
    /// assigned first and the admission gate runs last, right before routing.
    fn build_router(settings: &Settings, routes: Router, gate: Arc<AdmissionGate>) -> Router {
        let app = Router::new()
            .route(&settings.server.health_path(), get(health))
            .merge(routes)
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(gate, admission_middleware))
            .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES));

        with_security_headers(app)
            .layer(cors_layer(&settings.security.allowed_origins))
            .layer(middleware::from_fn_with_state(
                settings.server.request_timeout,
                timeout_middleware,
            ))
            .layer(middleware::from_fn(panic_scope))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(http_trace_layer())
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer())
    }

    /// The assembled router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// The admission gate shared with the sweeper.
    pub fn gate(&self) -> Arc<AdmissionGate> {
        self.gate.clone()
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Server is up and running on port {}", addr.port());

        let sweeper = spawn_supervised(
            "rate-window-sweeper",
            sweep_expired_windows(self.gate.clone(), shutdown.resubscribe()),
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        sweeper.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Purge elapsed rate windows once per window until shutdown.
async fn sweep_expired_windows(
    gate: Arc<AdmissionGate>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), Infallible> {
    let mut ticker = tokio::time::interval(gate.settings().window());
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let purged = gate.purge_expired_at(Instant::now());
                if purged > 0 {
                    tracing::debug!(purged, tracked = gate.tracked(), "Purged expired rate windows");
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_from_vars, loader::minimal_vars};
    use crate::errors::{AppError, Failure};
    use axum::{
        body::Body,
        extract::rejection::JsonRejection,
        http::{header, Request, StatusCode},
        routing::post,
        Json,
    };
    use tower::ServiceExt;

    fn settings() -> Settings {
        let mut vars = minimal_vars();
        vars.push(("RATE_LIMIT_WINDOW_MINUTES", "1"));
        vars.push(("RATE_LIMIT_MAX_REQUESTS", "3"));
        load_from_vars(vars).unwrap()
    }

    fn routes() -> Router {
        Router::new()
            .route(
                "/api/v1/tickets",
                get(|| async { Err::<&str, Failure>(AppError::forbidden("Ticket", "Not yours").into()) }),
            )
            .route(
                "/api/v1/echo",
                post(|body: Result<Json<serde_json::Value>, JsonRejection>| async move {
                    let Json(value) = body?;
                    Ok::<_, Failure>(Json(value))
                }),
            )
            .route(
                "/api/v1/panic",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
    }

    async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
        app.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_health_is_exempt_and_ok() {
        let app = HttpServer::new(&settings(), routes()).router();
        for _ in 0..10 {
            let response = send(&app, Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_unknown_route_is_dispatched_not_found() {
        let app = HttpServer::new(&settings(), routes()).router();
        let response = send(&app, Request::get("/api/v1/missing").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_generic_500() {
        let app = HttpServer::new(&settings(), routes()).router();
        let response = send(&app, Request::get("/api/v1/panic").body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "InternalServerError");
        assert!(!body.to_string().contains("exploded"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected_by_dispatch() {
        let app = HttpServer::new(&settings(), routes()).router();
        let response = send(
            &app,
            Request::post("/api/v1/echo")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_rate_limit_applies_to_routes_but_not_health() {
        let server = HttpServer::new(&settings(), routes());
        let app = server.router();

        for _ in 0..3 {
            let response = send(&app, Request::get("/api/v1/tickets").body(Body::empty()).unwrap()).await;
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
        }
        let limited = send(&app, Request::get("/api/v1/tickets").body(Body::empty()).unwrap()).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let health = send(&app, Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(health.status(), StatusCode::OK);
        assert_eq!(server.gate().tracked(), 1);
    }
}
