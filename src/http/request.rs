//! Request identification and deadlines.
//!
//! # Responsibilities
//! - Assign a request id as early as possible (UUID v4) and echo it back
//! - Bound each request by the configured timeout
//!
//! # Design Decisions
//! - A caller-supplied `x-request-id` is kept, so ids survive upstream proxies
//! - A timed-out request is an ordinary failure and goes through dispatch

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::errors::{AppError, Failure};

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Assign a UUID v4 `x-request-id` when the caller sent none.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuid)
}

/// Copy the request id onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(X_REQUEST_ID.clone())
}

/// Fail the request with `RequestTimeout` once `limit` elapses.
pub async fn timeout_middleware(
    State(limit): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => Failure::from(AppError::server(
            "RequestTimeout",
            format!("Request did not complete within {} seconds", limit.as_secs()),
        ))
        .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_slow_handler_times_out_through_dispatch() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(middleware::from_fn_with_state(
                Duration::from_millis(20),
                timeout_middleware,
            ));

        let response = app
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "RequestTimeout");
    }

    #[tokio::test]
    async fn test_request_id_is_generated_and_echoed() {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(propagate_request_id_layer())
            .layer(set_request_id_layer());

        let generated = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(generated.headers().contains_key(&X_REQUEST_ID));

        let echoed = app
            .oneshot(
                Request::get("/")
                    .header(X_REQUEST_ID.clone(), "req-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(echoed.headers()[&X_REQUEST_ID], "req-123");
    }
}
