//! Admission control: fixed-window request budget per caller identity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde::Serialize;

use crate::config::RateLimitSettings;
use crate::observability::metrics;
use crate::security::identity::{
    authenticated_user_resolver, network_origin, IdentityResolver, UNKNOWN_ORIGIN,
};

pub static RATELIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
pub static RATELIMIT: HeaderName = HeaderName::from_static("ratelimit");

/// Counter for one identity within the current window.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    started: Instant,
    count: u32,
}

/// Budget left for an identity after a hit was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed(Quota),
    Limited(Quota),
}

#[derive(Serialize)]
struct LimitedBody {
    status: &'static str,
    message: String,
}

/// Per-identity request counter.
///
/// Each identity's window lives in its own `DashMap` entry, so the
/// read-reset-increment sequence runs under that entry's shard lock and
/// concurrent bursts cannot undercount.
pub struct AdmissionGate {
    windows: DashMap<String, RateWindow>,
    settings: RateLimitSettings,
    exempt_path: String,
    resolver: IdentityResolver,
}

impl AdmissionGate {
    /// Gate keyed by authenticated email, else peer IP.
    pub fn new(settings: RateLimitSettings, exempt_path: impl Into<String>) -> Self {
        Self {
            windows: DashMap::new(),
            settings,
            exempt_path: exempt_path.into(),
            resolver: authenticated_user_resolver(),
        }
    }

    /// Replace the identity resolver.
    pub fn with_resolver(mut self, resolver: IdentityResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Window and limit in effect.
    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    /// Exact match only; prefixes of the health path are still counted.
    pub fn is_exempt(&self, path: &str) -> bool {
        path == self.exempt_path
    }

    /// Resolver result, else network origin, else a shared unknown bucket.
    pub fn resolve_identity(&self, request: &Request<Body>) -> String {
        (self.resolver)(request)
            .or_else(|| network_origin(request))
            .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string())
    }

    /// Count one request for `identity` now.
    pub fn check(&self, identity: &str) -> Decision {
        self.check_at(identity, Instant::now())
    }

    /// Count one request for `identity` at `now`.
    pub fn check_at(&self, identity: &str, now: Instant) -> Decision {
        let window = self.settings.window();
        let limit = self.settings.max_requests;

        let mut entry = self
            .windows
            .entry(identity.to_string())
            .or_insert(RateWindow { started: now, count: 0 });

        if now.saturating_duration_since(entry.started) >= window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        let quota = Quota {
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_after: window.saturating_sub(now.saturating_duration_since(entry.started)),
        };

        if entry.count > limit {
            Decision::Limited(quota)
        } else {
            Decision::Allowed(quota)
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let window = self.settings.window();
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    fn policy_name(&self) -> String {
        format!(
            "{}-in-{}min",
            self.settings.max_requests, self.settings.window_minutes
        )
    }

    /// Message returned in the 429 body.
    pub fn limit_message(&self) -> String {
        format!(
            "Too many requests. Limit: {} per {} minutes.",
            self.settings.max_requests, self.settings.window_minutes
        )
    }

    /// Draft-8 `RateLimit-Policy` and `RateLimit` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap, quota: &Quota) {
        let name = self.policy_name();
        let policy = format!(
            "\"{}\"; q={}; w={}",
            name,
            quota.limit,
            self.settings.window().as_secs()
        );
        let state = format!(
            "\"{}\"; r={}; t={}",
            name,
            quota.remaining,
            ceil_secs(quota.reset_after)
        );
        if let Ok(value) = HeaderValue::from_str(&policy) {
            headers.insert(RATELIMIT_POLICY.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(&state) {
            headers.insert(RATELIMIT.clone(), value);
        }
    }

    /// The terminal 429 response.
    pub fn limited_response(&self, quota: &Quota) -> Response {
        let body = LimitedBody {
            status: "fail",
            message: self.limit_message(),
        };
        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        self.apply_headers(response.headers_mut(), quota);
        response.headers_mut().insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(ceil_secs(quota.reset_after)),
        );
        response
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

/// Middleware applying the admission gate ahead of every route.
pub async fn admission_middleware(
    State(gate): State<Arc<AdmissionGate>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if gate.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let identity = gate.resolve_identity(&request);
    match gate.check(&identity) {
        Decision::Allowed(quota) => {
            let mut response = next.run(request).await;
            gate.apply_headers(response.headers_mut(), &quota);
            response
        }
        Decision::Limited(quota) => {
            tracing::warn!(identity = %identity, "[RateLimit] Too many requests from: {}", identity);
            metrics::record_rate_limited();
            gate.limited_response(&quota)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::get, Router};
    use tower::ServiceExt;

    fn gate(max_requests: u32) -> AdmissionGate {
        AdmissionGate::new(
            RateLimitSettings {
                window_minutes: 1,
                max_requests,
            },
            "/api/v1/health",
        )
    }

    #[test]
    fn test_fourth_request_in_window_is_limited() {
        let gate = gate(3);
        let start = Instant::now();

        for i in 0..3 {
            let at = start + Duration::from_secs(i * 10);
            assert!(matches!(gate.check_at("X", at), Decision::Allowed(_)));
        }
        let Decision::Limited(quota) = gate.check_at("X", start + Duration::from_secs(59)) else {
            panic!("fourth request should be limited");
        };
        assert_eq!(quota.remaining, 0);
        assert_eq!(quota.reset_after, Duration::from_secs(1));
    }

    #[test]
    fn test_window_elapse_resets_budget() {
        let gate = gate(3);
        let start = Instant::now();
        for _ in 0..4 {
            gate.check_at("X", start);
        }
        let Decision::Allowed(quota) = gate.check_at("X", start + Duration::from_secs(60)) else {
            panic!("request after the window should pass");
        };
        assert_eq!(quota.remaining, 2);
    }

    #[test]
    fn test_identities_are_independent() {
        let gate = gate(1);
        let now = Instant::now();
        assert!(matches!(gate.check_at("a", now), Decision::Allowed(_)));
        assert!(matches!(gate.check_at("b", now), Decision::Allowed(_)));
        assert!(matches!(gate.check_at("a", now), Decision::Limited(_)));
    }

    #[test]
    fn test_exemption_is_exact() {
        let gate = gate(1);
        assert!(gate.is_exempt("/api/v1/health"));
        assert!(!gate.is_exempt("/api/v1/health/"));
        assert!(!gate.is_exempt("/api/v1/healthz"));
    }

    #[test]
    fn test_purge_expired() {
        let gate = gate(5);
        let start = Instant::now();
        gate.check_at("old", start);
        gate.check_at("new", start + Duration::from_secs(30));

        assert_eq!(gate.purge_expired_at(start + Duration::from_secs(61)), 1);
        assert_eq!(gate.tracked(), 1);
    }

    #[test]
    fn test_concurrent_hits_are_all_counted() {
        let gate = Arc::new(gate(1000));
        let now = Instant::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        gate.check_at("burst", now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let Decision::Allowed(quota) = gate.check_at("burst", now) else {
            panic!("801st hit is within budget");
        };
        assert_eq!(quota.remaining, 1000 - 801);
    }

    #[test]
    fn test_headers_follow_draft_format() {
        let gate = gate(3);
        let quota = Quota {
            limit: 3,
            remaining: 2,
            reset_after: Duration::from_millis(59_500),
        };
        let mut headers = HeaderMap::new();
        gate.apply_headers(&mut headers, &quota);

        assert_eq!(headers[&RATELIMIT_POLICY], "\"3-in-1min\"; q=3; w=60");
        assert_eq!(headers[&RATELIMIT], "\"3-in-1min\"; r=2; t=60");
        assert!(headers.get("x-ratelimit-limit").is_none());
    }

    #[test]
    fn test_custom_resolver_falls_back_to_origin() {
        let gate = gate(1).with_resolver(Arc::new(|_: &Request<Body>| None));
        let request = Request::new(Body::empty());
        assert_eq!(gate.resolve_identity(&request), UNKNOWN_ORIGIN);
    }

    #[tokio::test]
    async fn test_middleware_rejects_with_fail_envelope() {
        let gate = Arc::new(gate(1));
        let app = Router::new()
            .route("/api/v1/tickets", get(|| async { "ok" }))
            .route("/api/v1/health", get(|| async { "up" }))
            .layer(middleware::from_fn_with_state(gate.clone(), admission_middleware));

        let first = app
            .clone()
            .oneshot(Request::get("/api/v1/tickets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert!(first.headers().contains_key(&RATELIMIT));

        let second = app
            .clone()
            .oneshot(Request::get("/api/v1/tickets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[axum::http::header::RETRY_AFTER], "60");
        let bytes = axum::body::to_bytes(second.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "status": "fail",
                "message": "Too many requests. Limit: 1 per 1 minutes."
            })
        );

        for _ in 0..5 {
            let health = app
                .clone()
                .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(health.status(), StatusCode::OK);
            assert!(!health.headers().contains_key(&RATELIMIT));
        }
        assert_eq!(gate.tracked(), 1);
    }
}
