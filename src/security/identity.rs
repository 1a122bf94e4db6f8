//! Caller identity used as the admission-control key.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{body::Body, extract::ConnectInfo, http::Request};

/// Context attached to authenticated requests by the upstream auth layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub email: String,
}

/// Produces a stable identity for a request, or `None` when it cannot.
pub type IdentityResolver = Arc<dyn Fn(&Request<Body>) -> Option<String> + Send + Sync>;

/// Resolver that keys authenticated callers by email.
pub fn authenticated_user_resolver() -> IdentityResolver {
    Arc::new(|request: &Request<Body>| {
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .map(|user| user.email.clone())
            .filter(|email| !email.is_empty())
    })
}

/// Peer address of the connection, if the server recorded it.
pub fn network_origin(request: &Request<Body>) -> Option<String> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

pub const UNKNOWN_ORIGIN: &str = "unknown";
