//! axum middleware enforcing admission decisions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tracing::warn;

use super::client_ip::client_identity;
use crate::ratelimit::RateLimiter;

/// Body sent with every 429 response.
pub const TOO_MANY_REQUESTS_BODY: &str = "Too many requests. Please try again later.";

/// Wrap every route of `router` with rate limiting.
pub fn with_rate_limiting(router: Router, limiter: Arc<RateLimiter>) -> Router {
    router.layer(middleware::from_fn_with_state(limiter, rate_limit))
}

/// Middleware function: admit by calling `next`, or answer 429.
///
/// The peer address comes from [`ConnectInfo`] when the server was started
/// with connect info; without it only `X-Forwarded-For` can identify the
/// client.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identity = client_identity(peer, request.headers());
    let path = request.uri().path();

    if limiter.decide(&identity, path).is_reject() {
        warn!(ip = %identity, path = %path, "Rate limit exceeded");
        return (StatusCode::TOO_MANY_REQUESTS, TOO_MANY_REQUESTS_BODY).into_response();
    }

    next.run(request).await
}
