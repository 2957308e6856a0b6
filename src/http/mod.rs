//! HTTP host for the admission-control core.

mod client_ip;
mod middleware;
mod routes;
mod server;

pub use client_ip::{client_identity, is_private, FORWARDED_FOR, UNKNOWN_CLIENT};
pub use middleware::{rate_limit, with_rate_limiting, TOO_MANY_REQUESTS_BODY};
pub use routes::{demo_routes, DEFAULT_LIMITED_PATH, ENDPOINT_LIMITED_PATH};
pub use server::HttpServer;
