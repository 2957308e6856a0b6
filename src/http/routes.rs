//! Demo routes served by the binary.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

/// Path limited by the default policy in the sample configuration.
pub const DEFAULT_LIMITED_PATH: &str = "/api/ratelimittest";
/// Path with its own endpoint policy in the sample configuration.
pub const ENDPOINT_LIMITED_PATH: &str = "/api/ratelimittest/limited";

/// Routes exercising the default and endpoint policies.
pub fn demo_routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route(DEFAULT_LIMITED_PATH, get(default_limited))
        .route(ENDPOINT_LIMITED_PATH, get(endpoint_limited))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn default_limited() -> Json<Value> {
    Json(json!({ "message": "This endpoint uses the default rate limit" }))
}

async fn endpoint_limited() -> Json<Value> {
    Json(json!({ "message": "This endpoint uses its own endpoint rate limit" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(path: &str) -> (StatusCode, Value) {
        let response = demo_routes()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_demo_messages() {
        let (status, body) = get_json(DEFAULT_LIMITED_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("default"));

        let (status, body) = get_json(ENDPOINT_LIMITED_PATH).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("endpoint"));
    }
}
