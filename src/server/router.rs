use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::auth;
use super::handlers;
use super::state::AppState;

/// Build the complete axum Router.
pub fn build(state: AppState) -> Router {
    let logs = Router::new()
        .route("/logs", get(handlers::list_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::identify));

    Router::new()
        .merge(logs)
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::MemoryDlqHandler;
    use crate::identity::StaticTokenVerifier;
    use crate::storage::memory::MemoryLogStore;
    use crate::types::Event;
    use crate::writer::IdempotentWriter;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(MemoryLogStore::new());
        let writer = IdempotentWriter::new(store.clone());
        for (user, ts) in [
            ("u1", "2024-01-01T10:00:00Z"),
            ("u1", "2024-01-01T10:00:01Z"),
            ("u2", "2024-01-01T10:00:00Z"),
        ] {
            writer
                .store(&Event::new(user, "login", "10.0.0.1", "firefox", ts))
                .await
                .unwrap();
        }

        let verifier = StaticTokenVerifier::default()
            .with_token("token-u1", "u1")
            .with_token("token-u2", "u2");
        let state = AppState::new(
            store,
            Arc::new(verifier),
            Arc::new(MemoryDlqHandler::default()),
            "x-identity-token",
        )
        .unwrap();
        build(state)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_logs_requires_identity() {
        let response = app()
            .await
            .oneshot(Request::get("/logs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_logs_rejects_unknown_token() {
        let response = app()
            .await
            .oneshot(
                Request::get("/logs")
                    .header("authorization", "Bearer forged")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logs_returns_own_records_only() {
        let response = app()
            .await
            .oneshot(
                Request::get("/logs?page=1&pageSize=10")
                    .header("x-identity-token", "token-u2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let records = body.as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["user_id"], "u2");
        assert_eq!(records[0]["client"], "firefox");
        assert!(records[0].get("sequence").is_none());
        assert!(records[0].get("dedup_key").is_none());
    }

    #[tokio::test]
    async fn test_logs_normalizes_bad_params() {
        let response = app()
            .await
            .oneshot(
                Request::get("/logs?page=-5&pageSize=abc")
                    .header("authorization", "Bearer token-u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .await
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"]["backend"], "memory");
        assert_eq!(body["dead_letters"], 0);
        assert!(body["broker"].is_null());
    }
}
