use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::warn;

use crate::models::{AppState, HealthResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .with_state(state)
}

/// Reports degraded (500) when the backend cannot list its models.
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let backend = state.llm.name();
    let mut response = HealthResponse {
        status: String::new(),
        provider: backend.to_string(),
        base_url: state.llm.base_url().to_string(),
        default_model: state.llm.default_model().to_string(),
        available_models: None,
        error: None,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    match state.llm.list_models().await {
        Ok(models) => {
            response.status = format!("Server and {} are running", backend);
            response.available_models = Some(models.len());
            (StatusCode::OK, Json(response))
        }
        Err(e) => {
            warn!(backend, error = %e, "Health check: backend not accessible");
            response.status = format!("Server running but {} not accessible", backend);
            response.error = Some(e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::llm::stub::{StubAdapter, StubBehavior};
    use crate::types::{AppError, LLMProvider};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn check(stub: StubAdapter) -> (StatusCode, HealthResponse) {
        let state = AppState::new(test_config(LLMProvider::Ollama, "http://stub.invalid"), Arc::new(stub));
        let response = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_healthy() {
        let (status, body) = check(StubAdapter::text(&[])).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "Server and stub are running");
        assert_eq!(body.default_model, "stub-model");
        assert_eq!(body.available_models, Some(2));
        assert!(body.error.is_none());
    }

    #[tokio::test]
    async fn test_degraded() {
        let stub = StubAdapter::new(StubBehavior::Fail(AppError::BackendUnreachable {
            backend: "stub".into(),
            url: "http://stub.invalid".into(),
        }));
        let (status, body) = check(stub).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, "Server running but stub not accessible");
        assert_eq!(body.base_url, "http://stub.invalid");
        assert!(body.error.unwrap().starts_with("Cannot connect to stub"));
    }
}
