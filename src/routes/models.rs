use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info};

use crate::llm::PullOutcome;
use crate::models::{AppState, ModelsResponse, PullModelRequest, PullModelResponse};
use crate::types::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/models", get(list_models))
        .route("/api/pullModel", post(pull_model))
        .with_state(state)
}

/// GET /api/models - models the active backend can serve
async fn list_models(State(state): State<AppState>) -> Response {
    let backend = state.llm.name();

    match state.llm.list_models().await {
        Ok(models) => (
            StatusCode::OK,
            Json(ModelsResponse {
                status: format!("{} is running", backend),
                models,
            }),
        )
            .into_response(),
        Err(e) => {
            error!(backend, error = %e, "Failed to list models");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": format!("{} is not running or not accessible", backend),
                    "message": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

/// POST /api/pullModel - ask the backend to download a model
async fn pull_model(
    State(state): State<AppState>,
    payload: Result<Json<PullModelRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(e) => return AppError::InvalidRequest(e.body_text()).into_response(),
    };

    let model = match request.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
        Some(model) => model.to_string(),
        None => return AppError::InvalidRequest("Model name is required".to_string()).into_response(),
    };

    if !state.llm.supports_pull() {
        return AppError::Unsupported {
            backend: state.llm.name().to_string(),
            operation: format!("pulling model {}", model),
        }
        .into_response();
    }

    info!(%model, mode = ?state.llm.pull_mode(), "Model pull requested");

    match state.llm.pull_model(&model).await {
        Ok(PullOutcome::Completed) => (
            StatusCode::OK,
            Json(PullModelResponse {
                message: format!("Model {} pulled", model),
                status: "success".to_string(),
            }),
        )
            .into_response(),
        Ok(PullOutcome::Initiated) => (
            StatusCode::ACCEPTED,
            Json(PullModelResponse {
                message: format!("Model {} pull initiated", model),
                status: "initiated".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!(%model, error = %e, "Model pull failed");
            (
                e.status_code(),
                Json(serde_json::json!({
                    "error": format!("Failed to pull model {}", model),
                    "message": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::llm::stub::{StubAdapter, StubBehavior};
    use crate::types::{LLMProvider, PullMode};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(stub: StubAdapter) -> Router {
        let state = AppState::new(test_config(LLMProvider::Ollama, "http://stub.invalid"), Arc::new(stub));
        router(state)
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn pull(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/pullModel")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_models() -> Request<Body> {
        Request::builder().uri("/api/models").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_list_models() {
        let (status, body) = send(app(StubAdapter::text(&[])), get_models()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "stub is running");
        assert_eq!(body["models"][0]["name"], "stub-model");
    }

    #[tokio::test]
    async fn test_list_models_unreachable() {
        let stub = StubAdapter::new(StubBehavior::Fail(AppError::BackendUnreachable {
            backend: "stub".into(),
            url: "http://stub.invalid".into(),
        }));
        let (status, body) = send(app(stub), get_models()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "stub is not running or not accessible");
    }

    #[tokio::test]
    async fn test_pull_requires_model() {
        let stub = StubAdapter::text(&[]).with_pull(PullMode::Synchronous);
        let (status, body) = send(app(stub), pull(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Model name is required");
    }

    #[tokio::test]
    async fn test_pull_unsupported_is_explicit() {
        let (status, body) = send(app(StubAdapter::text(&[])), pull(serde_json::json!({ "model": "llama3" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not supported"));
        assert!(body.get("status").is_none());
    }

    #[tokio::test]
    async fn test_pull_synchronous_and_background() {
        let stub = StubAdapter::text(&[]).with_pull(PullMode::Synchronous);
        let (status, body) = send(app(stub), pull(serde_json::json!({ "model": "llama3" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Model llama3 pulled");

        let stub = StubAdapter::text(&[]).with_pull(PullMode::Background);
        let (status, body) = send(app(stub), pull(serde_json::json!({ "model": "llama3" }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "initiated");
        assert_eq!(body["message"], "Model llama3 pull initiated");
    }
}
