use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::models::{AppState, GenerateRequest};
use crate::prompts::{CompositePrompt, PromptKind};
use crate::relay::{sse_response, StreamSession};
use crate::types::{AppError, AppResult, LLMRequest};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generateLesson", post(generate_lesson))
        .route("/api/generateQuizzes", post(generate_quizzes))
        .with_state(state)
}

/// POST /api/generateLesson
async fn generate_lesson(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    relay(&state, PromptKind::Lesson, payload).await
}

/// POST /api/generateQuizzes
async fn generate_quizzes(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    relay(&state, PromptKind::Quiz, payload).await
}

fn missing_subject_message(kind: PromptKind) -> &'static str {
    match kind {
        PromptKind::Lesson => "User input is required",
        PromptKind::Quiz => "Lesson content is required",
    }
}

/// Validate, build the composite prompt, and hand off to the blocking or
/// streaming path. Nothing reaches the backend unless validation passes.
async fn relay(
    state: &AppState,
    kind: PromptKind,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let subject = body
        .subject_for(kind)
        .ok_or_else(|| AppError::InvalidRequest(missing_subject_message(kind).to_string()))?;

    let prompt = CompositePrompt::new(kind, subject);
    let llm_config = &state.config.llm;
    let request = LLMRequest {
        model: body
            .model_override()
            .unwrap_or_else(|| state.llm.default_model())
            .to_string(),
        messages: prompt.as_split_messages(),
        max_tokens: Some(llm_config.max_tokens),
        temperature: Some(llm_config.temperature),
        top_p: Some(llm_config.top_p),
    };

    info!(
        kind = ?kind,
        model = %request.model,
        subject_len = subject.len(),
        stream = body.stream,
        "Generation request"
    );

    if body.stream {
        stream_generation(state, request).await
    } else {
        blocking_generation(state, kind, request).await
    }
}

async fn blocking_generation(
    state: &AppState,
    kind: PromptKind,
    request: LLMRequest,
) -> AppResult<Response> {
    let response = state
        .llm
        .create_chat_completion(&request)
        .await
        .inspect_err(|e| error!(backend = state.llm.name(), error = %e, "Generation failed"))?;

    let mut payload = Map::new();
    payload.insert(kind.response_field().to_string(), Value::String(response.content));
    Ok(Json(Value::Object(payload)).into_response())
}

/// Open the backend stream first so a backend that refuses outright still
/// gets a normal error status. After that the status is committed.
async fn stream_generation(state: &AppState, request: LLMRequest) -> AppResult<Response> {
    let fragments = state
        .llm
        .create_chat_completion_stream(&request)
        .await
        .inspect_err(|e| error!(backend = state.llm.name(), error = %e, "Could not open backend stream"))?;

    let session = StreamSession::new(fragments);
    info!(session_id = %session.id(), backend = state.llm.name(), "Stream session opened");
    Ok(sse_response(session))
}
