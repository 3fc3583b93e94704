use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::LLMConfig;
use crate::llm::stream::FragmentStream;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse, ModelInfo, PullMode};

/// Outcome of a model pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The backend finished downloading the model.
    Completed,
    /// The download was started and is still running.
    Initiated,
}

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    /// Short backend name used in logs and error messages.
    fn name(&self) -> &str;

    fn base_url(&self) -> &str;

    fn default_model(&self) -> &str;

    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;

    /// Backends without native streaming deliver the full text as one fragment.
    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<FragmentStream> {
        let response = self.create_chat_completion(request).await?;
        Ok(stream::once(async move { Ok(response.content) }).boxed())
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>>;

    async fn pull_model(&self, model: &str) -> AppResult<PullOutcome> {
        Err(AppError::Unsupported {
            backend: self.name().to_string(),
            operation: format!("pulling model {}", model),
        })
    }

    /// How `pull_model` reports completion. Meaningless for backends that
    /// cannot pull.
    fn pull_mode(&self) -> PullMode {
        PullMode::Synchronous
    }

    /// Whether `pull_model` is implemented at all.
    fn supports_pull(&self) -> bool {
        false
    }
}

/// Map a transport error to the error taxonomy: unreachable, timeout,
/// malformed payload, or generic request failure.
pub fn classify_reqwest_error(backend: &str, url: &str, err: reqwest::Error) -> AppError {
    if err.is_connect() {
        AppError::BackendUnreachable {
            backend: backend.to_string(),
            url: url.to_string(),
        }
    } else if err.is_timeout() {
        AppError::Timeout {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    } else if err.is_decode() {
        AppError::MalformedResponse(format!("{}: {}", backend, err))
    } else {
        AppError::LLMApi(format!("{} request failed: {}", backend, err))
    }
}

/// Read a non-success response into an error carrying the backend's text.
pub async fn error_from_response(backend: &str, response: reqwest::Response) -> AppError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    // OpenAI-compatible backends nest the message; Ollama puts it at the top level.
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or(body);

    AppError::LLMApi(format!("{} API error ({}): {}", backend, status, message))
}

/// Send a streaming request and wait for its response head.
///
/// The wait (and reading an error body) is bounded by `idle_timeout`; the
/// body itself is not, since `decode_lines` bounds the gaps between chunks.
pub async fn open_stream(
    backend: &str,
    url: &str,
    request: reqwest::RequestBuilder,
    idle_timeout: Duration,
) -> AppResult<reqwest::Response> {
    let open = async {
        let response = request
            .send()
            .await
            .map_err(|e| classify_reqwest_error(backend, url, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(backend, response).await);
        }
        Ok(response)
    };

    tokio::time::timeout(idle_timeout, open)
        .await
        .map_err(|_| AppError::Timeout {
            backend: backend.to_string(),
            message: format!("no response from {} within {}s", url, idle_timeout.as_secs()),
        })?
}

/// Build the adapter selected by configuration.
pub fn build_adapter(config: &LLMConfig) -> AppResult<Arc<dyn LLMAdapter>> {
    let adapter: Arc<dyn LLMAdapter> = match config.provider {
        LLMProvider::OpenAI => Arc::new(crate::llm::openai::OpenAIAdapter::from_config(config)?),
        LLMProvider::Groq => Arc::new(crate::llm::groq::GroqAdapter::from_config(config)?),
        LLMProvider::Ollama => Arc::new(crate::llm::ollama::OllamaAdapter::from_config(config)?),
    };

    if config.provider != LLMProvider::Ollama && config.active_api_key().is_none() {
        warn!(provider = %config.provider, "No API key configured; backend calls will be rejected");
    }

    info!(
        provider = %config.provider,
        base_url = adapter.base_url(),
        default_model = adapter.default_model(),
        "LLM adapter ready"
    );

    Ok(adapter)
}
