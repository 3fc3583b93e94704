// OpenAI-compatible chat completions adapter
// Also backs the Groq adapter, which speaks the same protocol at a different base URL.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::LLMConfig;
use crate::llm::provider::{classify_reqwest_error, error_from_response, open_stream, LLMAdapter};
use crate::llm::stream::{decode_lines, fragments_from_lines, FragmentStream, LineEvent};
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse, ModelInfo, TokenUsage};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub struct OpenAIAdapter {
    client: Client,
    name: &'static str,
    api_key: String,
    api_base: String,
    default_model: String,
    request_timeout: Duration,
    stream_idle_timeout: Duration,
}

// Request types for the chat completions API
#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [LLMMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

// Response types
#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

impl OpenAIAdapter {
    pub fn new(api_key: &str, api_base: &str, default_model: &str) -> AppResult<Self> {
        Self::with_name("openai", api_key, api_base, default_model)
    }

    pub(crate) fn with_name(
        name: &'static str,
        api_key: &str,
        api_base: &str,
        default_model: &str,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            name,
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            request_timeout: Duration::from_secs(60),
            stream_idle_timeout: Duration::from_secs(120),
        })
    }

    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        Self::new(&config.openai_api_key, &config.base_url, &config.default_model)
            .map(|adapter| adapter.with_timeouts(config.request_timeout(), config.stream_idle_timeout()))
    }

    pub fn with_timeouts(mut self, request_timeout: Duration, stream_idle_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self.stream_idle_timeout = stream_idle_timeout;
        self
    }

    fn model_for<'a>(&'a self, request: &'a LLMRequest) -> &'a str {
        if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        }
    }

    fn chat_request(&self, body: &ChatCompletionRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(body)
    }

    async fn post_chat(&self, body: &ChatCompletionRequest<'_>, timeout: Duration) -> AppResult<reqwest::Response> {
        let response = self
            .chat_request(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(self.name, &self.api_base, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.name, response).await);
        }
        Ok(response)
    }

    /// Stream incremental deltas. Each non-empty delta content is one fragment.
    pub(crate) async fn stream_chat(&self, request: &LLMRequest) -> AppResult<FragmentStream> {
        let body = ChatCompletionRequest {
            model: self.model_for(request),
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: true,
        };

        debug!(backend = self.name, model = body.model, "Opening chat completion stream");
        let response = open_stream(
            self.name,
            &self.api_base,
            self.chat_request(&body),
            self.stream_idle_timeout,
        )
        .await?;

        let lines = decode_lines(
            response.bytes_stream(),
            self.stream_idle_timeout,
            self.name,
            &self.api_base,
        );
        Ok(fragments_from_lines(lines, self.name, parse_event_line))
    }
}

/// Interpret one line of an OpenAI-style event stream.
fn parse_event_line(line: &str) -> LineEvent {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        // Blank separators, comments, `event:` and `id:` fields carry no text.
        return LineEvent::Skip;
    };
    let data = data.trim_start();

    if data == "[DONE]" {
        return LineEvent::Done(None);
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(data) {
        if let Some(message) = value.pointer("/error/message").and_then(|m| m.as_str()) {
            return LineEvent::Failed(AppError::LLMApi(message.to_string()));
        }
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() {
                LineEvent::Skip
            } else {
                LineEvent::Fragment(text)
            }
        }
        Err(e) => LineEvent::Malformed(e.to_string()),
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn base_url(&self) -> &str {
        &self.api_base
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        // Complete-chat sends the whole composite prompt as one user message.
        let messages = vec![LLMMessage::user(request.prompt_text())];
        let body = ChatCompletionRequest {
            model: self.model_for(request),
            messages: &messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stream: false,
        };

        info!(backend = self.name, model = body.model, "Requesting chat completion");
        let response = self.post_chat(&body, self.request_timeout).await?;

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("{}: {}", self.name, e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::MalformedResponse(format!("{} returned no choices", self.name)))?;

        let usage = completion
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        let url = format!("{}/models", self.api_base);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(self.name, &self.api_base, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(self.name, response).await);
        }

        let list: ModelList = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("{}: {}", self.name, e)))?;

        Ok(list
            .data
            .into_iter()
            .map(|m| ModelInfo {
                owned_by: m.owned_by,
                ..ModelInfo::named(m.id)
            })
            .collect())
    }
}
