// Ollama adapter
// Talks to a local (or self-hosted) Ollama daemon over its native HTTP API:
//   POST /api/generate  - text generation, blocking or newline-delimited JSON stream
//   GET  /api/tags      - installed models
//   POST /api/pull      - download a model

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::LLMConfig;
use crate::llm::provider::{classify_reqwest_error, error_from_response, open_stream, LLMAdapter, PullOutcome};
use crate::llm::stream::{decode_lines, fragments_from_lines, FragmentStream, LineEvent};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, ModelInfo, PullMode, TokenUsage};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BACKEND: &str = "ollama";

pub struct OllamaAdapter {
    client: Client,
    base_url: String,
    default_model: String,
    request_timeout: Duration,
    pull_timeout: Duration,
    stream_idle_timeout: Duration,
    pull_mode: PullMode,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// One record of `/api/generate` output; the blocking response has the same shape.
#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    model: &'a str,
    // Older daemons only read `name`.
    name: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct PullStatus {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
    #[serde(default)]
    digest: Option<String>,
}

impl OllamaAdapter {
    pub fn new(base_url: &str, default_model: &str) -> AppResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            request_timeout: Duration::from_secs(60),
            pull_timeout: Duration::from_secs(300),
            stream_idle_timeout: Duration::from_secs(120),
            pull_mode: PullMode::Synchronous,
        })
    }

    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let mut adapter = Self::new(&config.base_url, &config.default_model)?;
        adapter.request_timeout = config.request_timeout();
        adapter.pull_timeout = config.pull_timeout();
        adapter.stream_idle_timeout = config.stream_idle_timeout();
        adapter.pull_mode = config.pull_mode;
        Ok(adapter)
    }

    pub fn with_pull_mode(mut self, pull_mode: PullMode) -> Self {
        self.pull_mode = pull_mode;
        self
    }

    fn generate_request<'a>(&'a self, request: &'a LLMRequest, stream: bool) -> GenerateRequest<'a> {
        let model = if request.model.is_empty() {
            &self.default_model
        } else {
            &request.model
        };

        GenerateRequest {
            model: model.as_str(),
            prompt: request.prompt_text(),
            stream,
            options: GenerateOptions {
                temperature: request.temperature,
                top_p: request.top_p,
                num_predict: request.max_tokens,
            },
        }
    }

    fn unreachable(&self, e: reqwest::Error) -> AppError {
        classify_reqwest_error(BACKEND, &self.base_url, e)
    }

    async fn send_pull(&self, model: &str, stream: bool, timeout: Option<Duration>) -> AppResult<reqwest::Response> {
        let url = format!("{}/api/pull", self.base_url);
        let mut builder = self.client.post(&url).json(&PullRequest {
            model,
            name: model,
            stream,
        });
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| self.unreachable(e))?;
        if !response.status().is_success() {
            return Err(error_from_response(BACKEND, response).await);
        }
        Ok(response)
    }
}

/// Interpret one line of `/api/generate` streaming output.
fn parse_generate_line(line: &str) -> LineEvent {
    if line.trim().is_empty() {
        return LineEvent::Skip;
    }

    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(chunk) => {
            if let Some(message) = chunk.error {
                LineEvent::Failed(AppError::LLMApi(format!("ollama: {}", message)))
            } else if chunk.done {
                LineEvent::Done(Some(chunk.response))
            } else if chunk.response.is_empty() {
                LineEvent::Skip
            } else {
                LineEvent::Fragment(chunk.response)
            }
        }
        Err(e) => LineEvent::Malformed(e.to_string()),
    }
}

#[async_trait]
impl LLMAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        BACKEND
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        let url = format!("{}/api/generate", self.base_url);
        let body = self.generate_request(request, false);

        info!(model = body.model, "Requesting Ollama generation");
        let response = self
            .client
            .post(&url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !response.status().is_success() {
            return Err(error_from_response(BACKEND, response).await);
        }

        let generated: GenerateChunk = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("ollama: {}", e)))?;

        if let Some(message) = generated.error {
            return Err(AppError::LLMApi(format!("ollama: {}", message)));
        }

        let prompt_tokens = generated.prompt_eval_count.unwrap_or(0);
        let completion_tokens = generated.eval_count.unwrap_or(0);

        Ok(LLMResponse {
            content: generated.response,
            finish_reason: generated.done_reason.unwrap_or_else(|| "stop".to_string()),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<FragmentStream> {
        let url = format!("{}/api/generate", self.base_url);
        let body = self.generate_request(request, true);

        debug!(model = body.model, "Opening Ollama generation stream");
        // No total timeout: duration depends on output length. Idle gaps are bounded instead.
        let response = open_stream(
            BACKEND,
            &self.base_url,
            self.client.post(&url).json(&body),
            self.stream_idle_timeout,
        )
        .await?;

        let lines = decode_lines(
            response.bytes_stream(),
            self.stream_idle_timeout,
            BACKEND,
            &self.base_url,
        );
        Ok(fragments_from_lines(lines, BACKEND, parse_generate_line))
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;

        if !response.status().is_success() {
            return Err(error_from_response(BACKEND, response).await);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("ollama: {}", e)))?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo {
                size: m.size,
                modified_at: m.modified_at,
                digest: m.digest,
                ..ModelInfo::named(m.name)
            })
            .collect())
    }

    async fn pull_model(&self, model: &str) -> AppResult<PullOutcome> {
        match self.pull_mode {
            PullMode::Synchronous => {
                info!(model, timeout_secs = self.pull_timeout.as_secs(), "Pulling model");
                let response = self.send_pull(model, false, Some(self.pull_timeout)).await?;

                let status: PullStatus = response
                    .json()
                    .await
                    .map_err(|e| AppError::MalformedResponse(format!("ollama: {}", e)))?;

                if let Some(message) = status.error {
                    return Err(AppError::LLMApi(format!("ollama: {}", message)));
                }
                info!(model, status = status.status.as_deref().unwrap_or("unknown"), "Model pull finished");
                Ok(PullOutcome::Completed)
            }
            PullMode::Background => {
                // Wait for the daemon to accept the pull, then drain progress in the background.
                let response = tokio::time::timeout(self.request_timeout, self.send_pull(model, true, None))
                    .await
                    .map_err(|_| AppError::Timeout {
                        backend: BACKEND.to_string(),
                        message: format!("pull of {} was not accepted", model),
                    })??;

                let model = model.to_string();
                let pull_timeout = self.pull_timeout;
                let base_url = self.base_url.clone();
                tokio::spawn(async move {
                    let lines = decode_lines(response.bytes_stream(), pull_timeout, BACKEND, &base_url);
                    let drain = async {
                        let mut lines = lines;
                        let mut last = None;
                        while let Some(line) = lines.next().await {
                            let line = line?;
                            match serde_json::from_str::<PullStatus>(&line) {
                                Ok(PullStatus { error: Some(message), .. }) => {
                                    return Err(AppError::LLMApi(format!("ollama: {}", message)));
                                }
                                Ok(PullStatus { status, .. }) => last = status.or(last),
                                Err(e) => warn!(error = %e, "Unreadable pull progress line"),
                            }
                        }
                        Ok::<_, AppError>(last)
                    };

                    match tokio::time::timeout(pull_timeout, drain).await {
                        Ok(Ok(status)) => info!(%model, status = status.as_deref().unwrap_or("unknown"), "Background model pull finished"),
                        Ok(Err(e)) => error!(%model, error = %e, "Background model pull failed"),
                        Err(_) => error!(%model, "Background model pull timed out"),
                    }
                });

                Ok(PullOutcome::Initiated)
            }
        }
    }

    fn pull_mode(&self) -> PullMode {
        self.pull_mode
    }

    fn supports_pull(&self) -> bool {
        true
    }
}
