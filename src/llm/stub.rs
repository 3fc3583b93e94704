// Scriptable in-process backend for handler tests.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::llm::provider::{LLMAdapter, PullOutcome};
use crate::llm::stream::FragmentStream;
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, ModelInfo, PullMode, TokenUsage};

#[derive(Clone)]
pub enum StubBehavior {
    /// Blocking calls return the concatenation; streaming yields each item.
    Fragments(Vec<AppResult<String>>),
    /// Every call fails before producing anything.
    Fail(AppError),
}

pub struct StubAdapter {
    behavior: StubBehavior,
    pull: Option<PullMode>,
    calls: AtomicUsize,
    last_request: Mutex<Option<LLMRequest>>,
}

impl StubAdapter {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            pull: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn text(fragments: &[&str]) -> Self {
        Self::new(StubBehavior::Fragments(
            fragments.iter().map(|f| Ok(f.to_string())).collect(),
        ))
    }

    pub fn with_pull(mut self, mode: PullMode) -> Self {
        self.pull = Some(mode);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LLMRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn record(&self, request: &LLMRequest) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
    }
}

#[async_trait]
impl LLMAdapter for StubAdapter {
    fn name(&self) -> &str {
        "stub"
    }

    fn base_url(&self) -> &str {
        "http://stub.invalid"
    }

    fn default_model(&self) -> &str {
        "stub-model"
    }

    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.record(request);
        match &self.behavior {
            StubBehavior::Fail(err) => Err(err.clone()),
            StubBehavior::Fragments(items) => {
                let mut content = String::new();
                for item in items {
                    content.push_str(&item.clone()?);
                }
                Ok(LLMResponse {
                    content,
                    finish_reason: "stop".to_string(),
                    usage: TokenUsage::default(),
                })
            }
        }
    }

    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<FragmentStream> {
        self.record(request);
        match &self.behavior {
            StubBehavior::Fail(err) => Err(err.clone()),
            StubBehavior::Fragments(items) => Ok(stream::iter(items.clone()).boxed()),
        }
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        match &self.behavior {
            StubBehavior::Fail(err) => Err(err.clone()),
            StubBehavior::Fragments(_) => Ok(vec![ModelInfo::named("stub-model"), ModelInfo::named("other")]),
        }
    }

    async fn pull_model(&self, model: &str) -> AppResult<PullOutcome> {
        match self.pull {
            None => Err(AppError::Unsupported {
                backend: "stub".to_string(),
                operation: format!("pulling model {}", model),
            }),
            Some(PullMode::Synchronous) => Ok(PullOutcome::Completed),
            Some(PullMode::Background) => Ok(PullOutcome::Initiated),
        }
    }

    fn pull_mode(&self) -> PullMode {
        self.pull.unwrap_or(PullMode::Synchronous)
    }

    fn supports_pull(&self) -> bool {
        self.pull.is_some()
    }
}

/// A backend that accepts connections and never writes a byte. Returns its
/// base URL; connections are held open until the test runtime shuts down.
pub async fn silent_backend() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}
