use crate::config::LLMConfig;
use crate::llm::provider::LLMAdapter;
use crate::llm::stream::FragmentStream;
use crate::types::{AppResult, LLMRequest, LLMResponse, ModelInfo};
use async_trait::async_trait;

const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";

pub struct GroqAdapter {
    inner: crate::llm::openai::OpenAIAdapter,
}

impl GroqAdapter {
    pub fn new(api_key: &str, default_model: &str) -> AppResult<Self> {
        Self::new_with_api_base(api_key, GROQ_API_BASE, default_model)
    }

    pub fn new_with_api_base(api_key: &str, api_base: &str, default_model: &str) -> AppResult<Self> {
        Ok(Self {
            inner: crate::llm::openai::OpenAIAdapter::with_name("groq", api_key, api_base, default_model)?,
        })
    }

    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let adapter = Self::new_with_api_base(&config.groq_api_key, &config.base_url, &config.default_model)?;
        Ok(Self {
            inner: adapter
                .inner
                .with_timeouts(config.request_timeout(), config.stream_idle_timeout()),
        })
    }
}

#[async_trait]
impl LLMAdapter for GroqAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    fn default_model(&self) -> &str {
        self.inner.default_model()
    }

    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.inner.create_chat_completion(request).await
    }

    async fn create_chat_completion_stream(&self, request: &LLMRequest) -> AppResult<FragmentStream> {
        self.inner.stream_chat(request).await
    }

    async fn list_models(&self) -> AppResult<Vec<ModelInfo>> {
        self.inner.list_models().await
    }
}
