use std::sync::Arc;

use crate::config::Config;
use crate::llm::LLMAdapter;
use crate::prompts::PromptKind;
use crate::types::ModelInfo;

/// Shared, read-only state handed to every handler. The adapter is injected
/// so tests can substitute a stub backend.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub llm: Arc<dyn LLMAdapter>,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn LLMAdapter>) -> Self {
        Self { config, llm }
    }
}

/// Body of `/api/generateLesson` and `/api/generateQuizzes`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub user_input: Option<String>,
    #[serde(default)]
    pub lesson_content: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl GenerateRequest {
    /// The subject text for this kind of generation. Lessons read `userInput`
    /// first, quizzes read `lessonContent` first; either falls back to the
    /// other field. Empty strings count as missing.
    pub fn subject_for(&self, kind: PromptKind) -> Option<&str> {
        let (primary, fallback) = match kind {
            PromptKind::Lesson => (&self.user_input, &self.lesson_content),
            PromptKind::Quiz => (&self.lesson_content, &self.user_input),
        };
        primary
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
    }

    pub fn model_override(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelsResponse {
    pub status: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct PullModelRequest {
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PullModelResponse {
    pub message: String,
    pub status: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub provider: String,
    pub base_url: String,
    pub default_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_models: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}
