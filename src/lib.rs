// Lesson Relay - lesson and quiz generation over OpenAI, Groq or Ollama

pub mod config;
pub mod types;
pub mod models;
pub mod prompts;
pub mod llm;
pub mod relay;     // SSE stream sessions
pub mod routes;
pub mod middleware;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
