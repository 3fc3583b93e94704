use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::types::{LLMProvider, PullMode};

/// Command-line overrides, applied on top of the environment.
#[derive(Debug, Parser)]
#[command(name = "lesson-relay", version, about = "Lesson and quiz generation relay")]
pub struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Backend provider: ollama, openai or groq (overrides LLM_PROVIDER)
    #[arg(long)]
    pub provider: Option<String>,

    /// Default model (overrides LLM_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub base_url: String,
    pub default_model: String,
    pub openai_api_key: String,
    pub groq_api_key: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub pull_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub pull_mode: PullMode,
}

// Keys stay out of the startup log.
impl std::fmt::Debug for LLMConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LLMConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("has_api_key", &self.active_api_key().is_some())
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pull_timeout_secs", &self.pull_timeout_secs)
            .field("stream_idle_timeout_secs", &self.stream_idle_timeout_secs)
            .field("pull_mode", &self.pull_mode)
            .finish()
    }
}

impl LLMConfig {
    /// API key for the active provider, if that provider needs one and it is set.
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider {
            LLMProvider::OpenAI => &self.openai_api_key,
            LLMProvider::Groq => &self.groq_api_key,
            LLMProvider::Ollama => return None,
        };
        if key.is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_secs(self.pull_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Generic variable first; the Ollama-specific alias only counts when Ollama is active.
fn resolve(provider: &LLMProvider, name: &str, ollama_alias: &str) -> Option<String> {
    non_empty_var(name).or_else(|| match provider {
        LLMProvider::Ollama => non_empty_var(ollama_alias),
        _ => None,
    })
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider: LLMProvider = env::var("LLM_PROVIDER")
            .unwrap_or_else(|_| "ollama".to_string())
            .parse()?;

        Ok(Self {
            server: ServerConfig {
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8081".to_string())
                    .parse()
                    .context("PORT must be a valid port number")?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "*".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            llm: LLMConfig {
                base_url: resolve(&provider, "LLM_BASE_URL", "OLLAMA_BASE_URL")
                    .unwrap_or_else(|| provider.default_base_url().to_string()),
                default_model: resolve(&provider, "LLM_MODEL", "OLLAMA_MODEL")
                    .unwrap_or_else(|| provider.default_model().to_string()),
                provider,
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                temperature: env::var("LLM_TEMPERATURE")
                    .unwrap_or_else(|_| "0.7".to_string())
                    .parse()
                    .context("LLM_TEMPERATURE must be a number")?,
                top_p: env::var("LLM_TOP_P")
                    .unwrap_or_else(|_| "0.9".to_string())
                    .parse()
                    .context("LLM_TOP_P must be a number")?,
                max_tokens: env::var("LLM_MAX_TOKENS")
                    .unwrap_or_else(|_| "2048".to_string())
                    .parse()
                    .context("LLM_MAX_TOKENS must be a positive integer")?,
                request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .context("REQUEST_TIMEOUT_SECS must be a positive integer")?,
                pull_timeout_secs: env::var("PULL_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .context("PULL_TIMEOUT_SECS must be a positive integer")?,
                stream_idle_timeout_secs: env::var("STREAM_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()
                    .context("STREAM_IDLE_TIMEOUT_SECS must be a positive integer")?,
                pull_mode: env::var("PULL_MODE")
                    .unwrap_or_else(|_| "sync".to_string())
                    .parse()?,
            },
        })
    }

    /// Apply command-line overrides. Switching provider without an explicit
    /// model resets the model to that provider's default.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self> {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(provider) = &cli.provider {
            let provider: LLMProvider = provider.parse()?;
            if provider != self.llm.provider {
                self.llm.base_url = provider.default_base_url().to_string();
                self.llm.default_model = provider.default_model().to_string();
                self.llm.provider = provider;
            }
        }
        if let Some(model) = &cli.model {
            self.llm.default_model = model.clone();
        }
        Ok(self)
    }
}

#[cfg(test)]
pub(crate) fn test_config(provider: LLMProvider, base_url: &str) -> Config {
    Config {
        server: ServerConfig {
            port: 8081,
            host: "127.0.0.1".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        },
        llm: LLMConfig {
            provider,
            base_url: base_url.to_string(),
            default_model: provider.default_model().to_string(),
            openai_api_key: "sk-test".to_string(),
            groq_api_key: "gsk-test".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 2048,
            request_timeout_secs: 5,
            pull_timeout_secs: 5,
            stream_idle_timeout_secs: 5,
            pull_mode: PullMode::Synchronous,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_api_key() {
        let mut config = test_config(LLMProvider::Groq, "http://localhost");
        assert_eq!(config.llm.active_api_key(), Some("gsk-test".to_string()));

        config.llm.groq_api_key.clear();
        assert_eq!(config.llm.active_api_key(), None);

        config.llm.provider = LLMProvider::Ollama;
        assert_eq!(config.llm.active_api_key(), None);
    }

    #[test]
    fn test_cli_provider_switch_resets_defaults() {
        let config = test_config(LLMProvider::Ollama, "http://localhost:11434");
        let cli = Cli::parse_from(["lesson-relay", "--provider", "groq", "--port", "9000"]);

        let config = config.apply_cli(&cli).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.llm.provider, LLMProvider::Groq);
        assert_eq!(config.llm.base_url, LLMProvider::Groq.default_base_url());
        assert_eq!(config.llm.default_model, LLMProvider::Groq.default_model());
    }

    #[test]
    fn test_cli_model_override_wins() {
        let config = test_config(LLMProvider::Ollama, "http://localhost:11434");
        let cli = Cli::parse_from(["lesson-relay", "--provider", "openai", "--model", "gpt-4o-mini"]);

        let config = config.apply_cli(&cli).unwrap();
        assert_eq!(config.llm.provider, LLMProvider::OpenAI);
        assert_eq!(config.llm.default_model, "gpt-4o-mini");
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = test_config(LLMProvider::OpenAI, "https://api.openai.com/v1");
        let printed = format!("{:?}", config.llm);
        assert!(!printed.contains("sk-test"));
        assert!(printed.contains("has_api_key: true"));
    }
}
