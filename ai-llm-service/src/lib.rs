//! Shared LLM service used as the analysis capability of the review pipeline.
//!
//! The crate exposes a single entry point, [`LlmService`], that dispatches to
//! one of the supported providers:
//! - **Ollama**   — local runtime, `POST {endpoint}/api/generate`
//! - **OpenAI**   — OpenAI-compatible API, `POST {endpoint}/v1/chat/completions`
//!
//! Callers treat the service as an opaque text-in/text-out capability:
//! build a prompt, call [`LlmService::generate`], get back the raw model
//! output. Provider selection, endpoints, model names and sampling knobs
//! come strictly from environment variables (see [`config::default_config`]).
//!
//! Dispatch is a plain enum on purpose: no `async_trait`, no boxed futures.

pub mod config;
pub mod error_handler;
pub mod services;

use crate::config::default_config::analysis_config_from_env;
use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::AiLlmError;
use crate::services::ollama_service::OllamaService;
use crate::services::open_ai_service::OpenAiService;

/// Provider-dispatching LLM client.
///
/// Construct with [`LlmService::new`] from an explicit config, or with
/// [`LlmService::from_env`] for the standard env-driven setup.
#[derive(Debug)]
pub enum LlmService {
    /// Local Ollama runtime.
    Ollama(OllamaService),
    /// OpenAI-compatible endpoint.
    OpenAi(OpenAiService),
}

impl LlmService {
    /// Builds the service for the provider named in the config.
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        match cfg.provider {
            LlmProvider::Ollama => Ok(Self::Ollama(OllamaService::new(cfg)?)),
            LlmProvider::OpenAi => Ok(Self::OpenAi(OpenAiService::new(cfg)?)),
        }
    }

    /// Builds the service from environment variables.
    ///
    /// # Errors
    /// Returns [`AiLlmError::Config`] when mandatory variables are missing
    /// or malformed.
    pub fn from_env() -> Result<Self, AiLlmError> {
        Self::new(analysis_config_from_env()?)
    }

    /// Model identifier the service was configured with.
    pub fn model(&self) -> &str {
        match self {
            Self::Ollama(s) => s.model(),
            Self::OpenAi(s) => s.model(),
        }
    }

    /// Single non-streaming generation call.
    ///
    /// Returns the raw model output; the caller owns any further parsing.
    pub async fn generate(&self, prompt: &str) -> Result<String, AiLlmError> {
        match self {
            Self::Ollama(s) => s.generate(prompt).await,
            Self::OpenAi(s) => s.generate(prompt).await,
        }
    }
}
