//! Default LLM configs loaded strictly from environment variables.
//!
//! This module provides the convenience constructor for the **analysis**
//! model used by the review pipeline. Provider selection and all knobs come
//! from the environment; nothing is read from files.
//!
//! # Environment variables
//!
//! Common:
//! - `LLM_PROVIDER`     = provider kind (`ollama` | `openai`), default `ollama`
//! - `LLM_MAX_TOKENS`   = optional max tokens (u32)
//! - `LLM_TEMPERATURE`  = optional sampling temperature (f32), default `0.2`
//! - `LLM_TIMEOUT_SECS` = optional request timeout (u64), default `600`
//!
//! Ollama-specific:
//! - `OLLAMA_URL` or `OLLAMA_PORT` = endpoint (mandatory)
//! - `OLLAMA_MODEL`                = analysis model (mandatory)
//!
//! OpenAI-specific:
//! - `OPENAI_API_KEY` = API key (mandatory)
//! - `OPENAI_MODEL`   = analysis model (mandatory)
//! - `OPENAI_URL`     = API base, default `https://api.openai.com`

use crate::{
    config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider},
    error_handler::{AiLlmError, ConfigError, env_opt_f32, env_opt_u32, env_opt_u64, must_env},
};

/// Resolves the Ollama endpoint strictly from environment.
///
/// Precedence:
/// 1. `OLLAMA_URL` if present and non-empty
/// 2. `OLLAMA_PORT` → `http://localhost:{port}`
///
/// # Errors
///
/// - [`ConfigError::MissingVar`] if both are missing
/// - [`ConfigError::InvalidNumber`] if `OLLAMA_PORT` is invalid
fn ollama_endpoint() -> Result<String, AiLlmError> {
    if let Ok(url) = std::env::var("OLLAMA_URL") {
        if !url.trim().is_empty() {
            return Ok(url);
        }
    }
    if let Ok(port) = std::env::var("OLLAMA_PORT") {
        if !port.trim().is_empty() {
            let _ = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: "OLLAMA_PORT",
                    reason: "expected u16 (1..=65535)",
                })?;
            return Ok(format!("http://localhost:{port}"));
        }
    }
    Err(AiLlmError::Config(ConfigError::MissingVar(
        "OLLAMA_URL or OLLAMA_PORT",
    )))
}

/// Constructs the config for the **analysis** model from environment.
///
/// The same model handles every chunk; there is no fast/slow split here.
///
/// # Defaults
/// - `temperature = 0.2` (review output should be stable)
/// - `timeout_secs = 600`
pub fn analysis_config_from_env() -> Result<LlmModelConfig, AiLlmError> {
    let provider = match std::env::var("LLM_PROVIDER") {
        Ok(raw) if !raw.trim().is_empty() => LlmProvider::parse(&raw)?,
        _ => LlmProvider::Ollama,
    };

    let max_tokens = env_opt_u32("LLM_MAX_TOKENS")?;
    let temperature = env_opt_f32("LLM_TEMPERATURE")?.or(Some(0.2));
    let timeout_secs = env_opt_u64("LLM_TIMEOUT_SECS")?.or(Some(600));

    match provider {
        LlmProvider::Ollama => {
            let endpoint = ollama_endpoint()?;
            let model = must_env("OLLAMA_MODEL")?;

            Ok(LlmModelConfig {
                provider,
                model,
                endpoint,
                api_key: None,
                max_tokens,
                temperature,
                top_p: None,
                timeout_secs,
            })
        }
        LlmProvider::OpenAi => {
            let endpoint = std::env::var("OPENAI_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "https://api.openai.com".to_string());
            let model = must_env("OPENAI_MODEL")?;
            let api_key = must_env("OPENAI_API_KEY")?;

            Ok(LlmModelConfig {
                provider,
                model,
                endpoint,
                api_key: Some(api_key),
                max_tokens,
                temperature,
                top_p: None,
                timeout_secs,
            })
        }
    }
}
