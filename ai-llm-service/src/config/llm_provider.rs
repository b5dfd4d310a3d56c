use crate::error_handler::ConfigError;

/// Represents the provider (backend) used for large language model (LLM) inference.
///
/// This enum distinguishes between a local Ollama runtime and an
/// OpenAI-compatible HTTP API. Adding more providers in the future
/// (e.g., Anthropic Claude, Mistral API) can be done by extending this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// OpenAI-compatible chat completions API.
    OpenAi,
}

impl LlmProvider {
    /// Parses a provider name as found in `LLM_PROVIDER`.
    ///
    /// Accepted values (case-insensitive): `ollama`, `openai`, `chatgpt`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" | "chatgpt" => Ok(Self::OpenAi),
            other => Err(ConfigError::UnsupportedProvider(other.to_string())),
        }
    }
}
