//! Model backends for the labeling stage
//! A backend only has to turn a prompt into text; everything else is the engine's job

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::BackendError;

pub mod command;
pub mod json;
pub mod ollama;

pub use command::CommandBackend;
pub use json::extract_json_object;
pub use ollama::OllamaBackend;

/// Generation knobs passed through to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub stop: Vec<String>,
    pub temperature: f32,
    /// Serialized JSON schema for backends that support constrained decoding.
    pub json_schema: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            stop: Vec::new(),
            temperature: 0.1,
            json_schema: None,
        }
    }
}

impl GenerateOptions {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            ..Self::default()
        }
    }

    pub fn with_json_schema(mut self, schema: &serde_json::Value) -> Self {
        self.json_schema = Some(schema.to_string());
        self
    }
}

/// Anything that can turn a prompt into text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str;
}

/// Cut `text` at the first stop sequence, for backends that cannot stop
/// generation themselves.
pub fn truncate_at_stop(text: &str, stop: &[String]) -> String {
    let cut = stop
        .iter()
        .filter(|s| !s.is_empty())
        .filter_map(|s| text.find(s.as_str()))
        .min()
        .unwrap_or(text.len());
    text[..cut].to_string()
}

/// Build the backend named by `LLM_PROVIDER`.
pub fn backend_from_config(config: &LlmConfig) -> Result<Arc<dyn ModelBackend>> {
    match config.provider.to_lowercase().as_str() {
        "ollama" => Ok(Arc::new(OllamaBackend::from_config(config)?)),
        "command" | "llama-cli" => Ok(Arc::new(CommandBackend::from_config(config))),
        other => anyhow::bail!("Unknown LLM provider '{}'. Use 'ollama' or 'command'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_at_stop() {
        let stop = vec!["\n\n".to_string(), "###".to_string()];
        assert_eq!(truncate_at_stop("{\"a\":1}\n\nmore", &stop), "{\"a\":1}");
        assert_eq!(truncate_at_stop("x ### y \n\n z", &stop), "x ");
        assert_eq!(truncate_at_stop("no stop here", &stop), "no stop here");
        assert_eq!(truncate_at_stop("keep", &[String::new()]), "keep");
    }

    #[test]
    fn test_backend_from_config() {
        let mut config = LlmConfig::default();
        assert_eq!(backend_from_config(&config).unwrap().name(), "ollama");

        config.provider = "command".to_string();
        assert_eq!(backend_from_config(&config).unwrap().name(), "command");

        config.provider = "openai".to_string();
        assert!(backend_from_config(&config).is_err());
    }
}
