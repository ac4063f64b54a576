//! Ollama HTTP backend

use anyhow::{Context, Result};
use async_trait::async_trait;
use ollama_rs::{
    generation::{completion::request::GenerationRequest, options::GenerationOptions},
    Ollama,
};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};
use tracing::{debug, warn};
use url::Url;

use super::{GenerateOptions, ModelBackend};
use crate::config::LlmConfig;
use crate::errors::BackendError;

#[derive(Debug, Clone)]
pub struct OllamaBackend {
    ollama: Ollama,
    model: String,
    timeout_seconds: u64,
    connect_attempts: usize,
}

impl OllamaBackend {
    pub fn new(ollama_url: &str, model: &str, timeout_seconds: u64, connect_attempts: usize) -> Result<Self> {
        let parsed_url = Url::parse(ollama_url).context("Invalid Ollama URL")?;
        let host = parsed_url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("No host in Ollama URL"))?;
        let port = parsed_url.port().unwrap_or(11434);

        let ollama = Ollama::new(format!("{}://{}", parsed_url.scheme(), host), port);

        Ok(Self {
            ollama,
            model: model.to_string(),
            timeout_seconds,
            connect_attempts: connect_attempts.max(1),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            &config.ollama_url,
            &config.primary_model,
            config.timeout_seconds,
            config.connect_attempts,
        )
    }

    async fn attempt(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        let generation_options = GenerationOptions::default()
            .num_predict(options.max_tokens as i32)
            .temperature(options.temperature)
            .stop(options.stop.clone());
        let request = GenerationRequest::new(self.model.clone(), prompt.to_string())
            .options(generation_options);

        match timeout(Duration::from_secs(self.timeout_seconds), self.ollama.generate(request)).await {
            Ok(Ok(response)) => Ok(response.response),
            Ok(Err(e)) => Err(BackendError::Unavailable(format!("Ollama API error: {}", e))),
            Err(_) => Err(BackendError::Timeout {
                timeout_seconds: self.timeout_seconds,
            }),
        }
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Generating with Ollama");

        let retry_strategy = ExponentialBackoff::from_millis(250)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.connect_attempts - 1);

        RetryIf::spawn(
            retry_strategy,
            || self.attempt(prompt, options),
            |e: &BackendError| {
                let retry = e.is_retryable();
                if retry {
                    warn!(model = %self.model, error = %e, "Retrying Ollama request");
                }
                retry
            },
        )
        .await
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
