use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    pub resolution: ResolutionConfig,
    pub labeling: LabelingConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub path: String,
}

/// Thresholds for the two resolution passes. Tuned empirically; only the
/// ordering explicit > name-match is relied on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub explicit_accept_threshold: f64,
    pub explicit_precedence_margin: f64,
    pub explicit_max_candidates: usize,
    pub name_accept_threshold: f64,
    pub name_max_ngram: usize,
    pub name_min_alias_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelingConfig {
    pub max_retries: u32,
    pub excerpt_chars: usize,
    pub confidence_floor: f64,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: String, // "ollama" or "command"
    pub ollama_url: String,
    pub primary_model: String,
    pub command_path: String,
    pub command_model_path: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub connect_attempts: usize,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            explicit_accept_threshold: 0.85,
            explicit_precedence_margin: 0.05,
            explicit_max_candidates: 5,
            name_accept_threshold: 0.6,
            name_max_ngram: 5,
            name_min_alias_len: 4,
        }
    }
}

impl Default for LabelingConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            excerpt_chars: 600,
            confidence_floor: 0.5,
            max_in_flight: 2,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            primary_model: "llama3.1:8b".to_string(),
            command_path: "llama-cli".to_string(),
            command_model_path: "models/llama-3.1-8b.gguf".to_string(),
            timeout_seconds: 120,
            max_tokens: 256,
            connect_attempts: 3,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig {
                path: "config/company_tickers.csv".to_string(),
            },
            resolution: ResolutionConfig::default(),
            labeling: LabelingConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

/// Read `key` from the environment, falling back to `default`.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {} value: {}", key, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file - this sets env vars that aren't already set
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let config = Config {
            registry: RegistryConfig {
                path: env_or("REGISTRY_PATH", defaults.registry.path)?,
            },
            resolution: ResolutionConfig {
                explicit_accept_threshold: env_or(
                    "EXPLICIT_ACCEPT_THRESHOLD",
                    defaults.resolution.explicit_accept_threshold,
                )?,
                explicit_precedence_margin: env_or(
                    "EXPLICIT_PRECEDENCE_MARGIN",
                    defaults.resolution.explicit_precedence_margin,
                )?,
                explicit_max_candidates: env_or(
                    "EXPLICIT_MAX_CANDIDATES",
                    defaults.resolution.explicit_max_candidates,
                )?,
                name_accept_threshold: env_or(
                    "NAME_ACCEPT_THRESHOLD",
                    defaults.resolution.name_accept_threshold,
                )?,
                name_max_ngram: env_or("NAME_MAX_NGRAM", defaults.resolution.name_max_ngram)?,
                name_min_alias_len: env_or(
                    "NAME_MIN_ALIAS_LEN",
                    defaults.resolution.name_min_alias_len,
                )?,
            },
            labeling: LabelingConfig {
                max_retries: env_or("LABEL_MAX_RETRIES", defaults.labeling.max_retries)?,
                excerpt_chars: env_or("LABEL_EXCERPT_CHARS", defaults.labeling.excerpt_chars)?,
                confidence_floor: env_or(
                    "LABEL_CONFIDENCE_FLOOR",
                    defaults.labeling.confidence_floor,
                )?,
                max_in_flight: env_or("LABEL_MAX_IN_FLIGHT", defaults.labeling.max_in_flight)?,
            },
            llm: LlmConfig {
                provider: env_or("LLM_PROVIDER", defaults.llm.provider)?,
                ollama_url: env_or("OLLAMA_URL", defaults.llm.ollama_url)?,
                primary_model: env_or("PRIMARY_MODEL", defaults.llm.primary_model)?,
                command_path: env_or("LLM_COMMAND", defaults.llm.command_path)?,
                command_model_path: env_or("LLM_MODEL_PATH", defaults.llm.command_model_path)?,
                timeout_seconds: env_or("LLM_TIMEOUT_SECONDS", defaults.llm.timeout_seconds)?,
                max_tokens: env_or("LLM_MAX_TOKENS", defaults.llm.max_tokens)?,
                connect_attempts: env_or("LLM_CONNECT_ATTEMPTS", defaults.llm.connect_attempts)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the precision-first ordering.
    pub fn validate(&self) -> Result<()> {
        let r = &self.resolution;
        for (name, value) in [
            ("EXPLICIT_ACCEPT_THRESHOLD", r.explicit_accept_threshold),
            ("NAME_ACCEPT_THRESHOLD", r.name_accept_threshold),
            ("LABEL_CONFIDENCE_FLOOR", self.labeling.confidence_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if r.explicit_accept_threshold <= r.name_accept_threshold {
            anyhow::bail!(
                "EXPLICIT_ACCEPT_THRESHOLD ({}) must exceed NAME_ACCEPT_THRESHOLD ({})",
                r.explicit_accept_threshold,
                r.name_accept_threshold
            );
        }
        if r.name_max_ngram == 0 {
            anyhow::bail!("NAME_MAX_NGRAM must be at least 1");
        }
        if self.labeling.max_in_flight == 0 {
            anyhow::bail!("LABEL_MAX_IN_FLIGHT must be at least 1");
        }
        Ok(())
    }
}
