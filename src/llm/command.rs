//! Local model process backend (llama.cpp `llama-cli` and compatibles)

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{truncate_at_stop, GenerateOptions, ModelBackend};
use crate::config::LlmConfig;
use crate::errors::BackendError;

/// Runs one process per prompt. The prompt goes in as an argument; the reply
/// is read from stdout, or stderr when a successful run printed nothing to
/// stdout. A failed exit is always an unavailable backend.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    program: String,
    model_path: String,
    timeout_seconds: u64,
}

impl CommandBackend {
    pub fn new(program: &str, model_path: &str, timeout_seconds: u64) -> Self {
        Self {
            program: program.to_string(),
            model_path: model_path.to_string(),
            timeout_seconds,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(&config.command_path, &config.command_model_path, config.timeout_seconds)
    }

    fn command(&self, prompt: &str, options: &GenerateOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-m")
            .arg(&self.model_path)
            .arg("-p")
            .arg(prompt)
            .arg("-n")
            .arg(options.max_tokens.to_string())
            .arg("--temp")
            .arg(options.temperature.to_string())
            .arg("--no-display-prompt")
            .arg("--single-turn")
            .arg("--simple-io")
            .arg("--log-disable");
        if let Some(schema) = &options.json_schema {
            cmd.arg("--json-schema").arg(schema);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ModelBackend for CommandBackend {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, BackendError> {
        debug!(program = %self.program, prompt_chars = prompt.len(), "Running model command");

        let output = match timeout(
            Duration::from_secs(self.timeout_seconds),
            self.command(prompt, options).output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BackendError::Unavailable(format!(
                    "Failed to run {}: {}",
                    self.program, e
                )))
            }
            Err(_) => {
                return Err(BackendError::Timeout {
                    timeout_seconds: self.timeout_seconds,
                })
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            let detail: String = stderr.chars().take(200).collect();
            warn!(
                program = %self.program,
                status = %output.status,
                stderr = %detail,
                "Model command exited with failure"
            );
            return Err(BackendError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program, output.status, detail
            )));
        }

        let text = if stdout.is_empty() { stderr } else { stdout };
        Ok(truncate_at_stop(&text, &options.stop))
    }

    fn name(&self) -> &str {
        "command"
    }
}
