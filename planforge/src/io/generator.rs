//! Text-generation backend abstraction.
//!
//! The [`Generator`] trait decouples the engine from the model runtime. The
//! shipped [`CommandGenerator`] pipes the prompt into a configured command
//! (e.g. `ollama run <model>`); tests use scripted generators that return
//! predetermined responses without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::GeneratorConfig;
use crate::io::process::run_command_with_timeout;

/// Environment variable carrying the sampling temperature to the backend command.
pub const TEMPERATURE_ENV: &str = "PLANFORGE_TEMPERATURE";

/// Temperatures used for each kind of request.
pub const PLAN_TEMPERATURE: f32 = 0.7;
pub const FILE_TEMPERATURE: f32 = 0.4;
pub const FIX_TEMPERATURE: f32 = 0.3;

/// One prompt pair sent to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Abstraction over text-generation backends.
pub trait Generator {
    /// Produce a response for `request`. Failures and timeouts are errors.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

impl<G: Generator + ?Sized> Generator for &G {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request)
    }
}

/// Generator that runs an external command with the prompt on stdin.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    config: GeneratorConfig,
}

impl CommandGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(program = %self.config.command.first().map(String::as_str).unwrap_or_default(), temperature = request.temperature))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("generator.command is empty"))?;
        info!("requesting generation");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(TEMPERATURE_ENV, request.temperature.to_string());
        let prompt = render_prompt(request);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            timeout,
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run generator {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = timeout.as_secs(), "generator timed out");
            return Err(anyhow!("generation timed out after {:?}", timeout));
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generation failed with status {:?}: {}",
                output.status.code(),
                stderr.trim()
            ));
        }
        let text = output.stdout_text();
        if text.trim().is_empty() {
            return Err(anyhow!("generation returned an empty response"));
        }
        debug!(response_chars = text.len(), "generation completed");
        Ok(text)
    }
}

/// Single-stream prompt for backends that read one text blob.
fn render_prompt(request: &GenerationRequest) -> String {
    format!("{}\n\n{}\n", request.system.trim_end(), request.user.trim_end())
}
