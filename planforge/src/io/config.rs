//! Engine configuration stored at `<workspace>/planforge.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::atomic::write_atomic;

/// File name of the config inside the workspace root.
pub const CONFIG_FILE_NAME: &str = "planforge.toml";

/// Engine configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take their defaults, so an
/// empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling on generate-apply-rerun cycles after a command step fails.
    pub max_fix_attempts: u32,

    /// Directory whose `architect.md` / `developer.md` replace the built-in
    /// system prompts. Relative paths resolve against the workspace root.
    pub prompts_dir: Option<PathBuf>,

    pub sandbox: SandboxConfig,
    pub generator: GeneratorConfig,
    pub context: ContextConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Default timeout for plan commands.
    pub command_timeout_secs: u64,
    pub test_timeout_secs: u64,
    pub install_timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes each.
    pub output_limit_bytes: usize,
    /// Interpreter used by `run_script` (e.g. `python`).
    pub script_interpreter: String,
    /// Test runner invocation; a target file is appended when given.
    pub test_command: String,
    /// Dependency installer invocation; the manifest file name is appended.
    pub install_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Program and arguments; the prompt is written to its stdin.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Combined system + user prompt budget in characters.
    pub max_context_chars: usize,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextConfig {
    /// Files included in file-step and fix prompts.
    pub max_files: usize,
    /// Characters kept per file before a truncation marker.
    pub max_file_chars: usize,
    /// Files included in the final build report.
    pub report_max_files: usize,
    /// Most recent run logs listed in the final build report.
    pub report_log_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: 3,
            prompts_dir: None,
            sandbox: SandboxConfig::default(),
            generator: GeneratorConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: 60,
            test_timeout_secs: 120,
            install_timeout_secs: 300,
            output_limit_bytes: 1_000_000,
            script_interpreter: "python".to_string(),
            test_command: "python -m pytest -v".to_string(),
            install_command: "pip install -r".to_string(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "ollama".to_string(),
                "run".to_string(),
                "granite4:3b".to_string(),
            ],
            timeout_secs: 600,
            max_context_chars: 100_000,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_chars: 2000,
            report_max_files: 20,
            report_log_count: 5,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_fix_attempts == 0 {
            return Err(anyhow!("max_fix_attempts must be > 0"));
        }
        let sandbox = &self.sandbox;
        if sandbox.command_timeout_secs == 0
            || sandbox.test_timeout_secs == 0
            || sandbox.install_timeout_secs == 0
        {
            return Err(anyhow!("sandbox timeouts must be > 0"));
        }
        if sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        for (name, value) in [
            ("sandbox.script_interpreter", &sandbox.script_interpreter),
            ("sandbox.test_command", &sandbox.test_command),
            ("sandbox.install_command", &sandbox.install_command),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must not be empty"));
            }
        }
        let generator = &self.generator;
        if generator.command.is_empty() || generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if generator.timeout_secs == 0 {
            return Err(anyhow!("generator.timeout_secs must be > 0"));
        }
        if generator.max_context_chars < 100 {
            return Err(anyhow!("generator.max_context_chars must be >= 100"));
        }
        if generator.output_limit_bytes == 0 {
            return Err(anyhow!("generator.output_limit_bytes must be > 0"));
        }
        if self.context.max_files == 0 || self.context.report_max_files == 0 {
            return Err(anyhow!("context file limits must be > 0"));
        }
        if self.context.max_file_chars == 0 {
            return Err(anyhow!("context.max_file_chars must be > 0"));
        }
        Ok(())
    }

    /// `prompts_dir` resolved against the workspace root.
    pub fn prompts_dir_in(&self, workspace_root: &Path) -> Option<PathBuf> {
        self.prompts_dir.as_ref().map(|dir| workspace_root.join(dir))
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, buf.as_bytes())
}
