//! Shared data types for plan steps and command outcomes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a step is carried out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Generate or modify a file through the generation backend.
    File,
    /// Run a shell command in the project's code directory.
    Command,
    /// Informational step; completes without side effects.
    Other,
}

impl StepKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::File => "file",
            StepKind::Command => "command",
            StepKind::Other => "other",
        }
    }
}

/// One checkbox step, derived from the plan document on every read.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Step {
    pub checked: bool,
    pub title: String,
    pub kind: StepKind,
    pub file_path: Option<String>,
    pub command: Option<String>,
    pub description: Option<String>,
    /// Body text following the title, trimmed.
    pub body: String,
}

/// Completion summary of a plan document.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PlanProgress {
    pub total: usize,
    pub completed: usize,
    pub percent: f64,
    pub all_complete: bool,
}

/// Result of running one command through the sandbox.
///
/// `error` is set for infrastructure failures (containment violation, missing
/// directory, spawn failure, timeout). A non-zero exit leaves it unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, or `-1` when none exists.
    pub exit_code: i32,
    pub duration: Duration,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    /// Failure that never reached (or never finished) the child process.
    pub fn infrastructure(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            duration,
            error: Some(message.into()),
        }
    }

    pub fn duration_ms(&self) -> u128 {
        self.duration.as_millis()
    }
}
