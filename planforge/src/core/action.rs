//! File actions requested by the generation backend.
//!
//! The backend answers each file or fix request with a single JSON object
//! tagged by `action`. Anything else (prose, several objects, missing fields)
//! is a parse error and fails the step that asked for it.

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::text::strip_code_fences;

/// JSON Schema every action is checked against before deserialization.
pub const ACTION_SCHEMA: &str = include_str!("../../schemas/action.schema.json");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Create or overwrite a file. Without `path` the step's `File:` is used.
    CreateFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        content: String,
    },
    /// Replace a unique occurrence of `old_str` in an existing file.
    StrReplace {
        path: String,
        old_str: String,
        new_str: String,
    },
    AppendToFile {
        path: String,
        content: String,
    },
    /// Nothing to change.
    #[serde(rename = "none")]
    NoOp {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::CreateFile { .. } => "create_file",
            Action::StrReplace { .. } => "str_replace",
            Action::AppendToFile { .. } => "append_to_file",
            Action::NoOp { .. } => "none",
        }
    }

    /// Path named by the action itself, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Action::CreateFile { path, .. } => path.as_deref(),
            Action::StrReplace { path, .. } | Action::AppendToFile { path, .. } => Some(path),
            Action::NoOp { .. } => None,
        }
    }

    /// One-line summary for logs and step reports.
    pub fn summary(&self) -> String {
        match self.path() {
            Some(path) => format!("{} {}", self.kind(), path),
            None => self.kind().to_string(),
        }
    }
}

/// Extract, validate, and deserialize the single action in `raw`.
pub fn parse_action(raw: &str) -> Result<Action> {
    let cleaned = strip_code_fences(raw);
    let json = extract_object(&cleaned)
        .ok_or_else(|| anyhow!("no JSON object in response: {}", preview(&cleaned)))?;
    let value: Value = serde_json::from_str(json).context("parse action json")?;
    validate_action_value(&value)?;
    let action: Action = serde_json::from_value(value).context("deserialize action")?;
    Ok(action)
}

/// Outermost `{ ... }` span: first opening brace to last closing brace.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn validate_action_value(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(ACTION_SCHEMA).context("parse action schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        bail!("action schema validation failed: {}", messages.join("; "));
    }
    Ok(())
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(200).collect();
    if head.len() < text.len() {
        format!("{head}...")
    } else {
        head
    }
}
