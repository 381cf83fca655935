//! Prompt and report rendering with minijinja templates.
//!
//! Built-in templates are compiled into the binary. A prompts directory may
//! override the two system prompts (`architect.md`, `developer.md`); overrides
//! are rendered with the same variables as the built-ins.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::types::Step;

const ARCHITECT_TEMPLATE: &str = include_str!("prompts/architect.md");
const PLAN_REQUEST_TEMPLATE: &str = include_str!("prompts/plan_request.md");
const DEVELOPER_TEMPLATE: &str = include_str!("prompts/developer.md");
const FILE_STEP_TEMPLATE: &str = include_str!("prompts/file_step.md");
const FIX_REQUEST_TEMPLATE: &str = include_str!("prompts/fix_request.md");
const REPORT_TEMPLATE: &str = include_str!("prompts/report.md");

pub const ARCHITECT_OVERRIDE_FILE: &str = "architect.md";
pub const DEVELOPER_OVERRIDE_FILE: &str = "developer.md";

/// Variables for the fix request.
#[derive(Debug, Clone, Serialize)]
pub struct FixContext<'a> {
    pub command: &'a str,
    pub exit_code: i32,
    pub error: Option<&'a str>,
    pub stdout: &'a str,
    pub stderr: &'a str,
    pub files: &'a str,
    pub attempt: u32,
    pub max_attempts: u32,
}

/// Variables for the final build report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext<'a> {
    pub project: &'a str,
    pub completed_at: String,
    pub request: Option<&'a str>,
    pub files: &'a str,
    pub logs: Vec<String>,
    pub completed: usize,
    pub total: usize,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    architect_override: Option<String>,
    developer_override: Option<String>,
}

impl PromptEngine {
    /// Register the built-in templates and load overrides from `overrides_dir`.
    pub fn new(overrides_dir: Option<&Path>) -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("architect", ARCHITECT_TEMPLATE),
            ("plan_request", PLAN_REQUEST_TEMPLATE),
            ("developer", DEVELOPER_TEMPLATE),
            ("file_step", FILE_STEP_TEMPLATE),
            ("fix_request", FIX_REQUEST_TEMPLATE),
            ("report", REPORT_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("compile {name} template"))?;
        }

        let (architect_override, developer_override) = match overrides_dir {
            Some(dir) => (
                read_override(&dir.join(ARCHITECT_OVERRIDE_FILE))?,
                read_override(&dir.join(DEVELOPER_OVERRIDE_FILE))?,
            ),
            None => (None, None),
        };

        Ok(Self {
            env,
            architect_override,
            developer_override,
        })
    }

    /// System prompt for plan generation.
    pub fn architect_system(
        &self,
        request: &str,
        language: &str,
        current_date: &str,
    ) -> Result<String> {
        let ctx = context! {
            request => request.trim(),
            language => language,
            current_date => current_date,
        };
        self.render_system("architect", self.architect_override.as_deref(), ctx)
    }

    pub fn plan_request(&self, request: &str) -> Result<String> {
        self.render("plan_request", context! { request => request.trim() })
    }

    /// System prompt for file and fix requests.
    pub fn developer_system(&self, language: &str) -> Result<String> {
        let ctx = context! { language => language };
        self.render_system("developer", self.developer_override.as_deref(), ctx)
    }

    pub fn file_step(&self, step: &Step, files: &str) -> Result<String> {
        self.render("file_step", context! { step => step, files => files })
    }

    pub fn fix_request(&self, fix: &FixContext<'_>) -> Result<String> {
        self.render(
            "fix_request",
            context! {
                command => fix.command,
                exit_code => fix.exit_code,
                error => fix.error,
                stdout => fix.stdout.trim_end(),
                stderr => fix.stderr.trim_end(),
                files => fix.files,
                attempt => fix.attempt,
                max_attempts => fix.max_attempts,
            },
        )
    }

    pub fn report(&self, report: &ReportContext<'_>) -> Result<String> {
        let mut rendered = self.render("report", minijinja::Value::from_serialize(report))?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        Ok(rendered)
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render {name} template"))
    }

    fn render_system(
        &self,
        name: &str,
        override_source: Option<&str>,
        ctx: minijinja::Value,
    ) -> Result<String> {
        match override_source {
            Some(source) => self
                .env
                .render_str(source, ctx)
                .with_context(|| format!("render {name} override")),
            None => self.render(name, ctx),
        }
    }
}

fn read_override(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    debug!(path = %path.display(), "loading prompt override");
    let source = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(Some(source))
}
