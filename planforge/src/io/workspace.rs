//! Workspace state store: one directory per project under the workspace root.
//!
//! ```text
//! <workspace>/
//! ├── planforge.toml
//! └── <safe_name>/
//!     ├── build_plan.md
//!     ├── build_report.md
//!     ├── project.json
//!     ├── code/
//!     │   ├── src/
//!     │   └── tests/
//!     └── run_logs/
//!         └── <timestamp>_<tag>.log
//! ```

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::naming::sanitize_name;
use crate::core::types::ExecutionOutcome;
use crate::io::atomic::{write_atomic, write_json_atomic};

pub const PLAN_FILE: &str = "build_plan.md";
pub const REPORT_FILE: &str = "build_report.md";
pub const STATUS_FILE: &str = "project.json";
pub const CODE_DIR: &str = "code";
pub const LOGS_DIR: &str = "run_logs";
/// Language recorded for new projects.
pub const DEFAULT_LANGUAGE: &str = "python";

/// Project lifecycle. Completion is signalled by the report, not a status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Initialized,
    Planning,
    Building,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Initialized => "initialized",
            ProjectStatus::Planning => "planning",
            ProjectStatus::Building => "building",
        }
    }
}

/// Contents of `project.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub safe_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub request: Option<String>,
    pub status: ProjectStatus,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub framework: Option<String>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

/// Well-known paths inside one project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub dir: PathBuf,
    pub plan_path: PathBuf,
    pub report_path: PathBuf,
    pub status_path: PathBuf,
    pub code_dir: PathBuf,
    pub src_dir: PathBuf,
    pub tests_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(dir: &Path) -> Self {
        let code_dir = dir.join(CODE_DIR);
        Self {
            dir: dir.to_path_buf(),
            plan_path: dir.join(PLAN_FILE),
            report_path: dir.join(REPORT_FILE),
            status_path: dir.join(STATUS_FILE),
            src_dir: code_dir.join("src"),
            tests_dir: code_dir.join("tests"),
            code_dir,
            logs_dir: dir.join(LOGS_DIR),
        }
    }
}

/// One row of `list_projects`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjectSummary {
    pub name: String,
    pub safe_name: String,
    pub path: PathBuf,
    /// Lifecycle status, or `unknown` when the status record cannot be read.
    pub status: String,
    pub created_at: Option<DateTime<Utc>>,
    pub has_report: bool,
}

/// A command run to be recorded under `run_logs/`.
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub command: &'a str,
    pub step_title: Option<&'a str>,
    /// `None` for the initial run, `Some(n)` for fix attempt `n`.
    pub retry: Option<u32>,
    pub outcome: &'a ExecutionOutcome,
}

impl LogRecord<'_> {
    fn tag(&self) -> String {
        match self.retry {
            Some(n) => format!("retry{n}"),
            None => "run".to_string(),
        }
    }
}

/// A previously written run log.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LogFile {
    pub filename: String,
    pub path: PathBuf,
    pub content: String,
}

/// Owns the on-disk layout of every project in a workspace.
#[derive(Debug, Clone)]
pub struct WorkspaceStore {
    root: PathBuf,
}

impl WorkspaceStore {
    /// Open (creating if needed) the workspace at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("create workspace {}", root.display()))?;
        let root = std::path::absolute(root)
            .with_context(|| format!("resolve workspace {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths for `name` whether or not the project exists.
    pub fn paths_for(&self, name: &str) -> ProjectPaths {
        ProjectPaths::new(&self.root.join(sanitize_name(name)))
    }

    pub fn project_exists(&self, name: &str) -> bool {
        self.paths_for(name).dir.is_dir()
    }

    /// Paths for an existing project.
    pub fn project(&self, name: &str) -> Result<ProjectPaths> {
        let paths = self.paths_for(name);
        if !paths.dir.is_dir() {
            return Err(anyhow!("project '{}' not found", name));
        }
        Ok(paths)
    }

    /// Create the project layout. Idempotent: an existing status record is kept.
    pub fn init_project(&self, name: &str, request: Option<&str>) -> Result<ProjectPaths> {
        let paths = self.paths_for(name);
        for dir in [&paths.dir, &paths.src_dir, &paths.tests_dir, &paths.logs_dir] {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }
        if !paths.status_path.exists() {
            let info = ProjectInfo {
                name: name.to_string(),
                safe_name: sanitize_name(name),
                created_at: Utc::now(),
                updated_at: None,
                request: request.map(str::to_string),
                status: ProjectStatus::Initialized,
                language: default_language(),
                framework: None,
            };
            write_json_atomic(&paths.status_path, &info)?;
            debug!(project = %info.safe_name, "initialized project");
        }
        Ok(paths)
    }

    pub fn read_status(&self, name: &str) -> Result<ProjectInfo> {
        let paths = self.project(name)?;
        read_info(&paths.status_path)
    }

    /// Store the original request on an existing project.
    pub fn set_request(&self, name: &str, request: &str) -> Result<()> {
        let paths = self.project(name)?;
        let mut info = read_info(&paths.status_path)?;
        info.request = Some(request.to_string());
        info.updated_at = Some(Utc::now());
        write_json_atomic(&paths.status_path, &info)
    }

    /// All projects with a status record, sorted by directory name.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let mut projects = Vec::new();
        let entries = fs::read_dir(&self.root)
            .with_context(|| format!("read workspace {}", self.root.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("read workspace {}", self.root.display()))?;
            let path = entry.path();
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if !path.is_dir() || dir_name.starts_with('.') {
                continue;
            }
            let paths = ProjectPaths::new(&path);
            if !paths.status_path.exists() {
                continue;
            }
            let has_report = paths.report_path.exists();
            let summary = match read_info(&paths.status_path) {
                Ok(info) => ProjectSummary {
                    name: info.name,
                    safe_name: info.safe_name,
                    path,
                    status: info.status.as_str().to_string(),
                    created_at: Some(info.created_at),
                    has_report,
                },
                Err(err) => {
                    warn!(project = %dir_name, err = %format!("{err:#}"), "unreadable status record");
                    ProjectSummary {
                        name: dir_name.clone(),
                        safe_name: dir_name,
                        path,
                        status: "unknown".to_string(),
                        created_at: None,
                        has_report,
                    }
                }
            };
            projects.push(summary);
        }
        projects.sort_by(|a, b| a.safe_name.cmp(&b.safe_name));
        Ok(projects)
    }

    /// Remove the project directory and everything in it.
    pub fn delete_project(&self, name: &str) -> Result<()> {
        let paths = self.project(name)?;
        fs::remove_dir_all(&paths.dir).with_context(|| format!("delete {}", paths.dir.display()))
    }

    pub fn read_plan(&self, name: &str) -> Result<Option<String>> {
        let paths = self.project(name)?;
        read_optional(&paths.plan_path)
    }

    /// Persist the plan and move the project to `planning`.
    pub fn write_plan(&self, name: &str, content: &str) -> Result<PathBuf> {
        let paths = self.project(name)?;
        write_atomic(&paths.plan_path, content.as_bytes())?;
        self.update_status(&paths, ProjectStatus::Planning);
        Ok(paths.plan_path)
    }

    pub fn read_report(&self, name: &str) -> Result<Option<String>> {
        let paths = self.project(name)?;
        read_optional(&paths.report_path)
    }

    /// Persist the report and move the project to `building`.
    pub fn write_report(&self, name: &str, content: &str) -> Result<PathBuf> {
        let paths = self.project(name)?;
        write_atomic(&paths.report_path, content.as_bytes())?;
        self.update_status(&paths, ProjectStatus::Building);
        Ok(paths.report_path)
    }

    /// Write a new run log. Existing logs are never overwritten.
    pub fn log_execution(&self, name: &str, record: &LogRecord<'_>) -> Result<PathBuf> {
        let paths = self.project(name)?;
        fs::create_dir_all(&paths.logs_dir)
            .with_context(|| format!("create {}", paths.logs_dir.display()))?;
        let now = Utc::now();
        let stem = format!("{}_{}", now.format("%Y%m%d_%H%M%S_%6f"), record.tag());
        let body = render_log(record, now);

        for n in 1u32.. {
            let filename = if n == 1 {
                format!("{stem}.log")
            } else {
                format!("{stem}_{n}.log")
            };
            let path = paths.logs_dir.join(filename);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())
                        .with_context(|| format!("write {}", path.display()))?;
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("create {}", path.display()));
                }
            }
        }
        Err(anyhow!("no free log file name for {stem}"))
    }

    /// The `count` most recent run logs, newest first.
    pub fn recent_logs(&self, name: &str, count: usize) -> Result<Vec<LogFile>> {
        let paths = self.project(name)?;
        if !paths.logs_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files: Vec<(String, PathBuf)> = fs::read_dir(&paths.logs_dir)
            .with_context(|| format!("read {}", paths.logs_dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| (entry.file_name().to_string_lossy().into_owned(), entry.path()))
            .filter(|(filename, path)| filename.ends_with(".log") && path.is_file())
            .collect();
        files.sort_by(|a, b| log_sort_key(&b.0).cmp(&log_sort_key(&a.0)));

        files
            .into_iter()
            .take(count)
            .map(|(filename, path)| {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?;
                Ok(LogFile {
                    filename,
                    path,
                    content,
                })
            })
            .collect()
    }

    fn update_status(&self, paths: &ProjectPaths, status: ProjectStatus) {
        let result = read_info(&paths.status_path).and_then(|mut info| {
            info.status = status;
            info.updated_at = Some(Utc::now());
            write_json_atomic(&paths.status_path, &info)
        });
        if let Err(err) = result {
            warn!(
                path = %paths.status_path.display(),
                err = %format!("{err:#}"),
                "could not update project status"
            );
        }
    }
}

/// Sort key that orders `<stem>.log` before `<stem>_2.log` before `<stem>_10.log`.
fn log_sort_key(filename: &str) -> (String, u32) {
    let stem = filename.trim_end_matches(".log");
    if let Some((base, suffix)) = stem.rsplit_once('_')
        && let Ok(n) = suffix.parse::<u32>()
    {
        return (base.to_string(), n);
    }
    (stem.to_string(), 1)
}

fn read_info(path: &Path) -> Result<ProjectInfo> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}

fn render_log(record: &LogRecord<'_>, at: DateTime<Utc>) -> String {
    let outcome = record.outcome;
    let attempt = match record.retry {
        Some(n) => format!("fix attempt {n}"),
        None => "initial run".to_string(),
    };
    format!(
        "# Execution Log\n\
         **Timestamp:** {}\n\
         **Command:** `{}`\n\
         **Step:** {}\n\
         **Attempt:** {}\n\
         **Exit Code:** {}\n\
         **Success:** {}\n\
         **Duration:** {}ms\n\
         \n\
         ## STDOUT\n```\n{}\n```\n\
         \n\
         ## STDERR\n```\n{}\n```\n\
         \n\
         ## Error\n{}\n",
        at.to_rfc3339(),
        record.command,
        record.step_title.unwrap_or("N/A"),
        attempt,
        outcome.exit_code,
        outcome.success,
        outcome.duration_ms(),
        outcome.stdout.trim_end(),
        outcome.stderr.trim_end(),
        outcome.error.as_deref().unwrap_or("None"),
    )
}
