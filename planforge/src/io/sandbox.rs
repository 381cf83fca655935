//! Execution sandbox: shell commands confined to a workspace root.
//!
//! Every entry point returns an [`ExecutionOutcome`]; containment violations,
//! missing directories, spawn failures, and timeouts are reported in the
//! outcome rather than as errors.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::core::path::{is_within, normalize_lexical};
use crate::core::types::ExecutionOutcome;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

/// Runs shell commands whose working directory lies under `root`.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    config: SandboxConfig,
}

impl Sandbox {
    /// Create a sandbox rooted at `root` (made absolute, and canonical when it exists).
    pub fn new(root: &Path, config: SandboxConfig) -> Result<Self> {
        let root = resolve_path(root)
            .with_context(|| format!("resolve sandbox root {}", root.display()))?;
        Ok(Self { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// True if `path` resolves to the root or somewhere beneath it.
    pub fn contains(&self, path: &Path) -> bool {
        match resolve_path(path) {
            Ok(resolved) => is_within(&self.root, &resolved),
            Err(_) => false,
        }
    }

    /// Run `command` through the platform shell in `cwd`.
    ///
    /// `timeout` defaults to the configured command timeout. `env` entries are
    /// added on top of the inherited environment.
    #[instrument(skip_all, fields(cwd = %cwd.display()))]
    pub fn run(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Option<Duration>,
        env: &[(&str, &str)],
    ) -> ExecutionOutcome {
        let start = Instant::now();
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_secs(self.config.command_timeout_secs));

        let resolved = match resolve_path(cwd) {
            Ok(path) => path,
            Err(err) => {
                return ExecutionOutcome::infrastructure(
                    format!("Failed to resolve working directory: {err:#}"),
                    start.elapsed(),
                );
            }
        };
        if !is_within(&self.root, &resolved) {
            warn!(root = %self.root.display(), "working directory outside sandbox root");
            return ExecutionOutcome::infrastructure(
                format!(
                    "Security Error: working directory {} is outside the workspace root {}",
                    resolved.display(),
                    self.root.display()
                ),
                start.elapsed(),
            );
        }
        if !resolved.is_dir() {
            return ExecutionOutcome::infrastructure(
                format!("Working directory does not exist: {}", resolved.display()),
                start.elapsed(),
            );
        }

        let mut cmd = shell_command(command);
        cmd.current_dir(&resolved);
        for (key, value) in env {
            cmd.env(key, value);
        }

        debug!(command, "running sandboxed command");
        let output =
            match run_command_with_timeout(cmd, None, timeout, self.config.output_limit_bytes) {
                Ok(output) => output,
                Err(err) => {
                    return ExecutionOutcome::infrastructure(
                        format!("Failed to execute command: {err:#}"),
                        start.elapsed(),
                    );
                }
            };

        let duration = start.elapsed();
        if output.timed_out {
            return ExecutionOutcome::infrastructure(
                format!("Command timed out after {} seconds", timeout.as_secs_f64()),
                duration,
            );
        }

        let exit_code = output.status.code().unwrap_or(-1);
        ExecutionOutcome {
            success: output.status.success(),
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            exit_code,
            duration,
            error: None,
        }
    }

    /// Run a script with the configured interpreter from the script's directory.
    pub fn run_script(
        &self,
        script: &Path,
        args: &[String],
        timeout: Option<Duration>,
    ) -> ExecutionOutcome {
        let (dir, name) = match self.existing_file(script, "Script") {
            Ok(parts) => parts,
            Err(outcome) => return outcome,
        };
        let mut command = format!("{} {}", self.config.script_interpreter, shell_quote(&name));
        for arg in args {
            command.push(' ');
            command.push_str(&shell_quote(arg));
        }
        self.run(&command, &dir, timeout, &[])
    }

    /// Run the configured test command against a test file or directory.
    ///
    /// A file target runs from its parent with the file name appended; a
    /// directory target runs the bare test command inside it.
    pub fn run_tests(&self, target: &Path, timeout: Option<Duration>) -> ExecutionOutcome {
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_secs(self.config.test_timeout_secs));
        if target.is_file() {
            let (dir, name) = match self.existing_file(target, "Test file") {
                Ok(parts) => parts,
                Err(outcome) => return outcome,
            };
            let command = format!("{} {}", self.config.test_command, shell_quote(&name));
            return self.run(&command, &dir, Some(timeout), &[]);
        }
        self.run(&self.config.test_command, target, Some(timeout), &[])
    }

    /// Install dependencies listed in `manifest` with the configured installer.
    pub fn install_dependencies(
        &self,
        manifest: &Path,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome {
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_secs(self.config.install_timeout_secs));
        let (dir, name) = match self.existing_file(manifest, "Manifest") {
            Ok(parts) => parts,
            Err(outcome) => return outcome,
        };
        let command = format!("{} {}", self.config.install_command, shell_quote(&name));
        self.run(&command, &dir, Some(timeout), &[])
    }

    /// Split an in-root file into (parent dir, file name), or an error outcome.
    fn existing_file(
        &self,
        path: &Path,
        label: &str,
    ) -> std::result::Result<(PathBuf, String), ExecutionOutcome> {
        let start = Instant::now();
        let resolved = resolve_path(path).map_err(|err| {
            ExecutionOutcome::infrastructure(
                format!("Failed to resolve {}: {err:#}", path.display()),
                start.elapsed(),
            )
        })?;
        if !is_within(&self.root, &resolved) {
            return Err(ExecutionOutcome::infrastructure(
                format!(
                    "Security Error: {} is outside the workspace root {}",
                    resolved.display(),
                    self.root.display()
                ),
                start.elapsed(),
            ));
        }
        if !resolved.is_file() {
            return Err(ExecutionOutcome::infrastructure(
                format!("{label} not found: {}", resolved.display()),
                start.elapsed(),
            ));
        }
        let name = resolved
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = resolved
            .parent()
            .map_or_else(|| self.root.clone(), Path::to_path_buf);
        Ok((dir, name))
    }
}

/// Absolute form of `path`: canonical when it exists, lexically normalized otherwise.
fn resolve_path(path: &Path) -> Result<PathBuf> {
    let absolute =
        std::path::absolute(path).with_context(|| format!("absolute {}", path.display()))?;
    if absolute.exists() {
        return absolute
            .canonicalize()
            .with_context(|| format!("canonicalize {}", absolute.display()));
    }
    Ok(normalize_lexical(&absolute))
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(unix)]
fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(windows)]
fn shell_quote(arg: &str) -> String {
    format!("\"{}\"", arg.replace('"', "\"\""))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    fn sandbox(root: &Path) -> Sandbox {
        Sandbox::new(root, SandboxConfig::default()).expect("sandbox")
    }

    #[test]
    fn runs_command_inside_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let code = temp.path().join("proj/code");
        fs::create_dir_all(&code).expect("mkdir");

        let outcome = sandbox(temp.path()).run("echo hi && pwd", &code, None, &[]);
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.starts_with("hi\n"));
        assert!(outcome.stdout.trim_end().ends_with("proj/code"));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn nonzero_exit_is_failure_without_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox(temp.path()).run("echo bad >&2; exit 4", temp.path(), None, &[]);
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, 4);
        assert_eq!(outcome.stderr, "bad\n");
        assert!(outcome.error.is_none());
    }

    /// Verifies a sibling directory sharing the root's name prefix is rejected before spawning.
    #[test]
    fn rejects_prefix_sibling_without_spawning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("proj");
        let sibling = temp.path().join("proj2");
        fs::create_dir_all(&root).expect("mkdir root");
        fs::create_dir_all(&sibling).expect("mkdir sibling");

        let outcome = sandbox(&root).run("touch marker", &sibling, None, &[]);
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, -1);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|err| err.starts_with("Security Error"))
        );
        assert!(!sibling.join("marker").exists());
    }

    #[test]
    fn rejects_dot_dot_escape() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("proj");
        fs::create_dir_all(&root).expect("mkdir");
        let outcome = sandbox(&root).run("true", &root.join(".."), None, &[]);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|err| err.contains("outside the workspace root"))
        );
    }

    #[test]
    fn missing_directory_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox(temp.path()).run("true", &temp.path().join("nope"), None, &[]);
        assert!(!outcome.success);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|err| err.contains("does not exist"))
        );
    }

    #[test]
    fn timeout_returns_empty_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox(temp.path()).run(
            "echo started; sleep 30",
            temp.path(),
            Some(Duration::from_millis(300)),
            &[],
        );
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.stdout.is_empty());
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|err| err.contains("timed out"))
        );
        assert!(outcome.duration < Duration::from_secs(10));
    }

    /// Verifies a backgrounded child holding the pipes cannot stretch a run past its timeout.
    #[test]
    fn backgrounded_command_returns_within_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let start = Instant::now();
        let outcome = sandbox(temp.path()).run(
            "sleep 6 & echo started",
            temp.path(),
            Some(Duration::from_secs(1)),
            &[],
        );
        assert!(start.elapsed() < Duration::from_secs(3), "{outcome:?}");
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.stdout, "started\n");
    }

    #[test]
    fn extra_env_is_visible() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox(temp.path()).run(
            "printf %s \"$PLANFORGE_TEST_VAR\"",
            temp.path(),
            None,
            &[("PLANFORGE_TEST_VAR", "value")],
        );
        assert_eq!(outcome.stdout, "value");
    }

    #[test]
    fn run_script_uses_interpreter_in_script_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let script = temp.path().join("scripts/hello.sh");
        fs::create_dir_all(script.parent().expect("parent")).expect("mkdir");
        fs::write(&script, "echo \"args: $1\"\n").expect("write script");
        let sandbox = Sandbox::new(
            temp.path(),
            SandboxConfig {
                script_interpreter: "sh".to_string(),
                ..SandboxConfig::default()
            },
        )
        .expect("sandbox");

        let outcome = sandbox.run_script(&script, &["it's".to_string()], None);
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.stdout, "args: it's\n");
    }

    #[test]
    fn run_script_missing_file_is_reported() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox(temp.path()).run_script(&temp.path().join("none.py"), &[], None);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|err| err.starts_with("Script not found"))
        );
    }

    #[test]
    fn run_tests_appends_file_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let test_file = temp.path().join("test_app.txt");
        fs::write(&test_file, "ok\n").expect("write");
        let sandbox = Sandbox::new(
            temp.path(),
            SandboxConfig {
                test_command: "cat".to_string(),
                ..SandboxConfig::default()
            },
        )
        .expect("sandbox");

        let outcome = sandbox.run_tests(&test_file, None);
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.stdout, "ok\n");
    }

    #[test]
    fn install_dependencies_requires_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome =
            sandbox(temp.path()).install_dependencies(&temp.path().join("requirements.txt"), None);
        assert!(
            outcome
                .error
                .as_deref()
                .is_some_and(|err| err.starts_with("Manifest not found"))
        );
    }

    #[test]
    fn install_dependencies_passes_manifest_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manifest = temp.path().join("requirements.txt");
        fs::write(&manifest, "requests\n").expect("write");
        let sandbox = Sandbox::new(
            temp.path(),
            SandboxConfig {
                install_command: "wc -l <".to_string(),
                ..SandboxConfig::default()
            },
        )
        .expect("sandbox");

        let outcome = sandbox.install_dependencies(&manifest, None);
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.stdout.trim(), "1");
    }
}
