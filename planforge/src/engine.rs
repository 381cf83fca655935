//! Step executor: advances a project's build plan one step at a time.
//!
//! Each call to [`Engine::advance`] re-reads the plan document, executes the
//! first unchecked step and, on success, checks it off. Failed command steps
//! enter a bounded fix loop: ask the generator for one file action, apply it
//! inside the project's `code/` directory, re-run the command.
//!
//! Everything that can go wrong inside a step is reported as a failed
//! [`StepReport`]. Only failures of the workspace store itself are `Err`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::action::{Action, parse_action};
use crate::core::budget::fit_prompts;
use crate::core::invariants::validate_plan;
use crate::core::path::join_contained;
use crate::core::plan::{
    find_next_unchecked, mark_complete, normalize_generated_plan, parse_steps, plan_progress,
};
use crate::core::text::truncate_chars;
use crate::core::types::{ExecutionOutcome, PlanProgress, Step, StepKind};
use crate::io::config::EngineConfig;
use crate::io::editor;
use crate::io::generator::{
    FILE_TEMPERATURE, FIX_TEMPERATURE, GenerationRequest, Generator, PLAN_TEMPERATURE,
};
use crate::io::prompt::{FixContext, PromptEngine, ReportContext};
use crate::io::sandbox::Sandbox;
use crate::io::snapshot::render_file_snapshot;
use crate::io::workspace::{DEFAULT_LANGUAGE, LogRecord, ProjectPaths, WorkspaceStore};

/// Characters of an unparseable response echoed back in failure messages.
const RESPONSE_PREVIEW_CHARS: usize = 200;

/// Result of one [`Engine::advance`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The project has no plan yet.
    NoPlan,
    /// The plan cannot be executed as written. Nothing ran.
    InvalidPlan { errors: Vec<String> },
    /// Every step is checked; the build report was (re)written.
    Completed { report_path: PathBuf },
    /// One step was executed.
    Step(StepReport),
}

impl Advance {
    pub fn is_success(&self) -> bool {
        match self {
            Advance::Completed { .. } => true,
            Advance::Step(report) => report.success,
            Advance::NoPlan | Advance::InvalidPlan { .. } => false,
        }
    }
}

/// Outcome of executing a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: Step,
    pub success: bool,
    pub message: String,
    /// Fix attempts made by the auto-fix loop (0 when it never ran).
    pub fix_attempts: u32,
    /// Last action applied for this step: the file step's action, or the fix
    /// that made a failing command pass.
    pub action: Option<Action>,
    pub stdout: String,
    pub stderr: String,
}

impl StepReport {
    fn succeeded(step: Step, message: impl Into<String>) -> Self {
        Self {
            step,
            success: true,
            message: message.into(),
            fix_attempts: 0,
            action: None,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    fn failed(step: Step, message: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::succeeded(step, message)
        }
    }

    fn with_output(mut self, outcome: &ExecutionOutcome) -> Self {
        self.stdout = outcome.stdout.clone();
        self.stderr = outcome.stderr.clone();
        self
    }
}

/// Per-advance view of the project being built.
struct Scope<'s> {
    name: &'s str,
    paths: ProjectPaths,
    language: String,
}

/// Borrows its collaborators; construct one per workspace and reuse it.
pub struct Engine<'a, G: Generator> {
    store: &'a WorkspaceStore,
    sandbox: &'a Sandbox,
    generator: &'a G,
    config: &'a EngineConfig,
    prompts: PromptEngine,
}

impl<'a, G: Generator> Engine<'a, G> {
    pub fn new(
        store: &'a WorkspaceStore,
        sandbox: &'a Sandbox,
        generator: &'a G,
        config: &'a EngineConfig,
    ) -> Result<Self> {
        let prompts_dir = config.prompts_dir_in(store.root());
        let prompts = PromptEngine::new(prompts_dir.as_deref()).context("load prompts")?;
        Ok(Self {
            store,
            sandbox,
            generator,
            config,
            prompts,
        })
    }

    /// Ask the generator for a plan and persist it.
    ///
    /// `request` replaces the stored request when given. A plan that repeats a
    /// step title is rejected and nothing is written.
    #[instrument(skip_all, fields(project = name))]
    pub fn generate_plan(&self, name: &str, request: Option<&str>) -> Result<PathBuf> {
        let info = self.store.read_status(name)?;
        let request = match request {
            Some(request) => {
                self.store.set_request(name, request)?;
                request.to_string()
            }
            None => info
                .request
                .clone()
                .ok_or_else(|| anyhow!("project '{name}' has no request; pass one explicitly"))?,
        };

        let current_date = Utc::now().format("%Y-%m-%d").to_string();
        let system = self
            .prompts
            .architect_system(&request, &info.language, &current_date)?;
        let user = self.prompts.plan_request(&request)?;
        info!("generating plan");
        let raw = self
            .generate(&system, &user, PLAN_TEMPERATURE)
            .context("generate plan")?;

        let plan = normalize_generated_plan(&raw);
        let errors = validate_plan(&plan);
        if !errors.is_empty() {
            bail!("generated plan is invalid:\n- {}", errors.join("\n- "));
        }
        debug!(steps = parse_steps(&plan).len(), "plan accepted");
        self.store.write_plan(name, &plan)
    }

    /// Completion counts, or `None` when the project has no plan.
    pub fn progress(&self, name: &str) -> Result<Option<PlanProgress>> {
        Ok(self
            .store
            .read_plan(name)?
            .map(|document| plan_progress(&document)))
    }

    /// Execute the first unchecked step, or finalize the report when none remain.
    #[instrument(skip_all, fields(project = name))]
    pub fn advance(&self, name: &str) -> Result<Advance> {
        let paths = self.store.project(name)?;
        let Some(document) = self.store.read_plan(name)? else {
            debug!("no plan");
            return Ok(Advance::NoPlan);
        };

        let errors = validate_plan(&document);
        if !errors.is_empty() {
            warn!(errors = errors.len(), "plan is invalid");
            return Ok(Advance::InvalidPlan { errors });
        }

        let scope = Scope {
            name,
            language: self.language(name),
            paths,
        };

        let Some(step) = find_next_unchecked(&document) else {
            info!("all steps complete; finalizing report");
            let report_path = self.finalize_report(&scope, &document)?;
            return Ok(Advance::Completed { report_path });
        };

        info!(step = %step.title, kind = step.kind.as_str(), "executing step");
        let mut report = match step.kind {
            StepKind::File => self.execute_file_step(&scope, step),
            StepKind::Command => self.execute_command_step(&scope, step)?,
            StepKind::Other => StepReport::succeeded(step, "Step marked complete"),
        };

        if report.success {
            let updated = mark_complete(&document, &report.step.title);
            if updated == document {
                report.success = false;
                report.message = format!(
                    "step '{}' could not be checked off in the plan",
                    report.step.title
                );
                warn!(step = %report.step.title, "checking off step left the plan unchanged");
            } else {
                self.store.write_plan(name, &updated)?;
                info!(step = %report.step.title, "step complete");
            }
        } else {
            warn!(step = %report.step.title, message = %report.message, "step failed");
        }
        Ok(Advance::Step(report))
    }

    fn execute_file_step(&self, scope: &Scope<'_>, step: Step) -> StepReport {
        let action = match self.request_file_action(scope, &step) {
            Ok(action) => action,
            Err(err) => return StepReport::failed(step, format!("{err:#}")),
        };
        match apply_action(&scope.paths.code_dir, &action, &step) {
            Ok(message) => StepReport {
                action: Some(action),
                ..StepReport::succeeded(step, message)
            },
            Err(err) => StepReport::failed(
                step,
                format!("could not apply {}: {err:#}", action.summary()),
            ),
        }
    }

    fn request_file_action(&self, scope: &Scope<'_>, step: &Step) -> Result<Action> {
        let files = self.snapshot(&scope.paths.code_dir)?;
        let system = self.prompts.developer_system(&scope.language)?;
        let user = self.prompts.file_step(step, &files)?;
        let raw = self
            .generate(&system, &user, FILE_TEMPERATURE)
            .context("generate file action")?;
        parse_response(&raw)
    }

    fn execute_command_step(&self, scope: &Scope<'_>, step: Step) -> Result<StepReport> {
        let Some(command) = step
            .command
            .clone()
            .filter(|command| !command.trim().is_empty())
        else {
            return Ok(StepReport::succeeded(
                step,
                "No command specified, step complete",
            ));
        };

        let mut outcome = self.run_logged(scope, &step, &command, None)?;
        if outcome.success {
            return Ok(
                StepReport::succeeded(step, "Command completed successfully").with_output(&outcome)
            );
        }

        let max_attempts = self.config.max_fix_attempts;
        warn!(
            exit_code = outcome.exit_code,
            error = outcome.error.as_deref().unwrap_or(""),
            "command failed; entering fix loop"
        );

        let mut attempt = 1;
        while attempt <= max_attempts {
            info!(attempt, max_attempts, "requesting fix");
            let action = match self.request_fix(scope, &command, &outcome, attempt) {
                Ok(action) => action,
                Err(err) => {
                    let report = StepReport {
                        fix_attempts: attempt,
                        ..StepReport::failed(step, format!("fix attempt {attempt}: {err:#}"))
                    };
                    return Ok(report.with_output(&outcome));
                }
            };
            if let Err(err) = apply_action(&scope.paths.code_dir, &action, &step) {
                let message = format!(
                    "fix attempt {attempt}: could not apply {}: {err:#}",
                    action.summary()
                );
                let report = StepReport {
                    fix_attempts: attempt,
                    ..StepReport::failed(step, message)
                };
                return Ok(report.with_output(&outcome));
            }

            outcome = self.run_logged(scope, &step, &command, Some(attempt))?;
            if outcome.success {
                let report = StepReport {
                    fix_attempts: attempt,
                    action: Some(action),
                    ..StepReport::succeeded(step, format!("Fixed after {attempt} attempt(s)"))
                };
                return Ok(report.with_output(&outcome));
            }
            debug!(attempt, exit_code = outcome.exit_code, "command still failing");
            attempt += 1;
        }

        let report = StepReport {
            fix_attempts: max_attempts,
            ..StepReport::failed(step, format!("Max fix attempts ({max_attempts}) reached"))
        };
        Ok(report.with_output(&outcome))
    }

    fn request_fix(
        &self,
        scope: &Scope<'_>,
        command: &str,
        outcome: &ExecutionOutcome,
        attempt: u32,
    ) -> Result<Action> {
        let files = self.snapshot(&scope.paths.code_dir)?;
        let system = self.prompts.developer_system(&scope.language)?;
        let user = self.prompts.fix_request(&FixContext {
            command,
            exit_code: outcome.exit_code,
            error: outcome.error.as_deref(),
            stdout: &outcome.stdout,
            stderr: &outcome.stderr,
            files: &files,
            attempt,
            max_attempts: self.config.max_fix_attempts,
        })?;
        let raw = self
            .generate(&system, &user, FIX_TEMPERATURE)
            .context("generate fix")?;
        parse_response(&raw)
    }

    /// Run `command` in the code directory and record it under `run_logs/`.
    fn run_logged(
        &self,
        scope: &Scope<'_>,
        step: &Step,
        command: &str,
        retry: Option<u32>,
    ) -> Result<ExecutionOutcome> {
        let outcome = self.sandbox.run(command, &scope.paths.code_dir, None, &[]);
        let log_path = self.store.log_execution(
            scope.name,
            &LogRecord {
                command,
                step_title: Some(&step.title),
                retry,
                outcome: &outcome,
            },
        )?;
        debug!(
            log = %log_path.display(),
            success = outcome.success,
            duration_ms = outcome.duration_ms() as u64,
            "command logged"
        );
        Ok(outcome)
    }

    fn finalize_report(&self, scope: &Scope<'_>, document: &str) -> Result<PathBuf> {
        let info = match self.store.read_status(scope.name) {
            Ok(info) => Some(info),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "status record unreadable; report omits request");
                None
            }
        };
        let ctx = &self.config.context;
        let files = render_file_snapshot(
            &scope.paths.code_dir,
            ctx.report_max_files,
            ctx.max_file_chars,
        )?;
        let logs = self
            .store
            .recent_logs(scope.name, ctx.report_log_count)?
            .into_iter()
            .map(|log| log.filename)
            .collect();
        let progress = plan_progress(document);

        let report = self.prompts.report(&ReportContext {
            project: info.as_ref().map_or(scope.name, |info| info.name.as_str()),
            completed_at: Utc::now().to_rfc3339(),
            request: info.as_ref().and_then(|info| info.request.as_deref()),
            files: &files,
            logs,
            completed: progress.completed,
            total: progress.total,
        })?;
        self.store.write_report(scope.name, &report)
    }

    fn snapshot(&self, code_dir: &Path) -> Result<String> {
        let ctx = &self.config.context;
        render_file_snapshot(code_dir, ctx.max_files, ctx.max_file_chars)
    }

    fn generate(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let (system, user) = fit_prompts(system, user, self.config.generator.max_context_chars);
        self.generator.generate(&GenerationRequest {
            system,
            user,
            temperature,
        })
    }

    fn language(&self, name: &str) -> String {
        self.store
            .read_status(name)
            .map(|info| info.language)
            .unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string())
    }
}

fn parse_response(raw: &str) -> Result<Action> {
    parse_action(raw).with_context(|| {
        format!(
            "invalid action in response: {}",
            truncate_chars(raw.trim(), RESPONSE_PREVIEW_CHARS)
        )
    })
}

/// Apply `action` inside `code_dir`. Returns the editor's message.
fn apply_action(code_dir: &Path, action: &Action, step: &Step) -> Result<String> {
    let report = match action {
        Action::NoOp { message } => {
            return Ok(message
                .clone()
                .unwrap_or_else(|| "No action needed".to_string()));
        }
        Action::CreateFile { path, content } => {
            let relative = path
                .as_deref()
                .or(step.file_path.as_deref())
                .ok_or_else(|| anyhow!("no file path provided"))?;
            editor::create_file(&resolve_in(code_dir, relative)?, content, true)?
        }
        Action::StrReplace {
            path,
            old_str,
            new_str,
        } => editor::str_replace(&resolve_in(code_dir, path)?, old_str, new_str)?,
        Action::AppendToFile { path, content } => {
            editor::append_to_file(&resolve_in(code_dir, path)?, content, true)?
        }
    };
    debug!(action = %action.summary(), "applied action");
    Ok(report.message)
}

fn resolve_in(code_dir: &Path, relative: &str) -> Result<PathBuf> {
    join_contained(code_dir, Path::new(relative))
        .ok_or_else(|| anyhow!("path '{relative}' is outside the project code directory"))
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;
    use crate::io::workspace::ProjectStatus;
    use crate::test_support::{ScriptedGenerator, TestWorkspace};

    const TWO_STEP_PLAN: &str = "# Build Plan\n\n## Phase 1\n\
- [ ] **Create app**\n  *File:* `src/app.py`\n  *Description:* Print a greeting.\n\
- [ ] **Show app**\n  *Command:* `cat src/app.py`\n";

    fn step_report(advance: Advance) -> StepReport {
        match advance {
            Advance::Step(report) => report,
            other => panic!("expected a step report, got {other:?}"),
        }
    }

    fn command_plan(command: &str) -> String {
        format!("# Build Plan\n\n- [ ] **Check**\n  *Command:* `{command}`\n")
    }

    #[test]
    fn missing_plan_is_reported_not_an_error() {
        let ws = TestWorkspace::new().expect("workspace");
        ws.store().init_project("demo", None).expect("init");
        let generator = ScriptedGenerator::replies(Vec::<&str>::new());
        let engine = ws.engine(&generator).expect("engine");

        assert_eq!(engine.advance("demo").expect("advance"), Advance::NoPlan);
        assert_eq!(engine.progress("demo").expect("progress"), None);
    }

    #[test]
    fn unknown_project_is_an_error() {
        let ws = TestWorkspace::new().expect("workspace");
        let generator = ScriptedGenerator::replies(Vec::<&str>::new());
        let engine = ws.engine(&generator).expect("engine");

        let err = engine.advance("ghost").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn duplicate_titles_block_execution() {
        let ws = TestWorkspace::new().expect("workspace");
        let plan = "# Build Plan\n- [ ] **Same**\n  *Command:* `touch ran`\n- [ ] **Same**\n";
        let paths = ws.project_with_plan("demo", plan).expect("project");
        let generator = ScriptedGenerator::replies(Vec::<&str>::new());
        let engine = ws.engine(&generator).expect("engine");

        let Advance::InvalidPlan { errors } = engine.advance("demo").expect("advance") else {
            panic!("expected invalid plan");
        };
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("duplicate step title 'Same'"));
        assert!(!paths.code_dir.join("ran").exists());
        assert_eq!(fs::read_to_string(&paths.plan_path).expect("plan"), plan);
    }

    #[test]
    fn advances_one_step_at_a_time_then_completes() {
        let ws = TestWorkspace::new().expect("workspace");
        let paths = ws.project_with_plan("demo", TWO_STEP_PLAN).expect("project");
        let generator = ScriptedGenerator::replies([
            r#"{"action": "create_file", "content": "print('hi')\n"}"#,
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let first = step_report(engine.advance("demo").expect("advance 1"));
        assert!(first.success, "{}", first.message);
        assert_eq!(first.step.title, "Create app");
        assert_eq!(
            fs::read_to_string(paths.code_dir.join("src/app.py")).expect("app"),
            "print('hi')\n"
        );
        let plan = fs::read_to_string(&paths.plan_path).expect("plan");
        assert!(plan.contains("- [x] **Create app**"));
        assert!(plan.contains("- [ ] **Show app**"));

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, FILE_TEMPERATURE);
        assert!(requests[0].user.contains("**File to Create/Modify:** src/app.py"));
        assert!(requests[0].user.contains("No files created yet."));

        let second = step_report(engine.advance("demo").expect("advance 2"));
        assert!(second.success, "{}", second.message);
        assert_eq!(second.step.title, "Show app");
        assert_eq!(second.stdout, "print('hi')\n");
        assert_eq!(second.fix_attempts, 0);
        let logs = ws.store().recent_logs("demo", 10).expect("logs");
        assert_eq!(logs.len(), 1);
        assert!(logs[0].filename.ends_with("_run.log"));

        let Advance::Completed { report_path } = engine.advance("demo").expect("advance 3") else {
            panic!("expected completion");
        };
        let report = fs::read_to_string(report_path).expect("report");
        assert!(report.contains("Complete (2/2 steps)"));
        assert!(report.contains("--- src/app.py ---"));
        assert!(report.contains(&logs[0].filename));
        let progress = engine.progress("demo").expect("progress").expect("plan");
        assert!(progress.all_complete);
        generator.assert_drained();
    }

    #[test]
    fn other_steps_complete_without_side_effects() {
        let ws = TestWorkspace::new().expect("workspace");
        let paths = ws
            .project_with_plan("demo", "# Build Plan\n- [ ] **Review design**\nRead it.\n")
            .expect("project");
        let generator = ScriptedGenerator::replies(Vec::<&str>::new());
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(report.success);
        assert!(
            fs::read_to_string(&paths.plan_path)
                .expect("plan")
                .contains("- [x] **Review design**")
        );
        assert!(generator.requests().is_empty());
    }

    #[test]
    fn fix_loop_succeeds_on_first_attempt() {
        let ws = TestWorkspace::new().expect("workspace");
        let paths = ws
            .project_with_plan("demo", &command_plan("test -f marker.txt"))
            .expect("project");
        let generator = ScriptedGenerator::replies([
            r#"{"action": "create_file", "path": "marker.txt", "content": "ok"}"#,
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(report.success, "{}", report.message);
        assert_eq!(report.fix_attempts, 1);
        assert!(matches!(report.action, Some(Action::CreateFile { .. })));
        assert!(paths.code_dir.join("marker.txt").is_file());

        let requests = generator.requests();
        assert_eq!(requests[0].temperature, FIX_TEMPERATURE);
        assert!(requests[0].user.contains("`test -f marker.txt`"));
        assert!(requests[0].user.contains("fix attempt 1 of 3"));

        let logs = ws.store().recent_logs("demo", 10).expect("logs");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().any(|log| log.filename.ends_with("_retry1.log")));
    }

    #[test]
    fn fix_loop_counts_attempts_until_success() {
        let ws = TestWorkspace::new().expect("workspace");
        ws.project_with_plan("demo", &command_plan("test -f marker.txt"))
            .expect("project");
        let generator = ScriptedGenerator::replies([
            r#"{"action": "append_to_file", "path": "notes.txt", "content": "try"}"#,
            r#"{"action": "create_file", "path": "marker.txt", "content": "ok"}"#,
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(report.success, "{}", report.message);
        assert_eq!(report.fix_attempts, 2);
        assert_eq!(report.message, "Fixed after 2 attempt(s)");
        generator.assert_drained();
    }

    #[test]
    fn fix_loop_stops_at_ceiling_with_last_output() {
        let ws = TestWorkspace::with_config(EngineConfig {
            max_fix_attempts: 2,
            ..EngineConfig::default()
        })
        .expect("workspace");
        let plan = command_plan("echo out; echo err >&2; exit 1");
        let paths = ws.project_with_plan("demo", &plan).expect("project");
        let generator = ScriptedGenerator::replies([
            r#"{"action": "none", "message": "nothing to do"}"#,
            r#"{"action": "none"}"#,
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(!report.success);
        assert_eq!(report.message, "Max fix attempts (2) reached");
        assert_eq!(report.fix_attempts, 2);
        assert_eq!(report.stdout, "out\n");
        assert_eq!(report.stderr, "err\n");
        assert_eq!(fs::read_to_string(&paths.plan_path).expect("plan"), plan);
        assert_eq!(ws.store().recent_logs("demo", 10).expect("logs").len(), 3);
        generator.assert_drained();
    }

    #[test]
    fn malformed_fix_is_terminal() {
        let ws = TestWorkspace::new().expect("workspace");
        ws.project_with_plan("demo", &command_plan("exit 3"))
            .expect("project");
        let generator = ScriptedGenerator::replies(["I think you should add a file."]);
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(!report.success);
        assert_eq!(report.fix_attempts, 1);
        assert!(report.message.contains("invalid action in response"));
        assert_eq!(generator.requests().len(), 1);
    }

    #[test]
    fn ambiguous_fix_reports_candidate_lines() {
        let ws = TestWorkspace::new().expect("workspace");
        let paths = ws
            .project_with_plan("demo", &command_plan("exit 1"))
            .expect("project");
        fs::write(paths.code_dir.join("app.py"), "x = 1\ny = 2\nx = 1\n").expect("seed");
        let generator = ScriptedGenerator::replies([
            r#"{"action": "str_replace", "path": "app.py", "old_str": "x = 1", "new_str": "x = 2"}"#,
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(!report.success);
        assert!(report.message.contains("occurs 2 times"), "{}", report.message);
        assert!(report.message.contains("lines 1, 3"), "{}", report.message);
        assert_eq!(
            fs::read_to_string(paths.code_dir.join("app.py")).expect("app"),
            "x = 1\ny = 2\nx = 1\n"
        );
    }

    #[test]
    fn action_paths_cannot_leave_code_dir() {
        let ws = TestWorkspace::new().expect("workspace");
        let plan = "# Build Plan\n- [ ] **Write config**\n  *File:* `config.py`\n";
        let paths = ws.project_with_plan("demo", plan).expect("project");
        let generator = ScriptedGenerator::replies([
            r#"{"action": "create_file", "path": "../escape.py", "content": "x"}"#,
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(!report.success);
        assert!(report.message.contains("outside the project code directory"));
        assert!(!paths.dir.join("escape.py").exists());
    }

    #[test]
    fn generator_failure_fails_the_step() {
        let ws = TestWorkspace::new().expect("workspace");
        let paths = ws.project_with_plan("demo", TWO_STEP_PLAN).expect("project");
        let generator = ScriptedGenerator::failing("backend unavailable");
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(!report.success);
        assert!(report.message.contains("backend unavailable"));
        assert_eq!(
            fs::read_to_string(&paths.plan_path).expect("plan"),
            TWO_STEP_PLAN
        );
    }

    #[test]
    fn command_without_value_succeeds() {
        let ws = TestWorkspace::new().expect("workspace");
        ws.project_with_plan("demo", "# Build Plan\n- [ ] **Deploy**\n  *Action:* deploy it\n")
            .expect("project");
        let generator = ScriptedGenerator::replies(Vec::<&str>::new());
        let engine = ws.engine(&generator).expect("engine");

        let report = step_report(engine.advance("demo").expect("advance"));
        assert!(report.success);
        assert_eq!(report.message, "No command specified, step complete");
        assert!(ws.store().recent_logs("demo", 10).expect("logs").is_empty());
    }

    #[test]
    fn generate_plan_normalizes_and_persists() {
        let ws = TestWorkspace::new().expect("workspace");
        ws.store()
            .init_project("demo", Some("a hello world script"))
            .expect("init");
        let generator = ScriptedGenerator::replies([
            "```markdown\n## Phase 1\n- [ ] **Create app**\n  *File:* `app.py`\n```",
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let path = engine.generate_plan("demo", None).expect("plan");
        let plan = fs::read_to_string(path).expect("read plan");
        assert!(plan.starts_with("# Build Plan\n\n## Phase 1"));
        assert!(!plan.contains("```"));
        assert_eq!(
            ws.store().read_status("demo").expect("status").status,
            ProjectStatus::Planning
        );

        let requests = generator.requests();
        assert_eq!(requests[0].temperature, PLAN_TEMPERATURE);
        assert!(requests[0].user.contains("a hello world script"));
    }

    #[test]
    fn generate_plan_rejects_duplicate_titles() {
        let ws = TestWorkspace::new().expect("workspace");
        let paths = ws.store().init_project("demo", None).expect("init");
        let generator = ScriptedGenerator::replies([
            "# Build Plan\n- [ ] **Same**\n- [ ] **Same**\n",
        ]);
        let engine = ws.engine(&generator).expect("engine");

        let err = engine.generate_plan("demo", Some("twice")).unwrap_err();
        assert!(err.to_string().contains("duplicate step title"));
        assert!(!paths.plan_path.exists());
        assert_eq!(
            ws.store().read_status("demo").expect("status").request.as_deref(),
            Some("twice")
        );
    }

    #[test]
    fn generate_plan_requires_a_request() {
        let ws = TestWorkspace::new().expect("workspace");
        ws.store().init_project("demo", None).expect("init");
        let generator = ScriptedGenerator::replies(Vec::<&str>::new());
        let engine = ws.engine(&generator).expect("engine");

        let err = engine.generate_plan("demo", None).unwrap_err();
        assert!(err.to_string().contains("has no request"));
    }
}
