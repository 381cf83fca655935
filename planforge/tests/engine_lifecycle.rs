//! Lifecycle harness tests for the step executor.
//!
//! These drive `Engine::advance` and `execute_all` through whole plans to
//! verify end-to-end behavior: plan generation, file and command steps, the
//! fix loop, checkbox state, run logs, and the final report.

#![cfg(unix)]

use std::fs;

use planforge::core::action::Action;
use planforge::core::plan::parse_steps;
use planforge::engine::Advance;
use planforge::io::workspace::ProjectStatus;
use planforge::looping::execute_all;
use planforge::test_support::{ScriptedGenerator, ScriptedReply, TestWorkspace};

/// Full lifecycle: generated plan -> file step -> failing command -> fix -> report.
///
/// Plan:
/// 1. `Write check script` (file): creates `check.sh` containing `exit 1`
/// 2. `Run check script` (command): fails, fix replaces `exit 1` with `exit 0`
/// 3. `Wrap up` (other)
#[test]
fn generated_plan_runs_to_completion_with_one_fix() {
    let ws = TestWorkspace::new().expect("workspace");
    ws.store()
        .init_project("Check Tool!", Some("a script that exits cleanly"))
        .expect("init");

    let generator = ScriptedGenerator::new(vec![
        ScriptedReply::Text(
            "# Build Plan\n\n## Phase 1: Script\n\
- [ ] **Write check script**\n  *File:* `check.sh`\n  *Description:* Exit with a status.\n\
- [ ] **Run check script**\n  *Command:* `sh check.sh`\n\n\
## Phase 2: Finish\n- [ ] **Wrap up**\n  Nothing to run.\n"
                .to_string(),
        ),
        ScriptedReply::Text(
            "```json\n{\"action\": \"create_file\", \"path\": \"check.sh\", \"content\": \"exit 1\\n\"}\n```"
                .to_string(),
        ),
        ScriptedReply::Text(
            "{\"action\": \"str_replace\", \"path\": \"check.sh\", \"old_str\": \"exit 1\", \"new_str\": \"exit 0\"}"
                .to_string(),
        ),
    ]);
    let engine = ws.engine(&generator).expect("engine");

    engine.generate_plan("Check Tool!", None).expect("plan");
    let paths = ws.store().project("Check Tool!").expect("project");
    assert!(paths.dir.ends_with("Check_Tool"));
    assert_eq!(
        ws.store().read_status("Check Tool!").expect("status").status,
        ProjectStatus::Planning
    );

    let mut step_titles = Vec::new();
    let summary = execute_all(&engine, "Check Tool!", |advance| {
        if let Advance::Step(report) = advance {
            step_titles.push((report.step.title.clone(), report.fix_attempts));
        }
    })
    .expect("run");

    assert_eq!(
        step_titles,
        vec![
            ("Write check script".to_string(), 0),
            ("Run check script".to_string(), 1),
            ("Wrap up".to_string(), 0),
        ]
    );
    assert_eq!(summary.steps_executed, 3);
    assert!(matches!(summary.stop, Advance::Completed { .. }));
    assert_eq!(
        fs::read_to_string(paths.code_dir.join("check.sh")).expect("script"),
        "exit 0\n"
    );

    let plan = ws.store().read_plan("Check Tool!").expect("read").expect("plan");
    assert!(parse_steps(&plan).iter().all(|step| step.checked));

    let logs = ws.store().recent_logs("Check Tool!", 5).expect("logs");
    assert_eq!(logs.len(), 2);
    assert!(logs[0].filename.ends_with("_retry1.log"));
    assert!(logs[0].content.contains("**Attempt:** fix attempt 1"));
    assert!(logs[1].filename.ends_with("_run.log"));
    assert!(logs[1].content.contains("**Exit Code:** 1"));

    let report = ws
        .store()
        .read_report("Check Tool!")
        .expect("read")
        .expect("report");
    assert!(report.contains("**Project:** Check Tool!"));
    assert!(report.contains("> a script that exits cleanly"));
    assert!(report.contains("Complete (3/3 steps)"));
    assert_eq!(
        ws.store().read_status("Check Tool!").expect("status").status,
        ProjectStatus::Building
    );
    generator.assert_drained();
}

/// A fix that breaks containment ends the step without touching anything
/// outside `code/`; the next advance retries the same step.
#[test]
fn failed_step_is_retried_on_next_advance() {
    let ws = TestWorkspace::new().expect("workspace");
    let plan = "# Build Plan\n- [ ] **Need marker**\n  *Command:* `test -f marker`\n";
    let paths = ws.project_with_plan("demo", plan).expect("project");
    let generator = ScriptedGenerator::replies([
        r#"{"action": "create_file", "path": "/tmp/marker", "content": "x"}"#,
        r#"{"action": "create_file", "path": "marker", "content": "x"}"#,
    ]);
    let engine = ws.engine(&generator).expect("engine");

    let Advance::Step(first) = engine.advance("demo").expect("advance 1") else {
        panic!("expected step");
    };
    assert!(!first.success);
    assert!(first.message.contains("outside the project code directory"));
    assert_eq!(
        ws.store().read_plan("demo").expect("read").as_deref(),
        Some(plan)
    );

    let Advance::Step(second) = engine.advance("demo").expect("advance 2") else {
        panic!("expected step");
    };
    assert!(second.success, "{}", second.message);
    assert_eq!(second.step.title, "Need marker");
    assert_eq!(
        second.action,
        Some(Action::CreateFile {
            path: Some("marker".to_string()),
            content: "x".to_string(),
        })
    );
    assert!(paths.code_dir.join("marker").is_file());
}

/// Commands run with `code/` as their working directory and inherit nothing
/// from a previous step except files on disk.
#[test]
fn commands_run_inside_code_dir() {
    let ws = TestWorkspace::new().expect("workspace");
    let plan = "# Build Plan\n- [ ] **Where**\n  *Command:* `pwd`\n";
    let paths = ws.project_with_plan("demo", plan).expect("project");
    let generator = ScriptedGenerator::replies(Vec::<&str>::new());
    let engine = ws.engine(&generator).expect("engine");

    let Advance::Step(report) = engine.advance("demo").expect("advance") else {
        panic!("expected step");
    };
    assert!(report.success);
    let reported = fs::canonicalize(report.stdout.trim()).expect("canonical stdout");
    let expected = fs::canonicalize(&paths.code_dir).expect("canonical code dir");
    assert_eq!(reported, expected);
}
