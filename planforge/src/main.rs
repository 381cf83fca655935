//! Plan-driven build orchestrator CLI.
//!
//! Manages projects under a workspace directory. Each project carries a
//! Markdown build plan whose steps are executed one at a time with
//! `planforge step`, or until completion or failure with `planforge run`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use planforge::engine::{Advance, Engine, StepReport};
use planforge::exit_codes;
use planforge::io::config::{CONFIG_FILE_NAME, EngineConfig, load_config};
use planforge::io::generator::CommandGenerator;
use planforge::io::sandbox::Sandbox;
use planforge::io::workspace::WorkspaceStore;
use planforge::logging;
use planforge::looping::execute_all;

#[derive(Parser)]
#[command(name = "planforge", version, about = "Plan-driven build orchestrator")]
struct Cli {
    /// Workspace directory holding one directory per project.
    #[arg(long, global = true, default_value = ".")]
    workspace: PathBuf,

    /// Config file (defaults to `<workspace>/planforge.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more to stderr (`-v` step transitions, `-vv` routine flow).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a project directory and status record.
    Init {
        name: String,
        /// What the project should build.
        #[arg(long)]
        request: Option<String>,
    },
    /// Generate and store a build plan (creates the project if needed).
    Plan {
        name: String,
        /// Replaces the stored request.
        #[arg(long)]
        request: Option<String>,
    },
    /// Execute the next unchecked step.
    Step { name: String },
    /// Execute steps until the plan completes or a step fails.
    Run { name: String },
    /// Print project status and plan progress.
    Status { name: String },
    /// Print the build plan, or the build report with `--report`.
    Show {
        name: String,
        #[arg(long)]
        report: bool,
    },
    /// Print the most recent run logs, newest first.
    Logs {
        name: String,
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// List projects in the workspace.
    List,
    /// Delete a project and everything in it.
    Delete { name: String },
    /// Print the effective configuration as TOML.
    Config,
}

fn main() {
    let cli = Cli::parse();
    logging::init(logging::directive_for(cli.verbose));
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let store = WorkspaceStore::open(&cli.workspace)?;
    let config_path = cli
        .config
        .unwrap_or_else(|| store.root().join(CONFIG_FILE_NAME));
    let config = load_config(&config_path)?;

    match cli.command {
        Command::Init { name, request } => cmd_init(&store, &name, request.as_deref()),
        Command::Plan { name, request } => cmd_plan(&store, &config, &name, request.as_deref()),
        Command::Step { name } => cmd_step(&store, &config, &name),
        Command::Run { name } => cmd_run(&store, &config, &name),
        Command::Status { name } => cmd_status(&store, &config, &name),
        Command::Show { name, report } => cmd_show(&store, &name, report),
        Command::Logs { name, count } => cmd_logs(&store, &name, count),
        Command::List => cmd_list(&store),
        Command::Delete { name } => cmd_delete(&store, &name),
        Command::Config => cmd_config(&config),
    }
}

/// Build the engine collaborators and hand the engine to `f`.
fn with_engine<T>(
    store: &WorkspaceStore,
    config: &EngineConfig,
    f: impl FnOnce(&Engine<'_, CommandGenerator>) -> Result<T>,
) -> Result<T> {
    let sandbox = Sandbox::new(store.root(), config.sandbox.clone())?;
    let generator = CommandGenerator::new(config.generator.clone());
    let engine = Engine::new(store, &sandbox, &generator, config)?;
    f(&engine)
}

fn cmd_init(store: &WorkspaceStore, name: &str, request: Option<&str>) -> Result<i32> {
    let paths = store.init_project(name, request)?;
    println!("{}", paths.dir.display());
    Ok(exit_codes::OK)
}

fn cmd_plan(
    store: &WorkspaceStore,
    config: &EngineConfig,
    name: &str,
    request: Option<&str>,
) -> Result<i32> {
    if !store.project_exists(name) {
        store.init_project(name, request)?;
    }
    let plan_path = with_engine(store, config, |engine| engine.generate_plan(name, request))?;
    let plan = store.read_plan(name)?.unwrap_or_default();
    print!("{plan}");
    eprintln!("plan written to {}", plan_path.display());
    Ok(exit_codes::OK)
}

fn cmd_step(store: &WorkspaceStore, config: &EngineConfig, name: &str) -> Result<i32> {
    let advance = with_engine(store, config, |engine| engine.advance(name))?;
    print_advance(&advance);
    Ok(advance_exit_code(&advance))
}

fn cmd_run(store: &WorkspaceStore, config: &EngineConfig, name: &str) -> Result<i32> {
    let summary = with_engine(store, config, |engine| {
        execute_all(engine, name, print_advance)
    })?;
    println!("steps executed: {}", summary.steps_executed);
    Ok(advance_exit_code(&summary.stop))
}

fn cmd_status(store: &WorkspaceStore, config: &EngineConfig, name: &str) -> Result<i32> {
    let info = store.read_status(name)?;
    let progress = with_engine(store, config, |engine| engine.progress(name))?;
    let paths = store.project(name)?;

    println!("project: {} ({})", info.name, info.safe_name);
    println!("status: {}", info.status.as_str());
    println!("created: {}", info.created_at.to_rfc3339());
    if let Some(updated) = info.updated_at {
        println!("updated: {}", updated.to_rfc3339());
    }
    println!("language: {}", info.language);
    if let Some(framework) = &info.framework {
        println!("framework: {framework}");
    }
    if let Some(request) = &info.request {
        println!("request: {request}");
    }
    match progress {
        Some(progress) => println!(
            "progress: {}/{} steps ({:.0}%)",
            progress.completed, progress.total, progress.percent
        ),
        None => println!("progress: no plan"),
    }
    println!(
        "report: {}",
        if paths.report_path.exists() { "yes" } else { "no" }
    );
    Ok(exit_codes::OK)
}

fn cmd_show(store: &WorkspaceStore, name: &str, report: bool) -> Result<i32> {
    let (content, missing) = if report {
        (store.read_report(name)?, exit_codes::INVALID)
    } else {
        (store.read_plan(name)?, exit_codes::NO_PLAN)
    };
    match content {
        Some(content) => {
            print!("{content}");
            Ok(exit_codes::OK)
        }
        None => {
            let what = if report { "report" } else { "plan" };
            eprintln!("project '{name}' has no {what}");
            Ok(missing)
        }
    }
}

fn cmd_logs(store: &WorkspaceStore, name: &str, count: usize) -> Result<i32> {
    let logs = store.recent_logs(name, count)?;
    if logs.is_empty() {
        eprintln!("no run logs for '{name}'");
    }
    for log in logs {
        println!("==> {} <==", log.filename);
        println!("{}", log.content.trim_end());
        println!();
    }
    Ok(exit_codes::OK)
}

fn cmd_list(store: &WorkspaceStore) -> Result<i32> {
    for project in store.list_projects()? {
        let created = project
            .created_at
            .map_or_else(|| "-".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string());
        let report = if project.has_report { "report" } else { "-" };
        println!(
            "{}\t{}\t{}\t{}",
            project.safe_name, project.status, created, report
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_delete(store: &WorkspaceStore, name: &str) -> Result<i32> {
    let dir = store.project(name)?.dir;
    store.delete_project(name)?;
    eprintln!("deleted {}", dir.display());
    Ok(exit_codes::OK)
}

fn cmd_config(config: &EngineConfig) -> Result<i32> {
    let rendered = toml::to_string_pretty(config).context("serialize config toml")?;
    print!("{rendered}");
    Ok(exit_codes::OK)
}

fn advance_exit_code(advance: &Advance) -> i32 {
    match advance {
        Advance::NoPlan => exit_codes::NO_PLAN,
        Advance::InvalidPlan { .. } => exit_codes::INVALID,
        Advance::Completed { .. } => exit_codes::COMPLETE,
        Advance::Step(report) if report.success => exit_codes::OK,
        Advance::Step(_) => exit_codes::STEP_FAILED,
    }
}

fn print_advance(advance: &Advance) {
    match advance {
        Advance::NoPlan => eprintln!("no build plan; run `planforge plan` first"),
        Advance::InvalidPlan { errors } => {
            eprintln!("plan is invalid:\n- {}", errors.join("\n- "));
        }
        Advance::Completed { report_path } => {
            println!("all steps complete; report: {}", report_path.display());
        }
        Advance::Step(report) => print_step(report),
    }
}

fn print_step(report: &StepReport) {
    let mark = if report.success { "ok" } else { "FAILED" };
    println!(
        "[{mark}] {} ({}): {}",
        report.step.title,
        report.step.kind.as_str(),
        report.message
    );
    if let Some(action) = &report.action {
        println!("  action: {}", action.summary());
    }
    if !report.success {
        for (label, text) in [("stdout", &report.stdout), ("stderr", &report.stderr)] {
            if !text.trim().is_empty() {
                println!("  {label}:\n{}", text.trim_end());
            }
        }
    }
}
