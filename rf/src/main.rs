//! Runforge CLI entry point
//!
//! Loads config and a task file, builds the runner registry from the
//! configured profiles, and drives the scheduler. Ctrl-C cancels the run
//! cooperatively; a second Ctrl-C aborts the process.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use runforge::cascade::CascadeContext;
use runforge::cli::{Cli, Command, GraylistCommand};
use runforge::config::Config;
use runforge::coordination::{Blacklist, Graylist, ProviderLimiter};
use runforge::domain::{TaskResult, TaskState};
use runforge::graph::TaskGraph;
use runforge::runner::{CommandRunner, Runner, RunnerRegistry};
use runforge::scheduler::{Scheduler, SchedulerConfig};
use runforge::taskfile;
use runforge::verify::GitWorkVerifier;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = match cli_log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid log level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref())?;

    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Run {
            tasks,
            workers,
            fail_fast,
            max_runtime,
            output,
        } => cmd_run(config, tasks, workers, fail_fast, max_runtime, output).await,
        Command::Plan { tasks } => cmd_plan(tasks),
        Command::Graylist { command } => cmd_graylist(command).await,
    }
}

async fn cmd_run(
    config: Config,
    tasks_path: PathBuf,
    workers: Option<usize>,
    fail_fast: bool,
    max_runtime: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let tasks = taskfile::load_tasks(&tasks_path)?;
    let run_dir = output.unwrap_or_else(|| {
        config
            .paths
            .runs_dir
            .join(uuid::Uuid::now_v7().to_string())
    });
    fs::create_dir_all(&run_dir).context("failed to create run directory")?;
    info!(run_dir = %run_dir.display(), tasks = tasks.len(), "run starting");

    let registry: RunnerRegistry = config
        .runners
        .profiles
        .iter()
        .map(|(name, profile)| {
            (
                name.clone(),
                Arc::new(CommandRunner::from_profile(name, profile)) as Arc<dyn Runner>,
            )
        })
        .collect();

    let graylist = Arc::new(Graylist::load(Graylist::default_path()?)?);
    let max_runtime = Duration::from_secs(max_runtime.unwrap_or(config.limits.max_runtime_secs));
    let cascade = CascadeContext {
        runners: Arc::new(registry),
        profiles: Arc::new(config.runners.profiles.clone()),
        blacklist: Arc::new(Blacklist::new()),
        limiter: Some(Arc::new(ProviderLimiter::new(
            config.concurrency.provider_limits.clone(),
        ))),
        verifier: Arc::new(GitWorkVerifier),
        max_runtime,
    };

    let scheduler_config = SchedulerConfig {
        workers: workers.unwrap_or(config.concurrency.workers),
        fail_fast: fail_fast || config.limits.fail_fast,
        max_runtime,
        repos_dir: config.paths.repos_dir.clone(),
        run_dir: run_dir.clone(),
    };
    let policy = config.cascade_policy();
    let scheduler = Scheduler::new(scheduler_config, cascade, policy, graylist).with_on_update(
        Arc::new(|id: &str, result: &TaskResult| {
            info!(task = %id, state = %result.state, "task update");
        }),
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let results = scheduler.run(&tasks, cancel).await?;

    let journal: BTreeMap<&str, &TaskResult> = results
        .iter()
        .map(|(id, result)| (id.as_str(), result))
        .collect();
    let journal_path = run_dir.join("results.json");
    fs::write(
        &journal_path,
        serde_json::to_string_pretty(&journal).context("failed to serialize results")?,
    )
    .context("failed to write results journal")?;
    info!(path = %journal_path.display(), "results journal written");

    print_summary(&journal);

    let failed = journal
        .values()
        .filter(|r| r.state != TaskState::Completed)
        .count();
    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(journal: &BTreeMap<&str, &TaskResult>) {
    let mut counts: HashMap<TaskState, usize> = HashMap::new();
    for result in journal.values() {
        *counts.entry(result.state).or_default() += 1;
    }

    println!();
    for (id, result) in journal {
        let runner = result.runner_used.as_deref().unwrap_or("-");
        let secs = result.duration_ms as f64 / 1000.0;
        let mut line = format!("{:>12}  {id}  [{runner}, {secs:.1}s]", result.state.to_string());
        if result.false_positive {
            line.push_str("  (false positive)");
        }
        if let Some(error) = result.display_error() {
            line.push_str(&format!("  {error}"));
        }
        println!("{line}");
    }
    println!();

    let total: usize = counts.values().sum();
    let completed = counts.get(&TaskState::Completed).copied().unwrap_or(0);
    println!("{completed}/{total} tasks completed");
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, draining (press ctrl-c again to abort)");
            cancel.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

fn cmd_plan(tasks_path: PathBuf) -> Result<()> {
    let tasks = taskfile::load_tasks(&tasks_path)?;
    let graph = TaskGraph::build(&tasks)?;

    println!("{} tasks, {} roots", graph.len(), graph.roots().len());
    for (position, id) in graph.order().iter().enumerate() {
        let task = graph
            .task(id)
            .ok_or_else(|| eyre::eyre!("task \"{id}\" missing from graph"))?;
        let mut line = format!("{:>3}. {id} (priority {})", position + 1, task.priority);
        if !task.depends_on.is_empty() {
            let deps: Vec<&str> = task.depends_on.iter().map(String::as_str).collect();
            line.push_str(&format!("  after {}", deps.join(", ")));
        }
        println!("{line}");
    }
    Ok(())
}

async fn cmd_graylist(command: GraylistCommand) -> Result<()> {
    let graylist = Graylist::load(Graylist::default_path()?)?;

    match command {
        GraylistCommand::List => {
            let entries = graylist.entries().await;
            if entries.is_empty() {
                println!("graylist is empty");
            }
            for (key, entry) in entries {
                println!("{key}  {}  ({})", entry.reason, entry.added_at.to_rfc3339());
            }
        }
        GraylistCommand::Add { runner, model, reason } => {
            graylist.add(&runner, &model, &reason).await;
            println!("graylisted {runner}:{model}");
        }
        GraylistCommand::Remove { runner, model } => {
            if graylist.remove(&runner, &model).await {
                println!("removed {runner}:{model}");
            } else {
                println!("no entry for {runner}:{model}");
            }
        }
        GraylistCommand::Clear => {
            graylist.clear().await;
            println!("graylist cleared");
        }
    }
    Ok(())
}
