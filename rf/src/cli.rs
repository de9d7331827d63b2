//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dependency-aware parallel orchestrator for coding-agent tasks
#[derive(Debug, Parser)]
#[command(name = "rf", version, about)]
pub struct Cli {
    /// Path to a config file (defaults to .runforge.yml, then the user config dir)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Execute a task file
    Run {
        /// Task file (YAML or JSON)
        tasks: PathBuf,

        /// Worker pool size
        #[arg(long)]
        workers: Option<usize>,

        /// Stop dispatching new tasks after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Per-attempt wall-clock budget in seconds
        #[arg(long)]
        max_runtime: Option<u64>,

        /// Run directory (defaults to `<runs-dir>/<generated id>`)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a task file and print the execution order
    Plan {
        /// Task file (YAML or JSON)
        tasks: PathBuf,
    },

    /// Inspect or edit the durable runner graylist
    Graylist {
        #[command(subcommand)]
        command: GraylistCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum GraylistCommand {
    /// List graylist entries
    List,

    /// Suspend a (runner, model) pair; omit the model to suspend them all
    Add {
        /// Runner name
        runner: String,

        /// Model the suspension applies to (empty = wildcard)
        #[arg(long, default_value = "")]
        model: String,

        /// Why the pair is suspended
        #[arg(long)]
        reason: String,
    },

    /// Lift a suspension
    Remove {
        /// Runner name
        runner: String,

        /// Model the suspension applies to (empty = wildcard)
        #[arg(long, default_value = "")]
        model: String,
    },

    /// Drop every entry
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "rf",
            "run",
            "tasks.yml",
            "--workers",
            "8",
            "--fail-fast",
            "--max-runtime",
            "600",
        ]);
        match cli.command {
            Command::Run {
                tasks,
                workers,
                fail_fast,
                max_runtime,
                output,
            } => {
                assert_eq!(tasks, PathBuf::from("tasks.yml"));
                assert_eq!(workers, Some(8));
                assert!(fail_fast);
                assert_eq!(max_runtime, Some(600));
                assert!(output.is_none());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_graylist_add() {
        let cli = Cli::parse_from([
            "rf", "graylist", "add", "codex", "--model", "gpt-5", "--reason", "false positives",
        ]);
        match cli.command {
            Command::Graylist {
                command: GraylistCommand::Add { runner, model, reason },
            } => {
                assert_eq!(runner, "codex");
                assert_eq!(model, "gpt-5");
                assert_eq!(reason, "false positives");
            }
            other => panic!("expected graylist add, got {other:?}"),
        }
    }
}
