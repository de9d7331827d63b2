//! Runforge - dependency-aware parallel orchestrator for coding-agent tasks
//!
//! Runforge consumes a declarative list of tasks - each a prompt targeting
//! a source-controlled working directory - and drives them to completion
//! through external coding-agent CLIs, honoring a DAG of dependencies, a
//! per-task runner fallback cascade, a bounded worker pool, and a failure
//! taxonomy covering timeouts, rate limits, connectivity loss, and quality
//! false positives.
//!
//! # Core Concepts
//!
//! - **Dependency scheduling**: tasks unlock only when every parent
//!   completed; failures skip their transitive dependents
//! - **Runner cascade**: each task falls back across an ordered list of
//!   runners, filtered by safety policy and shared suspension state
//! - **Shared coordination**: a time-bounded blacklist, a durable quality
//!   graylist, and per-provider concurrency limits travel through the run
//!   as handles, not globals
//!
//! # Modules
//!
//! - [`graph`] - DAG construction and deterministic topological order
//! - [`scheduler`] - worker-pool executor over the graph
//! - [`cascade`] - per-task runner fallback and safety filtering
//! - [`coordination`] - blacklist, graylist, provider limiter
//! - [`runner`] - runner contract and the subprocess adapter
//! - [`verify`] - post-execution false-positive detection
//! - [`config`] - configuration types and loading
//! - [`taskfile`] - task list loading

pub mod cascade;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod graph;
pub mod runner;
pub mod scheduler;
pub mod taskfile;
pub mod verify;

// Re-export commonly used types
pub use cascade::{CascadeContext, CascadePolicy, resolve_cascade, run_cascade};
pub use config::Config;
pub use coordination::{Blacklist, Graylist, GraylistEntry, ProviderLimiter};
pub use domain::{AttemptInfo, RunnerProfile, Task, TaskResult, TaskState};
pub use graph::{GraphError, TaskGraph};
pub use runner::{CommandRunner, Runner, RunnerRegistry};
pub use scheduler::{Scheduler, SchedulerConfig, UpdateCallback};
pub use taskfile::load_tasks;
pub use verify::{GitWorkVerifier, PostRunVerifier};
