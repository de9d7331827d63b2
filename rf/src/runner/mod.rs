//! Runner contract and registry
//!
//! A runner is a named adapter that drives one external coding agent
//! against a repository checkout. The orchestrator core only sees this
//! trait; concrete adapters are built by the caller and handed over in a
//! registry keyed by name.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{Task, TaskResult};

pub mod command;

pub use command::CommandRunner;

/// Behavioral contract for one attempt
///
/// Implementations must return a result whose state is `Completed`,
/// `Failed`, or `RateLimited`; set `resets_at` when reporting a rate
/// limit and `connectivity_error` when the failure was an unreachable
/// upstream service; and honor `cancel` promptly.
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        cancel: CancellationToken,
        task: &Task,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult;
}

/// Runners by name, supplied by the caller
pub type RunnerRegistry = HashMap<String, Arc<dyn Runner>>;
