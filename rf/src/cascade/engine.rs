//! Cascade execution for a single task
//!
//! Attempts each resolved runner in order, strictly sequentially. Every
//! attempt (including skips) lands in the journal. The first completed
//! attempt wins and is checked for false positives; rate limits and
//! connectivity failures feed the shared blacklist; when everything is
//! exhausted the last observed runner result is surfaced.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordination::{Blacklist, ProviderLimiter};
use crate::domain::{AttemptInfo, RunnerProfile, Task, TaskResult, TaskState};
use crate::runner::RunnerRegistry;
use crate::verify::PostRunVerifier;

/// Blacklist duration when a rate limit reports no reset instant
const RATE_LIMIT_FALLBACK_HOURS: i64 = 1;

/// Connectivity loss is a session-scoped condition; suspend for a day
const CONNECTIVITY_BLOCK_HOURS: i64 = 24;

/// Shared handles the cascade needs for one task
#[derive(Clone)]
pub struct CascadeContext {
    /// Runners by name
    pub runners: Arc<RunnerRegistry>,

    /// Advisory profiles; map a runner name to its provider family
    pub profiles: Arc<HashMap<String, RunnerProfile>>,

    /// Shared time-bounded runner suspension
    pub blacklist: Arc<Blacklist>,

    /// Per-provider concurrency limits; `None` means unbounded
    pub limiter: Option<Arc<ProviderLimiter>>,

    /// Post-execution false-positive check
    pub verifier: Arc<dyn PostRunVerifier>,

    /// Wall-clock budget for a single attempt
    pub max_runtime: Duration,
}

impl CascadeContext {
    /// Provider family for a runner name; unprofiled names are their own provider
    fn provider_of<'a>(&'a self, name: &'a str) -> &'a str {
        match self.profiles.get(name) {
            Some(profile) if !profile.kind.is_empty() => &profile.kind,
            _ => name,
        }
    }
}

/// Drive one task through its resolved cascade
pub async fn run_cascade(
    ctx: &CascadeContext,
    cancel: &CancellationToken,
    task: &Task,
    repo_dir: &Path,
    output_dir: &Path,
    cascade: &[String],
) -> TaskResult {
    if cascade.is_empty() {
        let mut result = TaskResult::failed(&task.id, "no runners configured");
        result.output_dir = output_dir.display().to_string();
        return result;
    }

    let mut attempts: Vec<AttemptInfo> = Vec::new();
    let mut last_run: Option<TaskResult> = None;

    for (index, name) in cascade.iter().enumerate() {
        if ctx.blacklist.is_blocked(name).await {
            debug!(task = %task.id, runner = %name, "runner blacklisted, skipping");
            attempts.push(skip_attempt(name, "runner blacklisted"));
            continue;
        }

        let Some(runner) = ctx.runners.get(name) else {
            attempts.push(failed_attempt(name, format!("unknown runner: {name}")));
            continue;
        };

        let attempt_dir = if index == 0 {
            output_dir.to_path_buf()
        } else {
            output_dir.join(format!("attempt-{}-{}", index + 1, name))
        };
        if let Err(e) = tokio::fs::create_dir_all(&attempt_dir).await {
            attempts.push(failed_attempt(
                name,
                format!("failed to create attempt directory: {e}"),
            ));
            continue;
        }

        let head_before = ctx.verifier.capture_head(repo_dir).await;

        let permit = match &ctx.limiter {
            Some(limiter) => limiter.acquire(ctx.provider_of(name)).await,
            None => None,
        };

        info!(task = %task.id, runner = %name, attempt = index + 1, "attempting runner");
        let attempt_cancel = cancel.child_token();
        let started = Instant::now();
        let outcome = tokio::time::timeout(
            ctx.max_runtime,
            runner.run(attempt_cancel.clone(), task, repo_dir, &attempt_dir),
        )
        .await;
        drop(permit);

        let mut attempt_result = match outcome {
            Ok(result) => result,
            Err(_) => {
                // The attempt future was dropped; make sure anything it
                // spawned observes cancellation too
                attempt_cancel.cancel();
                TaskResult::failed(
                    &task.id,
                    format!("attempt timed out after {:?}", ctx.max_runtime),
                )
            }
        };

        // Anything outside the runner contract counts as a failure
        if !matches!(
            attempt_result.state,
            TaskState::Completed | TaskState::Failed | TaskState::RateLimited
        ) {
            attempt_result.state = TaskState::Failed;
        }
        attempt_result.task_id = task.id.clone();
        attempt_result.duration_ms = started.elapsed().as_millis() as u64;
        attempt_result.output_dir = attempt_dir.display().to_string();

        attempts.push(AttemptInfo {
            runner: name.clone(),
            state: attempt_result.state,
            duration_ms: attempt_result.duration_ms,
            output_dir: attempt_result.output_dir.clone(),
            error: attempt_result.error.clone(),
            connectivity_error: attempt_result.connectivity_error.clone(),
        });

        match attempt_result.state {
            TaskState::Completed => {
                let mut result = attempt_result;
                result.runner_used = Some(name.clone());
                result.attempts = attempts;
                result.false_positive = ctx
                    .verifier
                    .is_false_positive(repo_dir, head_before.as_deref(), &attempt_dir)
                    .await;
                if result.false_positive {
                    warn!(
                        task = %task.id,
                        runner = %name,
                        "completed attempt produced no commits and no events"
                    );
                }
                return result;
            }
            TaskState::RateLimited => {
                let until = attempt_result.resets_at.unwrap_or_else(|| {
                    Utc::now() + chrono::Duration::hours(RATE_LIMIT_FALLBACK_HOURS)
                });
                ctx.blacklist.block(name, until).await;
            }
            _ => {
                if attempt_result.connectivity_error.is_some() {
                    let until = Utc::now() + chrono::Duration::hours(CONNECTIVITY_BLOCK_HOURS);
                    warn!(task = %task.id, runner = %name, "connectivity failure, suspending runner");
                    ctx.blacklist.block(name, until).await;
                }
            }
        }

        last_run = Some(attempt_result);
    }

    // Exhausted: surface the last observed runner result, or synthesize
    // a failure when nothing ever ran
    let mut result = match last_run {
        Some(result) => result,
        None => TaskResult::failed(&task.id, "all runners skipped or unavailable"),
    };
    result.runner_used = attempts.last().map(|a| a.runner.clone());
    result.attempts = attempts;
    if result.output_dir.is_empty() {
        result.output_dir = output_dir.display().to_string();
    }
    result
}

fn skip_attempt(runner: &str, error: &str) -> AttemptInfo {
    AttemptInfo {
        runner: runner.to_string(),
        state: TaskState::Skipped,
        duration_ms: 0,
        output_dir: String::new(),
        error: Some(error.to_string()),
        connectivity_error: None,
    }
}

fn failed_attempt(runner: &str, error: String) -> AttemptInfo {
    AttemptInfo {
        runner: runner.to_string(),
        state: TaskState::Failed,
        duration_ms: 0,
        output_dir: String::new(),
        error: Some(error),
        connectivity_error: None,
    }
}
