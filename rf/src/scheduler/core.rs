//! Scheduler core
//!
//! A single dispatcher loop advances the state machine: it hands ready
//! tasks to workers (bounded by the pool size), processes completion
//! messages, unlocks children on success, skips transitive dependents on
//! failure, and drains the queue on fail-fast or cancellation. Workers
//! report back over a channel; panics inside a worker are contained and
//! surface as a failed task.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cascade::{CascadeContext, CascadePolicy, resolve_cascade, run_cascade};
use crate::coordination::Graylist;
use crate::domain::{Task, TaskResult, TaskState};
use crate::graph::{GraphError, TaskGraph};

use super::config::SchedulerConfig;
use super::queue::ReadyQueue;

/// Snapshot callback fired on every task state transition
pub type UpdateCallback = Arc<dyn Fn(&str, &TaskResult) + Send + Sync>;

/// Worker-pool executor over a task graph
pub struct Scheduler {
    config: SchedulerConfig,
    cascade: CascadeContext,
    policy: Arc<CascadePolicy>,
    graylist: Arc<Graylist>,
    on_update: Option<UpdateCallback>,
}

/// Completion message from a worker
struct TaskDone {
    id: String,
    result: TaskResult,
}

/// Mutable run state owned by the dispatcher loop
struct RunState {
    states: HashMap<String, TaskState>,
    results: HashMap<String, TaskResult>,
    waiting: HashMap<String, usize>,
    ready: ReadyQueue,
    draining: bool,
}

impl Scheduler {
    /// Create a scheduler over the given shared handles
    pub fn new(
        config: SchedulerConfig,
        cascade: CascadeContext,
        policy: CascadePolicy,
        graylist: Arc<Graylist>,
    ) -> Self {
        Self {
            config,
            cascade,
            policy: Arc::new(policy),
            graylist,
            on_update: None,
        }
    }

    /// Builder method to install a progress callback
    pub fn with_on_update(mut self, on_update: UpdateCallback) -> Self {
        self.on_update = Some(on_update);
        self
    }

    /// Run every task to a terminal state
    ///
    /// Returns one terminal result per task. Graph construction failures
    /// (cycle, dangling reference) abort before anything runs.
    pub async fn run(
        &self,
        tasks: &[Task],
        cancel: CancellationToken,
    ) -> Result<HashMap<String, TaskResult>, GraphError> {
        let graph = Arc::new(TaskGraph::build(tasks)?);
        let workers = self.config.workers.max(1);
        info!(tasks = graph.len(), workers, "starting run");

        let mut state = RunState {
            states: HashMap::new(),
            results: HashMap::new(),
            waiting: HashMap::new(),
            ready: ReadyQueue::new(),
            draining: false,
        };
        for id in graph.order() {
            state.states.insert(id.clone(), TaskState::Pending);
            let mut result = TaskResult::new(id);
            result.output_dir = self.config.run_dir.join(id).display().to_string();
            state.results.insert(id.clone(), result);
            let parent_count = graph.parents(id).map(|p| p.len()).unwrap_or(0);
            state.waiting.insert(id.clone(), parent_count);
        }
        for id in graph.roots() {
            self.mark_ready(&mut state, &graph, &id);
        }

        let (done_tx, mut done_rx) = mpsc::channel::<TaskDone>(workers.max(16));
        let mut inflight = 0usize;

        loop {
            if cancel.is_cancelled() && !state.draining {
                self.drain(&mut state, "run cancelled");
            }

            // Hand ready tasks to workers while the pool has room
            while !state.draining && inflight < workers {
                let Some(entry) = state.ready.pop() else { break };
                // Entries skipped after enqueue are stale
                if state.states.get(&entry.id) != Some(&TaskState::Ready) {
                    continue;
                }
                let Some(task) = graph.task(&entry.id).cloned() else {
                    continue;
                };

                self.transition(&mut state, &entry.id, TaskState::Running, None);
                inflight += 1;

                let cascade_ctx = self.cascade.clone();
                let policy = self.policy.clone();
                let graylist = self.graylist.clone();
                let repos_dir = self.config.repos_dir.clone();
                let run_dir = self.config.run_dir.clone();
                let task_cancel = cancel.child_token();
                let tx = done_tx.clone();
                tokio::spawn(async move {
                    let id = task.id.clone();
                    // Inner spawn contains panics; the join error carries
                    // the panic payload
                    let handle = tokio::spawn(execute_task(
                        cascade_ctx,
                        policy,
                        graylist,
                        task,
                        repos_dir,
                        run_dir,
                        task_cancel,
                    ));
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(e) => panic_result(&id, e),
                    };
                    let _ = tx.send(TaskDone { id, result }).await;
                });
            }

            if inflight == 0 {
                break;
            }

            tokio::select! {
                done = done_rx.recv() => {
                    let Some(done) = done else { break };
                    inflight -= 1;
                    self.complete(&mut state, &graph, done);
                }
                _ = cancel.cancelled(), if !state.draining => {
                    self.drain(&mut state, "run cancelled");
                }
            }
        }

        // Safety net: nothing should be left non-terminal at this point
        let mut leftover: Vec<String> = state
            .states
            .iter()
            .filter(|(_, s)| !s.is_terminal())
            .map(|(id, _)| id.clone())
            .collect();
        leftover.sort();
        for id in leftover {
            warn!(task = %id, "task never reached a terminal state");
            self.skip(&mut state, &id, "not started".to_string());
        }

        info!(tasks = graph.len(), "run complete");
        Ok(state.results)
    }

    /// Transition Pending → Ready and enqueue for dispatch
    fn mark_ready(&self, state: &mut RunState, graph: &TaskGraph, id: &str) {
        self.transition(state, id, TaskState::Ready, None);
        let priority = graph.task(id).map(|t| t.priority).unwrap_or_default();
        state.ready.push(priority, id);
    }

    /// Apply a state transition and notify the progress callback
    fn transition(&self, state: &mut RunState, id: &str, to: TaskState, error: Option<String>) {
        state.states.insert(id.to_string(), to);
        if let Some(result) = state.results.get_mut(id) {
            result.state = to;
            if to == TaskState::Running {
                result.mark_started();
            }
            if let Some(error) = error {
                result.error = Some(error);
            }
            if to.is_terminal() {
                result.mark_ended();
            }
            if let Some(on_update) = &self.on_update {
                let snapshot = result.clone();
                on_update(id, &snapshot);
            }
        }
    }

    fn skip(&self, state: &mut RunState, id: &str, error: String) {
        debug!(task = %id, %error, "skipping task");
        self.transition(state, id, TaskState::Skipped, Some(error));
    }

    /// Stop dispatching and skip everything not yet started
    fn drain(&self, state: &mut RunState, reason: &str) {
        state.draining = true;
        let mut not_started: Vec<String> = state
            .states
            .iter()
            .filter(|(_, s)| matches!(s, TaskState::Pending | TaskState::Ready))
            .map(|(id, _)| id.clone())
            .collect();
        not_started.sort();
        for id in not_started {
            self.skip(state, &id, reason.to_string());
        }
        state.ready.drain();
    }

    /// Fold a worker's result back into the run
    fn complete(&self, state: &mut RunState, graph: &TaskGraph, done: TaskDone) {
        let TaskDone { id, mut result } = done;

        // The dispatcher stamped the start; keep it and derive the duration
        if let Some(stored) = state.results.get(&id) {
            result.started_at = stored.started_at;
        }
        result.mark_ended();
        let final_state = result.state;
        state.states.insert(id.clone(), final_state);
        if let Some(on_update) = &self.on_update {
            on_update(&id, &result);
        }
        info!(
            task = %id,
            state = %final_state,
            runner = result.runner_used.as_deref().unwrap_or("-"),
            attempts = result.attempts.len(),
            "task finished"
        );
        state.results.insert(id.clone(), result);

        if final_state == TaskState::Completed {
            // Unlock children whose parents have now all completed
            for child in graph.children(&id) {
                if state.states.get(child) != Some(&TaskState::Pending) {
                    continue;
                }
                if let Some(waiting) = state.waiting.get_mut(child) {
                    *waiting = waiting.saturating_sub(1);
                    if *waiting == 0 {
                        self.mark_ready(state, graph, child);
                    }
                }
            }
        } else {
            // Failure cascade: skip every transitive dependent not yet started
            for dependent in graph.dependents(&id) {
                if matches!(
                    state.states.get(&dependent),
                    Some(TaskState::Pending | TaskState::Ready)
                ) {
                    self.skip(state, &dependent, format!("dependency \"{id}\" failed"));
                }
            }
            if self.config.fail_fast && !state.draining {
                info!(task = %id, "fail-fast: draining the queue");
                self.drain(state, &format!("fail-fast after \"{id}\""));
            }
        }
    }
}

/// One task's execution inside a worker
async fn execute_task(
    ctx: CascadeContext,
    policy: Arc<CascadePolicy>,
    graylist: Arc<Graylist>,
    task: Task,
    repos_dir: PathBuf,
    run_dir: PathBuf,
    cancel: CancellationToken,
) -> TaskResult {
    let repo_dir = repos_dir.join(task.repo_dir_name());
    let output_dir = run_dir.join(&task.id);
    if let Err(e) = tokio::fs::create_dir_all(&output_dir).await {
        return TaskResult::failed(&task.id, format!("failed to create output directory: {e}"));
    }

    let cascade = resolve_cascade(&task, &policy, &graylist).await;
    debug!(task = %task.id, ?cascade, "resolved cascade");
    run_cascade(&ctx, &cancel, &task, &repo_dir, &output_dir, &cascade).await
}

/// Map a worker join error to a failed result
fn panic_result(id: &str, err: tokio::task::JoinError) -> TaskResult {
    let message = if err.is_panic() {
        let payload = err.into_panic();
        let text = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("task panicked: {text}")
    } else {
        "task aborted".to_string()
    };
    error!(task = %id, %message, "worker crashed");
    TaskResult::failed(id, message)
}
