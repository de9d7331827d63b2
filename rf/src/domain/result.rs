//! Task results and the per-attempt journal
//!
//! A `TaskResult` is created in `Pending` and moves through the state
//! machine exactly once to a terminal state. The attempts journal records
//! every runner invocation (and every skip) in strict temporal order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of a task within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on dependencies
    #[default]
    Pending,
    /// All dependencies completed, queued for a worker
    Ready,
    /// A worker is driving the cascade
    Running,
    /// A runner finished the work
    Completed,
    /// Every eligible runner failed
    Failed,
    /// A dependency failed, or the run drained before this task started
    Skipped,
    /// The final attempt ended on a rate limit
    RateLimited,
}

impl TaskState {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::RateLimited
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::RateLimited => write!(f, "rate_limited"),
        }
    }
}

/// One runner invocation (or skip) within a task's cascade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptInfo {
    /// Runner name this attempt targeted
    pub runner: String,

    /// Outcome of the attempt
    pub state: TaskState,

    /// Wall-clock duration of the attempt
    #[serde(default)]
    pub duration_ms: u64,

    /// Directory the attempt wrote into
    #[serde(default)]
    pub output_dir: String,

    /// Failure description, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when the failure was an unreachable upstream service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_error: Option<String>,
}

/// Final record for one task in a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task this result belongs to
    pub task_id: String,

    /// Current state; terminal once the run returns
    pub state: TaskState,

    /// Moment a worker picked the task up
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// Moment the task reached a terminal state
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,

    /// Wall-clock duration between start and end
    #[serde(default)]
    pub duration_ms: u64,

    /// Primary output directory for the task
    #[serde(default)]
    pub output_dir: String,

    /// Short failure description for display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when the failure was an unreachable upstream service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_error: Option<String>,

    /// Wall-clock instant a rate limit lifts; `None` means unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,

    /// Runner whose attempt produced the final state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner_used: Option<String>,

    /// Ordered journal of every attempt
    #[serde(default)]
    pub attempts: Vec<AttemptInfo>,

    /// Completed without commits or event output
    #[serde(default)]
    pub false_positive: bool,

    /// Opaque caller attachment (e.g. a review reference); round-trips untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<Value>,
}

impl TaskResult {
    /// Create a fresh pending result for a task
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::Pending,
            started_at: None,
            ended_at: None,
            duration_ms: 0,
            output_dir: String::new(),
            error: None,
            connectivity_error: None,
            resets_at: None,
            runner_used: None,
            attempts: Vec::new(),
            false_positive: false,
            review: None,
        }
    }

    /// Create a terminal failure with the given error
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::new(task_id);
        result.state = TaskState::Failed;
        result.error = Some(error.into());
        result
    }

    /// Stamp the start of execution
    pub fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    /// Stamp the end of execution and derive the duration
    pub fn mark_ended(&mut self) {
        let now = Utc::now();
        if let Some(started) = self.started_at {
            self.duration_ms = (now - started).num_milliseconds().max(0) as u64;
        }
        self.ended_at = Some(now);
    }

    /// Last attempt in the journal, if any
    pub fn last_attempt(&self) -> Option<&AttemptInfo> {
        self.attempts.last()
    }

    /// Error string for display; connectivity errors win over generic ones
    pub fn display_error(&self) -> Option<&str> {
        self.connectivity_error
            .as_deref()
            .or(self.error.as_deref())
    }
}
