//! Generic subprocess adapter for external agent CLIs
//!
//! Contract with the wrapped program:
//! - the prompt arrives on stdin and the checkout is the working directory
//! - `RUNFORGE_TASK_ID`, `RUNFORGE_OUTPUT_DIR` and `RUNFORGE_MODEL`
//!   describe the attempt; profile env vars are applied on top
//! - exit 0 means completed; exit 75 (EX_TEMPFAIL) or a rate-limit marker
//!   on stderr means rate limited, optionally with a
//!   `resets-at: <rfc3339>` stderr line carrying the reset instant
//! - connectivity-flavored stderr turns a failure into a connectivity
//!   failure
//!
//! Combined child output lands in `agent.log` inside the attempt
//! directory so post-mortems survive the process.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::{RunnerProfile, Task, TaskResult, TaskState};

use super::Runner;

/// BSD EX_TEMPFAIL, the conventional "try again later" exit
const EXIT_RATE_LIMITED: i32 = 75;

const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "rate-limit", "429", "too many requests"];

const CONNECTIVITY_MARKERS: &[&str] = &[
    "connection refused",
    "connection reset",
    "could not resolve",
    "name resolution",
    "network is unreachable",
    "tls handshake",
    "timed out connecting",
];

/// Runs an external agent binary for each attempt
pub struct CommandRunner {
    name: String,
    program: String,
    args: Vec<String>,
    env: HashMap<String, String>,
    model: String,
}

impl CommandRunner {
    /// Create an adapter invoking `program` with no extra arguments
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            model: String::new(),
        }
    }

    /// Build an adapter from a configured profile
    ///
    /// The profile's `type` is the binary, its model is exported via
    /// `RUNFORGE_MODEL`, and a named agent profile becomes `--profile`.
    pub fn from_profile(name: &str, profile: &RunnerProfile) -> Self {
        let mut runner = Self::new(name, &profile.kind);
        runner.model = profile.model.clone();
        for (key, value) in &profile.env {
            runner = runner.with_env(key.as_str(), value.as_str());
        }
        if let Some(agent_profile) = &profile.profile {
            runner = runner.with_args(["--profile", agent_profile.as_str()]);
        }
        runner
    }

    /// Builder method to append arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Builder method to add environment variables
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adapter name as registered
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Runner for CommandRunner {
    async fn run(
        &self,
        cancel: CancellationToken,
        task: &Task,
        repo_dir: &Path,
        output_dir: &Path,
    ) -> TaskResult {
        let mut result = TaskResult::new(&task.id);
        result.output_dir = output_dir.display().to_string();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(repo_dir)
            .env("RUNFORGE_TASK_ID", &task.id)
            .env("RUNFORGE_OUTPUT_DIR", output_dir)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if !self.model.is_empty() {
            cmd.env("RUNFORGE_MODEL", &self.model);
        }

        debug!(runner = %self.name, program = %self.program, task = %task.id, "spawning agent");
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                result.state = TaskState::Failed;
                result.error = Some(format!("failed to spawn {}: {e}", self.program));
                return result;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = task.prompt.clone();
            // Feed the prompt concurrently; a child that never reads must
            // not wedge the attempt
            tokio::spawn(async move {
                let _ = stdin.write_all(prompt.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }

        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                result.state = TaskState::Failed;
                result.error = Some("attempt cancelled".to_string());
                return result;
            }
        };

        let stdout = stdout_reader.await.unwrap_or_default();
        let stderr = stderr_reader.await.unwrap_or_default();
        let stderr_text = String::from_utf8_lossy(&stderr).to_string();

        write_agent_log(output_dir, &stdout, &stderr).await;

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                result.state = TaskState::Failed;
                result.error = Some(format!("failed to wait for {}: {e}", self.program));
                return result;
            }
        };

        if status.success() {
            result.state = TaskState::Completed;
            return result;
        }

        let lowered = stderr_text.to_lowercase();
        if status.code() == Some(EXIT_RATE_LIMITED)
            || RATE_LIMIT_MARKERS.iter().any(|m| lowered.contains(m))
        {
            result.state = TaskState::RateLimited;
            result.resets_at = parse_resets_at(&stderr_text);
            result.error = Some(format!("{} rate limited", self.name));
            return result;
        }

        result.state = TaskState::Failed;
        result.error = Some(format!("{} exited with {status}", self.program));
        if let Some(marker) = CONNECTIVITY_MARKERS.iter().find(|m| lowered.contains(*m)) {
            warn!(runner = %self.name, %marker, "connectivity failure");
            result.connectivity_error = Some(
                last_nonblank_line(&stderr_text)
                    .unwrap_or(marker)
                    .to_string(),
            );
        }
        result
    }
}

/// Drain a pipe in the background so a chatty child never blocks on it
fn spawn_reader<R>(reader: Option<R>) -> tokio::task::JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_end(&mut buf).await;
        }
        buf
    })
}

async fn write_agent_log(output_dir: &Path, stdout: &[u8], stderr: &[u8]) {
    let mut log = Vec::with_capacity(stdout.len() + stderr.len() + 32);
    log.extend_from_slice(stdout);
    if !stderr.is_empty() {
        if !log.is_empty() && !log.ends_with(b"\n") {
            log.push(b'\n');
        }
        log.extend_from_slice(b"--- stderr ---\n");
        log.extend_from_slice(stderr);
    }
    if let Err(e) = tokio::fs::write(output_dir.join("agent.log"), &log).await {
        warn!(dir = %output_dir.display(), error = %e, "failed to write agent.log");
    }
}

/// Extract a `resets-at: <rfc3339>` line from stderr
fn parse_resets_at(stderr: &str) -> Option<DateTime<Utc>> {
    stderr.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("resets-at:")?;
        DateTime::parse_from_rfc3339(rest.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

fn last_nonblank_line(text: &str) -> Option<&str> {
    text.lines().rev().find(|l| !l.trim().is_empty()).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> CommandRunner {
        CommandRunner::new("test", "sh").with_args(["-c", script])
    }

    async fn run(runner: &CommandRunner, prompt: &str) -> (TaskResult, tempfile::TempDir) {
        let temp = tempdir().unwrap();
        let repo_dir = temp.path().join("repo");
        let output_dir = temp.path().join("out");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();

        let task = Task::new("t1", "acme/repo", prompt);
        let result = runner
            .run(CancellationToken::new(), &task, &repo_dir, &output_dir)
            .await;
        (result, temp)
    }

    #[tokio::test]
    async fn test_exit_zero_is_completed() {
        let (result, _temp) = run(&sh("exit 0"), "p").await;
        assert_eq!(result.state, TaskState::Completed);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failed() {
        let (result, _temp) = run(&sh("exit 3"), "p").await;
        assert_eq!(result.state, TaskState::Failed);
        assert!(result.error.as_deref().unwrap().contains("exited with"));
        assert!(result.connectivity_error.is_none());
    }

    #[tokio::test]
    async fn test_exit_75_is_rate_limited() {
        let (result, _temp) = run(&sh("exit 75"), "p").await;
        assert_eq!(result.state, TaskState::RateLimited);
        assert!(result.resets_at.is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_marker_with_reset_instant() {
        let script = r#"echo "429 too many requests" >&2; echo "resets-at: 2030-01-02T03:04:05Z" >&2; exit 1"#;
        let (result, _temp) = run(&sh(script), "p").await;
        assert_eq!(result.state, TaskState::RateLimited);

        let resets_at = result.resets_at.unwrap();
        assert_eq!(resets_at.to_rfc3339(), "2030-01-02T03:04:05+00:00");
    }

    #[tokio::test]
    async fn test_connectivity_marker_sets_dedicated_field() {
        let (result, _temp) = run(&sh(r#"echo "curl: connection refused" >&2; exit 7"#), "p").await;
        assert_eq!(result.state, TaskState::Failed);
        assert!(
            result
                .connectivity_error
                .as_deref()
                .unwrap()
                .contains("connection refused")
        );
    }

    #[tokio::test]
    async fn test_prompt_arrives_on_stdin() {
        let (result, temp) = run(&sh(r#"cat > "$RUNFORGE_OUTPUT_DIR/prompt-copy""#), "fix the bug").await;
        assert_eq!(result.state, TaskState::Completed);

        let copied = std::fs::read_to_string(temp.path().join("out").join("prompt-copy")).unwrap();
        assert_eq!(copied, "fix the bug");
    }

    #[tokio::test]
    async fn test_agent_log_is_written() {
        let (result, temp) = run(&sh(r#"echo working; echo "oops" >&2; exit 1"#), "p").await;
        assert_eq!(result.state, TaskState::Failed);

        let log = std::fs::read_to_string(temp.path().join("out").join("agent.log")).unwrap();
        assert!(log.contains("working"));
        assert!(log.contains("--- stderr ---"));
        assert!(log.contains("oops"));
    }

    #[tokio::test]
    async fn test_cancellation_kills_the_child() {
        let temp = tempdir().unwrap();
        let repo_dir = temp.path().join("repo");
        let output_dir = temp.path().join("out");
        std::fs::create_dir_all(&repo_dir).unwrap();
        std::fs::create_dir_all(&output_dir).unwrap();

        let runner = sh("sleep 30");
        let task = Task::new("t1", "acme/repo", "p");
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = std::time::Instant::now();
        let result = runner.run(cancel, &task, &repo_dir, &output_dir).await;
        assert_eq!(result.state, TaskState::Failed);
        assert_eq!(result.error.as_deref(), Some("attempt cancelled"));
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let runner = CommandRunner::new("ghost", "definitely-not-a-real-binary-xyz");
        let (result, _temp) = run(&runner, "p").await;
        assert_eq!(result.state, TaskState::Failed);
        assert!(result.error.as_deref().unwrap().contains("failed to spawn"));
    }

    #[test]
    fn test_from_profile() {
        let profile = RunnerProfile {
            kind: "claude".to_string(),
            model: "sonnet".to_string(),
            profile: Some("work".to_string()),
            env: HashMap::from([("KEY".to_string(), "VALUE".to_string())]),
            data_collection: false,
            free: false,
        };

        let runner = CommandRunner::from_profile("claude-work", &profile);
        assert_eq!(runner.name(), "claude-work");
        assert_eq!(runner.program, "claude");
        assert_eq!(runner.args, vec!["--profile", "work"]);
        assert_eq!(runner.model, "sonnet");
        assert_eq!(runner.env["KEY"], "VALUE");
    }

    #[test]
    fn test_parse_resets_at_ignores_garbage() {
        assert!(parse_resets_at("no marker here").is_none());
        assert!(parse_resets_at("resets-at: not-a-date").is_none());

        let parsed = parse_resets_at("noise\nresets-at: 2030-06-01T00:00:00+02:00\nmore");
        assert!(parsed.is_some());
    }
}
