//! Post-execution verification of completed attempts
//!
//! A completed attempt counts as real work when the repository HEAD moved
//! during the attempt, or failing that, when a non-empty `events.jsonl`
//! was left in the attempt's output directory. Attempts that produce
//! neither are flagged as false positives; the flag is observational and
//! never demotes a completed task.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Seam between the cascade and external repository/filesystem state
///
/// Tests substitute in-memory fixtures; production uses [`GitWorkVerifier`].
#[async_trait]
pub trait PostRunVerifier: Send + Sync {
    /// Best-effort textual revision handle for the checkout
    async fn capture_head(&self, repo_dir: &Path) -> Option<String>;

    /// True when a completed attempt produced neither commits nor events
    async fn is_false_positive(
        &self,
        repo_dir: &Path,
        head_before: Option<&str>,
        output_dir: &Path,
    ) -> bool;
}

/// Verifier backed by `git rev-parse` and the event log on disk
#[derive(Debug, Default)]
pub struct GitWorkVerifier;

#[async_trait]
impl PostRunVerifier for GitWorkVerifier {
    async fn capture_head(&self, repo_dir: &Path) -> Option<String> {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(repo_dir)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            debug!(repo = %repo_dir.display(), "git rev-parse failed");
            return None;
        }
        let head = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!head.is_empty()).then_some(head)
    }

    async fn is_false_positive(
        &self,
        repo_dir: &Path,
        head_before: Option<&str>,
        output_dir: &Path,
    ) -> bool {
        if let Some(before) = head_before
            && let Some(after) = self.capture_head(repo_dir).await
            && after != before
        {
            return false;
        }
        !has_event_output(output_dir).await
    }
}

/// True when `events.jsonl` under the directory has at least one
/// non-blank line; falls back to `attempt-*` subdirectories
pub(crate) async fn has_event_output(dir: &Path) -> bool {
    if log_has_lines(&dir.join("events.jsonl")).await {
        return true;
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return false,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name();
        if name.to_string_lossy().starts_with("attempt-")
            && log_has_lines(&entry.path().join("events.jsonl")).await
        {
            return true;
        }
    }
    false
}

async fn log_has_lines(path: &Path) -> bool {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => content.lines().any(|line| !line.trim().is_empty()),
        Err(_) => false,
    }
}
