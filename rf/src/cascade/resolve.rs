//! Cascade composition and safety filtering
//!
//! The primary runner is never filtered: an explicit assignment overrides
//! every safety filter. Fallback positions pass through the
//! data-collection, free-tier, graylist, and secret filters, in that
//! order. Filters are additive; a name survives only if every filter
//! keeps it.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::coordination::Graylist;
use crate::domain::{RunnerProfile, Task};

/// Filtering inputs for cascade resolution
#[derive(Debug, Clone, Default)]
pub struct CascadePolicy {
    /// Runner used when a task does not name one
    pub default_runner: String,

    /// Fallback chain used when a task does not name one
    pub default_fallbacks: Vec<String>,

    /// Advisory profile map consulted by the filters
    pub profiles: HashMap<String, RunnerProfile>,

    /// Repos whose prompts must not reach data-collecting providers
    pub private_repos: HashSet<String>,

    /// Repos known to carry secrets; only cleared runners may touch them
    pub secret_repos: HashSet<String>,

    /// Runners cleared for secret-bearing repos
    pub secret_safe: HashSet<String>,

    /// Whether free-tier runners may appear in fallback positions
    pub allow_free: bool,
}

/// Compose the ordered cascade for a task
///
/// Index 0 is the primary (task override or the configured default);
/// filtered fallbacks follow. An empty result means no runner is
/// configured at all.
pub async fn resolve_cascade(task: &Task, policy: &CascadePolicy, graylist: &Graylist) -> Vec<String> {
    let primary = task
        .runner
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| policy.default_runner.clone());

    if primary.is_empty() {
        debug!(task = %task.id, "no primary runner configured");
        return Vec::new();
    }

    let fallbacks = if task.fallbacks.is_empty() {
        &policy.default_fallbacks
    } else {
        &task.fallbacks
    };

    let mut cascade = vec![primary];
    for name in fallbacks {
        if cascade.contains(name) {
            continue;
        }
        if keep_fallback(name, task, policy, graylist).await {
            cascade.push(name.clone());
        }
    }
    cascade
}

async fn keep_fallback(name: &str, task: &Task, policy: &CascadePolicy, graylist: &Graylist) -> bool {
    let profile = policy.profiles.get(name);

    if policy.private_repos.contains(&task.repo) && profile.is_some_and(|p| p.data_collection) {
        debug!(task = %task.id, runner = %name, "fallback dropped: data collection on private repo");
        return false;
    }

    if !policy.allow_free && profile.is_some_and(|p| p.free) {
        debug!(task = %task.id, runner = %name, "fallback dropped: free tier disabled");
        return false;
    }

    let model = profile.map(|p| p.model.as_str()).unwrap_or("");
    if graylist.is_graylisted(name, model).await {
        debug!(task = %task.id, runner = %name, %model, "fallback dropped: graylisted");
        return false;
    }

    if policy.secret_repos.contains(&task.repo) && !policy.secret_safe.contains(name) {
        debug!(task = %task.id, runner = %name, "fallback dropped: repo carries secrets");
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn graylist(dir: &std::path::Path) -> Graylist {
        Graylist::load(dir.join("graylist.json")).unwrap()
    }

    fn policy() -> CascadePolicy {
        CascadePolicy {
            default_runner: "claude".to_string(),
            default_fallbacks: vec!["codex".to_string(), "gemini".to_string()],
            allow_free: true,
            ..Default::default()
        }
    }

    fn profile(kind: &str, model: &str) -> RunnerProfile {
        RunnerProfile {
            kind: kind.to_string(),
            model: model.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_defaults_used_when_task_is_silent() {
        let temp = tempdir().unwrap();
        let task = Task::new("t", "acme/repo", "p");

        let cascade = resolve_cascade(&task, &policy(), &graylist(temp.path())).await;
        assert_eq!(cascade, ["claude", "codex", "gemini"]);
    }

    #[tokio::test]
    async fn test_task_overrides_win() {
        let temp = tempdir().unwrap();
        let task = Task::new("t", "acme/repo", "p")
            .with_runner("codex")
            .with_fallbacks(&["claude"]);

        let cascade = resolve_cascade(&task, &policy(), &graylist(temp.path())).await;
        assert_eq!(cascade, ["codex", "claude"]);
    }

    #[tokio::test]
    async fn test_fallback_equal_to_primary_is_dropped() {
        let temp = tempdir().unwrap();
        let task = Task::new("t", "acme/repo", "p")
            .with_runner("claude")
            .with_fallbacks(&["claude", "codex", "codex"]);

        let cascade = resolve_cascade(&task, &policy(), &graylist(temp.path())).await;
        assert_eq!(cascade, ["claude", "codex"]);
    }

    #[tokio::test]
    async fn test_data_collection_filter_on_private_repo() {
        let temp = tempdir().unwrap();
        let mut policy = policy();
        policy.private_repos.insert("acme/secret-sauce".to_string());
        let mut collecting = profile("codex", "gpt");
        collecting.data_collection = true;
        policy.profiles.insert("codex".to_string(), collecting);

        let task = Task::new("t", "acme/secret-sauce", "p");
        let cascade = resolve_cascade(&task, &policy, &graylist(temp.path())).await;
        assert_eq!(cascade, ["claude", "gemini"]);

        // Same profiles, public repo: nothing dropped
        let public = Task::new("t", "acme/public", "p");
        let cascade = resolve_cascade(&public, &policy, &graylist(temp.path())).await;
        assert_eq!(cascade, ["claude", "codex", "gemini"]);
    }

    #[tokio::test]
    async fn test_free_tier_filter() {
        let temp = tempdir().unwrap();
        let mut policy = policy();
        policy.allow_free = false;
        let mut free = profile("gemini", "flash");
        free.free = true;
        policy.profiles.insert("gemini".to_string(), free);

        let task = Task::new("t", "acme/repo", "p");
        let cascade = resolve_cascade(&task, &policy, &graylist(temp.path())).await;
        assert_eq!(cascade, ["claude", "codex"]);
    }

    #[tokio::test]
    async fn test_graylist_filter_uses_profile_model() {
        let temp = tempdir().unwrap();
        let mut policy = policy();
        policy.profiles.insert("codex".to_string(), profile("codex", "gpt-5"));

        let gl = graylist(temp.path());
        gl.add("codex", "gpt-5", "false positives").await;

        let task = Task::new("t", "acme/repo", "p");
        let cascade = resolve_cascade(&task, &policy, &gl).await;
        assert_eq!(cascade, ["claude", "gemini"]);
    }

    #[tokio::test]
    async fn test_graylist_wildcard_drops_fallback() {
        let temp = tempdir().unwrap();
        let mut policy = policy();
        policy.profiles.insert("codex".to_string(), profile("codex", "gpt-5"));

        let gl = graylist(temp.path());
        gl.add("codex", "", "always").await;

        let task = Task::new("t", "acme/repo", "p");
        let cascade = resolve_cascade(&task, &policy, &gl).await;
        assert_eq!(cascade, ["claude", "gemini"]);
    }

    #[tokio::test]
    async fn test_primary_is_never_filtered() {
        let temp = tempdir().unwrap();
        let mut policy = policy();
        policy.secret_repos.insert("acme/vault".to_string());

        let gl = graylist(temp.path());
        gl.add("claude", "", "quality").await;

        // Explicit primary survives both graylist and secret filters
        let task = Task::new("t", "acme/vault", "p").with_runner("claude");
        let cascade = resolve_cascade(&task, &policy, &gl).await;
        assert_eq!(cascade[0], "claude");
        // Fallbacks all dropped: none is secret-safe
        assert_eq!(cascade.len(), 1);
    }

    #[tokio::test]
    async fn test_secret_filter_keeps_cleared_runners() {
        let temp = tempdir().unwrap();
        let mut policy = policy();
        policy.secret_repos.insert("acme/vault".to_string());
        policy.secret_safe.insert("codex".to_string());

        let task = Task::new("t", "acme/vault", "p");
        let cascade = resolve_cascade(&task, &policy, &graylist(temp.path())).await;
        assert_eq!(cascade, ["claude", "codex"]);
    }

    #[tokio::test]
    async fn test_no_runner_configured_anywhere() {
        let temp = tempdir().unwrap();
        let policy = CascadePolicy::default();
        let task = Task::new("t", "acme/repo", "p");

        let cascade = resolve_cascade(&task, &policy, &graylist(temp.path())).await;
        assert!(cascade.is_empty());
    }
}
