//! Runforge configuration types and loading

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cascade::CascadePolicy;
use crate::domain::RunnerProfile;

/// Main runforge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runner registry defaults and profiles
    pub runners: RunnersConfig,

    /// Concurrency limits
    pub concurrency: ConcurrencyConfig,

    /// Safety filters applied to fallback positions
    pub safety: SafetyConfig,

    /// Execution limits
    pub limits: LimitsConfig,

    /// Filesystem layout
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration, preferring an explicit path over discovery
    ///
    /// An explicit path must load or the call fails. Otherwise the first
    /// readable candidate wins: project-local `.runforge.yml`, then
    /// `<config_dir>/runforge/runforge.yml`; unreadable candidates are
    /// logged and skipped, and defaults apply when none exists.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("failed to load config from {}", path.display()));
        }

        for candidate in Self::candidate_paths() {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "skipping unreadable config");
                }
            }
        }

        tracing::info!("no config file found, using defaults");
        Ok(Self::default())
    }

    /// Discovery order when no explicit path is given
    fn candidate_paths() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(".runforge.yml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("runforge").join("runforge.yml"));
        }
        candidates
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).context(format!("failed to read {}", path.display()))?;
        let config = serde_yaml::from_str(&content)
            .context(format!("failed to parse {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Filtering inputs for cascade resolution
    pub fn cascade_policy(&self) -> CascadePolicy {
        CascadePolicy {
            default_runner: self.runners.default_runner.clone(),
            default_fallbacks: self.runners.fallbacks.clone(),
            profiles: self.runners.profiles.clone(),
            private_repos: self.safety.private_repos.iter().cloned().collect(),
            secret_repos: self.safety.secret_repos.iter().cloned().collect(),
            secret_safe: self.safety.secret_safe.iter().cloned().collect(),
            allow_free: self.safety.allow_free,
        }
    }
}

/// Runner defaults and profile map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnersConfig {
    /// Runner used when a task does not name one
    #[serde(rename = "default")]
    pub default_runner: String,

    /// Fallback chain used when a task does not name one
    pub fallbacks: Vec<String>,

    /// Named runner profiles
    pub profiles: HashMap<String, RunnerProfile>,
}

impl Default for RunnersConfig {
    fn default() -> Self {
        Self {
            default_runner: "claude".to_string(),
            fallbacks: Vec::new(),
            profiles: HashMap::new(),
        }
    }
}

/// Concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Worker pool size
    pub workers: usize,

    /// Maximum concurrent attempts per provider family
    #[serde(rename = "provider-limits")]
    pub provider_limits: HashMap<String, usize>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            provider_limits: HashMap::new(),
        }
    }
}

/// Safety filters for fallback selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Repos whose prompts must not reach data-collecting providers
    #[serde(rename = "private-repos")]
    pub private_repos: Vec<String>,

    /// Repos known to carry secrets
    #[serde(rename = "secret-repos")]
    pub secret_repos: Vec<String>,

    /// Runners cleared for secret-bearing repos
    #[serde(rename = "secret-safe")]
    pub secret_safe: Vec<String>,

    /// Whether free-tier runners may appear in fallback positions
    #[serde(rename = "allow-free")]
    pub allow_free: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            private_repos: Vec::new(),
            secret_repos: Vec::new(),
            secret_safe: Vec::new(),
            allow_free: true,
        }
    }
}

/// Execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock budget for a single attempt, in seconds
    #[serde(rename = "max-runtime-secs")]
    pub max_runtime_secs: u64,

    /// Stop dispatching new tasks after the first failure
    #[serde(rename = "fail-fast")]
    pub fail_fast: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_runtime_secs: 1800,
            fail_fast: false,
        }
    }
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding repository checkouts
    #[serde(rename = "repos-dir")]
    pub repos_dir: PathBuf,

    /// Base directory for per-run output
    #[serde(rename = "runs-dir")]
    pub runs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            repos_dir: PathBuf::from("repos"),
            runs_dir: PathBuf::from(".runforge/runs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.runners.default_runner, "claude");
        assert_eq!(config.concurrency.workers, 4);
        assert!(config.safety.allow_free);
        assert_eq!(config.limits.max_runtime_secs, 1800);
        assert!(!config.limits.fail_fast);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
runners:
  default: claude-work
  fallbacks: [codex, gemini-free]
  profiles:
    claude-work:
      type: claude
      model: claude-sonnet-4-20250514
      profile: work
    gemini-free:
      type: gemini
      model: gemini-pro
      free: true
      data-collection: true
concurrency:
  workers: 8
  provider-limits:
    claude: 2
    gemini: 1
safety:
  private-repos: [acme/secret-sauce]
  secret-repos: [acme/vault]
  secret-safe: [claude-work]
  allow-free: false
limits:
  max-runtime-secs: 600
  fail-fast: true
paths:
  repos-dir: /srv/checkouts
  runs-dir: /srv/runs
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.runners.default_runner, "claude-work");
        assert_eq!(config.runners.fallbacks, vec!["codex", "gemini-free"]);
        assert_eq!(config.runners.profiles["gemini-free"].kind, "gemini");
        assert!(config.runners.profiles["gemini-free"].free);
        assert_eq!(config.concurrency.workers, 8);
        assert_eq!(config.concurrency.provider_limits["claude"], 2);
        assert!(!config.safety.allow_free);
        assert_eq!(config.limits.max_runtime_secs, 600);
        assert!(config.limits.fail_fast);
        assert_eq!(config.paths.repos_dir, PathBuf::from("/srv/checkouts"));
    }

    #[test]
    fn test_cascade_policy_from_config() {
        let yaml = r#"
runners:
  default: claude
  fallbacks: [codex]
safety:
  private-repos: [acme/private]
  allow-free: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let policy = config.cascade_policy();
        assert_eq!(policy.default_runner, "claude");
        assert_eq!(policy.default_fallbacks, vec!["codex"]);
        assert!(policy.private_repos.contains("acme/private"));
        assert!(!policy.allow_free);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("custom.yml");
        fs::write(&path, "concurrency:\n  workers: 16\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.concurrency.workers, 16);

        // An explicit path that does not exist is an error, not a fallback
        let missing = temp.path().join("nope.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = serde_yaml::from_str("concurrency:\n  workers: 2\n").unwrap();
        assert_eq!(config.concurrency.workers, 2);
        assert_eq!(config.runners.default_runner, "claude");
        assert_eq!(config.limits.max_runtime_secs, 1800);
    }
}
