//! Scheduler configuration

use std::path::PathBuf;
use std::time::Duration;

/// Knobs for one scheduler run
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker pool size
    pub workers: usize,

    /// Stop dispatching new tasks after the first failure
    pub fail_fast: bool,

    /// Wall-clock budget for a single attempt
    pub max_runtime: Duration,

    /// Directory holding repository checkouts (`<repos_dir>/<repo name>`)
    pub repos_dir: PathBuf,

    /// Directory receiving per-task output (`<run_dir>/<task id>`)
    pub run_dir: PathBuf,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            fail_fast: false,
            max_runtime: Duration::from_secs(1800),
            repos_dir: PathBuf::from("repos"),
            run_dir: PathBuf::from("runs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.workers, 4);
        assert!(!config.fail_fast);
        assert_eq!(config.max_runtime, Duration::from_secs(1800));
    }
}
