//! Time-bounded runner suspension
//!
//! Runners land here when they rate-limit or lose connectivity; entries
//! carry an unblock instant and expire on their own. Expired entries are
//! pruned lazily on query. Nothing persists across the process.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Thread-safe map of runner name to unblock instant
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Blacklist {
    /// Create an empty blacklist
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend a runner until the given instant
    pub async fn block(&self, runner: &str, until: DateTime<Utc>) {
        let mut entries = self.entries.lock().await;
        entries.insert(runner.to_string(), until);
        info!(%runner, %until, "runner blacklisted");
    }

    /// True iff an entry exists and has not expired
    pub async fn is_blocked(&self, runner: &str) -> bool {
        let mut entries = self.entries.lock().await;
        match entries.get(runner) {
            Some(until) if Utc::now() < *until => true,
            Some(_) => {
                entries.remove(runner);
                debug!(%runner, "blacklist entry expired");
                false
            }
            None => false,
        }
    }

    /// Active unblock instant for a runner, if any
    pub async fn blocked_until(&self, runner: &str) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().await;
        entries
            .get(runner)
            .copied()
            .filter(|until| Utc::now() < *until)
    }

    /// Lift a suspension
    pub async fn clear(&self, runner: &str) {
        let mut entries = self.entries.lock().await;
        if entries.remove(runner).is_some() {
            info!(%runner, "blacklist entry cleared");
        }
    }
}
