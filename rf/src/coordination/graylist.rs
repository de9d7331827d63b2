//! Durable (runner, model) quality suspension
//!
//! Entries are keyed `"<runner>:<model>"`; an empty model is a wildcard
//! that suspends every model of that runner. The list loads once from
//! disk and rewrites the file on every mutation via
//! write-temp-then-atomic-rename. Persistence failures are warnings; the
//! in-memory view stays authoritative.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Reason and timestamp for one suspension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraylistEntry {
    /// Why the pair was suspended
    pub reason: String,

    /// When the entry was added
    pub added_at: DateTime<Utc>,
}

/// Persistent quality suspension list
#[derive(Debug)]
pub struct Graylist {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, GraylistEntry>>,
}

impl Graylist {
    /// Well-known per-user location: `<config_dir>/runforge/graylist.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| eyre::eyre!("could not determine config directory"))?;
        Ok(config_dir.join("runforge").join("graylist.json"))
    }

    /// Load the graylist from disk; a missing file yields an empty list
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)
                .context(format!("failed to read graylist from {}", path.display()))?;
            serde_json::from_str(&content)
                .context(format!("failed to parse graylist at {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn key(runner: &str, model: &str) -> String {
        format!("{runner}:{model}")
    }

    /// Suspend a (runner, model) pair; an existing entry is replaced
    pub async fn add(&self, runner: &str, model: &str, reason: &str) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            Self::key(runner, model),
            GraylistEntry {
                reason: reason.to_string(),
                added_at: Utc::now(),
            },
        );
        info!(%runner, %model, %reason, "runner graylisted");
        self.persist(&entries);
    }

    /// Lift a suspension; returns whether an entry was removed
    pub async fn remove(&self, runner: &str, model: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(&Self::key(runner, model)).is_some();
        if removed {
            info!(%runner, %model, "graylist entry removed");
            self.persist(&entries);
        }
        removed
    }

    /// True when the exact pair or a wildcard entry for the runner exists
    pub async fn is_graylisted(&self, runner: &str, model: &str) -> bool {
        let entries = self.entries.lock().await;
        entries.contains_key(&Self::key(runner, model)) || entries.contains_key(&Self::key(runner, ""))
    }

    /// Snapshot of every entry
    pub async fn entries(&self) -> BTreeMap<String, GraylistEntry> {
        self.entries.lock().await.clone()
    }

    /// Drop every entry
    pub async fn clear(&self) {
        let mut entries = self.entries.lock().await;
        if !entries.is_empty() {
            entries.clear();
            info!("graylist cleared");
            self.persist(&entries);
        }
    }

    /// Rewrite the durable file; errors degrade to warnings
    fn persist(&self, entries: &BTreeMap<String, GraylistEntry>) {
        if let Err(e) = write_atomic(&self.path, entries) {
            warn!(path = %self.path.display(), error = %e, "failed to persist graylist");
        }
    }
}

/// Write temp file in the target directory, fsync best-effort, rename over
fn write_atomic(path: &Path, entries: &BTreeMap<String, GraylistEntry>) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent).context("failed to create graylist directory")?;

    let tmp = NamedTempFile::new_in(&parent).context("failed to create graylist temp file")?;
    serde_json::to_writer_pretty(tmp.as_file(), entries).context("failed to serialize graylist")?;
    let _ = tmp.as_file().sync_all();
    tmp.persist(path).context("failed to replace graylist file")?;
    Ok(())
}
