use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Hidden snapshot file kept next to the input records.
pub const PROGRESS_FILE: &str = ".aaa_progress.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub processed: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

/// Best-effort persistence of which input files a batch has finished.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(aaa_dir: &Path) -> Self {
        Self {
            path: aaa_dir.join(PROGRESS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or corrupt snapshots load as empty.
    pub fn load(&self) -> ProgressRecord {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt progress file");
                ProgressRecord::default()
            }),
            Err(_) => ProgressRecord::default(),
        }
    }

    /// Overwrite the snapshot with the given sets.
    pub fn save(&self, processed: &BTreeSet<String>, failed: &BTreeSet<String>) -> Result<()> {
        let record = ProgressRecord {
            processed: processed.clone(),
            failed: failed.clone(),
            last_updated: Some(chrono::Utc::now().to_rfc3339()),
        };
        let json = serde_json::to_string_pretty(&record).context("Failed to serialize progress")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write progress to {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove progress file {}", self.path.display())),
        }
    }
}
