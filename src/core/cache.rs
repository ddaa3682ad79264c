use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::models::outcome::AnalysisOutcome;

pub const DEFAULT_CACHE_DIR: &str = ".aaa_cache";
const CACHE_FILE: &str = "analysis_cache.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(flatten)]
    pub outcome: AnalysisOutcome,
    pub cached_at: String,
}

/// Fingerprint -> outcome map backed by a single JSON file.
///
/// Entries are never evicted. A disabled cache never hits and never writes.
#[derive(Debug)]
pub struct ResultCache {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResultCache {
    /// Open the cache in `cache_dir`. A missing or corrupt file gives an empty cache.
    pub fn open(cache_dir: &Path) -> Self {
        let path = cache_dir.join(CACHE_FILE);
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache file");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn get(&self, fingerprint: &str) -> Option<AnalysisOutcome> {
        if !self.is_enabled() {
            return None;
        }
        self.lock().get(fingerprint).map(|e| e.outcome.clone())
    }

    /// Store an outcome and rewrite the cache file straight away.
    pub fn put(&self, fingerprint: &str, outcome: &AnalysisOutcome) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut entries = self.lock();
        entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                outcome: outcome.clone(),
                cached_at: chrono::Utc::now().to_rfc3339(),
            },
        );
        // Serialize while holding the lock so concurrent puts never write a
        // stale map over a newer one.
        let json = serde_json::to_string_pretty(&*entries).context("Failed to serialize result cache")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write cache to {}", path.display()))?;
        Ok(())
    }
}
