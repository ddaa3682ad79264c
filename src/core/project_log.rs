use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::models::cost::{CostInfo, CostSummary, TokenUsage};
use crate::core::models::outcome::UNKNOWN;
use crate::core::models::record::TestCaseRecord;
use crate::core::report::sanitize_filename;

pub const TASK_NAME: &str = "AAA-Pattern-Analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    InProgress,
    Completed,
    CompletedWithErrors,
}

impl TaskStatus {
    pub fn derive(processed: usize, total: usize, failed: usize, incremental: bool) -> Self {
        let done = processed + failed >= total;
        if incremental && !done {
            Self::InProgress
        } else if failed > 0 {
            Self::CompletedWithErrors
        } else if processed >= total {
            Self::Completed
        } else {
            Self::InProgress
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEntry {
    pub task_name: String,
    pub model: String,
    pub timestamp: String,
    pub total_test_cases: usize,
    pub processed_test_cases: usize,
    pub failed_test_cases: usize,
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub api_calls: u64,
    #[serde(default)]
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub cost: CostInfo,
    pub status: TaskStatus,
}

/// On-disk layout. Foreign task entries are kept as raw JSON so that
/// rewriting our entry never loses fields another tool put there.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectLogFile {
    #[serde(default)]
    project_name: String,
    #[serde(default)]
    tasks: Vec<serde_json::Value>,
    #[serde(default)]
    last_updated: Option<String>,
}

fn is_our_task(task: &serde_json::Value) -> bool {
    task.get("taskName").and_then(|n| n.as_str()) == Some(TASK_NAME)
}

/// Cumulative figures stored by an earlier session.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PreviousTotals {
    pub api_calls: u64,
    pub cache_hits: u64,
    pub usage: TokenUsage,
    pub cost: CostInfo,
}

/// Counts for one log update. `processed`, `total` and `failed` describe the
/// whole project; the `session_*` figures cover only this process.
#[derive(Debug, Clone)]
pub struct LogUpdate<'a> {
    pub processed: usize,
    pub total: usize,
    pub failed: usize,
    pub session_api_calls: u64,
    pub session_cache_hits: u64,
    pub summary: &'a CostSummary,
    pub incremental: bool,
}

/// Per-project summary file `<projectName>-log.json` at the project root.
#[derive(Debug, Clone)]
pub struct ProjectLogStore {
    path: PathBuf,
    project_name: String,
    model: String,
    baseline: PreviousTotals,
}

/// Project name from the first readable input record, else the directory name.
pub fn derive_project_name(project_root: &Path, files: &[PathBuf]) -> String {
    let from_record = files.iter().find_map(|path| {
        let content = std::fs::read_to_string(path).ok()?;
        TestCaseRecord::from_json(&content).ok()
    });
    match from_record {
        Some(record) if !record.project_name.trim().is_empty() && record.project_name != UNKNOWN => {
            record.project_name
        }
        _ => project_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| UNKNOWN.to_string()),
    }
}

impl ProjectLogStore {
    pub fn new(project_root: &Path, project_name: &str, model: &str) -> Self {
        let file_name = sanitize_filename(&format!("{}-log.json", project_name));
        Self {
            path: project_root.join(file_name),
            project_name: project_name.to_string(),
            model: model.to_string(),
            baseline: PreviousTotals::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Counters from an earlier session that updates are layered on top of.
    pub fn set_baseline(&mut self, baseline: PreviousTotals) {
        self.baseline = baseline;
    }

    fn load_file(&self) -> ProjectLogFile {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring corrupt project log");
                ProjectLogFile::default()
            }),
            Err(_) => ProjectLogFile::default(),
        }
    }

    fn write_file(&self, mut file: ProjectLogFile) -> Result<()> {
        file.project_name = self.project_name.clone();
        file.last_updated = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize project log")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write project log to {}", self.path.display()))?;
        Ok(())
    }

    pub fn task_entry(&self) -> Option<TaskEntry> {
        self.load_file()
            .tasks
            .into_iter()
            .find(is_our_task)
            .and_then(|task| serde_json::from_value(task).ok())
    }

    /// Cumulative totals stored by the existing task entry, if any.
    pub fn load_previous_cost(&self) -> Option<PreviousTotals> {
        self.task_entry().map(|entry| PreviousTotals {
            api_calls: entry.api_calls,
            cache_hits: entry.cache_hits,
            usage: entry.token_usage,
            cost: entry.cost,
        })
    }

    /// Replace (or append) the single task entry for this analysis.
    pub fn update(&self, update: &LogUpdate<'_>) -> Result<TaskEntry> {
        let entry = TaskEntry {
            task_name: TASK_NAME.to_string(),
            model: self.model.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            total_test_cases: update.total,
            processed_test_cases: update.processed,
            failed_test_cases: update.failed,
            cache_hits: self.baseline.cache_hits + update.session_cache_hits,
            api_calls: self.baseline.api_calls + update.session_api_calls,
            token_usage: update.summary.usage(),
            cost: update.summary.cost(),
            status: TaskStatus::derive(update.processed, update.total, update.failed, update.incremental),
        };
        let value = serde_json::to_value(&entry).context("Failed to serialize task entry")?;

        let mut file = self.load_file();
        match file.tasks.iter_mut().find(|t| is_our_task(t)) {
            Some(slot) => *slot = value,
            None => file.tasks.push(value),
        }
        self.write_file(file)?;
        Ok(entry)
    }

    /// Drop this analysis' task entry, keeping any other tasks.
    pub fn clear_task(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let mut file = self.load_file();
        file.tasks.retain(|t| !is_our_task(t));
        self.write_file(file)
    }
}
