use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::core::cache::ResultCache;
use crate::core::client::{AnalysisClient, AnalysisError, ReasoningEffort};
use crate::core::cost::ledger::CostLedger;
use crate::core::fingerprint::fingerprint;
use crate::core::models::cost::CostSummary;
use crate::core::models::outcome::{AnalysisOutcome, CsvReportRow};
use crate::core::models::record::TestCaseRecord;
use crate::core::parser::parse_response;
use crate::core::progress::{ProgressStore, PROGRESS_FILE};
use crate::core::project_log::{derive_project_name, LogUpdate, ProjectLogStore};
use crate::core::prompt::{format_test_case, FormatError};
use crate::core::rate_limit::RateLimiter;
use crate::core::report::{report_file_name, CsvReport};

/// Sub-directory of a project that holds the test case records.
pub const AAA_DIR: &str = "AAA";

/// Progress and project log are snapshotted after every this many files.
const SNAPSHOT_EVERY: usize = 3;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("AAA folder not found in {0}")]
    MissingDirectory(PathBuf),
    #[error("AAA path is not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Why a single input file was not processed.
#[derive(Error, Debug)]
pub enum FileFailure {
    #[error("failed to read file: {0}")]
    Read(#[source] std::io::Error),
    #[error("invalid test case JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error("no <analysis> block could be parsed from the response")]
    Unparseable,
    #[error("failed to write report row: {0:#}")]
    Report(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub reasoning_effort: ReasoningEffort,
    pub max_workers: usize,
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub requests_per_minute: u32,
    pub restart: bool,
}

/// What a batch run did, for rendering.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub project_name: String,
    pub csv_path: Option<PathBuf>,
    pub total_files: usize,
    pub previously_processed: usize,
    pub processed_this_run: usize,
    pub failed: usize,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub cost: CostSummary,
    pub success: bool,
}

#[derive(Debug, Default)]
struct RunState {
    processed: BTreeSet<String>,
    failed: BTreeSet<String>,
    completed: usize,
    processed_this_run: usize,
    cache_hits: u64,
    api_calls: u64,
}

/// Owned copy of the state written by a progress snapshot.
struct Snapshot {
    completed: usize,
    processed: BTreeSet<String>,
    failed: BTreeSet<String>,
    api_calls: u64,
    cache_hits: u64,
}

impl RunState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            completed: self.completed,
            processed: self.processed.clone(),
            failed: self.failed.clone(),
            api_calls: self.api_calls,
            cache_hits: self.cache_hits,
        }
    }
}

/// Everything a worker needs, shared across the batch.
struct BatchContext {
    client: Arc<dyn AnalysisClient>,
    effort: ReasoningEffort,
    total: usize,
    ledger: CostLedger,
    cache: ResultCache,
    limiter: RateLimiter,
    report: CsvReport,
    progress: ProgressStore,
    log: ProjectLogStore,
    state: Mutex<RunState>,
    /// `completed` count of the newest snapshot on disk.
    persisted: tokio::sync::Mutex<usize>,
}

struct Analyzed {
    record: TestCaseRecord,
    outcome: AnalysisOutcome,
    from_cache: bool,
}

pub struct BatchOrchestrator {
    client: Arc<dyn AnalysisClient>,
    options: BatchOptions,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Visible `*.json` files directly inside `aaa_dir`, sorted by name.
pub fn discover_inputs(aaa_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(aaa_dir)
        .with_context(|| format!("Failed to list {}", aaa_dir.display()))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .filter(|path| {
            let name = file_name(path);
            !name.starts_with('.') && name != PROGRESS_FILE
        })
        .collect();
    files.sort();
    Ok(files)
}

impl BatchContext {
    fn state(&self) -> MutexGuard<'_, RunState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn analyze_file(self: &Arc<Self>, path: &Path) -> Result<Analyzed, FileFailure> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(FileFailure::Read)?;
        let record = TestCaseRecord::from_json(&content)?;
        let key = fingerprint(&record);

        if let Some(outcome) = self.cache.get(&key) {
            return Ok(Analyzed {
                record,
                outcome,
                from_cache: true,
            });
        }

        let prompt = format_test_case(&record)?;
        self.limiter.acquire().await;
        let response = self.client.analyze(&prompt, self.effort).await?;
        self.ledger.record(response.usage, response.cost);
        self.state().api_calls += 1;

        let outcome = parse_response(&response.text)
            .into_outcome()
            .ok_or(FileFailure::Unparseable)?;
        if self.cache.is_enabled() {
            let ctx = Arc::clone(self);
            let stored = outcome.clone();
            match tokio::task::spawn_blocking(move || ctx.cache.put(&key, &stored)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %format!("{e:#}"), "failed to write result cache"),
                Err(e) => warn!(error = %e, "result cache write task failed"),
            }
        }
        Ok(Analyzed {
            record,
            outcome,
            from_cache: false,
        })
    }

    async fn process_file(self: Arc<Self>, path: PathBuf) {
        let name = file_name(&path);
        debug!(file = %name, "processing");

        let result = match self.analyze_file(&path).await {
            Ok(analyzed) => self
                .report
                .append(&CsvReportRow::new(&analyzed.record, &analyzed.outcome))
                .map(|()| analyzed)
                .map_err(FileFailure::Report),
            Err(e) => Err(e),
        };

        let due = {
            let mut state = self.state();
            match result {
                Ok(analyzed) => {
                    state.failed.remove(&name);
                    state.processed.insert(name.clone());
                    state.processed_this_run += 1;
                    if analyzed.from_cache {
                        state.cache_hits += 1;
                    }
                    info!(
                        file = %name,
                        issue = %analyzed.outcome.issue_type,
                        cached = analyzed.from_cache,
                        "analyzed"
                    );
                }
                Err(e) => {
                    // Recoverable; quiet runs only report the final count.
                    state.failed.insert(name.clone());
                    info!(file = %name, error = %e, "failed to analyze");
                }
            }
            state.completed += 1;
            (state.completed % SNAPSHOT_EVERY == 0).then(|| state.snapshot())
        };
        if let Some(snapshot) = due {
            self.persist(snapshot, true).await;
        }
    }

    /// Write a snapshot off the runtime threads, never replacing a newer one.
    async fn persist(self: &Arc<Self>, snapshot: Snapshot, incremental: bool) {
        let mut newest = self.persisted.lock().await;
        if snapshot.completed < *newest {
            return;
        }
        *newest = snapshot.completed;
        let ctx = Arc::clone(self);
        let written =
            tokio::task::spawn_blocking(move || ctx.write_snapshot(&snapshot, incremental)).await;
        if let Err(e) = written {
            warn!(error = %e, "snapshot task failed");
        }
    }

    /// Persist progress and the project log. Failures only warn.
    fn write_snapshot(&self, snapshot: &Snapshot, incremental: bool) {
        if let Err(e) = self.progress.save(&snapshot.processed, &snapshot.failed) {
            warn!(error = %format!("{e:#}"), "failed to save progress");
        }
        let summary = self.ledger.summarize();
        let update = LogUpdate {
            processed: snapshot.processed.len(),
            total: self.total,
            failed: snapshot.failed.len(),
            session_api_calls: snapshot.api_calls,
            session_cache_hits: snapshot.cache_hits,
            summary: &summary,
            incremental,
        };
        if let Err(e) = self.log.update(&update) {
            warn!(error = %format!("{e:#}"), "failed to update project log");
        }
    }
}

impl BatchOrchestrator {
    pub fn new(client: Arc<dyn AnalysisClient>, options: BatchOptions) -> Self {
        Self { client, options }
    }

    /// Analyze every test case record under `<project_root>/AAA`.
    ///
    /// Per-file failures are recorded and never abort the batch. The run is
    /// unsuccessful only when no file has ever been processed.
    pub async fn run(&self, project_root: &Path) -> Result<BatchSummary> {
        let aaa_dir = project_root.join(AAA_DIR);
        if !aaa_dir.exists() {
            return Err(ScanError::MissingDirectory(project_root.to_path_buf()).into());
        }
        if !aaa_dir.is_dir() {
            return Err(ScanError::NotADirectory(aaa_dir).into());
        }

        let files = discover_inputs(&aaa_dir)?;
        let project_name = derive_project_name(project_root, &files);
        if files.is_empty() {
            warn!(dir = %aaa_dir.display(), "no JSON files found");
            return Ok(BatchSummary {
                project_name,
                success: true,
                ..Default::default()
            });
        }
        info!(count = files.len(), project = %project_name, "found test case files");

        let csv_path = aaa_dir.join(report_file_name(&project_name));
        let progress = ProgressStore::new(&aaa_dir);
        let mut log = ProjectLogStore::new(project_root, &project_name, self.client.model());
        let ledger = CostLedger::new();
        let candidates: BTreeSet<String> = files.iter().map(|p| file_name(p)).collect();

        let (report, processed) = if self.options.restart {
            info!("restart requested, discarding previous progress");
            if let Err(e) = progress.clear() {
                warn!(error = %format!("{e:#}"), "failed to clear progress");
            }
            if let Err(e) = log.clear_task() {
                warn!(error = %format!("{e:#}"), "failed to clear project log task");
            }
            (CsvReport::create(&csv_path)?, BTreeSet::new())
        } else {
            if let Some(previous) = log.load_previous_cost() {
                ledger.seed(previous.api_calls, previous.usage, previous.cost);
                log.set_baseline(previous);
            }
            let previous = progress.load();
            let processed: BTreeSet<String> = previous
                .processed
                .intersection(&candidates)
                .cloned()
                .collect();
            if !processed.is_empty() && csv_path.exists() {
                info!(done = processed.len(), "resuming previous run");
                (CsvReport::open_append(&csv_path)?, processed)
            } else {
                if !processed.is_empty() {
                    warn!(csv = %csv_path.display(), "report missing, reprocessing every file");
                }
                (CsvReport::create(&csv_path)?, BTreeSet::new())
            }
        };

        let previously_processed = processed.len();
        let remaining: Vec<PathBuf> = files
            .into_iter()
            .filter(|p| !processed.contains(&file_name(p)))
            .collect();

        let cache = if self.options.use_cache {
            let cache = ResultCache::open(&self.options.cache_dir);
            info!(entries = cache.len(), dir = %self.options.cache_dir.display(), "result cache loaded");
            cache
        } else {
            ResultCache::disabled()
        };
        let limiter = RateLimiter::new(self.options.requests_per_minute);
        if let Some(interval) = limiter.interval() {
            debug!(interval_ms = interval.as_millis() as u64, "rate limiting remote calls");
        }
        debug!(
            report = %report.path().display(),
            progress = %progress.path().display(),
            log = %log.path().display(),
            "state files"
        );

        let ctx = Arc::new(BatchContext {
            client: Arc::clone(&self.client),
            effort: self.options.reasoning_effort,
            total: candidates.len(),
            ledger,
            cache,
            limiter,
            report,
            progress,
            log,
            state: Mutex::new(RunState {
                processed,
                ..Default::default()
            }),
            persisted: tokio::sync::Mutex::new(0),
        });

        info!(
            remaining = remaining.len(),
            workers = self.options.max_workers,
            "processing test cases"
        );
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let mut workers = JoinSet::new();
        for path in remaining {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("worker pool closed")?;
            let ctx = Arc::clone(&ctx);
            workers.spawn(async move {
                let _permit = permit;
                ctx.process_file(path).await;
            });
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "worker task aborted");
            }
        }

        let last = ctx.state().snapshot();
        ctx.persist(last, false).await;

        let state = ctx.state();

        Ok(BatchSummary {
            project_name,
            csv_path: Some(csv_path),
            total_files: ctx.total,
            previously_processed,
            processed_this_run: state.processed_this_run,
            failed: state.failed.len(),
            cache_hits: state.cache_hits,
            api_calls: state.api_calls,
            cost: ctx.ledger.summarize(),
            success: state.processed_this_run > 0 || previously_processed > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::{AnalysisFuture, AnalysisResponse};
    use crate::core::models::cost::{CostInfo, TokenUsage};
    use crate::core::project_log::TaskStatus;
    use crate::core::report::read_rows;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Answers every prompt with a well-formed analysis, except prompts
    /// containing one of `fail_on`.
    struct ScriptedClient {
        calls: AtomicUsize,
        fail_on: Vec<String>,
    }

    impl ScriptedClient {
        fn new(fail_on: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail_on: fail_on.iter().map(|s| s.to_string()).collect(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AnalysisClient for ScriptedClient {
        fn model(&self) -> &str {
            "o4-mini"
        }

        fn analyze<'a>(&'a self, prompt: &'a str, _effort: ReasoningEffort) -> AnalysisFuture<'a> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_on.iter().any(|f| prompt.contains(f.as_str())) {
                    return Err(AnalysisError(anyhow::anyhow!("quota exceeded")));
                }
                let usage = TokenUsage {
                    prompt_tokens: 1000,
                    completion_tokens: 200,
                    total_tokens: 1200,
                    cached_tokens: 0,
                };
                Ok(AnalysisResponse {
                    text: format!(
                        "Sure.\n<analysis><focal_method>compute</focal_method>\
                         <issueType>Good AAA</issueType>\
                         <sequence>arrange, act, assert</sequence>\
                         <reasoning>prompt of {} bytes</reasoning></analysis>",
                        prompt.len()
                    ),
                    usage,
                    cost: CostInfo {
                        input_cost: 0.0011,
                        cached_input_cost: 0.0,
                        output_cost: 0.00088,
                        total_cost: 0.00198,
                    },
                })
            })
        }
    }

    /// Answers the first `answer` prompts, then never responds.
    struct Stalling {
        inner: Arc<ScriptedClient>,
        answer: usize,
    }

    impl AnalysisClient for Stalling {
        fn model(&self) -> &str {
            "o4-mini"
        }

        fn analyze<'a>(&'a self, prompt: &'a str, effort: ReasoningEffort) -> AnalysisFuture<'a> {
            if self.inner.calls() >= self.answer {
                return Box::pin(std::future::pending::<Result<AnalysisResponse, AnalysisError>>());
            }
            self.inner.analyze(prompt, effort)
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Restart a batch over `root` and return what the CLI's log filter let through.
    async fn logged_run(root: &Path, verbose: bool) -> String {
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(
                crate::logging::default_directive(verbose),
            ))
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        BatchOrchestrator::new(ScriptedClient::new(&[]), options(&root.join("cache"), false, true))
            .run(root)
            .await
            .unwrap();
        let bytes = log.0.lock().unwrap().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn write_case(root: &Path, file: &str, test_name: &str, source: &str) {
        let dir = root.join(AAA_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        let json = serde_json::json!({
            "projectName": "demo",
            "testClassName": "CalcTest",
            "testCaseName": test_name,
            "testCaseSourceCode": source,
            "parsedStatementsSequence": ["int r = calc.compute(2);"],
            "importedPackages": ["org.junit.Test"],
        });
        std::fs::write(dir.join(file), json.to_string()).unwrap();
    }

    fn write_cases(root: &Path, count: usize) {
        for i in 0..count {
            write_case(
                root,
                &format!("case{i}.json"),
                &format!("test{i}"),
                &format!("@Test void test{i}() {{ assertEquals({i}, calc.compute({i})); }}"),
            );
        }
    }

    fn options(cache_dir: &Path, use_cache: bool, restart: bool) -> BatchOptions {
        BatchOptions {
            reasoning_effort: ReasoningEffort::Medium,
            max_workers: 3,
            use_cache,
            cache_dir: cache_dir.to_path_buf(),
            requests_per_minute: 0,
            restart,
        }
    }

    fn csv_path(root: &Path) -> PathBuf {
        root.join(AAA_DIR).join("demo AAAResults.csv")
    }

    fn sorted_rows(root: &Path) -> Vec<Vec<String>> {
        let mut rows = read_rows(&csv_path(root)).unwrap();
        rows.sort();
        rows
    }

    #[tokio::test]
    async fn processes_files_and_records_failures() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_case(root, "a.json", "testA", "@Test void testA() { assertTrue(true); }");
        write_case(root, "b.json", "testB", "@Test void testB() { assertFalse(false); }");
        write_case(root, "c.json", "testC", "   ");

        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), options(&root.join("cache"), false, false))
            .run(root)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.processed_this_run, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.api_calls, 2);
        assert_eq!(client.calls(), 2);
        assert_eq!(summary.cost.total_calls, 2);

        let rows = sorted_rows(root);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], "demo");
        assert_eq!(rows[0][2], "testA");
        assert_eq!(rows[0][3], "Good AAA");
        assert_eq!(rows[1][2], "testB");

        let progress = ProgressStore::new(&root.join(AAA_DIR)).load();
        assert_eq!(progress.processed.len(), 2);
        assert!(progress.failed.contains("c.json"));

        let entry = ProjectLogStore::new(root, "demo", "o4-mini").task_entry().unwrap();
        assert_eq!(entry.processed_test_cases, 2);
        assert_eq!(entry.failed_test_cases, 1);
        assert_eq!(entry.total_test_cases, 3);
        assert_eq!(entry.api_calls, 2);
        assert_eq!(entry.status, TaskStatus::CompletedWithErrors);
    }

    #[tokio::test]
    async fn malformed_json_is_recorded_as_failed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 2);
        std::fs::write(root.join(AAA_DIR).join("broken.json"), "{ broken").unwrap();

        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), options(&root.join("cache"), false, false))
            .run(root)
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.project_name, "demo");
        assert_eq!(summary.total_files, 3);
        assert_eq!(summary.processed_this_run, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(client.calls(), 2);
        assert_eq!(read_rows(&csv_path(root)).unwrap().len(), 2);

        let progress = ProgressStore::new(&root.join(AAA_DIR)).load();
        assert!(progress.failed.contains("broken.json"));
        assert!(!progress.processed.contains("broken.json"));

        let entry = ProjectLogStore::new(root, "demo", "o4-mini").task_entry().unwrap();
        assert_eq!(entry.processed_test_cases, 2);
        assert_eq!(entry.failed_test_cases, 1);
    }

    #[tokio::test]
    async fn per_file_failures_are_logged_only_when_verbose() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_case(root, "a.json", "testA", "@Test void testA() { assertTrue(true); }");
        write_case(root, "b.json", "testB", "");
        std::fs::write(root.join(AAA_DIR).join("c.json"), "{ broken").unwrap();

        let quiet = logged_run(root, false).await;
        assert!(!quiet.contains("failed to analyze"), "quiet run logged: {quiet}");
        assert!(!quiet.contains("b.json"));

        let verbose = logged_run(root, true).await;
        assert!(verbose.contains("failed to analyze"));
        assert!(verbose.contains("c.json"));
    }

    #[tokio::test]
    async fn interrupted_run_resumes_from_last_snapshot() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 7);
        let mut opts = options(&root.join("cache"), true, false);
        opts.max_workers = 1;

        let stalling = Arc::new(Stalling {
            inner: ScriptedClient::new(&[]),
            answer: 4,
        });
        let cut_off = tokio::time::timeout(
            Duration::from_secs(2),
            BatchOrchestrator::new(stalling, opts.clone()).run(root),
        )
        .await;
        assert!(cut_off.is_err(), "run should still be waiting on the stalled call");

        // Four files finished; the snapshot after the third is the newest on disk.
        let progress = ProgressStore::new(&root.join(AAA_DIR)).load();
        assert_eq!(progress.processed.len(), 3);
        assert_eq!(read_rows(&csv_path(root)).unwrap().len(), 4);
        let entry = ProjectLogStore::new(root, "demo", "o4-mini").task_entry().unwrap();
        assert_eq!(entry.status, TaskStatus::InProgress);

        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), opts)
            .run(root)
            .await
            .unwrap();
        assert_eq!(summary.previously_processed, 3);
        assert_eq!(summary.processed_this_run, 4);
        assert_eq!(summary.cache_hits, 1);
        assert_eq!(client.calls(), 3);

        let rows = sorted_rows(root);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows.iter().filter(|r| r[2] == "test3").count(), 1);
        let progress = ProgressStore::new(&root.join(AAA_DIR)).load();
        assert_eq!(progress.processed.len(), 7);
    }

    #[tokio::test]
    async fn resume_only_processes_remaining_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 5);
        let cache = root.join("cache");

        let flaky = ScriptedClient::new(&["test3()", "test4()"]);
        let first = BatchOrchestrator::new(flaky, options(&cache, false, false))
            .run(root)
            .await
            .unwrap();
        assert_eq!(first.processed_this_run, 3);
        assert_eq!(first.failed, 2);
        assert_eq!(read_rows(&csv_path(root)).unwrap().len(), 3);

        let client = ScriptedClient::new(&[]);
        let second = BatchOrchestrator::new(client.clone(), options(&cache, false, false))
            .run(root)
            .await
            .unwrap();
        assert_eq!(client.calls(), 2);
        assert_eq!(second.previously_processed, 3);
        assert_eq!(second.processed_this_run, 2);
        assert_eq!(second.failed, 0);
        assert_eq!(read_rows(&csv_path(root)).unwrap().len(), 5);

        let progress = ProgressStore::new(&root.join(AAA_DIR)).load();
        assert_eq!(progress.processed.len(), 5);
        assert!(progress.failed.is_empty());

        // Five successful calls over both sessions, two failed ones never billed.
        let entry = ProjectLogStore::new(root, "demo", "o4-mini").task_entry().unwrap();
        assert_eq!(entry.api_calls, 5);
        assert_eq!(entry.token_usage.total_tokens, 6000);
        assert_eq!(entry.status, TaskStatus::Completed);
        assert_eq!(second.cost.total_calls, 5);
    }

    #[tokio::test]
    async fn restart_rewrites_report_from_scratch() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 4);
        let cache = root.join("cache");

        BatchOrchestrator::new(ScriptedClient::new(&[]), options(&cache, false, false))
            .run(root)
            .await
            .unwrap();

        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), options(&cache, false, true))
            .run(root)
            .await
            .unwrap();
        assert_eq!(client.calls(), 4);
        assert_eq!(summary.previously_processed, 0);
        assert_eq!(summary.processed_this_run, 4);
        assert_eq!(read_rows(&csv_path(root)).unwrap().len(), 4);

        let entry = ProjectLogStore::new(root, "demo", "o4-mini").task_entry().unwrap();
        assert_eq!(entry.api_calls, 4);
    }

    #[tokio::test]
    async fn cached_rerun_skips_remote_calls() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 4);
        let cache = root.join("cache");

        let first_client = ScriptedClient::new(&[]);
        BatchOrchestrator::new(first_client.clone(), options(&cache, true, false))
            .run(root)
            .await
            .unwrap();
        assert_eq!(first_client.calls(), 4);
        let first_rows = sorted_rows(root);

        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), options(&cache, true, true))
            .run(root)
            .await
            .unwrap();
        assert_eq!(client.calls(), 0);
        assert_eq!(summary.cache_hits, 4);
        assert_eq!(summary.api_calls, 0);
        assert_eq!(summary.cost.total_calls, 0);
        assert_eq!(sorted_rows(root), first_rows);
    }

    #[tokio::test]
    async fn progress_without_report_reprocesses_everything() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 3);
        let cache = root.join("cache");

        BatchOrchestrator::new(ScriptedClient::new(&[]), options(&cache, false, false))
            .run(root)
            .await
            .unwrap();
        std::fs::remove_file(csv_path(root)).unwrap();

        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), options(&cache, false, false))
            .run(root)
            .await
            .unwrap();
        assert_eq!(client.calls(), 3);
        assert_eq!(summary.previously_processed, 0);
        assert_eq!(read_rows(&csv_path(root)).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn all_failures_is_unsuccessful() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 2);

        let client = ScriptedClient::new(&["@Test"]);
        let summary = BatchOrchestrator::new(client, options(&root.join("cache"), false, false))
            .run(root)
            .await
            .unwrap();
        assert!(!summary.success);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.processed_this_run, 0);
        assert!(read_rows(&csv_path(root)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unparseable_response_marks_file_failed() {
        struct Chatty;
        impl AnalysisClient for Chatty {
            fn model(&self) -> &str {
                "o4-mini"
            }
            fn analyze<'a>(&'a self, _prompt: &'a str, _effort: ReasoningEffort) -> AnalysisFuture<'a> {
                Box::pin(async {
                    Ok(AnalysisResponse {
                        text: "I could not decide.".to_string(),
                        usage: TokenUsage::default(),
                        cost: CostInfo::default(),
                    })
                })
            }
        }

        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_cases(root, 1);
        let summary = BatchOrchestrator::new(Arc::new(Chatty), options(&root.join("cache"), false, false))
            .run(root)
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.api_calls, 1);
        assert!(!summary.success);
    }

    #[tokio::test]
    async fn missing_aaa_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = BatchOrchestrator::new(ScriptedClient::new(&[]), options(dir.path(), false, false))
            .run(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::MissingDirectory(_))));
    }

    #[tokio::test]
    async fn aaa_file_instead_of_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(AAA_DIR), "not a dir").unwrap();
        let err = BatchOrchestrator::new(ScriptedClient::new(&[]), options(dir.path(), false, false))
            .run(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<ScanError>(), Some(ScanError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn empty_directory_succeeds_without_report() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(AAA_DIR)).unwrap();
        let client = ScriptedClient::new(&[]);
        let summary = BatchOrchestrator::new(client.clone(), options(dir.path(), false, false))
            .run(dir.path())
            .await
            .unwrap();
        assert!(summary.success);
        assert!(summary.csv_path.is_none());
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn discovery_skips_hidden_and_non_json_files() {
        let dir = TempDir::new().unwrap();
        let aaa = dir.path().join(AAA_DIR);
        std::fs::create_dir_all(aaa.join("nested.json")).unwrap();
        for name in ["b.json", "a.json", ".hidden.json", PROGRESS_FILE, "notes.txt", "demo AAAResults.csv"] {
            std::fs::write(aaa.join(name), "{}").unwrap();
        }
        let names: Vec<String> = discover_inputs(&aaa).unwrap().iter().map(|p| file_name(p)).collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }
}
