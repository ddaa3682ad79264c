use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::models::outcome::{CsvReportRow, CSV_HEADER};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";
const FALLBACK_NAME: &str = "aaa_scan_result.csv";
const MAX_FILENAME_LEN: usize = 255;

const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Make a file name safe on Windows as well as Unix.
pub fn sanitize_filename(name: &str) -> String {
    let stripped: String = name
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let mut filename = stripped.trim_matches(|c| c == ' ' || c == '.').to_string();

    let stem = filename.rsplit_once('.').map(|(s, _)| s).unwrap_or(&filename);
    if RESERVED_NAMES.contains(&stem.to_uppercase().as_str()) {
        filename = format!("_{}", filename);
    }

    if filename.chars().count() > MAX_FILENAME_LEN {
        filename = match filename.rsplit_once('.') {
            Some((stem, ext)) => {
                let keep = MAX_FILENAME_LEN.saturating_sub(ext.chars().count() + 1);
                format!("{}.{}", stem.chars().take(keep).collect::<String>(), ext)
            }
            None => filename.chars().take(MAX_FILENAME_LEN).collect(),
        };
    }

    if filename.is_empty() || filename == "." || filename == ".." {
        return FALLBACK_NAME.to_string();
    }
    filename
}

pub fn report_file_name(project_name: &str) -> String {
    sanitize_filename(&format!("{} AAAResults.csv", project_name))
}

/// Class and test case name, the identity of a row across sessions.
type RowKey = (String, String);

fn row_key(class_name: &str, test_case_name: &str) -> RowKey {
    (class_name.to_string(), test_case_name.to_string())
}

/// Incrementally written CSV report. Each row is flushed as soon as it is
/// written so an interrupted run keeps everything recorded so far.
pub struct CsvReport {
    path: PathBuf,
    writer: Mutex<csv::Writer<File>>,
    /// Rows already present when an existing report was reopened.
    recorded: HashSet<RowKey>,
}

/// Data records of a report, skipping the BOM and header.
fn read_records(path: &Path) -> Result<Vec<csv::StringRecord>> {
    let content = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let body = content.strip_prefix(UTF8_BOM).unwrap_or(&content[..]);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(body);
    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record.with_context(|| format!("Malformed row in {}", path.display()))?);
    }
    Ok(records)
}

impl CsvReport {
    /// Truncate (or create) the report and write the BOM and header.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
        file.write_all(UTF8_BOM)
            .with_context(|| format!("Failed to write CSV file {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(CSV_HEADER)?;
        writer.flush()?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            recorded: HashSet::new(),
        })
    }

    /// Open an existing report for appending rows. Test cases it already
    /// holds are remembered and not written a second time.
    pub fn open_append(path: &Path) -> Result<Self> {
        let existing = read_records(path).unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "could not read existing report rows");
            Vec::new()
        });
        let recorded = existing
            .iter()
            .filter_map(|r| Some(row_key(r.get(1)?, r.get(2)?)))
            .collect();
        let file = OpenOptions::new()
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open CSV file {} for appending", path.display()))?;
        let writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
            recorded,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &CsvReportRow) -> Result<()> {
        if self.recorded.contains(&row_key(&row.class_name, &row.test_case_name)) {
            tracing::debug!(test = %row.test_case_name, "row already in report");
            return Ok(());
        }
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writer
            .write_record(row.fields())
            .with_context(|| format!("Failed to append to {}", self.path.display()))?;
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
pub fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    Ok(read_records(path)?
        .iter()
        .map(|r| r.iter().map(str::to_string).collect())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(name: &str, reasoning: &str) -> CsvReportRow {
        CsvReportRow {
            project: "proj".into(),
            class_name: "FooTest".into(),
            test_case_name: name.into(),
            issue_type: "Good AAA".into(),
            sequence: "<arrange,act,assert>".into(),
            focal_method: "foo".into(),
            reasoning: reasoning.into(),
        }
    }

    #[test]
    fn sanitize_strips_invalid_characters() {
        assert_eq!(sanitize_filename("a/b:c*d?e\"f<g>h|i AAAResults.csv"), "abcdefghi AAAResults.csv");
        assert_eq!(sanitize_filename("  .name.csv. "), "name.csv");
    }

    #[test]
    fn sanitize_prefixes_reserved_names() {
        assert_eq!(sanitize_filename("CON.csv"), "_CON.csv");
        assert_eq!(sanitize_filename("lpt1"), "_lpt1");
        assert_eq!(sanitize_filename("CONSOLE.csv"), "CONSOLE.csv");
    }

    #[test]
    fn sanitize_limits_length_and_keeps_extension() {
        let long = format!("{}.csv", "x".repeat(400));
        let clean = sanitize_filename(&long);
        assert_eq!(clean.len(), 255);
        assert!(clean.ends_with(".csv"));
    }

    #[test]
    fn sanitize_falls_back_when_empty() {
        assert_eq!(sanitize_filename("///"), FALLBACK_NAME);
        assert_eq!(sanitize_filename(".."), FALLBACK_NAME);
    }

    #[test]
    fn report_name_includes_project() {
        assert_eq!(report_file_name("commons-lang"), "commons-lang AAAResults.csv");
    }

    #[test]
    fn create_writes_bom_and_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        CsvReport::create(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(
            text.trim_end(),
            "project,class_name,test_case_name,issue_type,sequence,focal_method,reasoning"
        );
        assert!(read_rows(&path).unwrap().is_empty());
    }

    #[test]
    fn append_keeps_previous_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        let report = CsvReport::create(&path).unwrap();
        report.append(&row("t1", "fine, really")).unwrap();
        drop(report);

        let report = CsvReport::open_append(&path).unwrap();
        report.append(&row("t2", "also fine")).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][2], "t1");
        assert_eq!(rows[0][6], "fine, really");
        assert_eq!(rows[1][2], "t2");
    }

    #[test]
    fn reopened_report_skips_test_cases_it_already_holds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        let report = CsvReport::create(&path).unwrap();
        report.append(&row("t1", "first session")).unwrap();
        drop(report);

        let report = CsvReport::open_append(&path).unwrap();
        report.append(&row("t1", "analysed again")).unwrap();
        report.append(&row("t2", "new")).unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][6], "first session");
        assert_eq!(rows[1][2], "t2");
    }

    #[test]
    fn create_truncates_existing_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.csv");
        let report = CsvReport::create(&path).unwrap();
        report.append(&row("t1", "x")).unwrap();
        drop(report);
        CsvReport::create(&path).unwrap();
        assert!(read_rows(&path).unwrap().is_empty());
    }

    #[test]
    fn open_append_requires_existing_file() {
        let dir = TempDir::new().unwrap();
        assert!(CsvReport::open_append(&dir.path().join("missing.csv")).is_err());
    }
}
