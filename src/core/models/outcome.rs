use serde::{Deserialize, Serialize};

use crate::core::models::record::TestCaseRecord;

pub const UNKNOWN: &str = "Unknown";

/// Structured verdict extracted from one analysis response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub focal_method: String,
    #[serde(rename = "issueType")]
    pub issue_type: String,
    pub sequence: String,
    pub reasoning: String,
}

impl Default for AnalysisOutcome {
    fn default() -> Self {
        Self {
            focal_method: UNKNOWN.to_string(),
            issue_type: UNKNOWN.to_string(),
            sequence: UNKNOWN.to_string(),
            reasoning: UNKNOWN.to_string(),
        }
    }
}

impl AnalysisOutcome {
    /// True when every field is still the "Unknown" placeholder.
    pub fn is_all_unknown(&self) -> bool {
        [
            &self.focal_method,
            &self.issue_type,
            &self.sequence,
            &self.reasoning,
        ]
        .iter()
        .all(|v| v.as_str() == UNKNOWN)
    }
}

pub const CSV_HEADER: [&str; 7] = [
    "project",
    "class_name",
    "test_case_name",
    "issue_type",
    "sequence",
    "focal_method",
    "reasoning",
];

/// One line of the CSV report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvReportRow {
    pub project: String,
    pub class_name: String,
    pub test_case_name: String,
    pub issue_type: String,
    pub sequence: String,
    pub focal_method: String,
    pub reasoning: String,
}

/// Collapse CR/LF sequences into single spaces and trim, so a value never
/// spans more than one CSV line.
pub fn clean_field(value: &str) -> String {
    value
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

impl CsvReportRow {
    pub fn new(record: &TestCaseRecord, outcome: &AnalysisOutcome) -> Self {
        Self {
            project: clean_field(&record.project_name),
            class_name: clean_field(&record.test_class_name),
            test_case_name: clean_field(&record.test_case_name),
            issue_type: clean_field(&outcome.issue_type),
            sequence: clean_field(&outcome.sequence),
            focal_method: clean_field(&outcome.focal_method),
            reasoning: clean_field(&outcome.reasoning),
        }
    }

    pub fn fields(&self) -> [&str; 7] {
        [
            self.project.as_str(),
            self.class_name.as_str(),
            self.test_case_name.as_str(),
            self.issue_type.as_str(),
            self.sequence.as_str(),
            self.focal_method.as_str(),
            self.reasoning.as_str(),
        ]
    }
}
