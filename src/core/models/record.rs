use serde::{Deserialize, Serialize};

fn unknown() -> String {
    "Unknown".to_string()
}

/// One extracted unit test, as written by the test-extraction tooling into
/// `<project>/AAA/*.json`. Missing keys fall back to empty values so that a
/// sparse record still loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRecord {
    #[serde(default = "unknown")]
    pub project_name: String,
    #[serde(default = "unknown")]
    pub test_class_name: String,
    #[serde(default = "unknown")]
    pub test_case_name: String,
    #[serde(default)]
    pub test_case_source_code: String,
    #[serde(default)]
    pub parsed_statements_sequence: Vec<String>,
    #[serde(default)]
    pub production_function_implementations: Vec<String>,
    #[serde(default)]
    pub imported_packages: Vec<String>,
    #[serde(default)]
    pub before_methods: Vec<String>,
    #[serde(default)]
    pub before_all_methods: Vec<String>,
    #[serde(default)]
    pub after_methods: Vec<String>,
    #[serde(default)]
    pub after_all_methods: Vec<String>,
}

impl TestCaseRecord {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}
