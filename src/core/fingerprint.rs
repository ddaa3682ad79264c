use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::core::models::record::TestCaseRecord;

fn strings(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

/// Canonical JSON for the content-bearing fields of a record. The `BTreeMap`
/// keeps keys sorted, so insertion order is irrelevant. Names, class and imports
/// are excluded.
fn canonical_json(record: &TestCaseRecord) -> String {
    let mut map: BTreeMap<&str, Value> = BTreeMap::new();
    map.insert(
        "testCaseSourceCode",
        Value::String(record.test_case_source_code.clone()),
    );
    map.insert(
        "parsedStatementsSequence",
        strings(&record.parsed_statements_sequence),
    );
    map.insert(
        "productionFunctionImplementations",
        strings(&record.production_function_implementations),
    );
    map.insert("beforeMethods", strings(&record.before_methods));
    map.insert("beforeAllMethods", strings(&record.before_all_methods));
    map.insert("afterMethods", strings(&record.after_methods));
    map.insert("afterAllMethods", strings(&record.after_all_methods));
    serde_json::to_string(&map).unwrap_or_default()
}

/// SHA-256 of the record's canonical content, as 64 lowercase hex characters.
pub fn fingerprint(record: &TestCaseRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(record).as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestCaseRecord {
        TestCaseRecord {
            project_name: "proj".into(),
            test_class_name: "FooTest".into(),
            test_case_name: "testFoo".into(),
            test_case_source_code: "@Test void testFoo() { assertEquals(1, foo()); }".into(),
            parsed_statements_sequence: vec!["ASSERT assertEquals".into()],
            production_function_implementations: vec!["int foo() { return 1; }".into()],
            imported_packages: vec!["org.junit.Test".into()],
            before_methods: vec!["void setUp() {}".into()],
            ..Default::default()
        }
    }

    #[test]
    fn digest_is_64_hex_chars() {
        let fp = fingerprint(&sample());
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deterministic() {
        assert_eq!(fingerprint(&sample()), fingerprint(&sample()));
    }

    #[test]
    fn metadata_does_not_affect_digest() {
        let base = sample();
        let mut renamed = sample();
        renamed.project_name = "other".into();
        renamed.test_class_name = "BarTest".into();
        renamed.test_case_name = "testBar".into();
        renamed.imported_packages = vec!["org.junit.jupiter.api.Test".into()];
        assert_eq!(fingerprint(&base), fingerprint(&renamed));
    }

    #[test]
    fn source_change_changes_digest() {
        let mut changed = sample();
        changed.test_case_source_code.push(' ');
        assert_ne!(fingerprint(&sample()), fingerprint(&changed));
    }

    fn mutated(f: impl FnOnce(&mut TestCaseRecord)) -> String {
        let mut r = sample();
        f(&mut r);
        fingerprint(&r)
    }

    #[test]
    fn each_relevant_field_changes_digest() {
        let base = fingerprint(&sample());
        assert_ne!(base, mutated(|r| r.parsed_statements_sequence.push("ACT foo".into())));
        assert_ne!(base, mutated(|r| r.production_function_implementations.clear()));
        assert_ne!(base, mutated(|r| r.before_methods.clear()));
        assert_ne!(base, mutated(|r| r.before_all_methods.push("static void init() {}".into())));
        assert_ne!(base, mutated(|r| r.after_methods.push("void tearDown() {}".into())));
        assert_ne!(base, mutated(|r| r.after_all_methods.push("static void done() {}".into())));
    }

    #[test]
    fn moving_a_fixture_between_categories_changes_digest() {
        let mut a = sample();
        a.before_methods = vec!["void init() {}".into()];
        let mut b = sample();
        b.before_methods.clear();
        b.before_all_methods = vec!["void init() {}".into()];
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn canonical_keys_are_sorted() {
        let json = canonical_json(&sample());
        let after_all = json.find("afterAllMethods").unwrap();
        let source = json.find("testCaseSourceCode").unwrap();
        assert!(after_all < source);
    }
}
