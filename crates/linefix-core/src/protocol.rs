//! Wire shapes exchanged with the model and with HTTP clients.

use crate::edit::{edits_from_value, Edit, EditRecordError};
use crate::util::truncate_chars;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Edit proposal as returned by the model:
/// `{ "file": ..., "explanation": ..., "edits": [{ "line": n, "new": "..." }] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditProposal {
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub edits: Vec<Edit>,
}

impl EditProposal {
    /// Build a proposal from parsed model JSON.
    ///
    /// A missing or non-array `edits` field means "no edits". Records inside
    /// a present array must all be well-formed.
    pub fn from_value(value: &Value) -> Result<Self, EditRecordError> {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let edits = match value.get("edits") {
            Some(edits @ Value::Array(_)) => edits_from_value(edits)?,
            _ => Vec::new(),
        };
        Ok(Self {
            file: text("file"),
            explanation: text("explanation"),
            edits,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

pub const MAX_SUMMARY_CHARS: usize = 5000;
pub const MAX_REPORTED_TESTS: usize = 20;
pub const MAX_TEST_NAME_CHARS: usize = 200;
pub const MAX_TEST_FIELD_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Pass,
    Fail,
    Mixed,
}

impl Verdict {
    /// Anything other than pass/fail collapses to `Mixed`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pass" => Verdict::Pass,
            "fail" => Verdict::Fail,
            _ => Verdict::Mixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Fail => "fail",
            Verdict::Mixed => "mixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
}

impl TestStatus {
    /// Unknown statuses count as failures.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("pass") {
            TestStatus::Pass
        } else {
            TestStatus::Fail
        }
    }
}

/// One test the reviewer model designed and judged by static reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredTest {
    pub name: String,
    pub description: String,
    pub status: TestStatus,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub pass: usize,
    pub fail: usize,
}

/// Sanitised cross-check verdict. Built only from the fields below, so
/// nothing else the model says (code, stack traces) reaches the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrosscheckReport {
    pub overall: Verdict,
    pub summary: String,
    pub tests: Vec<InferredTest>,
    pub counts: Counts,
}

/// Render a JSON scalar the way a reader expects to see it in a report.
fn field_text(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl CrosscheckReport {
    pub fn from_model_value(value: &Value) -> Self {
        let overall = Verdict::parse(&field_text(value.get("overall"), "mixed"));
        let summary = truncate_chars(&field_text(value.get("summary"), ""), MAX_SUMMARY_CHARS);

        let tests: Vec<InferredTest> = value
            .get("tests")
            .and_then(Value::as_array)
            .map(|tests| {
                tests
                    .iter()
                    .take(MAX_REPORTED_TESTS)
                    .filter(|t| t.is_object())
                    .map(|t| InferredTest {
                        name: truncate_chars(
                            &field_text(t.get("name"), "Unnamed test"),
                            MAX_TEST_NAME_CHARS,
                        ),
                        description: truncate_chars(
                            &field_text(t.get("description"), ""),
                            MAX_TEST_FIELD_CHARS,
                        ),
                        status: TestStatus::parse(&field_text(t.get("status"), "fail")),
                        reason: truncate_chars(
                            &field_text(t.get("reason"), ""),
                            MAX_TEST_FIELD_CHARS,
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let pass = tests
            .iter()
            .filter(|t| t.status == TestStatus::Pass)
            .count();
        let counts = Counts {
            pass,
            fail: tests.len() - pass,
        };

        Self {
            overall,
            summary,
            tests,
            counts,
        }
    }
}
