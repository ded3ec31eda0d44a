//! Static cross-check: the model designs tests for a snippet and predicts
//! their outcome; a second pass turns failing predictions into edits.

use crate::fix::{apply_proposal, FixOutcome};
use crate::llm::prompts;
use crate::llm::{extract_json, CompletionModel, CompletionRequest};
use linefix_core::protocol::MAX_REPORTED_TESTS;
use linefix_core::util::truncate_chars;
use linefix_core::CrosscheckReport;
use serde_json::{Map, Value};
use std::time::Duration;

/// Cap for a report that had to be stringified wholesale.
const MAX_RAW_REPORT_CHARS: usize = 4000;

pub async fn crosscheck(
    llm: &dyn CompletionModel,
    code: &str,
    model: &str,
    timeout: Duration,
) -> anyhow::Result<CrosscheckReport> {
    let response = llm
        .complete(CompletionRequest::text(
            model,
            prompts::crosscheck_prompt(code),
            timeout,
        ))
        .await?;
    let value = extract_json(&response.content)?;
    let report = CrosscheckReport::from_model_value(&value);
    tracing::info!(
        overall = report.overall.as_str(),
        pass = report.counts.pass,
        fail = report.counts.fail,
        "cross-check finished"
    );
    Ok(report)
}

fn display(value: Option<&Value>, default: &str) -> String {
    match value {
        None | Some(Value::Null) => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn structured_lines(report: &Map<String, Value>) -> Option<Vec<String>> {
    let empty = Map::new();
    let counts = match report.get("counts") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(counts)) => counts,
        Some(_) => return None,
    };
    let tests: &[Value] = match report.get("tests") {
        None | Some(Value::Null) => &[],
        Some(Value::Array(tests)) => tests,
        // A string yields no test objects.
        Some(Value::String(_)) => &[],
        Some(_) => return None,
    };

    let mut lines = vec![
        format!("overall: {}", display(report.get("overall"), "mixed")),
        format!("summary: {}", display(report.get("summary"), "")),
        format!(
            "counts: pass={}, fail={}",
            display(counts.get("pass"), "0"),
            display(counts.get("fail"), "0")
        ),
    ];
    for test in tests.iter().take(MAX_REPORTED_TESTS) {
        let Some(test) = test.as_object() else {
            continue;
        };
        lines.push(format!(
            "- {} | {} | {} | reason: {}",
            display(test.get("name"), ""),
            display(test.get("status"), ""),
            display(test.get("description"), ""),
            display(test.get("reason"), "")
        ));
    }
    Some(lines)
}

/// Flatten a client-supplied cross-check report into prompt lines. Anything
/// that isn't shaped like a report is passed through as (truncated) JSON.
pub fn report_lines(report: &Value) -> Vec<String> {
    report
        .as_object()
        .and_then(structured_lines)
        .unwrap_or_else(|| vec![truncate_chars(&report.to_string(), MAX_RAW_REPORT_CHARS)])
}

pub async fn fix_from_crosscheck(
    llm: &dyn CompletionModel,
    code: &str,
    report: &Value,
    model: &str,
    timeout: Duration,
) -> anyhow::Result<FixOutcome> {
    let prompt = prompts::fix_from_crosscheck_prompt(&report_lines(report), code);
    let response = llm
        .complete(CompletionRequest::text(model, prompt, timeout))
        .await?;
    apply_proposal(code, extract_json(&response.content)?)
}
