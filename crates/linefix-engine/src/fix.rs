//! Ask a model for line edits and apply them to a snippet or file.

use crate::llm::prompts;
use crate::llm::{complete_with_fallback, extract_json, CompletionModel, CompletionRequest, LlmResponse, Part};
use linefix_core::{apply_to_text, AppliedResult, EditProposal};
use serde_json::Value;
use std::time::Duration;

/// Result of running a model proposal through the applier.
#[derive(Debug, Clone)]
pub struct FixOutcome {
    /// The model's JSON exactly as parsed.
    pub proposal: Value,
    /// Updated code, or the input unchanged when there was nothing to apply.
    pub code: String,
    /// `None` when the proposal carried no edits.
    pub result: Option<AppliedResult>,
}

impl FixOutcome {
    pub fn applied(&self) -> usize {
        self.result.as_ref().map_or(0, |r| r.applied)
    }
}

/// Validate the `edits` in a parsed proposal and apply them to `code`.
pub fn apply_proposal(code: &str, proposal: Value) -> anyhow::Result<FixOutcome> {
    let edits = EditProposal::from_value(&proposal)?;
    if edits.is_empty() {
        return Ok(FixOutcome {
            proposal,
            code: code.to_string(),
            result: None,
        });
    }

    let result = apply_to_text(code, &edits.edits);
    let skipped = result.skipped();
    if skipped > 0 {
        tracing::info!(
            applied = result.applied,
            skipped,
            "some edits were out of range"
        );
    }
    Ok(FixOutcome {
        proposal,
        code: result.content(),
        result: Some(result),
    })
}

/// Ask `model` for edits to a snippet and return the parsed JSON.
pub async fn analyze_snippet(
    llm: &dyn CompletionModel,
    code: &str,
    filename: &str,
    model: &str,
    timeout: Duration,
) -> anyhow::Result<Value> {
    let prompt = prompts::server_fix_prompt(filename, code);
    let response = llm
        .complete(CompletionRequest::text(model, prompt, timeout))
        .await?;
    extract_json(&response.content)
}

/// Ask each model in `models` in turn for edits to a whole file. The raw
/// response is returned so the caller can show it when parsing fails.
pub async fn request_file_fix(
    llm: &dyn CompletionModel,
    models: &[String],
    path: &str,
    content: &str,
    timeout: Duration,
) -> anyhow::Result<LlmResponse> {
    let prompt = prompts::cli_fix_prompt(path, content);
    complete_with_fallback(llm, models, vec![Part::text(prompt)], timeout, true).await
}
