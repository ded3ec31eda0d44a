//! `linefix fix`: propose edits for one file, preview them, optionally write.

use anyhow::{Context, Result};
use linefix_adapters::fs::write_atomic;
use linefix_adapters::Config;
use linefix_core::{apply_to_text, AppliedResult, EditOutcome, EditProposal};
use linefix_engine::llm::extract_json;
use linefix_engine::{request_file_fix, ClientConfig, CompletionModel, LlmClient};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct FixArgs {
    pub target: PathBuf,
    pub apply: bool,
    pub model: Option<String>,
    pub timeout: Option<u64>,
}

pub async fn run(config: &Config, args: FixArgs) -> Result<()> {
    let client_config = ClientConfig::from_config(config)?;
    if !args.target.exists() {
        anyhow::bail!("Path not found: {}", args.target.display());
    }

    let model = args
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| config.model.clone());
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.timeout_secs).max(1));
    let client = LlmClient::new(ClientConfig {
        model: model.clone(),
        timeout,
        ..client_config
    })?;
    let models = vec![model, config.fallback_model.clone()];

    fix_file(
        &client,
        &models,
        &args.target,
        args.apply,
        timeout,
        &mut std::io::stdout().lock(),
    )
    .await
}

/// Request edits for `path`, print the preview to `out`, and write the file
/// back when `apply` is set.
pub async fn fix_file(
    llm: &dyn CompletionModel,
    models: &[String],
    path: &Path,
    apply: bool,
    timeout: Duration,
    out: &mut dyn Write,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let response = request_file_fix(llm, models, &path.display().to_string(), &content, timeout)
        .await?;
    tracing::info!(model = %response.model, "received proposal");

    let value = match extract_json(&response.content) {
        Ok(value) => value,
        Err(err) => {
            writeln!(out, "Model output not valid JSON. Full response:\n{}", response.content)?;
            return Err(err.context("Failed to parse model output"));
        }
    };
    let proposal = EditProposal::from_value(&value).context("Failed to parse model output")?;
    if proposal.is_empty() {
        writeln!(out, "No edits suggested by the model.")?;
        return Ok(());
    }
    if !proposal.explanation.trim().is_empty() {
        tracing::info!(explanation = %proposal.explanation.trim(), "model explanation");
    }

    let result = apply_to_text(&content, &proposal.edits);
    for line in render_preview(path, &result) {
        writeln!(out, "{}", line)?;
    }

    if !apply {
        writeln!(out, "\nDry run: no changes written. Use --apply to write edits.")?;
        return Ok(());
    }

    write_atomic(path, &result.content())?;
    writeln!(out, "\nApplied {} edit(s) to {}.", result.applied, path.display())?;
    if result.skipped() > 0 {
        writeln!(out, "Skipped {} out-of-range edit(s).", result.skipped())?;
    }
    Ok(())
}

/// Human-readable preview: one OLD/NEW pair per applied edit and one notice
/// per out-of-range edit, in application order.
pub fn render_preview(path: &Path, result: &AppliedResult) -> Vec<String> {
    let mut lines = vec![format!("Proposed changes for {}:", path.display())];
    for outcome in &result.outcomes {
        match outcome {
            EditOutcome::Applied {
                line,
                old,
                replacement,
                ..
            } => {
                lines.push(format!("  L{}: OLD: {}", line, old));
                let first = replacement.first().map(String::as_str).unwrap_or_default();
                if replacement.len() > 1 {
                    lines.push(format!(
                        "       NEW: {} ... ({} lines)",
                        first,
                        replacement.len()
                    ));
                } else {
                    lines.push(format!("       NEW: {}", first));
                }
            }
            EditOutcome::Skipped { line, .. } => {
                lines.push(format!("  - Skipping out-of-range line {}", line));
            }
        }
    }
    lines
}
