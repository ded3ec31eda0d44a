use crate::chunk::Chunk;
use crate::llm::models::merge_usage;
use crate::llm::prompts::summary_prompt;
use crate::llm::{CompletionModel, CompletionRequest, Part, Usage};
use chrono::{DateTime, Utc};
use linefix_adapters::fs::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Number of concurrent summary requests.
const SUMMARY_CONCURRENCY: usize = 4;

const REDACTED: &str = "[REDACTED]";

/// One entry of the summary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub source: String,
    pub summary: String,
    pub original_code: String,
    pub summarized_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct SummaryRun {
    pub records: Vec<SummaryRecord>,
    /// Sources of chunks whose model call failed.
    pub failed: Vec<String>,
    pub usage: Option<Usage>,
}

/// Replace every occurrence of `secret` with a marker.
pub fn redact(text: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => text.replace(secret, REDACTED),
        _ => text.to_string(),
    }
}

/// Summarise each chunk. Failed chunks are logged and left out; record order
/// follows chunk order.
pub async fn summarize_chunks(
    llm: &dyn CompletionModel,
    chunks: &[Chunk],
    model: &str,
    timeout: Duration,
    secret: Option<&str>,
) -> SummaryRun {
    let mut run = SummaryRun::default();

    for (group_index, group) in chunks.chunks(SUMMARY_CONCURRENCY).enumerate() {
        let futures: Vec<_> = group
            .iter()
            .map(|chunk| {
                let request = CompletionRequest {
                    model: model.to_string(),
                    parts: vec![Part::text(summary_prompt(&chunk.content))],
                    timeout,
                    stream: false,
                };
                async move { (chunk, llm.complete(request).await) }
            })
            .collect();

        for (chunk, result) in futures::future::join_all(futures).await {
            let source = chunk.source.display().to_string();
            match result {
                Ok(response) => {
                    run.usage = merge_usage(run.usage.take(), response.usage);
                    run.records.push(SummaryRecord {
                        source,
                        summary: redact(response.content.trim(), secret),
                        original_code: redact(&chunk.content, secret),
                        summarized_at: Utc::now(),
                    });
                }
                Err(err) => {
                    tracing::warn!(source = %source, "error processing chunk: {:#}", err);
                    run.failed.push(source);
                }
            }
        }

        tracing::info!(
            done = group_index * SUMMARY_CONCURRENCY + group.len(),
            total = chunks.len(),
            "summarizing code"
        );
    }

    run
}

pub fn write_index(path: &Path, records: &[SummaryRecord]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    write_atomic(path, &json)
}
