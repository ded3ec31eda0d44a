use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// One piece of a (possibly multimodal) prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    /// Base64-encoded image bytes.
    InlineImage { mime_type: String, data: String },
    /// Image referenced by URL rather than uploaded.
    ImageUrl(String),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn png(data: impl Into<String>) -> Self {
        Part::InlineImage {
            mime_type: "image/png".to_string(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub parts: Vec<Part>,
    /// Upper bound for the whole call, retries included.
    pub timeout: Duration,
    /// Use the server-sent-events endpoint and concatenate chunks.
    pub stream: bool,
}

impl CompletionRequest {
    pub fn text(model: impl Into<String>, prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            parts: vec![Part::text(prompt)],
            timeout,
            stream: true,
        }
    }

    pub fn multimodal(model: impl Into<String>, parts: Vec<Part>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            parts,
            timeout,
            stream: false,
        }
    }
}

/// Token accounting reported by the Generative Language API (`usageMetadata`).
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
    #[serde(default)]
    pub total_token_count: u32,
}

/// Merge two optional `Usage` values, summing their token counts.
pub(crate) fn merge_usage(primary: Option<Usage>, secondary: Option<Usage>) -> Option<Usage> {
    match (primary, secondary) {
        (Some(p), Some(s)) => Some(Usage {
            prompt_token_count: p.prompt_token_count + s.prompt_token_count,
            candidates_token_count: p.candidates_token_count + s.candidates_token_count,
            total_token_count: p.total_token_count + s.total_token_count,
        }),
        (Some(p), None) => Some(p),
        (None, Some(s)) => Some(s),
        (None, None) => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<Usage>,
    /// Model that actually answered (relevant after a fallback).
    pub model: String,
}

/// Anything that turns a prompt into text. Implemented by the HTTP client and
/// by scripted fakes in tests.
pub trait CompletionModel: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<LlmResponse>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_reads_gemini_field_names() {
        let usage: Usage = serde_json::from_str(
            r#"{"promptTokenCount": 12, "candidatesTokenCount": 30, "totalTokenCount": 42}"#,
        )
        .unwrap();
        assert_eq!(usage.total_token_count, 42);
        assert_eq!(usage.candidates_token_count, 30);
    }

    #[test]
    fn merge_usage_sums_counts() {
        let a = Usage {
            prompt_token_count: 1,
            candidates_token_count: 2,
            total_token_count: 3,
        };
        let merged = merge_usage(Some(a.clone()), Some(a.clone())).unwrap();
        assert_eq!(merged.total_token_count, 6);
        assert_eq!(merge_usage(None, Some(a.clone())), Some(a));
        assert_eq!(merge_usage(None, None), None);
    }
}
