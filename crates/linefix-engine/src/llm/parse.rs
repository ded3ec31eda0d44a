use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const INVALID_JSON_MESSAGE: &str = "Model did not return valid JSON edits.";

fn fenced_json_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```json\s*(\{.*?\})\s*```").unwrap_or_else(|_| unreachable!())
    })
}

/// Substring from the first `{` to the last `}`.
fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Try to fix common JSON issues from LLM responses
fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Remove trailing commas before ] or }
    fixed = fixed.replace(",]", "]");
    fixed = fixed.replace(",}", "}");
    fixed = fixed.replace(",\n]", "\n]");
    fixed = fixed.replace(",\n}", "\n}");

    // Smart quotes to regular quotes
    fixed = fixed.replace(['\u{201C}', '\u{201D}'], "\"");

    fixed
}

/// Recover the JSON object from a model response.
///
/// Tried in order: the whole text, a fenced ```` ```json ```` block, then the
/// span from the first `{` to the last `}`. A candidate that fails to parse
/// falls through to the next one. As a last resort the brace span is retried
/// after repairing trailing commas and smart quotes.
pub fn extract_json(text: &str) -> anyhow::Result<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Ok(value);
    }

    if let Some(fenced) = fenced_json_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
    {
        if let Ok(value) = serde_json::from_str::<Value>(fenced.as_str()) {
            return Ok(value);
        }
    }

    if let Some(span) = outermost_braces(text) {
        if let Ok(value) = serde_json::from_str::<Value>(span) {
            return Ok(value);
        }
        if let Ok(value) = serde_json::from_str::<Value>(&fix_json_issues(span)) {
            tracing::debug!("recovered model JSON after repairing syntax");
            return Ok(value);
        }
    }

    Err(anyhow::anyhow!(INVALID_JSON_MESSAGE))
}
