use super::models::{CompletionModel, CompletionRequest, LlmResponse, Part, Usage};
use anyhow::Context;
use futures::StreamExt;
use linefix_adapters::Config;
use linefix_core::util::truncate_str;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Generative Language REST endpoint.
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "api key",
        "secret",
        "password",
        "credential",
        "bearer",
        "aiza", // Google API key prefix
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

/// Rate limit retry configuration
pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const INITIAL_BACKOFF_MS: u64 = 2000; // 2 seconds
pub(crate) const BACKOFF_MULTIPLIER: u64 = 2; // Exponential backoff

/// Extract a retry-after hint from an error body (if present)
fn parse_retry_after(text: &str) -> Option<u64> {
    // Look for patterns like "retry after X seconds" or "retry in 12s"
    let text_lower = text.to_lowercase();
    if let Some(pos) = text_lower.find("retry") {
        let after_retry = &text_lower[pos..];
        for word in after_retry.split_whitespace().skip(1).take(5) {
            let digits: String = word.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(secs) = digits.parse::<u64>() {
                if secs > 0 && secs < 300 {
                    return Some(secs);
                }
            }
        }
    }
    None
}

pub(crate) fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let ms = INITIAL_BACKOFF_MS.saturating_mul(factor);
    let secs = ms / 1000;
    if secs == 0 {
        1
    } else {
        secs
    }
}

pub(crate) fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Everything the HTTP client needs, resolved up front by the caller.
#[derive(Clone)]
pub struct ClientConfig {
    pub api_key: String,
    /// Default model when a request doesn't name one.
    pub model: String,
    pub timeout: Duration,
    pub base_url: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"[redacted]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            timeout,
            base_url: API_BASE.to_string(),
        }
    }

    /// Build from loaded settings. Fails when no API key is configured.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            anyhow::anyhow!("GOOGLE_API_KEY is not set. Export it before running.")
        })?;
        Ok(Self::new(
            api_key,
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        ))
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        if stream {
            format!("{}/models/{}:streamGenerateContent?alt=sse", base, model)
        } else {
            format!("{}/models/{}:generateContent", base, model)
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text { text: &'a str },
    Inline { inline_data: Blob<'a> },
    File { file_data: FileRef<'a> },
}

#[derive(Serialize)]
struct Blob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct FileRef<'a> {
    mime_type: &'static str,
    file_uri: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn from_parts(parts: &'a [Part]) -> Self {
        let parts = parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => WirePart::Text { text },
                Part::InlineImage { mime_type, data } => WirePart::Inline {
                    inline_data: Blob { mime_type, data },
                },
                Part::ImageUrl(url) => WirePart::File {
                    file_data: FileRef {
                        mime_type: "image/png",
                        file_uri: url,
                    },
                },
            })
            .collect();
        Self {
            contents: vec![Content {
                role: "user",
                parts,
            }],
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<Usage>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

impl GenerateResponse {
    /// Text of the first candidate, parts concatenated.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn block_reason(&self) -> Option<&str> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
    }
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => {
            sanitize_api_response(&envelope.error.message)
        }
        _ => sanitize_api_response(body),
    }
}

// ---------------------------------------------------------------------------
// Server-sent events
// ---------------------------------------------------------------------------

/// Incremental decoder for `data:` lines of an SSE body. Bytes may arrive
/// split anywhere, including inside a UTF-8 sequence.
#[derive(Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed a chunk and return the payloads of every completed `data:` line.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Whatever is left once the stream ends without a final newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(payload.to_string())
}

/// Fold one SSE payload into the running text. Gemini reports cumulative
/// usage, so the latest value wins.
fn absorb_stream_payload(
    payload: &str,
    text: &mut String,
    usage: &mut Option<Usage>,
) -> anyhow::Result<()> {
    // Every field of a chunk is optional, so check for an error object first.
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(payload) {
        anyhow::bail!(
            "Model stream error: {}",
            sanitize_api_response(&envelope.error.message)
        );
    }
    match serde_json::from_str::<GenerateResponse>(payload) {
        Ok(chunk) => {
            if let Some(reason) = chunk.block_reason() {
                anyhow::bail!("Response blocked by the model ({})", reason);
            }
            text.push_str(&chunk.text());
            if chunk.usage_metadata.is_some() {
                *usage = chunk.usage_metadata;
            }
            Ok(())
        }
        Err(err) => {
            tracing::debug!("skipping unparseable stream chunk: {}", err);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Create a configured HTTP client
pub(crate) fn create_http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))
}

/// Send a request with automatic retry on:
/// - Network errors (timeout, connection failures)
/// - Rate limits (429)
/// - Server errors (5xx)
///
/// Returns the successful response with its body still unread, so the caller
/// can either buffer it or stream it.
pub(crate) async fn send_with_retry<T: Serialize>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    model: &str,
    timeout: Duration,
    request_body: &T,
) -> anyhow::Result<reqwest::Response> {
    let mut retry_count = 0;

    loop {
        let response = match client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .timeout(timeout)
            .json(request_body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                    retry_count += 1;
                    let retry_after = backoff_secs(retry_count);
                    tracing::warn!(model, retry_count, "network error, retrying in {}s: {}", retry_after, err);
                    tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    continue;
                }
                if err.is_timeout() {
                    return Err(anyhow::anyhow!(
                        "Request timed out after {}s",
                        timeout.as_secs()
                    ));
                }
                return Err(anyhow::anyhow!("Request failed: {}", err.without_url()));
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();

        // Rate limit - retry with backoff
        if status.as_u16() == 429 && retry_count < MAX_RETRIES {
            retry_count += 1;
            let retry_after = parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
            tracing::warn!(model, retry_count, "rate limited, retrying in {}s", retry_after);
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            continue;
        }

        // Server errors - retry with backoff
        if status.is_server_error() && retry_count < MAX_RETRIES {
            retry_count += 1;
            let retry_after = backoff_secs(retry_count);
            tracing::warn!(model, retry_count, %status, "server error, retrying in {}s", retry_after);
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            continue;
        }

        // Non-retryable error or max retries exceeded
        let error_msg = match status.as_u16() {
            401 | 403 => format!(
                "API key rejected ({}). Check GOOGLE_API_KEY.",
                status
            ),
            404 => format!("Model '{}' was not found or does not support generateContent.", model),
            429 => format!(
                "Rate limited after {} retries. Try again in a few minutes.",
                retry_count
            ),
            500..=599 => format!(
                "Model server error ({}). The service may be temporarily unavailable.",
                status
            ),
            _ => format!("API error {}: {}", status, api_error_message(&text)),
        };
        return Err(anyhow::anyhow!("{}", error_msg));
    }
}

/// Gemini REST client. Cheap to share behind an `Arc`.
pub struct LlmClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl LlmClient {
    pub fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let http = create_http_client(config.timeout)?;
        Ok(Self { http, config })
    }

    async fn generate(&self, request: &CompletionRequest) -> anyhow::Result<LlmResponse> {
        let model = if request.model.trim().is_empty() {
            self.config.model.as_str()
        } else {
            request.model.as_str()
        };
        let url = self.config.endpoint(model, request.stream);
        let body = GenerateRequest::from_parts(&request.parts);

        tracing::info!(model, stream = request.stream, "calling model");
        let response = send_with_retry(
            &self.http,
            &url,
            &self.config.api_key,
            model,
            request.timeout,
            &body,
        )
        .await?;

        let (content, usage) = if request.stream {
            read_event_stream(response).await?
        } else {
            let text = response
                .text()
                .await
                .context("Failed to read model response")?;
            let parsed: GenerateResponse = serde_json::from_str(&text).map_err(|e| {
                anyhow::anyhow!(
                    "Unexpected model response: {}\nContent: {}",
                    e,
                    sanitize_api_response(&text)
                )
            })?;
            if let Some(reason) = parsed.block_reason() {
                anyhow::bail!("Response blocked by the model ({})", reason);
            }
            (parsed.text(), parsed.usage_metadata)
        };

        if let Some(usage) = &usage {
            tracing::debug!(
                model,
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "model usage"
            );
        }

        Ok(LlmResponse {
            content,
            usage,
            model: model.to_string(),
        })
    }
}

async fn read_event_stream(
    response: reqwest::Response,
) -> anyhow::Result<(String, Option<Usage>)> {
    let mut decoder = SseDecoder::default();
    let mut text = String::new();
    let mut usage = None;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Model stream interrupted")?;
        for payload in decoder.push(&chunk) {
            absorb_stream_payload(&payload, &mut text, &mut usage)?;
        }
    }
    if let Some(payload) = decoder.finish() {
        absorb_stream_payload(&payload, &mut text, &mut usage)?;
    }
    Ok((text, usage))
}

impl CompletionModel for LlmClient {
    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<LlmResponse>> + Send + 'a>> {
        Box::pin(async move {
            let limit = request.timeout;
            tokio::time::timeout(limit, self.generate(&request))
                .await
                .map_err(|_| anyhow::anyhow!("Model call timed out after {}s", limit.as_secs()))?
        })
    }
}

/// Try each model in turn; the first success wins.
pub async fn complete_with_fallback(
    llm: &dyn CompletionModel,
    models: &[String],
    parts: Vec<Part>,
    timeout: Duration,
    stream: bool,
) -> anyhow::Result<LlmResponse> {
    let mut last_err: Option<anyhow::Error> = None;
    let mut tried: Vec<&str> = Vec::new();

    for model in models {
        if model.trim().is_empty() || tried.contains(&model.as_str()) {
            continue;
        }
        tried.push(model);
        let request = CompletionRequest {
            model: model.clone(),
            parts: parts.clone(),
            timeout,
            stream,
        };
        match llm.complete(request).await {
            Ok(response) => return Ok(response),
            Err(err) => {
                tracing::warn!(model = %model, "model failed: {:#}", err);
                last_err = Some(err);
            }
        }
    }

    match last_err {
        Some(err) => Err(anyhow::anyhow!("All model attempts failed: {:#}", err)),
        None => Err(anyhow::anyhow!("No model configured")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_secs(1), 2);
        assert_eq!(backoff_secs(2), 4);
        assert_eq!(backoff_secs(3), 8);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("Please retry after 12 seconds"), Some(12));
        assert_eq!(parse_retry_after("Please retry in 7s."), Some(7));
        assert_eq!(parse_retry_after("retry later"), None);
        assert_eq!(parse_retry_after("retry after 900 seconds"), None);
    }

    #[test]
    fn test_sanitize_redacts_keys() {
        assert_eq!(
            sanitize_api_response("API key not valid. Please pass a valid API key."),
            "(response details redacted - may contain sensitive data)"
        );
        assert_eq!(sanitize_api_response("model overloaded"), "model overloaded");
        assert_eq!(sanitize_api_response(&"x".repeat(500)).len(), 200);
    }

    #[test]
    fn test_request_body_shape() {
        let parts = vec![
            Part::text("fix this"),
            Part::png("aGVsbG8="),
            Part::ImageUrl("https://example.com/ui.png".into()),
        ];
        let body = serde_json::to_value(GenerateRequest::from_parts(&parts)).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        {"text": "fix this"},
                        {"inline_data": {"mime_type": "image/png", "data": "aGVsbG8="}},
                        {"file_data": {"mime_type": "image/png", "file_uri": "https://example.com/ui.png"}}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_response_text_joins_parts() {
        let parsed: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"edits\""}, {"text": ": []}"}]}}],
            "usageMetadata": {"totalTokenCount": 9}
        }))
        .unwrap();
        assert_eq!(parsed.text(), "{\"edits\": []}");
        assert_eq!(parsed.usage_metadata.unwrap().total_token_count, 9);
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let parsed: GenerateResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert_eq!(parsed.text(), "");
        assert_eq!(parsed.block_reason(), Some("SAFETY"));
    }

    #[test]
    fn test_api_error_message_prefers_message_field() {
        let body = r#"{"error": {"code": 400, "message": "Invalid argument: contents", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "Invalid argument: contents");
        assert_eq!(api_error_message("plain failure"), "plain failure");
    }

    #[test]
    fn test_sse_decoder_handles_split_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        assert_eq!(decoder.push(b": 1}\r\n\r\ndata: {\"b\": 2}\n"), vec![
            "{\"a\": 1}".to_string(),
            "{\"b\": 2}".to_string()
        ]);
        // UTF-8 sequence split across chunks.
        let snowman = "data: \"☃\"\n".as_bytes();
        assert!(decoder.push(&snowman[..8]).is_empty());
        assert_eq!(decoder.push(&snowman[8..]), vec!["\"☃\"".to_string()]);
        assert!(decoder.push(b": keep-alive\n").is_empty());
        decoder.push(b"data: tail");
        assert_eq!(decoder.finish(), Some("tail".to_string()));
    }

    #[test]
    fn test_stream_payloads_accumulate() {
        let mut text = String::new();
        let mut usage = None;
        for payload in [
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}],"usageMetadata":{"totalTokenCount":3}}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"lo"}]}}],"usageMetadata":{"totalTokenCount":5}}"#,
            "not json",
        ] {
            absorb_stream_payload(payload, &mut text, &mut usage).unwrap();
        }
        assert_eq!(text, "Hello");
        assert_eq!(usage.unwrap().total_token_count, 5);

        let err = absorb_stream_payload(
            r#"{"error":{"code":500,"message":"backend exploded"}}"#,
            &mut text,
            &mut None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("backend exploded"));
    }

    #[test]
    fn test_endpoints() {
        let config = ClientConfig::new("k", "gemini-2.5-pro", Duration::from_secs(5));
        assert_eq!(
            config.endpoint("gemini-2.5-flash", false),
            format!("{}/models/gemini-2.5-flash:generateContent", API_BASE)
        );
        assert!(config
            .endpoint("gemini-2.5-flash", true)
            .ends_with(":streamGenerateContent?alt=sse"));
        assert!(!format!("{:?}", config).contains("\"k\""));
    }

    #[test]
    fn test_client_config_requires_key() {
        let err = ClientConfig::from_config(&Config::default()).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    /// Fails for every model listed in `failing`, answers otherwise.
    struct Scripted {
        failing: Vec<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl CompletionModel for Scripted {
        fn complete<'a>(
            &'a self,
            request: CompletionRequest,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<LlmResponse>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(request.model.clone());
                if self.failing.contains(&request.model.as_str()) {
                    anyhow::bail!("{} unavailable", request.model);
                }
                Ok(LlmResponse {
                    content: "{}".into(),
                    usage: None,
                    model: request.model,
                })
            })
        }
    }

    #[tokio::test]
    async fn test_fallback_uses_second_model() {
        let llm = Scripted {
            failing: vec!["primary"],
            calls: Mutex::new(Vec::new()),
        };
        let models = vec!["primary".to_string(), "backup".to_string()];
        let response =
            complete_with_fallback(&llm, &models, vec![Part::text("p")], Duration::from_secs(1), true)
                .await
                .unwrap();
        assert_eq!(response.model, "backup");
        assert_eq!(*llm.calls.lock().unwrap(), vec!["primary", "backup"]);
    }

    #[tokio::test]
    async fn test_fallback_reports_last_error_and_skips_duplicates() {
        let llm = Scripted {
            failing: vec!["same"],
            calls: Mutex::new(Vec::new()),
        };
        let models = vec!["same".to_string(), "same".to_string()];
        let err =
            complete_with_fallback(&llm, &models, vec![Part::text("p")], Duration::from_secs(1), true)
                .await
                .unwrap_err();
        assert!(err.to_string().starts_with("All model attempts failed"));
        assert!(err.to_string().contains("same unavailable"));
        assert_eq!(llm.calls.lock().unwrap().len(), 1);
    }
}
