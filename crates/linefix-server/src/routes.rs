use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use linefix_adapters::runner::{run_snippet, MAX_SNIPPET_CHARS};
use linefix_core::{apply_to_text, edits_from_value, CrosscheckReport};
use linefix_engine::{
    analyze_snippet, crosscheck, fix_from_crosscheck, vision_fix, FixOutcome, ImageInput,
    VisionRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::state::AppState;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_FILENAME: &str = "snippet.py";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lenient integer: JSON numbers (truncated) or numeric strings.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Requested model, or the server default when missing or blank. Timeout is
/// a whole number of seconds, 60 when missing or unparseable, at least 1.
pub fn clamp_model_timeout(
    model: Option<&str>,
    timeout: Option<&Value>,
    default_model: &str,
) -> (String, Duration) {
    let model = model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(default_model)
        .to_string();
    let secs = timeout
        .and_then(as_int)
        .unwrap_or(DEFAULT_TIMEOUT_SECS as i64)
        .max(1);
    (model, Duration::from_secs(secs as u64))
}

fn fix_response(outcome: FixOutcome) -> Json<Value> {
    Json(json!({
        "ok": true,
        "edits": outcome.proposal,
        "code": outcome.code,
    }))
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/apply", post(apply))
        .route("/api/run", post(run))
        .route("/api/crosscheck", post(crosscheck_handler))
        .route("/api/fix_from_crosscheck", post(fix_from_crosscheck_handler))
        .route("/api/vision_analyze", post(vision_analyze))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Analyze / apply
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct AnalyzeBody {
    #[serde(default)]
    code: String,
    filename: Option<String>,
    model: Option<String>,
    timeout: Option<Value>,
}

pub(crate) async fn analyze(
    State(state): State<AppState>,
    body: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let (model, timeout) = clamp_model_timeout(
        body.model.as_deref(),
        body.timeout.as_ref(),
        &state.inner.default_model,
    );
    let llm = state.require_llm()?;
    let filename = body
        .filename
        .as_deref()
        .filter(|f| !f.trim().is_empty())
        .unwrap_or(DEFAULT_FILENAME);

    let result = analyze_snippet(llm, &body.code, filename, &model, timeout).await?;
    Ok(Json(json!({ "ok": true, "result": result })))
}

#[derive(Deserialize)]
pub(crate) struct ApplyBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    edits: Option<Value>,
}

pub(crate) async fn apply(body: Result<Json<ApplyBody>, JsonRejection>) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let edits = match body.edits {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => {
            edits_from_value(&value).map_err(|e| AppError::BadRequest(e.to_string()))?
        }
    };

    let result = apply_to_text(&body.code, &edits);
    Ok(Json(json!({
        "ok": true,
        "code": result.content(),
        "applied": result.applied,
        "skipped": result.skipped_lines(),
    })))
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct RunBody {
    #[serde(default)]
    code: String,
    timeout: Option<Value>,
}

pub(crate) async fn run(
    State(state): State<AppState>,
    body: Result<Json<RunBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    if body.code.chars().count() > MAX_SNIPPET_CHARS {
        return Err(AppError::PayloadTooLarge("Code too large.".into()));
    }
    // Only a positive timeout bounds the run.
    let timeout_secs = body.timeout.as_ref().and_then(as_int).filter(|t| *t > 0);
    let timeout = timeout_secs.map(|t| Duration::from_secs(t as u64));

    let python = state.inner.python.clone();
    let code = body.code;
    let run = tokio::task::spawn_blocking(move || run_snippet(&python, &code, timeout))
        .await
        .map_err(|e| AppError::Internal(format!("Runner task failed: {}", e)))??;

    if run.timed_out {
        return Err(AppError::Timeout(format!(
            "Execution timed out after {}s",
            timeout_secs.unwrap_or_default()
        )));
    }

    Ok(Json(json!({
        "ok": true,
        "exitCode": run.exit_code,
        "stdout": run.stdout,
        "stderr": run.stderr,
    })))
}

// ---------------------------------------------------------------------------
// Cross-check
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub(crate) struct CrosscheckBody {
    #[serde(default)]
    code: String,
    model: Option<String>,
    timeout: Option<Value>,
}

#[derive(Serialize)]
struct CrosscheckResponse {
    ok: bool,
    #[serde(flatten)]
    report: CrosscheckReport,
}

pub(crate) async fn crosscheck_handler(
    State(state): State<AppState>,
    body: Result<Json<CrosscheckBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let (model, timeout) = clamp_model_timeout(
        body.model.as_deref(),
        body.timeout.as_ref(),
        &state.inner.default_model,
    );
    let llm = state.require_llm()?;

    let report = crosscheck(llm, &body.code, &model, timeout).await?;
    let response = serde_json::to_value(CrosscheckResponse { ok: true, report })
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(Json(response))
}

#[derive(Deserialize)]
pub(crate) struct FixFromCrosscheckBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    crosscheck: Option<Value>,
    model: Option<String>,
    timeout: Option<Value>,
}

pub(crate) async fn fix_from_crosscheck_handler(
    State(state): State<AppState>,
    body: Result<Json<FixFromCrosscheckBody>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = body?;
    let (model, timeout) = clamp_model_timeout(
        body.model.as_deref(),
        body.timeout.as_ref(),
        &state.inner.default_model,
    );
    let llm = state.require_llm()?;
    let report = body.crosscheck.unwrap_or_else(|| json!({}));

    let outcome = fix_from_crosscheck(llm, &body.code, &report, &model, timeout).await?;
    Ok(fix_response(outcome))
}

// ---------------------------------------------------------------------------
// Vision
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VisionBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    prompt: String,
    image_base64: Option<String>,
    image_url: Option<String>,
    model: Option<String>,
    timeout: Option<Value>,
}

impl VisionBody {
    fn image(&self) -> Option<ImageInput> {
        let non_empty = |s: &Option<String>| s.clone().filter(|v| !v.is_empty());
        non_empty(&self.image_base64)
            .map(ImageInput::Base64)
            .or_else(|| non_empty(&self.image_url).map(ImageInput::Url))
    }
}

/// Text fields plus an optional `image` file, which is base64-encoded.
async fn read_vision_form(mut multipart: Multipart) -> Result<VisionBody, AppError> {
    let mut body = VisionBody::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let bytes = field.bytes().await?;
            if !bytes.is_empty() {
                body.image_base64 = Some(STANDARD.encode(&bytes));
            }
            continue;
        }
        let text = field.text().await?;
        match name.as_str() {
            "code" => body.code = text,
            "prompt" => body.prompt = text,
            "model" => body.model = Some(text),
            "timeout" => body.timeout = Some(Value::String(text)),
            _ => {}
        }
    }
    Ok(body)
}

pub(crate) async fn vision_analyze(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Value>, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let body = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;
        read_vision_form(multipart).await?
    } else {
        let Json(body) = Json::<VisionBody>::from_request(request, &state).await?;
        body
    };

    let (model, timeout) = clamp_model_timeout(
        body.model.as_deref(),
        body.timeout.as_ref(),
        &state.inner.default_model,
    );
    let llm = state.require_llm()?;

    let image = body.image();
    let vision = VisionRequest {
        code: body.code,
        prompt: body.prompt,
        image,
        model,
        timeout,
    };
    let outcome = vision_fix(llm, &vision).await?;
    Ok(fix_response(outcome))
}

#[cfg(test)]
mod tests;
