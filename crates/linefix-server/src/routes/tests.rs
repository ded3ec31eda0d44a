use super::*;
use crate::state::AppInner;
use axum::body::Body;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use linefix_engine::llm::{CompletionModel, CompletionRequest, LlmResponse, Part};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Answers every request with the same text and remembers what it was asked.
struct Canned {
    reply: &'static str,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl Canned {
    fn new(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn last_request(&self) -> CompletionRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

impl CompletionModel for Canned {
    fn complete<'a>(
        &'a self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<LlmResponse>> + Send + 'a>> {
        Box::pin(async move {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            Ok(LlmResponse {
                content: self.reply.to_string(),
                usage: None,
                model,
            })
        })
    }
}

fn state_with(llm: Option<Arc<Canned>>) -> AppState {
    AppState::new(AppInner {
        llm: llm.map(|l| l as Arc<dyn CompletionModel>),
        default_model: "gemini-2.5-pro".into(),
        python: PathBuf::from("sh"),
        static_dir: PathBuf::from("static"),
    })
}

fn body<T: serde::de::DeserializeOwned>(value: Value) -> Result<Json<T>, JsonRejection> {
    Ok(Json(serde_json::from_value(value).unwrap()))
}

async fn error_parts(err: AppError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

const EDIT_REPLY: &str =
    r#"{"file": "snippet.py", "explanation": "blue", "edits": [{"line": 1, "new": "color = 'blue'"}]}"#;

#[test]
fn clamp_defaults_and_floors() {
    let (model, timeout) = clamp_model_timeout(None, None, "gemini-2.5-pro");
    assert_eq!(model, "gemini-2.5-pro");
    assert_eq!(timeout, Duration::from_secs(60));

    let (model, timeout) = clamp_model_timeout(Some("  "), Some(&json!(0)), "d");
    assert_eq!(model, "d");
    assert_eq!(timeout, Duration::from_secs(1));

    let (model, timeout) = clamp_model_timeout(Some("gemini-2.5-flash"), Some(&json!("15")), "d");
    assert_eq!(model, "gemini-2.5-flash");
    assert_eq!(timeout, Duration::from_secs(15));

    let (_, timeout) = clamp_model_timeout(None, Some(&json!("soon")), "d");
    assert_eq!(timeout, Duration::from_secs(60));
    let (_, timeout) = clamp_model_timeout(None, Some(&json!(2.9)), "d");
    assert_eq!(timeout, Duration::from_secs(2));
}

#[tokio::test]
async fn analyze_requires_api_key() {
    let err = analyze(State(state_with(None)), body(json!({"code": "x = 1"})))
        .await
        .unwrap_err();
    let (status, payload) = error_parts(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        payload,
        json!({"ok": false, "error": "GOOGLE_API_KEY is not set on the server"})
    );
}

#[tokio::test]
async fn analyze_returns_parsed_edits() {
    let llm = Canned::new(EDIT_REPLY);
    let Json(response) = analyze(
        State(state_with(Some(llm.clone()))),
        body(json!({"code": "color = 'red'\n", "timeout": 30})),
    )
    .await
    .unwrap();
    assert_eq!(response["ok"], true);
    assert_eq!(response["result"]["explanation"], "blue");

    let request = llm.last_request();
    assert_eq!(request.model, "gemini-2.5-pro");
    assert_eq!(request.timeout, Duration::from_secs(30));
}

#[tokio::test]
async fn apply_reports_applied_and_skipped() {
    let Json(response) = apply(body(json!({
        "code": "a\nb\nc\n",
        "edits": [{"line": 2, "new": "B1\nB2"}, {"line": 9, "new": "x"}]
    })))
    .await
    .unwrap();
    assert_eq!(
        response,
        json!({"ok": true, "code": "a\nB1\nB2\nc\n", "applied": 1, "skipped": [9]})
    );
}

#[tokio::test]
async fn apply_without_edits_normalises_trailing_newline() {
    let Json(response) = apply(body(json!({"code": "a\nb"}))).await.unwrap();
    assert_eq!(response["code"], "a\nb\n");
    assert_eq!(response["applied"], 0);
}

#[tokio::test]
async fn apply_rejects_malformed_records() {
    let err = apply(body(json!({"code": "a\n", "edits": [{"line": 1}]})))
        .await
        .unwrap_err();
    let (status, payload) = error_parts(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["ok"], false);
    assert!(payload["error"].as_str().unwrap().contains("new"));
}

#[tokio::test]
async fn run_rejects_oversized_code() {
    let code = "x".repeat(MAX_SNIPPET_CHARS + 1);
    let err = run(State(state_with(None)), body(json!({"code": code})))
        .await
        .unwrap_err();
    let (status, payload) = error_parts(err).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(payload["error"], "Code too large.");
}

#[cfg(unix)]
#[tokio::test]
async fn run_executes_snippet() {
    let Json(response) = run(
        State(state_with(None)),
        body(json!({"code": "echo hello\necho oops >&2\nexit 4\n", "timeout": 10})),
    )
    .await
    .unwrap();
    assert_eq!(
        response,
        json!({"ok": true, "exitCode": 4, "stdout": "hello\n", "stderr": "oops\n"})
    );
}

#[cfg(unix)]
#[tokio::test]
async fn run_times_out_with_408() {
    let err = run(
        State(state_with(None)),
        body(json!({"code": "exec sleep 5\n", "timeout": 1})),
    )
    .await
    .unwrap_err();
    let (status, payload) = error_parts(err).await;
    assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    assert_eq!(payload["error"], "Execution timed out after 1s");
}

#[cfg(unix)]
#[tokio::test]
async fn run_with_huge_timeout_still_executes() {
    let Json(response) = run(
        State(state_with(None)),
        body(json!({"code": "echo hi\n", "timeout": "9223372036854775807"})),
    )
    .await
    .unwrap();
    assert_eq!(
        response,
        json!({"ok": true, "exitCode": 0, "stdout": "hi\n", "stderr": ""})
    );
}

#[tokio::test]
async fn crosscheck_returns_flat_sanitised_report() {
    let llm = Canned::new(
        r#"{"overall": "weird", "summary": "ok", "tests": [{"name": "t1", "status": "pass"}, {"name": "t2", "status": "nope"}]}"#,
    );
    let Json(response) = crosscheck_handler(
        State(state_with(Some(llm))),
        body(json!({"code": "x = 1", "model": "gemini-2.5-flash"})),
    )
    .await
    .unwrap();
    assert_eq!(response["ok"], true);
    assert_eq!(response["overall"], "mixed");
    assert_eq!(response["counts"], json!({"pass": 1, "fail": 1}));
    assert_eq!(response["tests"][1]["status"], "fail");
}

#[tokio::test]
async fn fix_from_crosscheck_returns_updated_code() {
    let llm = Canned::new(EDIT_REPLY);
    let Json(response) = fix_from_crosscheck_handler(
        State(state_with(Some(llm.clone()))),
        body(json!({
            "code": "color = 'red'\n",
            "crosscheck": {"overall": "fail", "tests": [{"name": "is blue", "status": "fail"}]}
        })),
    )
    .await
    .unwrap();
    assert_eq!(response["code"], "color = 'blue'\n");
    assert_eq!(response["edits"]["explanation"], "blue");

    let Part::Text(prompt) = &llm.last_request().parts[0] else {
        panic!("expected text prompt");
    };
    assert!(prompt.contains("- is blue | fail |  | reason: "));
}

#[tokio::test]
async fn fix_from_crosscheck_without_edits_keeps_code() {
    let llm = Canned::new(r#"{"explanation": "nothing to do", "edits": []}"#);
    let Json(response) = fix_from_crosscheck_handler(
        State(state_with(Some(llm))),
        body(json!({"code": "x = 1"})),
    )
    .await
    .unwrap();
    assert_eq!(response["code"], "x = 1");
}

#[tokio::test]
async fn vision_accepts_json_with_image_url() {
    let llm = Canned::new(EDIT_REPLY);
    let request = Request::builder()
        .method("POST")
        .uri("/api/vision_analyze")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({
                "code": "color = 'red'\n",
                "prompt": "make it blue",
                "imageUrl": "https://example.com/mock.png",
                "timeout": "20"
            })
            .to_string(),
        ))
        .unwrap();

    let Json(response) = vision_analyze(State(state_with(Some(llm.clone()))), request)
        .await
        .unwrap();
    assert_eq!(response["code"], "color = 'blue'\n");

    let sent = llm.last_request();
    assert!(!sent.stream);
    assert_eq!(sent.timeout, Duration::from_secs(20));
    assert_eq!(sent.parts[1], Part::ImageUrl("https://example.com/mock.png".into()));
}

#[tokio::test]
async fn vision_accepts_multipart_upload() {
    let llm = Canned::new(EDIT_REPLY);
    let form = concat!(
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"code\"\r\n\r\n",
        "color = 'red'\r\n",
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"prompt\"\r\n\r\n",
        "make it blue\r\n",
        "--XBOUNDARY\r\n",
        "Content-Disposition: form-data; name=\"image\"; filename=\"ui.png\"\r\n",
        "Content-Type: image/png\r\n\r\n",
        "PNGDATA\r\n",
        "--XBOUNDARY--\r\n",
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/vision_analyze")
        .header(CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
        .body(Body::from(form))
        .unwrap();

    let Json(response) = vision_analyze(State(state_with(Some(llm.clone()))), request)
        .await
        .unwrap();
    assert_eq!(response["ok"], true);

    let sent = llm.last_request();
    assert_eq!(sent.parts[1], Part::png("UE5HREFUQQ=="));
    let Part::Text(code_part) = &sent.parts[2] else {
        panic!("expected code part");
    };
    assert!(code_part.contains("color = 'red'"));
}

#[tokio::test]
async fn vision_rejects_malformed_json() {
    let request = Request::builder()
        .method("POST")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let err = vision_analyze(State(state_with(None)), request)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}
