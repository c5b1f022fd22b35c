//! API integration tests.
//!
//! The pipeline runs against a scripted tool runner, so no yt-dlp or FFmpeg
//! install is needed.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use ytclip_api::{create_router, ApiConfig, AppState};
use ytclip_media::{
    ClipPipeline, PipelineConfig, RecordingEventSink, Termination, ToolInvocation, ToolOutput,
    ToolRunner, WorkspaceManager,
};

const FAKE_MEDIA: &[u8] = b"fake mp4 payload";

/// Replays scripted terminations; successful runs write the output file.
#[derive(Default)]
struct FakeTools {
    script: Mutex<VecDeque<(Termination, String)>>,
    calls: Mutex<Vec<ToolInvocation>>,
}

impl FakeTools {
    fn failing_with(termination: Termination, stderr: &str) -> Self {
        let tools = Self::default();
        tools
            .script
            .lock()
            .unwrap()
            .push_back((termination, stderr.to_string()));
        tools
    }

    fn calls(&self) -> Vec<ToolInvocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for FakeTools {
    async fn invoke(&self, invocation: &ToolInvocation) -> ToolOutput {
        self.calls.lock().unwrap().push(invocation.clone());
        let (termination, stderr) = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or((Termination::ExitedWithCode(0), String::new()));

        if termination.is_success() {
            let args = &invocation.args;
            let output = match args.iter().position(|a| a == "-o") {
                Some(pos) => &args[pos + 1],
                None => args.last().unwrap(),
            };
            std::fs::write(output, FAKE_MEDIA).unwrap();
        }

        ToolOutput {
            termination,
            stdout: String::new(),
            stderr,
            elapsed: Duration::from_millis(1),
        }
    }
}

struct TestApp {
    root: TempDir,
    tools: Arc<FakeTools>,
    router: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_tools(FakeTools::default())
    }

    fn with_tools(tools: FakeTools) -> Self {
        let root = TempDir::new().unwrap();
        let tools = Arc::new(tools);
        let config = ApiConfig {
            workspace_root: root.path().to_path_buf(),
            ..Default::default()
        };
        let pipeline = ClipPipeline::new(
            PipelineConfig::default(),
            WorkspaceManager::new(root.path()),
            tools.clone(),
            Arc::new(RecordingEventSink::new()),
        );
        let router = create_router(AppState::with_pipeline(config, pipeline), None);
        Self {
            root,
            tools,
            router,
        }
    }

    fn workspace_count(&self) -> usize {
        std::fs::read_dir(self.root.path()).unwrap().count()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn process(&self, payload: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/process")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap();
        let (status, _, body) = self.send(request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }
}

fn download_uri(params: &[(&str, &str)]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        query.append_pair(key, value);
    }
    format!("/api/download?{}", query.finish())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn clip_payload() -> Value {
    json!({
        "url": "https://example/video",
        "start": 30,
        "end": 40,
        "title": "Hi: there"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = TestApp::new();

    let (status, headers, body) = app.send(get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["cross-origin-resource-policy"], "same-origin");
    assert!(headers.contains_key("x-request-id"));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/healthz")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = app.send(request).await;
    assert_eq!(headers["x-request-id"], "abc-123");
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let app = TestApp::new();
    let (status, _, _) = app.send(get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_process_then_download_with_cleanup() {
    let app = TestApp::new();

    let (status, body) = app.process(clip_payload()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ok"], true);

    let file = body["artifact_path"].as_str().unwrap().to_string();
    let work_dir = body["workspace_handle"].as_str().unwrap().to_string();
    assert!(Path::new(&file).is_file());
    assert!(file.ends_with("output_1080x1920.mp4"));

    let calls = app.tools.calls();
    assert!(calls[0].args.iter().any(|a| a == "*30-40"));
    assert!(calls[1].args.iter().any(|a| a.contains("text='Hi\\: there'")));

    let uri = download_uri(&[
        ("file", file.as_str()),
        ("workDir", work_dir.as_str()),
        ("cleanup", "1"),
    ]);
    let (status, headers, bytes) = app.send(get(&uri)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=output_1080x1920.mp4"
    );
    assert_eq!(headers[header::CONTENT_LENGTH], FAKE_MEDIA.len().to_string().as_str());
    assert_eq!(bytes, FAKE_MEDIA);

    assert!(!Path::new(&file).exists());
    assert!(!Path::new(&work_dir).exists());
    assert_eq!(app.workspace_count(), 0);
}

#[tokio::test]
async fn test_download_without_cleanup_keeps_files() {
    let app = TestApp::new();
    let (_, body) = app.process(clip_payload()).await;
    let file = body["artifact_path"].as_str().unwrap();

    let (status, _, bytes) = app.send(get(&download_uri(&[("file", file)]))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, FAKE_MEDIA);
    assert!(Path::new(file).is_file());
}

#[tokio::test]
async fn test_clock_string_times() {
    let app = TestApp::new();
    let payload = json!({
        "url": "https://example/video",
        "start": "00:30",
        "end": "0:00:40.5",
        "title": "Clock"
    });

    let (status, _) = app.process(payload).await;

    assert_eq!(status, StatusCode::OK);
    assert!(app.tools.calls()[0].args.iter().any(|a| a == "*30-40.5"));
}

#[tokio::test]
async fn test_missing_title_is_rejected_without_workspace() {
    let app = TestApp::new();
    let mut payload = clip_payload();
    payload.as_object_mut().unwrap().remove("title");

    let (status, body) = app.process(payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert_eq!(body["detail"], "Missing required fields: title");
    assert_eq!(app.workspace_count(), 0);
    assert!(app.tools.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_range_is_rejected() {
    let app = TestApp::new();
    let mut payload = clip_payload();
    payload["end"] = json!(30);

    let (status, body) = app.process(payload).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"]
        .as_str()
        .unwrap()
        .starts_with("Invalid time range"));
    assert_eq!(app.workspace_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/process")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, _, body) = app.send(request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn test_retrieval_failure_is_500() {
    let app = TestApp::with_tools(FakeTools::failing_with(
        Termination::ExitedWithCode(1),
        "ERROR: Video unavailable",
    ));

    let (status, body) = app.process(clip_payload()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "retrieval_error");
    assert_eq!(
        body["detail"],
        "yt-dlp download failed (code 1): ERROR: Video unavailable"
    );
}

#[tokio::test]
async fn test_tool_timeout_is_504() {
    let app = TestApp::with_tools(FakeTools::failing_with(
        Termination::TimedOut(Duration::from_secs(900)),
        "",
    ));

    let (status, body) = app.process(clip_payload()).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "timeout_error");
}

#[tokio::test]
async fn test_download_requires_file() {
    let app = TestApp::new();
    let (status, _, _) = app.send(get("/api/download?cleanup=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_rejects_paths_outside_workspace_root() {
    let app = TestApp::new();

    let (status, _, body) = app
        .send(get(&download_uri(&[("file", "/etc/passwd")])))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["code"], "invalid_path");
}

#[tokio::test]
async fn test_download_rejects_mismatched_work_dir() {
    let app = TestApp::new();
    let (_, first) = app.process(clip_payload()).await;
    let (_, second) = app.process(clip_payload()).await;

    let uri = download_uri(&[
        ("file", first["artifact_path"].as_str().unwrap()),
        ("workDir", second["workspace_handle"].as_str().unwrap()),
        ("cleanup", "1"),
    ]);
    let (status, _, _) = app.send(get(&uri)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.workspace_count(), 2);
}

#[tokio::test]
async fn test_download_missing_artifact_is_404() {
    let app = TestApp::new();
    let (_, body) = app.process(clip_payload()).await;
    let file = body["artifact_path"].as_str().unwrap();
    std::fs::remove_file(file).unwrap();

    let (status, _, _) = app.send(get(&download_uri(&[("file", file)]))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_removes_artifact_and_workspace() {
    let app = TestApp::new();
    let (_, body) = app.process(clip_payload()).await;
    let file = body["artifact_path"].as_str().unwrap();
    let work_dir = body["workspace_handle"].as_str().unwrap();
    let uri = download_uri(&[("file", file), ("workDir", work_dir)]);

    let (status, _, _) = app.send(delete(&uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!Path::new(work_dir).exists());

    // second teardown still acknowledges
    let (status, _, _) = app.send(delete(&uri)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_delete_requires_both_parameters() {
    let app = TestApp::new();
    let (status, _, _) = app
        .send(delete(&download_uri(&[("file", "/tmp/x.mp4")])))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_ignores_paths_outside_workspace_root() {
    let app = TestApp::new();
    let outside = TempDir::new().unwrap();
    let victim = outside.path().join("keep.mp4");
    std::fs::write(&victim, b"keep").unwrap();

    let uri = download_uri(&[
        ("file", victim.to_str().unwrap()),
        ("workDir", outside.path().to_str().unwrap()),
    ]);
    let (status, _, _) = app.send(delete(&uri)).await;

    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(victim.is_file());
}
