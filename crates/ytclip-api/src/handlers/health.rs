//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use ytclip_media::check_tool;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub ytdlp: CheckStatus,
    pub ffmpeg: CheckStatus,
    pub workspace_root: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CheckStatus {
    fn ok(path: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            path: Some(path.into()),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            path: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

fn tool_check(program: &str) -> CheckStatus {
    match check_tool(program) {
        Ok(path) => CheckStatus::ok(path.to_string_lossy()),
        Err(e) => CheckStatus::error(e.to_string()),
    }
}

/// Readiness check endpoint (readiness probe).
/// Both tools must resolve on `PATH` and the workspace root must exist.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let config = state.pipeline.config();
    let ytdlp = tool_check(&config.ytdlp_program);
    let ffmpeg = tool_check(&config.ffmpeg_program);

    let root = state.pipeline.workspaces().root();
    let workspace_root = if root.is_dir() {
        CheckStatus::ok(root.to_string_lossy())
    } else {
        CheckStatus::error(format!("{} is not a directory", root.display()))
    };

    let all_ok = ytdlp.is_ok() && ffmpeg.is_ok() && workspace_root.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            ytdlp,
            ffmpeg,
            workspace_root,
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
