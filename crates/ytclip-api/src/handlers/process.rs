//! Clip submission.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use ytclip_models::ClipRequest;

use crate::error::ApiResult;
use crate::state::AppState;

/// Successful clip submission.
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub ok: bool,
    pub job_id: String,
    /// Rendered file; pass back as `file` to /api/download
    pub artifact_path: String,
    /// Owning workspace; pass back as `workDir` to /api/download
    pub workspace_handle: String,
    pub completed_at: DateTime<Utc>,
}

/// Run the clip pipeline to completion and return where the artifact lives.
pub async fn process_clip(
    State(state): State<AppState>,
    payload: Result<Json<ClipRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessResponse>> {
    let Json(request) = payload?;

    let artifact = state.pipeline.submit(&request).await?;

    Ok(Json(ProcessResponse {
        ok: true,
        job_id: artifact.job_id.to_string(),
        artifact_path: artifact.artifact_path.to_string_lossy().into_owned(),
        workspace_handle: artifact.workspace_handle.to_string_lossy().into_owned(),
        completed_at: artifact.completed_at,
    }))
}
