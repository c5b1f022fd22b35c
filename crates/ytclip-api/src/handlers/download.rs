//! Artifact download and explicit teardown.

use std::path::PathBuf;

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures_util::stream;
use scopeguard::ScopeGuard;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use ytclip_media::{delete_explicit, open_artifact, MediaError, Teardown};
use ytclip_models::OUTPUT_FILE_NAME;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

const CHUNK_SIZE: usize = 64 * 1024;

/// Download query parameters.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub file: Option<String>,
    #[serde(rename = "workDir", alias = "work_dir")]
    pub work_dir: Option<String>,
    pub cleanup: Option<String>,
}

impl DownloadQuery {
    fn file(&self) -> Option<&str> {
        self.file.as_deref().filter(|s| !s.is_empty())
    }

    fn work_dir(&self) -> Option<&str> {
        self.work_dir.as_deref().filter(|s| !s.is_empty())
    }

    fn wants_cleanup(&self) -> bool {
        matches!(self.cleanup.as_deref(), Some("1" | "true"))
    }
}

/// Stream a rendered artifact.
///
/// With `cleanup=1` the artifact and its workspace are removed once the
/// transfer ends, fails, or is abandoned by the client.
pub async fn download_artifact(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let file = query
        .file()
        .ok_or_else(|| ApiError::bad_request("Missing file parameter"))?;

    let workspaces = state.pipeline.workspaces();
    let (path, owner) = workspaces.resolve_artifact(file)?;

    if let Some(work_dir) = query.work_dir() {
        if workspaces.resolve_workspace(work_dir)? != owner {
            return Err(ApiError::bad_request("workDir does not contain file"));
        }
    }

    let artifact = open_artifact(&path).await?;
    let cleanup = query.wants_cleanup();
    metrics::record_download(cleanup);
    info!(
        file = %artifact.path.display(),
        bytes = artifact.len,
        cleanup,
        "Streaming artifact"
    );

    let teardown = cleanup.then(|| Teardown::new(workspaces.clone(), path, Some(owner)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", OUTPUT_FILE_NAME),
        )
        .header(header::CONTENT_LENGTH, artifact.len)
        .header(header::CACHE_CONTROL, "no-store")
        .body(artifact_body(artifact.file, artifact.len, teardown))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}

/// Remove an artifact and its workspace. Always acknowledges once both
/// parameters are present.
pub async fn delete_artifact(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<StatusCode> {
    let (Some(file), Some(work_dir)) = (query.file(), query.work_dir()) else {
        return Err(ApiError::bad_request("Missing file or workDir parameters"));
    };

    let workspaces = state.pipeline.workspaces();
    let file = contained(workspaces.resolve_artifact(file).map(|(path, _)| path));
    let work_dir = contained(workspaces.resolve_workspace(work_dir));

    if let Some(file) = &file {
        delete_explicit(workspaces, file, work_dir.as_deref()).await;
    } else if let Some(work_dir) = &work_dir {
        workspaces.release(work_dir).await;
    }
    info!("Manual cleanup completed");

    Ok(StatusCode::NO_CONTENT)
}

fn contained(resolved: Result<PathBuf, MediaError>) -> Option<PathBuf> {
    match resolved {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Skipping cleanup: {}", e);
            None
        }
    }
}

/// Teardown still owed by a body, with the bytes not yet sent.
struct PendingTeardown {
    teardown: Teardown,
    remaining: u64,
}

type CleanupGuard = ScopeGuard<PendingTeardown, fn(PendingTeardown)>;

fn on_drop(pending: PendingTeardown) {
    pending
        .teardown
        .finalize_in_background(drop_reason(pending.remaining));
}

/// A body with a known length can be dropped right after its last byte
/// without being polled to EOF.
fn drop_reason(remaining: u64) -> &'static str {
    if remaining == 0 {
        "end"
    } else {
        "abandoned"
    }
}

async fn finish(guard: Option<CleanupGuard>, reason: &str) {
    if let Some(guard) = guard {
        ScopeGuard::into_inner(guard).teardown.finalize(reason).await;
    }
}

/// Chunked file body. Teardown runs at end of stream or on a read error;
/// dropping the body early runs it in the background instead.
fn artifact_body(file: File, len: u64, teardown: Option<Teardown>) -> Body {
    let guard: Option<CleanupGuard> = teardown.map(|teardown| {
        let pending = PendingTeardown {
            teardown,
            remaining: len,
        };
        scopeguard::guard(pending, on_drop as fn(PendingTeardown))
    });

    let chunks = stream::unfold(Some((file, guard)), |state| async move {
        let (mut file, mut guard) = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => {
                finish(guard, "end").await;
                None
            }
            Ok(n) => {
                if let Some(pending) = guard.as_mut() {
                    pending.remaining = pending.remaining.saturating_sub(n as u64);
                }
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), Some((file, guard))))
            }
            Err(e) => {
                warn!("Artifact read failed: {}", e);
                finish(guard, "error").await;
                Some((Err(e), None))
            }
        }
    });

    Body::from_stream(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use tempfile::TempDir;
    use ytclip_media::WorkspaceManager;

    #[test]
    fn test_drop_reason() {
        assert_eq!(drop_reason(0), "end");
        assert_eq!(drop_reason(1), "abandoned");
    }

    #[tokio::test]
    async fn test_dropped_body_still_cleans_up() {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager.allocate().unwrap();
        let path = ws.join(OUTPUT_FILE_NAME);
        std::fs::write(&path, b"mp4 bytes").unwrap();

        let artifact = open_artifact(&path).await.unwrap();
        let teardown = Teardown::new(manager, path.clone(), Some(ws.path().to_path_buf()));
        let observer = teardown.clone();

        let mut chunks =
            artifact_body(artifact.file, artifact.len, Some(teardown)).into_data_stream();
        let first = chunks.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"mp4 bytes");
        drop(chunks);

        for _ in 0..100 {
            if observer.is_finalized() && !ws.path().exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(observer.is_finalized());
        assert!(!path.exists());
        assert!(!ws.path().exists());
    }
}
