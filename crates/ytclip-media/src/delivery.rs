//! Artifact delivery and post-delivery teardown.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::fs::File;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::workspace::WorkspaceManager;

/// An opened artifact ready to stream.
#[derive(Debug)]
pub struct ArtifactFile {
    pub file: File,
    pub len: u64,
    pub path: PathBuf,
}

/// Open an artifact for reading.
///
/// A missing or unreadable path, or one that is not a regular file, is
/// reported as [`MediaError::ArtifactNotFound`].
pub async fn open_artifact(path: &Path) -> MediaResult<ArtifactFile> {
    let file = File::open(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            MediaError::artifact_not_found(path, Some(e))
        }
        _ => MediaError::Io(e),
    })?;

    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(MediaError::artifact_not_found(path, None));
    }

    Ok(ArtifactFile {
        file,
        len: metadata.len(),
        path: path.to_path_buf(),
    })
}

/// Removes a delivered artifact and its workspace exactly once.
///
/// Clones share the once-guard, so a transfer that both finishes and
/// disconnects only tears down once.
#[derive(Debug, Clone)]
pub struct Teardown {
    inner: Arc<TeardownInner>,
}

#[derive(Debug)]
struct TeardownInner {
    manager: WorkspaceManager,
    artifact: PathBuf,
    workspace: Option<PathBuf>,
    done: AtomicBool,
}

impl Teardown {
    pub fn new(manager: WorkspaceManager, artifact: PathBuf, workspace: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(TeardownInner {
                manager,
                artifact,
                workspace,
                done: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.done.load(Ordering::SeqCst)
    }

    /// Delete the artifact, then the workspace. Returns `false` when an
    /// earlier call already ran.
    pub async fn finalize(&self, reason: &str) -> bool {
        if self.inner.done.swap(true, Ordering::SeqCst) {
            debug!(reason, "Teardown already ran");
            return false;
        }

        let inner = &self.inner;
        inner.manager.release_file(&inner.artifact).await;
        if let Some(workspace) = &inner.workspace {
            inner.manager.release(workspace).await;
        }
        info!(
            artifact = %inner.artifact.display(),
            reason,
            "Cleaned up delivered artifact"
        );
        true
    }

    /// Run [`finalize`](Teardown::finalize) on the current runtime without
    /// waiting. Used when the transfer is dropped mid-stream.
    pub fn finalize_in_background(self, reason: &'static str) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    self.finalize(reason).await;
                });
            }
            Err(_) => {
                warn!(
                    artifact = %self.inner.artifact.display(),
                    "No runtime available for artifact cleanup"
                );
            }
        }
    }
}

/// Explicit deletion request: remove the file and, when given, its workspace.
/// Missing paths are not an error.
pub async fn delete_explicit(manager: &WorkspaceManager, file: &Path, workspace: Option<&Path>) {
    manager.release_file(file).await;
    if let Some(workspace) = workspace {
        manager.release(workspace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, WorkspaceManager, PathBuf, PathBuf) {
        let root = TempDir::new().unwrap();
        let manager = WorkspaceManager::new(root.path());
        let ws = manager.allocate().unwrap();
        let artifact = ws.join("output_1080x1920.mp4");
        std::fs::write(&artifact, b"mp4 bytes").unwrap();
        let ws_path = ws.path().to_path_buf();
        (root, manager, artifact, ws_path)
    }

    #[tokio::test]
    async fn test_open_artifact() {
        let (_root, _manager, artifact, _ws) = setup();
        let opened = open_artifact(&artifact).await.unwrap();
        assert_eq!(opened.len, 9);
        assert_eq!(opened.path, artifact);
    }

    #[tokio::test]
    async fn test_open_missing_artifact() {
        let (_root, _manager, artifact, ws) = setup();
        std::fs::remove_file(&artifact).unwrap();

        let err = open_artifact(&artifact).await.unwrap_err();
        assert!(matches!(err, MediaError::ArtifactNotFound { .. }));

        let err = open_artifact(&ws).await.unwrap_err();
        assert!(matches!(err, MediaError::ArtifactNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_unreadable_artifact() {
        use std::os::unix::fs::PermissionsExt;

        let (_root, _manager, artifact, _ws) = setup();
        std::fs::set_permissions(&artifact, std::fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores file modes
        if std::fs::File::open(&artifact).is_ok() {
            return;
        }

        let err = open_artifact(&artifact).await.unwrap_err();
        assert!(matches!(err, MediaError::ArtifactNotFound { .. }));
    }

    #[tokio::test]
    async fn test_teardown_runs_once() {
        let (_root, manager, artifact, ws) = setup();
        let teardown = Teardown::new(manager, artifact.clone(), Some(ws.clone()));
        let other = teardown.clone();

        assert!(teardown.finalize("end").await);
        assert!(!other.finalize("close").await);
        assert!(other.is_finalized());
        assert!(!artifact.exists());
        assert!(!ws.exists());
    }

    #[tokio::test]
    async fn test_teardown_without_workspace_keeps_directory() {
        let (_root, manager, artifact, ws) = setup();
        let teardown = Teardown::new(manager, artifact.clone(), None);

        assert!(teardown.finalize("end").await);
        assert!(!artifact.exists());
        assert!(ws.exists());
    }

    #[tokio::test]
    async fn test_background_teardown() {
        let (_root, manager, artifact, ws) = setup();
        let teardown = Teardown::new(manager, artifact.clone(), Some(ws.clone()));
        let probe = teardown.clone();

        teardown.finalize_in_background("close");
        for _ in 0..100 {
            if !ws.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(probe.is_finalized());
        assert!(!ws.exists());
    }

    #[tokio::test]
    async fn test_delete_explicit_is_idempotent() {
        let (_root, manager, artifact, ws) = setup();
        delete_explicit(&manager, &artifact, Some(&ws)).await;
        delete_explicit(&manager, &artifact, Some(&ws)).await;
        assert!(!ws.exists());
    }
}
