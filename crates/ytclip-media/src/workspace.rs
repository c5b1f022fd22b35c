//! Per-job temporary workspaces.
//!
//! Each job gets a fresh `ytclip-*` directory directly under the workspace
//! root. Handles coming back from clients are only honored when they point at
//! such a directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Name prefix of every workspace directory.
pub const WORKSPACE_PREFIX: &str = "ytclip-";

/// A job's scratch directory. Owns every intermediate and output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the workspace.
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

/// Allocates, resolves and releases workspaces under one root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Manager for `root`. A relative root is resolved against the current
    /// directory so it compares equal to the paths handed out by [`allocate`].
    ///
    /// [`allocate`]: WorkspaceManager::allocate
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: absolute_root(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a new, uniquely named workspace directory.
    ///
    /// The directory outlives this call; it is removed only by [`release`].
    ///
    /// [`release`]: WorkspaceManager::release
    pub fn allocate(&self) -> MediaResult<Workspace> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|source| MediaError::WorkspaceAllocation {
                root: self.root.clone(),
                source,
            })?;

        let path = dir.keep();
        debug!(workspace = %path.display(), "Allocated workspace");
        Ok(Workspace { path })
    }

    /// Remove a workspace and everything in it. Best effort; never fails.
    ///
    /// Returns whether the directory was removed by this call.
    pub async fn release(&self, path: &Path) -> bool {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                debug!(workspace = %path.display(), "Removed workspace");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(workspace = %path.display(), "Workspace already gone");
                false
            }
            Err(e) => {
                warn!(workspace = %path.display(), "Failed to remove workspace: {}", e);
                false
            }
        }
    }

    /// Remove a single file. Best effort; never fails.
    pub async fn release_file(&self, path: &Path) -> bool {
        match tokio::fs::remove_file(path).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(file = %path.display(), "Failed to remove file: {}", e);
                false
            }
        }
    }

    /// Check that `handle` names a workspace directory under this root.
    ///
    /// The check is lexical; the directory does not need to exist.
    pub fn resolve_workspace(&self, handle: &str) -> MediaResult<PathBuf> {
        let path = PathBuf::from(handle);
        if !self.is_workspace_path(&path) {
            return Err(MediaError::OutsideWorkspaceRoot(path));
        }
        Ok(path)
    }

    /// Check that `file` is a file directly inside a workspace under this
    /// root. Returns the file and its workspace.
    pub fn resolve_artifact(&self, file: &str) -> MediaResult<(PathBuf, PathBuf)> {
        let path = PathBuf::from(file);
        let workspace = match path.parent() {
            Some(parent) if path.file_name().is_some() && self.is_workspace_path(parent) => {
                parent.to_path_buf()
            }
            _ => return Err(MediaError::OutsideWorkspaceRoot(path)),
        };
        Ok((path, workspace))
    }

    fn is_workspace_path(&self, path: &Path) -> bool {
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
        {
            return false;
        }

        let named_like_workspace = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.len() > WORKSPACE_PREFIX.len() && n.starts_with(WORKSPACE_PREFIX));

        named_like_workspace && path.parent() == Some(self.root.as_path())
    }
}

/// Absolute form of `root`. Paths with `..` are canonicalized when they
/// exist; anything that cannot be resolved is kept as given.
fn absolute_root(root: PathBuf) -> PathBuf {
    let absolute = match std::path::absolute(&root) {
        Ok(path) => path,
        Err(e) => {
            warn!(root = %root.display(), "Cannot resolve workspace root: {}", e);
            return root;
        }
    };

    if absolute.components().any(|c| c == Component::ParentDir) {
        return std::fs::canonicalize(&absolute).unwrap_or(absolute);
    }
    absolute
}
