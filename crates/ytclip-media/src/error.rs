//! Error types for media operations and the clip pipeline.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use ytclip_models::ValidationError;

use crate::process::Termination;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors from workspace and artifact handling.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    #[error("Failed to create workspace under {root}: {source}")]
    WorkspaceAllocation {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path is not inside a clip workspace: {0}")]
    OutsideWorkspaceRoot(PathBuf),

    #[error("Artifact not found: {path}")]
    ArtifactNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Create an artifact-not-found error.
    pub fn artifact_not_found(path: impl Into<PathBuf>, source: Option<std::io::Error>) -> Self {
        Self::ArtifactNotFound {
            path: path.into(),
            source,
        }
    }
}

/// The external-tool step a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolStage {
    Retrieval,
    Trim,
    Render,
}

impl ToolStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStage::Retrieval => "retrieval",
            ToolStage::Trim => "trim",
            ToolStage::Render => "render",
        }
    }
}

impl fmt::Display for ToolStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostic payload of a failed tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    /// Program that was run
    pub tool: String,
    /// How the process ended
    pub termination: Termination,
    /// Bounded prefix of the captured error stream
    pub excerpt: String,
}

/// Errors that abort a clip job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Workspace I/O failed: {0}")]
    Io(#[from] MediaError),

    #[error("{} download failed ({}): {}", .0.tool, .0.termination, .0.excerpt)]
    Retrieval(ToolFailure),

    #[error("{} trim failed ({}): {}", .0.tool, .0.termination, .0.excerpt)]
    Trim(ToolFailure),

    #[error("{} convert failed ({}): {}", .0.tool, .0.termination, .0.excerpt)]
    Render(ToolFailure),

    #[error("{stage} step timed out after {}s", .after.as_secs())]
    Timeout { stage: ToolStage, after: Duration },
}

impl PipelineError {
    /// Wrap a tool failure in the variant for its stage.
    pub fn tool_failed(stage: ToolStage, failure: ToolFailure) -> Self {
        match stage {
            ToolStage::Retrieval => Self::Retrieval(failure),
            ToolStage::Trim => Self::Trim(failure),
            ToolStage::Render => Self::Render(failure),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Io(_) => "io_error",
            PipelineError::Retrieval(_) => "retrieval_error",
            PipelineError::Trim(_) => "trim_error",
            PipelineError::Render(_) => "render_error",
            PipelineError::Timeout { .. } => "timeout_error",
        }
    }

    /// Failure details when the error came from a tool.
    pub fn tool_failure(&self) -> Option<&ToolFailure> {
        match self {
            PipelineError::Retrieval(f) | PipelineError::Trim(f) | PipelineError::Render(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}
