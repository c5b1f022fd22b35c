//! Job identity, pipeline stages and artifact references.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a clip job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stage of the clip pipeline.
///
/// Stages advance strictly forward; `Failed` is absorbing and reachable from
/// any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    #[default]
    Received,
    Validated,
    WorkspaceAllocated,
    Fetched,
    Trimmed,
    Transformed,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Received => "received",
            JobStage::Validated => "validated",
            JobStage::WorkspaceAllocated => "workspace_allocated",
            JobStage::Fetched => "fetched",
            JobStage::Trimmed => "trimmed",
            JobStage::Transformed => "transformed",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_advance_to(&self, next: JobStage) -> bool {
        use JobStage::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Received, Validated)
            | (Validated, WorkspaceAllocated)
            | (WorkspaceAllocated, Fetched)
            | (Fetched, Trimmed)
            | (Fetched, Transformed)
            | (Trimmed, Transformed)
            | (Transformed, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated time range in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A validated clip job, ready for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipJob {
    pub id: JobId,
    pub source_locator: String,
    pub range: TimeRange,
    pub title: String,
}

/// Reference to a rendered artifact and the workspace that owns it.
///
/// The reference does not own the file; the workspace does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    pub job_id: JobId,
    pub artifact_path: PathBuf,
    pub workspace_handle: PathBuf,
    pub completed_at: DateTime<Utc>,
}
