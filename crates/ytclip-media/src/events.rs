//! Pipeline progress events.
//!
//! The pipeline reports every stage transition and tool run through an
//! [`EventSink`]. Every event carries the job id so interleaved jobs stay
//! distinguishable.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{error, info, warn};
use ytclip_models::{JobId, JobStage};

use crate::process::Termination;

/// What happened.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEventKind {
    StageEntered,
    ToolStarted {
        tool: String,
        command_line: String,
    },
    ToolFinished {
        tool: String,
        termination: Termination,
        elapsed: Duration,
    },
    RetryScheduled {
        attempt: u32,
        delay: Duration,
    },
    Completed {
        artifact_path: PathBuf,
    },
    Failed {
        code: &'static str,
        message: String,
    },
    WorkspaceReleased {
        path: PathBuf,
    },
}

/// A progress event for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEvent {
    pub job_id: JobId,
    /// Stage the job was in when the event was emitted.
    pub stage: JobStage,
    pub kind: PipelineEventKind,
}

/// Receives pipeline events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Writes events to `tracing` with the job id and stage as fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: PipelineEvent) {
        let job_id = event.job_id.as_str();
        let stage = event.stage.as_str();
        match event.kind {
            PipelineEventKind::StageEntered => {
                info!(job_id, stage, "Job stage: {}", stage);
            }
            PipelineEventKind::ToolStarted { tool, command_line } => {
                info!(job_id, stage, tool = %tool, "Running: {}", command_line);
            }
            PipelineEventKind::ToolFinished {
                tool,
                termination,
                elapsed,
            } => {
                info!(
                    job_id,
                    stage,
                    tool = %tool,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "{} finished ({})", tool, termination
                );
            }
            PipelineEventKind::RetryScheduled { attempt, delay } => {
                warn!(
                    job_id,
                    stage,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrieval failed, retrying"
                );
            }
            PipelineEventKind::Completed { artifact_path } => {
                info!(job_id, stage, artifact = %artifact_path.display(), "Job completed");
            }
            PipelineEventKind::Failed { code, message } => {
                error!(job_id, stage, code, "Job failed: {}", message);
            }
            PipelineEventKind::WorkspaceReleased { path } => {
                info!(job_id, stage, workspace = %path.display(), "Workspace released");
            }
        }
    }
}

/// Keeps every event in memory. Cloning shares the buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PipelineEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of all events so far.
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.lock().clone()
    }

    /// Stages entered, in order, for one job.
    pub fn stages(&self, job_id: &JobId) -> Vec<JobStage> {
        self.lock()
            .iter()
            .filter(|e| &e.job_id == job_id && e.kind == PipelineEventKind::StageEntered)
            .map(|e| e.stage)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: PipelineEvent) {
        self.lock().push(event);
    }
}
