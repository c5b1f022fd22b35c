//! Clip pipeline: validate, fetch, optionally trim, render.
//!
//! One call drives one job through
//! `Received → Validated → WorkspaceAllocated → Fetched → [Trimmed] → Transformed → Completed`.
//! Any failure short-circuits to `Failed`. Tool invocations within a job run
//! strictly one after another.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use ytclip_models::{
    format_seconds, ArtifactRef, ClipJob, ClipRequest, EncodingConfig, JobId, JobStage,
    OUTPUT_FILE_NAME,
};

use crate::command::FfmpegCommand;
use crate::download::{YtDlpCommand, DEFAULT_FORMAT_SELECTOR};
use crate::error::{MediaError, PipelineError, PipelineResult, ToolFailure, ToolStage};
use crate::events::{EventSink, PipelineEvent, PipelineEventKind};
use crate::filters::{portrait_caption_filter, CaptionSource};
use crate::process::{Termination, ToolInvocation, ToolOutput, ToolRunner};
use crate::retry::{retry_async, RetryConfig};
use crate::workspace::{Workspace, WorkspaceManager};

/// Retrieval output inside the workspace.
pub const EXTRACTED_FILE_NAME: &str = "extracted.mp4";
/// Trim output inside the workspace (full-then-trim only).
pub const TRIMMED_FILE_NAME: &str = "trimmed.mp4";
/// Caption text inside the workspace (text-file caption mode only).
pub const CAPTION_FILE_NAME: &str = "caption.txt";
/// Maximum characters of tool stderr carried in an error.
pub const STDERR_EXCERPT_CHARS: usize = 500;
/// Default wall-clock limit per tool invocation.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Unrecognized value for a pipeline setting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {setting} '{value}'")]
pub struct UnknownSetting {
    pub setting: &'static str,
    pub value: String,
}

/// How the requested range is obtained from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    /// Ask the retrieval tool for only the requested section.
    #[default]
    Sections,
    /// Fetch the whole source, then cut the range with a stream copy.
    FullThenTrim,
}

impl FromStr for FetchStrategy {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sections" => Ok(Self::Sections),
            "full_then_trim" | "full-then-trim" => Ok(Self::FullThenTrim),
            other => Err(UnknownSetting {
                setting: "fetch strategy",
                value: other.to_string(),
            }),
        }
    }
}

/// How the title reaches the drawtext filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionMode {
    /// Escaped and interpolated into the filter expression.
    #[default]
    Inline,
    /// Written to a file in the workspace and referenced by path.
    TextFile,
}

impl FromStr for CaptionMode {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "textfile" | "text_file" => Ok(Self::TextFile),
            other => Err(UnknownSetting {
                setting: "caption mode",
                value: other.to_string(),
            }),
        }
    }
}

/// What happens to a workspace when its job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCleanup {
    /// Leave intermediate files for inspection.
    #[default]
    Retain,
    /// Delete the workspace.
    Remove,
}

impl FromStr for FailureCleanup {
    type Err = UnknownSetting;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" | "keep" => Ok(Self::Retain),
            "remove" | "delete" => Ok(Self::Remove),
            other => Err(UnknownSetting {
                setting: "failure cleanup policy",
                value: other.to_string(),
            }),
        }
    }
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Retrieval tool executable
    pub ytdlp_program: String,
    /// Transform tool executable
    pub ffmpeg_program: String,
    pub fetch_strategy: FetchStrategy,
    pub caption_mode: CaptionMode,
    pub failure_cleanup: FailureCleanup,
    /// Wall-clock limit per tool invocation; `None` waits indefinitely
    pub tool_timeout: Option<Duration>,
    /// Retries for the retrieval step only
    pub retrieval_retry: RetryConfig,
    pub encoding: EncodingConfig,
    pub format_selector: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ytdlp_program: "yt-dlp".to_string(),
            ffmpeg_program: "ffmpeg".to_string(),
            fetch_strategy: FetchStrategy::default(),
            caption_mode: CaptionMode::default(),
            failure_cleanup: FailureCleanup::default(),
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            retrieval_retry: RetryConfig::none(),
            encoding: EncodingConfig::default(),
            format_selector: DEFAULT_FORMAT_SELECTOR.to_string(),
        }
    }
}

/// Current stage of one job, reported through the event sink.
struct JobProgress<'a> {
    job_id: JobId,
    stage: JobStage,
    events: &'a dyn EventSink,
}

impl<'a> JobProgress<'a> {
    fn start(job_id: JobId, events: &'a dyn EventSink) -> Self {
        let progress = Self {
            job_id,
            stage: JobStage::Received,
            events,
        };
        progress.emit(PipelineEventKind::StageEntered);
        progress
    }

    fn advance(&mut self, next: JobStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} -> {}",
            self.stage,
            next
        );
        self.stage = next;
        self.emit(PipelineEventKind::StageEntered);
    }

    fn emit(&self, kind: PipelineEventKind) {
        self.events.emit(PipelineEvent {
            job_id: self.job_id.clone(),
            stage: self.stage,
            kind,
        });
    }
}

/// Orchestrates the external tools for clip jobs.
pub struct ClipPipeline {
    config: PipelineConfig,
    workspaces: WorkspaceManager,
    runner: Arc<dyn ToolRunner>,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for ClipPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipPipeline")
            .field("config", &self.config)
            .field("workspaces", &self.workspaces)
            .finish_non_exhaustive()
    }
}

impl ClipPipeline {
    pub fn new(
        config: PipelineConfig,
        workspaces: WorkspaceManager,
        runner: Arc<dyn ToolRunner>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            workspaces,
            runner,
            events,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Validate a raw request and run it. Nothing touches the filesystem
    /// unless validation passes.
    pub async fn submit(&self, request: &ClipRequest) -> PipelineResult<ArtifactRef> {
        let mut progress = JobProgress::start(JobId::new(), self.events.as_ref());

        let job = match request.validate_as(progress.job_id.clone()) {
            Ok(job) => job,
            Err(e) => return Err(self.fail(&mut progress, e.into(), None).await),
        };
        progress.advance(JobStage::Validated);

        self.execute(&job, progress).await
    }

    async fn execute(
        &self,
        job: &ClipJob,
        mut progress: JobProgress<'_>,
    ) -> PipelineResult<ArtifactRef> {
        let started = Instant::now();
        debug!(
            job_id = %job.id,
            "Clipping {} from {} to {}",
            job.source_locator,
            format_seconds(job.range.start),
            format_seconds(job.range.end)
        );

        let workspace = match self.workspaces.allocate() {
            Ok(workspace) => workspace,
            Err(e) => return Err(self.fail(&mut progress, e.into(), None).await),
        };
        progress.advance(JobStage::WorkspaceAllocated);

        let artifact_path = match self.produce(job, &workspace, &mut progress).await {
            Ok(path) => path,
            Err(e) => return Err(self.fail(&mut progress, e, Some(&workspace)).await),
        };

        progress.advance(JobStage::Completed);
        progress.emit(PipelineEventKind::Completed {
            artifact_path: artifact_path.clone(),
        });
        counter!("ytclip_jobs_total", "outcome" => "success").increment(1);
        debug!(
            job_id = %job.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Clip pipeline finished"
        );

        Ok(ArtifactRef {
            job_id: job.id.clone(),
            artifact_path,
            workspace_handle: workspace.path().to_path_buf(),
            completed_at: Utc::now(),
        })
    }

    async fn produce(
        &self,
        job: &ClipJob,
        workspace: &Workspace,
        progress: &mut JobProgress<'_>,
    ) -> PipelineResult<PathBuf> {
        let extracted = workspace.join(EXTRACTED_FILE_NAME);
        let output = workspace.join(OUTPUT_FILE_NAME);

        self.fetch(job, &extracted, progress).await?;
        progress.advance(JobStage::Fetched);

        let render_input = match self.config.fetch_strategy {
            FetchStrategy::Sections => extracted,
            FetchStrategy::FullThenTrim => {
                let trimmed = workspace.join(TRIMMED_FILE_NAME);
                let invocation = FfmpegCommand::new(&extracted, &trimmed)
                    .seek(job.range.start)
                    .duration(job.range.duration())
                    .codec_copy()
                    .into_invocation(&self.config.ffmpeg_program);
                self.run_tool(ToolStage::Trim, invocation, progress).await?;
                progress.advance(JobStage::Trimmed);
                trimmed
            }
        };

        let filter = match self.config.caption_mode {
            CaptionMode::Inline => portrait_caption_filter(CaptionSource::Inline(&job.title)),
            CaptionMode::TextFile => {
                let caption = workspace.join(CAPTION_FILE_NAME);
                tokio::fs::write(&caption, job.title.as_bytes())
                    .await
                    .map_err(MediaError::from)?;
                portrait_caption_filter(CaptionSource::TextFile(&caption))
            }
        };

        let invocation = FfmpegCommand::new(&render_input, &output)
            .video_filter(filter)
            .encoding(&self.config.encoding)
            .into_invocation(&self.config.ffmpeg_program);
        self.run_tool(ToolStage::Render, invocation, progress).await?;
        progress.advance(JobStage::Transformed);

        Ok(output)
    }

    async fn fetch(
        &self,
        job: &ClipJob,
        output: &Path,
        progress: &JobProgress<'_>,
    ) -> PipelineResult<ToolOutput> {
        let mut command =
            YtDlpCommand::new(&job.source_locator, output).format(&self.config.format_selector);
        if self.config.fetch_strategy == FetchStrategy::Sections {
            command = command.section(job.range.start, job.range.end);
        }
        let invocation = command.into_invocation(&self.config.ytdlp_program);

        retry_async(
            &self.config.retrieval_retry,
            || self.run_tool(ToolStage::Retrieval, invocation.clone(), progress),
            |error, attempt, delay| {
                let retryable = matches!(
                    error,
                    PipelineError::Retrieval(failure)
                        if !matches!(failure.termination, Termination::FailedToStart(_))
                );
                if retryable {
                    progress.emit(PipelineEventKind::RetryScheduled { attempt, delay });
                }
                retryable
            },
        )
        .await
        .into_result()
    }

    /// Run one tool and map anything but a zero exit to the stage's error.
    async fn run_tool(
        &self,
        stage: ToolStage,
        invocation: ToolInvocation,
        progress: &JobProgress<'_>,
    ) -> PipelineResult<ToolOutput> {
        let invocation = invocation.timeout(self.config.tool_timeout);
        progress.emit(PipelineEventKind::ToolStarted {
            tool: invocation.program.clone(),
            command_line: invocation.command_line(),
        });

        let output = self.runner.invoke(&invocation).await;

        histogram!("ytclip_tool_duration_seconds", "tool" => stage.as_str())
            .record(output.elapsed.as_secs_f64());
        progress.emit(PipelineEventKind::ToolFinished {
            tool: invocation.program.clone(),
            termination: output.termination.clone(),
            elapsed: output.elapsed,
        });

        if output.is_success() {
            return Ok(output);
        }

        let error = match output.termination {
            Termination::TimedOut(after) => PipelineError::Timeout { stage, after },
            ref termination => PipelineError::tool_failed(
                stage,
                ToolFailure {
                    tool: invocation.program,
                    termination: termination.clone(),
                    excerpt: output.stderr_excerpt(STDERR_EXCERPT_CHARS),
                },
            ),
        };
        Err(error)
    }

    /// Report a failure, apply the cleanup policy, and hand the error back.
    async fn fail(
        &self,
        progress: &mut JobProgress<'_>,
        error: PipelineError,
        workspace: Option<&Workspace>,
    ) -> PipelineError {
        progress.emit(PipelineEventKind::Failed {
            code: error.code(),
            message: error.to_string(),
        });
        progress.advance(JobStage::Failed);

        if let (FailureCleanup::Remove, Some(workspace)) = (self.config.failure_cleanup, workspace)
        {
            if self.workspaces.release(workspace.path()).await {
                progress.emit(PipelineEventKind::WorkspaceReleased {
                    path: workspace.path().to_path_buf(),
                });
            }
        }

        counter!("ytclip_jobs_total", "outcome" => error.code()).increment(1);
        error
    }
}
