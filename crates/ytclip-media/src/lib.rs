//! yt-dlp and FFmpeg CLI orchestration.
//!
//! This crate provides:
//! - An external tool invoker that never fails, reporting how the process ended
//! - Type-safe FFmpeg and yt-dlp argument building
//! - The portrait title filter graph
//! - Per-job temporary workspaces with best-effort teardown
//! - The clip pipeline that chains retrieval, trim and render
//! - Artifact delivery with once-only cleanup

pub mod command;
pub mod delivery;
pub mod download;
pub mod error;
pub mod events;
pub mod filters;
pub mod pipeline;
pub mod process;
pub mod retry;
pub mod workspace;

pub use command::FfmpegCommand;
pub use delivery::{delete_explicit, open_artifact, ArtifactFile, Teardown};
pub use download::YtDlpCommand;
pub use error::{MediaError, MediaResult, PipelineError, PipelineResult, ToolFailure, ToolStage};
pub use events::{EventSink, PipelineEvent, PipelineEventKind, RecordingEventSink, TracingEventSink};
pub use filters::{escape_filter_text, portrait_caption_filter, CaptionSource};
pub use pipeline::{CaptionMode, ClipPipeline, FailureCleanup, FetchStrategy, PipelineConfig};
pub use process::{check_tool, ProcessRunner, Termination, ToolInvocation, ToolOutput, ToolRunner};
pub use retry::RetryConfig;
pub use workspace::{Workspace, WorkspaceManager, WORKSPACE_PREFIX};
