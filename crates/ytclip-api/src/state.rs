//! Application state.

use std::io;
use std::sync::Arc;

use ytclip_media::{
    ClipPipeline, MediaError, ProcessRunner, TracingEventSink, WorkspaceManager,
};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<ClipPipeline>,
}

impl AppState {
    /// Create state backed by real processes and tracing output.
    ///
    /// Fails if the workspace root is not an existing directory.
    pub fn new(config: ApiConfig) -> Result<Self, MediaError> {
        if !config.workspace_root.is_dir() {
            return Err(MediaError::WorkspaceAllocation {
                root: config.workspace_root.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
            });
        }

        let pipeline = ClipPipeline::new(
            config.pipeline_config(),
            WorkspaceManager::new(config.workspace_root.clone()),
            Arc::new(ProcessRunner::new()),
            Arc::new(TracingEventSink),
        );
        Ok(Self::with_pipeline(config, pipeline))
    }

    /// Create state around an existing pipeline.
    pub fn with_pipeline(config: ApiConfig, pipeline: ClipPipeline) -> Self {
        Self {
            config,
            pipeline: Arc::new(pipeline),
        }
    }
}
