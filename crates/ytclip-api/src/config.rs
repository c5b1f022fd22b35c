//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use ytclip_media::pipeline::DEFAULT_TOOL_TIMEOUT;
use ytclip_media::{CaptionMode, FailureCleanup, FetchStrategy, PipelineConfig, RetryConfig};

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Serve Prometheus metrics at /metrics
    pub metrics_enabled: bool,
    /// Directory that holds job workspaces
    pub workspace_root: PathBuf,
    /// yt-dlp executable
    pub ytdlp_bin: String,
    /// FFmpeg executable
    pub ffmpeg_bin: String,
    /// Per-invocation wall-clock limit; `None` disables it
    pub tool_timeout: Option<Duration>,
    pub fetch_strategy: FetchStrategy,
    pub caption_mode: CaptionMode,
    pub failure_cleanup: FailureCleanup,
    /// Extra attempts for the retrieval step
    pub retrieval_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 64 * 1024,
            environment: "development".to_string(),
            metrics_enabled: true,
            workspace_root: std::env::temp_dir(),
            ytdlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            tool_timeout: Some(DEFAULT_TOOL_TIMEOUT),
            fetch_strategy: FetchStrategy::default(),
            caption_mode: CaptionMode::default(),
            failure_cleanup: FailureCleanup::default(),
            retrieval_retries: 0,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: parsed_var("API_PORT").unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: parsed_var("MAX_BODY_SIZE").unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            workspace_root: std::env::var("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            ytdlp_bin: std::env::var("YTDLP_BIN").unwrap_or(defaults.ytdlp_bin),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            tool_timeout: match parsed_var::<u64>("TOOL_TIMEOUT_SECS") {
                Some(0) => None,
                Some(secs) => Some(Duration::from_secs(secs)),
                None => defaults.tool_timeout,
            },
            fetch_strategy: parsed_var("FETCH_STRATEGY").unwrap_or(defaults.fetch_strategy),
            caption_mode: parsed_var("CAPTION_MODE").unwrap_or(defaults.caption_mode),
            failure_cleanup: parsed_var("FAILURE_CLEANUP").unwrap_or(defaults.failure_cleanup),
            retrieval_retries: parsed_var("RETRIEVAL_RETRIES")
                .unwrap_or(defaults.retrieval_retries),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        is_production(&self.environment)
    }

    /// Pipeline settings derived from this configuration.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            ytdlp_program: self.ytdlp_bin.clone(),
            ffmpeg_program: self.ffmpeg_bin.clone(),
            fetch_strategy: self.fetch_strategy,
            caption_mode: self.caption_mode,
            failure_cleanup: self.failure_cleanup,
            tool_timeout: self.tool_timeout,
            retrieval_retry: RetryConfig::default().with_max_retries(self.retrieval_retries),
            ..PipelineConfig::default()
        }
    }
}

/// Whether an `ENVIRONMENT` value names production. Case-insensitive.
pub fn is_production(environment: &str) -> bool {
    environment.trim().eq_ignore_ascii_case("production")
}

/// Read and parse an environment variable. Unparseable values are logged and
/// treated as unset.
fn parsed_var<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring invalid {}={:?}: {}", name, raw, e);
            None
        }
    }
}
