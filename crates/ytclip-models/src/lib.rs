//! Shared data models for the ytclip service.
//!
//! This crate provides Serde-serializable types for:
//! - Clip requests as they arrive on the wire, and their validated form
//! - Job identity, pipeline stages and artifact references
//! - Encoding configuration and output frame geometry
//! - Timestamp parsing for clock-style range inputs

pub mod encoding;
pub mod job;
pub mod request;
pub mod timestamp;

// Re-export common types
pub use encoding::{EncodingConfig, OUTPUT_FILE_NAME, OUTPUT_HEIGHT, OUTPUT_WIDTH};
pub use job::{ArtifactRef, ClipJob, JobId, JobStage, TimeRange};
pub use request::{ClipRequest, TimeValue, ValidationError};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
