//! Clip request wire format and validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{ClipJob, JobId, TimeRange};
use crate::timestamp::{parse_timestamp, TimestampError};

/// A point in the source video, either plain seconds or a clock string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TimeValue {
    Seconds(f64),
    Clock(String),
}

impl TimeValue {
    /// Resolve to seconds.
    pub fn to_seconds(&self) -> Result<f64, TimestampError> {
        match self {
            TimeValue::Seconds(secs) => Ok(*secs),
            TimeValue::Clock(raw) => parse_timestamp(raw),
        }
    }
}

impl From<f64> for TimeValue {
    fn from(secs: f64) -> Self {
        TimeValue::Seconds(secs)
    }
}

/// Clip submission as received from a client.
///
/// Every field is optional on the wire so that presence can be reported as a
/// validation failure instead of a deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRequest {
    /// Source video URL
    #[serde(default, alias = "url", alias = "sourceLocator")]
    pub source_locator: Option<String>,

    /// Range start, seconds or clock string
    #[serde(default, alias = "start", alias = "rangeStart")]
    pub range_start: Option<TimeValue>,

    /// Range end, seconds or clock string
    #[serde(default, alias = "end", alias = "rangeEnd")]
    pub range_end: Option<TimeValue>,

    /// Clock-string start as typed in the form; used when `range_start` is absent
    #[serde(default, alias = "startTime", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,

    /// Clock-string end as typed in the form; used when `range_end` is absent
    #[serde(default, alias = "endTime", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,

    /// Caption burned into the clip
    #[serde(default)]
    pub title: Option<String>,
}

/// Request validation failure. Raised before any side effect.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Invalid source URL '{locator}': {reason}")]
    InvalidLocator { locator: String, reason: String },

    #[error("Invalid {field} timestamp: {source}")]
    InvalidTimestamp {
        field: &'static str,
        #[source]
        source: TimestampError,
    },

    #[error("Invalid time range: start={start}s, end={end}s, duration={duration}s")]
    InvalidRange { start: f64, end: f64, duration: f64 },
}

impl ClipRequest {
    /// Build a request from plain values.
    pub fn new(
        source_locator: impl Into<String>,
        range_start: impl Into<TimeValue>,
        range_end: impl Into<TimeValue>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_locator: Some(source_locator.into()),
            range_start: Some(range_start.into()),
            range_end: Some(range_end.into()),
            start_time: None,
            end_time: None,
            title: Some(title.into()),
        }
    }

    fn start_value(&self) -> Option<TimeValue> {
        self.range_start
            .clone()
            .or_else(|| self.start_time.clone().map(TimeValue::Clock))
    }

    fn end_value(&self) -> Option<TimeValue> {
        self.range_end
            .clone()
            .or_else(|| self.end_time.clone().map(TimeValue::Clock))
    }

    /// Validate the request and produce a job with a fresh identifier.
    pub fn validate(&self) -> Result<ClipJob, ValidationError> {
        self.validate_as(JobId::new())
    }

    /// Validate the request and produce a job carrying `id`.
    pub fn validate_as(&self, id: JobId) -> Result<ClipJob, ValidationError> {
        let locator = non_blank(self.source_locator.as_deref());
        let start = self.start_value();
        let end = self.end_value();
        let title = non_blank(self.title.as_deref());

        let mut missing = Vec::new();
        if locator.is_none() {
            missing.push("url");
        }
        if start.is_none() {
            missing.push("start");
        }
        if end.is_none() {
            missing.push("end");
        }
        if title.is_none() {
            missing.push("title");
        }

        let (Some(locator), Some(start), Some(end), Some(title)) = (locator, start, end, title)
        else {
            return Err(ValidationError::MissingFields(missing));
        };

        validate_locator(locator)?;

        let start = start
            .to_seconds()
            .map_err(|source| ValidationError::InvalidTimestamp { field: "start", source })?;
        let end = end
            .to_seconds()
            .map_err(|source| ValidationError::InvalidTimestamp { field: "end", source })?;

        let duration = end - start;
        if !start.is_finite() || start < 0.0 || !duration.is_finite() || duration <= 0.0 {
            return Err(ValidationError::InvalidRange {
                start,
                end,
                duration: if duration.is_nan() { 0.0 } else { duration.max(0.0) },
            });
        }

        Ok(ClipJob {
            id,
            source_locator: locator.to_string(),
            range: TimeRange { start, end },
            title: title.to_string(),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Only absolute http(s) URLs reach the retrieval tool, so a locator can
/// never be mistaken for a command-line option.
fn validate_locator(locator: &str) -> Result<(), ValidationError> {
    let parsed = url::Url::parse(locator).map_err(|e| ValidationError::InvalidLocator {
        locator: locator.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::InvalidLocator {
            locator: locator.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
