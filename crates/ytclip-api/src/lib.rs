//! Axum HTTP API server.
//!
//! This crate provides:
//! - Clip submission, running the pipeline to completion per request
//! - Artifact download with optional cleanup once the transfer ends
//! - Explicit workspace teardown
//! - Health, readiness and Prometheus metrics endpoints

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
