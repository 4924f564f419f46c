//! Replay error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(#[from] helm_engine::EngineError),

    #[error("Core error: {0}")]
    Core(#[from] helm_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] helm_telemetry::TelemetryError),

    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),

    #[error("Step at {timestamp_ms} did not settle after {fills} fills")]
    Runaway { timestamp_ms: u64, fills: usize },
}

pub type ReplayResult<T> = Result<T, ReplayError>;
