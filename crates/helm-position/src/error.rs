//! Position error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("Invalid fill: {0}")]
    InvalidFill(String),
}

pub type PositionResult<T> = Result<T, PositionError>;
