//! Engine error types.

use thiserror::Error;

use helm_core::CoreError;
use helm_orders::OrderError;
use helm_position::PositionError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error("Engine task unavailable: {0}")]
    ChannelClosed(String),
}

impl EngineError {
    /// True for errors raised while validating an intent.
    pub fn is_intent_error(&self) -> bool {
        matches!(
            self,
            Self::Order(
                OrderError::Configuration(_)
                    | OrderError::OverAllocation { .. }
                    | OrderError::StateConflict(_)
            )
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
