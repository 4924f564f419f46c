//! Order error types.

use helm_core::{OrderId, OrderState, Size};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    /// Malformed intent: empty legs, non-positive price or quantity.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Exit legs exceed the quantity they are meant to cover.
    #[error("Over-allocation: exit legs total {requested} but only {available} is open")]
    OverAllocation { requested: Size, available: Size },

    /// Intent side incompatible with the current position.
    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("Fill of {fill} exceeds remaining {remaining} on order {order_id}")]
    FillExceedsOrder {
        order_id: OrderId,
        fill: Size,
        remaining: Size,
    },

    #[error("Order {order_id} is already terminal ({state:?})")]
    TerminalOrder { order_id: OrderId, state: OrderState },
}

pub type OrderResult<T> = Result<T, OrderError>;
