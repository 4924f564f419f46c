//! Per-step market context.
//!
//! Values that depend on the current market state are handed to every
//! processing step instead of living in shared mutable globals.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::Price;

/// Market state for a single processing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepContext {
    /// Current market price used to classify orders and mark PnL.
    pub reference_price: Price,
    /// Step timestamp (Unix milliseconds).
    pub timestamp_ms: u64,
}

impl StepContext {
    /// Create a context, rejecting non-positive reference prices.
    pub fn new(reference_price: Price, timestamp_ms: u64) -> Result<Self> {
        if !reference_price.is_positive() {
            return Err(CoreError::InvalidPrice(format!(
                "reference price must be positive, got {reference_price}"
            )));
        }
        Ok(Self {
            reference_price,
            timestamp_ms,
        })
    }
}
