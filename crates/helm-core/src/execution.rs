//! Execution-related types for the order lifecycle.
//!
//! This module provides:
//! - Order requests and their state machine
//! - Fill and cancel confirmations coming back from the venue
//! - Venue commands emitted by the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::order::{InstrumentId, OrderId, OrderPurpose, OrderSide, OrderType};
use crate::{Price, Size};

// ============================================================================
// Order Tracking Types
// ============================================================================

/// State of an order in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    /// Built, not yet acknowledged by the venue.
    #[default]
    Pending,
    /// Resting at the venue.
    Open,
    /// Some quantity executed, the rest still working.
    PartiallyFilled,
    /// Cancel sent, waiting for the venue to confirm.
    CancelRequested,
    /// Completely filled.
    Filled,
    /// Cancel confirmed.
    Canceled,
    /// Rejected by the venue.
    Rejected,
}

impl OrderState {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }

    /// Returns true if the order can still execute.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// One concrete, classified order derived from an intent leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Engine-assigned order ID.
    pub id: OrderId,
    /// Target instrument.
    pub instrument: InstrumentId,
    /// Order side (buy/sell).
    pub side: OrderSide,
    /// Original order quantity.
    pub quantity: Size,
    /// Target price (limit price or stop trigger).
    pub price: Price,
    /// Type inferred at build time.
    pub order_type: OrderType,
    /// Intent purpose this order serves.
    pub purpose: OrderPurpose,
    /// Sequence of the intent declaration that produced this order.
    /// Legs of the same declaration share it.
    pub intent_seq: u64,
    /// Quantity executed so far.
    pub filled_quantity: Size,
    /// Current order state.
    pub state: OrderState,
    /// Creation timestamp (Unix milliseconds).
    pub created_at: u64,
}

impl OrderRequest {
    /// Returns the remaining unfilled quantity.
    #[must_use]
    pub fn remaining_quantity(&self) -> Size {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    /// Returns true if the order is completely filled.
    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.state == OrderState::Filled || self.filled_quantity >= self.quantity
    }
}

// ============================================================================
// Venue Events
// ============================================================================

/// Execution report from the venue. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEvent {
    /// Order this fill belongs to.
    pub order_id: OrderId,
    /// Quantity executed in this fill.
    pub quantity: Size,
    /// Execution price.
    pub price: Price,
    /// Execution timestamp (Unix milliseconds).
    pub timestamp_ms: u64,
}

impl FillEvent {
    pub fn new(order_id: OrderId, quantity: Size, price: Price, timestamp_ms: u64) -> Self {
        Self {
            order_id,
            quantity,
            price,
            timestamp_ms,
        }
    }

    /// Execution time as a UTC datetime.
    pub fn executed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms as i64)
    }
}

/// Terminal confirmation that a cancel took effect at the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelConfirmation {
    pub order_id: OrderId,
    pub timestamp_ms: u64,
}

// ============================================================================
// Venue Commands
// ============================================================================

/// Instruction for the execution collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VenueCommand {
    /// Place a new order.
    Submit(OrderRequest),
    /// Cancel a working order.
    Cancel {
        order_id: OrderId,
        instrument: InstrumentId,
    },
}

impl VenueCommand {
    pub fn order_id(&self) -> &OrderId {
        match self {
            Self::Submit(order) => &order.id,
            Self::Cancel { order_id, .. } => order_id,
        }
    }
}
