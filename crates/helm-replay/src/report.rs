//! Replay output.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use helm_core::{
    InstrumentId, OrderId, OrderPurpose, OrderRequest, OrderSide, OrderType, PositionSide, Price,
    Size,
};
use helm_engine::Hook;
use helm_position::{ClosedTrade, PositionSummary};

/// One observable thing that happened during the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimelineEntry {
    Submitted {
        timestamp_ms: u64,
        order_id: OrderId,
        purpose: OrderPurpose,
        order_type: OrderType,
        side: OrderSide,
        quantity: Size,
        price: Price,
    },
    CancelRequested {
        timestamp_ms: u64,
        order_id: OrderId,
    },
    CancelConfirmed {
        timestamp_ms: u64,
        order_id: OrderId,
    },
    Filled {
        timestamp_ms: u64,
        order_id: OrderId,
        purpose: OrderPurpose,
        quantity: Size,
        price: Price,
        /// Wall-clock time of the fill, when the timestamp is representable.
        executed_at: Option<DateTime<Utc>>,
    },
    Hook {
        timestamp_ms: u64,
        hook: Hook,
        order_id: Option<OrderId>,
        side: PositionSide,
        quantity: Size,
    },
    HookFault {
        timestamp_ms: u64,
        hook: Hook,
        message: String,
    },
    IntentRejected {
        timestamp_ms: u64,
        action: &'static str,
        reason: String,
    },
}

impl TimelineEntry {
    pub fn timestamp_ms(&self) -> u64 {
        match self {
            Self::Submitted { timestamp_ms, .. }
            | Self::CancelRequested { timestamp_ms, .. }
            | Self::CancelConfirmed { timestamp_ms, .. }
            | Self::Filled { timestamp_ms, .. }
            | Self::Hook { timestamp_ms, .. }
            | Self::HookFault { timestamp_ms, .. }
            | Self::IntentRejected { timestamp_ms, .. } => *timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub instrument: InstrumentId,
    pub steps: usize,
    pub timeline: Vec<TimelineEntry>,
    /// Position marked at the last step's price.
    pub final_position: PositionSummary,
    pub outstanding: Vec<OrderRequest>,
    /// Every trade closed during the replay, oldest first.
    pub closed_trades: Vec<ClosedTrade>,
    pub total_realized_pnl: Decimal,
    pub total_fees: Decimal,
}

impl ReplayReport {
    /// Hooks in the order they fired.
    pub fn hooks(&self) -> Vec<Hook> {
        self.timeline
            .iter()
            .filter_map(|entry| match entry {
                TimelineEntry::Hook { hook, .. } => Some(*hook),
                _ => None,
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
