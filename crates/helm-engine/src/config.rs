//! Engine configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-instrument engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cancel unfilled sibling entry legs once any entry leg fills.
    #[serde(default = "default_should_cancel_entry")]
    pub should_cancel_entry: bool,
    /// Fee charged on every fill's notional. Default: 0.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Leverage used for `pnl_percentage`. Default: 1.
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    /// Mailbox size of the per-instrument actor. Default: 1024.
    #[serde(default = "default_actor_channel_capacity")]
    pub actor_channel_capacity: usize,
}

fn default_should_cancel_entry() -> bool {
    false
}

fn default_fee_rate() -> Decimal {
    Decimal::ZERO
}

fn default_leverage() -> Decimal {
    Decimal::ONE
}

fn default_actor_channel_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            should_cancel_entry: default_should_cancel_entry(),
            fee_rate: default_fee_rate(),
            leverage: default_leverage(),
            actor_channel_capacity: default_actor_channel_capacity(),
        }
    }
}
