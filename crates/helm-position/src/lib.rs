//! Position ledger and read-only views.
//!
//! [`PositionLedger`] owns the position of one instrument and turns fills
//! into ordered [`LedgerDelta`] transitions, committing one slice at a
//! time. [`PositionView`] exposes derived values computed on access.

pub mod error;
pub mod ledger;
pub mod view;

pub use error::{PositionError, PositionResult};
pub use ledger::{
    ClosedTrade, LedgerDelta, LedgerFill, Position, PositionLedger, PositionSnapshot, Transition,
    CLOSED_TRADE_CAPACITY,
};
pub use view::{PositionSummary, PositionView};
