//! Read-only position view for strategy code.
//!
//! Nothing here is stored: every accessor recomputes from the committed
//! position and the reference price of the current step.

use rust_decimal::Decimal;
use serde::Serialize;

use helm_core::{PositionSide, Price, Size};

use crate::ledger::Position;

/// Borrowed view over a committed [`Position`] at a given reference price.
#[derive(Debug, Clone, Copy)]
pub struct PositionView<'a> {
    position: &'a Position,
    reference_price: Price,
    leverage: Decimal,
}

impl<'a> PositionView<'a> {
    pub fn new(position: &'a Position, reference_price: Price, leverage: Decimal) -> Self {
        Self {
            position,
            reference_price,
            leverage,
        }
    }

    pub fn side(&self) -> PositionSide {
        self.position.side
    }

    pub fn quantity(&self) -> Size {
        self.position.quantity
    }

    pub fn entry_price(&self) -> Option<Price> {
        self.position.entry_price
    }

    pub fn opened_at(&self) -> Option<u64> {
        self.position.opened_at
    }

    pub fn reference_price(&self) -> Price {
        self.reference_price
    }

    pub fn is_open(&self) -> bool {
        !self.position.is_flat()
    }

    pub fn is_close(&self) -> bool {
        self.position.is_flat()
    }

    /// Notional value of the open quantity at the reference price.
    pub fn value(&self) -> Decimal {
        self.position.quantity.notional(self.reference_price)
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.position.realized_pnl
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.position.unrealized_pnl(self.reference_price)
    }

    /// Realized plus unrealized PnL of the current position.
    pub fn pnl(&self) -> Decimal {
        self.realized_pnl() + self.unrealized_pnl()
    }

    /// PnL relative to the margin committed at entry, in percent.
    ///
    /// Zero while flat or when leverage is not positive.
    pub fn pnl_percentage(&self) -> Decimal {
        let Some(entry) = self.position.entry_price else {
            return Decimal::ZERO;
        };
        if self.leverage <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let margin = self.position.quantity.notional(entry) / self.leverage;
        if margin.is_zero() {
            return Decimal::ZERO;
        }
        self.pnl() / margin * Decimal::ONE_HUNDRED
    }

    /// Owned copy of the derived values, for logging and reports.
    pub fn summary(&self) -> PositionSummary {
        PositionSummary {
            side: self.side(),
            quantity: self.quantity(),
            entry_price: self.entry_price(),
            opened_at: self.opened_at(),
            value: self.value(),
            pnl: self.pnl(),
            pnl_percentage: self.pnl_percentage(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSummary {
    pub side: PositionSide,
    pub quantity: Size,
    pub entry_price: Option<Price>,
    pub opened_at: Option<u64>,
    pub value: Decimal,
    pub pnl: Decimal,
    pub pnl_percentage: Decimal,
}
