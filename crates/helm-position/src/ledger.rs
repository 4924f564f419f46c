//! Position ledger for a single instrument.
//!
//! The ledger is the only writer of [`Position`]. A fill is first cut into
//! slices by [`PositionLedger::split`], then each slice is committed by
//! [`PositionLedger::apply_slice`] and yields one [`LedgerDelta`]. A fill
//! that crosses through zero becomes two slices: the close of the existing
//! exposure, then the open of the remainder. Callers that react between the
//! two see the flat state in between.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use helm_core::{
    FillEvent, InstrumentId, OrderPurpose, OrderRequest, OrderSide, PositionSide, Price, Size,
};

use crate::error::{PositionError, PositionResult};

// ============================================================================
// Position
// ============================================================================

/// Committed exposure in one instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub side: PositionSide,
    /// Magnitude of exposure. Zero exactly when `side` is flat.
    pub quantity: Size,
    /// Volume-weighted entry price. `None` while flat.
    pub entry_price: Option<Price>,
    /// Timestamp of the fill that opened the position (Unix ms).
    pub opened_at: Option<u64>,
    /// Gross PnL realized by reductions since the position opened.
    pub realized_pnl: Decimal,
    /// Fees charged since the position opened.
    pub fees: Decimal,
    /// Timestamp of the last applied fill (Unix ms).
    pub last_update_ms: u64,
}

impl Position {
    #[must_use]
    pub fn flat(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            side: PositionSide::Flat,
            quantity: Size::ZERO,
            entry_price: None,
            opened_at: None,
            realized_pnl: Decimal::ZERO,
            fees: Decimal::ZERO,
            last_update_ms: 0,
        }
    }

    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.side.is_flat()
    }

    /// Mark-to-market PnL of the open quantity at `reference`.
    #[must_use]
    pub fn unrealized_pnl(&self, reference: Price) -> Decimal {
        match self.entry_price {
            Some(entry) => reference.diff(entry) * self.quantity.inner() * self.side.sign(),
            None => Decimal::ZERO,
        }
    }

    fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
        }
    }
}

/// The (side, quantity, entry) triple reported before and after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub side: PositionSide,
    pub quantity: Size,
    pub entry_price: Option<Price>,
}

// ============================================================================
// Deltas
// ============================================================================

/// Classification of one ledger transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Opened,
    Increased,
    Reduced,
    Closed,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Increased => "increased",
            Self::Reduced => "reduced",
            Self::Closed => "closed",
        }
    }
}

/// Summary of a position from open to flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub instrument: InstrumentId,
    pub side: PositionSide,
    /// Largest quantity held during the trade.
    pub peak_quantity: Size,
    pub entry_price: Price,
    /// Quantity-weighted average of all reducing fills.
    pub exit_price: Price,
    /// Gross realized PnL.
    pub realized_pnl: Decimal,
    pub fees: Decimal,
    pub opened_at: u64,
    pub closed_at: u64,
    /// Purpose of the order whose fill closed the position.
    pub close_purpose: OrderPurpose,
}

impl ClosedTrade {
    /// Realized PnL after fees.
    #[must_use]
    pub fn net_pnl(&self) -> Decimal {
        self.realized_pnl - self.fees
    }
}

/// One transition produced by applying (part of) a fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub transition: Transition,
    pub before: PositionSnapshot,
    pub after: PositionSnapshot,
    /// Portion of the fill consumed by this transition.
    pub quantity: Size,
    pub price: Price,
    /// Realized PnL booked by this transition (zero for opens and increases).
    pub realized_pnl: Decimal,
    pub fee: Decimal,
    /// Present only on `Closed`.
    pub closed_trade: Option<ClosedTrade>,
}

// ============================================================================
// LedgerFill
// ============================================================================

/// Fill as seen by the ledger: the venue report joined with its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerFill {
    pub side: OrderSide,
    pub quantity: Size,
    pub price: Price,
    pub timestamp_ms: u64,
    pub purpose: OrderPurpose,
}

impl LedgerFill {
    pub fn new(
        side: OrderSide,
        quantity: Size,
        price: Price,
        timestamp_ms: u64,
        purpose: OrderPurpose,
    ) -> Self {
        Self {
            side,
            quantity,
            price,
            timestamp_ms,
            purpose,
        }
    }

    pub fn from_order(order: &OrderRequest, fill: &FillEvent) -> Self {
        Self::new(
            order.side,
            fill.quantity,
            fill.price,
            fill.timestamp_ms,
            order.purpose,
        )
    }

    /// Same fill, different quantity.
    #[must_use]
    pub fn with_quantity(self, quantity: Size) -> Self {
        Self { quantity, ..self }
    }
}

// ============================================================================
// PositionLedger
// ============================================================================

/// Closed trades kept for inspection. Older ones are dropped.
pub const CLOSED_TRADE_CAPACITY: usize = 64;

/// Running trade statistics since the position last left flat.
#[derive(Debug, Clone, Default)]
struct TradeAccumulator {
    peak_quantity: Size,
    exit_quantity: Size,
    exit_notional: Decimal,
}

/// Values one slice will commit, computed with overflow checks.
#[derive(Debug, Clone, Copy)]
struct SlicePlan {
    notional: Decimal,
    fee: Decimal,
    realized_pnl: Decimal,
    entry_price: Option<Price>,
}

fn checked(value: Option<Decimal>, what: &str) -> PositionResult<Decimal> {
    value.ok_or_else(|| PositionError::InvalidFill(format!("{what} overflows")))
}

/// Authoritative position state for one instrument.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    position: Position,
    fee_rate: Decimal,
    /// Fill slices applied since the last flat state.
    history: Vec<(OrderSide, Size)>,
    trade: TradeAccumulator,
    total_realized_pnl: Decimal,
    total_fees: Decimal,
    recent_trades: VecDeque<ClosedTrade>,
    closed_trade_count: u64,
}

impl PositionLedger {
    pub fn new(instrument: InstrumentId, fee_rate: Decimal) -> Self {
        Self {
            position: Position::flat(instrument),
            fee_rate,
            history: Vec::new(),
            trade: TradeAccumulator::default(),
            total_realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            recent_trades: VecDeque::with_capacity(CLOSED_TRADE_CAPACITY),
            closed_trade_count: 0,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.position.instrument
    }

    /// Gross realized PnL across every trade, including the open one.
    pub fn total_realized_pnl(&self) -> Decimal {
        self.total_realized_pnl
    }

    pub fn total_fees(&self) -> Decimal {
        self.total_fees
    }

    /// The most recent closed trades, oldest first, at most
    /// [`CLOSED_TRADE_CAPACITY`] of them.
    pub fn recent_trades(&self) -> &VecDeque<ClosedTrade> {
        &self.recent_trades
    }

    pub fn last_closed_trade(&self) -> Option<&ClosedTrade> {
        self.recent_trades.back()
    }

    /// Trades closed since the ledger was created.
    pub fn closed_trade_count(&self) -> u64 {
        self.closed_trade_count
    }

    /// Signed quantity folded from the fill history since the last flat state.
    pub fn history_quantity(&self) -> Decimal {
        self.history
            .iter()
            .map(|(side, qty)| side.opens().sign() * qty.inner())
            .sum()
    }

    /// How much a fill on `side` can take off the position without
    /// opening exposure on the other side.
    pub fn exit_capacity(&self, side: OrderSide) -> Size {
        if self.position.is_flat() || side.opens() == self.position.side {
            Size::ZERO
        } else {
            self.position.quantity
        }
    }

    /// Cut a fill into the slices the ledger commits one at a time.
    ///
    /// A fill that crosses through zero becomes the close of the existing
    /// exposure followed by the open of the remainder. Nothing is committed
    /// here; invalid fills fail before any slice is applied.
    pub fn split(&self, fill: LedgerFill) -> PositionResult<Vec<LedgerFill>> {
        if !fill.quantity.is_positive() {
            return Err(PositionError::InvalidFill(format!(
                "quantity must be positive, got {}",
                fill.quantity
            )));
        }
        if !fill.price.is_positive() {
            return Err(PositionError::InvalidFill(format!(
                "price must be positive, got {}",
                fill.price
            )));
        }

        // Fees for the whole fill bound the fees of every slice.
        let notional = checked(fill.quantity.checked_notional(fill.price), "fill notional")?;
        let fee = checked(notional.checked_mul(self.fee_rate), "fee")?;
        checked(self.total_fees.checked_add(fee), "total fees")?;

        let held = self.position.quantity;
        let crosses = self.exit_capacity(fill.side).is_positive() && fill.quantity > held;
        let slices = if crosses {
            vec![
                fill.with_quantity(held),
                fill.with_quantity(fill.quantity - held),
            ]
        } else {
            vec![fill]
        };
        self.plan(&slices[0])?;
        Ok(slices)
    }

    /// Apply a fill slice by slice and return every transition, in order.
    pub fn apply_fill(&mut self, fill: LedgerFill) -> PositionResult<Vec<LedgerDelta>> {
        self.split(fill)?
            .into_iter()
            .map(|slice| self.apply_slice(slice))
            .collect()
    }

    /// Commit one slice and return its transition.
    ///
    /// A slice never crosses zero. Invalid slices are rejected without
    /// touching state.
    pub fn apply_slice(&mut self, slice: LedgerFill) -> PositionResult<LedgerDelta> {
        if !slice.quantity.is_positive() || !slice.price.is_positive() {
            return Err(PositionError::InvalidFill(format!(
                "slice needs positive quantity and price, got {} @ {}",
                slice.quantity, slice.price
            )));
        }
        let plan = self.plan(&slice)?;

        trace!(
            instrument = %self.position.instrument,
            side = ?slice.side,
            quantity = %slice.quantity,
            price = %slice.price,
            "Applying fill slice"
        );

        let held = self.position.quantity;
        let delta = match self.position.side {
            PositionSide::Flat => self.open(slice, plan),
            side if side == slice.side.opens() => self.increase(slice, plan),
            _ if slice.quantity < held => self.reduce(slice, plan),
            _ => self.close(slice, plan),
        };
        self.position.last_update_ms = slice.timestamp_ms;
        Ok(delta)
    }

    fn plan(&self, slice: &LedgerFill) -> PositionResult<SlicePlan> {
        let notional = checked(slice.quantity.checked_notional(slice.price), "fill notional")?;
        let fee = checked(notional.checked_mul(self.fee_rate), "fee")?;
        checked(self.total_fees.checked_add(fee), "total fees")?;
        checked(self.position.fees.checked_add(fee), "position fees")?;

        let mut plan = SlicePlan {
            notional,
            fee,
            realized_pnl: Decimal::ZERO,
            entry_price: self.position.entry_price,
        };
        match self.position.side {
            PositionSide::Flat => plan.entry_price = Some(slice.price),
            side if side == slice.side.opens() => {
                // New average entry = (old_size * old_price + fill_size * fill_price) / new_size
                let old_notional = match self.position.entry_price {
                    Some(entry) => checked(
                        self.position.quantity.checked_notional(entry),
                        "position notional",
                    )?,
                    None => Decimal::ZERO,
                };
                let new_size = checked(
                    self.position.quantity.inner().checked_add(slice.quantity.inner()),
                    "position quantity",
                )?;
                let total = checked(old_notional.checked_add(notional), "position notional")?;
                plan.entry_price = Some(Price::new(checked(
                    total.checked_div(new_size),
                    "entry price",
                )?));
            }
            side => {
                if slice.quantity > self.position.quantity {
                    return Err(PositionError::InvalidFill(format!(
                        "slice of {} crosses zero with {} held",
                        slice.quantity, self.position.quantity
                    )));
                }
                let entry = self.position.entry_price.unwrap_or(slice.price);
                let pnl = checked(
                    slice.price.diff(entry).checked_mul(slice.quantity.inner()),
                    "realized pnl",
                )? * side.sign();
                checked(self.total_realized_pnl.checked_add(pnl), "total realized pnl")?;
                checked(self.position.realized_pnl.checked_add(pnl), "realized pnl")?;
                checked(self.trade.exit_notional.checked_add(notional), "exit notional")?;
                plan.realized_pnl = pnl;
            }
        }
        Ok(plan)
    }

    fn charge(&mut self, plan: SlicePlan) {
        self.position.fees += plan.fee;
        self.total_fees += plan.fee;
    }

    fn open(&mut self, slice: LedgerFill, plan: SlicePlan) -> LedgerDelta {
        let before = self.position.snapshot();
        self.charge(plan);

        self.position.side = slice.side.opens();
        self.position.quantity = slice.quantity;
        self.position.entry_price = plan.entry_price;
        self.position.opened_at = Some(slice.timestamp_ms);
        self.history.push((slice.side, slice.quantity));
        self.trade = TradeAccumulator {
            peak_quantity: slice.quantity,
            ..TradeAccumulator::default()
        };

        debug!(
            instrument = %self.position.instrument,
            side = ?self.position.side,
            quantity = %slice.quantity,
            entry = %slice.price,
            "Position opened"
        );

        LedgerDelta {
            transition: Transition::Opened,
            before,
            after: self.position.snapshot(),
            quantity: slice.quantity,
            price: slice.price,
            realized_pnl: Decimal::ZERO,
            fee: plan.fee,
            closed_trade: None,
        }
    }

    fn increase(&mut self, slice: LedgerFill, plan: SlicePlan) -> LedgerDelta {
        let before = self.position.snapshot();
        self.charge(plan);

        self.position.entry_price = plan.entry_price;
        self.position.quantity += slice.quantity;
        self.history.push((slice.side, slice.quantity));
        if self.position.quantity > self.trade.peak_quantity {
            self.trade.peak_quantity = self.position.quantity;
        }

        LedgerDelta {
            transition: Transition::Increased,
            before,
            after: self.position.snapshot(),
            quantity: slice.quantity,
            price: slice.price,
            realized_pnl: Decimal::ZERO,
            fee: plan.fee,
            closed_trade: None,
        }
    }

    /// Book PnL for a slice leaving the position.
    fn realize(&mut self, slice: &LedgerFill, plan: SlicePlan) {
        self.position.realized_pnl += plan.realized_pnl;
        self.total_realized_pnl += plan.realized_pnl;
        self.trade.exit_quantity += slice.quantity;
        self.trade.exit_notional += plan.notional;
    }

    fn reduce(&mut self, slice: LedgerFill, plan: SlicePlan) -> LedgerDelta {
        let before = self.position.snapshot();
        self.charge(plan);
        self.realize(&slice, plan);

        self.position.quantity -= slice.quantity;
        self.history.push((slice.side, slice.quantity));

        LedgerDelta {
            transition: Transition::Reduced,
            before,
            after: self.position.snapshot(),
            quantity: slice.quantity,
            price: slice.price,
            realized_pnl: plan.realized_pnl,
            fee: plan.fee,
            closed_trade: None,
        }
    }

    fn close(&mut self, slice: LedgerFill, plan: SlicePlan) -> LedgerDelta {
        let before = self.position.snapshot();
        self.charge(plan);
        self.realize(&slice, plan);

        let exit_price = Price::new(
            self.trade
                .exit_notional
                .checked_div(self.trade.exit_quantity.inner())
                .unwrap_or(slice.price.inner()),
        );
        let closed_trade = ClosedTrade {
            instrument: self.position.instrument.clone(),
            side: self.position.side,
            peak_quantity: self.trade.peak_quantity,
            entry_price: self.position.entry_price.unwrap_or(slice.price),
            exit_price,
            realized_pnl: self.position.realized_pnl,
            fees: self.position.fees,
            opened_at: self.position.opened_at.unwrap_or(slice.timestamp_ms),
            closed_at: slice.timestamp_ms,
            close_purpose: slice.purpose,
        };

        debug!(
            instrument = %self.position.instrument,
            side = ?closed_trade.side,
            realized_pnl = %closed_trade.realized_pnl,
            fees = %closed_trade.fees,
            "Position closed"
        );

        let instrument = self.position.instrument.clone();
        self.position = Position::flat(instrument);
        self.history.clear();
        self.trade = TradeAccumulator::default();
        if self.recent_trades.len() == CLOSED_TRADE_CAPACITY {
            self.recent_trades.pop_front();
        }
        self.recent_trades.push_back(closed_trade.clone());
        self.closed_trade_count += 1;

        LedgerDelta {
            transition: Transition::Closed,
            before,
            after: self.position.snapshot(),
            quantity: slice.quantity,
            price: slice.price,
            realized_pnl: plan.realized_pnl,
            fee: plan.fee,
            closed_trade: Some(closed_trade),
        }
    }
}
