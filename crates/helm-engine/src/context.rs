//! Strategy-facing intent surface.

use rust_decimal::Decimal;

use helm_core::{InstrumentId, OrderPurpose, OrderRequest, PositionSide, Price, StepContext};
use helm_orders::{IntentLegs, OrderError, OrderIntent};
use helm_position::{Position, PositionView};

use crate::desk::OrderDesk;
use crate::error::EngineResult;

/// What strategy code sees during one processing step.
///
/// The position is the committed ledger state after the whole triggering
/// fill. Intents declared here are validated and built immediately; the
/// resulting venue commands join the engine's outbox.
pub struct StrategyContext<'a> {
    desk: &'a mut OrderDesk,
    position: &'a Position,
    step: &'a StepContext,
    leverage: Decimal,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        desk: &'a mut OrderDesk,
        position: &'a Position,
        step: &'a StepContext,
        leverage: Decimal,
    ) -> Self {
        Self {
            desk,
            position,
            step,
            leverage,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.position.instrument
    }

    pub fn position(&self) -> PositionView<'_> {
        PositionView::new(self.position, self.step.reference_price, self.leverage)
    }

    pub fn step(&self) -> &StepContext {
        self.step
    }

    pub fn reference_price(&self) -> Price {
        self.step.reference_price
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.step.timestamp_ms
    }

    /// Current orders of a purpose, excluding ones being canceled.
    pub fn orders(&self, purpose: OrderPurpose) -> impl Iterator<Item = &OrderRequest> {
        self.desk.coordinator().current(purpose)
    }

    pub fn declare(&mut self, intent: OrderIntent) -> EngineResult<()> {
        self.desk.declare(intent, self.position, self.step)
    }

    /// Replace the entry orders.
    pub fn set_entry(&mut self, side: PositionSide, legs: impl Into<IntentLegs>) -> EngineResult<()> {
        self.declare(OrderIntent::entry(side, legs))
    }

    /// Replace the stop-loss for the open or pending position.
    pub fn set_stop_loss(&mut self, legs: impl Into<IntentLegs>) -> EngineResult<()> {
        let side = self.protected_side()?;
        self.declare(OrderIntent::stop_loss(side, legs))
    }

    /// Replace the take-profit for the open or pending position.
    pub fn set_take_profit(&mut self, legs: impl Into<IntentLegs>) -> EngineResult<()> {
        let side = self.protected_side()?;
        self.declare(OrderIntent::take_profit(side, legs))
    }

    /// Cancel everything; `on_all_canceled` fires once all of it is terminal.
    pub fn cancel_all(&mut self) {
        self.desk.cancel_all();
    }

    /// Cancel everything and close at market. No-op while flat.
    pub fn liquidate(&mut self) -> bool {
        self.desk.liquidate(self.position, self.step)
    }

    fn protected_side(&self) -> EngineResult<PositionSide> {
        if !self.position.is_flat() {
            return Ok(self.position.side);
        }
        let pending = self.desk.pending_entry();
        if pending.side.is_flat() {
            return Err(OrderError::StateConflict(
                "no open or pending position to attach an exit to".to_string(),
            )
            .into());
        }
        Ok(pending.side)
    }
}
