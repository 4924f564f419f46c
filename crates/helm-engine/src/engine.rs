//! Per-instrument execution engine.
//!
//! Processing order for one fill:
//! 1. The coordinator checks the fill against its order. Unknown, terminal
//!    and oversized fills stop here and touch nothing.
//! 2. The ledger cuts the fill into slices. Exit fills are clamped to the
//!    open quantity first, so they never open exposure.
//!    Only then is the fill recorded against the order.
//! 3. For each slice, in order: the ledger commits it, housekeeping runs
//!    (close cancels the bracket, reduce trims oversized exits, opens and
//!    increases place covered armed exits), then the one matching hook sees
//!    the state committed so far.
//! 4. Armed exits with no entry left are discarded and a cleared cancel-all
//!    barrier fires `on_all_canceled`.
//!
//! All methods take `&mut self`; one engine is never driven concurrently.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use helm_core::{
    CancelConfirmation, FillEvent, InstrumentId, OrderId, OrderRequest, StepContext, VenueCommand,
};
use helm_orders::OrderIntent;
use helm_position::{ClosedTrade, LedgerFill, Position, PositionLedger, PositionView, Transition};
use helm_telemetry::Metrics;

use crate::config::EngineConfig;
use crate::context::StrategyContext;
use crate::desk::OrderDesk;
use crate::dispatcher::{HookFault, LifecycleDispatcher, LifecycleState};
use crate::error::EngineResult;
use crate::strategy::{LifecycleEvent, Strategy};

/// Everything one fill caused.
#[derive(Debug, Clone, Serialize)]
pub struct FillOutcome {
    /// The filled order after the fill was recorded.
    pub order: OrderRequest,
    /// Dispatched transitions, in order.
    pub events: Vec<LifecycleEvent>,
    pub faults: Vec<HookFault>,
    /// True when this fill cleared a cancel-all barrier.
    pub all_canceled: bool,
}

impl FillOutcome {
    pub fn transitions(&self) -> Vec<Transition> {
        self.events.iter().map(|e| e.transition).collect()
    }
}

/// Result of a step that is not a fill.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub faults: Vec<HookFault>,
    pub all_canceled: bool,
}

/// Point-in-time copy of engine state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub instrument: InstrumentId,
    pub position: Position,
    pub lifecycle: LifecycleState,
    pub outstanding: Vec<OrderRequest>,
    pub armed: Vec<OrderIntent>,
    pub total_realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub closed_trade_count: u64,
    pub last_closed_trade: Option<ClosedTrade>,
}

impl EngineSnapshot {
    pub fn empty(instrument: InstrumentId) -> Self {
        Self {
            position: Position::flat(instrument.clone()),
            instrument,
            lifecycle: LifecycleState::Flat,
            outstanding: Vec::new(),
            armed: Vec::new(),
            total_realized_pnl: Decimal::ZERO,
            total_fees: Decimal::ZERO,
            closed_trade_count: 0,
            last_closed_trade: None,
        }
    }
}

pub struct InstrumentEngine<S> {
    instrument: InstrumentId,
    config: EngineConfig,
    ledger: PositionLedger,
    desk: OrderDesk,
    dispatcher: LifecycleDispatcher,
    strategy: S,
}

impl<S: Strategy> InstrumentEngine<S> {
    pub fn new(instrument: InstrumentId, config: EngineConfig, strategy: S) -> Self {
        Self {
            ledger: PositionLedger::new(instrument.clone(), config.fee_rate),
            desk: OrderDesk::new(instrument.clone(), config.should_cancel_entry),
            dispatcher: LifecycleDispatcher::new(instrument.clone()),
            instrument,
            config,
            strategy,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn position(&self) -> &Position {
        self.ledger.position()
    }

    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    pub fn view(&self, step: &StepContext) -> PositionView<'_> {
        PositionView::new(
            self.ledger.position(),
            step.reference_price,
            self.config.leverage,
        )
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.dispatcher.state()
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn strategy_mut(&mut self) -> &mut S {
        &mut self.strategy
    }

    /// Non-terminal orders in submission order.
    pub fn outstanding(&self) -> &[OrderRequest] {
        self.desk.outstanding()
    }

    /// Look up an order, outstanding or archived.
    pub fn order(&self, order_id: &OrderId) -> Option<&OrderRequest> {
        self.desk.coordinator().get(order_id)
    }

    pub fn armed(&self) -> &[OrderIntent] {
        self.desk.armed()
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    pub fn declare(&mut self, intent: OrderIntent, step: &StepContext) -> EngineResult<()> {
        self.desk.declare(intent, self.ledger.position(), step)
    }

    /// Run `f` against a strategy context outside of any hook.
    pub fn with_context<R>(
        &mut self,
        step: &StepContext,
        f: impl FnOnce(&mut StrategyContext<'_>) -> R,
    ) -> (R, StepReport) {
        let out = {
            let mut ctx = StrategyContext::new(
                &mut self.desk,
                self.ledger.position(),
                step,
                self.config.leverage,
            );
            f(&mut ctx)
        };
        (out, self.finish_step(step))
    }

    pub fn cancel_all(&mut self, step: &StepContext) -> StepReport {
        self.desk.cancel_all();
        self.finish_step(step)
    }

    pub fn liquidate(&mut self, step: &StepContext) -> bool {
        self.desk.liquidate(self.ledger.position(), step)
    }

    // ------------------------------------------------------------------
    // Venue events
    // ------------------------------------------------------------------

    pub fn on_fill(&mut self, fill: &FillEvent, step: &StepContext) -> EngineResult<FillOutcome> {
        // Nothing is recorded until both the order and the ledger accept it.
        let order = self.desk.coordinator().check_fill(fill)?;
        let slices = ledger_slices(&self.ledger, order, fill)?;
        let record = self.desk.record_fill(fill)?;
        Metrics::fill_applied(self.instrument.as_str(), record.order.purpose.as_str());

        let mut events = Vec::with_capacity(slices.len());
        let mut faults = Vec::new();
        for slice in slices {
            let delta = self.ledger.apply_slice(slice)?;
            let position = self.ledger.position();
            Metrics::position_quantity(
                self.instrument.as_str(),
                (position.side.sign() * position.quantity.inner())
                    .to_f64()
                    .unwrap_or_default(),
            );

            match delta.transition {
                Transition::Opened => {
                    info!(
                        instrument = %self.instrument,
                        side = %delta.after.side,
                        quantity = %delta.after.quantity,
                        price = %delta.price,
                        "Position opened"
                    );
                    self.desk.build_covered_exits(self.ledger.position(), step);
                }
                Transition::Increased => {
                    self.desk.build_covered_exits(self.ledger.position(), step);
                }
                Transition::Reduced => {
                    self.desk.trim_exits(self.ledger.position(), step);
                }
                Transition::Closed => {
                    self.desk.on_position_closed();
                    if let Some(trade) = &delta.closed_trade {
                        info!(
                            instrument = %self.instrument,
                            side = %trade.side,
                            close_purpose = %trade.close_purpose,
                            realized_pnl = %trade.realized_pnl,
                            fees = %trade.fees,
                            "Position closed"
                        );
                        Metrics::trade_closed(
                            self.instrument.as_str(),
                            trade.close_purpose.as_str(),
                            trade.net_pnl().to_f64().unwrap_or_default(),
                        );
                    }
                }
            }

            let event = LifecycleEvent {
                transition: delta.transition,
                order: record.order.clone(),
                delta,
            };
            let mut ctx = StrategyContext::new(
                &mut self.desk,
                self.ledger.position(),
                step,
                self.config.leverage,
            );
            if let Some(fault) = self
                .dispatcher
                .dispatch(&mut self.strategy, &mut ctx, &event)
            {
                faults.push(fault);
            }
            events.push(event);
        }

        let report = self.finish_step(step);
        faults.extend(report.faults);
        Ok(FillOutcome {
            order: record.order,
            events,
            faults,
            all_canceled: report.all_canceled,
        })
    }

    pub fn on_cancel_confirmed(
        &mut self,
        confirmation: &CancelConfirmation,
        step: &StepContext,
    ) -> StepReport {
        self.desk.confirm_cancel(&confirmation.order_id);
        self.finish_step(step)
    }

    pub fn on_reject(&mut self, order_id: &OrderId, step: &StepContext) -> StepReport {
        self.desk.reject(order_id);
        self.finish_step(step)
    }

    fn finish_step(&mut self, step: &StepContext) -> StepReport {
        self.desk.settle_armed();

        let mut report = StepReport::default();
        if self.desk.take_all_canceled() {
            report.all_canceled = true;
            let mut ctx = StrategyContext::new(
                &mut self.desk,
                self.ledger.position(),
                step,
                self.config.leverage,
            );
            if let Some(fault) = self
                .dispatcher
                .dispatch_all_canceled(&mut self.strategy, &mut ctx)
            {
                report.faults.push(fault);
            }
        }
        report
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    /// Take the venue commands produced since the last drain.
    pub fn drain_commands(&mut self) -> Vec<VenueCommand> {
        self.desk.drain()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            instrument: self.instrument.clone(),
            position: self.ledger.position().clone(),
            lifecycle: self.dispatcher.state(),
            outstanding: self.desk.outstanding().to_vec(),
            armed: self.desk.armed().to_vec(),
            total_realized_pnl: self.ledger.total_realized_pnl(),
            total_fees: self.ledger.total_fees(),
            closed_trade_count: self.ledger.closed_trade_count(),
            last_closed_trade: self.ledger.last_closed_trade().cloned(),
        }
    }
}

/// Ledger slices for a venue fill of `order`.
///
/// Exit orders only ever take exposure off: a stop-loss, take-profit or
/// liquidation fill larger than the open quantity is clamped to it, and one
/// arriving while flat (or on the wrong side) reaches the ledger not at all.
fn ledger_slices(
    ledger: &PositionLedger,
    order: &OrderRequest,
    fill: &FillEvent,
) -> EngineResult<Vec<LedgerFill>> {
    let mut ledger_fill = LedgerFill::from_order(order, fill);
    if order.purpose.is_exit() {
        let capacity = ledger.exit_capacity(order.side);
        if ledger_fill.quantity > capacity {
            warn!(
                instrument = %ledger.instrument(),
                order_id = %order.id,
                purpose = %order.purpose,
                fill = %fill.quantity,
                open = %capacity,
                "Exit fill exceeds open quantity, clamping"
            );
            if capacity.is_zero() {
                return Ok(Vec::new());
            }
            ledger_fill = ledger_fill.with_quantity(capacity);
        }
    }
    Ok(ledger.split(ledger_fill)?)
}
