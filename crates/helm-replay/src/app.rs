//! Scenario runner.
//!
//! Drives a synchronous [`InstrumentEngine`] against the simulated venue.
//! Each step runs in a fixed order:
//! 1. cancel confirmations queued by the previous step,
//! 2. scripted actions,
//! 3. fills, one at a time, until the tick triggers nothing more.
//!
//! Venue commands are routed back to the venue after every engine call, so
//! a sibling cancel emitted by one fill is in effect before the next match.

use tracing::{debug, info, warn};

use helm_core::{FillEvent, StepContext, VenueCommand};
use helm_engine::{EngineResult, FillOutcome, Hook, InstrumentEngine, StepReport};
use helm_orders::OrderIntent;
use helm_position::ClosedTrade;

use crate::config::{Action, ReplayConfig};
use crate::error::{ReplayError, ReplayResult};
use crate::report::{ReplayReport, TimelineEntry};
use crate::strategy::LoggingStrategy;
use crate::venue::SimulatedVenue;

/// Upper bound on fills within one step.
pub const MAX_FILLS_PER_STEP: usize = 256;

pub struct ReplayRunner {
    engine: InstrumentEngine<LoggingStrategy>,
    venue: SimulatedVenue,
    timeline: Vec<TimelineEntry>,
    closed_trades: Vec<ClosedTrade>,
}

impl ReplayRunner {
    pub fn new(config: &ReplayConfig) -> Self {
        Self {
            engine: InstrumentEngine::new(
                config.instrument.clone(),
                config.engine.clone(),
                LoggingStrategy::new(config.strategy.clone()),
            ),
            venue: SimulatedVenue::new(config.instrument.clone()),
            timeline: Vec::new(),
            closed_trades: Vec::new(),
        }
    }

    pub fn engine(&self) -> &InstrumentEngine<LoggingStrategy> {
        &self.engine
    }

    pub fn venue(&self) -> &SimulatedVenue {
        &self.venue
    }

    /// Process one scenario step.
    pub fn step(&mut self, step: &StepContext, actions: &[Action]) -> ReplayResult<()> {
        debug!(
            timestamp_ms = step.timestamp_ms,
            price = %step.reference_price,
            actions = actions.len(),
            "Replay step"
        );

        for confirmation in self.venue.take_cancel_confirmations(step.timestamp_ms) {
            self.timeline.push(TimelineEntry::CancelConfirmed {
                timestamp_ms: step.timestamp_ms,
                order_id: confirmation.order_id.clone(),
            });
            let report = self.engine.on_cancel_confirmed(&confirmation, step);
            self.record_report(step.timestamp_ms, report);
            self.route(step);
        }

        for action in actions {
            self.apply_action(step, action)?;
            self.route(step);
        }

        let mut fills = 0;
        while let Some(fill) = self.venue.next_fill(step) {
            fills += 1;
            if fills > MAX_FILLS_PER_STEP {
                return Err(ReplayError::Runaway {
                    timestamp_ms: step.timestamp_ms,
                    fills: MAX_FILLS_PER_STEP,
                });
            }
            let outcome = self.engine.on_fill(&fill, step)?;
            self.record_fill(&fill, outcome);
            self.route(step);
        }
        Ok(())
    }

    pub fn finish(self, steps: usize, last: &StepContext) -> ReplayReport {
        let ledger = self.engine.ledger();
        ReplayReport {
            instrument: self.engine.instrument().clone(),
            steps,
            final_position: self.engine.view(last).summary(),
            outstanding: self.engine.outstanding().to_vec(),
            closed_trades: self.closed_trades,
            total_realized_pnl: ledger.total_realized_pnl(),
            total_fees: ledger.total_fees(),
            timeline: self.timeline,
        }
    }

    fn apply_action(&mut self, step: &StepContext, action: &Action) -> ReplayResult<()> {
        let (result, report): (EngineResult<()>, StepReport) =
            self.engine.with_context(step, |ctx| match action {
                Action::Entry { side, legs } => ctx.set_entry(*side, legs.clone()),
                Action::StopLoss {
                    side: Some(side),
                    legs,
                } => ctx.declare(OrderIntent::stop_loss(*side, legs.clone())),
                Action::StopLoss { side: None, legs } => ctx.set_stop_loss(legs.clone()),
                Action::TakeProfit {
                    side: Some(side),
                    legs,
                } => ctx.declare(OrderIntent::take_profit(*side, legs.clone())),
                Action::TakeProfit { side: None, legs } => ctx.set_take_profit(legs.clone()),
                Action::CancelAll => {
                    ctx.cancel_all();
                    Ok(())
                }
                Action::Liquidate => {
                    if !ctx.liquidate() {
                        debug!("Liquidate requested while flat");
                    }
                    Ok(())
                }
            });
        self.record_report(step.timestamp_ms, report);

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.is_intent_error() => {
                warn!(action = action.name(), error = %e, "Scripted action rejected");
                self.timeline.push(TimelineEntry::IntentRejected {
                    timestamp_ms: step.timestamp_ms,
                    action: action.name(),
                    reason: e.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn route(&mut self, step: &StepContext) {
        for command in self.engine.drain_commands() {
            let entry = match &command {
                VenueCommand::Submit(order) => TimelineEntry::Submitted {
                    timestamp_ms: step.timestamp_ms,
                    order_id: order.id.clone(),
                    purpose: order.purpose,
                    order_type: order.order_type,
                    side: order.side,
                    quantity: order.quantity,
                    price: order.price,
                },
                VenueCommand::Cancel { order_id, .. } => TimelineEntry::CancelRequested {
                    timestamp_ms: step.timestamp_ms,
                    order_id: order_id.clone(),
                },
            };
            self.timeline.push(entry);
            self.venue.apply(command);
        }
    }

    fn record_fill(&mut self, fill: &FillEvent, outcome: FillOutcome) {
        self.timeline.push(TimelineEntry::Filled {
            timestamp_ms: fill.timestamp_ms,
            order_id: fill.order_id.clone(),
            purpose: outcome.order.purpose,
            quantity: fill.quantity,
            price: fill.price,
            executed_at: fill.executed_at(),
        });
        for event in &outcome.events {
            if let Some(trade) = &event.delta.closed_trade {
                self.closed_trades.push(trade.clone());
            }
            self.timeline.push(TimelineEntry::Hook {
                timestamp_ms: fill.timestamp_ms,
                hook: Hook::for_transition(event.transition),
                order_id: Some(event.order.id.clone()),
                side: event.delta.after.side,
                quantity: event.delta.after.quantity,
            });
        }
        self.record_report(
            fill.timestamp_ms,
            StepReport {
                faults: outcome.faults,
                all_canceled: outcome.all_canceled,
            },
        );
    }

    fn record_report(&mut self, timestamp_ms: u64, report: StepReport) {
        if report.all_canceled {
            let position = self.engine.position();
            self.timeline.push(TimelineEntry::Hook {
                timestamp_ms,
                hook: Hook::OnAllCanceled,
                order_id: None,
                side: position.side,
                quantity: position.quantity,
            });
        }
        for fault in report.faults {
            self.timeline.push(TimelineEntry::HookFault {
                timestamp_ms,
                hook: fault.hook,
                message: fault.message,
            });
        }
    }
}

/// Replay a whole scenario.
pub fn run_scenario(config: &ReplayConfig) -> ReplayResult<ReplayReport> {
    info!(
        instrument = %config.instrument,
        steps = config.steps.len(),
        "Starting replay"
    );

    let mut runner = ReplayRunner::new(config);
    let mut last = None;
    for scenario_step in &config.steps {
        let step = StepContext::new(scenario_step.price, scenario_step.timestamp_ms)?;
        runner.step(&step, &scenario_step.actions)?;
        last = Some(step);
    }
    let last = last.ok_or_else(|| ReplayError::Config("scenario has no steps".to_string()))?;

    let report = runner.finish(config.steps.len(), &last);
    info!(
        instrument = %report.instrument,
        closed_trades = report.closed_trades.len(),
        total_realized_pnl = %report.total_realized_pnl,
        total_fees = %report.total_fees,
        "Replay finished"
    );
    Ok(report)
}
