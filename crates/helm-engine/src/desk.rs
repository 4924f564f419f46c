//! Intent handling between the strategy and the venue.
//!
//! The desk owns the order builder, the cancellation coordinator, armed
//! exits and the venue outbox for one instrument. Every venue command goes
//! through [`OrderDesk::emit`] so the outbox and the order metrics agree.

use helm_core::{
    FillEvent, InstrumentId, OrderId, OrderPurpose, OrderRequest, StepContext, VenueCommand,
};
use helm_orders::{
    validate, CancellationCoordinator, Exposure, FillRecord, Leg, OrderError, OrderIntent,
    OrderSetBuilder,
};
use helm_position::Position;
use helm_telemetry::Metrics;
use tracing::{debug, warn};

use crate::error::EngineResult;

fn exposure_of(position: &Position) -> Exposure {
    Exposure::new(position.side, position.quantity)
}

#[derive(Debug)]
pub struct OrderDesk {
    instrument: InstrumentId,
    builder: OrderSetBuilder,
    coordinator: CancellationCoordinator,
    /// Exits declared while flat, waiting for the entry to cover them.
    armed: Vec<OrderIntent>,
    outbox: Vec<VenueCommand>,
}

impl OrderDesk {
    pub fn new(instrument: InstrumentId, should_cancel_entry: bool) -> Self {
        Self {
            builder: OrderSetBuilder::new(instrument.clone()),
            coordinator: CancellationCoordinator::new(instrument.clone(), should_cancel_entry),
            instrument,
            armed: Vec::new(),
            outbox: Vec::new(),
        }
    }

    pub fn coordinator(&self) -> &CancellationCoordinator {
        &self.coordinator
    }

    pub fn armed(&self) -> &[OrderIntent] {
        &self.armed
    }

    /// Exposure of the current (unfilled) entry orders.
    pub fn pending_entry(&self) -> Exposure {
        match self.coordinator.current(OrderPurpose::Entry).next() {
            Some(order) => Exposure::new(
                order.side.opens(),
                self.coordinator.current_quantity(OrderPurpose::Entry),
            ),
            None => Exposure::FLAT,
        }
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Validate and apply an intent against the committed position.
    pub fn declare(
        &mut self,
        intent: OrderIntent,
        position: &Position,
        step: &StepContext,
    ) -> EngineResult<()> {
        let purpose = intent.purpose;
        let result = self.apply_intent(intent, position, step);
        if let Err(err) = &result {
            warn!(
                instrument = %self.instrument,
                purpose = %purpose,
                error = %err,
                "Intent rejected"
            );
            Metrics::intent_rejected(self.instrument.as_str(), purpose.as_str());
        }
        result
    }

    fn apply_intent(
        &mut self,
        intent: OrderIntent,
        position: &Position,
        step: &StepContext,
    ) -> EngineResult<()> {
        match intent.purpose {
            OrderPurpose::Entry => {
                let orders = self.builder.build(&intent, exposure_of(position), step)?;
                let commands = self.coordinator.replace(OrderPurpose::Entry, orders);
                self.emit(commands);
            }
            OrderPurpose::StopLoss | OrderPurpose::TakeProfit if !position.is_flat() => {
                let orders = self.builder.build(&intent, exposure_of(position), step)?;
                self.disarm(intent.purpose);
                let commands = self.coordinator.replace(intent.purpose, orders);
                self.emit(commands);
            }
            OrderPurpose::StopLoss | OrderPurpose::TakeProfit => {
                validate(&intent, self.pending_entry())?;
                debug!(
                    instrument = %self.instrument,
                    purpose = %intent.purpose,
                    quantity = %intent.total_quantity(),
                    "Exit armed until entry fills"
                );
                self.disarm(intent.purpose);
                self.armed.push(intent);
            }
            OrderPurpose::Liquidation => {
                return Err(OrderError::Configuration(
                    "liquidation orders are only built by liquidate".to_string(),
                )
                .into());
            }
        }
        Ok(())
    }

    /// Cancel every outstanding order and arm the all-canceled barrier.
    pub fn cancel_all(&mut self) {
        let commands = self.coordinator.cancel_all();
        self.emit(commands);
        self.discard_armed("cancel-all requested");
    }

    /// Cancel everything and close the position at market.
    ///
    /// Returns false (and does nothing) while flat.
    pub fn liquidate(&mut self, position: &Position, step: &StepContext) -> bool {
        let exposure = exposure_of(position);
        if exposure.side.is_flat() {
            debug!(instrument = %self.instrument, "Liquidate while flat, nothing to do");
            return false;
        }

        let cancels = self.coordinator.cancel_outstanding();
        self.emit(cancels);
        self.discard_armed("liquidation");

        if let Some(order) = self.builder.build_liquidation(exposure, step) {
            warn!(
                instrument = %self.instrument,
                side = %order.side,
                quantity = %order.quantity,
                "Liquidating position"
            );
            let commands = self.coordinator.track(vec![order]);
            self.emit(commands);
        }
        true
    }

    // ------------------------------------------------------------------
    // Venue events
    // ------------------------------------------------------------------

    pub fn record_fill(&mut self, fill: &FillEvent) -> EngineResult<FillRecord> {
        let record = self.coordinator.record_fill(fill)?;
        self.emit(record.cancels.clone());
        Ok(record)
    }

    pub fn confirm_cancel(&mut self, order_id: &OrderId) {
        self.coordinator.confirm_cancel(order_id);
    }

    pub fn reject(&mut self, order_id: &OrderId) {
        warn!(instrument = %self.instrument, order_id = %order_id, "Order rejected");
        self.coordinator.reject(order_id);
    }

    pub fn take_all_canceled(&mut self) -> bool {
        self.coordinator.take_all_canceled()
    }

    // ------------------------------------------------------------------
    // Position housekeeping
    // ------------------------------------------------------------------

    /// Position went flat: cancel the remaining bracket and drop armed exits.
    pub fn on_position_closed(&mut self) {
        let commands = self.coordinator.cancel_exits();
        self.emit(commands);
        self.discard_armed("position closed");
    }

    /// Shrink working exits that a reduction left larger than the position.
    ///
    /// Legs keep their submission order and price; the leg that crosses the
    /// open quantity is cut down and the ones after it are dropped.
    pub fn trim_exits(&mut self, position: &Position, step: &StepContext) {
        if position.is_flat() {
            return;
        }

        for purpose in [OrderPurpose::StopLoss, OrderPurpose::TakeProfit] {
            let working = self.coordinator.current_quantity(purpose);
            if working <= position.quantity {
                continue;
            }

            let mut budget = position.quantity;
            let mut legs = Vec::new();
            for order in self.coordinator.current(purpose) {
                if budget.is_zero() {
                    break;
                }
                let quantity = order.remaining_quantity().min(budget);
                legs.push(Leg::new(quantity, order.price));
                budget -= quantity;
            }
            debug!(
                instrument = %self.instrument,
                purpose = %purpose,
                working = %working,
                open = %position.quantity,
                "Trimming exits to open quantity"
            );

            let intent = OrderIntent::new(purpose, position.side, legs);
            match self.builder.build(&intent, exposure_of(position), step) {
                Ok(orders) => {
                    let commands = self.coordinator.replace(purpose, orders);
                    self.emit(commands);
                }
                Err(err) => {
                    warn!(
                        instrument = %self.instrument,
                        purpose = %purpose,
                        error = %err,
                        "Trimmed exit failed to build, canceling"
                    );
                    let commands = self.coordinator.cancel_purpose(purpose);
                    self.emit(commands);
                }
            }
        }
    }

    /// Build armed exits whose leg sum the open quantity now covers.
    pub fn build_covered_exits(&mut self, position: &Position, step: &StepContext) {
        if position.is_flat() || self.armed.is_empty() {
            return;
        }

        for intent in std::mem::take(&mut self.armed) {
            if intent.side != position.side {
                warn!(
                    instrument = %self.instrument,
                    purpose = %intent.purpose,
                    side = %intent.side,
                    position = %position.side,
                    "Armed exit side no longer matches position, discarding"
                );
                continue;
            }
            if intent.total_quantity() > position.quantity {
                self.armed.push(intent);
                continue;
            }
            match self.builder.build(&intent, exposure_of(position), step) {
                Ok(orders) => {
                    debug!(
                        instrument = %self.instrument,
                        purpose = %intent.purpose,
                        legs = orders.len(),
                        "Armed exit placed"
                    );
                    let commands = self.coordinator.replace(intent.purpose, orders);
                    self.emit(commands);
                }
                Err(err) => {
                    warn!(
                        instrument = %self.instrument,
                        purpose = %intent.purpose,
                        error = %err,
                        "Armed exit failed to build, discarding"
                    );
                }
            }
        }
    }

    /// Drop armed exits once no entry order is left to cover them.
    pub fn settle_armed(&mut self) {
        if self.armed.is_empty() {
            return;
        }
        let entry_working = self
            .coordinator
            .outstanding()
            .iter()
            .any(|o| o.purpose == OrderPurpose::Entry);
        if !entry_working {
            self.discard_armed("entry finished without covering armed exit");
        }
    }

    fn disarm(&mut self, purpose: OrderPurpose) {
        self.armed.retain(|i| i.purpose != purpose);
    }

    fn discard_armed(&mut self, reason: &str) {
        for intent in self.armed.drain(..) {
            warn!(
                instrument = %self.instrument,
                purpose = %intent.purpose,
                quantity = %intent.total_quantity(),
                reason,
                "Armed exit discarded"
            );
        }
    }

    // ------------------------------------------------------------------
    // Outbox
    // ------------------------------------------------------------------

    fn emit(&mut self, commands: Vec<VenueCommand>) {
        for command in commands {
            match &command {
                VenueCommand::Submit(order) => Metrics::order_submitted(
                    self.instrument.as_str(),
                    order.purpose.as_str(),
                    order.order_type.as_str(),
                ),
                VenueCommand::Cancel { .. } => Metrics::cancel_requested(self.instrument.as_str()),
            }
            self.outbox.push(command);
        }
    }

    pub fn drain(&mut self) -> Vec<VenueCommand> {
        std::mem::take(&mut self.outbox)
    }

    pub fn outstanding(&self) -> &[OrderRequest] {
        self.coordinator.outstanding()
    }
}
