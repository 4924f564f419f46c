//! In-memory venue for deterministic replay.
//!
//! Orders rest in submission order. A cancel pulls the order off the book
//! at once, but its confirmation is only delivered at the start of the next
//! step. Matching is tick-based and fills are always complete:
//!
//! | type   | buy fills when      | sell fills when     | fill price |
//! |--------|---------------------|---------------------|------------|
//! | market | always              | always              | tick       |
//! | limit  | tick <= price       | tick >= price       | order      |
//! | stop   | tick >= price       | tick <= price       | order      |

use std::collections::VecDeque;

use tracing::{debug, warn};

use helm_core::{
    CancelConfirmation, FillEvent, InstrumentId, OrderId, OrderRequest, OrderSide, OrderType,
    Price, StepContext, VenueCommand,
};

#[derive(Debug)]
pub struct SimulatedVenue {
    instrument: InstrumentId,
    resting: Vec<OrderRequest>,
    cancels: VecDeque<OrderId>,
}

impl SimulatedVenue {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            resting: Vec::new(),
            cancels: VecDeque::new(),
        }
    }

    pub fn resting(&self) -> &[OrderRequest] {
        &self.resting
    }

    /// Apply one command from the engine.
    pub fn apply(&mut self, command: VenueCommand) {
        match command {
            VenueCommand::Submit(order) => {
                if order.instrument != self.instrument {
                    warn!(
                        order_id = %order.id,
                        instrument = %order.instrument,
                        "Ignoring order for another instrument"
                    );
                    return;
                }
                debug!(
                    order_id = %order.id,
                    side = %order.side,
                    order_type = %order.order_type,
                    quantity = %order.quantity,
                    price = %order.price,
                    "Order resting"
                );
                self.resting.push(order);
            }
            VenueCommand::Cancel { order_id, .. } => {
                let before = self.resting.len();
                self.resting.retain(|o| o.id != order_id);
                debug!(
                    order_id = %order_id,
                    removed = before != self.resting.len(),
                    "Cancel accepted"
                );
                self.cancels.push_back(order_id);
            }
        }
    }

    /// Confirmations for cancels accepted before this step.
    pub fn take_cancel_confirmations(&mut self, timestamp_ms: u64) -> Vec<CancelConfirmation> {
        self.cancels
            .drain(..)
            .map(|order_id| CancelConfirmation {
                order_id,
                timestamp_ms,
            })
            .collect()
    }

    /// Fill the first resting order the tick triggers, if any.
    pub fn next_fill(&mut self, step: &StepContext) -> Option<FillEvent> {
        let tick = step.reference_price;
        let index = self
            .resting
            .iter()
            .position(|order| fill_price(order, tick).is_some())?;
        let order = self.resting.remove(index);
        let price = fill_price(&order, tick)?;
        Some(FillEvent::new(
            order.id.clone(),
            order.remaining_quantity(),
            price,
            step.timestamp_ms,
        ))
    }
}

fn fill_price(order: &OrderRequest, tick: Price) -> Option<Price> {
    let triggered = match (order.order_type, order.side) {
        (OrderType::Market, _) => return Some(tick),
        (OrderType::Limit, OrderSide::Buy) => tick <= order.price,
        (OrderType::Limit, OrderSide::Sell) => tick >= order.price,
        (OrderType::Stop, OrderSide::Buy) => tick >= order.price,
        (OrderType::Stop, OrderSide::Sell) => tick <= order.price,
    };
    triggered.then_some(order.price)
}
