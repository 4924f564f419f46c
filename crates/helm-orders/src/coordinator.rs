//! Outstanding order tracking and cancellation.
//!
//! The coordinator owns every order from submission until it reaches a
//! terminal state, then moves it to a bounded read-only archive so late
//! venue messages can still be resolved.
//!
//! Cancellation is fire-and-confirm: a cancel only moves an order to
//! `CancelRequested`; it becomes `Canceled` when the venue confirms. An
//! explicit cancel-all installs a barrier over every outstanding order and
//! is reported exactly once, after the last of them turns terminal.

use std::collections::{HashMap, HashSet, VecDeque};

use helm_core::{
    FillEvent, InstrumentId, OrderId, OrderPurpose, OrderRequest, OrderState, Size, VenueCommand,
};
use tracing::{debug, trace, warn};

use crate::error::{OrderError, OrderResult};

/// Terminal orders retained for late lookups.
pub const ARCHIVE_CAPACITY: usize = 1024;

/// Result of recording a fill against an order.
#[derive(Debug, Clone)]
pub struct FillRecord {
    /// The order after the fill was applied.
    pub order: OrderRequest,
    /// Sibling cancels triggered by the fill.
    pub cancels: Vec<VenueCommand>,
}

/// Tracks outstanding orders per purpose and coordinates their cancellation.
#[derive(Debug)]
pub struct CancellationCoordinator {
    instrument: InstrumentId,
    /// Cancel unfilled sibling entry legs once any entry leg fills.
    cancel_entry_siblings: bool,
    /// Non-terminal orders in submission order.
    outstanding: Vec<OrderRequest>,
    archive: HashMap<OrderId, OrderRequest>,
    archive_order: VecDeque<OrderId>,
    /// Orders covered by an explicit cancel-all that are not yet terminal.
    cancel_barrier: Option<HashSet<OrderId>>,
    /// Set when the barrier empties; consumed by `take_all_canceled`.
    all_canceled_ready: bool,
}

impl CancellationCoordinator {
    pub fn new(instrument: InstrumentId, cancel_entry_siblings: bool) -> Self {
        Self {
            instrument,
            cancel_entry_siblings,
            outstanding: Vec::new(),
            archive: HashMap::new(),
            archive_order: VecDeque::new(),
            cancel_barrier: None,
            all_canceled_ready: false,
        }
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Start tracking freshly built orders and emit their submissions.
    pub fn track(&mut self, orders: Vec<OrderRequest>) -> Vec<VenueCommand> {
        orders
            .into_iter()
            .map(|mut order| {
                order.state = OrderState::Open;
                trace!(order_id = %order.id, purpose = %order.purpose, "Tracking order");
                self.outstanding.push(order.clone());
                VenueCommand::Submit(order)
            })
            .collect()
    }

    /// Supersede the current orders of `purpose` with `orders`.
    ///
    /// Previous orders are sent cancels before the new ones are submitted,
    /// so the two sets never stack.
    pub fn replace(
        &mut self,
        purpose: OrderPurpose,
        orders: Vec<OrderRequest>,
    ) -> Vec<VenueCommand> {
        let mut commands = self.cancel_purpose(purpose);
        commands.extend(self.track(orders));
        commands
    }

    // ------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------

    /// Request cancellation of one order.
    ///
    /// Returns `None` for orders that are terminal, unknown, or already
    /// being canceled.
    pub fn request_cancel(&mut self, order_id: &OrderId) -> Option<VenueCommand> {
        let order = self.outstanding.iter_mut().find(|o| &o.id == order_id)?;
        if order.state == OrderState::CancelRequested {
            return None;
        }
        order.state = OrderState::CancelRequested;
        debug!(order_id = %order.id, purpose = %order.purpose, "Cancel requested");
        Some(VenueCommand::Cancel {
            order_id: order.id.clone(),
            instrument: self.instrument.clone(),
        })
    }

    /// Cancel every current order of a purpose.
    pub fn cancel_purpose(&mut self, purpose: OrderPurpose) -> Vec<VenueCommand> {
        let ids: Vec<OrderId> = self.current(purpose).map(|o| o.id.clone()).collect();
        ids.iter().filter_map(|id| self.request_cancel(id)).collect()
    }

    /// Cancel every outstanding exit order (stop-loss, take-profit, liquidation).
    pub fn cancel_exits(&mut self) -> Vec<VenueCommand> {
        let ids: Vec<OrderId> = self
            .outstanding
            .iter()
            .filter(|o| o.purpose.is_exit() && o.state != OrderState::CancelRequested)
            .map(|o| o.id.clone())
            .collect();
        ids.iter().filter_map(|id| self.request_cancel(id)).collect()
    }

    /// Cancel everything outstanding without arming the barrier.
    pub fn cancel_outstanding(&mut self) -> Vec<VenueCommand> {
        let ids: Vec<OrderId> = self.outstanding.iter().map(|o| o.id.clone()).collect();
        ids.iter().filter_map(|id| self.request_cancel(id)).collect()
    }

    /// Cancel everything outstanding and arm the all-canceled barrier.
    ///
    /// With nothing outstanding the barrier is satisfied immediately.
    pub fn cancel_all(&mut self) -> Vec<VenueCommand> {
        let ids: Vec<OrderId> = self.outstanding.iter().map(|o| o.id.clone()).collect();
        let commands = self.cancel_outstanding();

        let barrier = self.cancel_barrier.get_or_insert_with(HashSet::new);
        barrier.extend(ids);
        debug!(
            instrument = %self.instrument,
            pending = barrier.len(),
            "Cancel-all requested"
        );
        self.check_barrier();
        commands
    }

    /// Venue confirmed a cancel. Idempotent for terminal or unknown orders.
    pub fn confirm_cancel(&mut self, order_id: &OrderId) {
        self.settle(order_id, OrderState::Canceled);
    }

    /// Venue rejected an order. Idempotent for terminal or unknown orders.
    pub fn reject(&mut self, order_id: &OrderId) {
        self.settle(order_id, OrderState::Rejected);
    }

    /// Returns true exactly once after a cancel-all barrier clears.
    pub fn take_all_canceled(&mut self) -> bool {
        std::mem::take(&mut self.all_canceled_ready)
    }

    // ------------------------------------------------------------------
    // Fills
    // ------------------------------------------------------------------

    /// Validate a fill without recording it and return its order.
    ///
    /// Fails for non-positive fills, unknown or terminal orders and fills
    /// larger than the remaining quantity.
    pub fn check_fill(&self, fill: &FillEvent) -> OrderResult<&OrderRequest> {
        self.locate_fill(fill).map(|idx| &self.outstanding[idx])
    }

    fn locate_fill(&self, fill: &FillEvent) -> OrderResult<usize> {
        if !fill.quantity.is_positive() {
            return Err(OrderError::Configuration(format!(
                "fill quantity must be positive, got {}",
                fill.quantity
            )));
        }
        if !fill.price.is_positive() {
            return Err(OrderError::Configuration(format!(
                "fill price must be positive, got {}",
                fill.price
            )));
        }

        let Some(idx) = self.outstanding.iter().position(|o| o.id == fill.order_id) else {
            return Err(match self.archive.get(&fill.order_id) {
                Some(order) => OrderError::TerminalOrder {
                    order_id: order.id.clone(),
                    state: order.state,
                },
                None => OrderError::UnknownOrder(fill.order_id.clone()),
            });
        };

        let remaining = self.outstanding[idx].remaining_quantity();
        if fill.quantity > remaining {
            return Err(OrderError::FillExceedsOrder {
                order_id: fill.order_id.clone(),
                fill: fill.quantity,
                remaining,
            });
        }
        Ok(idx)
    }

    /// Record a fill against its order.
    ///
    /// Fails without side effects on anything [`Self::check_fill`] rejects.
    pub fn record_fill(&mut self, fill: &FillEvent) -> OrderResult<FillRecord> {
        let idx = self.locate_fill(fill)?;

        let order = &mut self.outstanding[idx];
        order.filled_quantity += fill.quantity;
        if order.filled_quantity >= order.quantity {
            order.state = OrderState::Filled;
        } else if order.state != OrderState::CancelRequested {
            order.state = OrderState::PartiallyFilled;
        }
        let snapshot = order.clone();

        trace!(
            order_id = %snapshot.id,
            filled = %snapshot.filled_quantity,
            quantity = %snapshot.quantity,
            state = ?snapshot.state,
            "Fill recorded"
        );

        let cancels = if self.cancel_entry_siblings && snapshot.purpose == OrderPurpose::Entry {
            self.cancel_entry_siblings_of(&snapshot)
        } else {
            Vec::new()
        };

        if snapshot.state.is_terminal() {
            self.archive_at(idx);
        }

        Ok(FillRecord {
            order: snapshot,
            cancels,
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Look up an order, outstanding or archived.
    pub fn get(&self, order_id: &OrderId) -> Option<&OrderRequest> {
        self.outstanding
            .iter()
            .find(|o| &o.id == order_id)
            .or_else(|| self.archive.get(order_id))
    }

    /// All non-terminal orders in submission order.
    pub fn outstanding(&self) -> &[OrderRequest] {
        &self.outstanding
    }

    /// Current (not superseded, not being canceled) orders of a purpose.
    pub fn current(&self, purpose: OrderPurpose) -> impl Iterator<Item = &OrderRequest> {
        self.outstanding
            .iter()
            .filter(move |o| o.purpose == purpose && o.state != OrderState::CancelRequested)
    }

    /// Unfilled quantity across current orders of a purpose.
    pub fn current_quantity(&self, purpose: OrderPurpose) -> Size {
        self.current(purpose).map(|o| o.remaining_quantity()).sum()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn cancel_entry_siblings_of(&mut self, filled: &OrderRequest) -> Vec<VenueCommand> {
        let siblings: Vec<OrderId> = self
            .outstanding
            .iter()
            .filter(|o| {
                o.purpose == OrderPurpose::Entry
                    && o.intent_seq == filled.intent_seq
                    && o.id != filled.id
            })
            .map(|o| o.id.clone())
            .collect();
        if !siblings.is_empty() {
            debug!(
                order_id = %filled.id,
                siblings = siblings.len(),
                "Entry leg filled, canceling sibling entry legs"
            );
        }
        siblings
            .iter()
            .filter_map(|id| self.request_cancel(id))
            .collect()
    }

    fn settle(&mut self, order_id: &OrderId, state: OrderState) {
        match self.outstanding.iter().position(|o| &o.id == order_id) {
            Some(idx) => {
                self.outstanding[idx].state = state;
                debug!(order_id = %order_id, state = ?state, "Order settled");
                self.archive_at(idx);
            }
            None if self.archive.contains_key(order_id) => {
                trace!(order_id = %order_id, "Order already terminal, ignoring");
            }
            None => {
                warn!(order_id = %order_id, state = ?state, "Settlement for unknown order");
            }
        }
    }

    fn archive_at(&mut self, idx: usize) {
        let order = self.outstanding.remove(idx);
        if let Some(barrier) = self.cancel_barrier.as_mut() {
            barrier.remove(&order.id);
        }

        self.archive_order.push_back(order.id.clone());
        self.archive.insert(order.id.clone(), order);
        while self.archive_order.len() > ARCHIVE_CAPACITY {
            if let Some(old) = self.archive_order.pop_front() {
                self.archive.remove(&old);
            }
        }

        self.check_barrier();
    }

    fn check_barrier(&mut self) {
        if self.cancel_barrier.as_ref().is_some_and(HashSet::is_empty) {
            self.cancel_barrier = None;
            self.all_canceled_ready = true;
            debug!(instrument = %self.instrument, "All canceled");
        }
    }
}
