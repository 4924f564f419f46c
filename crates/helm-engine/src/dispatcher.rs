//! Lifecycle dispatch.
//!
//! A two-state machine over {flat, open}:
//!
//! ```text
//! flat --opened--> open
//! open --increased|reduced--> open
//! open --closed--> flat
//! ```
//!
//! Each ledger transition maps to exactly one hook. Hook errors are caught
//! here and reported as [`HookFault`]s.

use serde::Serialize;
use tracing::{debug, error};

use helm_core::{InstrumentId, OrderId};
use helm_position::Transition;
use helm_telemetry::Metrics;

use crate::context::StrategyContext;
use crate::strategy::{Hook, HookResult, LifecycleEvent, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Flat,
    Open,
}

impl LifecycleState {
    /// Next state for a transition, or `None` if the transition is not legal here.
    pub fn next(self, transition: Transition) -> Option<Self> {
        match (self, transition) {
            (Self::Flat, Transition::Opened) => Some(Self::Open),
            (Self::Open, Transition::Increased | Transition::Reduced) => Some(Self::Open),
            (Self::Open, Transition::Closed) => Some(Self::Flat),
            _ => None,
        }
    }
}

/// A hook that returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookFault {
    pub hook: Hook,
    /// Order whose fill triggered the hook, if any.
    pub order_id: Option<OrderId>,
    pub message: String,
}

#[derive(Debug)]
pub struct LifecycleDispatcher {
    instrument: InstrumentId,
    state: LifecycleState,
}

impl LifecycleDispatcher {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            state: LifecycleState::Flat,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Deliver one transition to its hook.
    pub fn dispatch<S: Strategy + ?Sized>(
        &mut self,
        strategy: &mut S,
        ctx: &mut StrategyContext<'_>,
        event: &LifecycleEvent,
    ) -> Option<HookFault> {
        match self.state.next(event.transition) {
            Some(next) => self.state = next,
            None => {
                error!(
                    instrument = %self.instrument,
                    state = ?self.state,
                    transition = event.transition.as_str(),
                    "Transition does not match lifecycle state, resyncing"
                );
                self.state = if event.delta.after.side.is_flat() {
                    LifecycleState::Flat
                } else {
                    LifecycleState::Open
                };
            }
        }
        Metrics::transition(self.instrument.as_str(), event.transition.as_str());

        let hook = Hook::for_transition(event.transition);
        debug!(
            instrument = %self.instrument,
            hook = %hook,
            order_id = %event.order.id,
            purpose = %event.order.purpose,
            quantity = %event.delta.quantity,
            price = %event.delta.price,
            "Dispatching lifecycle hook"
        );

        let result = match event.transition {
            Transition::Opened => strategy.on_opened(ctx, event),
            Transition::Increased => strategy.on_increased(ctx, event),
            Transition::Reduced => strategy.on_reduced(ctx, event),
            Transition::Closed => strategy.on_closed(ctx, event),
        };
        self.isolate(hook, Some(&event.order.id), result)
    }

    pub fn dispatch_all_canceled<S: Strategy + ?Sized>(
        &mut self,
        strategy: &mut S,
        ctx: &mut StrategyContext<'_>,
    ) -> Option<HookFault> {
        debug!(instrument = %self.instrument, "Dispatching on_all_canceled");
        let result = strategy.on_all_canceled(ctx);
        self.isolate(Hook::OnAllCanceled, None, result)
    }

    fn isolate(
        &self,
        hook: Hook,
        order_id: Option<&OrderId>,
        result: HookResult,
    ) -> Option<HookFault> {
        let fault = result.err()?;
        error!(
            instrument = %self.instrument,
            hook = %hook,
            error = %fault,
            "Strategy hook failed"
        );
        Metrics::strategy_fault(self.instrument.as_str(), hook.as_str());
        Some(HookFault {
            hook,
            order_id: order_id.cloned(),
            message: fault.message,
        })
    }
}
