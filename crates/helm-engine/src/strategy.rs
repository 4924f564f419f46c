//! Strategy hook trait.
//!
//! Hooks run after the ledger has committed the transition they report.
//! An `Err` from a hook is a [`StrategyFault`]: it is logged and counted at
//! the dispatch boundary and never rolls back committed state.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use helm_core::OrderRequest;
use helm_position::{LedgerDelta, Transition};

use crate::context::StrategyContext;
use crate::error::EngineError;

/// Error raised by strategy-supplied code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("strategy fault: {message}")]
pub struct StrategyFault {
    pub message: String,
}

impl StrategyFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<EngineError> for StrategyFault {
    fn from(err: EngineError) -> Self {
        Self::new(err.to_string())
    }
}

pub type HookResult = Result<(), StrategyFault>;

/// Lifecycle hook identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    OnOpened,
    OnIncreased,
    OnReduced,
    OnClosed,
    OnAllCanceled,
}

impl Hook {
    pub fn for_transition(transition: Transition) -> Self {
        match transition {
            Transition::Opened => Self::OnOpened,
            Transition::Increased => Self::OnIncreased,
            Transition::Reduced => Self::OnReduced,
            Transition::Closed => Self::OnClosed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnOpened => "on_opened",
            Self::OnIncreased => "on_increased",
            Self::OnReduced => "on_reduced",
            Self::OnClosed => "on_closed",
            Self::OnAllCanceled => "on_all_canceled",
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed transition together with the order whose fill caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LifecycleEvent {
    pub transition: Transition,
    /// The triggering order, after the fill was recorded.
    pub order: OrderRequest,
    pub delta: LedgerDelta,
}

/// Strategy callbacks. Every hook defaults to a no-op.
pub trait Strategy: Send {
    fn on_opened(&mut self, _ctx: &mut StrategyContext<'_>, _event: &LifecycleEvent) -> HookResult {
        Ok(())
    }

    fn on_increased(
        &mut self,
        _ctx: &mut StrategyContext<'_>,
        _event: &LifecycleEvent,
    ) -> HookResult {
        Ok(())
    }

    fn on_reduced(&mut self, _ctx: &mut StrategyContext<'_>, _event: &LifecycleEvent) -> HookResult {
        Ok(())
    }

    fn on_closed(&mut self, _ctx: &mut StrategyContext<'_>, _event: &LifecycleEvent) -> HookResult {
        Ok(())
    }

    /// Fired once after every order covered by a cancel-all is terminal.
    fn on_all_canceled(&mut self, _ctx: &mut StrategyContext<'_>) -> HookResult {
        Ok(())
    }
}

/// Strategy with no reactions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStrategy;

impl Strategy for NoopStrategy {}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn on_opened(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        (**self).on_opened(ctx, event)
    }

    fn on_increased(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        (**self).on_increased(ctx, event)
    }

    fn on_reduced(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        (**self).on_reduced(ctx, event)
    }

    fn on_closed(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        (**self).on_closed(ctx, event)
    }

    fn on_all_canceled(&mut self, ctx: &mut StrategyContext<'_>) -> HookResult {
        (**self).on_all_canceled(ctx)
    }
}
