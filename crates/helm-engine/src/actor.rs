//! Per-instrument engine actor.
//!
//! Each instrument runs its [`InstrumentEngine`] in its own tokio task fed by
//! a bounded mpsc mailbox, so fills, intents and callbacks for one
//! instrument are processed strictly in arrival order while different
//! instruments run in parallel with no shared mutable state.
//!
//! ## Handle cache
//!
//! The task publishes an [`EngineSnapshot`] into a `parking_lot::RwLock`
//! after every message. [`InstrumentEngineHandle::snapshot`] reads it
//! without a channel round-trip; it may lag messages still queued in the
//! mailbox but never shows state the task has not committed.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use helm_core::{CancelConfirmation, FillEvent, InstrumentId, OrderId, StepContext, VenueCommand};
use helm_orders::OrderIntent;

use crate::config::EngineConfig;
use crate::engine::{EngineSnapshot, FillOutcome, InstrumentEngine, StepReport};
use crate::error::{EngineError, EngineResult};
use crate::strategy::Strategy;

// ============================================================================
// EngineMsg
// ============================================================================

/// Messages for the engine actor.
#[derive(Debug)]
pub enum EngineMsg {
    Fill {
        fill: FillEvent,
        step: StepContext,
        reply: oneshot::Sender<EngineResult<FillOutcome>>,
    },
    CancelConfirmed {
        confirmation: CancelConfirmation,
        step: StepContext,
    },
    Reject {
        order_id: OrderId,
        step: StepContext,
    },
    Declare {
        intent: OrderIntent,
        step: StepContext,
        reply: oneshot::Sender<EngineResult<()>>,
    },
    CancelAll {
        step: StepContext,
    },
    Liquidate {
        step: StepContext,
        reply: oneshot::Sender<bool>,
    },
    Shutdown,
}

// ============================================================================
// EngineTask
// ============================================================================

struct EngineTask<S> {
    rx: mpsc::Receiver<EngineMsg>,
    engine: InstrumentEngine<S>,
    commands_tx: mpsc::UnboundedSender<VenueCommand>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
}

impl<S: Strategy> EngineTask<S> {
    async fn run(mut self) {
        debug!(instrument = %self.engine.instrument(), "Engine task started");

        while let Some(msg) = self.rx.recv().await {
            if matches!(msg, EngineMsg::Shutdown) {
                debug!(instrument = %self.engine.instrument(), "Engine task shutting down");
                break;
            }
            self.handle_message(msg);
        }

        debug!(instrument = %self.engine.instrument(), "Engine task terminated");
    }

    /// Handle a single message.
    ///
    /// State is published before any reply is sent, so a caller that awaited
    /// a reply always sees its effects in the handle cache.
    fn handle_message(&mut self, msg: EngineMsg) {
        trace!(instrument = %self.engine.instrument(), ?msg, "Engine message");
        match msg {
            EngineMsg::Fill { fill, step, reply } => {
                let outcome = self.engine.on_fill(&fill, &step);
                if let Err(err) = &outcome {
                    warn!(
                        instrument = %self.engine.instrument(),
                        order_id = %fill.order_id,
                        error = %err,
                        "Fill rejected"
                    );
                }
                self.publish();
                let _ = reply.send(outcome);
            }
            EngineMsg::CancelConfirmed { confirmation, step } => {
                let report = self.engine.on_cancel_confirmed(&confirmation, &step);
                self.log_report(&report);
                self.publish();
            }
            EngineMsg::Reject { order_id, step } => {
                let report = self.engine.on_reject(&order_id, &step);
                self.log_report(&report);
                self.publish();
            }
            EngineMsg::Declare {
                intent,
                step,
                reply,
            } => {
                let result = self.engine.declare(intent, &step);
                self.publish();
                let _ = reply.send(result);
            }
            EngineMsg::CancelAll { step } => {
                let report = self.engine.cancel_all(&step);
                self.log_report(&report);
                self.publish();
            }
            EngineMsg::Liquidate { step, reply } => {
                let liquidated = self.engine.liquidate(&step);
                self.publish();
                let _ = reply.send(liquidated);
            }
            EngineMsg::Shutdown => {}
        }
    }

    fn log_report(&self, report: &StepReport) {
        if report.all_canceled {
            debug!(instrument = %self.engine.instrument(), "All orders canceled");
        }
    }

    /// Forward venue commands and refresh the handle cache.
    fn publish(&mut self) {
        for command in self.engine.drain_commands() {
            if self.commands_tx.send(command).is_err() {
                warn!(
                    instrument = %self.engine.instrument(),
                    "Venue command receiver dropped"
                );
                break;
            }
        }
        *self.snapshot.write() = self.engine.snapshot();
    }
}

// ============================================================================
// InstrumentEngineHandle
// ============================================================================

/// Handle for interacting with one instrument's engine task.
#[derive(Clone)]
pub struct InstrumentEngineHandle {
    instrument: InstrumentId,
    tx: mpsc::Sender<EngineMsg>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
}

impl InstrumentEngineHandle {
    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    async fn send(&self, msg: EngineMsg) -> EngineResult<()> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| EngineError::ChannelClosed(self.instrument.to_string()))
    }

    async fn recv<T>(&self, rx: oneshot::Receiver<T>) -> EngineResult<T> {
        rx.await
            .map_err(|_| EngineError::ChannelClosed(self.instrument.to_string()))
    }

    /// Deliver a fill and wait for everything it caused.
    pub async fn fill(&self, fill: FillEvent, step: StepContext) -> EngineResult<FillOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineMsg::Fill { fill, step, reply }).await?;
        self.recv(rx).await?
    }

    pub async fn cancel_confirmed(
        &self,
        confirmation: CancelConfirmation,
        step: StepContext,
    ) -> EngineResult<()> {
        self.send(EngineMsg::CancelConfirmed { confirmation, step })
            .await
    }

    pub async fn reject(&self, order_id: OrderId, step: StepContext) -> EngineResult<()> {
        self.send(EngineMsg::Reject { order_id, step }).await
    }

    pub async fn declare(&self, intent: OrderIntent, step: StepContext) -> EngineResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineMsg::Declare {
            intent,
            step,
            reply,
        })
        .await?;
        self.recv(rx).await?
    }

    pub async fn cancel_all(&self, step: StepContext) -> EngineResult<()> {
        self.send(EngineMsg::CancelAll { step }).await
    }

    /// Returns false when the position was already flat.
    pub async fn liquidate(&self, step: StepContext) -> EngineResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineMsg::Liquidate { step, reply }).await?;
        self.recv(rx).await
    }

    /// Last state published by the task.
    pub fn snapshot(&self) -> EngineSnapshot {
        self.snapshot.read().clone()
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(EngineMsg::Shutdown).await;
    }
}

// ============================================================================
// Spawn function
// ============================================================================

/// Spawn an engine task for one instrument.
///
/// Returns the handle, the receiver of venue commands the engine emits, and
/// the task's join handle.
pub fn spawn_instrument_engine<S>(
    instrument: InstrumentId,
    config: EngineConfig,
    strategy: S,
) -> (
    InstrumentEngineHandle,
    mpsc::UnboundedReceiver<VenueCommand>,
    JoinHandle<()>,
)
where
    S: Strategy + 'static,
{
    let (tx, rx) = mpsc::channel(config.actor_channel_capacity.max(1));
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let snapshot = Arc::new(RwLock::new(EngineSnapshot::empty(instrument.clone())));

    let task = EngineTask {
        rx,
        engine: InstrumentEngine::new(instrument.clone(), config, strategy),
        commands_tx,
        snapshot: snapshot.clone(),
    };

    let handle = InstrumentEngineHandle {
        instrument,
        tx,
        snapshot,
    };

    let join_handle = tokio::spawn(task.run());

    (handle, commands_rx, join_handle)
}
