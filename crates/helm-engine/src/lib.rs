//! Lifecycle dispatch and per-instrument execution.
//!
//! [`InstrumentEngine`] ties the order desk, the position ledger and the
//! lifecycle dispatcher together for one instrument. Fills go in, venue
//! commands come out through [`InstrumentEngine::drain_commands`], and the
//! strategy sees each committed transition through exactly one hook.
//!
//! # Key Components
//!
//! - [`Strategy`]: lifecycle hooks with no-op defaults
//! - [`StrategyContext`]: intent surface handed to hooks
//! - [`LifecycleDispatcher`]: flat/open state machine, fault isolation
//! - [`spawn_instrument_engine`]: the engine as a tokio task

pub mod actor;
pub mod config;
pub mod context;
pub mod desk;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod strategy;

pub use actor::{spawn_instrument_engine, EngineMsg, InstrumentEngineHandle};
pub use config::EngineConfig;
pub use context::StrategyContext;
pub use desk::OrderDesk;
pub use dispatcher::{HookFault, LifecycleDispatcher, LifecycleState};
pub use engine::{EngineSnapshot, FillOutcome, InstrumentEngine, StepReport};
pub use error::{EngineError, EngineResult};
pub use strategy::{Hook, HookResult, LifecycleEvent, NoopStrategy, Strategy, StrategyFault};
