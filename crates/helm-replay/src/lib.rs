//! Deterministic scenario replay for helm.
//!
//! Loads a TOML scenario of price steps and scripted actions, runs it
//! through an [`helm_engine::InstrumentEngine`] against an in-memory venue,
//! and reports every order, fill and lifecycle hook that resulted.

pub mod app;
pub mod config;
pub mod error;
pub mod report;
pub mod strategy;
pub mod venue;

pub use app::{run_scenario, ReplayRunner, MAX_FILLS_PER_STEP};
pub use config::{Action, ReplayConfig, ScenarioStep, StrategyConfig};
pub use error::{ReplayError, ReplayResult};
pub use report::{ReplayReport, TimelineEntry};
pub use strategy::LoggingStrategy;
pub use venue::SimulatedVenue;
