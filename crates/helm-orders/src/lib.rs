//! Order handling for helm.
//!
//! Turns strategy intents into classified order requests and tracks them
//! until they are filled, canceled or rejected.
//!
//! # Key Components
//!
//! - [`classify`]: infers market/limit/stop from target vs reference price
//! - [`OrderSetBuilder`]: expands scalar or multi-leg intents into orders
//! - [`CancellationCoordinator`]: owns outstanding orders, supersedes and
//!   cancels them, reports cancel-all completion once

pub mod builder;
pub mod classifier;
pub mod coordinator;
pub mod error;

pub use builder::{validate, Exposure, IntentLegs, Leg, OrderIntent, OrderSetBuilder};
pub use classifier::classify;
pub use coordinator::{CancellationCoordinator, FillRecord, ARCHIVE_CAPACITY};
pub use error::{OrderError, OrderResult};
