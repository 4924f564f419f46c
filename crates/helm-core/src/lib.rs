//! Core domain types for the helm strategy execution engine.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Price`, `Size`: exact decimal types
//! - `OrderSide`, `PositionSide`, `OrderType`, `OrderPurpose`: trading enums
//! - `OrderRequest`, `FillEvent`, `VenueCommand`: the venue boundary
//! - `StepContext`: market state handed to each processing step

pub mod context;
pub mod decimal;
pub mod error;
pub mod execution;
pub mod order;

pub use context::StepContext;
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use order::{InstrumentId, OrderId, OrderPurpose, OrderSide, OrderType, PositionSide};

pub use execution::{CancelConfirmation, FillEvent, OrderRequest, OrderState, VenueCommand};
