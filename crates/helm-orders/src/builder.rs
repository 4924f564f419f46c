//! Intent expansion into classified order requests.
//!
//! An intent is either a single `(quantity, price)` leg or an ordered list of
//! legs. Both shapes are normalized to a list before validation so there is
//! one expansion path.

use helm_core::{
    InstrumentId, OrderId, OrderPurpose, OrderRequest, OrderState, OrderType, PositionSide, Price,
    Size, StepContext,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::classifier::classify;
use crate::error::{OrderError, OrderResult};

/// One `(quantity, price)` component of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Size, Price)", into = "(Size, Price)")]
pub struct Leg {
    pub quantity: Size,
    pub price: Price,
}

impl Leg {
    pub fn new(quantity: Size, price: Price) -> Self {
        Self { quantity, price }
    }
}

impl From<(Size, Price)> for Leg {
    fn from((quantity, price): (Size, Price)) -> Self {
        Self { quantity, price }
    }
}

impl From<Leg> for (Size, Price) {
    fn from(leg: Leg) -> Self {
        (leg.quantity, leg.price)
    }
}

/// Scalar-or-list leg declaration as written by strategy code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntentLegs {
    Single(Leg),
    Multiple(Vec<Leg>),
}

impl IntentLegs {
    /// Normalize to an ordered list of legs.
    pub fn into_legs(self) -> Vec<Leg> {
        match self {
            Self::Single(leg) => vec![leg],
            Self::Multiple(legs) => legs,
        }
    }

    pub fn legs(&self) -> &[Leg] {
        match self {
            Self::Single(leg) => std::slice::from_ref(leg),
            Self::Multiple(legs) => legs,
        }
    }
}

impl From<Leg> for IntentLegs {
    fn from(leg: Leg) -> Self {
        Self::Single(leg)
    }
}

impl From<Vec<Leg>> for IntentLegs {
    fn from(legs: Vec<Leg>) -> Self {
        Self::Multiple(legs)
    }
}

/// A strategy-declared target.
///
/// `side` is the position side the intent belongs to: a long entry buys, a
/// long stop-loss sells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderIntent {
    pub purpose: OrderPurpose,
    pub side: PositionSide,
    legs: Vec<Leg>,
}

impl OrderIntent {
    pub fn new(purpose: OrderPurpose, side: PositionSide, legs: impl Into<IntentLegs>) -> Self {
        Self {
            purpose,
            side,
            legs: legs.into().into_legs(),
        }
    }

    pub fn entry(side: PositionSide, legs: impl Into<IntentLegs>) -> Self {
        Self::new(OrderPurpose::Entry, side, legs)
    }

    pub fn stop_loss(side: PositionSide, legs: impl Into<IntentLegs>) -> Self {
        Self::new(OrderPurpose::StopLoss, side, legs)
    }

    pub fn take_profit(side: PositionSide, legs: impl Into<IntentLegs>) -> Self {
        Self::new(OrderPurpose::TakeProfit, side, legs)
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }

    /// Sum of leg quantities.
    pub fn total_quantity(&self) -> Size {
        self.legs.iter().map(|l| l.quantity).sum()
    }
}

/// Exposure an intent is validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Exposure {
    pub side: PositionSide,
    pub quantity: Size,
}

impl Exposure {
    pub const FLAT: Self = Self {
        side: PositionSide::Flat,
        quantity: Size::ZERO,
    };

    pub fn new(side: PositionSide, quantity: Size) -> Self {
        Self { side, quantity }
    }
}

/// Validate an intent against the exposure it applies to.
///
/// Under-allocated exits are allowed; over-allocation is an error.
pub fn validate(intent: &OrderIntent, exposure: Exposure) -> OrderResult<()> {
    if intent.legs.is_empty() {
        return Err(OrderError::Configuration(format!(
            "{} intent has no legs",
            intent.purpose
        )));
    }
    if intent.side.is_flat() {
        return Err(OrderError::Configuration(format!(
            "{} intent must target a long or short side",
            intent.purpose
        )));
    }
    for (i, leg) in intent.legs.iter().enumerate() {
        if !leg.quantity.is_positive() {
            return Err(OrderError::Configuration(format!(
                "leg {i} quantity must be positive, got {}",
                leg.quantity
            )));
        }
        if !leg.price.is_positive() {
            return Err(OrderError::Configuration(format!(
                "leg {i} price must be positive, got {}",
                leg.price
            )));
        }
    }

    if intent.purpose.is_exit() {
        if exposure.side.is_flat() {
            return Err(OrderError::StateConflict(format!(
                "{} declared with no open or pending {} exposure",
                intent.purpose, intent.side
            )));
        }
        if exposure.side != intent.side {
            return Err(OrderError::StateConflict(format!(
                "{} {} declared while {}",
                intent.side, intent.purpose, exposure.side
            )));
        }
        let requested = intent.total_quantity();
        if requested > exposure.quantity {
            return Err(OrderError::OverAllocation {
                requested,
                available: exposure.quantity,
            });
        }
    } else if !exposure.side.is_flat() && exposure.side != intent.side {
        return Err(OrderError::StateConflict(format!(
            "{} entry declared while {}",
            intent.side, exposure.side
        )));
    }

    Ok(())
}

/// Expands intents into order requests with deterministic ids.
#[derive(Debug)]
pub struct OrderSetBuilder {
    instrument: InstrumentId,
    next_order_seq: u64,
    next_intent_seq: u64,
}

impl OrderSetBuilder {
    pub fn new(instrument: InstrumentId) -> Self {
        Self {
            instrument,
            next_order_seq: 1,
            next_intent_seq: 1,
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    /// Validate and expand an intent.
    ///
    /// Each leg is classified against the reference price of `ctx`; the type
    /// is fixed at build time and never re-evaluated.
    pub fn build(
        &mut self,
        intent: &OrderIntent,
        exposure: Exposure,
        ctx: &StepContext,
    ) -> OrderResult<Vec<OrderRequest>> {
        validate(intent, exposure)?;

        let side = match intent.purpose {
            OrderPurpose::Entry => intent.side.entry_side(),
            _ => intent.side.exit_side(),
        }
        .ok_or_else(|| OrderError::Configuration("intent side is flat".to_string()))?;

        // Classify every leg before minting ids so a failure leaves no gaps.
        let types = intent
            .legs
            .iter()
            .map(|leg| classify(side, leg.price, ctx.reference_price))
            .collect::<OrderResult<Vec<_>>>()?;

        let intent_seq = self.next_intent_seq();
        let orders = intent
            .legs
            .iter()
            .zip(types)
            .map(|(leg, order_type)| {
                self.make_order(
                    side,
                    leg.quantity,
                    leg.price,
                    order_type,
                    intent.purpose,
                    intent_seq,
                    ctx.timestamp_ms,
                )
            })
            .collect::<Vec<_>>();

        trace!(
            instrument = %self.instrument,
            purpose = %intent.purpose,
            legs = orders.len(),
            "Built order set"
        );
        Ok(orders)
    }

    /// Market order closing the whole exposure at the reference price.
    ///
    /// Returns `None` when flat.
    pub fn build_liquidation(
        &mut self,
        exposure: Exposure,
        ctx: &StepContext,
    ) -> Option<OrderRequest> {
        let side = exposure.side.exit_side()?;
        if exposure.quantity.is_zero() {
            return None;
        }
        let intent_seq = self.next_intent_seq();
        Some(self.make_order(
            side,
            exposure.quantity,
            ctx.reference_price,
            OrderType::Market,
            OrderPurpose::Liquidation,
            intent_seq,
            ctx.timestamp_ms,
        ))
    }

    fn next_intent_seq(&mut self) -> u64 {
        let seq = self.next_intent_seq;
        self.next_intent_seq += 1;
        seq
    }

    #[allow(clippy::too_many_arguments)]
    fn make_order(
        &mut self,
        side: helm_core::OrderSide,
        quantity: Size,
        price: Price,
        order_type: OrderType,
        purpose: OrderPurpose,
        intent_seq: u64,
        created_at: u64,
    ) -> OrderRequest {
        let id = OrderId::sequential(&self.instrument, self.next_order_seq);
        self.next_order_seq += 1;
        OrderRequest {
            id,
            instrument: self.instrument.clone(),
            side,
            quantity,
            price,
            order_type,
            purpose,
            intent_seq,
            filled_quantity: Size::ZERO,
            state: OrderState::Pending,
            created_at,
        }
    }
}
