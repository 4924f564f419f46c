//! End-to-end lifecycle scenarios for a single instrument engine.

use helm_core::{
    CancelConfirmation, FillEvent, InstrumentId, OrderId, OrderPurpose, OrderRequest, OrderSide,
    OrderType, PositionSide, Price, Size, StepContext, VenueCommand,
};
use helm_engine::{
    EngineConfig, EngineError, Hook, HookResult, InstrumentEngine, LifecycleEvent,
    LifecycleState, Strategy, StrategyContext, StrategyFault,
};
use helm_orders::{Leg, OrderError, OrderIntent};
use helm_position::Transition;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ── Helpers ──────────────────────────────────────────────────────────

fn step(px: Decimal, ts: u64) -> StepContext {
    StepContext::new(Price::new(px), ts).unwrap()
}

fn leg(qty: Decimal, px: Decimal) -> Leg {
    Leg::new(Size::new(qty), Price::new(px))
}

fn id(raw: &str) -> OrderId {
    OrderId::from(raw)
}

fn submits(cmds: &[VenueCommand]) -> Vec<&OrderRequest> {
    cmds.iter()
        .filter_map(|c| match c {
            VenueCommand::Submit(order) => Some(order),
            VenueCommand::Cancel { .. } => None,
        })
        .collect()
}

fn cancels(cmds: &[VenueCommand]) -> Vec<&OrderId> {
    cmds.iter()
        .filter_map(|c| match c {
            VenueCommand::Cancel { order_id, .. } => Some(order_id),
            VenueCommand::Submit(_) => None,
        })
        .collect()
}

fn fill(order_id: &str, qty: Decimal, px: Decimal, ts: u64) -> FillEvent {
    FillEvent::new(id(order_id), Size::new(qty), Price::new(px), ts)
}

/// Records every hook call with the purpose of its triggering order and the
/// position the hook saw.
#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<(Hook, Option<OrderPurpose>)>,
    seen: Vec<(Hook, PositionSide, Size)>,
    fail_on: Option<Hook>,
}

impl Recorder {
    fn failing_on(hook: Hook) -> Self {
        Self {
            fail_on: Some(hook),
            ..Self::default()
        }
    }

    fn record(
        &mut self,
        hook: Hook,
        ctx: &StrategyContext<'_>,
        event: Option<&LifecycleEvent>,
    ) -> HookResult {
        let view = ctx.position();
        self.seen.push((hook, view.side(), view.quantity()));
        self.calls.push((hook, event.map(|e| e.order.purpose)));
        if self.fail_on == Some(hook) {
            return Err(StrategyFault::new(format!("{hook} exploded")));
        }
        Ok(())
    }

    fn hooks(&self) -> Vec<Hook> {
        self.calls.iter().map(|(h, _)| *h).collect()
    }
}

impl Strategy for Recorder {
    fn on_opened(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        self.record(Hook::OnOpened, ctx, Some(event))
    }

    fn on_increased(
        &mut self,
        ctx: &mut StrategyContext<'_>,
        event: &LifecycleEvent,
    ) -> HookResult {
        self.record(Hook::OnIncreased, ctx, Some(event))
    }

    fn on_reduced(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        self.record(Hook::OnReduced, ctx, Some(event))
    }

    fn on_closed(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        self.record(Hook::OnClosed, ctx, Some(event))
    }

    fn on_all_canceled(&mut self, ctx: &mut StrategyContext<'_>) -> HookResult {
        self.record(Hook::OnAllCanceled, ctx, None)
    }
}

fn engine() -> InstrumentEngine<Recorder> {
    InstrumentEngine::new(
        InstrumentId::new("BTC"),
        EngineConfig::default(),
        Recorder::default(),
    )
}

/// Long 10 @ 100 via a market entry (BTC-1), then TP 4 @ 110 (BTC-2) and
/// SL 10 @ 90 (BTC-3).
fn bracketed_long() -> InstrumentEngine<Recorder> {
    let mut e = engine();
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(10), dec!(100))),
        &step(dec!(100), 1),
    )
    .unwrap();
    e.on_fill(&fill("BTC-1", dec!(10), dec!(100), 2), &step(dec!(100), 2))
        .unwrap();

    let s = step(dec!(100), 3);
    e.declare(
        OrderIntent::take_profit(PositionSide::Long, leg(dec!(4), dec!(110))),
        &s,
    )
    .unwrap();
    e.declare(
        OrderIntent::stop_loss(PositionSide::Long, leg(dec!(10), dec!(90))),
        &s,
    )
    .unwrap();
    e.drain_commands();
    e
}

// ── Open / reduce / close ────────────────────────────────────────────

#[test]
fn open_reduce_close_dispatches_each_hook_once() {
    let mut e = bracketed_long();
    assert_eq!(e.position().entry_price, Some(Price::new(dec!(100))));

    let reduced = e
        .on_fill(&fill("BTC-2", dec!(4), dec!(110), 4), &step(dec!(110), 4))
        .unwrap();
    assert_eq!(reduced.transitions(), vec![Transition::Reduced]);
    assert_eq!(reduced.events[0].delta.realized_pnl, dec!(40));
    assert_eq!(e.position().entry_price, Some(Price::new(dec!(100))));
    assert_eq!(e.position().quantity, Size::new(dec!(6)));

    // The 10 lot stop is re-placed for the 6 still open.
    let cmds = e.drain_commands();
    assert_eq!(cancels(&cmds), vec![&id("BTC-3")]);
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].id, id("BTC-4"));
    assert_eq!(placed[0].purpose, OrderPurpose::StopLoss);
    assert_eq!(placed[0].quantity, Size::new(dec!(6)));
    assert_eq!(placed[0].price, Price::new(dec!(90)));

    let closed = e
        .on_fill(&fill("BTC-4", dec!(6), dec!(90), 5), &step(dec!(90), 5))
        .unwrap();
    assert_eq!(closed.transitions(), vec![Transition::Closed]);
    assert!(e.position().is_flat());
    assert_eq!(e.position().quantity, Size::ZERO);
    assert_eq!(e.lifecycle(), LifecycleState::Flat);
    assert_eq!(e.ledger().total_realized_pnl(), dec!(-20));

    assert_eq!(
        e.strategy().calls,
        vec![
            (Hook::OnOpened, Some(OrderPurpose::Entry)),
            (Hook::OnReduced, Some(OrderPurpose::TakeProfit)),
            (Hook::OnClosed, Some(OrderPurpose::StopLoss)),
        ]
    );

    // Both exits are already done or on their way out.
    assert!(e.drain_commands().is_empty());
}

#[test]
fn reduce_to_zero_fires_only_closed() {
    let mut e = bracketed_long();
    let outcome = e
        .on_fill(&fill("BTC-3", dec!(10), dec!(90), 4), &step(dec!(90), 4))
        .unwrap();

    assert_eq!(outcome.transitions(), vec![Transition::Closed]);
    assert_eq!(
        e.strategy().hooks(),
        vec![Hook::OnOpened, Hook::OnClosed]
    );

    // Take-profit sibling is canceled by close housekeeping.
    let cmds = e.drain_commands();
    assert_eq!(cancels(&cmds), vec![&id("BTC-2")]);
    assert_eq!(e.ledger().closed_trade_count(), 1);
    let trade = e.ledger().last_closed_trade().unwrap();
    assert_eq!(trade.close_purpose, OrderPurpose::StopLoss);
    assert_eq!(trade.realized_pnl, dec!(-100));
}

#[test]
fn increase_updates_weighted_entry() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(
            PositionSide::Long,
            vec![leg(dec!(1), dec!(100)), leg(dec!(3), dec!(90))],
        ),
        &s,
    )
    .unwrap();

    e.on_fill(&fill("BTC-1", dec!(1), dec!(100), 2), &s).unwrap();
    let outcome = e
        .on_fill(&fill("BTC-2", dec!(3), dec!(90), 3), &step(dec!(90), 3))
        .unwrap();

    assert_eq!(outcome.transitions(), vec![Transition::Increased]);
    assert_eq!(e.position().entry_price, Some(Price::new(dec!(92.5))));
    assert_eq!(e.strategy().hooks(), vec![Hook::OnOpened, Hook::OnIncreased]);
}

// ── Flip ─────────────────────────────────────────────────────────────

#[test]
fn stale_stop_fill_is_clamped_and_never_opens_reverse() {
    let mut e = bracketed_long();
    e.on_fill(&fill("BTC-2", dec!(4), dec!(110), 4), &step(dec!(110), 4))
        .unwrap();
    e.drain_commands();

    // The venue fills the old 10 lot stop before our cancel lands.
    let outcome = e
        .on_fill(&fill("BTC-3", dec!(10), dec!(90), 5), &step(dec!(90), 5))
        .unwrap();

    assert_eq!(outcome.transitions(), vec![Transition::Closed]);
    assert_eq!(outcome.events[0].delta.quantity, Size::new(dec!(6)));
    assert_eq!(outcome.order.filled_quantity, Size::new(dec!(10)));
    assert!(e.position().is_flat());
    assert_eq!(e.lifecycle(), LifecycleState::Flat);
    assert_eq!(e.ledger().total_realized_pnl(), dec!(-20));

    // The trimmed replacement is pulled with the rest of the bracket.
    assert_eq!(cancels(&e.drain_commands()), vec![&id("BTC-4")]);
    assert_eq!(
        e.strategy().hooks(),
        vec![Hook::OnOpened, Hook::OnReduced, Hook::OnClosed]
    );
}

#[test]
fn exit_fill_while_flat_changes_nothing() {
    let mut e = bracketed_long();
    e.on_fill(&fill("BTC-3", dec!(10), dec!(90), 4), &step(dec!(90), 4))
        .unwrap();
    assert!(e.position().is_flat());

    // Take-profit cancel raced a fill.
    let outcome = e
        .on_fill(&fill("BTC-2", dec!(4), dec!(110), 5), &step(dec!(110), 5))
        .unwrap();
    assert!(outcome.events.is_empty());
    assert!(e.position().is_flat());
    assert_eq!(e.ledger().closed_trade_count(), 1);
    assert_eq!(e.strategy().hooks(), vec![Hook::OnOpened, Hook::OnClosed]);
}

/// Long 10 entry (BTC-1) racing its replacement by a short 15 entry (BTC-2).
fn racing_entries(strategy: Recorder) -> InstrumentEngine<Recorder> {
    let mut e = InstrumentEngine::new(InstrumentId::new("BTC"), EngineConfig::default(), strategy);
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(10), dec!(100))),
        &s,
    )
    .unwrap();
    e.declare(
        OrderIntent::entry(PositionSide::Short, leg(dec!(15), dec!(100))),
        &s,
    )
    .unwrap();
    e.on_fill(&fill("BTC-1", dec!(10), dec!(100), 2), &step(dec!(100), 2))
        .unwrap();
    e
}

#[test]
fn entry_crossing_zero_closes_then_opens() {
    let mut e = racing_entries(Recorder::default());

    let outcome = e
        .on_fill(&fill("BTC-2", dec!(15), dec!(100), 3), &step(dec!(100), 3))
        .unwrap();
    assert_eq!(
        outcome.transitions(),
        vec![Transition::Closed, Transition::Opened]
    );
    assert_eq!(outcome.events[0].delta.quantity, Size::new(dec!(10)));
    assert_eq!(outcome.events[1].delta.quantity, Size::new(dec!(5)));

    let pos = e.position();
    assert_eq!(pos.side, PositionSide::Short);
    assert_eq!(pos.quantity, Size::new(dec!(5)));
    assert_eq!(e.lifecycle(), LifecycleState::Open);

    // Each hook sees only the slices committed before it.
    assert_eq!(
        e.strategy().seen,
        vec![
            (Hook::OnOpened, PositionSide::Long, Size::new(dec!(10))),
            (Hook::OnClosed, PositionSide::Flat, Size::ZERO),
            (Hook::OnOpened, PositionSide::Short, Size::new(dec!(5))),
        ]
    );
}

#[test]
fn failing_close_hook_does_not_stop_the_open_of_a_flip() {
    let mut e = racing_entries(Recorder::failing_on(Hook::OnClosed));

    let outcome = e
        .on_fill(&fill("BTC-2", dec!(15), dec!(100), 3), &step(dec!(100), 3))
        .unwrap();
    assert_eq!(outcome.faults.len(), 1);
    assert_eq!(outcome.faults[0].hook, Hook::OnClosed);
    assert_eq!(
        e.strategy().hooks(),
        vec![Hook::OnOpened, Hook::OnClosed, Hook::OnOpened]
    );
    assert_eq!(e.position().side, PositionSide::Short);
    assert_eq!(e.lifecycle(), LifecycleState::Open);
}

// ── Supersede ────────────────────────────────────────────────────────

#[test]
fn new_stop_loss_supersedes_previous() {
    let mut e = bracketed_long();
    let s = step(dec!(100), 4);

    e.declare(
        OrderIntent::stop_loss(PositionSide::Long, leg(dec!(10), dec!(95))),
        &s,
    )
    .unwrap();

    let cmds = e.drain_commands();
    assert_eq!(cancels(&cmds), vec![&id("BTC-3")]);
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].price, Price::new(dec!(95)));

    let current: Vec<_> = e
        .outstanding()
        .iter()
        .filter(|o| o.purpose == OrderPurpose::StopLoss && o.state.is_active())
        .filter(|o| o.state != helm_core::OrderState::CancelRequested)
        .collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].id, id("BTC-4"));
}

// ── Allocation ───────────────────────────────────────────────────────

#[test]
fn multi_leg_take_profit_allocation() {
    let mut e = engine();
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(10), dec!(100))),
        &step(dec!(100), 1),
    )
    .unwrap();
    e.on_fill(&fill("BTC-1", dec!(10), dec!(100), 2), &step(dec!(100), 2))
        .unwrap();
    e.drain_commands();

    let s = step(dec!(100), 3);
    e.declare(
        OrderIntent::take_profit(
            PositionSide::Long,
            vec![leg(dec!(5), dec!(120)), leg(dec!(5), dec!(140))],
        ),
        &s,
    )
    .unwrap();
    let cmds = e.drain_commands();
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 2);
    let total: Size = placed.iter().map(|o| o.quantity).sum();
    assert_eq!(total, Size::new(dec!(10)));
    assert!(placed.iter().all(|o| o.order_type == OrderType::Limit));

    // Under-allocation is allowed.
    e.declare(
        OrderIntent::take_profit(
            PositionSide::Long,
            vec![leg(dec!(4), dec!(120)), leg(dec!(4), dec!(140))],
        ),
        &s,
    )
    .unwrap();

    let err = e
        .declare(
            OrderIntent::take_profit(
                PositionSide::Long,
                vec![leg(dec!(6), dec!(120)), leg(dec!(6), dec!(140))],
            ),
            &s,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Order(OrderError::OverAllocation { .. })
    ));
}

// ── Classification ───────────────────────────────────────────────────

#[test]
fn entry_type_follows_reference_price() {
    let mut e = engine();
    let s = step(dec!(100), 1);

    let cases = [
        (PositionSide::Long, dec!(100), OrderType::Market),
        (PositionSide::Long, dec!(95), OrderType::Limit),
        (PositionSide::Long, dec!(105), OrderType::Stop),
        (PositionSide::Short, dec!(100), OrderType::Market),
        (PositionSide::Short, dec!(105), OrderType::Limit),
        (PositionSide::Short, dec!(95), OrderType::Stop),
    ];
    for (side, px, expected) in cases {
        e.declare(OrderIntent::entry(side, leg(dec!(1), px)), &s)
            .unwrap();
        let cmds = e.drain_commands();
        let placed = submits(&cmds);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].order_type, expected, "{side} entry at {px}");
        let expected_side = if side == PositionSide::Long {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        };
        assert_eq!(placed[0].side, expected_side);
    }
}

// ── State conflicts ──────────────────────────────────────────────────

#[test]
fn exit_intents_need_compatible_exposure() {
    let mut e = engine();
    let s = step(dec!(100), 1);

    let err = e
        .declare(
            OrderIntent::stop_loss(PositionSide::Long, leg(dec!(1), dec!(90))),
            &s,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(OrderError::StateConflict(_))));

    e.declare(
        OrderIntent::entry(PositionSide::Short, leg(dec!(2), dec!(100))),
        &s,
    )
    .unwrap();
    e.on_fill(&fill("BTC-1", dec!(2), dec!(100), 2), &s).unwrap();

    let err = e
        .declare(
            OrderIntent::stop_loss(PositionSide::Long, leg(dec!(2), dec!(90))),
            &s,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(OrderError::StateConflict(_))));

    let err = e
        .declare(
            OrderIntent::entry(PositionSide::Long, leg(dec!(1), dec!(100))),
            &s,
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(OrderError::StateConflict(_))));
}

// ── Fill validation ──────────────────────────────────────────────────

#[test]
fn bad_fills_never_touch_the_ledger() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(2), dec!(100))),
        &s,
    )
    .unwrap();

    let err = e
        .on_fill(&fill("BTC-1", dec!(3), dec!(100), 2), &s)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Order(OrderError::FillExceedsOrder { .. })
    ));

    let err = e
        .on_fill(&fill("BTC-42", dec!(1), dec!(100), 2), &s)
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(OrderError::UnknownOrder(_))));
    assert!(e.position().is_flat());
    assert!(e.strategy().calls.is_empty());

    e.on_fill(&fill("BTC-1", dec!(2), dec!(100), 3), &s).unwrap();
    let err = e
        .on_fill(&fill("BTC-1", dec!(1), dec!(100), 4), &s)
        .unwrap_err();
    assert!(matches!(err, EngineError::Order(OrderError::TerminalOrder { .. })));
    assert_eq!(e.position().quantity, Size::new(dec!(2)));
}

// ── Entry siblings ───────────────────────────────────────────────────

#[test]
fn entry_fill_cancels_siblings_when_enabled() {
    let config = EngineConfig {
        should_cancel_entry: true,
        ..EngineConfig::default()
    };
    let mut e = InstrumentEngine::new(InstrumentId::new("BTC"), config, Recorder::default());
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(
            PositionSide::Long,
            vec![leg(dec!(1), dec!(95)), leg(dec!(1), dec!(90))],
        ),
        &s,
    )
    .unwrap();
    e.drain_commands();

    e.on_fill(&fill("BTC-1", dec!(1), dec!(95), 2), &step(dec!(95), 2))
        .unwrap();
    let cmds = e.drain_commands();
    assert_eq!(cancels(&cmds), vec![&id("BTC-2")]);
}

#[test]
fn entry_siblings_kept_by_default() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(
            PositionSide::Long,
            vec![leg(dec!(1), dec!(95)), leg(dec!(1), dec!(90))],
        ),
        &s,
    )
    .unwrap();
    e.drain_commands();

    e.on_fill(&fill("BTC-1", dec!(1), dec!(95), 2), &step(dec!(95), 2))
        .unwrap();
    assert!(cancels(&e.drain_commands()).is_empty());
    assert_eq!(e.outstanding().len(), 1);
}

// ── Cancel-all ───────────────────────────────────────────────────────

#[test]
fn all_canceled_fires_once_after_every_order_is_terminal() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(
            PositionSide::Long,
            vec![leg(dec!(1), dec!(90)), leg(dec!(1), dec!(80))],
        ),
        &s,
    )
    .unwrap();
    e.drain_commands();

    let report = e.cancel_all(&s);
    assert!(!report.all_canceled);
    assert_eq!(cancels(&e.drain_commands()).len(), 2);

    let confirm = CancelConfirmation {
        order_id: id("BTC-1"),
        timestamp_ms: 2,
    };
    assert!(!e.on_cancel_confirmed(&confirm, &s).all_canceled);
    assert!(e.strategy().calls.is_empty());

    // A rejection is terminal too.
    assert!(e.on_reject(&id("BTC-2"), &s).all_canceled);
    assert_eq!(e.strategy().hooks(), vec![Hook::OnAllCanceled]);

    // Late duplicates are no-ops.
    assert!(!e.on_cancel_confirmed(&confirm, &s).all_canceled);
    assert_eq!(e.strategy().hooks(), vec![Hook::OnAllCanceled]);
}

#[test]
fn cancel_all_with_nothing_outstanding_fires_immediately() {
    let mut e = engine();
    let report = e.cancel_all(&step(dec!(100), 1));
    assert!(report.all_canceled);
    assert_eq!(e.strategy().hooks(), vec![Hook::OnAllCanceled]);
    assert!(e.drain_commands().is_empty());
}

#[test]
fn fill_racing_a_cancel_counts_toward_barrier() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(1), dec!(90))),
        &s,
    )
    .unwrap();
    e.cancel_all(&s);

    let outcome = e
        .on_fill(&fill("BTC-1", dec!(1), dec!(90), 2), &step(dec!(90), 2))
        .unwrap();
    assert!(outcome.all_canceled);
    assert_eq!(e.strategy().hooks(), vec![Hook::OnOpened, Hook::OnAllCanceled]);
}

// ── Faults ───────────────────────────────────────────────────────────

#[test]
fn hook_fault_is_isolated_and_state_stays_committed() {
    let mut e = InstrumentEngine::new(
        InstrumentId::new("BTC"),
        EngineConfig::default(),
        Recorder::failing_on(Hook::OnOpened),
    );
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(2), dec!(100))),
        &s,
    )
    .unwrap();

    let outcome = e.on_fill(&fill("BTC-1", dec!(2), dec!(100), 2), &s).unwrap();
    assert_eq!(outcome.faults.len(), 1);
    assert_eq!(outcome.faults[0].hook, Hook::OnOpened);
    assert_eq!(outcome.faults[0].order_id, Some(id("BTC-1")));
    assert_eq!(e.position().quantity, Size::new(dec!(2)));
    assert_eq!(e.lifecycle(), LifecycleState::Open);

    e.declare(
        OrderIntent::take_profit(PositionSide::Long, leg(dec!(1), dec!(110))),
        &s,
    )
    .unwrap();
    let outcome = e.on_fill(&fill("BTC-2", dec!(1), dec!(110), 3), &s).unwrap();
    assert!(outcome.faults.is_empty());
    assert_eq!(e.strategy().hooks(), vec![Hook::OnOpened, Hook::OnReduced]);
}

// ── Armed exits ──────────────────────────────────────────────────────

#[test]
fn exit_declared_before_entry_fills_is_armed() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(10), dec!(95))),
        &s,
    )
    .unwrap();

    let (result, _) = e.with_context(&s, |ctx| ctx.set_stop_loss(leg(dec!(10), dec!(90))));
    result.unwrap();
    assert_eq!(e.armed().len(), 1);
    let cmds = e.drain_commands();
    assert!(submits(&cmds)
        .iter()
        .all(|o| o.purpose == OrderPurpose::Entry));

    // Over-allocated against the pending entry.
    let err = e
        .declare(
            OrderIntent::take_profit(PositionSide::Long, leg(dec!(12), dec!(120))),
            &s,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Order(OrderError::OverAllocation { .. })
    ));

    e.on_fill(&fill("BTC-1", dec!(10), dec!(95), 2), &step(dec!(95), 2))
        .unwrap();
    assert!(e.armed().is_empty());
    let cmds = e.drain_commands();
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].purpose, OrderPurpose::StopLoss);
    assert_eq!(placed[0].order_type, OrderType::Stop);
    assert_eq!(placed[0].quantity, Size::new(dec!(10)));
}

#[test]
fn armed_exit_waits_for_full_cover_then_is_discarded_if_entry_dies() {
    let mut e = engine();
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(10), dec!(95))),
        &s,
    )
    .unwrap();
    e.declare(
        OrderIntent::take_profit(PositionSide::Long, leg(dec!(10), dec!(120))),
        &s,
    )
    .unwrap();

    e.on_fill(&fill("BTC-1", dec!(4), dec!(95), 2), &step(dec!(95), 2))
        .unwrap();
    assert_eq!(e.armed().len(), 1);

    e.on_reject(&id("BTC-1"), &step(dec!(95), 3));
    assert!(e.armed().is_empty());
    assert!(submits(&e.drain_commands())
        .iter()
        .all(|o| o.purpose == OrderPurpose::Entry));
    assert_eq!(e.position().quantity, Size::new(dec!(4)));
}

// ── Liquidate ────────────────────────────────────────────────────────

#[test]
fn liquidate_cancels_and_closes_at_market() {
    let mut e = bracketed_long();
    let s = step(dec!(105), 4);

    assert!(e.liquidate(&s));
    let cmds = e.drain_commands();
    assert_eq!(cancels(&cmds), vec![&id("BTC-2"), &id("BTC-3")]);
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 1);
    let order = placed[0];
    assert_eq!(order.purpose, OrderPurpose::Liquidation);
    assert_eq!(order.order_type, OrderType::Market);
    assert_eq!(order.side, OrderSide::Sell);
    assert_eq!(order.quantity, Size::new(dec!(10)));

    let order_id = order.id.as_str().to_string();
    e.on_fill(&fill(&order_id, dec!(10), dec!(105), 5), &s)
        .unwrap();
    assert!(e.position().is_flat());
    assert_eq!(
        e.strategy().calls.last(),
        Some(&(Hook::OnClosed, Some(OrderPurpose::Liquidation)))
    );

    // No all-canceled notification: liquidation does not arm the barrier.
    e.on_cancel_confirmed(
        &CancelConfirmation {
            order_id: id("BTC-2"),
            timestamp_ms: 6,
        },
        &s,
    );
    e.on_cancel_confirmed(
        &CancelConfirmation {
            order_id: id("BTC-3"),
            timestamp_ms: 6,
        },
        &s,
    );
    assert!(!e.strategy().hooks().contains(&Hook::OnAllCanceled));
}

#[test]
fn liquidate_while_flat_is_noop() {
    let mut e = engine();
    assert!(!e.liquidate(&step(dec!(100), 1)));
    assert!(e.drain_commands().is_empty());
}

// ── Reactive strategy ────────────────────────────────────────────────

/// Protects every new position and trails the stop to breakeven on reduce.
struct Bracket;

impl Strategy for Bracket {
    fn on_opened(&mut self, ctx: &mut StrategyContext<'_>, _event: &LifecycleEvent) -> HookResult {
        let view = ctx.position();
        let entry = view.entry_price().ok_or_else(|| StrategyFault::new("no entry"))?;
        let stop = Price::new(entry.inner() - dec!(10));
        let qty = view.quantity();
        ctx.set_stop_loss(Leg::new(qty, stop))?;
        Ok(())
    }

    fn on_reduced(&mut self, ctx: &mut StrategyContext<'_>, _event: &LifecycleEvent) -> HookResult {
        let view = ctx.position();
        let entry = view.entry_price().ok_or_else(|| StrategyFault::new("no entry"))?;
        let qty = view.quantity();
        ctx.set_stop_loss(Leg::new(qty, entry))?;
        Ok(())
    }
}

#[test]
fn hooks_can_declare_intents() {
    let mut e = InstrumentEngine::new(InstrumentId::new("BTC"), EngineConfig::default(), Bracket);
    let s = step(dec!(100), 1);
    e.declare(
        OrderIntent::entry(PositionSide::Long, leg(dec!(10), dec!(100))),
        &s,
    )
    .unwrap();
    e.drain_commands();

    e.on_fill(&fill("BTC-1", dec!(10), dec!(100), 2), &s).unwrap();
    let cmds = e.drain_commands();
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].purpose, OrderPurpose::StopLoss);
    assert_eq!(placed[0].price, Price::new(dec!(90)));
    assert_eq!(placed[0].quantity, Size::new(dec!(10)));

    e.declare(
        OrderIntent::take_profit(PositionSide::Long, leg(dec!(4), dec!(110))),
        &s,
    )
    .unwrap();
    e.drain_commands();

    let outcome = e
        .on_fill(&fill("BTC-3", dec!(4), dec!(110), 3), &step(dec!(110), 3))
        .unwrap();
    assert!(outcome.faults.is_empty());

    // Housekeeping trims the stop to 6, then the hook trails it to entry.
    let cmds = e.drain_commands();
    assert_eq!(cancels(&cmds), vec![&id("BTC-2"), &id("BTC-4")]);
    let placed = submits(&cmds);
    assert_eq!(placed.len(), 2);
    assert_eq!(placed[0].price, Price::new(dec!(90)));
    let trailed = placed[1];
    assert_eq!(trailed.price, Price::new(dec!(100)));
    assert_eq!(trailed.quantity, Size::new(dec!(6)));
    assert_eq!(trailed.order_type, OrderType::Stop);
}

#[test]
fn identical_inputs_produce_identical_commands() {
    fn run() -> Vec<VenueCommand> {
        let mut e = bracketed_long();
        e.on_fill(&fill("BTC-2", dec!(4), dec!(110), 4), &step(dec!(110), 4))
            .unwrap();
        e.on_fill(&fill("BTC-4", dec!(6), dec!(90), 5), &step(dec!(90), 5))
            .unwrap();
        e.drain_commands()
    }
    assert_eq!(run(), run());
}
