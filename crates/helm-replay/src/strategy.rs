//! Built-in replay strategy.

use rust_decimal::Decimal;
use tracing::info;

use helm_engine::{HookResult, LifecycleEvent, Strategy, StrategyContext};
use helm_orders::Leg;

use crate::config::StrategyConfig;

/// Logs every lifecycle hook. Optionally trails the stop to breakeven.
#[derive(Debug, Default)]
pub struct LoggingStrategy {
    config: StrategyConfig,
    breakeven_moves: usize,
}

impl LoggingStrategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            breakeven_moves: 0,
        }
    }

    pub fn breakeven_moves(&self) -> usize {
        self.breakeven_moves
    }

    fn log(ctx: &StrategyContext<'_>, event: &LifecycleEvent) {
        let position = ctx.position();
        info!(
            instrument = %ctx.instrument(),
            transition = event.transition.as_str(),
            order_id = %event.order.id,
            purpose = %event.order.purpose,
            fill_quantity = %event.delta.quantity,
            fill_price = %event.delta.price,
            side = %position.side(),
            quantity = %position.quantity(),
            pnl = %position.pnl(),
            "Lifecycle event"
        );
    }
}

impl Strategy for LoggingStrategy {
    fn on_opened(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        Self::log(ctx, event);
        Ok(())
    }

    fn on_increased(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        Self::log(ctx, event);
        Ok(())
    }

    fn on_reduced(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        Self::log(ctx, event);
        if !self.config.breakeven_on_reduce {
            return Ok(());
        }

        let position = ctx.position();
        let Some(entry) = position.entry_price() else {
            return Ok(());
        };
        if position.unrealized_pnl() <= Decimal::ZERO {
            return Ok(());
        }
        let quantity = position.quantity();
        ctx.set_stop_loss(Leg::new(quantity, entry))?;
        self.breakeven_moves += 1;
        info!(
            instrument = %ctx.instrument(),
            stop = %entry,
            quantity = %quantity,
            "Stop moved to breakeven"
        );
        Ok(())
    }

    fn on_closed(&mut self, ctx: &mut StrategyContext<'_>, event: &LifecycleEvent) -> HookResult {
        Self::log(ctx, event);
        if let Some(trade) = &event.delta.closed_trade {
            info!(
                instrument = %ctx.instrument(),
                entry_price = %trade.entry_price,
                exit_price = %trade.exit_price,
                move_pct = ?trade.exit_price.pct_from(trade.entry_price),
                net_pnl = %trade.net_pnl(),
                "Trade finished"
            );
        }
        Ok(())
    }

    fn on_all_canceled(&mut self, ctx: &mut StrategyContext<'_>) -> HookResult {
        info!(instrument = %ctx.instrument(), "All orders canceled");
        Ok(())
    }
}
