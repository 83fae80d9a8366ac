// 8.6 engine/ticks.rs: the per-tick pipeline. one tick runs to completion
// before the next is accepted:
//
//   mark-to-market -> conditional order triggers -> liquidation monitor
//   -> bot strategy ticks
//
// margin positions mark at the bid/ask midpoint, spot holdings at last.
// per-account failures inside the pipeline are logged and isolated by the
// downstream stages; nothing propagates out of this function.

use super::core::Engine;
use super::results::TickReport;
use crate::price_feed::PriceTick;

impl Engine {
    pub fn on_price_tick(&mut self, tick: PriceTick) -> TickReport {
        // engine time never runs backwards on an out-of-order tick
        if tick.timestamp > self.current_time {
            self.current_time = tick.timestamp;
        }

        let mark = tick.mid();
        let maintenance_ratio = self.config.margin.maintenance_ratio;

        for position in self
            .spot_positions
            .values_mut()
            .filter(|p| p.symbol == tick.symbol)
        {
            position.mark(tick.last);
        }
        for position in self
            .margin_positions
            .values_mut()
            .filter(|p| p.symbol == tick.symbol)
        {
            position.mark(mark);
            // re-derived every tick: the lock lifts if the mark recovers
            position.liquidating = position.breaches_liquidation(maintenance_ratio);
        }

        self.ticks.update(tick.clone());

        let (orders_filled, orders_cancelled) = self.process_order_triggers(&tick);
        let positions_liquidated = self.run_liquidation_monitor();
        let bot_trades = self.tick_bots(&tick);

        TickReport {
            symbol: tick.symbol,
            orders_filled,
            orders_cancelled,
            positions_liquidated,
            bot_trades,
        }
    }
}
