//! DCA bot: periodic fixed-amount buys, optional safety orders on the way
//! down, deal exit on take-profit (plain or trailing) or stop-loss.
//!
//! The strategy function is pure decision logic: it looks at config, runtime
//! state and the current price and names the actions for this tick. The
//! engine executes them and reports fills back via `record_buy`/`reset_deal`,
//! so the averaging state is only ever updated from actual executions.

use crate::types::{Price, Qty, Quote, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaConfig {
    // quote-currency amount per base order
    pub order_amount: Quote,
    pub frequency_ms: i64,
    pub take_profit_pct: Decimal,
    pub stop_loss_pct: Option<Decimal>,
    // retrace from peak profit that ends a trailing deal
    pub trailing_deviation_pct: Option<Decimal>,
    pub safety_orders: Option<SafetyOrderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyOrderConfig {
    pub max_count: u32,
    // quote-currency size of the first safety order
    pub order_amount: Quote,
    // drop below average (in percent) that arms safety order n at
    // step_pct * step_scale^n
    pub step_pct: Decimal,
    pub step_scale: Decimal,
    // each successive safety order is volume_scale times larger
    pub volume_scale: Decimal,
}

impl DcaConfig {
    pub fn basic(order_amount: Quote, frequency_ms: i64, take_profit_pct: Decimal) -> Self {
        Self {
            order_amount,
            frequency_ms,
            take_profit_pct,
            stop_loss_pct: None,
            trailing_deviation_pct: None,
            safety_orders: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.order_amount.value() <= Decimal::ZERO {
            return Err("order amount must be positive".into());
        }
        if self.frequency_ms <= 0 {
            return Err("frequency must be positive".into());
        }
        if self.take_profit_pct <= Decimal::ZERO {
            return Err("take profit must be positive".into());
        }
        if let Some(sl) = self.stop_loss_pct {
            if sl <= Decimal::ZERO {
                return Err("stop loss must be positive".into());
            }
        }
        if let Some(dev) = self.trailing_deviation_pct {
            if dev <= Decimal::ZERO || dev >= self.take_profit_pct {
                return Err("trailing deviation must be positive and below take profit".into());
            }
        }
        if let Some(safety) = &self.safety_orders {
            if safety.max_count == 0 || safety.order_amount.value() <= Decimal::ZERO {
                return Err("safety orders need a count and a positive size".into());
            }
            if safety.step_pct <= Decimal::ZERO
                || safety.step_scale < Decimal::ONE
                || safety.volume_scale < Decimal::ONE
            {
                return Err("safety step must be positive, scales at least 1".into());
            }
        }
        Ok(())
    }
}

/// Averaging state for the current deal plus lifetime counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaState {
    pub total_quantity: Qty,
    pub total_spent: Quote,
    pub avg_price: Option<Price>,
    pub safety_fills: u32,
    pub next_base_buy_at: Timestamp,
    // trailing take-profit bookkeeping, reset per deal
    pub trailing_armed: bool,
    pub peak_profit_pct: Decimal,
    pub deals_completed: u64,
}

impl DcaState {
    pub fn new(now: Timestamp) -> Self {
        Self {
            total_quantity: Qty::zero(),
            total_spent: Quote::zero(),
            avg_price: None,
            safety_fills: 0,
            next_base_buy_at: now,
            trailing_armed: false,
            peak_profit_pct: Decimal::ZERO,
            deals_completed: 0,
        }
    }

    /// Fold an executed buy into the deal average. `spent` is fee-inclusive,
    /// so the average tracks true break-even cost.
    pub fn record_buy(&mut self, quantity: Qty, spent: Quote, safety: bool) {
        self.total_quantity = self.total_quantity.add(quantity);
        self.total_spent = self.total_spent.add(spent);
        if !self.total_quantity.is_zero() {
            self.avg_price = Price::new(self.total_spent.value() / self.total_quantity.value());
        }
        if safety {
            self.safety_fills += 1;
        }
    }

    /// Deal closed: bump the counter and restart averaging from scratch.
    pub fn reset_deal(&mut self) {
        self.total_quantity = Qty::zero();
        self.total_spent = Quote::zero();
        self.avg_price = None;
        self.safety_fills = 0;
        self.trailing_armed = false;
        self.peak_profit_pct = Decimal::ZERO;
        self.deals_completed += 1;
    }

    pub fn profit_pct(&self, price: Price) -> Option<Decimal> {
        let avg = self.avg_price?;
        Some((price.value() / avg.value() - Decimal::ONE) * dec!(100))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DealCloseReason {
    TakeProfit,
    StopLoss,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DcaAction {
    BaseBuy { amount: Quote },
    SafetyBuy { amount: Quote, index: u32 },
    CloseDeal { reason: DealCloseReason },
}

/// One strategy tick. Exit checks run before new buys, so a deal never adds
/// to a position it is about to close.
pub fn dca_tick(
    config: &DcaConfig,
    state: &mut DcaState,
    price: Price,
    now: Timestamp,
) -> Vec<DcaAction> {
    let mut actions = Vec::new();

    if let Some(profit_pct) = state.profit_pct(price) {
        // stop loss beats everything
        if let Some(sl) = config.stop_loss_pct {
            if profit_pct <= -sl {
                actions.push(DcaAction::CloseDeal {
                    reason: DealCloseReason::StopLoss,
                });
                return actions;
            }
        }

        match config.trailing_deviation_pct {
            Some(deviation) => {
                if profit_pct >= config.take_profit_pct {
                    state.trailing_armed = true;
                    if profit_pct > state.peak_profit_pct {
                        state.peak_profit_pct = profit_pct;
                    }
                }
                // exit on retrace from the peak, but never below the raw floor
                if state.trailing_armed {
                    let exit_line = (state.peak_profit_pct - deviation).max(config.take_profit_pct);
                    if profit_pct <= exit_line {
                        actions.push(DcaAction::CloseDeal {
                            reason: DealCloseReason::TakeProfit,
                        });
                        return actions;
                    }
                }
            }
            None => {
                if profit_pct >= config.take_profit_pct {
                    actions.push(DcaAction::CloseDeal {
                        reason: DealCloseReason::TakeProfit,
                    });
                    return actions;
                }
            }
        }

        // safety order ladder: step n arms at step_pct * scale^n below average
        if let Some(safety) = &config.safety_orders {
            if state.safety_fills < safety.max_count {
                let n = state.safety_fills;
                let step = safety.step_pct * power(safety.step_scale, n);
                if profit_pct <= -step {
                    let amount = safety.order_amount.mul(power(safety.volume_scale, n));
                    actions.push(DcaAction::SafetyBuy { amount, index: n });
                }
            }
        }
    }

    if now >= state.next_base_buy_at {
        actions.push(DcaAction::BaseBuy {
            amount: config.order_amount,
        });
        state.next_base_buy_at = Timestamp::from_millis(now.as_millis() + config.frequency_ms);
    }

    actions
}

fn power(base: Decimal, exp: u32) -> Decimal {
    let mut result = Decimal::ONE;
    for _ in 0..exp {
        result *= base;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> DcaConfig {
        DcaConfig::basic(Quote::new(dec!(25)), 4 * 3_600_000, dec!(3))
    }

    fn px(v: Decimal) -> Price {
        Price::new_unchecked(v)
    }

    #[test]
    fn base_buy_respects_frequency() {
        let cfg = config();
        let mut state = DcaState::new(Timestamp::from_millis(0));

        let actions = dca_tick(&cfg, &mut state, px(dec!(100)), Timestamp::from_millis(0));
        assert_eq!(actions, vec![DcaAction::BaseBuy { amount: Quote::new(dec!(25)) }]);

        // one hour later: too early
        let actions = dca_tick(&cfg, &mut state, px(dec!(100)), Timestamp::from_millis(3_600_000));
        assert!(actions.is_empty());

        // four hours later: due again
        let actions = dca_tick(&cfg, &mut state, px(dec!(100)), Timestamp::from_millis(4 * 3_600_000));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn take_profit_only_above_weighted_average() {
        let cfg = config();
        let mut state = DcaState::new(Timestamp::from_millis(0));

        // buys at 100 / 95 / 90, 25 quote each
        for price in [dec!(100), dec!(95), dec!(90)] {
            let qty = Qty::new_unchecked(dec!(25) / price);
            state.record_buy(qty, Quote::new(dec!(25)), false);
        }
        let avg = state.avg_price.unwrap().value();
        state.next_base_buy_at = Timestamp::from_millis(i64::MAX); // isolate the exit check

        // just under the 3% line: no close
        let below = avg * dec!(1.029);
        let actions = dca_tick(&cfg, &mut state, px(below), Timestamp::from_millis(1));
        assert!(actions.is_empty());

        // at the line: deal closes
        let at = avg * dec!(1.03);
        let actions = dca_tick(&cfg, &mut state, px(at), Timestamp::from_millis(2));
        assert_eq!(
            actions,
            vec![DcaAction::CloseDeal { reason: DealCloseReason::TakeProfit }]
        );
    }

    #[test]
    fn trailing_exits_on_retrace_never_below_floor() {
        let mut cfg = config();
        cfg.trailing_deviation_pct = Some(dec!(1));
        let mut state = DcaState::new(Timestamp::from_millis(0));
        state.record_buy(Qty::new_unchecked(dec!(1)), Quote::new(dec!(100)), false);
        state.next_base_buy_at = Timestamp::from_millis(i64::MAX);

        // crosses the 3% floor: arms, no exit while climbing
        assert!(dca_tick(&cfg, &mut state, px(dec!(103.5)), Timestamp::from_millis(1)).is_empty());
        assert!(state.trailing_armed);
        assert!(dca_tick(&cfg, &mut state, px(dec!(106)), Timestamp::from_millis(2)).is_empty());
        assert_eq!(state.peak_profit_pct, dec!(6));

        // retrace within deviation: hold
        assert!(dca_tick(&cfg, &mut state, px(dec!(105.5)), Timestamp::from_millis(3)).is_empty());

        // retrace past peak - 1%: exit
        let actions = dca_tick(&cfg, &mut state, px(dec!(104.9)), Timestamp::from_millis(4));
        assert_eq!(
            actions,
            vec![DcaAction::CloseDeal { reason: DealCloseReason::TakeProfit }]
        );
    }

    #[test]
    fn trailing_floor_is_a_hard_exit() {
        let mut cfg = config();
        cfg.trailing_deviation_pct = Some(dec!(1));
        let mut state = DcaState::new(Timestamp::from_millis(0));
        state.record_buy(Qty::new_unchecked(dec!(1)), Quote::new(dec!(100)), false);
        state.next_base_buy_at = Timestamp::from_millis(i64::MAX);

        // peak at 10%, then crash toward the floor: exit fires at the floor,
        // not below it
        assert!(dca_tick(&cfg, &mut state, px(dec!(110)), Timestamp::from_millis(1)).is_empty());
        let actions = dca_tick(&cfg, &mut state, px(dec!(103)), Timestamp::from_millis(2));
        assert_eq!(
            actions,
            vec![DcaAction::CloseDeal { reason: DealCloseReason::TakeProfit }]
        );
    }

    #[test]
    fn stop_loss_closes_the_deal() {
        let mut cfg = config();
        cfg.stop_loss_pct = Some(dec!(10));
        let mut state = DcaState::new(Timestamp::from_millis(0));
        state.record_buy(Qty::new_unchecked(dec!(1)), Quote::new(dec!(100)), false);
        state.next_base_buy_at = Timestamp::from_millis(i64::MAX);

        assert!(dca_tick(&cfg, &mut state, px(dec!(91)), Timestamp::from_millis(1)).is_empty());
        let actions = dca_tick(&cfg, &mut state, px(dec!(90)), Timestamp::from_millis(2));
        assert_eq!(
            actions,
            vec![DcaAction::CloseDeal { reason: DealCloseReason::StopLoss }]
        );
    }

    #[test]
    fn safety_ladder_scales_step_and_volume() {
        let mut cfg = config();
        cfg.safety_orders = Some(SafetyOrderConfig {
            max_count: 2,
            order_amount: Quote::new(dec!(50)),
            step_pct: dec!(2),
            step_scale: dec!(2),
            volume_scale: dec!(1.5),
        });
        let mut state = DcaState::new(Timestamp::from_millis(0));
        state.record_buy(Qty::new_unchecked(dec!(1)), Quote::new(dec!(100)), false);
        state.next_base_buy_at = Timestamp::from_millis(i64::MAX);

        // first safety arms at -2%
        let actions = dca_tick(&cfg, &mut state, px(dec!(98)), Timestamp::from_millis(1));
        assert_eq!(
            actions,
            vec![DcaAction::SafetyBuy { amount: Quote::new(dec!(50)), index: 0 }]
        );
        state.record_buy(Qty::new_unchecked(dec!(0.51)), Quote::new(dec!(50)), true);

        // second arms at -2% * 2 = -4% below the *new* average, sized 50 * 1.5
        let avg = state.avg_price.unwrap().value();
        let trigger = avg * dec!(0.96);
        let actions = dca_tick(&cfg, &mut state, px(trigger), Timestamp::from_millis(2));
        assert_eq!(
            actions,
            vec![DcaAction::SafetyBuy { amount: Quote::new(dec!(75.0)), index: 1 }]
        );
        state.record_buy(Qty::new_unchecked(dec!(0.8)), Quote::new(dec!(75)), true);

        // ladder exhausted
        let actions = dca_tick(&cfg, &mut state, px(trigger * dec!(0.9)), Timestamp::from_millis(3));
        assert!(actions.is_empty());
    }

    #[test]
    fn reset_restarts_averaging() {
        let mut state = DcaState::new(Timestamp::from_millis(0));
        state.record_buy(Qty::new_unchecked(dec!(1)), Quote::new(dec!(100)), false);
        state.record_buy(Qty::new_unchecked(dec!(1)), Quote::new(dec!(50)), true);
        assert_eq!(state.avg_price.unwrap().value(), dec!(75));
        assert_eq!(state.safety_fills, 1);

        state.reset_deal();
        assert!(state.avg_price.is_none());
        assert!(state.total_quantity.is_zero());
        assert_eq!(state.safety_fills, 0);
        assert_eq!(state.deals_completed, 1);
    }

    #[test]
    fn config_validation() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.trailing_deviation_pct = Some(dec!(5)); // above take profit
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.frequency_ms = 0;
        assert!(bad.validate().is_err());
    }
}
