// 8.1 engine/execute.rs: THE execution primitive. every balance mutation in
// the system, whether a manual trade, a triggered order, a bot fill, or a
// forced liquidation close, goes through `Engine::execute` and commits
// atomically: validate, mutate balance and position, append the ledger
// entry, emit events. a rejected intent changes nothing.

use super::core::Engine;
use super::results::{ExecutionError, ExecutionReceipt};
use crate::account::AccountKind;
use crate::events::{EventPayload, TradeExecutedEvent};
use crate::ledger::EntryType;
use crate::position::{
    apply_spot_sell, increase_margin_position, merge_spot_buy, reduce_margin_position,
    MarginPosition, SpotPosition,
};
use crate::types::{AccountId, Leverage, PositionId, Price, Qty, Quote, Side, Symbol};
use serde::{Deserialize, Serialize};

/// Why a margin position is being closed. Recorded in the ledger entry and
/// used to route the forced-close bypasses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    UserClosed,
    OrderFill,
    Liquidation,
    BotDeal,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::UserClosed => "user close",
            CloseReason::OrderFill => "order fill",
            CloseReason::Liquidation => "liquidation",
            CloseReason::BotDeal => "bot deal",
        }
    }
}

// 8.2: the six balance-affecting instructions. `reference` ties a ledger
// entry back to what produced it (an order, a bot, or "manual").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TradeIntent {
    SpotBuy {
        account_id: AccountId,
        symbol: Symbol,
        quantity: Qty,
        price: Price,
        reference: String,
    },
    SpotSell {
        account_id: AccountId,
        symbol: Symbol,
        quantity: Qty,
        price: Price,
        reference: String,
    },
    MarginOpen {
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        quantity: Qty,
        price: Price,
        leverage: Leverage,
    },
    MarginClose {
        account_id: AccountId,
        position_id: PositionId,
        price: Price,
        reason: CloseReason,
    },
    MarginReduce {
        account_id: AccountId,
        position_id: PositionId,
        quantity: Qty,
        price: Price,
    },
    // manual balance correction, still ledgered
    Adjustment {
        account_id: AccountId,
        amount: Quote,
        description: String,
    },
}

impl Engine {
    pub fn execute(&mut self, intent: TradeIntent) -> Result<ExecutionReceipt, ExecutionError> {
        match intent {
            TradeIntent::SpotBuy {
                account_id,
                symbol,
                quantity,
                price,
                reference,
            } => self.spot_buy(account_id, symbol, quantity, price, reference),
            TradeIntent::SpotSell {
                account_id,
                symbol,
                quantity,
                price,
                reference,
            } => self.spot_sell(account_id, symbol, quantity, price, reference),
            TradeIntent::MarginOpen {
                account_id,
                symbol,
                side,
                quantity,
                price,
                leverage,
            } => self.margin_open(account_id, symbol, side, quantity, price, leverage),
            TradeIntent::MarginClose {
                account_id,
                position_id,
                price,
                reason,
            } => self.margin_close(account_id, position_id, None, price, reason),
            TradeIntent::MarginReduce {
                account_id,
                position_id,
                quantity,
                price,
            } => self.margin_close(
                account_id,
                position_id,
                Some(quantity),
                price,
                CloseReason::UserClosed,
            ),
            TradeIntent::Adjustment {
                account_id,
                amount,
                description,
            } => self.adjustment(account_id, amount, description),
        }
    }

    // 8.2.1: spot buy. fully prepaid: cash covers notional + fee up front,
    // and the fee folds into the weighted-average cost basis.
    fn spot_buy(
        &mut self,
        account_id: AccountId,
        symbol: Symbol,
        quantity: Qty,
        price: Price,
        reference: String,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        if quantity.is_zero() {
            return Err(ExecutionError::InvalidQuantity);
        }

        let cost = Quote::new(quantity.value() * price.value());
        let fee = cost.mul(self.config.fees.trade_fee_rate);
        let total = cost.add(fee);
        let now = self.current_time;

        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(ExecutionError::AccountNotFound(account_id))?;
        if account.kind != AccountKind::Spot {
            return Err(ExecutionError::WrongAccountKind(AccountKind::Spot));
        }

        let balance_before = account.cash_balance;
        account.debit(total)?;
        let balance_after = account.cash_balance;

        let position_id = match self.find_spot_position(account_id, &symbol) {
            Some(id) => {
                let position = self
                    .spot_positions
                    .get_mut(&id)
                    .ok_or(ExecutionError::PositionNotFound(id))?;
                merge_spot_buy(position, quantity, price, fee, now);
                id
            }
            None => {
                let id = self.next_position();
                let avg = Price::new_unchecked(total.value() / quantity.value());
                let mut position =
                    SpotPosition::open(id, account_id, symbol.clone(), quantity, avg, now);
                position.mark(price);
                self.spot_positions.insert(id, position);
                id
            }
        };

        let entry_id = self.ledger.append(
            account_id,
            EntryType::SpotBuy,
            total.negate(),
            balance_before,
            reference,
            format!("buy {quantity} {symbol} @ {price}"),
            now,
        );

        self.emit(EventPayload::TradeExecuted(TradeExecutedEvent {
            account_id,
            symbol: symbol.clone(),
            intent_kind: "spot_buy",
            quantity,
            price,
            fee,
            realized_pnl: Quote::zero(),
        }));
        self.settle_cash_event(account_id, entry_id, total.negate(), balance_after);

        Ok(ExecutionReceipt {
            account_id,
            intent_kind: "spot_buy",
            symbol: Some(symbol),
            quantity,
            price: Some(price),
            fee,
            realized_pnl: Quote::zero(),
            balance_after,
            position_id: Some(position_id),
            entry_id,
        })
    }

    // 8.2.2: spot sell. avg cost untouched on partial sells; the fee is a
    // separate deduction from proceeds, the asymmetry to 8.2.1 is deliberate.
    fn spot_sell(
        &mut self,
        account_id: AccountId,
        symbol: Symbol,
        quantity: Qty,
        price: Price,
        reference: String,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        if quantity.is_zero() {
            return Err(ExecutionError::InvalidQuantity);
        }
        if !self.accounts.contains_key(&account_id) {
            return Err(ExecutionError::AccountNotFound(account_id));
        }

        let position_id = self
            .find_spot_position(account_id, &symbol)
            .ok_or_else(|| ExecutionError::NoHolding(symbol.clone()))?;
        let position = self
            .spot_positions
            .get_mut(&position_id)
            .ok_or(ExecutionError::PositionNotFound(position_id))?;

        if quantity.value() > position.quantity.value() {
            return Err(ExecutionError::Oversell {
                requested: quantity,
                held: position.quantity,
            });
        }

        let gross = Quote::new(quantity.value() * price.value());
        let fee = gross.mul(self.config.fees.trade_fee_rate);
        let now = self.current_time;

        let outcome = apply_spot_sell(position, quantity, price, fee, now);
        if outcome.remaining.is_none() {
            self.spot_positions.remove(&position_id);
        }

        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(ExecutionError::AccountNotFound(account_id))?;
        let balance_before = account.cash_balance;
        account.credit(outcome.proceeds);
        account.realized_pnl = account.realized_pnl.add(outcome.realized_pnl);
        let balance_after = account.cash_balance;

        let entry_id = self.ledger.append(
            account_id,
            EntryType::SpotSell,
            outcome.proceeds,
            balance_before,
            reference,
            format!("sell {quantity} {symbol} @ {price}"),
            now,
        );

        self.emit(EventPayload::TradeExecuted(TradeExecutedEvent {
            account_id,
            symbol: symbol.clone(),
            intent_kind: "spot_sell",
            quantity,
            price,
            fee,
            realized_pnl: outcome.realized_pnl,
        }));
        self.settle_cash_event(account_id, entry_id, outcome.proceeds, balance_after);

        Ok(ExecutionReceipt {
            account_id,
            intent_kind: "spot_sell",
            symbol: Some(symbol),
            quantity,
            price: Some(price),
            fee,
            realized_pnl: outcome.realized_pnl,
            balance_after,
            position_id: outcome.remaining.map(|_| position_id),
            entry_id,
        })
    }

    // 8.2.3: margin open. free margin (equity - margin used) must cover the
    // new lot's required margin plus the fee. only the fee moves cash;
    // required margin is reserved, not spent.
    fn margin_open(
        &mut self,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        quantity: Qty,
        price: Price,
        leverage: Leverage,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        if quantity.is_zero() {
            return Err(ExecutionError::InvalidQuantity);
        }
        if leverage.value() > self.config.margin.max_leverage {
            return Err(ExecutionError::LeverageTooHigh {
                requested: leverage,
                max: self.config.margin.max_leverage,
            });
        }

        let account = self
            .accounts
            .get(&account_id)
            .ok_or(ExecutionError::AccountNotFound(account_id))?;
        if account.kind != AccountKind::Margin {
            return Err(ExecutionError::WrongAccountKind(AccountKind::Margin));
        }

        let existing = self
            .margin_positions
            .values()
            .find(|p| p.account_id == account_id && p.symbol == symbol && p.side == side)
            .map(|p| (p.id, p.liquidating, p.leverage));
        if let Some((id, true, _)) = existing {
            return Err(ExecutionError::PositionLiquidating(id));
        }

        let notional = Quote::new(quantity.value() * price.value());
        // a merge reserves the new lot at the position's original leverage,
        // keeping reserved margin equal to what a later close frees
        let lot_leverage = existing.map(|(_, _, l)| l).unwrap_or(leverage);
        let required = Quote::new(notional.value() / lot_leverage.value());
        let fee = notional.mul(self.config.fees.trade_fee_rate);

        let unrealized: Quote = self
            .margin_positions
            .values()
            .filter(|p| p.account_id == account_id)
            .map(|p| p.unrealized_pnl())
            .sum();
        let equity = account.cash_balance.add(unrealized);
        let free = equity.sub(account.margin_used);
        if free.value() < required.value() + fee.value() {
            return Err(ExecutionError::InsufficientMargin { required, free });
        }

        let now = self.current_time;
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(ExecutionError::AccountNotFound(account_id))?;
        let balance_before = account.cash_balance;
        account.debit(fee)?;
        account.reserve_margin(required);
        let balance_after = account.cash_balance;

        let position_id = match existing {
            Some((id, _, _)) => {
                let position = self
                    .margin_positions
                    .get_mut(&id)
                    .ok_or(ExecutionError::PositionNotFound(id))?;
                increase_margin_position(position, quantity, price, now);
                id
            }
            None => {
                let id = self.next_position();
                let position = MarginPosition::open(
                    id,
                    account_id,
                    symbol.clone(),
                    side,
                    quantity,
                    price,
                    leverage,
                    now,
                );
                self.margin_positions.insert(id, position);
                id
            }
        };

        let entry_id = self.ledger.append(
            account_id,
            EntryType::MarginFee,
            fee.negate(),
            balance_before,
            format!("position-{}", position_id.0),
            format!("open {side:?} {quantity} {symbol} @ {price} ({leverage})"),
            now,
        );

        self.emit(EventPayload::TradeExecuted(TradeExecutedEvent {
            account_id,
            symbol: symbol.clone(),
            intent_kind: "margin_open",
            quantity,
            price,
            fee,
            realized_pnl: Quote::zero(),
        }));
        self.settle_cash_event(account_id, entry_id, fee.negate(), balance_after);

        Ok(ExecutionReceipt {
            account_id,
            intent_kind: "margin_open",
            symbol: Some(symbol),
            quantity,
            price: Some(price),
            fee,
            realized_pnl: Quote::zero(),
            balance_after,
            position_id: Some(position_id),
            entry_id,
        })
    }

    // 8.2.4: margin close/reduce. realized pnl settles into cash, margin is
    // freed in proportion to the closed quantity. liquidation closes bypass
    // the liquidating lock and add the liquidation fee on top.
    fn margin_close(
        &mut self,
        account_id: AccountId,
        position_id: PositionId,
        quantity: Option<Qty>,
        price: Price,
        reason: CloseReason,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        let position = self
            .margin_positions
            .get_mut(&position_id)
            .filter(|p| p.account_id == account_id)
            .ok_or(ExecutionError::PositionNotFound(position_id))?;

        if position.liquidating && reason != CloseReason::Liquidation {
            return Err(ExecutionError::PositionLiquidating(position_id));
        }

        let close_qty = quantity.unwrap_or(position.quantity);
        if close_qty.is_zero() {
            return Err(ExecutionError::InvalidQuantity);
        }
        if close_qty.value() > position.quantity.value() {
            return Err(ExecutionError::Oversell {
                requested: close_qty,
                held: position.quantity,
            });
        }

        let mut fee_rate = self.config.fees.trade_fee_rate;
        if reason == CloseReason::Liquidation {
            fee_rate += self.config.fees.liquidation_fee_rate;
        }
        let fee = Quote::new(close_qty.value() * price.value() * fee_rate);
        let now = self.current_time;

        let symbol = position.symbol.clone();
        let outcome = reduce_margin_position(position, close_qty, price, fee, now);
        if outcome.remaining.is_none() {
            self.margin_positions.remove(&position_id);
        }

        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(ExecutionError::AccountNotFound(account_id))?;
        let balance_before = account.cash_balance;
        account.release_margin(outcome.margin_freed);
        account.realize_pnl(outcome.realized_pnl);
        let balance_after = account.cash_balance;

        let entry_type = if reason == CloseReason::Liquidation {
            EntryType::Liquidation
        } else {
            EntryType::MarginPnl
        };
        let entry_id = self.ledger.append(
            account_id,
            entry_type,
            outcome.realized_pnl,
            balance_before,
            format!("position-{}", position_id.0),
            format!("close {close_qty} {symbol} @ {price} ({})", reason.as_str()),
            now,
        );

        self.emit(EventPayload::TradeExecuted(TradeExecutedEvent {
            account_id,
            symbol: symbol.clone(),
            intent_kind: "margin_close",
            quantity: close_qty,
            price,
            fee,
            realized_pnl: outcome.realized_pnl,
        }));
        self.settle_cash_event(account_id, entry_id, outcome.realized_pnl, balance_after);

        Ok(ExecutionReceipt {
            account_id,
            intent_kind: "margin_close",
            symbol: Some(symbol),
            quantity: close_qty,
            price: Some(price),
            fee,
            realized_pnl: outcome.realized_pnl,
            balance_after,
            position_id: outcome.remaining.map(|_| position_id),
            entry_id,
        })
    }

    // 8.2.5: manual correction. signed amount; debits are overdraft-checked.
    fn adjustment(
        &mut self,
        account_id: AccountId,
        amount: Quote,
        description: String,
    ) -> Result<ExecutionReceipt, ExecutionError> {
        let account = self
            .accounts
            .get_mut(&account_id)
            .ok_or(ExecutionError::AccountNotFound(account_id))?;

        let balance_before = account.cash_balance;
        if amount.is_negative() {
            account.debit(amount.abs())?;
        } else {
            account.credit(amount);
        }
        let balance_after = account.cash_balance;

        let entry_id = self.ledger.append(
            account_id,
            EntryType::Adjustment,
            amount,
            balance_before,
            "manual",
            description,
            self.current_time,
        );
        self.settle_cash_event(account_id, entry_id, amount, balance_after);

        Ok(ExecutionReceipt {
            account_id,
            intent_kind: "adjustment",
            symbol: None,
            quantity: Qty::zero(),
            price: None,
            fee: Quote::zero(),
            realized_pnl: Quote::zero(),
            balance_after,
            position_id: None,
            entry_id,
        })
    }
}
