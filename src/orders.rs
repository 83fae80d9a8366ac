//! Conditional order book: limit, stop, and stop-limit instructions.
//!
//! Pending orders sit outside the ledger until a tick satisfies their
//! trigger. Each symbol's orders are evaluated independently against the
//! bid/ask of that symbol's tick; there is no cross-symbol ordering
//! guarantee. Filled and cancelled orders move to an archive.

use crate::price_feed::PriceTick;
use crate::types::{AccountId, OrderId, OrderSide, Price, Qty, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Stop,
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

/// Caller-facing order specification; validated into a ConditionalOrder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Qty,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalOrder {
    pub id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Qty,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
    pub status: OrderStatus,
    pub created_at: Timestamp,
}

impl ConditionalOrder {
    /// Returns the execution price when this order triggers on the tick.
    /// Buys execute against the ask, sells against the bid, so a limit buy
    /// can never fill worse than its limit price.
    pub fn trigger_price(&self, tick: &PriceTick) -> Option<Price> {
        let ask = tick.ask.value();
        let bid = tick.bid.value();

        match (self.kind, self.side) {
            (OrderKind::Limit, OrderSide::Buy) => {
                let limit = self.limit_price?.value();
                (ask <= limit).then_some(tick.ask)
            }
            (OrderKind::Limit, OrderSide::Sell) => {
                let limit = self.limit_price?.value();
                (bid >= limit).then_some(tick.bid)
            }
            (OrderKind::Stop, OrderSide::Buy) => {
                let stop = self.stop_price?.value();
                (ask >= stop).then_some(tick.ask)
            }
            (OrderKind::Stop, OrderSide::Sell) => {
                let stop = self.stop_price?.value();
                (bid <= stop).then_some(tick.bid)
            }
            (OrderKind::StopLimit, OrderSide::Buy) => {
                // fires only inside [stop, limit]
                let stop = self.stop_price?.value();
                let limit = self.limit_price?.value();
                (ask >= stop && ask <= limit).then_some(tick.ask)
            }
            (OrderKind::StopLimit, OrderSide::Sell) => {
                let stop = self.stop_price?.value();
                let limit = self.limit_price?.value();
                (bid <= stop && bid >= limit).then_some(tick.bid)
            }
        }
    }
}

/// An order that fired on the current tick, detached from the pending set.
#[derive(Debug, Clone)]
pub struct TriggeredOrder {
    pub order: ConditionalOrder,
    pub execution_price: Price,
}

#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pending: HashMap<OrderId, ConditionalOrder>,
    by_symbol: HashMap<Symbol, Vec<OrderId>>,
    history: Vec<ConditionalOrder>,
    next_id: u64,
}

impl OrderBook {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            by_symbol: HashMap::new(),
            history: Vec::new(),
            next_id: 1,
        }
    }

    pub fn place(&mut self, spec: OrderSpec, timestamp: Timestamp) -> OrderId {
        let id = OrderId(self.next_id);
        self.next_id += 1;

        let order = ConditionalOrder {
            id,
            account_id: spec.account_id,
            symbol: spec.symbol.clone(),
            side: spec.side,
            kind: spec.kind,
            quantity: spec.quantity,
            limit_price: spec.limit_price,
            stop_price: spec.stop_price,
            status: OrderStatus::Pending,
            created_at: timestamp,
        };

        self.pending.insert(id, order);
        self.by_symbol.entry(spec.symbol).or_default().push(id);
        id
    }

    pub fn get(&self, id: OrderId) -> Option<&ConditionalOrder> {
        self.pending.get(&id)
    }

    pub fn cancel(&mut self, id: OrderId) -> Option<ConditionalOrder> {
        self.archive(id, OrderStatus::Cancelled)
    }

    /// Collect every pending order on this tick's symbol that fires, and
    /// remove them from the pending set. Fill/cancel bookkeeping happens
    /// after the execution attempt (see engine/orders.rs).
    pub fn collect_triggers(&mut self, tick: &PriceTick) -> Vec<TriggeredOrder> {
        let Some(ids) = self.by_symbol.get(&tick.symbol) else {
            return Vec::new();
        };

        let fired: Vec<(OrderId, Price)> = ids
            .iter()
            .filter_map(|id| {
                let order = self.pending.get(id)?;
                order.trigger_price(tick).map(|px| (*id, px))
            })
            .collect();

        fired
            .into_iter()
            .filter_map(|(id, px)| {
                self.take(id).map(|order| TriggeredOrder {
                    order,
                    execution_price: px,
                })
            })
            .collect()
    }

    /// Record the outcome of a detached (triggered) order.
    pub fn record_outcome(&mut self, mut order: ConditionalOrder, status: OrderStatus) {
        debug_assert!(status != OrderStatus::Pending);
        order.status = status;
        self.history.push(order);
    }

    pub fn pending_for_account(&self, account_id: AccountId) -> Vec<&ConditionalOrder> {
        self.pending
            .values()
            .filter(|o| o.account_id == account_id)
            .collect()
    }

    pub fn history_for_account(&self, account_id: AccountId) -> Vec<&ConditionalOrder> {
        self.history
            .iter()
            .filter(|o| o.account_id == account_id)
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self, id: OrderId) -> Option<ConditionalOrder> {
        let order = self.pending.remove(&id)?;
        if let Some(ids) = self.by_symbol.get_mut(&order.symbol) {
            ids.retain(|&oid| oid != id);
        }
        Some(order)
    }

    fn archive(&mut self, id: OrderId, status: OrderStatus) -> Option<ConditionalOrder> {
        let mut order = self.take(id)?;
        order.status = status;
        self.history.push(order.clone());
        Some(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn tick(bid: Decimal, ask: Decimal) -> PriceTick {
        PriceTick::new(
            Symbol::new("BTCUSDT"),
            Price::new_unchecked(bid),
            Price::new_unchecked(ask),
            Price::new_unchecked(ask),
            Timestamp::from_millis(0),
        )
    }

    fn spec(side: OrderSide, kind: OrderKind, limit: Option<Decimal>, stop: Option<Decimal>) -> OrderSpec {
        OrderSpec {
            account_id: AccountId(1),
            symbol: Symbol::new("BTCUSDT"),
            side,
            kind,
            quantity: Qty::new_unchecked(dec!(1)),
            limit_price: limit.map(Price::new_unchecked),
            stop_price: stop.map(Price::new_unchecked),
        }
    }

    #[test]
    fn limit_buy_fills_at_or_below_limit() {
        let mut book = OrderBook::new();
        book.place(
            spec(OrderSide::Buy, OrderKind::Limit, Some(dec!(100)), None),
            Timestamp::from_millis(0),
        );

        assert!(book.collect_triggers(&tick(dec!(100.5), dec!(101))).is_empty());
        assert_eq!(book.pending_len(), 1);

        let fired = book.collect_triggers(&tick(dec!(99), dec!(99.5)));
        assert_eq!(fired.len(), 1);
        // executed at the ask, never worse than the limit
        assert_eq!(fired[0].execution_price.value(), dec!(99.5));
        assert_eq!(book.pending_len(), 0);
    }

    #[test]
    fn limit_sell_needs_bid_at_or_above() {
        let mut book = OrderBook::new();
        book.place(
            spec(OrderSide::Sell, OrderKind::Limit, Some(dec!(105)), None),
            Timestamp::from_millis(0),
        );

        assert!(book.collect_triggers(&tick(dec!(104), dec!(104.5))).is_empty());
        let fired = book.collect_triggers(&tick(dec!(105), dec!(105.5)));
        assert_eq!(fired[0].execution_price.value(), dec!(105));
    }

    #[test]
    fn stop_buy_fires_on_ask_breakout() {
        let mut book = OrderBook::new();
        book.place(
            spec(OrderSide::Buy, OrderKind::Stop, None, Some(dec!(110))),
            Timestamp::from_millis(0),
        );

        assert!(book.collect_triggers(&tick(dec!(108), dec!(109))).is_empty());
        let fired = book.collect_triggers(&tick(dec!(110), dec!(111)));
        assert_eq!(fired[0].execution_price.value(), dec!(111));
    }

    #[test]
    fn stop_sell_fires_on_bid_breakdown() {
        let mut book = OrderBook::new();
        book.place(
            spec(OrderSide::Sell, OrderKind::Stop, None, Some(dec!(90))),
            Timestamp::from_millis(0),
        );

        assert!(book.collect_triggers(&tick(dec!(91), dec!(92))).is_empty());
        let fired = book.collect_triggers(&tick(dec!(90), dec!(90.5)));
        assert_eq!(fired[0].execution_price.value(), dec!(90));
    }

    #[test]
    fn stop_limit_buy_needs_ask_inside_band() {
        let mut book = OrderBook::new();
        book.place(
            spec(OrderSide::Buy, OrderKind::StopLimit, Some(dec!(112)), Some(dec!(110))),
            Timestamp::from_millis(0),
        );

        // below the stop: no fire
        assert!(book.collect_triggers(&tick(dec!(108), dec!(109))).is_empty());
        // gapped past the limit: no fire
        assert!(book.collect_triggers(&tick(dec!(113), dec!(114))).is_empty());
        // inside [110, 112]: fires
        let fired = book.collect_triggers(&tick(dec!(110.5), dec!(111)));
        assert_eq!(fired[0].execution_price.value(), dec!(111));
    }

    #[test]
    fn cancel_moves_to_history() {
        let mut book = OrderBook::new();
        let id = book.place(
            spec(OrderSide::Buy, OrderKind::Limit, Some(dec!(100)), None),
            Timestamp::from_millis(0),
        );

        let cancelled = book.cancel(id).unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(book.pending_len(), 0);
        assert_eq!(book.history_for_account(AccountId(1)).len(), 1);

        // cancelling twice is a no-op
        assert!(book.cancel(id).is_none());
    }

    #[test]
    fn other_symbol_ticks_do_not_trigger() {
        let mut book = OrderBook::new();
        book.place(
            spec(OrderSide::Buy, OrderKind::Limit, Some(dec!(100)), None),
            Timestamp::from_millis(0),
        );

        let eth_tick = PriceTick::new(
            Symbol::new("ETHUSDT"),
            Price::new_unchecked(dec!(50)),
            Price::new_unchecked(dec!(51)),
            Price::new_unchecked(dec!(51)),
            Timestamp::from_millis(0),
        );
        assert!(book.collect_triggers(&eth_tick).is_empty());
        assert_eq!(book.pending_len(), 1);
    }
}
