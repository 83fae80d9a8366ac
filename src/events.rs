// 11.0: every state change produces an event. used for audit trails, external
// notification, and test assertions. the EventPayload enum lists all types.

use crate::ledger::EntryId;
use crate::types::{
    AccountId, BotId, OrderId, PositionId, Price, Qty, Quote, Side, Symbol, Timestamp,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

// event types serialize for export; they are never read back in, so no
// Deserialize (several carry static str tags).
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum EventPayload {
    // Account events
    AccountOpened(AccountOpenedEvent),
    BalanceChanged(BalanceChangedEvent),

    // Trade events
    TradeExecuted(TradeExecutedEvent),

    // Conditional order events
    OrderPlaced(OrderPlacedEvent),
    OrderFilled(OrderFilledEvent),
    OrderCancelled(OrderCancelledEvent),

    // Shield events
    ShieldActivated(ShieldEvent),
    ShieldDeactivated(ShieldDeactivatedEvent),

    // Risk events
    Liquidation(LiquidationEvent),
    LiquidationShortfall(LiquidationShortfallEvent),

    // Bot events
    BotStatusChanged(BotStatusChangedEvent),
    BotDealClosed(BotDealClosedEvent),
    GridCycleCompleted(GridCycleCompletedEvent),
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountOpenedEvent {
    pub account_id: AccountId,
    pub initial_balance: Quote,
    pub currency: String,
}

/// Mirrors what the external notification sink broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceChangedEvent {
    pub account_id: AccountId,
    pub entry_id: EntryId,
    pub delta: Quote,
    pub new_balance: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeExecutedEvent {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub intent_kind: &'static str,
    pub quantity: Qty,
    pub price: Price,
    pub fee: Quote,
    pub realized_pnl: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPlacedEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderFilledEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub execution_price: Price,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelledEvent {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub reason: CancelReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CancelReason {
    UserRequested,
    ExecutionFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShieldEvent {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub snap_price: Price,
    pub snap_value: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShieldDeactivatedEvent {
    pub account_id: AccountId,
    pub position_id: PositionId,
    // snap value minus true market value at deactivation. audit only,
    // never applied to the ledger.
    pub drift: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiquidationEvent {
    pub account_id: AccountId,
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Qty,
    pub close_price: Price,
    pub realized_pnl: Quote,
    pub equity_after: Quote,
}

/// Positions exhausted but equity still negative. Flagged for manual
/// follow-up, never auto-retried.
#[derive(Debug, Clone, Serialize)]
pub struct LiquidationShortfallEvent {
    pub account_id: AccountId,
    pub residual_equity: Quote,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotStatusChangedEvent {
    pub bot_id: BotId,
    pub status: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotDealClosedEvent {
    pub bot_id: BotId,
    pub realized_pnl: Quote,
    pub deals_completed: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GridCycleCompletedEvent {
    pub bot_id: BotId,
    pub level_index: usize,
    pub profit: Quote,
    pub cycles_completed: u64,
}

/// Bounded in-memory event log; oldest entries drop past the cap.
#[derive(Debug, Clone)]
pub struct EventLog {
    events: Vec<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
            max_events,
        }
    }

    pub fn record(&mut self, timestamp: Timestamp, payload: EventPayload) -> EventId {
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.events.push(Event::new(id, timestamp, payload));

        if self.events.len() > self.max_events {
            let drain = self.events.len() - self.max_events;
            self.events.drain(0..drain);
        }
        id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn recent(&self, count: usize) -> &[Event] {
        let start = self.events.len().saturating_sub(count);
        &self.events[start..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn log_is_bounded() {
        let mut log = EventLog::new(3);
        for i in 0..5 {
            log.record(
                Timestamp::from_millis(i),
                EventPayload::BalanceChanged(BalanceChangedEvent {
                    account_id: AccountId(1),
                    entry_id: EntryId(i as u64 + 1),
                    delta: Quote::new(dec!(1)),
                    new_balance: Quote::new(Decimal::from(i + 1)),
                }),
            );
        }

        assert_eq!(log.events().len(), 3);
        // oldest two dropped
        assert_eq!(log.events()[0].id, EventId(3));
    }

    #[test]
    fn recent_returns_tail() {
        let mut log = EventLog::new(100);
        for i in 0..10 {
            log.record(
                Timestamp::from_millis(i),
                EventPayload::LiquidationShortfall(LiquidationShortfallEvent {
                    account_id: AccountId(1),
                    residual_equity: Quote::new(dec!(-5)),
                }),
            );
        }

        assert_eq!(log.recent(4).len(), 4);
        assert_eq!(log.recent(4)[3].id, EventId(10));
    }
}
