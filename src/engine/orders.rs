// 8.3 engine/orders.rs: conditional order surface and trigger processing.
//
// Placement validates shape only; funds are checked at execution time. A
// triggered order submits a spot intent at the side of the book it fired
// against; if execution fails the order cancels permanently, no re-arm.

use super::core::Engine;
use super::execute::TradeIntent;
use super::results::OrderError;
use crate::account::AccountKind;
use crate::events::{
    CancelReason, EventPayload, OrderCancelledEvent, OrderFilledEvent, OrderPlacedEvent,
};
use crate::orders::{OrderKind, OrderSpec, OrderStatus, TriggeredOrder};
use crate::price_feed::PriceTick;
use crate::types::{OrderId, OrderSide};
use tracing::warn;

impl Engine {
    pub fn place_order(&mut self, spec: OrderSpec) -> Result<OrderId, OrderError> {
        let account = self
            .accounts
            .get(&spec.account_id)
            .ok_or(OrderError::AccountNotFound(spec.account_id))?;
        if account.kind != AccountKind::Spot {
            return Err(OrderError::SpotAccountRequired);
        }
        if spec.quantity.is_zero() {
            return Err(OrderError::InvalidQuantity);
        }
        match spec.kind {
            OrderKind::Limit if spec.limit_price.is_none() => {
                return Err(OrderError::MissingLimitPrice)
            }
            OrderKind::Stop if spec.stop_price.is_none() => {
                return Err(OrderError::MissingStopPrice)
            }
            OrderKind::StopLimit if spec.limit_price.is_none() => {
                return Err(OrderError::MissingLimitPrice)
            }
            OrderKind::StopLimit if spec.stop_price.is_none() => {
                return Err(OrderError::MissingStopPrice)
            }
            _ => {}
        }

        let account_id = spec.account_id;
        let symbol = spec.symbol.clone();
        let order_id = self.order_book.place(spec, self.current_time);

        self.emit(EventPayload::OrderPlaced(OrderPlacedEvent {
            order_id,
            account_id,
            symbol,
        }));
        Ok(order_id)
    }

    pub fn cancel_order(&mut self, order_id: OrderId) -> Result<(), OrderError> {
        let cancelled = self
            .order_book
            .cancel(order_id)
            .ok_or(OrderError::NotFound(order_id))?;

        self.emit(EventPayload::OrderCancelled(OrderCancelledEvent {
            order_id,
            account_id: cancelled.account_id,
            reason: CancelReason::UserRequested,
        }));
        Ok(())
    }

    // 8.3.1: tick-time trigger processing. returns (filled, cancelled).
    pub(super) fn process_order_triggers(&mut self, tick: &PriceTick) -> (usize, usize) {
        let fired = self.order_book.collect_triggers(tick);
        let mut filled = 0;
        let mut cancelled = 0;

        for TriggeredOrder {
            order,
            execution_price,
        } in fired
        {
            let reference = format!("order-{}", order.id.0);
            let intent = match order.side {
                OrderSide::Buy => TradeIntent::SpotBuy {
                    account_id: order.account_id,
                    symbol: order.symbol.clone(),
                    quantity: order.quantity,
                    price: execution_price,
                    reference,
                },
                OrderSide::Sell => TradeIntent::SpotSell {
                    account_id: order.account_id,
                    symbol: order.symbol.clone(),
                    quantity: order.quantity,
                    price: execution_price,
                    reference,
                },
            };

            match self.execute(intent) {
                Ok(_) => {
                    self.emit(EventPayload::OrderFilled(OrderFilledEvent {
                        order_id: order.id,
                        account_id: order.account_id,
                        symbol: order.symbol.clone(),
                        execution_price,
                    }));
                    self.order_book.record_outcome(order, OrderStatus::Filled);
                    filled += 1;
                }
                Err(e) => {
                    warn!(order = order.id.0, account = order.account_id.0, error = %e,
                        "triggered order failed to execute, cancelling");
                    self.emit(EventPayload::OrderCancelled(OrderCancelledEvent {
                        order_id: order.id,
                        account_id: order.account_id,
                        reason: CancelReason::ExecutionFailed,
                    }));
                    self.order_book
                        .record_outcome(order, OrderStatus::Cancelled);
                    cancelled += 1;
                }
            }
        }

        (filled, cancelled)
    }
}
