// 8.0.2: receipts and the error taxonomy for engine operations.

use crate::account::{AccountError, AccountKind};
use crate::ledger::EntryId;
use crate::types::{AccountId, Leverage, OrderId, OwnerId, PositionId, Price, Qty, Quote, Symbol};
use rust_decimal::Decimal;

/// What one accepted trade did: fee charged, PnL realized, where the cash
/// balance landed, and which position (if any) it touched.
#[derive(Debug, Clone)]
pub struct ExecutionReceipt {
    pub account_id: AccountId,
    pub intent_kind: &'static str,
    pub symbol: Option<Symbol>,
    pub quantity: Qty,
    pub price: Option<Price>,
    pub fee: Quote,
    pub realized_pnl: Quote,
    pub balance_after: Quote,
    pub position_id: Option<PositionId>,
    pub entry_id: EntryId,
}

/// Everything done by one price tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub symbol: Symbol,
    pub orders_filled: usize,
    pub orders_cancelled: usize,
    pub positions_liquidated: usize,
    pub bot_trades: usize,
}

// No stale-trigger error here: order triggers are evaluated and executed
// against the same tick inside one pipeline pass, so a trigger can never
// outlive the price that armed it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Owner {0:?} already has a {1:?} account")]
    AccountExists(OwnerId, AccountKind),

    #[error("This operation requires a {0:?} account")]
    WrongAccountKind(AccountKind),

    #[error("Quantity must be positive")]
    InvalidQuantity,

    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    #[error("Insufficient free margin: required {required}, free {free}")]
    InsufficientMargin { required: Quote, free: Quote },

    #[error("Leverage {requested} exceeds maximum {max}x")]
    LeverageTooHigh { requested: Leverage, max: Decimal },

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),

    #[error("No {0} holding to sell")]
    NoHolding(Symbol),

    // invariant: while the mark is past the liquidation price, only a
    // forced close may touch the position
    #[error("Position {0:?} is pending liquidation")]
    PositionLiquidating(PositionId),

    #[error("Sell of {requested} exceeds held quantity {held}")]
    Oversell { requested: Qty, held: Qty },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OrderError {
    #[error("Order {0:?} not found")]
    NotFound(OrderId),

    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Conditional orders require a spot account")]
    SpotAccountRequired,

    #[error("Quantity must be positive")]
    InvalidQuantity,

    #[error("A limit order needs a limit price")]
    MissingLimitPrice,

    #[error("A stop order needs a stop price")]
    MissingStopPrice,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ShieldError {
    #[error("Account {0:?} not found")]
    AccountNotFound(AccountId),

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionId),
}
