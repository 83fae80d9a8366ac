//! Account aggregate and derived metrics.
//!
//! One account per (owner, kind). Spot accounts prepay every purchase in
//! full; margin accounts back leveraged exposure with reserved margin.
//! Cash only ever moves through the execution primitive, which writes a
//! ledger entry for every mutation made here.

use crate::position::{MarginPosition, SpotPosition};
use crate::types::{AccountId, Leverage, OwnerId, Quote, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    Spot,
    Margin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: OwnerId,
    pub kind: AccountKind,
    pub cash_balance: Quote,
    pub realized_pnl: Quote,
    // Σ required margin over open margin positions. zero for spot accounts.
    pub margin_used: Quote,
    pub leverage_default: Leverage,
    pub currency: String,
    pub created_at: Timestamp,
}

impl Account {
    pub fn new(
        id: AccountId,
        owner_id: OwnerId,
        kind: AccountKind,
        initial_balance: Quote,
        currency: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            owner_id,
            kind,
            cash_balance: initial_balance,
            realized_pnl: Quote::zero(),
            margin_used: Quote::zero(),
            leverage_default: Leverage::new(dec!(1)).expect("1x is valid"),
            currency: currency.into(),
            created_at: timestamp,
        }
    }

    pub fn credit(&mut self, amount: Quote) {
        self.cash_balance = self.cash_balance.add(amount);
    }

    pub fn debit(&mut self, amount: Quote) -> Result<(), AccountError> {
        if amount.value() > self.cash_balance.value() {
            return Err(AccountError::InsufficientBalance {
                requested: amount,
                available: self.cash_balance,
            });
        }
        self.cash_balance = self.cash_balance.sub(amount);
        Ok(())
    }

    /// Credits (or debits, for losses) realized PnL into cash and the
    /// lifetime counter in one step.
    pub fn realize_pnl(&mut self, pnl: Quote) {
        self.cash_balance = self.cash_balance.add(pnl);
        self.realized_pnl = self.realized_pnl.add(pnl);
    }

    pub fn reserve_margin(&mut self, amount: Quote) {
        self.margin_used = self.margin_used.add(amount);
    }

    pub fn release_margin(&mut self, amount: Quote) {
        self.margin_used = self.margin_used.sub(amount);
        if self.margin_used.is_negative() {
            self.margin_used = Quote::zero();
        }
    }
}

/// Point-in-time view derived by folding over the account's open positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub equity: Quote,
    pub unrealized_pnl: Quote,
    pub margin_used: Quote,
    pub free_margin: Quote,
    // equity / margin used, in percent. Decimal::MAX with nothing at risk.
    pub margin_level_pct: Decimal,
}

/// Spot: equity = cash + Σ position market value.
/// Margin: equity = cash + Σ unrealized PnL.
pub fn account_metrics(
    account: &Account,
    spot_positions: &[&SpotPosition],
    margin_positions: &[&MarginPosition],
) -> AccountMetrics {
    let equity;
    let unrealized_pnl;

    match account.kind {
        AccountKind::Spot => {
            let market_value: Quote = spot_positions.iter().map(|p| p.market_value()).sum();
            unrealized_pnl = spot_positions.iter().map(|p| p.unrealized_pnl()).sum();
            equity = account.cash_balance.add(market_value);
        }
        AccountKind::Margin => {
            unrealized_pnl = margin_positions.iter().map(|p| p.unrealized_pnl()).sum();
            equity = account.cash_balance.add(unrealized_pnl);
        }
    }

    let free_margin = equity.sub(account.margin_used);
    let margin_level_pct = if account.margin_used.value().is_zero() {
        Decimal::MAX
    } else {
        equity.value() / account.margin_used.value() * dec!(100)
    };

    AccountMetrics {
        equity,
        unrealized_pnl,
        margin_used: account.margin_used,
        free_margin,
        margin_level_pct,
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AccountError {
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Quote, available: Quote },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PositionId, Price, Qty, Side, Symbol};
    use rust_decimal_macros::dec;

    fn margin_account() -> Account {
        Account::new(
            AccountId(1),
            OwnerId(7),
            AccountKind::Margin,
            Quote::new(dec!(10000)),
            "USDT",
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn debit_rejects_overdraft() {
        let mut account = margin_account();
        assert!(account.debit(Quote::new(dec!(20000))).is_err());
        account.debit(Quote::new(dec!(4000))).unwrap();
        assert_eq!(account.cash_balance.value(), dec!(6000));
    }

    #[test]
    fn realize_pnl_moves_cash_and_counter() {
        let mut account = margin_account();
        account.realize_pnl(Quote::new(dec!(500)));
        account.realize_pnl(Quote::new(dec!(-200)));
        assert_eq!(account.cash_balance.value(), dec!(10300));
        assert_eq!(account.realized_pnl.value(), dec!(300));
    }

    #[test]
    fn release_margin_never_goes_negative() {
        let mut account = margin_account();
        account.reserve_margin(Quote::new(dec!(100)));
        account.release_margin(Quote::new(dec!(150)));
        assert_eq!(account.margin_used.value(), dec!(0));
    }

    #[test]
    fn metrics_margin_account() {
        let mut account = margin_account();
        account.reserve_margin(Quote::new(dec!(5000)));

        let mut pos = MarginPosition::open(
            PositionId(1),
            account.id,
            Symbol::new("BTCUSDT"),
            Side::Long,
            Qty::new_unchecked(dec!(1)),
            Price::new_unchecked(dec!(50000)),
            Leverage::new(dec!(10)).unwrap(),
            Timestamp::from_millis(0),
        );
        pos.mark(Price::new_unchecked(dec!(52000)));

        let metrics = account_metrics(&account, &[], &[&pos]);
        assert_eq!(metrics.unrealized_pnl.value(), dec!(2000));
        assert_eq!(metrics.equity.value(), dec!(12000));
        assert_eq!(metrics.free_margin.value(), dec!(7000));
        assert_eq!(metrics.margin_level_pct, dec!(240));
    }

    #[test]
    fn metrics_spot_account() {
        let account = Account::new(
            AccountId(2),
            OwnerId(7),
            AccountKind::Spot,
            Quote::new(dec!(1000)),
            "USDT",
            Timestamp::from_millis(0),
        );

        let mut pos = SpotPosition::open(
            PositionId(1),
            account.id,
            Symbol::new("ETHUSDT"),
            Qty::new_unchecked(dec!(2)),
            Price::new_unchecked(dec!(100)),
            Timestamp::from_millis(0),
        );
        pos.mark(Price::new_unchecked(dec!(110)));

        let metrics = account_metrics(&account, &[&pos], &[]);
        // 1000 cash + 220 market value
        assert_eq!(metrics.equity.value(), dec!(1220));
        assert_eq!(metrics.unrealized_pnl.value(), dec!(20));
        assert_eq!(metrics.margin_level_pct, Decimal::MAX);
    }
}
