// 2.0 ledger.rs: append-only audit trail. every balance mutation lands here
// with balance before/after, so an account's cash is fully derivable by
// replaying its entries. entries are never edited or deleted.

use crate::types::{AccountId, Quote, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Deposit,
    SpotBuy,
    SpotSell,
    MarginFee,
    MarginPnl,
    Liquidation,
    Adjustment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub entry_type: EntryType,
    // Signed delta applied to cash. Negative = debit.
    pub amount: Quote,
    pub balance_before: Quote,
    pub balance_after: Quote,
    // What produced this entry: an order id, position id, bot id, or "manual".
    pub reference: String,
    pub description: String,
    pub timestamp: Timestamp,
}

/// Per-account append-only entry store.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: HashMap<AccountId, Vec<LedgerEntry>>,
    next_id: u64,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_id: 1,
        }
    }

    // the only write path. balance_after must equal balance_before + amount,
    // callers compute both from the same account snapshot.
    pub fn append(
        &mut self,
        account_id: AccountId,
        entry_type: EntryType,
        amount: Quote,
        balance_before: Quote,
        reference: impl Into<String>,
        description: impl Into<String>,
        timestamp: Timestamp,
    ) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;

        let entry = LedgerEntry {
            id,
            account_id,
            entry_type,
            amount,
            balance_before,
            balance_after: balance_before.add(amount),
            reference: reference.into(),
            description: description.into(),
            timestamp,
        };
        self.entries.entry(account_id).or_default().push(entry);
        id
    }

    pub fn entries(&self, account_id: AccountId) -> &[LedgerEntry] {
        self.entries
            .get(&account_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Page 0 is the most recent entries (newest first within the page).
    pub fn page(&self, account_id: AccountId, page: usize, page_size: usize) -> Vec<&LedgerEntry> {
        let all = self.entries(account_id);
        all.iter()
            .rev()
            .skip(page * page_size)
            .take(page_size)
            .collect()
    }

    /// Sum of all entry deltas for an account. Invariant: equals
    /// cash balance minus initial balance at all times.
    pub fn net_delta(&self, account_id: AccountId) -> Quote {
        self.entries(account_id).iter().map(|e| e.amount).sum()
    }

    pub fn len(&self, account_id: AccountId) -> usize {
        self.entries(account_id).len()
    }

    pub fn is_empty(&self, account_id: AccountId) -> bool {
        self.entries(account_id).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn acct() -> AccountId {
        AccountId(1)
    }

    #[test]
    fn append_chains_balances() {
        let mut ledger = Ledger::new();
        let t = Timestamp::from_millis(0);

        ledger.append(
            acct(),
            EntryType::Deposit,
            Quote::new(dec!(1000)),
            Quote::zero(),
            "manual",
            "initial deposit",
            t,
        );
        ledger.append(
            acct(),
            EntryType::SpotBuy,
            Quote::new(dec!(-250.25)),
            Quote::new(dec!(1000)),
            "order-1",
            "buy 0.005 BTCUSDT",
            t,
        );

        let entries = ledger.entries(acct());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].balance_before.value(), dec!(1000));
        assert_eq!(entries[1].balance_after.value(), dec!(749.75));
        assert_eq!(ledger.net_delta(acct()).value(), dec!(749.75));
    }

    #[test]
    fn paged_reads_newest_first() {
        let mut ledger = Ledger::new();
        let mut balance = Quote::zero();
        for i in 0..7 {
            ledger.append(
                acct(),
                EntryType::Adjustment,
                Quote::new(dec!(1)),
                balance,
                format!("adj-{i}"),
                "",
                Timestamp::from_millis(i),
            );
            balance = balance.add(Quote::new(dec!(1)));
        }

        let page0 = ledger.page(acct(), 0, 3);
        assert_eq!(page0.len(), 3);
        assert_eq!(page0[0].reference, "adj-6");

        let page2 = ledger.page(acct(), 2, 3);
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].reference, "adj-0");
    }

    #[test]
    fn unknown_account_is_empty() {
        let ledger = Ledger::new();
        assert!(ledger.is_empty(AccountId(99)));
        assert_eq!(ledger.net_delta(AccountId(99)).value(), dec!(0));
    }
}
