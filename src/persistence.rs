// 9.2 persistence.rs: durable storage and notification boundaries.
//
// The engine commits in memory first; the command log append and the
// balance-changed broadcast are fire-and-forget side effects. A failure in
// either is logged and retried out-of-band by the surrounding product, it
// never rolls back committed state. Reconciliation on reload replays the
// command log through the execution primitive (the engine is deterministic,
// so replay reproduces accounts, positions, and the ledger exactly).

use crate::account::AccountKind;
use crate::engine::TradeIntent;
use crate::events::BalanceChangedEvent;
use crate::types::{OwnerId, Quote, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One durable record. Sequence numbers are per owner and gap-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub command: LoggedCommand,
}

/// The balance-affecting commands that reconstruction needs. Orders and
/// bots are re-registered by the product layer, not replayed from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LoggedCommand {
    InitAccount {
        owner_id: OwnerId,
        kind: AccountKind,
        initial_balance: Quote,
        currency: String,
    },
    Execute(TradeIntent),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record for owner {0:?} at sequence {1}")]
    Corrupt(OwnerId, u64),
}

/// Durable storage keyed by owner id.
pub trait CommandLog {
    fn append(&mut self, owner: OwnerId, record: LogRecord) -> Result<(), PersistenceError>;
    fn load(&self, owner: OwnerId) -> Result<Vec<LogRecord>, PersistenceError>;
    fn owners(&self) -> Vec<OwnerId>;
}

/// In-memory log. The real deployment substitutes a remote store; tests and
/// the simulator use this.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: HashMap<OwnerId, Vec<LogRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_sequence(&self, owner: OwnerId) -> u64 {
        self.records.get(&owner).map(|r| r.len() as u64 + 1).unwrap_or(1)
    }
}

impl CommandLog for MemoryLog {
    fn append(&mut self, owner: OwnerId, record: LogRecord) -> Result<(), PersistenceError> {
        let records = self.records.entry(owner).or_default();
        if record.sequence != records.len() as u64 + 1 {
            return Err(PersistenceError::Corrupt(owner, record.sequence));
        }
        records.push(record);
        Ok(())
    }

    fn load(&self, owner: OwnerId) -> Result<Vec<LogRecord>, PersistenceError> {
        Ok(self.records.get(&owner).cloned().unwrap_or_default())
    }

    fn owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<OwnerId> = self.records.keys().copied().collect();
        owners.sort_by_key(|o| o.0);
        owners
    }
}

/// Balance-changed broadcast target.
pub trait NotificationSink {
    fn balance_changed(&mut self, event: &BalanceChangedEvent) -> Result<(), PersistenceError>;
}

/// Discards everything. Default when the product hasn't wired a sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn balance_changed(&mut self, _event: &BalanceChangedEvent) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Collects notifications for inspection in tests.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub notifications: Vec<BalanceChangedEvent>,
}

impl NotificationSink for CollectingSink {
    fn balance_changed(&mut self, event: &BalanceChangedEvent) -> Result<(), PersistenceError> {
        self.notifications.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(seq: u64) -> LogRecord {
        LogRecord {
            sequence: seq,
            timestamp: Timestamp::from_millis(0),
            command: LoggedCommand::InitAccount {
                owner_id: OwnerId(1),
                kind: AccountKind::Spot,
                initial_balance: Quote::new(dec!(1000)),
                currency: "USDT".into(),
            },
        }
    }

    #[test]
    fn append_enforces_sequence() {
        let mut log = MemoryLog::new();
        log.append(OwnerId(1), record(1)).unwrap();
        assert!(matches!(
            log.append(OwnerId(1), record(5)),
            Err(PersistenceError::Corrupt(_, 5))
        ));
        log.append(OwnerId(1), record(2)).unwrap();
        assert_eq!(log.load(OwnerId(1)).unwrap().len(), 2);
    }

    #[test]
    fn sequences_are_per_owner() {
        let mut log = MemoryLog::new();
        log.append(OwnerId(1), record(1)).unwrap();
        log.append(OwnerId(2), record(1)).unwrap();
        assert_eq!(log.owners(), vec![OwnerId(1), OwnerId(2)]);
    }

    #[test]
    fn log_record_round_trips_through_json() {
        let rec = record(1);
        let json = serde_json::to_string(&rec).unwrap();
        let back: LogRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 1);
        assert!(matches!(back.command, LoggedCommand::InitAccount { .. }));
    }
}
