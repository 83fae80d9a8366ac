// 8.0 engine/core.rs: the engine owns all state: accounts, positions, the
// order book, bots, the ledger, the event log, and the latest ticks. it is
// single-threaded and deterministic; callers wanting cross-account
// parallelism shard engines by account.

use super::results::{ExecutionError, ShieldError};
use crate::account::{account_metrics, Account, AccountKind, AccountMetrics};
use crate::config::EngineConfig;
use crate::events::{
    AccountOpenedEvent, BalanceChangedEvent, Event, EventLog, EventPayload, ShieldDeactivatedEvent,
    ShieldEvent,
};
use crate::ledger::{EntryId, EntryType, Ledger, LedgerEntry};
use crate::orders::{ConditionalOrder, OrderBook};
use crate::persistence::{CommandLog, LoggedCommand, NotificationSink, PersistenceError};
use crate::position::{MarginPosition, SpotPosition};
use crate::price_feed::TickBook;
use crate::shield::ShieldSummary;
use crate::strategy::Bot;
use crate::types::{AccountId, BotId, OwnerId, PositionId, Quote, Symbol, Timestamp};
use std::collections::HashMap;
use tracing::warn;

pub struct Engine {
    pub(super) config: EngineConfig,
    pub(super) accounts: HashMap<AccountId, Account>,
    pub(super) account_index: HashMap<(OwnerId, AccountKind), AccountId>,
    pub(super) spot_positions: HashMap<PositionId, SpotPosition>,
    pub(super) margin_positions: HashMap<PositionId, MarginPosition>,
    pub(super) order_book: OrderBook,
    pub(super) bots: HashMap<BotId, Bot>,
    pub(super) ledger: Ledger,
    pub(super) event_log: EventLog,
    pub(super) ticks: TickBook,
    pub(super) sink: Option<Box<dyn NotificationSink>>,
    pub(super) next_account_id: u64,
    pub(super) next_position_id: u64,
    pub(super) next_bot_id: u64,
    pub(super) current_time: Timestamp,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let max_events = config.max_events;
        Self {
            config,
            accounts: HashMap::new(),
            account_index: HashMap::new(),
            spot_positions: HashMap::new(),
            margin_positions: HashMap::new(),
            order_book: OrderBook::new(),
            bots: HashMap::new(),
            ledger: Ledger::new(),
            event_log: EventLog::new(max_events),
            ticks: TickBook::new(),
            sink: None,
            next_account_id: 1,
            next_position_id: 1,
            next_bot_id: 1,
            current_time: Timestamp::from_millis(0),
        }
    }

    /// Wire the balance-changed broadcast target. Fire-and-forget: a sink
    /// failure is logged, never propagated.
    pub fn set_notification_sink(&mut self, sink: Box<dyn NotificationSink>) {
        self.sink = Some(sink);
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, millis: i64) {
        self.current_time = Timestamp::from_millis(self.current_time.as_millis() + millis);
    }

    // 8.0.1: account surface. one account per (owner, kind); the opening
    // deposit is the account's first ledger entry.
    pub fn init_account(
        &mut self,
        owner_id: OwnerId,
        kind: AccountKind,
        initial_balance: Quote,
        currency: impl Into<String>,
    ) -> Result<AccountId, ExecutionError> {
        if self.account_index.contains_key(&(owner_id, kind)) {
            return Err(ExecutionError::AccountExists(owner_id, kind));
        }

        let id = AccountId(self.next_account_id);
        self.next_account_id += 1;

        let account = Account::new(
            id,
            owner_id,
            kind,
            initial_balance,
            currency.into(),
            self.current_time,
        );
        let currency = account.currency.clone();
        self.accounts.insert(id, account);
        self.account_index.insert((owner_id, kind), id);

        let entry_id = self.ledger.append(
            id,
            EntryType::Deposit,
            initial_balance,
            Quote::zero(),
            "manual",
            "opening deposit",
            self.current_time,
        );

        self.emit(EventPayload::AccountOpened(AccountOpenedEvent {
            account_id: id,
            initial_balance,
            currency,
        }));
        self.settle_cash_event(id, entry_id, initial_balance, initial_balance);

        Ok(id)
    }

    pub fn get_account(&self, owner_id: OwnerId, kind: AccountKind) -> Option<&Account> {
        let id = self.account_index.get(&(owner_id, kind))?;
        self.accounts.get(id)
    }

    pub fn account(&self, account_id: AccountId) -> Option<&Account> {
        self.accounts.get(&account_id)
    }

    pub fn account_metrics(&self, account_id: AccountId) -> Option<AccountMetrics> {
        let account = self.accounts.get(&account_id)?;
        let spot: Vec<&SpotPosition> = self.list_spot_positions(account_id);
        let margin: Vec<&MarginPosition> = self.list_margin_positions(account_id);
        Some(account_metrics(account, &spot, &margin))
    }

    pub fn list_spot_positions(&self, account_id: AccountId) -> Vec<&SpotPosition> {
        let mut positions: Vec<&SpotPosition> = self
            .spot_positions
            .values()
            .filter(|p| p.account_id == account_id)
            .collect();
        positions.sort_by_key(|p| p.id.0);
        positions
    }

    pub fn list_margin_positions(&self, account_id: AccountId) -> Vec<&MarginPosition> {
        let mut positions: Vec<&MarginPosition> = self
            .margin_positions
            .values()
            .filter(|p| p.account_id == account_id)
            .collect();
        positions.sort_by_key(|p| p.id.0);
        positions
    }

    pub fn ledger_page(&self, account_id: AccountId, page: usize) -> Vec<&LedgerEntry> {
        self.ledger
            .page(account_id, page, self.config.ledger_page_size)
    }

    pub fn ledger_net_delta(&self, account_id: AccountId) -> Quote {
        self.ledger.net_delta(account_id)
    }

    pub fn pending_orders(&self, account_id: AccountId) -> Vec<&ConditionalOrder> {
        self.order_book.pending_for_account(account_id)
    }

    pub fn order_history(&self, account_id: AccountId) -> Vec<&ConditionalOrder> {
        self.order_book.history_for_account(account_id)
    }

    pub fn events(&self) -> &[Event] {
        self.event_log.events()
    }

    pub fn recent_events(&self, count: usize) -> &[Event] {
        self.event_log.recent(count)
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<crate::types::Price> {
        self.ticks.last_price(symbol)
    }

    // 8.0.3: shield surface. one toggle per spot position; activation
    // snapshots the live mark, deactivation reports the drift for audit.
    pub fn toggle_shield(
        &mut self,
        account_id: AccountId,
        position_id: PositionId,
    ) -> Result<ShieldSummary, ShieldError> {
        if !self.accounts.contains_key(&account_id) {
            return Err(ShieldError::AccountNotFound(account_id));
        }
        let now = self.current_time;
        let position = self
            .spot_positions
            .get_mut(&position_id)
            .filter(|p| p.account_id == account_id)
            .ok_or(ShieldError::PositionNotFound(position_id))?;

        let event = if position.shield.enabled {
            let drift = position.shield.deactivate(position.market_value());
            EventPayload::ShieldDeactivated(ShieldDeactivatedEvent {
                account_id,
                position_id,
                drift,
            })
        } else {
            position
                .shield
                .activate(position.quantity, position.current_price, now);
            EventPayload::ShieldActivated(ShieldEvent {
                account_id,
                position_id,
                snap_price: position.current_price,
                snap_value: position.market_value(),
            })
        };

        let summary = ShieldSummary {
            position_id,
            symbol: position.symbol.clone(),
            enabled: position.shield.enabled,
            snap_price: position.shield.snap_price,
            snap_value: position.shield.snap_value,
            true_value: position.market_value(),
            activated_at: position.shield.activated_at,
        };
        self.emit(event);
        Ok(summary)
    }

    pub fn shield_summary(&self, account_id: AccountId) -> Vec<ShieldSummary> {
        self.list_spot_positions(account_id)
            .into_iter()
            .map(|p| ShieldSummary {
                position_id: p.id,
                symbol: p.symbol.clone(),
                enabled: p.shield.enabled,
                snap_price: p.shield.snap_price,
                snap_value: p.shield.snap_value,
                true_value: p.market_value(),
                activated_at: p.shield.activated_at,
            })
            .collect()
    }

    // 8.0.4: reconciliation. the engine is deterministic, so replaying the
    // command log reproduces accounts, positions, and the ledger exactly.
    // a command that fails on replay signals drift; it is logged and skipped.
    pub fn replay(&mut self, log: &dyn CommandLog) -> Result<(), PersistenceError> {
        for owner in log.owners() {
            for record in log.load(owner)? {
                self.set_time(record.timestamp);
                match record.command {
                    LoggedCommand::InitAccount {
                        owner_id,
                        kind,
                        initial_balance,
                        currency,
                    } => {
                        if let Err(e) =
                            self.init_account(owner_id, kind, initial_balance, currency)
                        {
                            warn!(owner = owner_id.0, sequence = record.sequence, error = %e,
                                "replayed account init rejected");
                        }
                    }
                    LoggedCommand::Execute(intent) => {
                        if let Err(e) = self.execute(intent) {
                            warn!(owner = owner.0, sequence = record.sequence, error = %e,
                                "replayed command rejected");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub(super) fn find_spot_position(
        &self,
        account_id: AccountId,
        symbol: &Symbol,
    ) -> Option<PositionId> {
        self.spot_positions
            .values()
            .find(|p| p.account_id == account_id && &p.symbol == symbol)
            .map(|p| p.id)
    }

    pub(super) fn next_position(&mut self) -> PositionId {
        let id = PositionId(self.next_position_id);
        self.next_position_id += 1;
        id
    }

    pub(super) fn emit(&mut self, payload: EventPayload) {
        if self.config.verbose {
            println!("[{}] {:?}", self.current_time.as_millis(), payload);
        }
        self.event_log.record(self.current_time, payload);
    }

    /// Ledgered cash movement: record the event and push it through the
    /// notification sink. The in-memory commit already happened; a sink
    /// failure never rolls it back.
    pub(super) fn settle_cash_event(
        &mut self,
        account_id: AccountId,
        entry_id: EntryId,
        delta: Quote,
        new_balance: Quote,
    ) {
        let event = BalanceChangedEvent {
            account_id,
            entry_id,
            delta,
            new_balance,
        };
        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.balance_changed(&event) {
                warn!(account = account_id.0, error = %e, "balance notification failed");
            }
        }
        self.emit(EventPayload::BalanceChanged(event));
    }
}
