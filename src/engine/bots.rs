// 8.5 engine/bots.rs: bot lifecycle and strategy tick dispatch.
//
// Creation is entitlement-gated and validates the config up front, so a
// registered bot never fails on shape. Every bot trade goes through the
// same execution primitive as a manual trade, attributed via the ledger
// reference; a rejected submission pauses the bot with the error attached
// and nothing is retried within the tick.

use super::core::Engine;
use super::execute::TradeIntent;
use crate::account::AccountKind;
use crate::events::{
    BotDealClosedEvent, BotStatusChangedEvent, EventPayload, GridCycleCompletedEvent,
};
use crate::price_feed::PriceTick;
use crate::strategy::{
    dca_tick, grid_setup, grid_tick, Bot, BotError, BotKind, BotKindSpec, BotSpec, BotStatus,
    BotSummary, DcaAction, DcaState, Entitlements, GridAction,
};
use crate::types::{BotId, OwnerId, Qty, Quote};
use tracing::warn;

impl Engine {
    pub fn create_bot(
        &mut self,
        spec: BotSpec,
        entitlements: &dyn Entitlements,
    ) -> Result<BotId, BotError> {
        if !entitlements.bot_access(spec.owner_id) {
            return Err(BotError::NotEntitled(spec.owner_id));
        }

        let kind = match spec.kind {
            BotKindSpec::Dca(config) => {
                config.validate().map_err(BotError::ConfigInvalid)?;
                BotKind::Dca {
                    config,
                    state: DcaState::new(self.current_time),
                }
            }
            BotKindSpec::Grid(config) => {
                let state = grid_setup(&config).map_err(BotError::ConfigInvalid)?;
                BotKind::Grid { config, state }
            }
        };

        let id = BotId(self.next_bot_id);
        self.next_bot_id += 1;

        // bots start paused; an explicit start arms them
        let bot = Bot {
            id,
            owner_id: spec.owner_id,
            pair: spec.pair,
            status: BotStatus::Paused,
            kind,
            total_pnl: Quote::zero(),
            total_trades: 0,
            last_error: None,
            created_at: self.current_time,
        };
        self.bots.insert(id, bot);

        self.emit(EventPayload::BotStatusChanged(BotStatusChangedEvent {
            bot_id: id,
            status: BotStatus::Paused.as_str(),
            error: None,
        }));
        Ok(id)
    }

    pub fn start_bot(&mut self, id: BotId) -> Result<(), BotError> {
        let bot = self.bots.get_mut(&id).ok_or(BotError::NotFound(id))?;
        bot.start()?;
        let status = bot.status.as_str();
        self.emit(EventPayload::BotStatusChanged(BotStatusChangedEvent {
            bot_id: id,
            status,
            error: None,
        }));
        Ok(())
    }

    pub fn pause_bot(&mut self, id: BotId) -> Result<(), BotError> {
        let bot = self.bots.get_mut(&id).ok_or(BotError::NotFound(id))?;
        bot.pause()?;
        let status = bot.status.as_str();
        self.emit(EventPayload::BotStatusChanged(BotStatusChangedEvent {
            bot_id: id,
            status,
            error: None,
        }));
        Ok(())
    }

    pub fn stop_bot(&mut self, id: BotId) -> Result<(), BotError> {
        let bot = self.bots.get_mut(&id).ok_or(BotError::NotFound(id))?;
        bot.stop();
        self.emit(EventPayload::BotStatusChanged(BotStatusChangedEvent {
            bot_id: id,
            status: BotStatus::Stopped.as_str(),
            error: None,
        }));
        Ok(())
    }

    pub fn delete_bot(&mut self, id: BotId) -> Result<(), BotError> {
        self.bots.remove(&id).ok_or(BotError::NotFound(id))?;
        Ok(())
    }

    pub fn bot_summary(&self, id: BotId) -> Result<BotSummary, BotError> {
        self.bots
            .get(&id)
            .map(Bot::summary)
            .ok_or(BotError::NotFound(id))
    }

    pub fn list_bots(&self, owner_id: OwnerId) -> Vec<BotSummary> {
        let mut summaries: Vec<BotSummary> = self
            .bots
            .values()
            .filter(|b| b.owner_id == owner_id)
            .map(Bot::summary)
            .collect();
        summaries.sort_by_key(|s| s.id.0);
        summaries
    }

    // 8.5.1: tick dispatch. each running bot on this symbol takes one
    // strategy step; its trades settle through the owner's spot account.
    pub(super) fn tick_bots(&mut self, tick: &PriceTick) -> usize {
        let due: Vec<BotId> = self
            .bots
            .values()
            .filter(|b| b.status == BotStatus::Running && b.pair == tick.symbol)
            .map(|b| b.id)
            .collect();

        let mut trades = 0;
        for id in due {
            let Some(mut bot) = self.bots.remove(&id) else {
                continue;
            };
            match self
                .account_index
                .get(&(bot.owner_id, AccountKind::Spot))
                .copied()
            {
                Some(account_id) => trades += self.run_bot(&mut bot, account_id, tick),
                None => {
                    warn!(bot = id.0, owner = bot.owner_id.0,
                        "bot owner has no spot account, pausing");
                    bot.pause_with_error("owner has no spot account");
                    self.emit(EventPayload::BotStatusChanged(BotStatusChangedEvent {
                        bot_id: id,
                        status: bot.status.as_str(),
                        error: bot.last_error.clone(),
                    }));
                }
            }
            self.bots.insert(id, bot);
        }
        trades
    }

    fn run_bot(
        &mut self,
        bot: &mut Bot,
        account_id: crate::types::AccountId,
        tick: &PriceTick,
    ) -> usize {
        let bot_id = bot.id;
        let pair = bot.pair.clone();
        let reference = format!("bot-{}", bot_id.0);
        let now = self.current_time;
        let mut trades = 0;
        let mut failure: Option<String> = None;

        match &mut bot.kind {
            BotKind::Dca { config, state } => {
                for action in dca_tick(config, state, tick.last, now) {
                    let buy = match action {
                        DcaAction::BaseBuy { amount } => Some((amount, false)),
                        DcaAction::SafetyBuy { amount, .. } => Some((amount, true)),
                        DcaAction::CloseDeal { .. } => None,
                    };
                    match buy {
                        Some((amount, safety)) => {
                            // market buys execute against the ask
                            let price = tick.ask;
                            let quantity = Qty::new_unchecked(amount.value() / price.value());
                            match self.execute(TradeIntent::SpotBuy {
                                account_id,
                                symbol: pair.clone(),
                                quantity,
                                price,
                                reference: reference.clone(),
                            }) {
                                Ok(receipt) => {
                                    let spent = Quote::new(quantity.value() * price.value())
                                        .add(receipt.fee);
                                    state.record_buy(quantity, spent, safety);
                                    trades += 1;
                                }
                                Err(e) => {
                                    failure = Some(e.to_string());
                                    break;
                                }
                            }
                        }
                        None => {
                            if state.total_quantity.is_zero() {
                                state.reset_deal();
                                continue;
                            }
                            match self.execute(TradeIntent::SpotSell {
                                account_id,
                                symbol: pair.clone(),
                                quantity: state.total_quantity,
                                price: tick.bid,
                                reference: reference.clone(),
                            }) {
                                Ok(receipt) => {
                                    bot.total_pnl = bot.total_pnl.add(receipt.realized_pnl);
                                    state.reset_deal();
                                    trades += 1;
                                    self.emit(EventPayload::BotDealClosed(BotDealClosedEvent {
                                        bot_id,
                                        realized_pnl: receipt.realized_pnl,
                                        deals_completed: state.deals_completed,
                                    }));
                                }
                                Err(e) => {
                                    failure = Some(e.to_string());
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            BotKind::Grid { state, .. } => {
                for action in grid_tick(state, tick.last) {
                    match action {
                        GridAction::FillBuy {
                            cell,
                            price,
                            quantity,
                        } => match self.execute(TradeIntent::SpotBuy {
                            account_id,
                            symbol: pair.clone(),
                            quantity,
                            price,
                            reference: reference.clone(),
                        }) {
                            Ok(_) => {
                                state.cells[cell].buy_filled = true;
                                trades += 1;
                            }
                            Err(e) => {
                                failure = Some(e.to_string());
                                break;
                            }
                        },
                        GridAction::FillSell {
                            cell,
                            price,
                            quantity,
                            profit,
                        } => match self.execute(TradeIntent::SpotSell {
                            account_id,
                            symbol: pair.clone(),
                            quantity,
                            price,
                            reference: reference.clone(),
                        }) {
                            Ok(receipt) => {
                                state.cells[cell].buy_filled = false;
                                state.cycles_completed += 1;
                                state.grid_profit = state.grid_profit.add(profit);
                                bot.total_pnl = bot.total_pnl.add(receipt.realized_pnl);
                                trades += 1;
                                self.emit(EventPayload::GridCycleCompleted(
                                    GridCycleCompletedEvent {
                                        bot_id,
                                        level_index: cell,
                                        profit,
                                        cycles_completed: state.cycles_completed,
                                    },
                                ));
                            }
                            Err(e) => {
                                failure = Some(e.to_string());
                                break;
                            }
                        },
                    }
                }
            }
        }

        bot.total_trades += trades as u64;
        if let Some(msg) = failure {
            warn!(bot = bot_id.0, error = %msg, "bot submission failed, pausing");
            bot.pause_with_error(msg.clone());
            self.emit(EventPayload::BotStatusChanged(BotStatusChangedEvent {
                bot_id,
                status: bot.status.as_str(),
                error: Some(msg),
            }));
        }
        trades
    }
}
