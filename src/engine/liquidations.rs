// 8.4 engine/liquidations.rs: the stop-out monitor. runs every tick after
// mark-to-market and order triggers.
//
// An account stops out when its margin level falls to or below the
// configured stop-out level (50% by default, which with the default
// maintenance ratio is equity <= total maintenance margin). Victims are
// closed whole, worst unrealized pnl first, and health
// is re-evaluated after every forced close so the monitor stops as soon as
// the account recovers. If the last position goes and cash is still
// negative, the shortfall is flagged for manual follow-up; there is no
// auto-retry and no socialization here.

use super::core::Engine;
use super::execute::{CloseReason, TradeIntent};
use crate::account::AccountKind;
use crate::events::{EventPayload, LiquidationEvent, LiquidationShortfallEvent};
use crate::liquidation::{evaluate_margin_health, liquidation_queue, HealthStatus};
use crate::position::MarginPosition;
use crate::types::AccountId;
use tracing::{error, warn};

impl Engine {
    // returns the number of positions force-closed this tick
    pub(super) fn run_liquidation_monitor(&mut self) -> usize {
        let margin_accounts: Vec<AccountId> = self
            .accounts
            .values()
            .filter(|a| a.kind == AccountKind::Margin)
            .map(|a| a.id)
            .collect();

        let mut closed = 0;
        for account_id in margin_accounts {
            closed += self.stop_out_account(account_id);
        }
        closed
    }

    fn stop_out_account(&mut self, account_id: AccountId) -> usize {
        let maintenance_ratio = self.config.margin.maintenance_ratio;
        let stop_out_level = self.config.margin.stop_out_level_pct;
        let mut closed = 0;

        loop {
            let Some(account) = self.accounts.get(&account_id) else {
                break;
            };
            let positions: Vec<MarginPosition> = self
                .margin_positions
                .values()
                .filter(|p| p.account_id == account_id)
                .cloned()
                .collect();
            if positions.is_empty() {
                break;
            }

            let refs: Vec<&MarginPosition> = positions.iter().collect();
            let health = evaluate_margin_health(
                account.cash_balance,
                &refs,
                maintenance_ratio,
                stop_out_level,
            );
            if health.status != HealthStatus::StopOut {
                break;
            }

            let queue = liquidation_queue(&refs);
            let Some(&victim_id) = queue.first() else {
                break;
            };
            let Some(victim) = positions.iter().find(|p| p.id == victim_id) else {
                break;
            };
            let (symbol, side, quantity, close_price) = (
                victim.symbol.clone(),
                victim.side,
                victim.quantity,
                victim.current_price,
            );

            warn!(account = account_id.0, position = victim_id.0,
                margin_level = %health.margin_level_pct, "stop-out, forcing close");

            let receipt = match self.execute(TradeIntent::MarginClose {
                account_id,
                position_id: victim_id,
                price: close_price,
                reason: CloseReason::Liquidation,
            }) {
                Ok(receipt) => receipt,
                Err(e) => {
                    // leave the account for the next tick rather than loop
                    error!(account = account_id.0, position = victim_id.0, error = %e,
                        "forced close failed");
                    break;
                }
            };
            closed += 1;

            let equity_after = self
                .account_metrics(account_id)
                .map(|m| m.equity)
                .unwrap_or(receipt.balance_after);
            self.emit(EventPayload::Liquidation(LiquidationEvent {
                account_id,
                position_id: victim_id,
                symbol,
                side,
                quantity,
                close_price,
                realized_pnl: receipt.realized_pnl,
                equity_after,
            }));
        }

        if closed > 0 {
            let still_open = self
                .margin_positions
                .values()
                .any(|p| p.account_id == account_id);
            if !still_open {
                if let Some(account) = self.accounts.get(&account_id) {
                    if account.cash_balance.is_negative() {
                        let residual_equity = account.cash_balance;
                        error!(account = account_id.0, residual = %residual_equity,
                            "liquidation exhausted positions with negative equity");
                        self.emit(EventPayload::LiquidationShortfall(
                            LiquidationShortfallEvent {
                                account_id,
                                residual_equity,
                            },
                        ));
                    }
                }
            }
        }

        closed
    }
}
