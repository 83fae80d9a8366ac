// 6.0 liquidation.rs: margin health math. pure functions, no state.
//
// An account stops out when its margin level (equity / margin used, in
// percent) falls to or below the configured stop-out level. With the
// defaults (maintenance ratio 0.5, stop-out 50%) that is exactly equity
// <= total maintenance margin. Victims are picked worst pnl first and
// closed whole, one at a time, re-evaluating in between; partial
// liquidation is deliberately not done here.

use crate::position::MarginPosition;
use crate::types::{PositionId, Quote};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    // margin level within 20% of the stop-out level
    AtRisk,
    StopOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginHealth {
    pub equity: Quote,
    pub total_maintenance: Quote,
    pub margin_level_pct: Decimal,
    pub status: HealthStatus,
}

pub fn evaluate_margin_health(
    cash_balance: Quote,
    positions: &[&MarginPosition],
    maintenance_ratio: Decimal,
    stop_out_level_pct: Decimal,
) -> MarginHealth {
    let unrealized: Quote = positions.iter().map(|p| p.unrealized_pnl()).sum();
    let equity = cash_balance.add(unrealized);

    let total_maintenance: Quote = positions
        .iter()
        .map(|p| p.maintenance_margin(maintenance_ratio))
        .sum();

    let margin_used: Quote = positions.iter().map(|p| p.required_margin()).sum();
    let margin_level_pct = if margin_used.value().is_zero() {
        Decimal::MAX
    } else {
        equity.value() / margin_used.value() * dec!(100)
    };

    let status = if positions.is_empty() {
        HealthStatus::Healthy
    } else if margin_level_pct <= stop_out_level_pct {
        HealthStatus::StopOut
    } else if margin_level_pct <= stop_out_level_pct * dec!(1.2) {
        HealthStatus::AtRisk
    } else {
        HealthStatus::Healthy
    };

    MarginHealth {
        equity,
        total_maintenance,
        margin_level_pct,
        status,
    }
}

/// Victim ordering: most negative unrealized PnL first.
pub fn liquidation_queue(positions: &[&MarginPosition]) -> Vec<PositionId> {
    let mut ranked: Vec<(PositionId, Quote)> = positions
        .iter()
        .map(|p| (p.id, p.unrealized_pnl()))
        .collect();
    ranked.sort_by(|a, b| a.1.cmp(&b.1));
    ranked.into_iter().map(|(id, _)| id).collect()
}
