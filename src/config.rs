// 7.0 config.rs: all settings in one place. fees, margin ratios, stop-out
// threshold, event retention.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

// Complete configuration for the accounting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub fees: FeeConfig,
    pub margin: MarginConfig,
    // Events kept in memory before the oldest are dropped.
    pub max_events: usize,
    // Echo events to stdout (simulation runs).
    pub verbose: bool,
    // Ledger page size for paged reads.
    pub ledger_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fees: FeeConfig::default(),
            margin: MarginConfig::default(),
            max_events: 10_000,
            verbose: false,
            ledger_page_size: 50,
        }
    }
}

/** 7.1: fee settings. one flat rate per executed notional; buys fold the fee
into cost basis, sells deduct it from proceeds (see engine/execute.rs). */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    // Fee as a fraction of notional, e.g. 0.001 = 0.1%
    pub trade_fee_rate: Decimal,
    // Extra fee applied to forced closes
    pub liquidation_fee_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            trade_fee_rate: dec!(0.001),
            liquidation_fee_rate: dec!(0),
        }
    }
}

// 7.2: margin model knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginConfig {
    // Maintenance margin as a fraction of required (initial) margin.
    pub maintenance_ratio: Decimal,
    // Margin level (equity / margin used, in percent) at which forced
    // closes start. 50% with maintenance_ratio 0.5 means equity <= total
    // maintenance margin.
    pub stop_out_level_pct: Decimal,
    pub max_leverage: Decimal,
}

impl Default for MarginConfig {
    fn default() -> Self {
        Self {
            maintenance_ratio: dec!(0.5),
            stop_out_level_pct: dec!(50),
            max_leverage: dec!(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = EngineConfig::default();
        // stop-out at 50% matches maintenance = half of required margin
        assert_eq!(cfg.margin.maintenance_ratio * dec!(100), cfg.margin.stop_out_level_pct);
        assert!(cfg.fees.trade_fee_rate < dec!(0.01));
    }
}
