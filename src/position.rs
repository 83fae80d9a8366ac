// 4.0 position.rs: open position tracking for both settlement models.
// spot: fully prepaid, weighted-average cost, always long.
// margin: leveraged, side fixed at open, subject to liquidation.
// 4.3+ has the merge/reduce logic at the bottom.

use crate::shield::ShieldState;
use crate::types::{AccountId, Leverage, PositionId, Price, Qty, Quote, Side, Symbol, Timestamp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPosition {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub quantity: Qty,
    // fee-inclusive weighted average cost per unit
    pub avg_cost: Price,
    pub current_price: Price,
    pub shield: ShieldState,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SpotPosition {
    pub fn open(
        id: PositionId,
        account_id: AccountId,
        symbol: Symbol,
        quantity: Qty,
        avg_cost: Price,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            quantity,
            avg_cost,
            current_price: avg_cost,
            shield: ShieldState::off(),
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn market_value(&self) -> Quote {
        Quote::new(self.quantity.value() * self.current_price.value())
    }

    pub fn cost_basis(&self) -> Quote {
        Quote::new(self.quantity.value() * self.avg_cost.value())
    }

    // 4.1: true pnl, always from the live mark. the shield never leaks in here.
    pub fn unrealized_pnl(&self) -> Quote {
        self.market_value().sub(self.cost_basis())
    }

    /// Value shown to the user; pinned while the shield is on.
    pub fn display_value(&self) -> Quote {
        self.shield.display_value(self.market_value())
    }

    pub fn display_pnl(&self) -> Quote {
        self.display_value().sub(self.cost_basis())
    }

    pub fn mark(&mut self, price: Price) {
        self.current_price = price;
    }
}

// 4.2: leveraged exposure. quantity shrinks on partial close, side never flips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginPosition {
    pub id: PositionId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Qty,
    pub avg_entry: Price,
    pub leverage: Leverage,
    pub current_price: Price,
    // set when the mark breaches the liquidation price; only a forced close
    // may touch the position while this holds
    pub liquidating: bool,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MarginPosition {
    pub fn open(
        id: PositionId,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        quantity: Qty,
        entry: Price,
        leverage: Leverage,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            account_id,
            symbol,
            side,
            quantity,
            avg_entry: entry,
            leverage,
            current_price: entry,
            liquidating: false,
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Entry notional: quantity * average entry.
    pub fn notional(&self) -> Quote {
        Quote::new(self.quantity.value() * self.avg_entry.value())
    }

    /// Collateral backing this position: notional / leverage.
    pub fn required_margin(&self) -> Quote {
        Quote::new(self.notional().value() / self.leverage.value())
    }

    pub fn maintenance_margin(&self, maintenance_ratio: Decimal) -> Quote {
        self.required_margin().mul(maintenance_ratio)
    }

    // 4.3: the pnl formula. (mark - entry) * qty for longs, mirrored for shorts.
    pub fn unrealized_pnl(&self) -> Quote {
        let diff = self.current_price.value() - self.avg_entry.value();
        Quote::new(self.side.sign() * diff * self.quantity.value())
    }

    /// PnL relative to margin at risk, not notional. 10x leverage and a 1%
    /// favorable move reads as +10%.
    pub fn unrealized_pnl_percent(&self) -> Decimal {
        let required = self.required_margin().value();
        if required.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl().value() / required * dec!(100)
    }

    /// Price at which this position alone has eaten through required margin
    /// down to maintenance. Long: entry * (1 - (1-mmr)/lev). Short mirrored.
    pub fn liquidation_price(&self, maintenance_ratio: Decimal) -> Price {
        let buffer = (Decimal::ONE - maintenance_ratio) / self.leverage.value();
        let raw = match self.side {
            Side::Long => self.avg_entry.value() * (Decimal::ONE - buffer),
            Side::Short => self.avg_entry.value() * (Decimal::ONE + buffer),
        };
        Price::new_unchecked(raw.max(dec!(0.0001)))
    }

    pub fn breaches_liquidation(&self, maintenance_ratio: Decimal) -> bool {
        let liq = self.liquidation_price(maintenance_ratio).value();
        match self.side {
            Side::Long => self.current_price.value() <= liq,
            Side::Short => self.current_price.value() >= liq,
        }
    }

    pub fn mark(&mut self, price: Price) {
        self.current_price = price;
    }
}

// 4.4: spot merge. fee folds into the cost basis on buys:
// new_avg = (old_qty*old_avg + new_qty*price + fee) / (old_qty + new_qty)
pub fn merge_spot_buy(
    position: &mut SpotPosition,
    quantity: Qty,
    price: Price,
    fee: Quote,
    timestamp: Timestamp,
) {
    let old_qty = position.quantity.value();
    let new_qty = old_qty + quantity.value();
    debug_assert!(new_qty > Decimal::ZERO);

    let weighted = old_qty * position.avg_cost.value()
        + quantity.value() * price.value()
        + fee.value();
    position.avg_cost = Price::new_unchecked(weighted / new_qty);
    position.quantity = Qty::new_unchecked(new_qty);
    position.current_price = price;
    position.updated_at = timestamp;
    // frozen display tracks the new size at the original snap price
    position.shield.resize(position.quantity);
}

#[derive(Debug, Clone)]
pub struct SpotSellOutcome {
    // None when the sell consumed the whole position
    pub remaining: Option<Qty>,
    // (exit - avg_cost) * qty - fee
    pub realized_pnl: Quote,
    // qty * exit - fee, credited to cash
    pub proceeds: Quote,
}

// 4.5: spot reduction. avg cost is untouched on partial sells; the fee is a
// separate deduction here, unlike buys where it folds into the basis.
pub fn apply_spot_sell(
    position: &mut SpotPosition,
    quantity: Qty,
    price: Price,
    fee: Quote,
    timestamp: Timestamp,
) -> SpotSellOutcome {
    debug_assert!(quantity.value() <= position.quantity.value());

    let gross = (price.value() - position.avg_cost.value()) * quantity.value();
    let realized_pnl = Quote::new(gross - fee.value());
    let proceeds = Quote::new(quantity.value() * price.value() - fee.value());

    position.quantity = position.quantity.sub(quantity);
    position.current_price = price;
    position.updated_at = timestamp;
    position.shield.resize(position.quantity);

    let remaining = if position.quantity.is_zero() {
        None
    } else {
        Some(position.quantity)
    };

    SpotSellOutcome {
        remaining,
        realized_pnl,
        proceeds,
    }
}

// 4.6: margin increase in the same direction. averages the entry.
pub fn increase_margin_position(
    position: &mut MarginPosition,
    quantity: Qty,
    fill_price: Price,
    timestamp: Timestamp,
) {
    let old_qty = position.quantity.value();
    let new_qty = old_qty + quantity.value();
    debug_assert!(new_qty > Decimal::ZERO);

    let weighted = old_qty * position.avg_entry.value() + quantity.value() * fill_price.value();
    position.avg_entry = Price::new_unchecked(weighted / new_qty);
    position.quantity = Qty::new_unchecked(new_qty);
    position.current_price = fill_price;
    position.updated_at = timestamp;
}

#[derive(Debug, Clone)]
pub struct MarginCloseOutcome {
    pub remaining: Option<Qty>,
    // (exit - entry) * qty - fee for longs, mirrored for shorts
    pub realized_pnl: Quote,
    // margin released back to the account's free margin
    pub margin_freed: Quote,
}

// 4.7: margin reduction/close. entry unchanged on partial close, margin is
// freed in proportion to the closed quantity.
pub fn reduce_margin_position(
    position: &mut MarginPosition,
    quantity: Qty,
    exit_price: Price,
    fee: Quote,
    timestamp: Timestamp,
) -> MarginCloseOutcome {
    let close_qty = quantity.value().min(position.quantity.value());
    debug_assert!(close_qty > Decimal::ZERO);

    let diff = exit_price.value() - position.avg_entry.value();
    let gross = position.side.sign() * diff * close_qty;
    let realized_pnl = Quote::new(gross - fee.value());

    let margin_before = position.required_margin();

    position.quantity = position.quantity.sub(Qty::new_unchecked(close_qty));
    position.current_price = exit_price;
    position.updated_at = timestamp;

    let margin_freed = margin_before.sub(position.required_margin());

    let remaining = if position.quantity.is_zero() {
        None
    } else {
        Some(position.quantity)
    };

    MarginCloseOutcome {
        remaining,
        realized_pnl,
        margin_freed,
    }
}
