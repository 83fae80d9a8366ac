// 5.0 shield.rs: per-position price freeze. two states, OFF and ON.
//
// Activation snapshots the live price and pins the *displayed* value of the
// position at quantity * snap price. The true mark keeps updating underneath;
// nothing here ever touches cash, cost basis or solvency. Deactivating with
// zero intervening ticks must reproduce the pre-shield displayed value
// exactly, which is what makes this safe to expose as a user toggle.

use crate::types::{Price, Qty, Quote, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldState {
    pub enabled: bool,
    pub snap_price: Option<Price>,
    pub snap_value: Option<Quote>,
    pub activated_at: Option<Timestamp>,
}

impl Default for ShieldState {
    fn default() -> Self {
        Self::off()
    }
}

impl ShieldState {
    pub fn off() -> Self {
        Self {
            enabled: false,
            snap_price: None,
            snap_value: None,
            activated_at: None,
        }
    }

    /// OFF -> ON. Snapshots the current mark.
    pub fn activate(&mut self, quantity: Qty, current_price: Price, now: Timestamp) {
        let snap_value = Quote::new(quantity.value() * current_price.value());
        self.enabled = true;
        self.snap_price = Some(current_price);
        self.snap_value = Some(snap_value);
        self.activated_at = Some(now);
    }

    /// ON -> OFF. Returns the drift between the frozen value and the true
    /// market value at this instant. Audit only; the ledger never sees it.
    pub fn deactivate(&mut self, true_market_value: Quote) -> Quote {
        let drift = self
            .snap_value
            .map(|snap| snap.sub(true_market_value))
            .unwrap_or_else(Quote::zero);

        *self = Self::off();
        drift
    }

    /// A buy or sell while shielded changes quantity; the frozen display must
    /// track the new size at the original snap price.
    pub fn resize(&mut self, new_quantity: Qty) {
        if let Some(snap_price) = self.snap_price {
            self.snap_value = Some(Quote::new(new_quantity.value() * snap_price.value()));
        }
    }

    /// Value shown to the user: frozen while ON, live otherwise.
    pub fn display_value(&self, true_market_value: Quote) -> Quote {
        if self.enabled {
            self.snap_value.unwrap_or(true_market_value)
        } else {
            true_market_value
        }
    }
}

/// Read accessor payload for the shield surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShieldSummary {
    pub position_id: crate::types::PositionId,
    pub symbol: crate::types::Symbol,
    pub enabled: bool,
    pub snap_price: Option<Price>,
    pub snap_value: Option<Quote>,
    pub true_value: Quote,
    pub activated_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn activate_pins_display() {
        let mut shield = ShieldState::off();
        let qty = Qty::new_unchecked(dec!(2));
        shield.activate(qty, Price::new_unchecked(dec!(100)), Timestamp::from_millis(0));

        assert!(shield.enabled);
        assert_eq!(shield.snap_value.unwrap().value(), dec!(200));

        // live value moved, display stays frozen
        let live = Quote::new(dec!(260));
        assert_eq!(shield.display_value(live).value(), dec!(200));
    }

    #[test]
    fn toggle_without_ticks_is_identity() {
        let mut shield = ShieldState::off();
        let qty = Qty::new_unchecked(dec!(3));
        let live = Quote::new(dec!(300));

        let before = shield.display_value(live);
        shield.activate(qty, Price::new_unchecked(dec!(100)), Timestamp::from_millis(0));
        let drift = shield.deactivate(live);
        let after = shield.display_value(live);

        assert_eq!(before, after);
        assert_eq!(drift.value(), dec!(0));
    }

    #[test]
    fn deactivate_reports_drift() {
        let mut shield = ShieldState::off();
        shield.activate(
            Qty::new_unchecked(dec!(1)),
            Price::new_unchecked(dec!(100)),
            Timestamp::from_millis(0),
        );

        // market dropped to 80 while shielded
        let drift = shield.deactivate(Quote::new(dec!(80)));
        assert_eq!(drift.value(), dec!(20));
        assert!(!shield.enabled);
        assert!(shield.snap_price.is_none());
    }

    #[test]
    fn resize_keeps_snap_price() {
        let mut shield = ShieldState::off();
        shield.activate(
            Qty::new_unchecked(dec!(2)),
            Price::new_unchecked(dec!(50)),
            Timestamp::from_millis(0),
        );

        shield.resize(Qty::new_unchecked(dec!(5)));
        assert_eq!(shield.snap_value.unwrap().value(), dec!(250));
        assert_eq!(shield.snap_price.unwrap().value(), dec!(50));
    }
}
