// 9.0 price_feed.rs: the consumed side of the price feed adapter.
//
// The engine is agnostic to where ticks come from (exchange websocket, an
// aggregator, a replay file). Whatever the source, it delivers PriceTick
// values and the engine keeps only the latest tick per symbol. All
// mark-to-market, order triggering and strategy logic reads from TickBook.

use crate::types::{Price, Symbol, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One bid/ask/last observation for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: Symbol,
    pub bid: Price,
    pub ask: Price,
    pub last: Price,
    pub timestamp: Timestamp,
}

impl PriceTick {
    pub fn new(symbol: Symbol, bid: Price, ask: Price, last: Price, timestamp: Timestamp) -> Self {
        debug_assert!(bid.value() <= ask.value(), "crossed tick");
        Self {
            symbol,
            bid,
            ask,
            last,
            timestamp,
        }
    }

    /// Midpoint of bid/ask, used for mark-to-market.
    pub fn mid(&self) -> Price {
        Price::new_unchecked((self.bid.value() + self.ask.value()) / rust_decimal::Decimal::TWO)
    }
}

/// Latest tick per symbol. Replaced wholesale on every update; consumers of
/// one tick always see a single consistent observation.
#[derive(Debug, Clone, Default)]
pub struct TickBook {
    latest: HashMap<Symbol, PriceTick>,
}

impl TickBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, tick: PriceTick) {
        self.latest.insert(tick.symbol.clone(), tick);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&PriceTick> {
        self.latest.get(symbol)
    }

    pub fn last_price(&self, symbol: &Symbol) -> Option<Price> {
        self.latest.get(symbol).map(|t| t.last)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.latest.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tick(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> PriceTick {
        PriceTick::new(
            Symbol::new("BTCUSDT"),
            Price::new_unchecked(bid),
            Price::new_unchecked(ask),
            Price::new_unchecked(ask),
            Timestamp::from_millis(1_000),
        )
    }

    #[test]
    fn mid_price() {
        let t = tick(dec!(99), dec!(101));
        assert_eq!(t.mid().value(), dec!(100));
    }

    #[test]
    fn book_keeps_latest() {
        let mut book = TickBook::new();
        book.update(tick(dec!(99), dec!(101)));
        book.update(tick(dec!(100), dec!(102)));

        let latest = book.get(&Symbol::new("BTCUSDT")).unwrap();
        assert_eq!(latest.bid.value(), dec!(100));
    }
}
