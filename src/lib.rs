// broker-core: trading platform accounting and execution core.
// invariant-first architecture: every balance mutation goes through one
// execution primitive and lands in the ledger. all computation is
// deterministic with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AccountId, Symbol, Price, Qty, Quote, Leverage
//   2.x  ledger.rs: append-only audit trail, paged reads
//   3.x  account.rs: account aggregate, metrics fold
//   4.x  position.rs: spot weighted-average cost, margin entry/liquidation math
//   5.x  shield.rs: per-position price freeze (display only)
//   6.x  liquidation.rs: margin health, stop-out, victim ordering
//   7.x  config.rs: fees, margin ratios, retention
//   8.x  engine/: execution primitive, tick pipeline, orders, monitor, bots
//   9.x  price_feed.rs: consumed tick shape + latest-tick book
//   9.2  persistence.rs: command log + notification sink boundaries
//   10.x strategy/: DCA and grid bots
//   11.x events.rs: state transition events for audit

// accounting core
pub mod account;
pub mod engine;
pub mod ledger;
pub mod position;
pub mod shield;
pub mod types;

// market surfaces
pub mod liquidation;
pub mod orders;
pub mod price_feed;
pub mod strategy;

// integration modules
pub mod config;
pub mod events;
pub mod persistence;

// re exports for convenience
pub use account::*;
pub use config::*;
pub use engine::*;
pub use events::*;
pub use ledger::*;
pub use liquidation::*;
pub use orders::*;
pub use position::*;
pub use price_feed::*;
pub use shield::*;
pub use strategy::*;
pub use types::*;
pub use persistence::{
    CollectingSink, CommandLog, LogRecord, LoggedCommand, MemoryLog, NotificationSink, NullSink,
    PersistenceError,
};
