// 8.0: the accounting and execution engine. coordinates trade execution,
// position and ledger bookkeeping, shield toggles, conditional orders,
// the liquidation monitor, and bot strategy dispatch.
// deterministic and event-driven with no external I/O.

mod bots;
mod core;
mod execute;
mod liquidations;
mod orders;
mod results;
mod ticks;

pub use core::Engine;
pub use execute::{CloseReason, TradeIntent};
pub use results::{ExecutionError, ExecutionReceipt, OrderError, ShieldError, TickReport};
