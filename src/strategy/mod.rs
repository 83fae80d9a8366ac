// 10.0: unattended trading bots. two kinds, DCA and grid, represented as a
// tagged enum with kind-specific config and runtime state. both emit their
// trades through the same execution primitive as manual trading; a failed
// submission pauses the bot with the error attached, no same-tick retries.

mod dca;
mod grid;

pub use dca::{DcaAction, DcaConfig, DcaState, DealCloseReason, SafetyOrderConfig, dca_tick};
pub use grid::{
    GridAction, GridCell, GridConfig, GridMode, GridSpacing, GridState, grid_setup, grid_tick,
};

use crate::types::{BotId, OwnerId, Quote, Symbol, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotStatus {
    Running,
    Paused,
    // terminal. a stopped bot can only be deleted.
    Stopped,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Running => "running",
            BotStatus::Paused => "paused",
            BotStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotKind {
    Dca { config: DcaConfig, state: DcaState },
    Grid { config: GridConfig, state: GridState },
}

impl BotKind {
    pub fn name(&self) -> &'static str {
        match self {
            BotKind::Dca { .. } => "dca",
            BotKind::Grid { .. } => "grid",
        }
    }
}

/// Caller-facing creation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSpec {
    pub owner_id: OwnerId,
    pub pair: Symbol,
    pub kind: BotKindSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BotKindSpec {
    Dca(DcaConfig),
    Grid(GridConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub owner_id: OwnerId,
    pub pair: Symbol,
    pub status: BotStatus,
    pub kind: BotKind,
    pub total_pnl: Quote,
    pub total_trades: u64,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}

impl Bot {
    pub fn start(&mut self) -> Result<(), BotError> {
        match self.status {
            BotStatus::Stopped => Err(BotError::Terminal(self.id)),
            _ => {
                self.status = BotStatus::Running;
                self.last_error = None;
                Ok(())
            }
        }
    }

    pub fn pause(&mut self) -> Result<(), BotError> {
        match self.status {
            BotStatus::Stopped => Err(BotError::Terminal(self.id)),
            _ => {
                self.status = BotStatus::Paused;
                Ok(())
            }
        }
    }

    pub fn stop(&mut self) {
        self.status = BotStatus::Stopped;
    }

    /// Submission failure path: park the bot and keep the error for the user.
    pub fn pause_with_error(&mut self, error: impl Into<String>) {
        self.status = BotStatus::Paused;
        self.last_error = Some(error.into());
    }
}

/// Read-only performance view. Serializes for export, never read back.
#[derive(Debug, Clone, Serialize)]
pub struct BotSummary {
    pub id: BotId,
    pub kind: &'static str,
    pub pair: Symbol,
    pub status: BotStatus,
    pub total_pnl: Quote,
    pub total_trades: u64,
    pub deals_or_cycles: u64,
    pub last_error: Option<String>,
}

impl Bot {
    pub fn summary(&self) -> BotSummary {
        let deals_or_cycles = match &self.kind {
            BotKind::Dca { state, .. } => state.deals_completed,
            BotKind::Grid { state, .. } => state.cycles_completed,
        };
        BotSummary {
            id: self.id,
            kind: self.kind.name(),
            pair: self.pair.clone(),
            status: self.status,
            total_pnl: self.total_pnl,
            total_trades: self.total_trades,
            deals_or_cycles,
            last_error: self.last_error.clone(),
        }
    }
}

/// External tier/entitlement service: may this owner run bots at all?
/// The product wires its real service; tests and the simulator allow all.
pub trait Entitlements {
    fn bot_access(&self, owner_id: OwnerId) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Entitlements for AllowAll {
    fn bot_access(&self, _owner_id: OwnerId) -> bool {
        true
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BotError {
    #[error("Bot config invalid: {0}")]
    ConfigInvalid(String),

    #[error("Bot {0:?} not found")]
    NotFound(BotId),

    #[error("Owner {0:?} has no bot access")]
    NotEntitled(OwnerId),

    #[error("Bot {0:?} is stopped")]
    Terminal(BotId),
}
