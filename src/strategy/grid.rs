//! Grid bot: N+1 price levels across [lower, upper], each adjacent pair a
//! cell funded with investment/N. Buys fill when price reaches a cell's
//! lower level, sells when it reaches the level above, booking
//! (upper level - lower level) * cell quantity per completed cycle.
//!
//! Outside the range the grid holds still and only accumulates float PnL.

use crate::types::{Price, Qty, Quote};
use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridSpacing {
    // equal price steps
    Arithmetic,
    // equal percentage steps
    Geometric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridMode {
    Neutral,
    Long,
    Short,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub lower: Price,
    pub upper: Price,
    pub grid_count: usize,
    pub spacing: GridSpacing,
    pub investment: Quote,
    pub mode: GridMode,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.lower.value() >= self.upper.value() {
            return Err("lower bound must be below upper bound".into());
        }
        if self.grid_count < 2 {
            return Err("grid needs at least 2 cells".into());
        }
        if self.investment.value() <= Decimal::ZERO {
            return Err("investment must be positive".into());
        }
        Ok(())
    }
}

/// One cell between levels i and i+1. Quantity is fixed at setup:
/// (investment / N) / lower level price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridCell {
    pub buy_filled: bool,
    pub quantity: Qty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridState {
    pub levels: Vec<Price>,
    pub cells: Vec<GridCell>,
    pub cycles_completed: u64,
    pub grid_profit: Quote,
}

/// Builds the level ladder and empty cells.
/// Arithmetic: level i = lower + i * (upper - lower) / N.
/// Geometric: level i = lower * (upper/lower)^(i/N).
pub fn grid_setup(config: &GridConfig) -> Result<GridState, String> {
    config.validate()?;

    let n = config.grid_count;
    let lower = config.lower.value();
    let upper = config.upper.value();

    let mut levels = Vec::with_capacity(n + 1);
    match config.spacing {
        GridSpacing::Arithmetic => {
            let step = (upper - lower) / Decimal::from(n as u64);
            for i in 0..=n {
                levels.push(Price::new_unchecked(lower + step * Decimal::from(i as u64)));
            }
        }
        GridSpacing::Geometric => {
            let ratio = upper / lower;
            for i in 0..=n {
                let exp = Decimal::from(i as u64) / Decimal::from(n as u64);
                levels.push(Price::new_unchecked(lower * ratio.powd(exp)));
            }
        }
    }

    let cell_amount = config.investment.value() / Decimal::from(n as u64);
    let cells = levels[..n]
        .iter()
        .map(|level| GridCell {
            buy_filled: false,
            quantity: Qty::new_unchecked(cell_amount / level.value()),
        })
        .collect();

    Ok(GridState {
        levels,
        cells,
        cycles_completed: 0,
        grid_profit: Quote::zero(),
    })
}

impl GridState {
    /// Unrealized PnL of the inventory currently held by filled buy legs.
    pub fn float_pnl(&self, price: Price) -> Quote {
        self.cells
            .iter()
            .zip(&self.levels)
            .filter(|(cell, _)| cell.buy_filled)
            .map(|(cell, level)| {
                Quote::new((price.value() - level.value()) * cell.quantity.value())
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridAction {
    FillBuy {
        cell: usize,
        price: Price,
        quantity: Qty,
    },
    FillSell {
        cell: usize,
        price: Price,
        quantity: Qty,
        profit: Quote,
    },
}

/// One strategy tick. Sells of held cells are emitted before new buys so a
/// swing through several levels settles cycles before opening inventory.
pub fn grid_tick(state: &GridState, price: Price) -> Vec<GridAction> {
    let p = price.value();
    let lower = state.levels[0].value();
    let upper = state.levels[state.levels.len() - 1].value();

    // outside the range the grid does nothing until price re-enters
    if p < lower || p > upper {
        return Vec::new();
    }

    let mut actions = Vec::new();

    for (i, cell) in state.cells.iter().enumerate() {
        if cell.buy_filled {
            let sell_level = state.levels[i + 1];
            if p >= sell_level.value() {
                let profit = Quote::new(
                    (sell_level.value() - state.levels[i].value()) * cell.quantity.value(),
                );
                actions.push(GridAction::FillSell {
                    cell: i,
                    price: sell_level,
                    quantity: cell.quantity,
                    profit,
                });
            }
        }
    }

    for (i, cell) in state.cells.iter().enumerate() {
        if !cell.buy_filled && p <= state.levels[i].value() {
            actions.push(GridAction::FillBuy {
                cell: i,
                price: state.levels[i],
                quantity: cell.quantity,
            });
        }
    }

    actions
}
