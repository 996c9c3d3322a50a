//! Wall covering: each wall is covered end to end by boards of one type,
//! every board used whole except the last, whose remainder must not be
//! shorter than the minimum usable piece.

use crate::config::SolverConfig;
use crate::error::{PlanError, Result, validate_stock_record};
use crate::model::{
    Constraint, DecisionStrategy, LinearExpr, Model, ValueSelection, Var, VarSelection,
};
use crate::solver::{SearchStats, SolveStatus, Solver};
use crate::types::{Money, deserialize_u32_from_number};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallBoard {
    pub id: String,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub length: u32,
    pub price: f64,
}

impl WallBoard {
    pub fn new(id: impl Into<String>, length: u32, price: f64) -> Self {
        Self {
            id: id.into(),
            length,
            price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallProblem {
    pub walls: Vec<u32>,
    pub boards: Vec<WallBoard>,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub min_piece_length: u32,
}

impl WallProblem {
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for b in &self.boards {
            validate_stock_record(&b.id, b.price, 1, b.length == 0)?;
            if !ids.insert(b.id.as_str()) {
                return Err(PlanError::stock(&b.id, "duplicate id"));
            }
        }
        if let Some(index) = self.walls.iter().position(|&w| w == 0) {
            return Err(PlanError::InvalidWall {
                index,
                reason: "length must be non-zero".to_string(),
            });
        }
        if self.min_piece_length == 0 {
            return Err(PlanError::InvalidParameter {
                name: "min_piece_length",
                reason: "must be at least 1".to_string(),
            });
        }
        let max_price = self
            .boards
            .iter()
            .map(|b| Money::from_decimal(b.price).scaled() as i128)
            .max()
            .unwrap_or(0);
        let worst: i128 = self
            .walls
            .iter()
            .map(|&w| max_boards(w, self.min_piece_length) as i128 * max_price)
            .sum();
        if worst > i64::MAX as i128 {
            return Err(PlanError::InvalidParameter {
                name: "walls",
                reason: "total cost bound does not fit the price range".to_string(),
            });
        }
        Ok(())
    }
}

/// Upper bound on boards per wall: every board but the last covers at least
/// `min_piece` of it.
fn max_boards(wall: u32, min_piece: u32) -> i64 {
    wall as i64 / min_piece as i64 + 1
}

/// One board laid along a wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WallSegment {
    /// 1-based position of the board along the wall.
    pub board: u32,
    pub start: u32,
    pub length: u32,
    /// Whole board, as opposed to the cut-down last one.
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallCover {
    pub wall: usize,
    pub wall_length: u32,
    pub board_type: usize,
    pub board_id: String,
    pub board_length: u32,
    pub board_count: u32,
    /// Length used from the last board.
    pub remainder: u32,
    pub cost: Money,
}

impl WallCover {
    pub fn full_boards(&self) -> u32 {
        self.board_count - 1
    }

    /// Offcut left from the last board.
    pub fn offcut(&self) -> u32 {
        self.board_length - self.remainder
    }

    pub fn segments(&self) -> Vec<WallSegment> {
        let full = (0..self.full_boards()).map(|k| WallSegment {
            board: k + 1,
            start: k * self.board_length,
            length: self.board_length,
            full: true,
        });
        full.chain(std::iter::once(WallSegment {
            board: self.board_count,
            start: self.full_boards() * self.board_length,
            length: self.remainder,
            full: false,
        }))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallPlan {
    pub status: SolveStatus,
    /// One cover per wall, empty without a solution.
    pub walls: Vec<WallCover>,
    pub total_cost: Option<Money>,
    pub stats: SearchStats,
}

struct WallVars {
    board_type: Var,
    count: Var,
    remainder: Var,
    cost: Var,
}

struct WallModel {
    model: Model,
    walls: Vec<WallVars>,
}

impl WallModel {
    fn build(problem: &WallProblem) -> Self {
        let mut m = Model::new();
        let lengths: Vec<i64> = problem.boards.iter().map(|b| b.length as i64).collect();
        let prices: Vec<i64> = problem
            .boards
            .iter()
            .map(|b| Money::from_decimal(b.price).scaled())
            .collect();
        let max_length = lengths.iter().copied().max().unwrap_or(0);
        let max_price = prices.iter().copied().max().unwrap_or(0);
        let min_piece = problem.min_piece_length as i64;

        let mut walls = Vec::with_capacity(problem.walls.len());
        let mut deltas = Vec::with_capacity(problem.walls.len());
        for (j, &wall) in problem.walls.iter().enumerate() {
            let max_n = max_boards(wall, problem.min_piece_length);
            let wall = wall as i64;

            let t = m.new_int_var(0, lengths.len() as i64 - 1, format!("type_{j}"));
            let n = m.new_int_var(1, max_n, format!("count_{j}"));
            let delta = m.new_int_var(0, max_n - 1, format!("delta_{j}"));
            m.add(Constraint::eq(LinearExpr::new().term(n, 1).term(delta, -1), 1));

            let r = m.new_int_var(min_piece, max_length, format!("remainder_{j}"));
            let length = m.new_int_var(0, max_length, format!("board_length_{j}"));
            let price = m.new_int_var(0, max_price, format!("board_price_{j}"));
            m.add(Constraint::element(t, lengths.clone(), length));
            m.add(Constraint::element(t, prices.clone(), price));
            m.add(Constraint::le(LinearExpr::new().term(r, 1).term(length, -1), 0));

            // (n − 1)·length + r = wall
            let z = m.new_int_var(0, wall, format!("full_{j}"));
            m.add(Constraint::product(z, delta, length));
            m.add(Constraint::eq(LinearExpr::sum([z, r]), wall));

            let cost = m.new_int_var(0, max_n.saturating_mul(max_price), format!("cost_{j}"));
            m.add(Constraint::product(cost, n, price));

            deltas.push(delta);
            walls.push(WallVars {
                board_type: t,
                count: n,
                remainder: r,
                cost,
            });
        }

        m.minimize(LinearExpr::sum(walls.iter().map(|w| w.cost)));
        m.add_decision_strategy(DecisionStrategy::new(
            walls.iter().map(|w| w.board_type).collect(),
            VarSelection::InOrder,
            ValueSelection::MinValue,
        ));
        m.add_decision_strategy(DecisionStrategy::new(
            deltas,
            VarSelection::InOrder,
            ValueSelection::MinValue,
        ));

        Self { model: m, walls }
    }
}

/// Picks a board type and count per wall at minimum total price.
pub fn solve(problem: &WallProblem, config: &SolverConfig) -> Result<WallPlan> {
    run(problem, config, None)
}

/// Like [`solve`], returning early once `cancel` is set.
pub fn solve_cancellable(
    problem: &WallProblem,
    config: &SolverConfig,
    cancel: Arc<AtomicBool>,
) -> Result<WallPlan> {
    run(problem, config, Some(cancel))
}

fn run(
    problem: &WallProblem,
    config: &SolverConfig,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<WallPlan> {
    problem.validate()?;
    let built = WallModel::build(problem);
    let mut solver = Solver::new(&built.model, *config);
    if let Some(flag) = cancel {
        solver = solver.with_cancel(flag);
    }
    let outcome = solver.solve();

    tracing::info!(
        walls = problem.walls.len(),
        board_types = problem.boards.len(),
        status = %outcome.status,
        objective = ?outcome.objective,
        nodes = outcome.stats.nodes,
        "walls solved"
    );

    let Some(values) = outcome.values.as_deref() else {
        return Ok(WallPlan {
            status: outcome.status,
            walls: Vec::new(),
            total_cost: None,
            stats: outcome.stats,
        });
    };

    let mut covers = Vec::with_capacity(built.walls.len());
    for (j, vars) in built.walls.iter().enumerate() {
        let t = values[vars.board_type.index()] as usize;
        let board = problem.boards.get(t).ok_or_else(|| {
            PlanError::Inconsistent(format!("wall {j} covered by unknown board type {t}"))
        })?;
        let cover = WallCover {
            wall: j,
            wall_length: problem.walls[j],
            board_type: t,
            board_id: board.id.clone(),
            board_length: board.length,
            board_count: values[vars.count.index()] as u32,
            remainder: values[vars.remainder.index()] as u32,
            cost: Money::from_scaled(values[vars.cost.index()]),
        };
        let covered =
            cover.full_boards() as u64 * cover.board_length as u64 + cover.remainder as u64;
        if covered != cover.wall_length as u64 {
            return Err(PlanError::Inconsistent(format!(
                "wall {j} of {} covered to {covered}",
                cover.wall_length
            )));
        }
        covers.push(cover);
    }

    Ok(WallPlan {
        status: outcome.status,
        total_cost: Some(covers.iter().map(|c| c.cost).sum()),
        walls: covers,
        stats: outcome.stats,
    })
}
