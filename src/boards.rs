//! Linear cutting: pieces of a given length cut from priced boards.

use crate::builder::{PackingModel, PieceValues, symmetry_classes};
use crate::config::SolverConfig;
use crate::error::{PlanError, Result, validate_stock_record, validate_total_price};
use crate::extract::{Placed, Plan, group_placements};
use crate::options::generate_options;
use crate::types::{StockOption, StockType, deserialize_u32_from_number};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn default_count() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardStock {
    pub id: String,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub length: u32,
    pub price: f64,
    #[serde(
        default = "default_count",
        deserialize_with = "deserialize_u32_from_number"
    )]
    pub count: u32,
}

impl BoardStock {
    pub fn new(id: impl Into<String>, length: u32, price: f64, count: u32) -> Self {
        Self {
            id: id.into(),
            length,
            price,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardProblem {
    pub stock: Vec<BoardStock>,
    pub pieces: Vec<u32>,
    #[serde(default, deserialize_with = "deserialize_u32_from_number")]
    pub kerf: u32,
}

impl BoardProblem {
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for s in &self.stock {
            validate_stock_record(&s.id, s.price, s.count, s.length == 0)?;
            if !ids.insert(s.id.as_str()) {
                return Err(PlanError::stock(&s.id, "duplicate id"));
            }
        }
        if let Some(index) = self.pieces.iter().position(|&len| len == 0) {
            return Err(PlanError::piece(index, "length must be non-zero"));
        }
        Ok(())
    }

    pub fn stock_types(&self) -> Vec<StockType<u32>> {
        self.stock
            .iter()
            .map(|s| StockType::new(s.id.clone(), s.length, s.price, s.count))
            .collect()
    }
}

/// One piece laid out along a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardPlacement {
    pub piece: usize,
    pub stock_option: usize,
    pub offset: u32,
    pub length: u32,
}

impl Placed for BoardPlacement {
    fn piece(&self) -> usize {
        self.piece
    }

    fn stock_option(&self) -> usize {
        self.stock_option
    }

    fn footprint(&self) -> u64 {
        self.length as u64
    }
}

pub type BoardPlan = Plan<u32, BoardPlacement>;

struct BoardModel {
    packing: PackingModel,
    order: Vec<usize>,
}

impl BoardModel {
    fn build(pieces: &[u32], options: &[StockOption<u32>], kerf: u32) -> Self {
        let prices: Vec<_> = options.iter().map(StockOption::scaled_price).collect();
        let mut packing = PackingModel::new(pieces.len(), &prices, kerf);

        let sizes = pieces
            .iter()
            .enumerate()
            .map(|(i, &len)| packing.model.new_constant(len as i64, format!("length_{i}")))
            .collect();
        let capacities: Vec<i64> = options.iter().map(|o| o.size as i64).collect();
        packing.add_axis("offset", sizes, &capacities);

        // Σ (length + kerf) ≤ board + kerf: the pieces plus the cuts between them.
        let k = kerf as i64;
        let demand: Vec<i64> = pieces.iter().map(|&len| len as i64 + k).collect();
        let padded: Vec<i64> = capacities.iter().map(|&c| c + k).collect();
        packing.add_capacity(&demand, &padded);

        let mut order: Vec<usize> = (0..pieces.len()).collect();
        order.sort_by_key(|&i| Reverse(pieces[i]));
        packing.add_search_phases(&order, symmetry_classes(options), Vec::new());

        Self { packing, order }
    }

    /// First-fit decreasing: each piece goes on the first open board with
    /// room, otherwise on the cheapest unopened board that can hold it.
    fn first_fit(
        &self,
        pieces: &[u32],
        options: &[StockOption<u32>],
        kerf: u32,
    ) -> Option<Vec<i64>> {
        let kerf = kerf as u64;
        let mut load: Vec<Option<u64>> = vec![None; options.len()];
        let mut by_price: Vec<usize> = (0..options.len()).collect();
        by_price.sort_by_key(|&s| (options[s].scaled_price(), Reverse(options[s].size)));

        let mut placed: Vec<Option<PieceValues>> = vec![None; pieces.len()];
        for &i in &self.order {
            let len = pieces[i] as u64;
            let fits = |s: usize| {
                let board = options[s].size as u64;
                len + kerf <= board && load[s].is_none_or(|used| used + kerf + len <= board)
            };
            let s = (0..options.len())
                .find(|&s| load[s].is_some() && fits(s))
                .or_else(|| {
                    by_price
                        .iter()
                        .copied()
                        .find(|&s| load[s].is_none() && fits(s))
                })?;
            load[s] = Some(load[s].map_or(len, |used| used + kerf + len));
            placed[i] = Some(PieceValues {
                option: s,
                pos: vec![0],
                size: vec![pieces[i] as i64],
            });
        }
        let placed: Vec<PieceValues> = placed.into_iter().collect::<Option<_>>()?;
        Some(self.packing.complete_hint(&placed))
    }
}

/// Lays the pieces of each board end to end, longest first, with one kerf
/// between neighbours.
fn cut_offsets(order: &[usize], pieces: &[u32], options: &[usize], kerf: u32) -> Vec<u32> {
    let mut cursor: HashMap<usize, u64> = HashMap::new();
    let mut offsets = vec![0; pieces.len()];
    for &i in order {
        let at = cursor.entry(options[i]).or_insert(0);
        offsets[i] = *at as u32;
        *at += pieces[i] as u64 + kerf as u64;
    }
    offsets
}

/// Finds the cheapest set of boards that holds every piece.
pub fn solve(problem: &BoardProblem, config: &SolverConfig) -> Result<BoardPlan> {
    run(problem, config, None)
}

/// Like [`solve`], returning early once `cancel` is set.
pub fn solve_cancellable(
    problem: &BoardProblem,
    config: &SolverConfig,
    cancel: Arc<AtomicBool>,
) -> Result<BoardPlan> {
    run(problem, config, Some(cancel))
}

fn run(
    problem: &BoardProblem,
    config: &SolverConfig,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<BoardPlan> {
    problem.validate()?;
    let options = generate_options(&problem.stock_types(), false);
    validate_total_price(&options)?;
    let board = BoardModel::build(&problem.pieces, &options, problem.kerf);
    let hint = board.first_fit(&problem.pieces, &options, problem.kerf);
    let outcome = board.packing.search(*config, cancel, hint);

    tracing::info!(
        pieces = problem.pieces.len(),
        options = options.len(),
        status = %outcome.status,
        objective = ?outcome.objective,
        nodes = outcome.stats.nodes,
        "boards solved"
    );

    let Some(values) = outcome.values.as_deref() else {
        return Ok(Plan::without_layout(outcome.status, outcome.stats));
    };
    let packing = &board.packing;
    let chosen: Vec<usize> = (0..problem.pieces.len())
        .map(|i| packing.read_piece(values, i).option)
        .collect();
    let offsets = cut_offsets(&board.order, &problem.pieces, &chosen, problem.kerf);
    let placements = (0..problem.pieces.len())
        .map(|i| BoardPlacement {
            piece: i,
            stock_option: chosen[i],
            offset: offsets[i],
            length: problem.pieces[i],
        })
        .collect();
    let layout = group_placements(problem.pieces.len(), &options, placements, |s| {
        values[packing.usage[s].index()] == 1
    })?;

    Ok(Plan {
        status: outcome.status,
        layout: Some(layout),
        stats: outcome.stats,
    })
}
