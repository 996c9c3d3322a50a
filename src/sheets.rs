//! Rectangular cutting: pieces placed on priced sheets, optionally rotated,
//! optionally on pre-split half and quarter sheets.

use crate::builder::{PackingModel, PieceValues, symmetry_classes};
use crate::config::SolverConfig;
use crate::error::{PlanError, Result, validate_stock_record, validate_total_price};
use crate::extract::{Placed, Plan, group_placements};
use crate::guillotine::best_greedy_layout;
use crate::model::{Constraint, LinearExpr, Var};
use crate::options::generate_options;
use crate::types::{Rect, StockOption, StockType, deserialize_u32_from_number};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn default_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetStock {
    pub id: String,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub width: u32,
    #[serde(deserialize_with = "deserialize_u32_from_number")]
    pub height: u32,
    pub price: f64,
    #[serde(
        default = "default_count",
        deserialize_with = "deserialize_u32_from_number"
    )]
    pub count: u32,
}

impl SheetStock {
    pub fn new(id: impl Into<String>, width: u32, height: u32, price: f64, count: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            price,
            count,
        }
    }

    pub fn size(&self) -> Rect {
        Rect::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetProblem {
    pub stock: Vec<SheetStock>,
    pub pieces: Vec<Rect>,
    #[serde(default, deserialize_with = "deserialize_u32_from_number")]
    pub kerf: u32,
    #[serde(default = "default_true")]
    pub allow_rotate: bool,
    #[serde(default)]
    pub allow_sub_variants: bool,
    /// Accepted for compatibility; cut ordering is not constrained.
    #[serde(default)]
    pub guillotine: bool,
}

impl SheetProblem {
    pub fn new(stock: Vec<SheetStock>, pieces: Vec<Rect>) -> Self {
        Self {
            stock,
            pieces,
            kerf: 0,
            allow_rotate: true,
            allow_sub_variants: false,
            guillotine: false,
        }
    }

    pub fn with_kerf(mut self, kerf: u32) -> Self {
        self.kerf = kerf;
        self
    }

    pub fn with_rotation(mut self, allow: bool) -> Self {
        self.allow_rotate = allow;
        self
    }

    pub fn with_sub_variants(mut self, allow: bool) -> Self {
        self.allow_sub_variants = allow;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for s in &self.stock {
            validate_stock_record(&s.id, s.price, s.count, s.width == 0 || s.height == 0)?;
            if !ids.insert(s.id.as_str()) {
                return Err(PlanError::stock(&s.id, "duplicate id"));
            }
        }
        if let Some(index) = self.pieces.iter().position(|p| p.w == 0 || p.h == 0) {
            return Err(PlanError::piece(index, "width and height must be non-zero"));
        }
        Ok(())
    }

    pub fn stock_types(&self) -> Vec<StockType<Rect>> {
        self.stock
            .iter()
            .map(|s| StockType::new(s.id.clone(), s.size(), s.price, s.count))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SheetPlacement {
    pub piece: usize,
    pub stock_option: usize,
    pub x: u32,
    pub y: u32,
    pub rotated: bool,
    pub width: u32,
    pub height: u32,
}

impl SheetPlacement {
    pub fn size(&self) -> Rect {
        Rect::new(self.width, self.height)
    }
}

impl Placed for SheetPlacement {
    fn piece(&self) -> usize {
        self.piece
    }

    fn stock_option(&self) -> usize {
        self.stock_option
    }

    fn footprint(&self) -> u64 {
        self.size().area()
    }
}

pub type SheetPlan = Plan<Rect, SheetPlacement>;

struct SheetModel {
    packing: PackingModel,
    rotation: Vec<Var>,
}

impl SheetModel {
    fn build(problem: &SheetProblem, options: &[StockOption<Rect>]) -> Self {
        let pieces = &problem.pieces;
        let prices: Vec<_> = options.iter().map(StockOption::scaled_price).collect();
        let mut packing = PackingModel::new(pieces.len(), &prices, problem.kerf);
        let m = &mut packing.model;

        let mut rotation = Vec::with_capacity(pieces.len());
        let mut widths = Vec::with_capacity(pieces.len());
        let mut heights = Vec::with_capacity(pieces.len());
        for (i, p) in pieces.iter().enumerate() {
            let (w, h) = (p.w as i64, p.h as i64);
            if problem.allow_rotate && w != h {
                let r = m.new_bool_var(format!("rotated_{i}"));
                let rw = m.new_int_var(w.min(h), w.max(h), format!("width_{i}"));
                let rh = m.new_int_var(w.min(h), w.max(h), format!("height_{i}"));
                m.add(Constraint::eq(LinearExpr::var(rw), w).only_enforce_if(r.not()));
                m.add(Constraint::eq(LinearExpr::var(rh), h).only_enforce_if(r.not()));
                m.add(Constraint::eq(LinearExpr::var(rw), h).only_enforce_if(r));
                m.add(Constraint::eq(LinearExpr::var(rh), w).only_enforce_if(r));
                rotation.push(r);
                widths.push(rw);
                heights.push(rh);
            } else {
                rotation.push(m.new_constant(0, format!("rotated_{i}")));
                widths.push(m.new_constant(w, format!("width_{i}")));
                heights.push(m.new_constant(h, format!("height_{i}")));
            }
        }

        let option_w: Vec<i64> = options.iter().map(|o| o.size.w as i64).collect();
        let option_h: Vec<i64> = options.iter().map(|o| o.size.h as i64).collect();
        packing.add_axis("x", widths, &option_w);
        packing.add_axis("y", heights, &option_h);
        packing.add_separation();

        let demand: Vec<i64> = pieces.iter().map(|p| p.area() as i64).collect();
        let areas: Vec<i64> = options.iter().map(|o| o.size.area() as i64).collect();
        packing.add_capacity(&demand, &areas);

        let mut order: Vec<usize> = (0..pieces.len()).collect();
        order.sort_by_key(|&i| Reverse(pieces[i].area()));
        packing.add_search_phases(&order, symmetry_classes(options), rotation.clone());

        Self { packing, rotation }
    }

    /// A guillotine-cuttable starting layout, if the greedy packer finds one.
    fn greedy_hint(
        &self,
        problem: &SheetProblem,
        options: &[StockOption<Rect>],
    ) -> Option<Vec<i64>> {
        let layout = best_greedy_layout(
            &problem.pieces,
            options,
            problem.kerf,
            problem.allow_rotate,
        )?;
        let pieces: Vec<PieceValues> = layout
            .iter()
            .map(|g| PieceValues {
                option: g.option,
                pos: vec![g.x as i64, g.y as i64],
                size: vec![g.size.w as i64, g.size.h as i64],
            })
            .collect();
        let mut values = self.packing.complete_hint(&pieces);
        for (r, g) in self.rotation.iter().zip(&layout) {
            values[r.index()] = g.rotated as i64;
        }
        Some(values)
    }
}

/// Finds the cheapest set of sheets (or pre-split sheet parts) holding every piece.
pub fn solve(problem: &SheetProblem, config: &SolverConfig) -> Result<SheetPlan> {
    run(problem, config, None)
}

/// Like [`solve`], returning early once `cancel` is set.
pub fn solve_cancellable(
    problem: &SheetProblem,
    config: &SolverConfig,
    cancel: Arc<AtomicBool>,
) -> Result<SheetPlan> {
    run(problem, config, Some(cancel))
}

fn run(
    problem: &SheetProblem,
    config: &SolverConfig,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<SheetPlan> {
    problem.validate()?;
    if problem.guillotine {
        tracing::warn!(
            "guillotine cut ordering is not enforced; layouts may need non-guillotine cuts"
        );
    }

    let options = generate_options(&problem.stock_types(), problem.allow_sub_variants);
    validate_total_price(&options)?;
    let sheet = SheetModel::build(problem, &options);
    let hint = sheet.greedy_hint(problem, &options);
    let outcome = sheet.packing.search(*config, cancel, hint);

    tracing::info!(
        pieces = problem.pieces.len(),
        options = options.len(),
        status = %outcome.status,
        objective = ?outcome.objective,
        nodes = outcome.stats.nodes,
        "sheets solved"
    );

    let Some(values) = outcome.values.as_deref() else {
        return Ok(Plan::without_layout(outcome.status, outcome.stats));
    };
    let packing = &sheet.packing;
    let placements = (0..problem.pieces.len())
        .map(|i| {
            let p = packing.read_piece(values, i);
            SheetPlacement {
                piece: i,
                stock_option: p.option,
                x: p.pos[0] as u32,
                y: p.pos[1] as u32,
                rotated: values[sheet.rotation[i].index()] == 1,
                width: p.size[0] as u32,
                height: p.size[1] as u32,
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolveStatus;
    use crate::types::{Money, VariantKind};

    fn assert_valid(problem: &SheetProblem, plan: &SheetPlan) {
        let k = problem.kerf;
        for group in plan.groups() {
            for p in &group.placements {
                assert!(p.x + p.width + k <= group.size.w, "{p:?} overflows {}", group.option_id);
                assert!(p.y + p.height + k <= group.size.h, "{p:?} overflows {}", group.option_id);
                let raw = problem.pieces[p.piece];
                let expected = if p.rotated { raw.rotated() } else { raw };
                assert_eq!(p.size(), expected);
            }
            for (n, a) in group.placements.iter().enumerate() {
                for b in &group.placements[n + 1..] {
                    let apart = a.x + a.width + k <= b.x
                        || b.x + b.width + k <= a.x
                        || a.y + a.height + k <= b.y
                        || b.y + b.height + k <= a.y;
                    assert!(apart, "{a:?} overlaps {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_two_pieces_share_one_sheet() {
        let p = SheetProblem::new(
            vec![SheetStock::new("board", 1000, 1000, 100.0, 1)],
            vec![Rect::new(600, 400), Rect::new(400, 600)],
        );
        let plan = solve(&p, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Optimal);
        assert_eq!(plan.total_cost(), Some(Money::from_decimal(100.0)));
        assert_eq!(plan.groups().len(), 1);
        assert_valid(&p, &plan);
    }

    #[test]
    fn test_full_sheet_piece_makes_pool_infeasible() {
        let p = SheetProblem::new(
            vec![SheetStock::new("board", 1000, 1000, 100.0, 1)],
            vec![Rect::new(600, 400), Rect::new(400, 600), Rect::new(1000, 1000)],
        );
        let plan = solve(&p, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Infeasible);
        assert!(plan.groups().is_empty());
    }

    #[test]
    fn test_quarter_variant_is_cheapest() {
        let p = SheetProblem::new(
            vec![SheetStock::new("mdf", 800, 400, 40.0, 1)],
            vec![Rect::new(400, 200)],
        )
        .with_sub_variants(true);
        let plan = solve(&p, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Optimal);
        assert_eq!(plan.total_cost(), Some(Money::from_scaled(1000)));
        let group = &plan.groups()[0];
        assert_eq!(group.variant, VariantKind::Quarter);
        assert_eq!(group.size, Rect::new(400, 200));
        assert_eq!(group.option_id, "mdf_quarter_1");
    }

    #[test]
    fn test_rotation_is_required_to_fit() {
        let stock = vec![SheetStock::new("strip", 100, 50, 5.0, 1)];
        let p = SheetProblem::new(stock, vec![Rect::new(50, 100)]);
        let plan = solve(&p, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Optimal);
        let placement = plan.groups()[0].placements[0];
        assert!(placement.rotated);
        assert_eq!(placement.size(), Rect::new(100, 50));
        assert_valid(&p, &plan);

        let fixed = p.with_rotation(false);
        let plan = solve(&fixed, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Infeasible);
    }

    #[test]
    fn test_kerf_never_lowers_cost() {
        let stock = vec![SheetStock::new("board", 100, 100, 10.0, 2)];
        let pieces = vec![Rect::new(50, 90), Rect::new(50, 90)];
        let loose = SheetProblem::new(stock.clone(), pieces.clone());
        let tight = SheetProblem::new(stock, pieces).with_kerf(1);

        let a = solve(&loose, &SolverConfig::default()).unwrap();
        let b = solve(&tight, &SolverConfig::default()).unwrap();
        assert_eq!(a.total_cost(), Some(Money::from_scaled(1000)));
        assert_eq!(b.total_cost(), Some(Money::from_scaled(2000)));
        assert_valid(&tight, &b);
    }

    #[test]
    fn test_guillotine_flag_is_accepted() {
        let mut p = SheetProblem::new(
            vec![SheetStock::new("board", 1000, 1000, 100.0, 1)],
            vec![Rect::new(500, 500)],
        );
        p.guillotine = true;
        let plan = solve(&p, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Optimal);
    }

    #[test]
    fn test_prefers_used_sheet_over_new() {
        let p = SheetProblem::new(
            vec![SheetStock::new("board", 1000, 1000, 100.0, 3)],
            vec![
                Rect::new(500, 500),
                Rect::new(500, 500),
                Rect::new(500, 500),
                Rect::new(500, 500),
            ],
        );
        let plan = solve(&p, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Optimal);
        assert_eq!(plan.groups().len(), 1);
        assert_valid(&p, &plan);
    }

    #[test]
    fn test_cancelled_search_keeps_greedy_layout() {
        let p = SheetProblem::new(
            vec![SheetStock::new("board", 1000, 1000, 100.0, 3)],
            vec![Rect::new(600, 600); 3],
        );
        let config = SolverConfig {
            check_interval: 1,
            ..SolverConfig::default()
        };
        let plan = solve_cancellable(&p, &config, Arc::new(AtomicBool::new(true))).unwrap();
        assert_eq!(plan.status, SolveStatus::Feasible);
        assert_eq!(plan.groups().len(), 3);
        assert_eq!(plan.total_cost(), Some(Money::from_decimal(300.0)));
        assert_valid(&p, &plan);
    }

    #[test]
    fn test_rejects_degenerate_piece() {
        let p = SheetProblem::new(
            vec![SheetStock::new("board", 1000, 1000, 100.0, 1)],
            vec![Rect::new(10, 0)],
        );
        assert!(matches!(
            solve(&p, &SolverConfig::default()),
            Err(PlanError::InvalidPiece { index: 0, .. })
        ));
    }

    #[test]
    fn test_problem_from_json_defaults() {
        let p: SheetProblem = serde_json::from_str(
            r#"{
                "stock": [{"id": "mdf", "width": 800, "height": 400, "price": 40}],
                "pieces": [{"width": 400, "height": 200}]
            }"#,
        )
        .unwrap();
        assert!(p.allow_rotate);
        assert!(!p.allow_sub_variants);
        assert_eq!(p.stock[0].count, 1);
    }
}
