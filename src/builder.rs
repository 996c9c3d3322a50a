//! Assignment and placement model shared by the board and sheet variants.
//!
//! Every piece picks a stock option through an integer variable; each
//! (piece, option) pair gets an indicator literal tied to that choice, and the
//! indicator gates containment on every axis. An option's usage flag is the
//! disjunction of its indicators. Sheets also add pairwise separation, so
//! pieces sharing an option lie apart along some axis.

use crate::config::SolverConfig;
use crate::model::{
    BinValues, Constraint, DecisionStrategy, LinearExpr, Model, ValueSelection, Var, VarSelection,
};
use crate::solver::{SearchOutcome, Solver};
use crate::types::{Money, StockOption};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

struct Pair {
    i: usize,
    j: usize,
    same: Var,
    /// Per axis: `i` ends before `j` starts.
    before: Vec<Var>,
    /// Per axis: `j` ends before `i` starts.
    after: Vec<Var>,
}

/// A piece as read back from (or written into) a complete assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PieceValues {
    pub option: usize,
    pub pos: Vec<i64>,
    pub size: Vec<i64>,
}

pub struct PackingModel {
    pub model: Model,
    pub assign: Vec<Var>,
    /// `indicator[piece][option]`.
    pub indicator: Vec<Vec<Var>>,
    pub usage: Vec<Var>,
    /// `pos[axis][piece]`.
    pub pos: Vec<Vec<Var>>,
    /// `size[axis][piece]`.
    pub size: Vec<Vec<Var>>,
    pairs: Vec<Pair>,
    kerf: i64,
}

impl PackingModel {
    /// Assignment, indicator and usage variables plus the cost objective.
    pub fn new(piece_count: usize, prices: &[Money], kerf: u32) -> Self {
        let mut model = Model::new();
        let option_count = prices.len();

        let assign: Vec<Var> = (0..piece_count)
            .map(|i| model.new_int_var(0, option_count as i64 - 1, format!("assign_{i}")))
            .collect();

        let mut indicator = Vec::with_capacity(piece_count);
        for (i, &a) in assign.iter().enumerate() {
            let row: Vec<Var> = (0..option_count)
                .map(|s| {
                    let b = model.new_bool_var(format!("assigned_{i}_{s}"));
                    model.add_equality_reified(LinearExpr::var(a), s as i64, b);
                    b
                })
                .collect();
            indicator.push(row);
        }

        let usage: Vec<Var> = (0..option_count)
            .map(|s| model.new_bool_var(format!("used_{s}")))
            .collect();
        for (s, &u) in usage.iter().enumerate() {
            let column = LinearExpr::sum(indicator.iter().map(|row: &Vec<Var>| row[s]));
            // Σ indicators ≤ N·used and used ≤ Σ indicators.
            model.add(Constraint::le(
                column.clone().term(u, -(piece_count as i64)),
                0,
            ));
            model.add(Constraint::ge(column.term(u, -1), 0));
        }

        model.minimize(LinearExpr::weighted_sum(
            usage.iter().copied().zip(prices.iter().map(|p| p.scaled())),
        ));

        Self {
            model,
            assign,
            indicator,
            usage,
            pos: Vec::new(),
            size: Vec::new(),
            pairs: Vec::new(),
            kerf: kerf as i64,
        }
    }

    pub fn piece_count(&self) -> usize {
        self.assign.len()
    }

    pub fn option_count(&self) -> usize {
        self.usage.len()
    }

    /// Adds one placement axis. `sizes` are the pieces' resolved extents along
    /// it, `capacities` the options' extents.
    pub fn add_axis(&mut self, name: &str, sizes: Vec<Var>, capacities: &[i64]) {
        let axis = self.pos.len();
        let max_capacity = capacities.iter().copied().max().unwrap_or(0);
        let pos: Vec<Var> = (0..self.piece_count())
            .map(|i| self.model.new_int_var(0, max_capacity, format!("{name}_{i}")))
            .collect();

        for i in 0..self.piece_count() {
            for (s, &cap) in capacities.iter().enumerate() {
                // pos + size + kerf ≤ capacity, only on the chosen option.
                self.model.add(
                    Constraint::le(
                        LinearExpr::sum([pos[i], sizes[i]]).plus(self.kerf),
                        cap,
                    )
                    .only_enforce_if(self.indicator[i][s]),
                );
            }
        }
        tracing::trace!(axis, name, "placement axis added");
        self.pos.push(pos);
        self.size.push(sizes);
    }

    /// Pairwise non-overlap on every axis added so far.
    pub fn add_separation(&mut self) {
        let n = self.piece_count();
        let axes = self.pos.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let same = self.model.new_bool_var(format!("same_{i}_{j}"));
                self.model.add_equality_reified(
                    LinearExpr::new()
                        .term(self.assign[i], 1)
                        .term(self.assign[j], -1),
                    0,
                    same,
                );

                let mut before = Vec::with_capacity(axes);
                let mut after = Vec::with_capacity(axes);
                for axis in 0..axes {
                    let b = self.model.new_bool_var(format!("before_{axis}_{i}_{j}"));
                    let a = self.model.new_bool_var(format!("after_{axis}_{i}_{j}"));
                    self.add_ordered(axis, i, j, b);
                    self.add_ordered(axis, j, i, a);
                    before.push(b);
                    after.push(a);
                }

                self.model.add(
                    Constraint::clause(before.iter().chain(&after).map(|v| v.lit()))
                        .only_enforce_if(same),
                );
                self.pairs.push(Pair {
                    i,
                    j,
                    same,
                    before,
                    after,
                });
            }
        }
    }

    /// `first` ends, plus kerf, before `second` starts, while `flag` holds.
    fn add_ordered(&mut self, axis: usize, first: usize, second: usize, flag: Var) {
        let pos = &self.pos[axis];
        let size = &self.size[axis];
        self.model.add(
            Constraint::le(
                LinearExpr::new()
                    .term(pos[first], 1)
                    .term(size[first], 1)
                    .term(pos[second], -1)
                    .plus(self.kerf),
                0,
            )
            .only_enforce_if(flag),
        );
    }

    /// `Σ demand·indicator ≤ capacity·used` per option.
    pub fn add_capacity(&mut self, demand: &[i64], capacities: &[i64]) {
        for (s, &cap) in capacities.iter().enumerate() {
            let load = LinearExpr::weighted_sum(
                self.indicator
                    .iter()
                    .zip(demand)
                    .map(|(row, &d)| (row[s], d)),
            );
            self.model
                .add(Constraint::le(load.term(self.usage[s], -cap), 0));
        }
    }

    /// Search phases: stock choice by piece order, then `extra` (rotations),
    /// then separation flags, then positions.
    pub fn add_search_phases(&mut self, order: &[usize], classes: Vec<usize>, extra: Vec<Var>) {
        let cost = self
            .model
            .objective()
            .map(|o| {
                let mut c = vec![0; self.option_count()];
                for &(v, coef) in o.terms() {
                    if let Some(s) = self.usage.iter().position(|&u| u == v) {
                        c[s] = coef;
                    }
                }
                c
            })
            .unwrap_or_default();

        self.model.add_decision_strategy(DecisionStrategy::new(
            order.iter().map(|&i| self.assign[i]).collect(),
            VarSelection::InOrder,
            ValueSelection::Bins(BinValues {
                usage: self.usage.clone(),
                class: classes,
                cost,
            }),
        ));
        if !extra.is_empty() {
            self.model.add_decision_strategy(DecisionStrategy::new(
                extra,
                VarSelection::InOrder,
                ValueSelection::MinValue,
            ));
        }
        let flags: Vec<Var> = self
            .pairs
            .iter()
            .flat_map(|p| p.before.iter().chain(&p.after).copied())
            .collect();
        self.model.add_decision_strategy(DecisionStrategy::new(
            flags,
            VarSelection::InOrder,
            ValueSelection::MinValue,
        ));
        let positions: Vec<Var> = order
            .iter()
            .flat_map(|&i| self.pos.iter().map(move |axis| axis[i]))
            .collect();
        self.model.add_decision_strategy(DecisionStrategy::new(
            positions,
            VarSelection::InOrder,
            ValueSelection::MinValue,
        ));
    }

    pub fn search(
        &self,
        config: SolverConfig,
        cancel: Option<Arc<AtomicBool>>,
        hint: Option<Vec<i64>>,
    ) -> SearchOutcome {
        tracing::debug!(
            pieces = self.piece_count(),
            options = self.option_count(),
            vars = self.model.num_vars(),
            constraints = self.model.num_constraints(),
            "packing model built"
        );
        let mut solver = Solver::new(&self.model, config);
        if let Some(flag) = cancel {
            solver = solver.with_cancel(flag);
        }
        if let Some(values) = hint {
            solver = solver.with_hint(values);
        }
        solver.solve()
    }

    pub fn read_piece(&self, values: &[i64], i: usize) -> PieceValues {
        PieceValues {
            option: values[self.assign[i].index()] as usize,
            pos: self.pos.iter().map(|axis| values[axis[i].index()]).collect(),
            size: self.size.iter().map(|axis| values[axis[i].index()]).collect(),
        }
    }

    /// Completes an assignment from per-piece placements. Variables the
    /// packing layer does not own keep their lower bound unless the caller
    /// sets them afterwards.
    pub fn complete_hint(&self, pieces: &[PieceValues]) -> Vec<i64> {
        let mut values: Vec<i64> = (0..self.model.num_vars())
            .map(|k| self.model.bounds(Var::from_index(k)).0)
            .collect();
        let mut set = |v: Var, x: i64| values[v.index()] = x;

        for (i, p) in pieces.iter().enumerate() {
            set(self.assign[i], p.option as i64);
            for (s, &b) in self.indicator[i].iter().enumerate() {
                set(b, (s == p.option) as i64);
            }
            for axis in 0..self.pos.len() {
                set(self.pos[axis][i], p.pos[axis]);
                set(self.size[axis][i], p.size[axis]);
            }
        }
        for (s, &u) in self.usage.iter().enumerate() {
            set(u, pieces.iter().any(|p| p.option == s) as i64);
        }
        for pair in &self.pairs {
            let (a, b) = (&pieces[pair.i], &pieces[pair.j]);
            set(pair.same, (a.option == b.option) as i64);
            for axis in 0..self.pos.len() {
                let ends_before = |x: &PieceValues, y: &PieceValues| {
                    x.pos[axis] + x.size[axis] + self.kerf <= y.pos[axis]
                };
                set(pair.before[axis], ends_before(a, b) as i64);
                set(pair.after[axis], ends_before(b, a) as i64);
            }
        }
        values
    }
}

/// Options with equal size and price get the same class.
pub fn symmetry_classes<D: PartialEq>(options: &[StockOption<D>]) -> Vec<usize> {
    let mut reps: Vec<usize> = Vec::new();
    let mut classes = Vec::with_capacity(options.len());
    for o in options {
        let found = reps.iter().position(|&r| {
            options[r].size == o.size && options[r].scaled_price() == o.scaled_price()
        });
        match found {
            Some(c) => classes.push(c),
            None => {
                classes.push(reps.len());
                reps.push(classes.len() - 1);
            }
        }
    }
    classes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::generate_options;
    use crate::types::{Rect, StockType};

    fn constant_sizes(m: &mut Model, sizes: &[i64]) -> Vec<Var> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &s)| m.new_constant(s, format!("len_{i}")))
            .collect()
    }

    #[test]
    fn test_symmetry_classes() {
        let options = generate_options(
            &[
                StockType::new("a", Rect::new(100, 100), 8.0, 2),
                StockType::new("b", Rect::new(100, 100), 9.0, 1),
            ],
            true,
        );
        let classes = symmetry_classes(&options);
        // a_1 and a_2 share classes variant by variant.
        assert_eq!(classes[0], classes[4]);
        assert_eq!(classes[1], classes[5]);
        assert_eq!(classes[3], classes[7]);
        assert_ne!(classes[1], classes[2]);
        assert_ne!(classes[0], classes[8]);
    }

    #[test]
    fn test_hint_round_trip_satisfies_model() {
        let prices = [Money::from_decimal(10.0), Money::from_decimal(10.0)];
        let mut pm = PackingModel::new(3, &prices, 2);
        let sizes = constant_sizes(&mut pm.model, &[40, 30, 50]);
        pm.add_axis("x", sizes, &[100, 100]);
        pm.add_separation();
        pm.add_capacity(&[42, 32, 52], &[102, 102]);

        let pieces = vec![
            PieceValues { option: 0, pos: vec![0], size: vec![40] },
            PieceValues { option: 0, pos: vec![42], size: vec![30] },
            PieceValues { option: 1, pos: vec![0], size: vec![50] },
        ];
        let values = pm.complete_hint(&pieces);
        assert!(pm.model.check(&values));
        assert_eq!(pm.model.objective_value(&values), 2000);
        assert_eq!(pm.read_piece(&values, 1), pieces[1]);
    }

    #[test]
    fn test_overlapping_hint_is_rejected() {
        let prices = [Money::from_decimal(10.0)];
        let mut pm = PackingModel::new(2, &prices, 0);
        let sizes = constant_sizes(&mut pm.model, &[40, 30]);
        pm.add_axis("x", sizes, &[100]);
        pm.add_separation();
        let pieces = vec![
            PieceValues { option: 0, pos: vec![0], size: vec![40] },
            PieceValues { option: 0, pos: vec![20], size: vec![30] },
        ];
        assert!(!pm.model.check(&pm.complete_hint(&pieces)));
    }
}
