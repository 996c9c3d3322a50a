use crate::config::SolverConfig;
use crate::model::{BinValues, Model, ValueSelection, Var, VarSelection};
use crate::propagate::{Domains, Propagation, Propagator};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// No cheaper assignment exists.
    Optimal,
    /// A solution was found but the search stopped before proving it minimal.
    Feasible,
    /// No assignment satisfies the model.
    Infeasible,
    /// The search stopped before finding any solution.
    Unknown,
}

impl SolveStatus {
    pub fn has_solution(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

impl std::fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SolveStatus::Optimal => "optimal",
            SolveStatus::Feasible => "feasible",
            SolveStatus::Infeasible => "infeasible",
            SolveStatus::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub nodes: u64,
    pub backtracks: u64,
    pub solutions: u64,
    pub propagations: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub status: SolveStatus,
    pub values: Option<Vec<i64>>,
    pub objective: Option<i64>,
    pub stats: SearchStats,
}

impl SearchOutcome {
    pub fn value(&self, v: Var) -> Option<i64> {
        self.values.as_ref().map(|vals| vals[v.index()])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Fix(Var, i64),
    AtLeast(Var, i64),
    AtMost(Var, i64),
}

impl Decision {
    fn apply(self, d: &mut Domains) -> Propagation {
        match self {
            Decision::Fix(v, x) => d.fix(v, x),
            Decision::AtLeast(v, x) => d.set_lo(v, x),
            Decision::AtMost(v, x) => d.set_hi(v, x),
        }
    }
}

struct Node {
    mark: usize,
    alternatives: Vec<Decision>,
    next: usize,
}

/// Depth-first branch-and-bound over a [`Model`].
///
/// Every node is propagated to a fixpoint; each improving solution tightens
/// the objective bound so the rest of the tree must beat it strictly.
pub struct Solver<'m> {
    model: &'m Model,
    config: SolverConfig,
    cancel: Option<Arc<AtomicBool>>,
    hint: Option<Vec<i64>>,
}

impl<'m> Solver<'m> {
    pub fn new(model: &'m Model, config: SolverConfig) -> Self {
        Self {
            model,
            config,
            cancel: None,
            hint: None,
        }
    }

    /// The search returns early once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// A complete assignment used as the first incumbent if it satisfies the model.
    pub fn with_hint(mut self, values: Vec<i64>) -> Self {
        self.hint = Some(values);
        self
    }

    pub fn solve(&self) -> SearchOutcome {
        let start = Instant::now();
        let model = self.model;
        let mut stats = SearchStats::default();
        let mut d = Domains::new(model);
        let mut prop = Propagator::new(model);
        let mut best: Option<(Vec<i64>, i64)> = None;

        tracing::debug!(
            vars = model.num_vars(),
            constraints = model.num_constraints(),
            "search started"
        );

        if let Some(hint) = &self.hint {
            if model.check(hint) {
                let objective = model.objective_value(hint);
                tracing::debug!(objective, "hint accepted as incumbent");
                if model.objective().is_none() {
                    stats.solutions = 1;
                    return self.finish(Some((hint.clone(), objective)), true, stats, &prop, start);
                }
                prop.restrict_objective(objective - 1);
                best = Some((hint.clone(), objective));
            } else {
                tracing::warn!(
                    violated = ?model.violation(hint),
                    "hint violates the model and was ignored"
                );
            }
        }

        if d.is_empty() || prop.propagate(&mut d).is_err() {
            return self.finish(best, true, stats, &prop, start);
        }

        let interval = self.config.effective_check_interval();
        let mut stack: Vec<Node> = Vec::new();
        let mut exhausted = false;

        'search: loop {
            match self.branch(&d) {
                None => {
                    let values = d.values();
                    debug_assert!(model.check(&values), "propagation accepted an invalid leaf");
                    let objective = model.objective_value(&values);
                    stats.solutions += 1;
                    tracing::debug!(objective, nodes = stats.nodes, "improving solution");
                    best = Some((values, objective));
                    if model.objective().is_none() {
                        exhausted = true;
                        break 'search;
                    }
                    prop.restrict_objective(objective - 1);
                }
                Some(alternatives) => stack.push(Node {
                    mark: d.mark(),
                    alternatives,
                    next: 0,
                }),
            }

            loop {
                let Some(node) = stack.last_mut() else {
                    exhausted = true;
                    break 'search;
                };
                if node.next >= node.alternatives.len() {
                    stack.pop();
                    stats.backtracks += 1;
                    continue;
                }
                let decision = node.alternatives[node.next];
                node.next += 1;
                d.restore(node.mark);

                stats.nodes += 1;
                if stats.nodes % interval == 0 && self.should_stop(start, stats.nodes) {
                    break 'search;
                }
                if decision.apply(&mut d).is_ok() && prop.propagate(&mut d).is_ok() {
                    continue 'search;
                }
            }
        }

        self.finish(best, exhausted, stats, &prop, start)
    }

    fn finish(
        &self,
        best: Option<(Vec<i64>, i64)>,
        exhausted: bool,
        mut stats: SearchStats,
        prop: &Propagator,
        start: Instant,
    ) -> SearchOutcome {
        stats.propagations = prop.propagations;
        stats.elapsed_ms = start.elapsed().as_millis() as u64;
        let status = match (&best, exhausted) {
            (Some(_), true) => SolveStatus::Optimal,
            (Some(_), false) => SolveStatus::Feasible,
            (None, true) => SolveStatus::Infeasible,
            (None, false) => SolveStatus::Unknown,
        };
        tracing::debug!(
            %status,
            nodes = stats.nodes,
            backtracks = stats.backtracks,
            solutions = stats.solutions,
            elapsed_ms = stats.elapsed_ms,
            "search finished"
        );
        let (values, objective) = match best {
            Some((values, objective)) => (Some(values), Some(objective)),
            None => (None, None),
        };
        SearchOutcome {
            status,
            values,
            objective,
            stats,
        }
    }

    fn should_stop(&self, start: Instant, nodes: u64) -> bool {
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
        {
            tracing::debug!("search cancelled");
            return true;
        }
        if self.config.node_limit.is_some_and(|limit| nodes >= limit) {
            tracing::debug!(nodes, "node limit reached");
            return true;
        }
        if self
            .config
            .time_limit()
            .is_some_and(|limit| start.elapsed() >= limit)
        {
            tracing::debug!(nodes, "time limit reached");
            return true;
        }
        false
    }

    /// Alternatives for the next undecided variable, or `None` at a leaf.
    fn branch(&self, d: &Domains) -> Option<Vec<Decision>> {
        for strategy in &self.model.strategies {
            let unfixed = strategy.vars.iter().copied().filter(|&v| !d.is_fixed(v));
            let picked = match strategy.selection {
                VarSelection::InOrder => unfixed.into_iter().next(),
                VarSelection::SmallestDomain => unfixed.min_by_key(|&v| d.size(v)),
            };
            if let Some(v) = picked {
                return Some(alternatives(v, &strategy.values, d));
            }
        }
        (0..self.model.num_vars())
            .map(Var::from_index)
            .find(|&v| !d.is_fixed(v))
            .map(|v| alternatives(v, &ValueSelection::MinValue, d))
    }
}

fn alternatives(v: Var, values: &ValueSelection, d: &Domains) -> Vec<Decision> {
    let (lo, hi) = (d.lo(v), d.hi(v));
    match values {
        ValueSelection::MinValue => vec![Decision::Fix(v, lo), Decision::AtLeast(v, lo + 1)],
        ValueSelection::MaxValue => vec![Decision::Fix(v, hi), Decision::AtMost(v, hi - 1)],
        ValueSelection::Bins(bins) => bin_alternatives(v, bins, d),
    }
}

fn bin_alternatives(v: Var, bins: &BinValues, d: &Domains) -> Vec<Decision> {
    let mut used = Vec::new();
    let mut fresh = Vec::new();
    for value in d.lo(v)..=d.hi(v) {
        let Some(&usage) = usize::try_from(value).ok().and_then(|i| bins.usage.get(i)) else {
            continue;
        };
        match d.lit_value(usage.lit()) {
            Some(true) => used.push(value),
            Some(false) => {}
            None => fresh.push(value),
        }
    }

    fresh.sort_by_key(|&value| (bins.cost[value as usize], value));
    let mut classes = HashSet::new();
    fresh.retain(|&value| classes.insert(bins.class[value as usize]));

    used.into_iter()
        .chain(fresh)
        .map(|value| Decision::Fix(v, value))
        .collect()
}
