//! Domain store with an undo trail, and bounds propagation for every
//! constraint kind in [`crate::model`].

use crate::model::{Constraint, ConstraintKind, Lit, Model, Var};
use std::collections::VecDeque;

/// Raised when some domain becomes empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Conflict;

pub(crate) type Propagation = Result<(), Conflict>;

#[derive(Debug, Clone, Copy)]
struct TrailEntry {
    var: usize,
    old_lo: i64,
    old_hi: i64,
}

/// Interval domains for every variable.
#[derive(Debug, Clone)]
pub(crate) struct Domains {
    lo: Vec<i64>,
    hi: Vec<i64>,
    trail: Vec<TrailEntry>,
    changed: Vec<usize>,
}

impl Domains {
    pub fn new(model: &Model) -> Self {
        Self {
            lo: model.vars.iter().map(|d| d.lo).collect(),
            hi: model.vars.iter().map(|d| d.hi).collect(),
            trail: Vec::new(),
            changed: (0..model.vars.len()).collect(),
        }
    }

    #[inline]
    pub fn lo(&self, v: Var) -> i64 {
        self.lo[v.index()]
    }

    #[inline]
    pub fn hi(&self, v: Var) -> i64 {
        self.hi[v.index()]
    }

    #[inline]
    pub fn is_fixed(&self, v: Var) -> bool {
        self.lo[v.index()] == self.hi[v.index()]
    }

    pub fn size(&self, v: Var) -> u64 {
        (self.hi(v) - self.lo(v)) as u64 + 1
    }

    pub fn is_empty(&self) -> bool {
        self.lo.iter().zip(&self.hi).any(|(l, h)| l > h)
    }

    pub fn values(&self) -> Vec<i64> {
        self.lo.clone()
    }

    /// `Some(b)` once the literal's variable is fixed.
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        let v = lit.var();
        self.is_fixed(v).then(|| self.lo(v) == lit.true_value())
    }

    fn record(&mut self, var: usize) {
        self.trail.push(TrailEntry {
            var,
            old_lo: self.lo[var],
            old_hi: self.hi[var],
        });
        self.changed.push(var);
    }

    pub fn set_lo(&mut self, v: Var, value: i64) -> Propagation {
        let i = v.index();
        if value <= self.lo[i] {
            return Ok(());
        }
        if value > self.hi[i] {
            return Err(Conflict);
        }
        self.record(i);
        self.lo[i] = value;
        Ok(())
    }

    pub fn set_hi(&mut self, v: Var, value: i64) -> Propagation {
        let i = v.index();
        if value >= self.hi[i] {
            return Ok(());
        }
        if value < self.lo[i] {
            return Err(Conflict);
        }
        self.record(i);
        self.hi[i] = value;
        Ok(())
    }

    pub fn fix(&mut self, v: Var, value: i64) -> Propagation {
        self.set_lo(v, value)?;
        self.set_hi(v, value)
    }

    pub fn set_lit(&mut self, lit: Lit) -> Propagation {
        self.fix(lit.var(), lit.true_value())
    }

    fn set_lo_wide(&mut self, v: Var, value: i128) -> Propagation {
        if value > i64::MAX as i128 {
            return Err(Conflict);
        }
        if value <= i64::MIN as i128 {
            return Ok(());
        }
        self.set_lo(v, value as i64)
    }

    fn set_hi_wide(&mut self, v: Var, value: i128) -> Propagation {
        if value < i64::MIN as i128 {
            return Err(Conflict);
        }
        if value >= i64::MAX as i128 {
            return Ok(());
        }
        self.set_hi(v, value as i64)
    }

    pub fn mark(&self) -> usize {
        self.trail.len()
    }

    /// Undoes every change recorded after `mark`.
    pub fn restore(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(e) = self.trail.pop() {
                self.lo[e.var] = e.old_lo;
                self.hi[e.var] = e.old_hi;
            }
        }
        self.changed.clear();
    }
}

fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

fn ceil_div(a: i128, b: i128) -> i128 {
    -floor_div(-a, b)
}

fn activity(terms: &[(Var, i64)], d: &Domains) -> (i128, i128) {
    let mut min = 0i128;
    let mut max = 0i128;
    for &(v, c) in terms {
        let (a, b) = (c as i128 * d.lo(v) as i128, c as i128 * d.hi(v) as i128);
        min += a.min(b);
        max += a.max(b);
    }
    (min, max)
}

/// Holds the constraint set plus the objective cut, and runs them to a
/// fixpoint.
pub(crate) struct Propagator {
    constraints: Vec<Constraint>,
    watches: Vec<Vec<usize>>,
    queue: VecDeque<usize>,
    queued: Vec<bool>,
    objective_cut: Option<usize>,
    objective_offset: i64,
    pub propagations: u64,
}

impl Propagator {
    pub fn new(model: &Model) -> Self {
        let mut constraints = model.constraints.clone();
        let mut objective_cut = None;
        let mut objective_offset = 0;
        if let Some(obj) = &model.objective {
            objective_offset = obj.offset();
            constraints.push(Constraint::le(
                crate::model::LinearExpr::weighted_sum(obj.terms().iter().copied()),
                i64::MAX,
            ));
            objective_cut = Some(constraints.len() - 1);
        }

        let mut watches = vec![Vec::new(); model.vars.len()];
        for (ci, c) in constraints.iter().enumerate() {
            for v in c.scope() {
                watches[v.index()].push(ci);
            }
        }

        let n = constraints.len();
        Self {
            constraints,
            watches,
            queue: (0..n).collect(),
            queued: vec![true; n],
            objective_cut,
            objective_offset,
            propagations: 0,
        }
    }

    /// Requires the objective to be at most `bound` from now on.
    pub fn restrict_objective(&mut self, bound: i64) {
        if let Some(ci) = self.objective_cut {
            if let ConstraintKind::Linear { hi, .. } = self.constraints[ci].kind_mut() {
                *hi = bound.saturating_sub(self.objective_offset);
            }
            self.enqueue(ci);
        }
    }

    fn enqueue(&mut self, ci: usize) {
        if !self.queued[ci] {
            self.queued[ci] = true;
            self.queue.push_back(ci);
        }
    }

    fn clear_queue(&mut self) {
        for ci in self.queue.drain(..) {
            self.queued[ci] = false;
        }
    }

    /// Propagates until no domain changes. Leaves the queue empty either way.
    pub fn propagate(&mut self, d: &mut Domains) -> Propagation {
        if let Some(ci) = self.objective_cut {
            self.enqueue(ci);
        }
        loop {
            for var in std::mem::take(&mut d.changed) {
                for k in 0..self.watches[var].len() {
                    let ci = self.watches[var][k];
                    self.enqueue(ci);
                }
            }
            let Some(ci) = self.queue.pop_front() else {
                return Ok(());
            };
            self.queued[ci] = false;
            self.propagations += 1;
            if propagate_constraint(&self.constraints[ci], d).is_err() {
                self.clear_queue();
                d.changed.clear();
                return Err(Conflict);
            }
        }
    }
}

fn propagate_constraint(c: &Constraint, d: &mut Domains) -> Propagation {
    let mut open = None;
    let mut open_count = 0;
    for &lit in c.enforcement() {
        match d.lit_value(lit) {
            Some(false) => return Ok(()),
            Some(true) => {}
            None => {
                open_count += 1;
                open = Some(lit);
            }
        }
    }
    match (open_count, open) {
        (0, _) => propagate_kind(c.kind(), d),
        (1, Some(lit)) if is_violated(c.kind(), d) => d.set_lit(!lit),
        _ => Ok(()),
    }
}

/// `true` when the current bounds already rule the constraint out.
fn is_violated(kind: &ConstraintKind, d: &Domains) -> bool {
    match kind {
        ConstraintKind::Linear { terms, lo, hi } => {
            let (min, max) = activity(terms, d);
            min > *hi as i128 || max < *lo as i128
        }
        ConstraintKind::NotEqual { terms, rhs } => {
            terms.iter().all(|&(v, _)| d.is_fixed(v)) && {
                let (s, _) = activity(terms, d);
                s == *rhs as i128
            }
        }
        ConstraintKind::Clause { lits } => lits.iter().all(|&l| d.lit_value(l) == Some(false)),
        ConstraintKind::Element { .. } | ConstraintKind::Product { .. } => false,
    }
}

fn propagate_kind(kind: &ConstraintKind, d: &mut Domains) -> Propagation {
    match kind {
        ConstraintKind::Linear { terms, lo, hi } => propagate_linear(terms, *lo, *hi, d),
        ConstraintKind::NotEqual { terms, rhs } => propagate_not_equal(terms, *rhs, d),
        ConstraintKind::Clause { lits } => propagate_clause(lits, d),
        ConstraintKind::Element {
            index,
            values,
            target,
        } => propagate_element(*index, values, *target, d),
        ConstraintKind::Product {
            target,
            left,
            right,
        } => propagate_product(*target, *left, *right, d),
    }
}

fn propagate_linear(terms: &[(Var, i64)], lo: i64, hi: i64, d: &mut Domains) -> Propagation {
    let (min, max) = activity(terms, d);
    let (lo, hi) = (lo as i128, hi as i128);
    if min > hi || max < lo {
        return Err(Conflict);
    }
    let upper = hi < i64::MAX as i128;
    let lower = lo > i64::MIN as i128;
    for &(v, c) in terms {
        let c = c as i128;
        let (a, b) = (c * d.lo(v) as i128, c * d.hi(v) as i128);
        let (own_min, own_max) = (a.min(b), a.max(b));
        if upper {
            // c·x ≤ hi − (min − own_min)
            let slack = hi - (min - own_min);
            if c > 0 {
                d.set_hi_wide(v, floor_div(slack, c))?;
            } else {
                d.set_lo_wide(v, ceil_div(slack, c))?;
            }
        }
        if lower {
            // c·x ≥ lo − (max − own_max)
            let need = lo - (max - own_max);
            if c > 0 {
                d.set_lo_wide(v, ceil_div(need, c))?;
            } else {
                d.set_hi_wide(v, floor_div(need, c))?;
            }
        }
    }
    Ok(())
}

fn propagate_not_equal(terms: &[(Var, i64)], rhs: i64, d: &mut Domains) -> Propagation {
    let mut open = None;
    let mut fixed_sum = 0i128;
    for &(v, c) in terms {
        if d.is_fixed(v) {
            fixed_sum += c as i128 * d.lo(v) as i128;
        } else if open.is_some() {
            return Ok(());
        } else {
            open = Some((v, c as i128));
        }
    }
    let rest = rhs as i128 - fixed_sum;
    match open {
        None if rest == 0 => Err(Conflict),
        None => Ok(()),
        Some((v, c)) => {
            if rest % c != 0 {
                return Ok(());
            }
            let forbidden = rest / c;
            if forbidden == d.lo(v) as i128 {
                d.set_lo(v, d.lo(v) + 1)
            } else if forbidden == d.hi(v) as i128 {
                d.set_hi(v, d.hi(v) - 1)
            } else {
                Ok(())
            }
        }
    }
}

fn propagate_clause(lits: &[Lit], d: &mut Domains) -> Propagation {
    let mut open = None;
    let mut open_count = 0;
    for &lit in lits {
        match d.lit_value(lit) {
            Some(true) => return Ok(()),
            Some(false) => {}
            None => {
                open_count += 1;
                open = Some(lit);
            }
        }
    }
    match (open_count, open) {
        (0, _) => Err(Conflict),
        (1, Some(lit)) => d.set_lit(lit),
        _ => Ok(()),
    }
}

fn propagate_element(index: Var, values: &[i64], target: Var, d: &mut Domains) -> Propagation {
    if values.is_empty() {
        return Err(Conflict);
    }
    d.set_lo(index, 0)?;
    d.set_hi(index, values.len() as i64 - 1)?;

    let (tlo, thi) = (d.lo(target), d.hi(target));
    let in_range = |i: i64| {
        let v = values[i as usize];
        tlo <= v && v <= thi
    };
    let mut lo = d.lo(index);
    let mut hi = d.hi(index);
    while lo <= hi && !in_range(lo) {
        lo += 1;
    }
    while hi >= lo && !in_range(hi) {
        hi -= 1;
    }
    if lo > hi {
        return Err(Conflict);
    }
    d.set_lo(index, lo)?;
    d.set_hi(index, hi)?;

    let reachable = &values[lo as usize..=hi as usize];
    let min = reachable.iter().copied().min().unwrap_or(tlo);
    let max = reachable.iter().copied().max().unwrap_or(thi);
    d.set_lo(target, min)?;
    d.set_hi(target, max)
}

fn propagate_product(target: Var, left: Var, right: Var, d: &mut Domains) -> Propagation {
    if d.lo(left) < 0 || d.lo(right) < 0 {
        if d.is_fixed(left) && d.is_fixed(right) {
            return d.fix(target, d.lo(left) * d.lo(right));
        }
        return Ok(());
    }
    let b = |v: Var, d: &Domains| (d.lo(v) as i128, d.hi(v) as i128);
    let ((xl, xh), (yl, yh)) = (b(left, d), b(right, d));
    d.set_lo_wide(target, xl * yl)?;
    d.set_hi_wide(target, xh * yh)?;

    for (x, y) in [(left, right), (right, left)] {
        let (zl, zh) = b(target, d);
        let (yl, yh) = b(y, d);
        if yl > 0 {
            d.set_hi_wide(x, floor_div(zh, yl))?;
        }
        if yh > 0 {
            d.set_lo_wide(x, ceil_div(zl, yh))?;
        }
    }
    Ok(())
}
