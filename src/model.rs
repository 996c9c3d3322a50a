//! Integer constraint models: variables with interval domains, linear and
//! logical constraints that can be reified on boolean literals, plus element
//! and product constraints for the wall variant.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    pub(crate) fn from_index(index: usize) -> Self {
        Var(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// Literal that holds when this 0/1 variable is 1.
    pub fn lit(self) -> Lit {
        Lit {
            var: self,
            positive: true,
        }
    }

    /// Literal that holds when this 0/1 variable is 0.
    pub fn not(self) -> Lit {
        Lit {
            var: self,
            positive: false,
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A boolean variable or its negation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lit {
    var: Var,
    positive: bool,
}

impl Lit {
    pub fn var(self) -> Var {
        self.var
    }

    /// Value the underlying variable takes when the literal holds.
    pub fn true_value(self) -> i64 {
        if self.positive { 1 } else { 0 }
    }

    pub fn holds(self, values: &[i64]) -> bool {
        values[self.var.0] == self.true_value()
    }
}

impl std::ops::Not for Lit {
    type Output = Lit;

    fn not(self) -> Lit {
        Lit {
            var: self.var,
            positive: !self.positive,
        }
    }
}

impl From<Var> for Lit {
    fn from(var: Var) -> Lit {
        var.lit()
    }
}

/// `Σ coef·var + offset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(Var, i64)>,
    offset: i64,
}

impl LinearExpr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn var(v: Var) -> Self {
        Self::new().term(v, 1)
    }

    pub fn sum(vars: impl IntoIterator<Item = Var>) -> Self {
        Self::weighted_sum(vars.into_iter().map(|v| (v, 1)))
    }

    pub fn weighted_sum(terms: impl IntoIterator<Item = (Var, i64)>) -> Self {
        let mut e = Self::new();
        for (v, c) in terms {
            e = e.term(v, c);
        }
        e
    }

    pub fn term(mut self, v: Var, coef: i64) -> Self {
        if coef != 0 {
            self.terms.push((v, coef));
        }
        self
    }

    pub fn plus(mut self, constant: i64) -> Self {
        self.offset += constant;
        self
    }

    pub fn terms(&self) -> &[(Var, i64)] {
        &self.terms
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn evaluate(&self, values: &[i64]) -> i64 {
        self.terms
            .iter()
            .map(|&(v, c)| c * values[v.0])
            .sum::<i64>()
            + self.offset
    }
}

impl From<Var> for LinearExpr {
    fn from(v: Var) -> Self {
        LinearExpr::var(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// `lo ≤ Σ coef·var ≤ hi`.
    Linear {
        terms: Vec<(Var, i64)>,
        lo: i64,
        hi: i64,
    },
    /// `Σ coef·var ≠ rhs`.
    NotEqual { terms: Vec<(Var, i64)>, rhs: i64 },
    /// At least one literal holds.
    Clause { lits: Vec<Lit> },
    /// `target = values[index]`.
    Element {
        index: Var,
        values: Vec<i64>,
        target: Var,
    },
    /// `target = left · right` over non-negative domains.
    ///
    /// Unlike every other kind this couples two decision variables
    /// multiplicatively, so it only narrows bounds; it becomes exact once
    /// either factor is fixed.
    Product { target: Var, left: Var, right: Var },
}

/// A constraint that holds whenever all of its enforcement literals hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    kind: ConstraintKind,
    enforce: Vec<Lit>,
}

impl Constraint {
    fn linear(expr: LinearExpr, lo: i64, hi: i64) -> Self {
        let offset = expr.offset;
        Self {
            kind: ConstraintKind::Linear {
                terms: expr.terms,
                lo: lo.saturating_sub(offset),
                hi: hi.saturating_sub(offset),
            },
            enforce: Vec::new(),
        }
    }

    pub fn le(expr: impl Into<LinearExpr>, rhs: i64) -> Self {
        Self::linear(expr.into(), i64::MIN, rhs)
    }

    pub fn ge(expr: impl Into<LinearExpr>, rhs: i64) -> Self {
        Self::linear(expr.into(), rhs, i64::MAX)
    }

    pub fn eq(expr: impl Into<LinearExpr>, rhs: i64) -> Self {
        Self::linear(expr.into(), rhs, rhs)
    }

    pub fn ne(expr: impl Into<LinearExpr>, rhs: i64) -> Self {
        let expr = expr.into();
        Self {
            kind: ConstraintKind::NotEqual {
                rhs: rhs - expr.offset,
                terms: expr.terms,
            },
            enforce: Vec::new(),
        }
    }

    pub fn clause(lits: impl IntoIterator<Item = Lit>) -> Self {
        Self {
            kind: ConstraintKind::Clause {
                lits: lits.into_iter().collect(),
            },
            enforce: Vec::new(),
        }
    }

    pub fn element(index: Var, values: Vec<i64>, target: Var) -> Self {
        Self {
            kind: ConstraintKind::Element {
                index,
                values,
                target,
            },
            enforce: Vec::new(),
        }
    }

    pub fn product(target: Var, left: Var, right: Var) -> Self {
        Self {
            kind: ConstraintKind::Product {
                target,
                left,
                right,
            },
            enforce: Vec::new(),
        }
    }

    /// Reifies the constraint: it only applies while `lit` holds.
    pub fn only_enforce_if(mut self, lit: impl Into<Lit>) -> Self {
        self.enforce.push(lit.into());
        self
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Only the search's objective cut is rewritten after construction.
    pub(crate) fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }

    pub fn enforcement(&self) -> &[Lit] {
        &self.enforce
    }

    /// Every variable the constraint reads, enforcement literals included.
    pub fn scope(&self) -> Vec<Var> {
        let mut vars: Vec<Var> = self.enforce.iter().map(|l| l.var()).collect();
        match &self.kind {
            ConstraintKind::Linear { terms, .. } | ConstraintKind::NotEqual { terms, .. } => {
                vars.extend(terms.iter().map(|&(v, _)| v))
            }
            ConstraintKind::Clause { lits } => vars.extend(lits.iter().map(|l| l.var())),
            ConstraintKind::Element { index, target, .. } => vars.extend([*index, *target]),
            ConstraintKind::Product {
                target,
                left,
                right,
            } => vars.extend([*target, *left, *right]),
        }
        vars.sort_unstable();
        vars.dedup();
        vars
    }

    pub fn is_satisfied(&self, values: &[i64]) -> bool {
        if !self.enforce.iter().all(|l| l.holds(values)) {
            return true;
        }
        let dot = |terms: &[(Var, i64)]| -> i128 {
            terms
                .iter()
                .map(|&(v, c)| c as i128 * values[v.0] as i128)
                .sum()
        };
        match &self.kind {
            ConstraintKind::Linear { terms, lo, hi } => {
                let s = dot(terms);
                *lo as i128 <= s && s <= *hi as i128
            }
            ConstraintKind::NotEqual { terms, rhs } => dot(terms) != *rhs as i128,
            ConstraintKind::Clause { lits } => lits.iter().any(|l| l.holds(values)),
            ConstraintKind::Element {
                index,
                values: table,
                target,
            } => usize::try_from(values[index.0])
                .ok()
                .and_then(|i| table.get(i))
                .is_some_and(|&v| v == values[target.0]),
            ConstraintKind::Product {
                target,
                left,
                right,
            } => values[left.0] as i128 * values[right.0] as i128 == values[target.0] as i128,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct VarDef {
    pub lo: i64,
    pub hi: i64,
    pub name: String,
}

/// How the next variable of a strategy is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarSelection {
    /// First unfixed variable in declaration order.
    InOrder,
    /// Unfixed variable with the fewest remaining values.
    SmallestDomain,
}

/// Value ordering for variables that pick a stock unit by index.
///
/// Units already in use are tried first, then unused ones by ascending cost.
/// Unused units sharing a `class` are interchangeable, so only the first of
/// each class is tried at a branching point.
#[derive(Debug, Clone, PartialEq)]
pub struct BinValues {
    pub usage: Vec<Var>,
    pub class: Vec<usize>,
    pub cost: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueSelection {
    /// Try the lower bound, then everything above it.
    MinValue,
    /// Try the upper bound, then everything below it.
    MaxValue,
    Bins(BinValues),
}

/// One phase of the search: its variables are decided before later phases.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionStrategy {
    pub vars: Vec<Var>,
    pub selection: VarSelection,
    pub values: ValueSelection,
}

impl DecisionStrategy {
    pub fn new(vars: Vec<Var>, selection: VarSelection, values: ValueSelection) -> Self {
        Self {
            vars,
            selection,
            values,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    pub(crate) vars: Vec<VarDef>,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) objective: Option<LinearExpr>,
    pub(crate) strategies: Vec<DecisionStrategy>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_int_var(&mut self, lo: i64, hi: i64, name: impl Into<String>) -> Var {
        self.vars.push(VarDef {
            lo,
            hi,
            name: name.into(),
        });
        Var(self.vars.len() - 1)
    }

    pub fn new_bool_var(&mut self, name: impl Into<String>) -> Var {
        self.new_int_var(0, 1, name)
    }

    pub fn new_constant(&mut self, value: i64, name: impl Into<String>) -> Var {
        self.new_int_var(value, value, name)
    }

    pub fn add(&mut self, constraint: Constraint) {
        self.constraints.push(constraint);
    }

    /// Adds `b ⇔ (expr == rhs)`.
    pub fn add_equality_reified(&mut self, expr: LinearExpr, rhs: i64, b: Var) {
        self.add(Constraint::eq(expr.clone(), rhs).only_enforce_if(b));
        self.add(Constraint::ne(expr, rhs).only_enforce_if(b.not()));
    }

    pub fn minimize(&mut self, objective: LinearExpr) {
        self.objective = Some(objective);
    }

    pub fn add_decision_strategy(&mut self, strategy: DecisionStrategy) {
        self.strategies.push(strategy);
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    pub fn bounds(&self, v: Var) -> (i64, i64) {
        let d = &self.vars[v.0];
        (d.lo, d.hi)
    }

    pub fn name(&self, v: Var) -> &str {
        &self.vars[v.0].name
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn objective(&self) -> Option<&LinearExpr> {
        self.objective.as_ref()
    }

    /// Returns `true` if `values` is a complete assignment satisfying every
    /// domain and constraint.
    pub fn check(&self, values: &[i64]) -> bool {
        values.len() == self.vars.len()
            && self
                .vars
                .iter()
                .zip(values)
                .all(|(d, &v)| d.lo <= v && v <= d.hi)
            && self.constraints.iter().all(|c| c.is_satisfied(values))
    }

    /// Names of the variables involved in the first domain or constraint
    /// that `values` violates.
    pub fn violation(&self, values: &[i64]) -> Option<Vec<&str>> {
        if values.len() != self.vars.len() {
            return None;
        }
        if let Some(k) = self
            .vars
            .iter()
            .zip(values)
            .position(|(d, &v)| v < d.lo || v > d.hi)
        {
            return Some(vec![self.vars[k].name.as_str()]);
        }
        self.constraints
            .iter()
            .find(|c| !c.is_satisfied(values))
            .map(|c| c.scope().into_iter().map(|v| self.name(v)).collect())
    }

    pub fn objective_value(&self, values: &[i64]) -> i64 {
        self.objective
            .as_ref()
            .map_or(0, |o| o.evaluate(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_folds_into_bounds() {
        let mut m = Model::new();
        let x = m.new_int_var(0, 10, "x");
        let c = Constraint::le(LinearExpr::var(x).plus(3), 7);
        match c.kind() {
            ConstraintKind::Linear { lo, hi, .. } => {
                assert_eq!(*hi, 4);
                assert_eq!(*lo, i64::MIN);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_enforcement_gates_satisfaction() {
        let mut m = Model::new();
        let x = m.new_int_var(0, 10, "x");
        let b = m.new_bool_var("b");
        let c = Constraint::eq(x, 5).only_enforce_if(b);
        assert!(c.is_satisfied(&[3, 0]));
        assert!(!c.is_satisfied(&[3, 1]));
        assert!(c.is_satisfied(&[5, 1]));
    }

    #[test]
    fn test_reified_equality_check() {
        let mut m = Model::new();
        let x = m.new_int_var(0, 3, "x");
        let b = m.new_bool_var("b");
        m.add_equality_reified(LinearExpr::var(x), 2, b);
        assert!(m.check(&[2, 1]));
        assert!(m.check(&[1, 0]));
        assert!(!m.check(&[2, 0]));
        assert!(!m.check(&[1, 1]));
    }

    #[test]
    fn test_element_and_product_check() {
        let mut m = Model::new();
        let i = m.new_int_var(0, 2, "i");
        let t = m.new_int_var(0, 100, "t");
        let z = m.new_int_var(0, 1000, "z");
        m.add(Constraint::element(i, vec![10, 20, 30], t));
        m.add(Constraint::product(z, i, t));
        assert!(m.check(&[1, 20, 20]));
        assert!(!m.check(&[1, 30, 30]));
        assert!(!m.check(&[2, 30, 30]));
    }

    #[test]
    fn test_clause_with_negated_literal() {
        let mut m = Model::new();
        let a = m.new_bool_var("a");
        let b = m.new_bool_var("b");
        m.add(Constraint::clause([a.lit(), b.not()]));
        assert!(m.check(&[0, 0]));
        assert!(!m.check(&[0, 1]));
    }

    #[test]
    fn test_check_rejects_out_of_domain() {
        let mut m = Model::new();
        m.new_int_var(0, 3, "x");
        assert!(!m.check(&[4]));
        assert!(!m.check(&[]));
    }

    #[test]
    fn test_violation_names_culprits() {
        let mut m = Model::new();
        let x = m.new_int_var(0, 5, "x");
        let y = m.new_int_var(0, 5, "y");
        m.add(Constraint::le(LinearExpr::sum([x, y]), 4));
        assert_eq!(m.violation(&[2, 2]), None);
        assert_eq!(m.violation(&[3, 3]), Some(vec!["x", "y"]));
        assert_eq!(m.violation(&[6, 0]), Some(vec!["x"]));
        assert_eq!(m.violation(&[1]), None);
    }
}
