use crate::types::{MAX_PRICE, StockOption};
use thiserror::Error;

/// Errors surfaced by the planning entry points.
///
/// Infeasible or unfinished searches are not errors; they are reported through
/// [`crate::solver::SolveStatus`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("invalid stock '{id}': {reason}")]
    InvalidStock { id: String, reason: String },

    #[error("invalid piece #{index}: {reason}")]
    InvalidPiece { index: usize, reason: String },

    #[error("invalid wall #{index}: {reason}")]
    InvalidWall { index: usize, reason: String },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The solved assignment does not map every piece to exactly one stock unit.
    /// This is a defect in model construction or search, not a user error.
    #[error("inconsistent solution: {0}")]
    Inconsistent(String),
}

impl PlanError {
    pub fn stock(id: &str, reason: impl Into<String>) -> Self {
        PlanError::InvalidStock {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn piece(index: usize, reason: impl Into<String>) -> Self {
        PlanError::InvalidPiece {
            index,
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        !matches!(self, PlanError::Inconsistent(_))
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;

/// Rejects malformed stock records before any model is built.
pub(crate) fn validate_stock_record(
    id: &str,
    price: f64,
    count: u32,
    degenerate: bool,
) -> Result<()> {
    if id.trim().is_empty() {
        return Err(PlanError::stock(id, "id must not be empty"));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(PlanError::stock(
            id,
            format!("price must be a non-negative number, got {price}"),
        ));
    }
    if price > MAX_PRICE {
        return Err(PlanError::stock(
            id,
            format!("price must not exceed {MAX_PRICE}, got {price}"),
        ));
    }
    if count == 0 {
        return Err(PlanError::stock(id, "count must be at least 1"));
    }
    if degenerate {
        return Err(PlanError::stock(id, "dimensions must be non-zero"));
    }
    Ok(())
}

/// Rejects stock whose combined scaled price does not fit the objective.
pub(crate) fn validate_total_price<D>(options: &[StockOption<D>]) -> Result<()> {
    let total: i128 = options
        .iter()
        .map(|o| o.scaled_price().scaled() as i128)
        .sum();
    if total > i64::MAX as i128 {
        return Err(PlanError::InvalidParameter {
            name: "stock",
            reason: "combined price of all units is too large".to_string(),
        });
    }
    Ok(())
}
