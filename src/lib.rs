//! Minimum-cost cutting plans for boards, sheets and walls.
//!
//! Each variant validates its input, builds an integer constraint model over
//! the available stock units and hands it to a branch-and-bound search.

pub mod boards;
pub mod builder;
pub mod config;
pub mod error;
pub mod extract;
pub mod guillotine;
pub mod model;
pub mod options;
mod propagate;
pub mod render;
pub mod sheets;
pub mod solver;
pub mod types;
pub mod walls;

pub use config::SolverConfig;
pub use error::{PlanError, Result};
pub use solver::SolveStatus;
pub use types::{Money, Rect, VariantKind};
