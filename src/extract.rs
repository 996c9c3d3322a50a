use crate::error::{PlanError, Result};
use crate::solver::{SearchStats, SolveStatus};
use crate::types::{Dimensions, Money, StockOption, VariantKind};
use serde::Serialize;

/// A placed piece that knows which piece and stock option it belongs to.
pub trait Placed {
    fn piece(&self) -> usize;
    fn stock_option(&self) -> usize;
    /// Material the piece occupies, in the same unit as [`Dimensions::capacity`].
    fn footprint(&self) -> u64;
}

/// All placements cut from one stock unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockGroup<D, P> {
    pub option: usize,
    pub option_id: String,
    pub source_id: String,
    pub variant: VariantKind,
    pub size: D,
    pub price: Money,
    pub placements: Vec<P>,
}

impl<D: Dimensions, P: Placed> StockGroup<D, P> {
    pub fn used(&self) -> u64 {
        self.placements.iter().map(Placed::footprint).sum()
    }

    pub fn waste(&self) -> u64 {
        self.size.capacity().saturating_sub(self.used())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Layout<D, P> {
    pub groups: Vec<StockGroup<D, P>>,
    pub total_cost: Money,
}

impl<D, P> Layout<D, P> {
    pub fn placements(&self) -> impl Iterator<Item = &P> {
        self.groups.iter().flat_map(|g| &g.placements)
    }
}

/// Outcome of one planning call. `layout` is present only for optimal or
/// feasible outcomes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan<D, P> {
    pub status: SolveStatus,
    pub layout: Option<Layout<D, P>>,
    pub stats: SearchStats,
}

impl<D, P> Plan<D, P> {
    pub fn without_layout(status: SolveStatus, stats: SearchStats) -> Self {
        Self {
            status,
            layout: None,
            stats,
        }
    }

    pub fn total_cost(&self) -> Option<Money> {
        self.layout.as_ref().map(|l| l.total_cost)
    }

    pub fn groups(&self) -> &[StockGroup<D, P>] {
        match &self.layout {
            Some(layout) => &layout.groups,
            None => &[],
        }
    }
}

/// Groups placements by stock option and prices the options marked used.
///
/// Options without placements are left out of the groups. Every piece must
/// appear exactly once.
pub fn group_placements<D, P>(
    piece_count: usize,
    options: &[StockOption<D>],
    placements: Vec<P>,
    used: impl Fn(usize) -> bool,
) -> Result<Layout<D, P>>
where
    D: Dimensions,
    P: Placed,
{
    let mut seen = vec![0usize; piece_count];
    for p in &placements {
        if p.stock_option() >= options.len() {
            return Err(PlanError::Inconsistent(format!(
                "piece {} assigned to unknown stock option {}",
                p.piece(),
                p.stock_option()
            )));
        }
        match seen.get_mut(p.piece()) {
            Some(count) => *count += 1,
            None => {
                return Err(PlanError::Inconsistent(format!(
                    "placement for unknown piece {}",
                    p.piece()
                )));
            }
        }
    }
    if let Some((piece, &count)) = seen.iter().enumerate().find(|&(_, &c)| c != 1) {
        return Err(PlanError::Inconsistent(format!(
            "piece {piece} appears in {count} groups"
        )));
    }

    let mut by_option: Vec<Vec<P>> = options.iter().map(|_| Vec::new()).collect();
    for p in placements {
        by_option[p.stock_option()].push(p);
    }

    let total_cost = (0..options.len())
        .filter(|&s| used(s))
        .map(|s| options[s].scaled_price())
        .sum();

    let groups = by_option
        .into_iter()
        .enumerate()
        .filter(|(_, ps)| !ps.is_empty())
        .map(|(s, mut placements)| {
            placements.sort_by_key(|p| p.piece());
            let o = &options[s];
            StockGroup {
                option: s,
                option_id: o.id.clone(),
                source_id: o.source_id.clone(),
                variant: o.variant,
                size: o.size,
                price: o.scaled_price(),
                placements,
            }
        })
        .collect();

    Ok(Layout { groups, total_cost })
}
