use crate::types::{Rect, StockOption};

#[derive(Debug, Clone, Copy)]
pub struct FreeRect {
    pub x: u32,
    pub y: u32,
    pub rect: Rect,
}

/// A piece placed by the greedy packer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GreedyPlacement {
    pub option: usize,
    pub x: u32,
    pub y: u32,
    pub rotated: bool,
    pub size: Rect,
}

/// Free-rectangle bookkeeping for one stock unit.
///
/// The bin is built on the unit shrunk by the kerf, so `x + w + kerf` never
/// exceeds the unit, and every split leaves a kerf-wide gap after the piece.
#[derive(Debug, Clone)]
pub struct GuillotineBin {
    kerf: u32,
    pub free_rects: Vec<FreeRect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum ScoreStrategy {
    BestAreaFit,
    BestShortSideFit,
    BestLongSideFit,
}

impl ScoreStrategy {
    pub const ALL: [ScoreStrategy; 3] = [
        ScoreStrategy::BestAreaFit,
        ScoreStrategy::BestShortSideFit,
        ScoreStrategy::BestLongSideFit,
    ];
}

#[derive(Debug, Clone, Copy)]
pub struct ScoredPlacement {
    pub free_idx: usize,
    pub rotated: bool,
    pub score: (u64, u64),
}

impl GuillotineBin {
    pub fn new(stock: Rect, kerf: u32) -> Self {
        let usable = stock.shrink(kerf);
        let free_rects = if usable.w == 0 || usable.h == 0 {
            Vec::new()
        } else {
            vec![FreeRect {
                x: 0,
                y: 0,
                rect: usable,
            }]
        };
        Self { kerf, free_rects }
    }

    pub fn find_best(
        &self,
        piece: Rect,
        allow_rotate: bool,
        score_strategy: ScoreStrategy,
    ) -> Option<ScoredPlacement> {
        let mut best: Option<ScoredPlacement> = None;
        let orientations: &[bool] = if allow_rotate { &[false, true] } else { &[false] };

        for (idx, free) in self.free_rects.iter().enumerate() {
            for &rotated in orientations {
                let size = if rotated { piece.rotated() } else { piece };
                if !size.fits_in(&free.rect) {
                    continue;
                }
                let score = Self::score(size, free.rect, score_strategy);
                if best.is_none_or(|b| score < b.score) {
                    best = Some(ScoredPlacement {
                        free_idx: idx,
                        rotated,
                        score,
                    });
                }
            }
        }

        best
    }

    fn score(piece: Rect, free: Rect, strategy: ScoreStrategy) -> (u64, u64) {
        let dw = (free.w - piece.w) as u64;
        let dh = (free.h - piece.h) as u64;
        match strategy {
            ScoreStrategy::BestAreaFit => (free.area() - piece.area(), dw.min(dh)),
            ScoreStrategy::BestShortSideFit => (dw.min(dh), dw.max(dh)),
            ScoreStrategy::BestLongSideFit => (dw.max(dh), dw.min(dh)),
        }
    }

    /// Places `piece` at the scored free rectangle and returns its corner.
    pub fn place(&mut self, scored: ScoredPlacement, piece: Rect) -> (u32, u32) {
        let free = self.free_rects.swap_remove(scored.free_idx);
        let placed = if scored.rotated {
            piece.rotated()
        } else {
            piece
        };
        self.split(free, placed);
        self.merge_free_rects();
        (free.x, free.y)
    }

    fn split(&mut self, free: FreeRect, placed: Rect) {
        let right_w = free.rect.w.saturating_sub(placed.w + self.kerf);
        let bottom_h = free.rect.h.saturating_sub(placed.h + self.kerf);
        let right_x = free.x + placed.w + self.kerf;
        let bottom_y = free.y + placed.h + self.kerf;

        if right_w > 0 && bottom_h > 0 {
            // The remainder along the shorter leftover axis stays narrow.
            if free.rect.w - placed.w < free.rect.h - placed.h {
                self.push_free(right_x, free.y, Rect::new(right_w, placed.h));
                self.push_free(free.x, bottom_y, Rect::new(free.rect.w, bottom_h));
            } else {
                self.push_free(right_x, free.y, Rect::new(right_w, free.rect.h));
                self.push_free(free.x, bottom_y, Rect::new(placed.w, bottom_h));
            }
        } else if right_w > 0 {
            self.push_free(right_x, free.y, Rect::new(right_w, free.rect.h));
        } else if bottom_h > 0 {
            self.push_free(free.x, bottom_y, Rect::new(free.rect.w, bottom_h));
        }
    }

    fn push_free(&mut self, x: u32, y: u32, rect: Rect) {
        self.free_rects.push(FreeRect { x, y, rect });
    }

    fn merge_free_rects(&mut self) {
        let mut merged = true;
        while merged {
            merged = false;
            'outer: for i in 0..self.free_rects.len() {
                for j in (i + 1)..self.free_rects.len() {
                    if let Some(m) = Self::try_merge(self.free_rects[i], self.free_rects[j]) {
                        self.free_rects[i] = m;
                        self.free_rects.swap_remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    fn try_merge(a: FreeRect, b: FreeRect) -> Option<FreeRect> {
        if a.y == b.y && a.rect.h == b.rect.h {
            let (left, right) = if a.x <= b.x { (a, b) } else { (b, a) };
            if left.x + left.rect.w == right.x {
                return Some(FreeRect {
                    x: left.x,
                    y: left.y,
                    rect: Rect::new(a.rect.w + b.rect.w, a.rect.h),
                });
            }
        }
        if a.x == b.x && a.rect.w == b.rect.w {
            let (top, bottom) = if a.y <= b.y { (a, b) } else { (b, a) };
            if top.y + top.rect.h == bottom.y {
                return Some(FreeRect {
                    x: top.x,
                    y: top.y,
                    rect: Rect::new(a.rect.w, a.rect.h + b.rect.h),
                });
            }
        }
        None
    }
}

/// Packs pieces largest-first into heterogeneous priced units, opening the
/// cheapest unit that can take a piece when no open one can.
///
/// Returns one placement per piece, or `None` if some piece fits nowhere.
pub fn greedy_layout(
    pieces: &[Rect],
    options: &[StockOption<Rect>],
    kerf: u32,
    allow_rotate: bool,
    strategy: ScoreStrategy,
) -> Option<Vec<GreedyPlacement>> {
    let mut order: Vec<usize> = (0..pieces.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(pieces[i].area()));

    let mut by_price: Vec<usize> = (0..options.len()).collect();
    by_price.sort_by_key(|&s| {
        (
            options[s].scaled_price(),
            std::cmp::Reverse(options[s].size.area()),
        )
    });

    let mut bins: Vec<(usize, GuillotineBin)> = Vec::new();
    let mut placed: Vec<Option<GreedyPlacement>> = vec![None; pieces.len()];

    for i in order {
        let piece = pieces[i];
        let rotate = allow_rotate && piece.w != piece.h;

        let open = bins
            .iter()
            .enumerate()
            .filter_map(|(b, (_, bin))| bin.find_best(piece, rotate, strategy).map(|s| (b, s)))
            .min_by_key(|(_, s)| s.score);
        let (b, scored) = match open {
            Some(found) => found,
            None => {
                let (s, scored) = by_price.iter().find_map(|&s| {
                    if bins.iter().any(|(o, _)| *o == s) {
                        return None;
                    }
                    let bin = GuillotineBin::new(options[s].size, kerf);
                    bin.find_best(piece, rotate, strategy).map(|scored| (s, scored))
                })?;
                bins.push((s, GuillotineBin::new(options[s].size, kerf)));
                (bins.len() - 1, scored)
            }
        };

        let (option, bin) = &mut bins[b];
        let (x, y) = bin.place(scored, piece);
        placed[i] = Some(GreedyPlacement {
            option: *option,
            x,
            y,
            rotated: scored.rotated,
            size: if scored.rotated { piece.rotated() } else { piece },
        });
    }

    placed.into_iter().collect()
}

/// Runs every score strategy and keeps the cheapest layout.
pub fn best_greedy_layout(
    pieces: &[Rect],
    options: &[StockOption<Rect>],
    kerf: u32,
    allow_rotate: bool,
) -> Option<Vec<GreedyPlacement>> {
    ScoreStrategy::ALL
        .into_iter()
        .filter_map(|strategy| greedy_layout(pieces, options, kerf, allow_rotate, strategy))
        .min_by_key(|layout| {
            let mut used: Vec<usize> = layout.iter().map(|p| p.option).collect();
            used.sort_unstable();
            used.dedup();
            used.iter()
                .map(|&s| options[s].scaled_price().scaled())
                .sum::<i64>()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::generate_options;
    use crate::types::StockType;

    fn sheets(w: u32, h: u32, price: f64, count: u32) -> Vec<StockOption<Rect>> {
        generate_options(&[StockType::new("sheet", Rect::new(w, h), price, count)], false)
    }

    #[test]
    fn test_place_single_piece() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 0);
        let piece = Rect::new(50, 30);
        let scored = bin
            .find_best(piece, false, ScoreStrategy::BestAreaFit)
            .unwrap();
        assert_eq!(bin.place(scored, piece), (0, 0));
        assert!(!bin.free_rects.is_empty());
    }

    #[test]
    fn test_piece_too_large() {
        let bin = GuillotineBin::new(Rect::new(100, 100), 0);
        assert!(
            bin.find_best(Rect::new(200, 50), false, ScoreStrategy::BestAreaFit)
                .is_none()
        );
    }

    #[test]
    fn test_rotation_fit() {
        let bin = GuillotineBin::new(Rect::new(100, 50), 0);
        let piece = Rect::new(50, 100);
        assert!(
            bin.find_best(piece, false, ScoreStrategy::BestAreaFit)
                .is_none()
        );
        let scored = bin
            .find_best(piece, true, ScoreStrategy::BestAreaFit)
            .unwrap();
        assert!(scored.rotated);
    }

    #[test]
    fn test_kerf_shrinks_unit_and_gaps() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 5);
        // 95x95 usable after the trailing kerf.
        assert!(
            bin.find_best(Rect::new(96, 10), false, ScoreStrategy::BestAreaFit)
                .is_none()
        );
        let piece = Rect::new(50, 95);
        let scored = bin
            .find_best(piece, false, ScoreStrategy::BestAreaFit)
            .unwrap();
        bin.place(scored, piece);
        // 95 - 50 - 5
        assert!(bin.free_rects.iter().any(|f| f.x == 55 && f.rect.w == 40));
    }

    #[test]
    fn test_fill_exact() {
        let mut bin = GuillotineBin::new(Rect::new(100, 100), 0);
        let piece = Rect::new(100, 100);
        let scored = bin
            .find_best(piece, false, ScoreStrategy::BestAreaFit)
            .unwrap();
        bin.place(scored, piece);
        assert!(bin.free_rects.is_empty());
    }

    #[test]
    fn test_greedy_shares_one_sheet() {
        let pieces = [Rect::new(600, 400), Rect::new(400, 600)];
        let layout = best_greedy_layout(&pieces, &sheets(1000, 1000, 100.0, 2), 0, true).unwrap();
        assert!(layout.iter().all(|p| p.option == 0));
        let (a, b) = (layout[0], layout[1]);
        let apart = a.x + a.size.w <= b.x
            || b.x + b.size.w <= a.x
            || a.y + a.size.h <= b.y
            || b.y + b.size.h <= a.y;
        assert!(apart);
    }

    #[test]
    fn test_greedy_opens_cheapest_fitting_unit() {
        let options = generate_options(
            &[
                StockType::new("big", Rect::new(1000, 1000), 100.0, 1),
                StockType::new("small", Rect::new(300, 300), 10.0, 1),
            ],
            false,
        );
        let layout = greedy_layout(
            &[Rect::new(200, 200), Rect::new(800, 800)],
            &options,
            0,
            false,
            ScoreStrategy::BestAreaFit,
        )
        .unwrap();
        assert_eq!(layout[0].option, 0);
        assert_eq!(layout[1].option, 0);

        let layout = greedy_layout(
            &[Rect::new(200, 200)],
            &options,
            0,
            false,
            ScoreStrategy::BestAreaFit,
        )
        .unwrap();
        assert_eq!(layout[0].option, 1);
    }

    #[test]
    fn test_greedy_gives_up_on_oversize_piece() {
        let options = sheets(1000, 1000, 1.0, 3);
        assert!(best_greedy_layout(&[Rect::new(1001, 10)], &options, 0, true).is_none());
    }
}
