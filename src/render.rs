//! Plain-text diagrams and summaries of solved plans.

use crate::boards::{BoardPlacement, BoardPlan};
use crate::sheets::{SheetPlacement, SheetPlan};
use crate::solver::SolveStatus;
use crate::types::{Money, Rect};
use crate::walls::{WallCover, WallPlan};
use std::fmt::Write;

const MAX_WIDTH: f64 = 80.0;
const MAX_HEIGHT: f64 = 40.0;

pub fn render_sheet(stock: Rect, placements: &[SheetPlacement]) -> String {
    let scale = f64::min(MAX_WIDTH / stock.w as f64, MAX_HEIGHT / stock.h as f64);
    let grid_w = (stock.w as f64 * scale).round() as usize;
    let grid_h = (stock.h as f64 * scale).round() as usize;

    if grid_w == 0 || grid_h == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; grid_w + 1]; grid_h + 1];
    draw_rect(&mut grid, 0, 0, grid_w, grid_h);

    for p in placements {
        let sx = (p.x as f64 * scale).round() as usize;
        let sy = (p.y as f64 * scale).round() as usize;
        let sw = (p.width as f64 * scale).round() as usize;
        let sh = (p.height as f64 * scale).round() as usize;

        if sw == 0 || sh == 0 {
            continue;
        }

        draw_rect(&mut grid, sx, sy, sw, sh);

        let rot = if p.rotated { "r" } else { "" };
        let label: Vec<char> = format!("P{}{} {}", p.piece, rot, p.size()).chars().collect();
        if sw > 2 && sh > 0 {
            let cx = sx + sw / 2;
            let cy = sy + sh / 2;
            let start_x = cx.saturating_sub(label.len() / 2);

            for (i, &ch) in label.iter().enumerate() {
                let x = start_x + i;
                if x > sx && x < sx + sw && cy > sy && cy < sy + sh {
                    grid[cy][x] = ch;
                }
            }
        }
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

#[allow(clippy::needless_range_loop)]
fn draw_rect(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    let rows = grid.len();
    let cols = if rows > 0 { grid[0].len() } else { return };
    let join = |c: char, edge: char| match (c, edge) {
        ('+', _) => '+',
        ('|', '-') | ('-', '|') => '+',
        _ => edge,
    };

    for i in x..=x + w {
        if i >= cols {
            break;
        }
        for j in [y, y + h] {
            if j < rows {
                grid[j][i] = join(grid[j][i], '-');
            }
        }
    }

    for j in y..=y + h {
        if j >= rows {
            break;
        }
        for i in [x, x + w] {
            if i < cols {
                grid[j][i] = join(grid[j][i], '|');
            }
        }
    }

    for cx in [x, x + w] {
        for cy in [y, y + h] {
            if cy < rows && cx < cols {
                grid[cy][cx] = '+';
            }
        }
    }
}

/// One-line bar of `total` units with labelled spans, plus a label line.
fn render_bar(total: u32, spans: &[(u32, u32, String)]) -> String {
    if total == 0 {
        return String::new();
    }
    let scale = MAX_WIDTH / total as f64;
    let width = ((total as f64 * scale).round() as usize).max(1);
    let mut bar = vec!['.'; width];
    let mut labels = vec![' '; width];

    for (start, len, label) in spans {
        let sx = ((*start as f64 * scale).round() as usize).min(width - 1);
        let ex = (((start + len) as f64 * scale).round() as usize).clamp(sx + 1, width);
        bar[sx..ex].fill('=');
        bar[sx] = '[';
        if ex - sx >= 2 {
            bar[ex - 1] = ']';
        }
        for (k, ch) in label.chars().take(ex - sx).enumerate() {
            labels[sx + k] = ch;
        }
    }

    let bar: String = bar.into_iter().collect();
    let labels: String = labels.into_iter().collect();
    format!("{bar}\n{}\n", labels.trim_end())
}

pub fn render_board(length: u32, placements: &[BoardPlacement]) -> String {
    let spans: Vec<(u32, u32, String)> = placements
        .iter()
        .map(|p| (p.offset, p.length, format!("P{}", p.piece)))
        .collect();
    render_bar(length, &spans)
}

pub fn render_wall(cover: &WallCover) -> String {
    let spans: Vec<(u32, u32, String)> = cover
        .segments()
        .iter()
        .map(|s| (s.start, s.length, format!("#{}", s.board)))
        .collect();
    render_bar(cover.wall_length, &spans)
}

pub fn board_report(plan: &BoardPlan, layout: bool) -> String {
    let mut out = String::new();
    for group in plan.groups() {
        let _ = writeln!(
            out,
            "{} ({} mm, {}):",
            group.option_id, group.size, group.price
        );
        for p in &group.placements {
            let _ = writeln!(out, "  P{} {} mm @ {}", p.piece, p.length, p.offset);
        }
        let _ = writeln!(out, "  waste: {} mm", group.waste());
        if layout {
            out.push_str(&render_board(group.size, &group.placements));
        }
        out.push('\n');
    }
    push_summary(&mut out, plan.status, plan.groups().len(), plan.total_cost());
    out
}

pub fn sheet_report(plan: &SheetPlan, layout: bool) -> String {
    let mut out = String::new();
    for group in plan.groups() {
        let _ = writeln!(
            out,
            "{} ({}, {}, {}):",
            group.option_id, group.variant, group.size, group.price
        );
        for p in &group.placements {
            let rot = if p.rotated { " [rotated]" } else { "" };
            let _ = writeln!(out, "  P{} {} @ ({}, {}){}", p.piece, p.size(), p.x, p.y, rot);
        }
        let _ = writeln!(out, "  waste: {} mm²", group.waste());
        if layout {
            out.push_str(&render_sheet(group.size, &group.placements));
        }
        out.push('\n');
    }
    push_summary(&mut out, plan.status, plan.groups().len(), plan.total_cost());
    out
}

pub fn wall_report(plan: &WallPlan, layout: bool) -> String {
    let mut out = String::new();
    for cover in &plan.walls {
        let _ = writeln!(
            out,
            "Wall {} ({} mm): {} x {} ({} mm), cost {}",
            cover.wall + 1,
            cover.wall_length,
            cover.board_count,
            cover.board_id,
            cover.board_length,
            cover.cost
        );
        for s in cover.segments() {
            let kind = if s.full { "whole" } else { "cut" };
            let _ = writeln!(
                out,
                "  {}_{}: {} {}-{} mm",
                cover.board_id,
                s.board,
                kind,
                s.start,
                s.start + s.length
            );
        }
        if layout {
            out.push_str(&render_wall(cover));
        }
        out.push('\n');
    }
    let boards: u32 = plan.walls.iter().map(|c| c.board_count).sum();
    push_summary(&mut out, plan.status, boards as usize, plan.total_cost);
    out
}

fn push_summary(out: &mut String, status: SolveStatus, units: usize, cost: Option<Money>) {
    match cost {
        Some(cost) => {
            let _ = writeln!(
                out,
                "Summary: {status}, {units} unit{} used, total cost {cost}",
                if units == 1 { "" } else { "s" },
            );
        }
        None => {
            let _ = writeln!(out, "Summary: {status}, no layout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SearchStats;

    fn placement(piece: usize, x: u32, y: u32, w: u32, h: u32) -> SheetPlacement {
        SheetPlacement {
            piece,
            stock_option: 0,
            x,
            y,
            rotated: false,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_render_single_piece() {
        let output = render_sheet(Rect::new(100, 50), &[placement(0, 0, 0, 100, 50)]);
        assert!(output.contains('+'));
        assert!(output.contains('-'));
        assert!(output.contains('|'));
        assert!(output.contains("P0 100x50"));
    }

    #[test]
    fn test_render_two_pieces() {
        let placements = [placement(0, 0, 0, 50, 100), placement(1, 50, 0, 50, 100)];
        let output = render_sheet(Rect::new(100, 100), &placements);
        assert!(output.contains("P1 50x100"));
    }

    #[test]
    fn test_render_empty() {
        let output = render_sheet(Rect::new(100, 100), &[]);
        assert!(output.contains('+'));
    }

    #[test]
    fn test_board_bar_marks_pieces_and_waste() {
        let placements = [
            BoardPlacement {
                piece: 0,
                stock_option: 0,
                offset: 0,
                length: 300,
            },
            BoardPlacement {
                piece: 1,
                stock_option: 0,
                offset: 300,
                length: 150,
            },
        ];
        let output = render_board(600, &placements);
        let bar = output.lines().next().unwrap();
        assert_eq!(bar.chars().count(), 80);
        assert!(bar.starts_with("[="));
        assert!(bar.ends_with('.'));
        assert!(output.lines().nth(1).unwrap().starts_with("P0"));
    }

    #[test]
    fn test_wall_bar_has_no_waste() {
        let cover = WallCover {
            wall: 0,
            wall_length: 1000,
            board_type: 0,
            board_id: "600mm".into(),
            board_length: 600,
            board_count: 2,
            remainder: 400,
            cost: Money::from_scaled(10000),
        };
        let output = render_wall(&cover);
        assert!(!output.lines().next().unwrap().contains('.'));
        assert!(output.contains("#2"));
    }

    #[test]
    fn test_report_without_layout() {
        let plan = BoardPlan::without_layout(SolveStatus::Infeasible, SearchStats::default());
        assert_eq!(board_report(&plan, true), "Summary: infeasible, no layout\n");
    }
}
