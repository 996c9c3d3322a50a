use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use stock_planner::boards::{self, BoardPlan, BoardProblem, BoardStock};
use stock_planner::sheets::{self, SheetPlan, SheetProblem, SheetStock};
use stock_planner::walls::{self, WallBoard, WallProblem};
use stock_planner::{Money, Rect, SolveStatus, SolverConfig, VariantKind};

fn assert_boards_valid(problem: &BoardProblem, plan: &BoardPlan) {
    let k = problem.kerf;
    let mut seen = vec![0; problem.pieces.len()];
    for group in plan.groups() {
        assert!(!group.placements.is_empty());
        for p in &group.placements {
            seen[p.piece] += 1;
            assert!(p.length + k <= group.size);
            assert!(p.offset + p.length <= group.size);
        }
        let mut sorted = group.placements.clone();
        sorted.sort_by_key(|p| p.offset);
        for pair in sorted.windows(2) {
            assert!(pair[0].offset + pair[0].length + k <= pair[1].offset);
        }
        let used: u32 = group.placements.iter().map(|p| p.length + k).sum();
        assert!(used <= group.size + k);
    }
    assert!(seen.iter().all(|&n| n == 1), "pieces placed {seen:?}");
    let cost: Money = plan.groups().iter().map(|g| g.price).sum();
    assert_eq!(plan.total_cost(), Some(cost));
}

fn assert_sheets_valid(problem: &SheetProblem, plan: &SheetPlan) {
    let k = problem.kerf;
    let mut seen = vec![0; problem.pieces.len()];
    for group in plan.groups() {
        for p in &group.placements {
            seen[p.piece] += 1;
            assert!(p.x + p.width + k <= group.size.w);
            assert!(p.y + p.height + k <= group.size.h);
        }
        for (n, a) in group.placements.iter().enumerate() {
            for b in &group.placements[n + 1..] {
                assert!(
                    a.x + a.width + k <= b.x
                        || b.x + b.width + k <= a.x
                        || a.y + a.height + k <= b.y
                        || b.y + b.height + k <= a.y
                );
            }
        }
    }
    assert!(seen.iter().all(|&n| n == 1), "pieces placed {seen:?}");
    let cost: Money = plan.groups().iter().map(|g| g.price).sum();
    assert_eq!(plan.total_cost(), Some(cost));
}

#[test]
fn single_board_exact_fit() {
    let problem = BoardProblem {
        stock: vec![BoardStock::new("600mm", 600, 29.70, 1)],
        pieces: vec![600],
        kerf: 0,
    };
    let plan = boards::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_eq!(plan.total_cost().map(Money::to_decimal), Some(29.70));
    let group = &plan.groups()[0];
    assert_eq!(group.placements.len(), 1);
    assert_eq!(group.placements[0].offset, 0);
}

#[test]
fn boards_mixed_stock_is_valid_and_optimal() {
    let problem = BoardProblem {
        stock: vec![
            BoardStock::new("600mm", 600, 29.70, 2),
            BoardStock::new("1200mm", 1200, 65.01, 2),
            BoardStock::new("800mm", 800, 40.00, 2),
        ],
        pieces: vec![500, 350, 300, 250],
        kerf: 0,
    };
    let plan = boards::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_boards_valid(&problem, &plan);
    // 500+300 on an 800 and 350+250 on a 600.
    assert_eq!(plan.total_cost(), Some(Money::from_scaled(4000 + 2970)));
}

#[test]
fn boards_kerf_is_monotone() {
    let stock = vec![
        BoardStock::new("600mm", 600, 29.70, 3),
        BoardStock::new("1200mm", 1200, 65.01, 1),
    ];
    let mut last = Money::ZERO;
    for kerf in [0, 2, 5, 60] {
        let problem = BoardProblem {
            stock: stock.clone(),
            pieces: vec![400, 300, 200, 150],
            kerf,
        };
        let plan = boards::solve(&problem, &SolverConfig::default()).unwrap();
        assert_eq!(plan.status, SolveStatus::Optimal, "kerf {kerf}");
        assert_boards_valid(&problem, &plan);
        let cost = plan.total_cost().unwrap();
        assert!(cost >= last, "kerf {kerf}: {cost} < {last}");
        last = cost;
    }
}

#[test]
fn boards_kerf_counts_between_pieces_only() {
    // 250 + 4 + 192 + 4 + 150 = 600, cut longest first.
    let problem = BoardProblem {
        stock: vec![
            BoardStock::new("600mm", 600, 29.70, 1),
            BoardStock::new("1200mm", 1200, 65.01, 1),
        ],
        pieces: vec![150, 250, 192],
        kerf: 4,
    };
    let plan = boards::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_eq!(plan.total_cost(), Some(Money::from_decimal(29.70)));
    assert_boards_valid(&problem, &plan);
    let offsets: Vec<u32> = plan.groups()[0].placements.iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![450, 0, 254]);
}

#[test]
fn boards_oversize_piece_is_infeasible() {
    let problem = BoardProblem {
        stock: vec![BoardStock::new("600mm", 600, 29.70, 4)],
        pieces: vec![100, 700],
        kerf: 0,
    };
    let plan = boards::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Infeasible);
    assert!(plan.groups().is_empty());
    assert_eq!(plan.total_cost(), None);
}

#[test]
fn sheets_two_rotated_pieces_share_a_sheet() {
    let problem = SheetProblem::new(
        vec![SheetStock::new("board", 1000, 1000, 100.0, 1)],
        vec![Rect::new(600, 400), Rect::new(400, 600)],
    );
    let plan = sheets::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_eq!(plan.total_cost(), Some(Money::from_decimal(100.0)));
    assert_sheets_valid(&problem, &plan);

    let mut crowded = problem.clone();
    crowded.pieces.push(Rect::new(1000, 1000));
    let plan = sheets::solve(&crowded, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Infeasible);
    assert!(plan.layout.is_none());
}

#[test]
fn sheets_quarter_variant_wins_on_price() {
    let problem = SheetProblem::new(
        vec![SheetStock::new("mdf", 800, 400, 40.0, 1)],
        vec![Rect::new(400, 200)],
    )
    .with_sub_variants(true);
    let plan = sheets::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Optimal);
    assert_eq!(plan.total_cost(), Some(Money::from_decimal(10.0)));
    assert_eq!(plan.groups()[0].variant, VariantKind::Quarter);
    assert_sheets_valid(&problem, &plan);
}

#[test]
fn sheets_piece_larger_than_every_sheet_is_infeasible() {
    let problem = SheetProblem::new(
        vec![
            SheetStock::new("a", 500, 300, 10.0, 2),
            SheetStock::new("b", 300, 500, 10.0, 2),
        ],
        vec![Rect::new(510, 310)],
    );
    let plan = sheets::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Infeasible);
}

#[test]
fn sheets_mixed_pieces_are_valid() {
    let problem = SheetProblem::new(
        vec![
            SheetStock::new("full", 1200, 800, 60.0, 2),
            SheetStock::new("small", 600, 400, 20.0, 2),
        ],
        vec![
            Rect::new(500, 300),
            Rect::new(300, 500),
            Rect::new(600, 200),
            Rect::new(200, 200),
        ],
    )
    .with_kerf(3);
    let plan = sheets::solve(&problem, &SolverConfig::default().with_node_limit(20_000)).unwrap();
    assert!(plan.status.has_solution());
    assert_sheets_valid(&problem, &plan);
}

#[test]
fn wall_scenario() {
    let problem = WallProblem {
        walls: vec![1000],
        boards: vec![WallBoard::new("600mm", 600, 50.0)],
        min_piece_length: 200,
    };
    let plan = walls::solve(&problem, &SolverConfig::default()).unwrap();
    assert_eq!(plan.status, SolveStatus::Optimal);
    let cover = &plan.walls[0];
    assert_eq!((cover.board_count, cover.remainder), (2, 400));
    assert_eq!(plan.total_cost, Some(Money::from_decimal(100.0)));
}

#[test]
fn cancelled_search_reports_unknown() {
    let problem = WallProblem {
        walls: vec![5500, 4200],
        boards: vec![
            WallBoard::new("2000", 2000, 50.0),
            WallBoard::new("3000", 3000, 70.0),
        ],
        min_piece_length: 200,
    };
    let config = SolverConfig {
        check_interval: 1,
        ..SolverConfig::default()
    };
    let cancel = Arc::new(AtomicBool::new(true));
    let plan = walls::solve_cancellable(&problem, &config, cancel).unwrap();
    assert_eq!(plan.status, SolveStatus::Unknown);
    assert!(plan.walls.is_empty());
}

#[test]
fn configuration_errors_fail_fast() {
    let problem = BoardProblem {
        stock: vec![BoardStock::new("600mm", 600, -1.0, 1)],
        pieces: vec![100],
        kerf: 0,
    };
    let err = boards::solve(&problem, &SolverConfig::default()).unwrap_err();
    assert!(err.is_configuration());
}
