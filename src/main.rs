use clap::{Args, Parser, Subcommand};
use stock_planner::boards::{self, BoardProblem, BoardStock};
use stock_planner::sheets::{self, SheetProblem, SheetStock};
use stock_planner::walls::{self, WallBoard, WallProblem};
use stock_planner::{Rect, SolverConfig, render};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stock_planner",
    about = "Minimum-cost cutting plans for boards, sheets and walls"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cut lengths from boards
    Boards {
        /// Stock as id:length:price[:count] (e.g. 600mm:600:29.70:5)
        #[arg(long, num_args = 1.., required = true, value_parser = parse_board_stock)]
        stock: Vec<BoardStock>,

        /// Piece lengths as length[:qty] (e.g. 832:3 110)
        #[arg(long, num_args = 1.., value_parser = parse_length)]
        pieces: Vec<(u32, u32)>,

        /// Blade kerf in mm
        #[arg(long, default_value_t = 0)]
        kerf: u32,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Cut rectangles from sheets
    Sheets {
        /// Stock as id:WxH:price[:count] (e.g. mdf:2800x2070:180:2)
        #[arg(long, num_args = 1.., required = true, value_parser = parse_sheet_stock)]
        stock: Vec<SheetStock>,

        /// Pieces as WxH[:qty] (e.g. 800x600:3 400x300)
        #[arg(long, num_args = 1.., value_parser = parse_rect_qty)]
        pieces: Vec<(Rect, u32)>,

        /// Blade kerf in mm
        #[arg(long, default_value_t = 0)]
        kerf: u32,

        /// Disable piece rotation
        #[arg(long)]
        no_rotate: bool,

        /// Also offer half and quarter sheets at proportional price
        #[arg(long)]
        sub_variants: bool,

        /// Request guillotine cuts (accepted, not enforced)
        #[arg(long)]
        guillotine: bool,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Cover walls end to end with boards of one type each
    Walls {
        /// Wall lengths in mm
        #[arg(long, num_args = 1.., required = true)]
        walls: Vec<u32>,

        /// Board types as id:length:price (e.g. listwa_2500:2500:60)
        #[arg(long, num_args = 1.., required = true, value_parser = parse_wall_board)]
        boards: Vec<WallBoard>,

        /// Shortest usable remainder of the last board, in mm
        #[arg(long, default_value_t = 200)]
        min_piece: u32,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Stop the search after this many milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Stop the search after this many nodes
    #[arg(long)]
    node_limit: Option<u64>,

    /// Show ASCII layout of each used unit
    #[arg(long)]
    layout: bool,

    /// Print the plan as JSON instead of text
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn config(&self) -> SolverConfig {
        SolverConfig {
            time_limit_ms: self.time_limit_ms,
            node_limit: self.node_limit,
            ..SolverConfig::default()
        }
    }
}

fn split_fields(s: &str, min: usize, max: usize, expected: &str) -> Result<Vec<String>, String> {
    let parts: Vec<String> = s.split(':').map(str::to_string).collect();
    if parts.len() < min || parts.len() > max {
        return Err(format!("invalid value '{}', expected {}", s, expected));
    }
    Ok(parts)
}

fn parse_number<T: std::str::FromStr>(s: &str, what: &str, input: &str) -> Result<T, String> {
    s.parse::<T>()
        .map_err(|_| format!("invalid {} in '{}'", what, input))
}

fn parse_count(parts: &[String], index: usize, input: &str) -> Result<u32, String> {
    let count = match parts.get(index) {
        Some(c) => parse_number(c, "quantity", input)?,
        None => 1,
    };
    if count == 0 {
        return Err(format!("quantity must be non-zero in '{}'", input));
    }
    Ok(count)
}

fn parse_dimensions(s: &str) -> Result<Rect, String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!("invalid dimensions '{}', expected WxH", s));
    }
    let w = parse_number(parts[0], "width", s)?;
    let h = parse_number(parts[1], "height", s)?;
    if w == 0 || h == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok(Rect::new(w, h))
}

fn parse_length(s: &str) -> Result<(u32, u32), String> {
    let parts = split_fields(s, 1, 2, "length[:qty]")?;
    let length = parse_number(&parts[0], "length", s)?;
    Ok((length, parse_count(&parts, 1, s)?))
}

fn parse_rect_qty(s: &str) -> Result<(Rect, u32), String> {
    let parts = split_fields(s, 1, 2, "WxH[:qty]")?;
    Ok((parse_dimensions(&parts[0])?, parse_count(&parts, 1, s)?))
}

fn parse_board_stock(s: &str) -> Result<BoardStock, String> {
    let parts = split_fields(s, 3, 4, "id:length:price[:count]")?;
    Ok(BoardStock::new(
        parts[0].clone(),
        parse_number(&parts[1], "length", s)?,
        parse_number(&parts[2], "price", s)?,
        parse_count(&parts, 3, s)?,
    ))
}

fn parse_sheet_stock(s: &str) -> Result<SheetStock, String> {
    let parts = split_fields(s, 3, 4, "id:WxH:price[:count]")?;
    let size = parse_dimensions(&parts[1])?;
    Ok(SheetStock::new(
        parts[0].clone(),
        size.w,
        size.h,
        parse_number(&parts[2], "price", s)?,
        parse_count(&parts, 3, s)?,
    ))
}

fn parse_wall_board(s: &str) -> Result<WallBoard, String> {
    let parts = split_fields(s, 3, 3, "id:length:price")?;
    Ok(WallBoard::new(
        parts[0].clone(),
        parse_number(&parts[1], "length", s)?,
        parse_number(&parts[2], "price", s)?,
    ))
}

fn expand<T: Copy>(items: &[(T, u32)]) -> Vec<T> {
    items
        .iter()
        .flat_map(|&(item, qty)| std::iter::repeat_n(item, qty as usize))
        .collect()
}

fn print_plan<T: serde::Serialize>(plan: &T, json: bool, text: impl FnOnce() -> String) {
    if json {
        match serde_json::to_string_pretty(plan) {
            Ok(s) => println!("{s}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        print!("{}", text());
    }
}

fn fail(e: stock_planner::PlanError) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let has_solution = match cli.command {
        Command::Boards {
            stock,
            pieces,
            kerf,
            run,
        } => {
            let problem = BoardProblem {
                stock,
                pieces: expand(&pieces),
                kerf,
            };
            let plan = boards::solve(&problem, &run.config()).unwrap_or_else(|e| fail(e));
            print_plan(&plan, run.json, || render::board_report(&plan, run.layout));
            plan.status.has_solution()
        }
        Command::Sheets {
            stock,
            pieces,
            kerf,
            no_rotate,
            sub_variants,
            guillotine,
            run,
        } => {
            let problem = SheetProblem {
                stock,
                pieces: expand(&pieces),
                kerf,
                allow_rotate: !no_rotate,
                allow_sub_variants: sub_variants,
                guillotine,
            };
            let plan = sheets::solve(&problem, &run.config()).unwrap_or_else(|e| fail(e));
            print_plan(&plan, run.json, || render::sheet_report(&plan, run.layout));
            plan.status.has_solution()
        }
        Command::Walls {
            walls: lengths,
            boards: types,
            min_piece,
            run,
        } => {
            let problem = WallProblem {
                walls: lengths,
                boards: types,
                min_piece_length: min_piece,
            };
            let plan = walls::solve(&problem, &run.config()).unwrap_or_else(|e| fail(e));
            print_plan(&plan, run.json, || render::wall_report(&plan, run.layout));
            plan.status.has_solution()
        }
    };

    if !has_solution {
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_board_stock() {
        let s = parse_board_stock("600mm:600:29.70:5").unwrap();
        assert_eq!(s, BoardStock::new("600mm", 600, 29.70, 5));
        assert_eq!(parse_board_stock("600mm:600:29.70").unwrap().count, 1);
        assert!(parse_board_stock("600mm:600").is_err());
        assert!(parse_board_stock("600mm:600:29.70:0").is_err());
    }

    #[test]
    fn test_parse_sheet_pieces() {
        assert_eq!(parse_rect_qty("800x600:3").unwrap(), (Rect::new(800, 600), 3));
        assert_eq!(parse_rect_qty("400x300").unwrap(), (Rect::new(400, 300), 1));
        assert!(parse_rect_qty("400x0").is_err());
        assert_eq!(expand(&[(Rect::new(1, 2), 2)]).len(), 2);
    }

    #[test]
    fn test_parse_sheets_command() {
        let cli = Cli::try_parse_from([
            "stock_planner",
            "sheets",
            "--stock",
            "mdf:800x400:40",
            "--pieces",
            "400x200",
            "--sub-variants",
            "--layout",
        ])
        .unwrap();
        match cli.command {
            Command::Sheets {
                stock,
                sub_variants,
                run,
                ..
            } => {
                assert_eq!(stock[0].size(), Rect::new(800, 400));
                assert!(sub_variants);
                assert!(run.layout);
            }
            _ => panic!("expected sheets"),
        }
    }
}
