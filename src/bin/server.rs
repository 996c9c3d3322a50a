use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use stock_planner::boards::{self, BoardPlan, BoardProblem};
use stock_planner::sheets::{self, SheetPlan, SheetProblem};
use stock_planner::walls::{self, WallPlan, WallProblem};
use stock_planner::{PlanError, SolverConfig};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// A problem body plus optional search bounds.
#[derive(Deserialize, Serialize)]
struct PlanRequest<P> {
    #[serde(flatten)]
    problem: P,
    #[serde(default)]
    config: SolverConfig,
}

type ApiError = (StatusCode, String);

type SolveFn<P, T> = fn(&P, &SolverConfig, Arc<AtomicBool>) -> Result<T, PlanError>;

/// Search time allowed when a request sets no time limit of its own.
const DEFAULT_TIME_LIMIT_MS: u64 = 30_000;

fn error_response(e: PlanError) -> ApiError {
    if e.is_configuration() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else {
        tracing::error!(error = %e, "planner returned an inconsistent solution");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
}

fn bounded(mut config: SolverConfig, default_time_limit_ms: u64) -> SolverConfig {
    config.time_limit_ms = config.time_limit_ms.or(Some(default_time_limit_ms));
    config
}

/// Sets the flag when the request future is dropped, e.g. on client disconnect.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Runs a blocking solve off the async workers, bounded in time and
/// cancelled if the caller goes away.
async fn solve_blocking<P, T>(
    req: PlanRequest<P>,
    solve: SolveFn<P, T>,
    default_time_limit_ms: u64,
) -> Result<Json<T>, ApiError>
where
    P: Send + 'static,
    T: Send + 'static,
{
    let config = bounded(req.config, default_time_limit_ms);
    let cancel = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(cancel.clone());
    let problem = req.problem;
    tokio::task::spawn_blocking(move || solve(&problem, &config, cancel))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .map(Json)
        .map_err(error_response)
}

async fn plan_boards(
    Json(req): Json<PlanRequest<BoardProblem>>,
) -> Result<Json<BoardPlan>, ApiError> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /boards"
    );
    solve_blocking(req, boards::solve_cancellable, DEFAULT_TIME_LIMIT_MS).await
}

async fn plan_sheets(
    Json(req): Json<PlanRequest<SheetProblem>>,
) -> Result<Json<SheetPlan>, ApiError> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /sheets"
    );
    solve_blocking(req, sheets::solve_cancellable, DEFAULT_TIME_LIMIT_MS).await
}

async fn plan_walls(
    Json(req): Json<PlanRequest<WallProblem>>,
) -> Result<Json<WallPlan>, ApiError> {
    tracing::info!(
        body = serde_json::to_string(&req).unwrap_or_default(),
        "POST /walls"
    );
    solve_blocking(req, walls::solve_cancellable, DEFAULT_TIME_LIMIT_MS).await
}

fn app() -> Router {
    Router::new()
        .route("/up", get(|| async { "ok" }))
        .route("/boards", post(plan_boards))
        .route("/sheets", post(plan_sheets))
        .route("/walls", post(plan_walls))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

fn main() {
    // Sentry is disabled unless SENTRY_DSN is set.
    let _sentry = sentry::init((
        std::env::var("SENTRY_DSN").ok(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    ));

    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("development.log")
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("failed to open development.log: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_max_level(Level::INFO)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(serve()) {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}

async fn serve() -> std::io::Result<()> {
    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("Listening on {addr}");
    axum::serve(listener, app()).await
}
