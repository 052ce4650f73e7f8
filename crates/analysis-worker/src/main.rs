//! Analysis Worker
//!
//! Imports games, runs the engine analysis pipeline and verifies quiz answers.
//! `run` polls Postgres for games that have not been analysed yet.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use analysis_worker::config::{AnalysisConfig, WorkerConfig};
use analysis_worker::engine::{health_check, Oracle, StockfishEngine};
use analysis_worker::highlights::reclassify_game;
use analysis_worker::import::{import_pgn, ImportSource};
use analysis_worker::pipeline::reanalyse_game;
use analysis_worker::store::{create_pool, run_migrations, PgStore, Store};
use analysis_worker::tasks::create_task_from_highlight;
use analysis_worker::verifier::{verify_task_answer, Answer};
use analysis_worker::worker::{analyse_with_fresh_oracle, StockfishLauncher, WorkerPool};

#[derive(Parser)]
#[command(name = "analysis-worker", about = "Engine analysis and tactics tasks for chess games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a PGN file
    ImportPgn {
        file: PathBuf,
        /// Source label stored with the game (default: chess_com for chess.com links, else pgn)
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        external_id: Option<String>,
        #[arg(long)]
        url: Option<String>,
    },
    /// Run the full pipeline on one game
    AnalyseGame { game_id: i64 },
    /// Replace a game's highlights using the current thresholds
    Reclassify { game_id: i64 },
    /// Discard a game's analysis and run the pipeline again
    Reanalyse {
        game_id: i64,
        /// Also delete the game's tasks and their responses
        #[arg(long)]
        clear_tasks: bool,
    },
    /// Create a quiz task from a highlight
    CreateTask {
        highlight_id: i64,
        #[arg(long, default_value_t = 1)]
        user_id: i64,
    },
    /// Check an answer to a task
    VerifyTask {
        task_id: i64,
        /// Proposed move in UCI notation, e.g. e2e4
        uci: String,
        #[arg(long, default_value_t = 1)]
        user_id: i64,
        #[arg(long, default_value_t = 0)]
        response_ms: i32,
    },
    /// Start the engine and search the initial position
    EngineHealth,
    /// Poll for unanalysed games until idle or SIGTERM
    Run,
}

async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgStore> {
    let pool = create_pool(database_url, max_connections)
        .await
        .context("connecting to database")?;
    run_migrations(&pool).await.context("running migrations")?;
    Ok(PgStore::new(pool))
}

async fn connect_from_env() -> anyhow::Result<PgStore> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    connect(&url, 4).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ImportPgn {
            file,
            source,
            external_id,
            url,
        } => {
            let pgn = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let store = connect_from_env().await?;
            let source = ImportSource {
                external_source: source,
                external_game_id: external_id,
                url,
            };
            let result = import_pgn(&store, &pgn, source).await?;
            println!("game_id={} created={}", result.game_id, result.created);
        }
        Commands::AnalyseGame { game_id } => {
            let config = AnalysisConfig::from_env()?;
            let store = connect_from_env().await?;
            let launcher = StockfishLauncher::new(config.engine.clone());
            let report = analyse_with_fresh_oracle(&store, &launcher, &config, game_id).await?;
            println!(
                "game_id={} evaluated={} highlights={} refined={} tasks_created={}",
                report.game_id,
                report.fast.evaluated,
                report.highlights_added,
                report.highlights_refined,
                report.tasks.created
            );
        }
        Commands::Reclassify { game_id } => {
            let config = AnalysisConfig::from_env()?;
            let store = connect_from_env().await?;
            let (removed, written) = reclassify_game(&store, game_id, &config.thresholds).await?;
            println!("game_id={game_id} removed={removed} written={written}");
        }
        Commands::Reanalyse {
            game_id,
            clear_tasks,
        } => {
            let config = AnalysisConfig::from_env()?;
            let store = connect_from_env().await?;
            let mut engine = StockfishEngine::spawn(&config.engine).await?;
            let result = reanalyse_game(&store, &mut engine, &config, game_id, clear_tasks).await;
            engine.shutdown().await;
            let report = result?;
            println!(
                "game_id={} evaluated={} highlights={} tasks_created={}",
                report.game_id, report.fast.evaluated, report.highlights_added, report.tasks.created
            );
        }
        Commands::CreateTask {
            highlight_id,
            user_id,
        } => {
            let store = connect_from_env().await?;
            let created = create_task_from_highlight(&store, highlight_id, user_id).await?;
            println!("task_id={} created={}", created.task_id, created.created);
        }
        Commands::VerifyTask {
            task_id,
            uci,
            user_id,
            response_ms,
        } => {
            let config = AnalysisConfig::from_env()?;
            let store = connect_from_env().await?;
            let answer = Answer {
                task_id,
                user_id,
                move_uci: uci,
                response_ms,
            };
            let mut engine = StockfishEngine::spawn(&config.engine).await?;
            let verdict = verify_task_answer(&store, &mut engine, &config, &answer).await;
            engine.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&verdict?)?);
        }
        Commands::EngineHealth => {
            let config = AnalysisConfig::from_env()?;
            let (path, line) = health_check(&config.engine).await?;
            println!(
                "ok path={} score_cp={} best={} depth={}",
                path.display(),
                line.score_cp,
                line.best_move.as_deref().unwrap_or("-"),
                line.depth
            );
        }
        Commands::Run => run(WorkerConfig::from_env()?).await?,
    }

    Ok(())
}

async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    // headroom for overlapping writes
    let pool_size = (config.max_concurrent_games + 2) as u32;
    let store: Arc<dyn Store> = Arc::new(connect(&config.database_url, pool_size).await?);
    info!(pool_size, "Database connection pool established");

    let launcher = Arc::new(StockfishLauncher::new(config.analysis.engine.clone()));
    let pool = WorkerPool::new(
        store,
        launcher,
        config.analysis.clone(),
        config.max_concurrent_games,
    );

    // Set up SIGTERM handler (Unix only)
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    let mut empty_polls = 0;
    info!(workers = config.max_concurrent_games, "Starting main loop");

    loop {
        // In-flight games always run to completion before a signal is honoured
        match pool.sweep_pending(config.pending_batch).await {
            Ok(report) if report.is_empty() => {
                empty_polls += 1;
                if config.max_empty_polls > 0 && empty_polls >= config.max_empty_polls {
                    info!("No pending games after {} polls, exiting", config.max_empty_polls);
                    break;
                }
            }
            Ok(report) => {
                empty_polls = 0;
                if report.failure_count() > 0 {
                    warn!(
                        analysed = report.analysed.len(),
                        failed = report.failure_count(),
                        "Sweep finished with failures"
                    );
                }
            }
            Err(e) => error!(error = %e, "Failed to list pending games"),
        }

        let idle = tokio::time::sleep(Duration::from_secs(config.poll_interval_secs));

        #[cfg(unix)]
        {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
                _ = idle => {}
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
                _ = idle => {}
            }
        }
    }

    info!("Graceful shutdown complete");
    Ok(())
}
