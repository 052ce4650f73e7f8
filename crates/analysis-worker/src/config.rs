//! Worker configuration from environment variables

use std::env;
use std::str::FromStr;

use tracing::info;

use crate::classifier::Thresholds;
use crate::error::WorkerError;

/// Engine process settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Explicit binary path; when unset the usual install locations are searched
    pub engine_path: Option<String>,

    /// Name recorded on every evaluation row
    pub engine_name: String,

    pub threads: u32,
    pub hash_mb: u32,

    /// Per-position budget for the fast pass
    pub fast_movetime_ms: u64,

    /// Per-position budget for deep refinement and verification
    pub deep_movetime_ms: u64,
    pub deep_multipv: u32,

    /// Extra time allowed past movetime before the engine counts as hung
    pub response_grace_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            engine_path: None,
            engine_name: "stockfish".to_string(),
            threads: 2,
            hash_mb: 256,
            fast_movetime_ms: 40,
            deep_movetime_ms: 400,
            deep_multipv: 3,
            response_grace_ms: 5_000,
        }
    }
}

/// Everything the analysis passes need, independent of where jobs come from.
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    pub engine: EngineConfig,
    pub thresholds: Thresholds,

    /// Owner of tasks generated by the pipeline
    pub task_user_id: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            thresholds: Thresholds::default(),
            task_user_id: 1,
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Result<Self, WorkerError> {
        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            engine_path: env::var("ENGINE_PATH").ok().filter(|p| !p.trim().is_empty()),
            engine_name: env::var("ENGINE_NAME").unwrap_or(defaults.engine_name),
            threads: env_or("ENGINE_THREADS", defaults.threads),
            hash_mb: env_or("ENGINE_HASH_MB", defaults.hash_mb),
            fast_movetime_ms: env_or("ENGINE_FAST_MOVETIME_MS", defaults.fast_movetime_ms),
            deep_movetime_ms: env_or("ENGINE_DEEP_MOVETIME_MS", defaults.deep_movetime_ms),
            deep_multipv: env_or("ENGINE_DEEP_MULTIPV", defaults.deep_multipv),
            response_grace_ms: env_or("ENGINE_RESPONSE_GRACE_MS", defaults.response_grace_ms),
        };

        let t = Thresholds::default();
        let thresholds = Thresholds {
            brilliant_cp: env_or("THRESH_BRILLIANT_CP", t.brilliant_cp),
            great_cp: env_or("THRESH_GREAT_CP", t.great_cp),
            inaccuracy_cp: env_or("THRESH_INACCURACY_CP", t.inaccuracy_cp),
            mistake_cp: env_or("THRESH_MISTAKE_CP", t.mistake_cp),
            blunder_cp: env_or("THRESH_BLUNDER_CP", t.blunder_cp),
            near_best_tolerance_cp: env_or("THRESH_NEAR_BEST_TOL_CP", t.near_best_tolerance_cp),
        };
        thresholds.validate()?;

        if engine.deep_multipv == 0 {
            return Err(WorkerError::Config("ENGINE_DEEP_MULTIPV must be at least 1"));
        }

        Ok(Self {
            engine,
            thresholds,
            task_user_id: env_or("TASK_USER_ID", 1),
        })
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Database connection URL
    pub database_url: String,

    pub analysis: AnalysisConfig,

    /// Games analysed at once, each with its own engine process
    pub max_concurrent_games: usize,

    /// Pending games fetched per poll
    pub pending_batch: i64,

    pub poll_interval_secs: u64,

    /// Consecutive empty polls before exiting (0 = never exit)
    pub max_empty_polls: u32,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| WorkerError::Config("DATABASE_URL not set"))?;

        let analysis = AnalysisConfig::from_env()?;

        let max_concurrent_games = env_or("MAX_CONCURRENT_GAMES", num_cpus::get()).max(1);
        let pending_batch = env_or("PENDING_BATCH", 5_i64).max(1);
        let poll_interval_secs = env_or("POLL_INTERVAL_SECS", 10);
        let max_empty_polls = env_or("MAX_EMPTY_POLLS", 5);

        info!(
            max_concurrent_games,
            pending_batch,
            engine = %analysis.engine.engine_name,
            "Loaded worker configuration"
        );

        Ok(Self {
            database_url,
            analysis,
            max_concurrent_games,
            pending_batch,
            poll_interval_secs,
            max_empty_polls,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
