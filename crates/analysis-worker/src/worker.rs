//! Game-level concurrency: a bounded pool of pipeline runs, each with its own engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{AnalysisConfig, EngineConfig};
use crate::engine::{Oracle, StockfishEngine};
use crate::error::WorkerError;
use crate::pipeline::{analyse_game_pipeline, PipelineError, PipelineReport, PipelineStep};
use crate::store::Store;

/// Starts one oracle per pipeline run. Engine state is never shared between runs.
#[async_trait]
pub trait OracleFactory: Send + Sync {
    async fn start(&self) -> Result<Box<dyn Oracle>, WorkerError>;
}

/// Spawns a Stockfish process per run.
pub struct StockfishLauncher {
    config: EngineConfig,
}

impl StockfishLauncher {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OracleFactory for StockfishLauncher {
    async fn start(&self) -> Result<Box<dyn Oracle>, WorkerError> {
        Ok(Box::new(StockfishEngine::spawn(&self.config).await?))
    }
}

/// Analyse one game with an oracle of its own, released on every exit path.
pub async fn analyse_with_fresh_oracle(
    store: &dyn Store,
    factory: &dyn OracleFactory,
    config: &AnalysisConfig,
    game_id: i64,
) -> Result<PipelineReport, PipelineError> {
    let mut oracle = factory
        .start()
        .await
        .map_err(|e| PipelineError::new(game_id, PipelineStep::EngineStartup, e))?;
    let result = analyse_game_pipeline(store, oracle.as_mut(), config, game_id).await;
    oracle.shutdown().await;
    result
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub analysed: Vec<PipelineReport>,
    pub failed: Vec<PipelineError>,
    /// Games whose run panicked before reporting a result
    pub panicked: Vec<i64>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.analysed.is_empty() && self.failed.is_empty() && self.panicked.is_empty()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len() + self.panicked.len()
    }
}

/// Runs pipelines for many games at once, at most `size` in flight.
#[derive(Clone)]
pub struct WorkerPool {
    store: Arc<dyn Store>,
    factory: Arc<dyn OracleFactory>,
    config: Arc<AnalysisConfig>,
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn Store>,
        factory: Arc<dyn OracleFactory>,
        config: AnalysisConfig,
        size: usize,
    ) -> Self {
        let size = size.max(1);
        Self {
            store,
            factory,
            config: Arc::new(config),
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Analyse every game and wait for all of them. A failure is reported
    /// for its game and never stops the others.
    pub async fn analyse_games(&self, game_ids: Vec<i64>) -> SweepReport {
        let mut runs = JoinSet::new();
        let mut games = HashMap::new();

        for game_id in game_ids {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let store = self.store.clone();
            let factory = self.factory.clone();
            let config = self.config.clone();

            let handle = runs.spawn(async move {
                let _permit = permit; // Hold until done
                analyse_with_fresh_oracle(store.as_ref(), factory.as_ref(), &config, game_id).await
            });
            games.insert(handle.id(), game_id);
        }

        let mut report = SweepReport::default();
        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(Ok(done)) => {
                    info!(game_id = done.game_id, "Analysis complete");
                    report.analysed.push(done);
                }
                Ok(Err(e)) => {
                    error!(game_id = e.game_id, step = %e.step, error = %e.source, "Analysis failed");
                    report.failed.push(e);
                }
                Err(e) => {
                    let game_id = games.get(&e.id()).copied();
                    error!(game_id, error = %e, "Analysis task panicked");
                    report.panicked.extend(game_id);
                }
            }
        }
        report
    }

    /// Analyse up to `limit` games that have no evaluations yet, newest first.
    pub async fn sweep_pending(&self, limit: i64) -> Result<SweepReport, WorkerError> {
        let pending = self.store.list_pending_games(limit).await?;
        if !pending.is_empty() {
            info!(count = pending.len(), workers = self.size, "Analysing pending games");
        }
        Ok(self.analyse_games(pending).await)
    }
}
