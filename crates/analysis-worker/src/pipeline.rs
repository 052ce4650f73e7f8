//! Per-game orchestration: fast pass, annotation, deep refinement, tasks.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::engine::Oracle;
use crate::error::WorkerError;
use crate::evaluation::{deep_refine, fast_pass, FastPassStats};
use crate::highlights::annotate_highlights;
use crate::store::Store;
use crate::tasks::{create_tasks_from_blunders, TaskStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Reset,
    EngineStartup,
    FastPass,
    Annotate,
    DeepRefine,
    GenerateTasks,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineStep::Reset => "reset",
            PipelineStep::EngineStartup => "engine startup",
            PipelineStep::FastPass => "fast pass",
            PipelineStep::Annotate => "annotation",
            PipelineStep::DeepRefine => "deep refinement",
            PipelineStep::GenerateTasks => "task generation",
        })
    }
}

/// Which game and step failed. Work committed by earlier steps stays.
#[derive(Error, Debug)]
#[error("game {game_id}: {step} failed: {source}")]
pub struct PipelineError {
    pub game_id: i64,
    pub step: PipelineStep,
    pub source: WorkerError,
}

impl PipelineError {
    pub fn new(game_id: i64, step: PipelineStep, source: WorkerError) -> Self {
        Self {
            game_id,
            step,
            source,
        }
    }
}

trait AtStep<T> {
    fn at(self, game_id: i64, step: PipelineStep) -> Result<T, PipelineError>;
}

impl<T> AtStep<T> for Result<T, WorkerError> {
    fn at(self, game_id: i64, step: PipelineStep) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError::new(game_id, step, source))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub game_id: i64,
    pub fast: FastPassStats,
    pub highlights_added: usize,
    pub highlights_refined: usize,
    pub tasks: TaskStats,
}

/// Run every pass over one game, in order, with one oracle.
pub async fn analyse_game_pipeline(
    store: &dyn Store,
    oracle: &mut dyn Oracle,
    config: &AnalysisConfig,
    game_id: i64,
) -> Result<PipelineReport, PipelineError> {
    let exists = store.game_exists(game_id).await.at(game_id, PipelineStep::FastPass)?;
    if !exists {
        return Err(PipelineError::new(
            game_id,
            PipelineStep::FastPass,
            WorkerError::GameNotFound(game_id),
        ));
    }

    let fast = fast_pass(store, oracle, game_id, &config.engine)
        .await
        .at(game_id, PipelineStep::FastPass)?;
    let highlights_added = annotate_highlights(store, game_id, &config.thresholds)
        .await
        .at(game_id, PipelineStep::Annotate)?;
    let highlights_refined = deep_refine(store, oracle, game_id, &config.engine)
        .await
        .at(game_id, PipelineStep::DeepRefine)?;
    let tasks = create_tasks_from_blunders(store, game_id, config.task_user_id)
        .await
        .at(game_id, PipelineStep::GenerateTasks)?;

    info!(
        game_id,
        evaluated = fast.evaluated,
        highlights_added,
        highlights_refined,
        tasks_created = tasks.created,
        "Game analysis complete"
    );

    Ok(PipelineReport {
        game_id,
        fast,
        highlights_added,
        highlights_refined,
        tasks,
    })
}

/// Throw away a game's evaluations and highlights (and optionally its tasks)
/// and analyse it from scratch.
pub async fn reanalyse_game(
    store: &dyn Store,
    oracle: &mut dyn Oracle,
    config: &AnalysisConfig,
    game_id: i64,
    clear_tasks: bool,
) -> Result<PipelineReport, PipelineError> {
    if !store.game_exists(game_id).await.at(game_id, PipelineStep::Reset)? {
        return Err(PipelineError::new(
            game_id,
            PipelineStep::Reset,
            WorkerError::GameNotFound(game_id),
        ));
    }
    store
        .reset_analysis(game_id, clear_tasks)
        .await
        .at(game_id, PipelineStep::Reset)?;
    warn!(game_id, clear_tasks, "Previous analysis discarded");

    analyse_game_pipeline(store, oracle, config, game_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_game_and_step() {
        let err = PipelineError::new(
            7,
            PipelineStep::DeepRefine,
            WorkerError::EngineUnavailable("engine closed its output".into()),
        );
        assert_eq!(
            err.to_string(),
            "game 7: deep refinement failed: Engine unavailable: engine closed its output"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
