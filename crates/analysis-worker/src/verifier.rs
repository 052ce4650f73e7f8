//! Answer verification for quiz tasks.

use serde::Serialize;
use tracing::info;

use chess_core::board::{format_uci, legal_uci_move, parse_fen, to_fen, to_san};
use chess_core::BoardError;

use crate::config::AnalysisConfig;
use crate::engine::Oracle;
use crate::error::WorkerError;
use crate::evaluation::top_line;
use crate::models::{NewResponse, TaskStatus};
use crate::store::Store;

/// A user's answer to a task.
#[derive(Debug, Clone)]
pub struct Answer {
    pub task_id: i64,
    pub user_id: i64,
    pub move_uci: String,
    pub response_ms: i32,
}

/// Outcome of one verification attempt. Scores are from the solver's side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub response_id: i64,
    pub task_id: i64,
    pub is_correct: bool,
    pub proposed_move_uci: String,
    pub proposed_move_san: String,
    pub engine_best_move_uci: Option<String>,
    pub best_cp: i32,
    pub engine_eval_after_cp: i32,
    /// `best_cp - engine_eval_after_cp`
    pub score_cp_delta: i32,
    /// False when the task had already been answered
    pub first_answer: bool,
}

/// Exact engine move, or within `tolerance_cp` of the best score.
pub fn is_correct_answer(
    proposed_uci: &str,
    best_move: Option<&str>,
    delta_cp: i32,
    tolerance_cp: i32,
) -> bool {
    best_move == Some(proposed_uci) || delta_cp <= tolerance_cp
}

/// Check a proposed move against the engine's best line and record the attempt.
///
/// The move is validated before the engine is consulted, so malformed or
/// illegal input never costs a search and never writes anything. The task
/// moves to `answered` on its first attempt whatever the outcome.
pub async fn verify_task_answer(
    store: &dyn Store,
    oracle: &mut dyn Oracle,
    config: &AnalysisConfig,
    answer: &Answer,
) -> Result<Verdict, WorkerError> {
    let task = store
        .get_task(answer.task_id)
        .await?
        .ok_or(WorkerError::TaskNotFound(answer.task_id))?;
    if matches!(task.status, TaskStatus::Expired | TaskStatus::Cancelled) {
        return Err(WorkerError::TaskClosed {
            task_id: task.id,
            status: task.status,
        });
    }

    let board = parse_fen(&task.fen).map_err(|e| WorkerError::InvalidPosition(e.to_string()))?;
    let mv = legal_uci_move(&board, &answer.move_uci).map_err(|e| match e {
        BoardError::MalformedUci(uci) | BoardError::IllegalMove { uci, .. } => {
            WorkerError::IllegalMove {
                uci,
                fen: task.fen.clone(),
            }
        }
        other => WorkerError::InvalidPosition(other.to_string()),
    })?;
    let proposed_uci = format_uci(mv);
    let proposed_san = to_san(&board, mv);

    let engine = &config.engine;
    let best = top_line(
        oracle
            .evaluate(&task.fen, engine.deep_movetime_ms, engine.deep_multipv)
            .await?,
        &task.fen,
    )?;

    let after_fen = to_fen(&board.make_move_new(mv));
    let reply = top_line(
        oracle
            .evaluate(&after_fen, engine.deep_movetime_ms, engine.deep_multipv)
            .await?,
        &after_fen,
    )?;
    // The opponent is to move after the answer
    let after_cp = -reply.score_cp;
    let delta_cp = best.score_cp - after_cp;

    let is_correct = is_correct_answer(
        &proposed_uci,
        best.best_move.as_deref(),
        delta_cp,
        config.thresholds.near_best_tolerance_cp,
    );

    let response_id = store
        .record_response(&NewResponse {
            task_id: task.id,
            user_id: answer.user_id,
            proposed_move_uci: proposed_uci.clone(),
            proposed_move_san: Some(proposed_san.clone()),
            response_ms: answer.response_ms,
            is_correct,
            score_cp_delta: delta_cp,
            engine_eval_after_cp: after_cp,
            engine_best_move_uci: best.best_move.clone(),
        })
        .await?;
    let first_answer = store.mark_task_answered(task.id).await?;

    info!(
        task_id = task.id,
        response_id,
        proposed = %proposed_uci,
        best = ?best.best_move,
        delta_cp,
        is_correct,
        "Task answer verified"
    );

    Ok(Verdict {
        response_id,
        task_id: task.id,
        is_correct,
        proposed_move_uci: proposed_uci,
        proposed_move_san: proposed_san,
        engine_best_move_uci: best.best_move,
        best_cp: best.score_cp,
        engine_eval_after_cp: after_cp,
        score_cp_delta: delta_cp,
        first_answer,
    })
}
