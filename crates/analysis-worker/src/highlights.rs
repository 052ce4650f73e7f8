//! Highlight annotation: classify each move from its latest evaluations.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::classifier::{classify, mover_delta, Thresholds};
use crate::error::WorkerError;
use crate::models::{EvalPosition, EvaluationRow, NewHighlight};
use crate::store::Store;

/// Mover-relative scores on either side of one move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveScores {
    pub before: Option<i32>,
    pub after: Option<i32>,
}

/// Latest score per (move, position), where latest means the greatest
/// (depth, id).
pub fn latest_scores(evaluations: &[EvaluationRow]) -> HashMap<i64, MoveScores> {
    let mut best: HashMap<(i64, EvalPosition), &EvaluationRow> = HashMap::new();
    for eval in evaluations {
        best.entry((eval.move_id, eval.position))
            .and_modify(|current| {
                if (eval.depth, eval.id) > (current.depth, current.id) {
                    *current = eval;
                }
            })
            .or_insert(eval);
    }

    let mut scores: HashMap<i64, MoveScores> = HashMap::new();
    for ((move_id, position), eval) in best {
        let entry = scores.entry(move_id).or_default();
        match position {
            EvalPosition::Before => entry.before = Some(eval.score_cp),
            EvalPosition::After => entry.after = Some(eval.score_cp),
        }
    }
    scores
}

/// Classify every evaluated move without a highlight yet. Returns the number
/// of highlights written. Existing highlights are never revised here.
pub async fn annotate_highlights(
    store: &dyn Store,
    game_id: i64,
    thresholds: &Thresholds,
) -> Result<usize, WorkerError> {
    let moves = store.list_moves(game_id).await?;
    let scores = latest_scores(&store.list_evaluations(game_id).await?);
    let already: HashSet<i64> = store
        .list_highlights(game_id)
        .await?
        .into_iter()
        .map(|h| h.move_id)
        .collect();

    let mut written = 0;
    for mv in &moves {
        if already.contains(&mv.id) {
            continue;
        }
        let Some(MoveScores {
            before: Some(before_cp),
            after: Some(after_cp),
        }) = scores.get(&mv.id).copied()
        else {
            continue;
        };

        let delta_cp = mover_delta(before_cp, after_cp);
        let Some(category) = classify(delta_cp, thresholds) else {
            continue;
        };

        let inserted = store
            .upsert_highlight(&NewHighlight {
                game_id,
                move_id: mv.id,
                ply: mv.ply,
                category,
                eval_before_cp: before_cp,
                eval_after_cp: after_cp,
                eval_delta_cp: delta_cp,
            })
            .await?;
        if inserted {
            debug!(game_id, ply = mv.ply, %category, delta_cp, "Highlight added");
            written += 1;
        }
    }

    info!(game_id, highlights = written, "Annotation complete");
    Ok(written)
}

/// Drop a game's highlights and classify again under `thresholds`.
/// Returns (removed, written).
pub async fn reclassify_game(
    store: &dyn Store,
    game_id: i64,
    thresholds: &Thresholds,
) -> Result<(u64, usize), WorkerError> {
    if !store.game_exists(game_id).await? {
        return Err(WorkerError::GameNotFound(game_id));
    }
    let removed = store.delete_highlights(game_id).await?;
    let written = annotate_highlights(store, game_id, thresholds).await?;
    info!(game_id, removed, written, "Game reclassified");
    Ok((removed, written))
}
