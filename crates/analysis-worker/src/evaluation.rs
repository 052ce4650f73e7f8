//! Fast pass over every position of a game and deep refinement of highlights.

use tracing::{debug, info, warn};

use crate::classifier::mover_delta;
use crate::config::EngineConfig;
use crate::engine::{EngineLine, Oracle};
use crate::error::WorkerError;
use crate::models::{EvalPass, EvalPosition, NewEvaluation, Side};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FastPassStats {
    pub evaluated: usize,
    pub skipped: usize,
}

/// Stored FENs are pipeline data; one that does not parse means corruption upstream.
pub(crate) fn ensure_valid_fen(fen: &str) -> Result<(), WorkerError> {
    chess_core::board::parse_fen(fen)
        .map(|_| ())
        .map_err(|e| WorkerError::InvalidPosition(e.to_string()))
}

/// First line of a search, or an error for an oracle that reported nothing.
pub(crate) fn top_line(lines: Vec<EngineLine>, fen: &str) -> Result<EngineLine, WorkerError> {
    lines
        .into_iter()
        .next()
        .ok_or_else(|| WorkerError::EngineUnavailable(format!("no lines returned for {fen}")))
}

fn evaluation_row(
    game_id: i64,
    move_id: i64,
    ply: i32,
    position: EvalPosition,
    pass: EvalPass,
    line: &EngineLine,
    engine_name: &str,
) -> NewEvaluation {
    NewEvaluation {
        game_id,
        move_id,
        ply,
        side: Side::from_ply(ply),
        position,
        pass,
        score_cp: position.to_mover_pov(line.score_cp),
        score_mate: line.mate.map(|m| position.to_mover_pov(m)),
        best_move_uci: line.best_move.clone(),
        pv: (!line.pv.is_empty()).then(|| line.pv.join(" ")),
        depth: line.depth,
        engine_name: engine_name.to_string(),
    }
}

/// Evaluate both sides of every move at the fast budget, one row per
/// (move, position). Positions that already carry a fast evaluation from
/// this engine are skipped, so re-running is a no-op.
pub async fn fast_pass(
    store: &dyn Store,
    oracle: &mut dyn Oracle,
    game_id: i64,
    engine: &EngineConfig,
) -> Result<FastPassStats, WorkerError> {
    let engine_name = oracle.name().to_string();
    let moves = store.list_moves(game_id).await?;
    let mut stats = FastPassStats::default();

    for mv in &moves {
        for position in [EvalPosition::Before, EvalPosition::After] {
            let Some(fen) = mv.fen(position) else {
                continue;
            };
            if store
                .has_evaluation(mv.id, position, EvalPass::Fast, &engine_name)
                .await?
            {
                stats.skipped += 1;
                continue;
            }
            ensure_valid_fen(fen)?;

            let lines = oracle.evaluate(fen, engine.fast_movetime_ms, 1).await?;
            let line = top_line(lines, fen)?;
            let row = evaluation_row(game_id, mv.id, mv.ply, position, EvalPass::Fast, &line, &engine_name);
            store.upsert_evaluation(&row).await?;
            stats.evaluated += 1;
        }
    }

    info!(
        game_id,
        moves = moves.len(),
        evaluated = stats.evaluated,
        skipped = stats.skipped,
        "Fast pass complete"
    );
    Ok(stats)
}

/// Re-search the positions around each highlight at the deep budget, keep the
/// new evaluations, and overwrite the highlight's scores. The category stays.
pub async fn deep_refine(
    store: &dyn Store,
    oracle: &mut dyn Oracle,
    game_id: i64,
    engine: &EngineConfig,
) -> Result<usize, WorkerError> {
    let engine_name = oracle.name().to_string();
    let highlights = store.list_highlights(game_id).await?;
    let mut refined = 0;

    for highlight in &highlights {
        let (Some(fen_before), Some(fen_after)) =
            (highlight.fen_before.as_deref(), highlight.fen_after.as_deref())
        else {
            warn!(game_id, highlight_id = highlight.id, "Highlight move has no FEN, skipping");
            continue;
        };
        ensure_valid_fen(fen_before)?;
        ensure_valid_fen(fen_after)?;

        let mut scores = [0_i32; 2];
        for (slot, (position, fen)) in [
            (EvalPosition::Before, fen_before),
            (EvalPosition::After, fen_after),
        ]
        .into_iter()
        .enumerate()
        {
            let lines = oracle
                .evaluate(fen, engine.deep_movetime_ms, engine.deep_multipv)
                .await?;
            let line = top_line(lines, fen)?;
            let row = evaluation_row(
                game_id,
                highlight.move_id,
                highlight.ply,
                position,
                EvalPass::Deep,
                &line,
                &engine_name,
            );
            if !store.upsert_evaluation(&row).await? {
                // Terminal positions report depth 0 on every pass
                debug!(
                    game_id,
                    move_id = highlight.move_id,
                    position = position.as_str(),
                    depth = row.depth,
                    "Deep evaluation already stored at this depth"
                );
            }
            scores[slot] = row.score_cp;
        }

        let [before_cp, after_cp] = scores;
        let delta_cp = mover_delta(before_cp, after_cp);
        store
            .update_highlight_scores(highlight.id, before_cp, after_cp, delta_cp)
            .await?;
        debug!(
            game_id,
            highlight_id = highlight.id,
            category = %highlight.category,
            fast_delta = ?highlight.eval_delta_cp,
            deep_delta = delta_cp,
            "Highlight refined"
        );
        refined += 1;
    }

    info!(game_id, refined, "Deep refinement complete");
    Ok(refined)
}
