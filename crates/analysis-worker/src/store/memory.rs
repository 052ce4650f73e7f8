//! In-process store with the same uniqueness rules as the Postgres schema.
//! Used by tests and dry runs.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use chess_core::PlyRecord;

use super::Store;
use crate::error::WorkerError;
use crate::models::{
    CreatedTask, EvalPass, EvalPosition, EvaluationRow, HighlightRow, ImportResult, MoveRow,
    NewEvaluation, NewGame, NewHighlight, NewResponse, NewTask, ResponseRow, Side, TaskRow,
    TaskStatus,
};

struct GameEntry {
    id: i64,
    game: NewGame,
}

struct HighlightEntry {
    id: i64,
    highlight: NewHighlight,
    // Nullable in the schema; only ever written as Some here
    eval_before_cp: Option<i32>,
    eval_after_cp: Option<i32>,
    eval_delta_cp: Option<i32>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    games: Vec<GameEntry>,
    moves: Vec<MoveRow>,
    evaluations: Vec<EvaluationRow>,
    highlights: Vec<HighlightEntry>,
    tasks: Vec<TaskRow>,
    responses: Vec<ResponseRow>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn highlight_row(&self, entry: &HighlightEntry) -> HighlightRow {
        let mv = self.moves.iter().find(|m| m.id == entry.highlight.move_id);
        HighlightRow {
            id: entry.id,
            game_id: entry.highlight.game_id,
            move_id: entry.highlight.move_id,
            ply: entry.highlight.ply,
            category: entry.highlight.category,
            eval_before_cp: entry.eval_before_cp,
            eval_after_cp: entry.eval_after_cp,
            eval_delta_cp: entry.eval_delta_cp,
            fen_before: mv.and_then(|m| m.fen_before.clone()),
            fen_after: mv.and_then(|m| m.fen_after.clone()),
        }
    }

    fn delete_highlights(&mut self, game_id: i64) -> u64 {
        let removed: Vec<i64> = self
            .highlights
            .iter()
            .filter(|h| h.highlight.game_id == game_id)
            .map(|h| h.id)
            .collect();
        self.highlights.retain(|h| h.highlight.game_id != game_id);
        // ON DELETE SET NULL
        for task in &mut self.tasks {
            if task
                .source_highlight_id
                .is_some_and(|id| removed.contains(&id))
            {
                task.source_highlight_id = None;
            }
        }
        removed.len() as u64
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, WorkerError> {
        self.inner
            .lock()
            .map_err(|_| WorkerError::Storage("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn game_exists(&self, game_id: i64) -> Result<bool, WorkerError> {
        Ok(self.lock()?.games.iter().any(|g| g.id == game_id))
    }

    async fn insert_game(
        &self,
        game: &NewGame,
        moves: &[PlyRecord],
    ) -> Result<ImportResult, WorkerError> {
        let mut inner = self.lock()?;

        let existing = inner.games.iter().find(|g| {
            let same_external = game.external_game_id.is_some()
                && g.game.external_source == game.external_source
                && g.game.external_game_id == game.external_game_id;
            same_external || g.game.pgn_sha256 == game.pgn_sha256
        });
        if let Some(entry) = existing {
            return Ok(ImportResult {
                game_id: entry.id,
                created: false,
            });
        }

        let game_id = inner.next_id();
        inner.games.push(GameEntry {
            id: game_id,
            game: game.clone(),
        });
        for record in moves {
            let id = inner.next_id();
            inner.moves.push(MoveRow {
                id,
                game_id,
                ply: record.ply,
                side: Side::from_ply(record.ply),
                san: Some(record.san.clone()),
                uci: Some(record.uci.clone()),
                fen_before: Some(record.fen_before.clone()),
                fen_after: Some(record.fen_after.clone()),
            });
        }

        Ok(ImportResult {
            game_id,
            created: true,
        })
    }

    async fn list_moves(&self, game_id: i64) -> Result<Vec<MoveRow>, WorkerError> {
        let inner = self.lock()?;
        let mut moves: Vec<MoveRow> = inner
            .moves
            .iter()
            .filter(|m| m.game_id == game_id)
            .cloned()
            .collect();
        moves.sort_by_key(|m| m.ply);
        Ok(moves)
    }

    async fn list_pending_games(&self, limit: i64) -> Result<Vec<i64>, WorkerError> {
        let inner = self.lock()?;
        let mut pending: Vec<i64> = inner
            .games
            .iter()
            .map(|g| g.id)
            .filter(|id| !inner.evaluations.iter().any(|e| e.game_id == *id))
            .collect();
        pending.sort_unstable_by(|a, b| b.cmp(a));
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn has_evaluation(
        &self,
        move_id: i64,
        position: EvalPosition,
        pass: EvalPass,
        engine_name: &str,
    ) -> Result<bool, WorkerError> {
        Ok(self.lock()?.evaluations.iter().any(|e| {
            e.move_id == move_id
                && e.position == position
                && e.pass == pass
                && e.engine_name == engine_name
        }))
    }

    async fn upsert_evaluation(&self, eval: &NewEvaluation) -> Result<bool, WorkerError> {
        let mut inner = self.lock()?;
        let exists = inner.evaluations.iter().any(|e| {
            e.move_id == eval.move_id
                && e.position == eval.position
                && e.engine_name == eval.engine_name
                && e.depth == eval.depth
        });
        if exists {
            return Ok(false);
        }
        let id = inner.next_id();
        inner.evaluations.push(EvaluationRow {
            id,
            game_id: eval.game_id,
            move_id: eval.move_id,
            ply: eval.ply,
            side: eval.side,
            position: eval.position,
            pass: eval.pass,
            score_cp: eval.score_cp,
            score_mate: eval.score_mate,
            best_move_uci: eval.best_move_uci.clone(),
            depth: eval.depth,
            engine_name: eval.engine_name.clone(),
        });
        Ok(true)
    }

    async fn list_evaluations(&self, game_id: i64) -> Result<Vec<EvaluationRow>, WorkerError> {
        let inner = self.lock()?;
        let mut rows: Vec<EvaluationRow> = inner
            .evaluations
            .iter()
            .filter(|e| e.game_id == game_id)
            .cloned()
            .collect();
        rows.sort_by_key(|e| (e.ply, e.id));
        Ok(rows)
    }

    async fn upsert_highlight(&self, highlight: &NewHighlight) -> Result<bool, WorkerError> {
        let mut inner = self.lock()?;
        let exists = inner.highlights.iter().any(|h| {
            h.highlight.move_id == highlight.move_id && h.highlight.category == highlight.category
        });
        if exists {
            return Ok(false);
        }
        let id = inner.next_id();
        inner.highlights.push(HighlightEntry {
            id,
            highlight: highlight.clone(),
            eval_before_cp: Some(highlight.eval_before_cp),
            eval_after_cp: Some(highlight.eval_after_cp),
            eval_delta_cp: Some(highlight.eval_delta_cp),
        });
        Ok(true)
    }

    async fn list_highlights(&self, game_id: i64) -> Result<Vec<HighlightRow>, WorkerError> {
        let inner = self.lock()?;
        let mut rows: Vec<HighlightRow> = inner
            .highlights
            .iter()
            .filter(|h| h.highlight.game_id == game_id)
            .map(|h| inner.highlight_row(h))
            .collect();
        rows.sort_by_key(|h| (h.ply, h.id));
        Ok(rows)
    }

    async fn get_highlight(&self, highlight_id: i64) -> Result<Option<HighlightRow>, WorkerError> {
        let inner = self.lock()?;
        Ok(inner
            .highlights
            .iter()
            .find(|h| h.id == highlight_id)
            .map(|h| inner.highlight_row(h)))
    }

    async fn update_highlight_scores(
        &self,
        highlight_id: i64,
        before_cp: i32,
        after_cp: i32,
        delta_cp: i32,
    ) -> Result<(), WorkerError> {
        let mut inner = self.lock()?;
        let entry = inner
            .highlights
            .iter_mut()
            .find(|h| h.id == highlight_id)
            .ok_or(WorkerError::HighlightNotFound(highlight_id))?;
        entry.eval_before_cp = Some(before_cp);
        entry.eval_after_cp = Some(after_cp);
        entry.eval_delta_cp = Some(delta_cp);
        Ok(())
    }

    async fn delete_highlights(&self, game_id: i64) -> Result<u64, WorkerError> {
        Ok(self.lock()?.delete_highlights(game_id))
    }

    async fn create_task_if_absent(&self, task: &NewTask) -> Result<CreatedTask, WorkerError> {
        let mut inner = self.lock()?;
        let existing = inner.tasks.iter().find(|t| {
            t.user_id == task.user_id
                && t.game_id == task.game_id
                && t.position_ply == task.position_ply
                && t.category == task.category
        });
        if let Some(t) = existing {
            return Ok(CreatedTask {
                task_id: t.id,
                created: false,
            });
        }
        let id = inner.next_id();
        inner.tasks.push(TaskRow {
            id,
            user_id: task.user_id,
            game_id: task.game_id,
            move_id: Some(task.move_id),
            source_highlight_id: task.source_highlight_id,
            position_ply: task.position_ply,
            fen: task.fen.clone(),
            category: task.category,
            status: TaskStatus::New,
            created_at: Utc::now(),
            answered_at: None,
        });
        Ok(CreatedTask {
            task_id: id,
            created: true,
        })
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<TaskRow>, WorkerError> {
        Ok(self.lock()?.tasks.iter().find(|t| t.id == task_id).cloned())
    }

    async fn list_tasks(&self, game_id: i64) -> Result<Vec<TaskRow>, WorkerError> {
        let inner = self.lock()?;
        let mut tasks: Vec<TaskRow> = inner
            .tasks
            .iter()
            .filter(|t| t.game_id == game_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.position_ply, t.id));
        Ok(tasks)
    }

    async fn record_response(&self, response: &NewResponse) -> Result<i64, WorkerError> {
        let mut inner = self.lock()?;
        if !inner.tasks.iter().any(|t| t.id == response.task_id) {
            return Err(WorkerError::TaskNotFound(response.task_id));
        }
        let id = inner.next_id();
        inner.responses.push(ResponseRow {
            id,
            task_id: response.task_id,
            user_id: response.user_id,
            proposed_move_uci: response.proposed_move_uci.clone(),
            proposed_move_san: response.proposed_move_san.clone(),
            response_ms: response.response_ms,
            is_correct: response.is_correct,
            score_cp_delta: response.score_cp_delta,
            engine_eval_after_cp: response.engine_eval_after_cp,
            engine_best_move_uci: response.engine_best_move_uci.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn mark_task_answered(&self, task_id: i64) -> Result<bool, WorkerError> {
        let mut inner = self.lock()?;
        match inner
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.status == TaskStatus::New)
        {
            Some(task) => {
                task.status = TaskStatus::Answered;
                task.answered_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_responses(&self, task_id: i64) -> Result<Vec<ResponseRow>, WorkerError> {
        Ok(self
            .lock()?
            .responses
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn reset_analysis(&self, game_id: i64, clear_tasks: bool) -> Result<(), WorkerError> {
        let mut inner = self.lock()?;
        inner.evaluations.retain(|e| e.game_id != game_id);
        inner.delete_highlights(game_id);
        if clear_tasks {
            let task_ids: Vec<i64> = inner
                .tasks
                .iter()
                .filter(|t| t.game_id == game_id)
                .map(|t| t.id)
                .collect();
            inner.responses.retain(|r| !task_ids.contains(&r.task_id));
            inner.tasks.retain(|t| t.game_id != game_id);
        }
        Ok(())
    }
}
