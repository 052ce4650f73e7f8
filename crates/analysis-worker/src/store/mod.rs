//! Persistence seam for games, evaluations, highlights, tasks and responses.
//!
//! Every write that can collide is conflict tolerant: a duplicate key is the
//! no-op path, never an error.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{create_pool, run_migrations, PgStore};

use async_trait::async_trait;
use chess_core::PlyRecord;

use crate::error::WorkerError;
use crate::models::{
    CreatedTask, EvalPass, EvalPosition, EvaluationRow, HighlightRow, ImportResult, MoveRow,
    NewEvaluation, NewGame, NewHighlight, NewResponse, NewTask, ResponseRow, TaskRow,
};

#[async_trait]
pub trait Store: Send + Sync {
    // Games

    async fn game_exists(&self, game_id: i64) -> Result<bool, WorkerError>;

    /// Insert a game and its moves unless the same game was already imported,
    /// matched by (source, external id) and then by PGN hash.
    async fn insert_game(
        &self,
        game: &NewGame,
        moves: &[PlyRecord],
    ) -> Result<ImportResult, WorkerError>;

    /// Moves of a game ordered by ply.
    async fn list_moves(&self, game_id: i64) -> Result<Vec<MoveRow>, WorkerError>;

    /// Games without any evaluation, newest first.
    async fn list_pending_games(&self, limit: i64) -> Result<Vec<i64>, WorkerError>;

    // Evaluations (append only)

    async fn has_evaluation(
        &self,
        move_id: i64,
        position: EvalPosition,
        pass: EvalPass,
        engine_name: &str,
    ) -> Result<bool, WorkerError>;

    /// Insert unless (move, position, engine, depth) already exists.
    /// Returns whether a row was written.
    async fn upsert_evaluation(&self, eval: &NewEvaluation) -> Result<bool, WorkerError>;

    async fn list_evaluations(&self, game_id: i64) -> Result<Vec<EvaluationRow>, WorkerError>;

    // Highlights

    /// Insert unless (move, category) already exists. Returns whether a row was written.
    async fn upsert_highlight(&self, highlight: &NewHighlight) -> Result<bool, WorkerError>;

    async fn list_highlights(&self, game_id: i64) -> Result<Vec<HighlightRow>, WorkerError>;

    async fn get_highlight(&self, highlight_id: i64) -> Result<Option<HighlightRow>, WorkerError>;

    async fn update_highlight_scores(
        &self,
        highlight_id: i64,
        before_cp: i32,
        after_cp: i32,
        delta_cp: i32,
    ) -> Result<(), WorkerError>;

    /// Returns the number of highlights removed.
    async fn delete_highlights(&self, game_id: i64) -> Result<u64, WorkerError>;

    // Tasks and responses

    async fn create_task_if_absent(&self, task: &NewTask) -> Result<CreatedTask, WorkerError>;

    async fn get_task(&self, task_id: i64) -> Result<Option<TaskRow>, WorkerError>;

    async fn list_tasks(&self, game_id: i64) -> Result<Vec<TaskRow>, WorkerError>;

    async fn record_response(&self, response: &NewResponse) -> Result<i64, WorkerError>;

    /// `new -> answered` only. Returns whether the status changed.
    async fn mark_task_answered(&self, task_id: i64) -> Result<bool, WorkerError>;

    async fn list_responses(&self, task_id: i64) -> Result<Vec<ResponseRow>, WorkerError>;

    /// Drop a game's evaluations and highlights, and optionally its tasks
    /// with their responses.
    async fn reset_analysis(&self, game_id: i64, clear_tasks: bool) -> Result<(), WorkerError>;
}
