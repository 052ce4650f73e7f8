//! Worker error types

use thiserror::Error;

use crate::models::TaskStatus;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error("Illegal move {uci} for task position {fen}")]
    IllegalMove { uci: String, fen: String },

    #[error("Game not found: {0}")]
    GameNotFound(i64),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Highlight not found: {0}")]
    HighlightNotFound(i64),

    #[error("Highlight {0} has no preceding position to solve")]
    Unsolvable(i64),

    #[error("Task {task_id} is {status} and accepts no answers")]
    TaskClosed { task_id: i64, status: TaskStatus },

    #[error("Invalid PGN: {0}")]
    InvalidPgn(String),
}
