//! Rows and write payloads shared by the stores and the analysis passes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::Category;

/// Color of the side that made a move. Odd plies belong to White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    #[serde(rename = "w")]
    White,
    #[serde(rename = "b")]
    Black,
}

impl Side {
    pub fn from_ply(ply: i32) -> Self {
        if ply % 2 == 1 {
            Side::White
        } else {
            Side::Black
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "w",
            Side::Black => "b",
        }
    }
}

/// Which side of a move a position sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalPosition {
    Before,
    After,
}

impl EvalPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            EvalPosition::Before => "before",
            EvalPosition::After => "after",
        }
    }

    /// Engine scores are relative to the side to move. Before a move that is
    /// the mover; after it, the opponent.
    pub fn to_mover_pov(self, engine_cp: i32) -> i32 {
        match self {
            EvalPosition::Before => engine_cp,
            EvalPosition::After => -engine_cp,
        }
    }
}

impl FromStr for EvalPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(EvalPosition::Before),
            "after" => Ok(EvalPosition::After),
            other => Err(format!("unknown evaluation position: {other}")),
        }
    }
}

/// The analysis pass that produced an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalPass {
    Fast,
    Deep,
}

impl EvalPass {
    pub fn as_str(self) -> &'static str {
        match self {
            EvalPass::Fast => "fast",
            EvalPass::Deep => "deep",
        }
    }

}

impl FromStr for EvalPass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fast" => Ok(EvalPass::Fast),
            "deep" => Ok(EvalPass::Deep),
            other => Err(format!("unknown evaluation pass: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    Answered,
    Expired,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::Answered => "answered",
            TaskStatus::Expired => "expired",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(TaskStatus::New),
            "answered" => Ok(TaskStatus::Answered),
            "expired" => Ok(TaskStatus::Expired),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// Imported game header data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGame {
    pub external_source: String,
    pub external_game_id: Option<String>,
    pub url: Option<String>,
    pub pgn: String,
    pub pgn_sha256: String,
    pub pgn_headers: serde_json::Value,
    pub white_username: String,
    pub black_username: String,
    pub white_rating: Option<i32>,
    pub black_rating: Option<i32>,
    pub time_control: Option<String>,
    pub termination: Option<String>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub game_id: i64,
    pub created: bool,
}

/// A half-move as written by import. Never mutated by analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRow {
    pub id: i64,
    pub game_id: i64,
    pub ply: i32,
    pub side: Side,
    pub san: Option<String>,
    pub uci: Option<String>,
    pub fen_before: Option<String>,
    pub fen_after: Option<String>,
}

impl MoveRow {
    pub fn fen(&self, position: EvalPosition) -> Option<&str> {
        match position {
            EvalPosition::Before => self.fen_before.as_deref(),
            EvalPosition::After => self.fen_after.as_deref(),
        }
    }
}

/// Evaluation write payload. Scores are mover-relative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvaluation {
    pub game_id: i64,
    pub move_id: i64,
    pub ply: i32,
    pub side: Side,
    pub position: EvalPosition,
    pub pass: EvalPass,
    pub score_cp: i32,
    pub score_mate: Option<i32>,
    pub best_move_uci: Option<String>,
    pub pv: Option<String>,
    pub depth: i32,
    pub engine_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub id: i64,
    pub game_id: i64,
    pub move_id: i64,
    pub ply: i32,
    pub side: Side,
    pub position: EvalPosition,
    pub pass: EvalPass,
    pub score_cp: i32,
    pub score_mate: Option<i32>,
    pub best_move_uci: Option<String>,
    pub depth: i32,
    pub engine_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHighlight {
    pub game_id: i64,
    pub move_id: i64,
    pub ply: i32,
    pub category: Category,
    pub eval_before_cp: i32,
    pub eval_after_cp: i32,
    pub eval_delta_cp: i32,
}

/// A highlight joined with the positions of its move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRow {
    pub id: i64,
    pub game_id: i64,
    pub move_id: i64,
    pub ply: i32,
    pub category: Category,
    pub eval_before_cp: Option<i32>,
    pub eval_after_cp: Option<i32>,
    pub eval_delta_cp: Option<i32>,
    pub fen_before: Option<String>,
    pub fen_after: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub user_id: i64,
    pub game_id: i64,
    pub move_id: i64,
    pub source_highlight_id: Option<i64>,
    pub position_ply: i32,
    pub fen: String,
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTask {
    pub task_id: i64,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: i64,
    pub user_id: i64,
    pub game_id: i64,
    pub move_id: Option<i64>,
    pub source_highlight_id: Option<i64>,
    pub position_ply: i32,
    pub fen: String,
    pub category: Option<Category>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewResponse {
    pub task_id: i64,
    pub user_id: i64,
    pub proposed_move_uci: String,
    pub proposed_move_san: Option<String>,
    pub response_ms: i32,
    pub is_correct: bool,
    pub score_cp_delta: i32,
    pub engine_eval_after_cp: i32,
    pub engine_best_move_uci: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRow {
    pub id: i64,
    pub task_id: i64,
    pub user_id: i64,
    pub proposed_move_uci: String,
    pub proposed_move_san: Option<String>,
    pub response_ms: i32,
    pub is_correct: bool,
    pub score_cp_delta: i32,
    pub engine_eval_after_cp: i32,
    pub engine_best_move_uci: Option<String>,
    pub created_at: DateTime<Utc>,
}
