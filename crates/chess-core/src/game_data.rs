use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMetadata {
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub white_elo: Option<i32>,
    pub black_elo: Option<i32>,
    pub date: Option<String>,
    pub time_control: Option<String>,
    pub termination: Option<String>,
    pub event: Option<String>,
    pub site: Option<String>,
    pub link: Option<String>,
}

/// A parsed PGN: header tags in source order plus mainline SAN moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgnGame {
    pub metadata: GameMetadata,
    pub headers: Vec<(String, String)>,
    pub moves: Vec<String>, // SAN notation
}

/// One replayed half-move with the board state on both sides of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlyRecord {
    /// 1-based half-move index
    pub ply: i32,
    pub move_number: i32,
    /// 'w' or 'b', the side that made the move
    pub side: char,
    pub san: String,
    pub uci: String,
    pub from_square: String,
    pub to_square: String,
    /// Lowercase piece letter of the moving piece ('p', 'n', ...)
    pub piece: char,
    pub capture: bool,
    pub promotion: Option<char>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub fen_before: String,
    pub fen_after: String,
}
