//! Board capability shared by the analysis worker: FEN/UCI/SAN handling,
//! PGN extraction and move replay.

pub mod board;
pub mod game_data;
pub mod pgn;
pub mod replay;

pub use board::BoardError;
pub use game_data::{GameMetadata, PgnGame, PlyRecord};
