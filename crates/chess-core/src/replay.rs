//! Replay a SAN move list from the initial position into per-ply records.

use chess::{Board, Piece};

use crate::board::{self, BoardError};
use crate::game_data::PlyRecord;

/// Replay `san_moves` from the standard start position.
pub fn replay_san(san_moves: &[String]) -> Result<Vec<PlyRecord>, BoardError> {
    let mut board = Board::default();
    let mut records = Vec::with_capacity(san_moves.len());

    for (i, san) in san_moves.iter().enumerate() {
        let ply = i as i32 + 1;
        let mover = board.side_to_move();
        let mv = board::find_san_move(&board, san)?;

        let src = mv.get_source();
        let dst = mv.get_dest();
        let piece = board.piece_on(src).unwrap_or(Piece::Pawn);
        let capture = board.piece_on(dst).is_some()
            || (piece == Piece::Pawn && src.get_file() != dst.get_file());

        let fen_before = board::to_fen(&board);
        let canonical_san = board::to_san(&board, mv);
        board = board.make_move_new(mv);

        records.push(PlyRecord {
            ply,
            move_number: (ply + 1) / 2,
            side: board::side_char(mover),
            san: canonical_san,
            uci: board::format_uci(mv),
            from_square: src.to_string(),
            to_square: dst.to_string(),
            piece: board::piece_char(piece),
            capture,
            promotion: mv.get_promotion().map(board::piece_char),
            is_check: board::is_check(&board),
            is_checkmate: board::is_checkmate(&board),
            fen_before,
            fen_after: board::to_fen(&board),
        });
    }

    Ok(records)
}
