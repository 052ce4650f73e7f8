//! Board capability on top of the `chess` crate: FEN in/out, UCI and SAN
//! notation, legality and check/mate detection.

use std::str::FromStr;

use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Rank, Square};
use thiserror::Error;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("Invalid FEN '{fen}': {reason}")]
    InvalidFen { fen: String, reason: String },

    #[error("Malformed UCI move: {0}")]
    MalformedUci(String),

    #[error("Illegal move {uci} in position {fen}")]
    IllegalMove { fen: String, uci: String },

    #[error("Invalid SAN move '{san}': {reason}")]
    InvalidSan { san: String, reason: String },
}

/// Parse a FEN string into a board.
pub fn parse_fen(fen: &str) -> Result<Board, BoardError> {
    Board::from_str(fen.trim()).map_err(|e| BoardError::InvalidFen {
        fen: fen.to_string(),
        reason: e.to_string(),
    })
}

/// Render a board as FEN.
pub fn to_fen(board: &Board) -> String {
    board.to_string()
}

/// 'w' or 'b'
pub fn side_char(color: Color) -> char {
    match color {
        Color::White => 'w',
        Color::Black => 'b',
    }
}

pub fn is_check(board: &Board) -> bool {
    board.checkers().popcnt() > 0
}

pub fn is_checkmate(board: &Board) -> bool {
    board.status() == BoardStatus::Checkmate
}

/// Lowercase piece letter ('p', 'n', 'b', 'r', 'q', 'k').
pub fn piece_char(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    }
}

fn square_from_bytes(file: u8, rank: u8) -> Option<Square> {
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return None;
    }
    Some(Square::make_square(
        Rank::from_index((rank - b'1') as usize),
        File::from_index((file - b'a') as usize),
    ))
}

/// Parse a UCI move string ("e2e4", "e7e8q") without checking legality.
pub fn parse_uci(uci: &str) -> Result<ChessMove, BoardError> {
    let uci = uci.trim();
    let bytes = uci.as_bytes();
    if bytes.len() != 4 && bytes.len() != 5 {
        return Err(BoardError::MalformedUci(uci.to_string()));
    }

    let from = square_from_bytes(bytes[0], bytes[1])
        .ok_or_else(|| BoardError::MalformedUci(uci.to_string()))?;
    let to = square_from_bytes(bytes[2], bytes[3])
        .ok_or_else(|| BoardError::MalformedUci(uci.to_string()))?;

    let promotion = match bytes.get(4) {
        None => None,
        Some(b'q' | b'Q') => Some(Piece::Queen),
        Some(b'r' | b'R') => Some(Piece::Rook),
        Some(b'b' | b'B') => Some(Piece::Bishop),
        Some(b'n' | b'N') => Some(Piece::Knight),
        Some(_) => return Err(BoardError::MalformedUci(uci.to_string())),
    };

    Ok(ChessMove::new(from, to, promotion))
}

/// Format a move in UCI notation.
pub fn format_uci(mv: ChessMove) -> String {
    format!(
        "{}{}{}",
        mv.get_source(),
        mv.get_dest(),
        mv.get_promotion()
            .map(|p| piece_char(p).to_string())
            .unwrap_or_default()
    )
}

/// Parse a UCI move and check it is legal on `board`.
pub fn legal_uci_move(board: &Board, uci: &str) -> Result<ChessMove, BoardError> {
    let mv = parse_uci(uci)?;
    if !board.legal(mv) {
        return Err(BoardError::IllegalMove {
            fen: to_fen(board),
            uci: uci.trim().to_string(),
        });
    }
    Ok(mv)
}

/// Play a UCI move on a FEN position and return the move and resulting board.
pub fn apply_uci(fen: &str, uci: &str) -> Result<(ChessMove, Board), BoardError> {
    let board = parse_fen(fen)?;
    let mv = legal_uci_move(&board, uci)?;
    Ok((mv, board.make_move_new(mv)))
}

/// Resolve a SAN token against the legal moves of `board`.
pub fn find_san_move(board: &Board, san: &str) -> Result<ChessMove, BoardError> {
    let invalid = |reason: &str| BoardError::InvalidSan {
        san: san.to_string(),
        reason: reason.to_string(),
    };

    let clean = san.trim_end_matches(|c: char| c == '+' || c == '#' || c == '!' || c == '?');
    let legal_moves: Vec<ChessMove> = MoveGen::new_legal(board).collect();

    if clean == "O-O" || clean == "0-0" || clean == "O-O-O" || clean == "0-0-0" {
        let kingside = clean.len() == 3;
        return legal_moves
            .iter()
            .copied()
            .find(|m| {
                let src = m.get_source().get_file().to_index();
                let dst = m.get_dest().get_file().to_index();
                board.piece_on(m.get_source()) == Some(Piece::King)
                    && if kingside { dst == src + 2 } else { src == dst + 2 }
            })
            .ok_or_else(|| invalid("castling not available"));
    }

    let bytes = clean.as_bytes();
    if bytes.is_empty() {
        return Err(invalid("empty move"));
    }

    let (piece, rest) = if bytes[0].is_ascii_uppercase() {
        let p = match bytes[0] {
            b'K' => Piece::King,
            b'Q' => Piece::Queen,
            b'R' => Piece::Rook,
            b'B' => Piece::Bishop,
            b'N' => Piece::Knight,
            _ => return Err(invalid("unknown piece")),
        };
        (p, &clean[1..])
    } else {
        (Piece::Pawn, clean)
    };

    let (rest, promotion) = if let Some(eq_pos) = rest.find('=') {
        let promo = match rest.as_bytes().get(eq_pos + 1) {
            Some(b'Q') => Some(Piece::Queen),
            Some(b'R') => Some(Piece::Rook),
            Some(b'B') => Some(Piece::Bishop),
            Some(b'N') => Some(Piece::Knight),
            _ => return Err(invalid("bad promotion piece")),
        };
        (&rest[..eq_pos], promo)
    } else {
        (rest, None)
    };

    let rest = rest.replace('x', "");
    let rest_bytes = rest.as_bytes();
    if rest_bytes.len() < 2 {
        return Err(invalid("too short"));
    }

    let dest = square_from_bytes(
        rest_bytes[rest_bytes.len() - 2],
        rest_bytes[rest_bytes.len() - 1],
    )
    .ok_or_else(|| invalid("bad destination square"))?;
    let disambig = &rest_bytes[..rest_bytes.len() - 2];

    let candidates: Vec<ChessMove> = legal_moves
        .into_iter()
        .filter(|m| {
            m.get_dest() == dest
                && board.piece_on(m.get_source()) == Some(piece)
                && m.get_promotion() == promotion
        })
        .filter(|m| {
            let src = m.get_source();
            disambig.iter().all(|&b| match b {
                b'a'..=b'h' => src.get_file().to_index() == (b - b'a') as usize,
                b'1'..=b'8' => src.get_rank().to_index() == (b - b'1') as usize,
                _ => true,
            })
        })
        .collect();

    match candidates.len() {
        1 => Ok(candidates[0]),
        0 => Err(invalid("no legal move matches")),
        _ => Err(invalid("ambiguous")),
    }
}

/// Render a legal move in SAN, including check/mate suffixes.
pub fn to_san(board: &Board, mv: ChessMove) -> String {
    let src = mv.get_source();
    let dst = mv.get_dest();
    let piece = board.piece_on(src);
    let src_file = src.get_file().to_index();
    let dst_file = dst.get_file().to_index();

    let mut san = String::new();
    if piece == Some(Piece::King) && src_file.abs_diff(dst_file) == 2 {
        san.push_str(if dst_file > src_file { "O-O" } else { "O-O-O" });
    } else {
        let is_pawn = piece == Some(Piece::Pawn);
        let capture = board.piece_on(dst).is_some() || (is_pawn && src_file != dst_file);

        match piece {
            Some(p) if p != Piece::Pawn => {
                san.push(piece_char(p).to_ascii_uppercase());
                let rivals: Vec<Square> = MoveGen::new_legal(board)
                    .filter(|m| {
                        m.get_dest() == dst
                            && m.get_source() != src
                            && board.piece_on(m.get_source()) == Some(p)
                    })
                    .map(|m| m.get_source())
                    .collect();
                if !rivals.is_empty() {
                    let file_clash = rivals.iter().any(|s| s.get_file() == src.get_file());
                    let rank_clash = rivals.iter().any(|s| s.get_rank() == src.get_rank());
                    let square = src.to_string();
                    if !file_clash {
                        san.push_str(&square[..1]);
                    } else if !rank_clash {
                        san.push_str(&square[1..]);
                    } else {
                        san.push_str(&square);
                    }
                }
            }
            _ => {
                if capture {
                    san.push_str(&src.to_string()[..1]);
                }
            }
        }

        if capture {
            san.push('x');
        }
        san.push_str(&dst.to_string());
        if let Some(promo) = mv.get_promotion() {
            san.push('=');
            san.push(piece_char(promo).to_ascii_uppercase());
        }
    }

    let after = board.make_move_new(mv);
    if is_checkmate(&after) {
        san.push('#');
    } else if is_check(&after) {
        san.push('+');
    }
    san
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(board: &Board, san: &str) -> Board {
        board.make_move_new(find_san_move(board, san).unwrap())
    }

    #[test]
    fn test_parse_fen_round_trip_start() {
        let board = parse_fen(START_FEN).unwrap();
        assert_eq!(to_fen(&board), to_fen(&Board::default()));
        assert!(to_fen(&board).starts_with("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq"));
    }

    #[test]
    fn test_parse_fen_rejects_garbage() {
        assert!(matches!(
            parse_fen("not a fen"),
            Err(BoardError::InvalidFen { .. })
        ));
    }

    #[test]
    fn test_parse_uci() {
        let mv = parse_uci("e2e4").unwrap();
        assert_eq!(format_uci(mv), "e2e4");
        let promo = parse_uci("e7e8q").unwrap();
        assert_eq!(promo.get_promotion(), Some(Piece::Queen));
        assert_eq!(format_uci(promo), "e7e8q");
        assert!(parse_uci("e2").is_err());
        assert!(parse_uci("z9e4").is_err());
        assert!(parse_uci("e7e8x").is_err());
    }

    #[test]
    fn test_apply_uci_checks_legality() {
        let (_, after) = apply_uci(START_FEN, "e2e4").unwrap();
        assert_eq!(after.side_to_move(), Color::Black);
        assert!(matches!(
            apply_uci(START_FEN, "e2e5"),
            Err(BoardError::IllegalMove { .. })
        ));
    }

    #[test]
    fn test_find_san_move_basic_and_castling() {
        let mut board = Board::default();
        for san in ["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"] {
            board = play(&board, san);
        }
        let castle = find_san_move(&board, "O-O").unwrap();
        assert_eq!(format_uci(castle), "e1g1");
        assert!(find_san_move(&board, "O-O-O").is_err());
        assert!(find_san_move(&board, "Qh8").is_err());
    }

    #[test]
    fn test_to_san_matches_input() {
        let mut board = Board::default();
        for san in ["e4", "d5", "exd5", "Qxd5", "Nc3", "Qa5", "Nf3", "Nf6"] {
            let mv = find_san_move(&board, san).unwrap();
            assert_eq!(to_san(&board, mv), san);
            board = board.make_move_new(mv);
        }
    }

    #[test]
    fn test_to_san_disambiguates_and_marks_mate() {
        // Two knights can reach d2
        let board = parse_fen("4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1").unwrap();
        let mv = parse_uci("b1d2").unwrap();
        assert_eq!(to_san(&board, mv), "Nbd2");

        // Fool's mate
        let mut board = Board::default();
        for san in ["f3", "e5", "g4"] {
            board = play(&board, san);
        }
        let mate = find_san_move(&board, "Qh4#").unwrap();
        assert_eq!(to_san(&board, mate), "Qh4#");
        let after = board.make_move_new(mate);
        assert!(is_checkmate(&after));
        assert!(is_check(&after));
    }
}
