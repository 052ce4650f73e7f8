//! PGN parsing utilities: a lightweight regex-based parser.

use regex::Regex;

use crate::game_data::{GameMetadata, PgnGame};

const STANDARD_START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Parse a PGN string into headers and mainline SAN moves.
/// Returns `None` for games without moves or from a non-standard start.
pub fn parse_pgn(pgn: &str) -> Option<PgnGame> {
    let header_re = Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).ok()?;

    let headers: Vec<(String, String)> = header_re
        .captures_iter(pgn)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect();

    let header = |key: &str| {
        headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };

    // Filter non-standard positions
    if header("SetUp").as_deref() == Some("1") {
        if let Some(fen) = header("FEN") {
            if fen != STANDARD_START_FEN {
                return None;
            }
        }
    }

    let metadata = GameMetadata {
        white: header("White").unwrap_or_else(|| "unknown".to_string()),
        black: header("Black").unwrap_or_else(|| "unknown".to_string()),
        result: header("Result").unwrap_or_else(|| "*".to_string()),
        white_elo: header("WhiteElo").and_then(|v| v.parse().ok()).filter(|e| *e > 0),
        black_elo: header("BlackElo").and_then(|v| v.parse().ok()).filter(|e| *e > 0),
        date: header("Date"),
        time_control: header("TimeControl"),
        termination: header("Termination"),
        event: header("Event"),
        site: header("Site"),
        link: header("Link"),
    };

    let moves = extract_moves(pgn);
    if moves.is_empty() {
        return None;
    }

    Some(PgnGame {
        metadata,
        headers,
        moves,
    })
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    let header_re = Regex::new(r"\[[^\]]*\]").unwrap();
    let no_headers = header_re.replace_all(pgn, "");

    let comment_re = Regex::new(r"\{[^}]*\}|;[^\n]*").unwrap();
    let no_comments = comment_re.replace_all(&no_headers, "");

    // Innermost variations first so nested lines disappear too
    let variation_re = Regex::new(r"\([^()]*\)").unwrap();
    let mut text = no_comments.into_owned();
    while variation_re.is_match(&text) {
        text = variation_re.replace_all(&text, "").into_owned();
    }

    // Castling in either letter or zero form, long before short
    let move_re = Regex::new(
        r"O-O-O[+#]?|O-O[+#]?|0-0-0[+#]?|0-0[+#]?|[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?",
    )
    .unwrap();

    move_re
        .find_iter(&text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Chess.com game id from a `https://www.chess.com/game/live/<id>` style URL.
pub fn chess_com_game_id(url: &str) -> Option<String> {
    if !url.starts_with("https://www.chess.com/game/") {
        return None;
    }
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}
