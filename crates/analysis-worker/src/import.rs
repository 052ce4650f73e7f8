//! PGN import: parse, replay into moves, and store once.

use sha2::{Digest, Sha256};
use tracing::info;

use chess_core::pgn::{chess_com_game_id, parse_pgn};
use chess_core::replay::replay_san;

use crate::error::WorkerError;
use crate::models::{ImportResult, NewGame};
use crate::store::Store;

/// Where a PGN came from and how the source identifies it.
#[derive(Debug, Clone, Default)]
pub struct ImportSource {
    /// Defaults to "pgn"
    pub external_source: Option<String>,
    pub external_game_id: Option<String>,
    pub url: Option<String>,
}

/// Compute SHA-256 hex digest of a string.
fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Import one PGN. A game already stored under the same external id or with
/// the same PGN text comes back with `created = false` and nothing is written.
pub async fn import_pgn(
    store: &dyn Store,
    pgn: &str,
    source: ImportSource,
) -> Result<ImportResult, WorkerError> {
    let parsed = parse_pgn(pgn)
        .ok_or_else(|| WorkerError::InvalidPgn("no moves or non-standard start".into()))?;
    let plies = replay_san(&parsed.moves).map_err(|e| WorkerError::InvalidPgn(e.to_string()))?;

    let meta = &parsed.metadata;
    let url = source
        .url
        .or_else(|| meta.link.clone())
        .or_else(|| meta.site.clone().filter(|s| s.starts_with("http")));
    let external_game_id = source
        .external_game_id
        .or_else(|| url.as_deref().and_then(chess_com_game_id));
    let external_source = source.external_source.unwrap_or_else(|| {
        if external_game_id.is_some() {
            "chess_com".to_string()
        } else {
            "pgn".to_string()
        }
    });

    let headers: serde_json::Map<String, serde_json::Value> = parsed
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();

    let game = NewGame {
        external_source,
        external_game_id,
        url,
        pgn: pgn.trim().to_string(),
        pgn_sha256: sha256_hex(pgn.trim()),
        pgn_headers: serde_json::Value::Object(headers),
        white_username: meta.white.clone(),
        black_username: meta.black.clone(),
        white_rating: meta.white_elo,
        black_rating: meta.black_elo,
        time_control: meta.time_control.clone(),
        termination: meta.termination.clone(),
        result: Some(meta.result.clone()),
    };

    let result = store.insert_game(&game, &plies).await?;
    info!(
        game_id = result.game_id,
        created = result.created,
        plies = plies.len(),
        "PGN imported"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const PGN: &str = r#"[Event "Live Chess"]
[Site "Chess.com"]
[White "alice"]
[Black "bob"]
[Result "1-0"]
[WhiteElo "1500"]
[Link "https://www.chess.com/game/live/123456789"]

1. e4 e5 2. Nf3 Nc6 3. Bb5 a6 1-0"#;

    #[tokio::test]
    async fn test_import_writes_moves_and_derives_ids() {
        let store = MemoryStore::new();
        let result = import_pgn(&store, PGN, ImportSource::default()).await.unwrap();
        assert!(result.created);

        let moves = store.list_moves(result.game_id).await.unwrap();
        assert_eq!(moves.len(), 6);
        assert_eq!(moves[0].uci.as_deref(), Some("e2e4"));
        assert_eq!(moves[0].fen_after, moves[1].fen_before);
    }

    #[tokio::test]
    async fn test_reimport_is_a_no_op() {
        let store = MemoryStore::new();
        let first = import_pgn(&store, PGN, ImportSource::default()).await.unwrap();
        let again = import_pgn(&store, &format!("\n{PGN}\n"), ImportSource::default())
            .await
            .unwrap();
        assert_eq!(again, ImportResult { game_id: first.game_id, created: false });
    }

    #[tokio::test]
    async fn test_illegal_movetext_is_rejected() {
        let store = MemoryStore::new();
        let err = import_pgn(&store, "1. e4 e4 *", ImportSource::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::InvalidPgn(_)));
    }

    #[tokio::test]
    async fn test_zero_castling_survives_import() {
        let store = MemoryStore::new();
        let result = import_pgn(
            &store,
            "1. e4 e5 2. Nf3 Nc6 3. Bc4 Bc5 4. 0-0 Nf6 *",
            ImportSource::default(),
        )
        .await
        .unwrap();

        let moves = store.list_moves(result.game_id).await.unwrap();
        assert_eq!(moves.len(), 8);
        assert_eq!(moves[6].san.as_deref(), Some("O-O"));
        assert_eq!(moves[6].uci.as_deref(), Some("e1g1"));
        assert_eq!(moves[7].uci.as_deref(), Some("g8f6"));
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
