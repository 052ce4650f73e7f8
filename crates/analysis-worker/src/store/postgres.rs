//! Postgres store: inline schema plus the sqlx queries behind [`Store`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chess_core::PlyRecord;
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::Store;
use crate::classifier::Category;
use crate::error::WorkerError;
use crate::models::{
    CreatedTask, EvalPass, EvalPosition, EvaluationRow, HighlightRow, ImportResult, MoveRow,
    NewEvaluation, NewGame, NewHighlight, NewResponse, NewTask, ResponseRow, Side, TaskRow,
    TaskStatus,
};

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .connect(database_url)
        .await
}

/// Run the full Postgres schema migration inline.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    // Category reference rows come from the enum
    for category in Category::ALL {
        sqlx::query(
            "INSERT INTO move_categories (key, display_name) VALUES ($1, $2)
             ON CONFLICT (key) DO NOTHING",
        )
        .bind(category.key())
        .bind(category.display_name())
        .execute(pool)
        .await?;
    }
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Imported games
CREATE TABLE IF NOT EXISTS games (
    id               BIGSERIAL PRIMARY KEY,
    external_source  TEXT NOT NULL DEFAULT 'pgn',
    external_game_id TEXT,
    url              TEXT,
    pgn              TEXT NOT NULL,
    pgn_sha256       TEXT NOT NULL,
    pgn_headers      JSONB NOT NULL DEFAULT '{}'::jsonb,
    white_username   TEXT NOT NULL,
    black_username   TEXT NOT NULL,
    white_rating     INTEGER,
    black_rating     INTEGER,
    time_control     TEXT,
    termination      TEXT,
    result           TEXT,
    imported_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_games_external
    ON games (external_source, external_game_id) WHERE external_game_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_games_pgn_sha256 ON games (pgn_sha256);

-- Half-moves, written once at import
CREATE TABLE IF NOT EXISTS moves (
    id           BIGSERIAL PRIMARY KEY,
    game_id      BIGINT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    ply          INTEGER NOT NULL CHECK (ply >= 1),
    move_number  INTEGER NOT NULL,
    side         TEXT NOT NULL CHECK (side IN ('w', 'b')),
    san          TEXT,
    uci          TEXT,
    from_square  TEXT,
    to_square    TEXT,
    piece        TEXT,
    is_capture   BOOLEAN NOT NULL DEFAULT FALSE,
    promotion    TEXT,
    is_check     BOOLEAN NOT NULL DEFAULT FALSE,
    is_checkmate BOOLEAN NOT NULL DEFAULT FALSE,
    fen_before   TEXT,
    fen_after    TEXT,
    UNIQUE (game_id, ply)
);

-- Category reference data
CREATE TABLE IF NOT EXISTS move_categories (
    id           SERIAL PRIMARY KEY,
    key          TEXT UNIQUE NOT NULL,
    display_name TEXT NOT NULL
);

-- Engine evaluations (append only, scores mover-relative)
CREATE TABLE IF NOT EXISTS engine_evaluations (
    id            BIGSERIAL PRIMARY KEY,
    game_id       BIGINT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    move_id       BIGINT NOT NULL REFERENCES moves(id) ON DELETE CASCADE,
    ply           INTEGER NOT NULL,
    eval_side     TEXT NOT NULL CHECK (eval_side IN ('w', 'b')),
    position      TEXT NOT NULL CHECK (position IN ('before', 'after')),
    pass          TEXT NOT NULL CHECK (pass IN ('fast', 'deep')),
    score_cp      INTEGER NOT NULL,
    score_mate    INTEGER,
    best_move_uci TEXT,
    pv            TEXT,
    depth         INTEGER NOT NULL,
    engine_name   TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (move_id, position, engine_name, depth)
);

CREATE INDEX IF NOT EXISTS idx_engine_evaluations_game_ply
    ON engine_evaluations (game_id, ply);

-- Classified moves
CREATE TABLE IF NOT EXISTS move_highlights (
    id             BIGSERIAL PRIMARY KEY,
    game_id        BIGINT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    move_id        BIGINT NOT NULL REFERENCES moves(id) ON DELETE CASCADE,
    ply            INTEGER NOT NULL,
    category_id    INTEGER NOT NULL REFERENCES move_categories(id),
    eval_before_cp INTEGER,
    eval_after_cp  INTEGER,
    eval_delta_cp  INTEGER,
    created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (move_id, category_id)
);

CREATE INDEX IF NOT EXISTS idx_move_highlights_game ON move_highlights (game_id);

-- Quiz tasks
CREATE TABLE IF NOT EXISTS tactics_tasks (
    id                  BIGSERIAL PRIMARY KEY,
    user_id             BIGINT NOT NULL,
    game_id             BIGINT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    move_id             BIGINT REFERENCES moves(id) ON DELETE SET NULL,
    source_highlight_id BIGINT REFERENCES move_highlights(id) ON DELETE SET NULL,
    position_ply        INTEGER NOT NULL,
    fen                 TEXT NOT NULL,
    category_id         INTEGER REFERENCES move_categories(id),
    status              TEXT NOT NULL DEFAULT 'new'
                        CHECK (status IN ('new', 'answered', 'expired', 'cancelled')),
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    answered_at         TIMESTAMPTZ
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_tactics_tasks_identity
    ON tactics_tasks (user_id, game_id, position_ply, COALESCE(category_id, 0));

-- Verification attempts
CREATE TABLE IF NOT EXISTS tactics_responses (
    id                   BIGSERIAL PRIMARY KEY,
    task_id              BIGINT NOT NULL REFERENCES tactics_tasks(id) ON DELETE CASCADE,
    user_id              BIGINT NOT NULL,
    proposed_move_uci    TEXT NOT NULL,
    proposed_move_san    TEXT,
    response_ms          INTEGER NOT NULL DEFAULT 0,
    is_correct           BOOLEAN NOT NULL,
    score_cp_delta       INTEGER NOT NULL,
    engine_eval_after_cp INTEGER NOT NULL,
    engine_best_move_uci TEXT,
    created_at           TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_tactics_responses_task ON tactics_responses (task_id);
"#;

const HIGHLIGHT_SELECT: &str = r#"
    SELECT h.id, h.game_id, h.move_id, h.ply, c.key,
           h.eval_before_cp, h.eval_after_cp, h.eval_delta_cp,
           m.fen_before, m.fen_after
    FROM move_highlights h
    JOIN move_categories c ON c.id = h.category_id
    JOIN moves m ON m.id = h.move_id"#;

const TASK_SELECT: &str = r#"
    SELECT t.id, t.user_id, t.game_id, t.move_id, t.source_highlight_id,
           t.position_ply, t.fen, c.key, t.status, t.created_at, t.answered_at
    FROM tactics_tasks t
    LEFT JOIN move_categories c ON c.id = t.category_id"#;

type HighlightTuple = (
    i64,
    i64,
    i64,
    i32,
    String,
    Option<i32>,
    Option<i32>,
    Option<i32>,
    Option<String>,
    Option<String>,
);

type TaskTuple = (
    i64,
    i64,
    i64,
    Option<i64>,
    Option<i64>,
    i32,
    String,
    Option<String>,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
);

fn parse_category(key: &str) -> Result<Category, WorkerError> {
    key.parse().map_err(WorkerError::Storage)
}

fn highlight_from_tuple(row: HighlightTuple) -> Result<HighlightRow, WorkerError> {
    let (id, game_id, move_id, ply, key, before, after, delta, fen_before, fen_after) = row;
    Ok(HighlightRow {
        id,
        game_id,
        move_id,
        ply,
        category: parse_category(&key)?,
        eval_before_cp: before,
        eval_after_cp: after,
        eval_delta_cp: delta,
        fen_before,
        fen_after,
    })
}

fn task_from_tuple(row: TaskTuple) -> Result<TaskRow, WorkerError> {
    let (id, user_id, game_id, move_id, source_highlight_id, position_ply, fen, key, status, created_at, answered_at) =
        row;
    Ok(TaskRow {
        id,
        user_id,
        game_id,
        move_id,
        source_highlight_id,
        position_ply,
        fen,
        category: key.as_deref().map(parse_category).transpose()?,
        status: status.parse::<TaskStatus>().map_err(WorkerError::Storage)?,
        created_at,
        answered_at,
    })
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_game(&self, game: &NewGame) -> Result<Option<i64>, WorkerError> {
        if let Some(external_id) = &game.external_game_id {
            let row: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM games WHERE external_source = $1 AND external_game_id = $2",
            )
            .bind(&game.external_source)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;
            if let Some((id,)) = row {
                return Ok(Some(id));
            }
        }

        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM games WHERE pgn_sha256 = $1")
            .bind(&game.pgn_sha256)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn game_exists(&self, game_id: i64) -> Result<bool, WorkerError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM games WHERE id = $1")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn insert_game(
        &self,
        game: &NewGame,
        moves: &[PlyRecord],
    ) -> Result<ImportResult, WorkerError> {
        if let Some(game_id) = self.find_game(game).await? {
            return Ok(ImportResult {
                game_id,
                created: false,
            });
        }

        let mut tx = self.pool.begin().await?;
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"INSERT INTO games (
                external_source, external_game_id, url, pgn, pgn_sha256, pgn_headers,
                white_username, black_username, white_rating, black_rating,
                time_control, termination, result
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT DO NOTHING
            RETURNING id"#,
        )
        .bind(&game.external_source)
        .bind(&game.external_game_id)
        .bind(&game.url)
        .bind(&game.pgn)
        .bind(&game.pgn_sha256)
        .bind(&game.pgn_headers)
        .bind(&game.white_username)
        .bind(&game.black_username)
        .bind(game.white_rating)
        .bind(game.black_rating)
        .bind(&game.time_control)
        .bind(&game.termination)
        .bind(&game.result)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((game_id,)) = inserted else {
            // Lost a race with a concurrent import of the same game
            tx.rollback().await?;
            let game_id = self
                .find_game(game)
                .await?
                .ok_or_else(|| WorkerError::Storage("conflicting game vanished".into()))?;
            return Ok(ImportResult {
                game_id,
                created: false,
            });
        };

        for record in moves {
            sqlx::query(
                r#"INSERT INTO moves (
                    game_id, ply, move_number, side, san, uci, from_square, to_square,
                    piece, is_capture, promotion, is_check, is_checkmate, fen_before, fen_after
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (game_id, ply) DO NOTHING"#,
            )
            .bind(game_id)
            .bind(record.ply)
            .bind(record.move_number)
            .bind(record.side.to_string())
            .bind(&record.san)
            .bind(&record.uci)
            .bind(&record.from_square)
            .bind(&record.to_square)
            .bind(record.piece.to_string())
            .bind(record.capture)
            .bind(record.promotion.map(|p| p.to_string()))
            .bind(record.is_check)
            .bind(record.is_checkmate)
            .bind(&record.fen_before)
            .bind(&record.fen_after)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(ImportResult {
            game_id,
            created: true,
        })
    }

    async fn list_moves(&self, game_id: i64) -> Result<Vec<MoveRow>, WorkerError> {
        let rows: Vec<(i64, i32, Option<String>, Option<String>, Option<String>, Option<String>)> =
            sqlx::query_as(
                r#"SELECT id, ply, san, uci, fen_before, fen_after
                FROM moves WHERE game_id = $1 ORDER BY ply ASC"#,
            )
            .bind(game_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(id, ply, san, uci, fen_before, fen_after)| MoveRow {
                id,
                game_id,
                ply,
                side: Side::from_ply(ply),
                san,
                uci,
                fen_before,
                fen_after,
            })
            .collect())
    }

    async fn list_pending_games(&self, limit: i64) -> Result<Vec<i64>, WorkerError> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"SELECT g.id FROM games g
            WHERE NOT EXISTS (SELECT 1 FROM engine_evaluations e WHERE e.game_id = g.id)
            ORDER BY g.imported_at DESC, g.id DESC
            LIMIT $1"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn has_evaluation(
        &self,
        move_id: i64,
        position: EvalPosition,
        pass: EvalPass,
        engine_name: &str,
    ) -> Result<bool, WorkerError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"SELECT id FROM engine_evaluations
            WHERE move_id = $1 AND position = $2 AND pass = $3 AND engine_name = $4
            LIMIT 1"#,
        )
        .bind(move_id)
        .bind(position.as_str())
        .bind(pass.as_str())
        .bind(engine_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn upsert_evaluation(&self, eval: &NewEvaluation) -> Result<bool, WorkerError> {
        let result = sqlx::query(
            r#"INSERT INTO engine_evaluations (
                game_id, move_id, ply, eval_side, position, pass, score_cp, score_mate,
                best_move_uci, pv, depth, engine_name
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (move_id, position, engine_name, depth) DO NOTHING"#,
        )
        .bind(eval.game_id)
        .bind(eval.move_id)
        .bind(eval.ply)
        .bind(eval.side.as_str())
        .bind(eval.position.as_str())
        .bind(eval.pass.as_str())
        .bind(eval.score_cp)
        .bind(eval.score_mate)
        .bind(&eval.best_move_uci)
        .bind(&eval.pv)
        .bind(eval.depth)
        .bind(&eval.engine_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_evaluations(&self, game_id: i64) -> Result<Vec<EvaluationRow>, WorkerError> {
        let rows: Vec<(
            i64,
            i64,
            i32,
            String,
            String,
            i32,
            Option<i32>,
            Option<String>,
            i32,
            String,
        )> = sqlx::query_as(
            r#"SELECT id, move_id, ply, position, pass, score_cp, score_mate,
                      best_move_uci, depth, engine_name
            FROM engine_evaluations WHERE game_id = $1
            ORDER BY ply ASC, id ASC"#,
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(
                |(id, move_id, ply, position, pass, score_cp, score_mate, best_move_uci, depth, engine_name)|
                 -> Result<EvaluationRow, WorkerError> {
                    Ok(EvaluationRow {
                        id,
                        game_id,
                        move_id,
                        ply,
                        side: Side::from_ply(ply),
                        position: position.parse().map_err(WorkerError::Storage)?,
                        pass: pass.parse().map_err(WorkerError::Storage)?,
                        score_cp,
                        score_mate,
                        best_move_uci,
                        depth,
                        engine_name,
                    })
                },
            )
            .collect()
    }

    async fn upsert_highlight(&self, highlight: &NewHighlight) -> Result<bool, WorkerError> {
        let result = sqlx::query(
            r#"INSERT INTO move_highlights (
                game_id, move_id, ply, category_id, eval_before_cp, eval_after_cp, eval_delta_cp
            ) SELECT $1, $2, $3, c.id, $5, $6, $7 FROM move_categories c WHERE c.key = $4
            ON CONFLICT (move_id, category_id) DO NOTHING"#,
        )
        .bind(highlight.game_id)
        .bind(highlight.move_id)
        .bind(highlight.ply)
        .bind(highlight.category.key())
        .bind(highlight.eval_before_cp)
        .bind(highlight.eval_after_cp)
        .bind(highlight.eval_delta_cp)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_highlights(&self, game_id: i64) -> Result<Vec<HighlightRow>, WorkerError> {
        let rows: Vec<HighlightTuple> =
            sqlx::query_as(&format!("{HIGHLIGHT_SELECT} WHERE h.game_id = $1 ORDER BY h.ply, h.id"))
                .bind(game_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(highlight_from_tuple).collect()
    }

    async fn get_highlight(&self, highlight_id: i64) -> Result<Option<HighlightRow>, WorkerError> {
        let row: Option<HighlightTuple> =
            sqlx::query_as(&format!("{HIGHLIGHT_SELECT} WHERE h.id = $1"))
                .bind(highlight_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(highlight_from_tuple).transpose()
    }

    async fn update_highlight_scores(
        &self,
        highlight_id: i64,
        before_cp: i32,
        after_cp: i32,
        delta_cp: i32,
    ) -> Result<(), WorkerError> {
        let result = sqlx::query(
            r#"UPDATE move_highlights
            SET eval_before_cp = $2, eval_after_cp = $3, eval_delta_cp = $4, updated_at = NOW()
            WHERE id = $1"#,
        )
        .bind(highlight_id)
        .bind(before_cp)
        .bind(after_cp)
        .bind(delta_cp)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(WorkerError::HighlightNotFound(highlight_id));
        }
        Ok(())
    }

    async fn delete_highlights(&self, game_id: i64) -> Result<u64, WorkerError> {
        let result = sqlx::query("DELETE FROM move_highlights WHERE game_id = $1")
            .bind(game_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_task_if_absent(&self, task: &NewTask) -> Result<CreatedTask, WorkerError> {
        let category = task.category.map(Category::key);
        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"INSERT INTO tactics_tasks (
                user_id, game_id, move_id, source_highlight_id, position_ply, fen, category_id
            ) VALUES ($1, $2, $3, $4, $5, $6, (SELECT id FROM move_categories WHERE key = $7))
            ON CONFLICT DO NOTHING
            RETURNING id"#,
        )
        .bind(task.user_id)
        .bind(task.game_id)
        .bind(task.move_id)
        .bind(task.source_highlight_id)
        .bind(task.position_ply)
        .bind(&task.fen)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((task_id,)) = inserted {
            return Ok(CreatedTask {
                task_id,
                created: true,
            });
        }

        let (task_id,): (i64,) = sqlx::query_as(
            r#"SELECT id FROM tactics_tasks
            WHERE user_id = $1 AND game_id = $2 AND position_ply = $3
              AND COALESCE(category_id, 0) =
                  COALESCE((SELECT id FROM move_categories WHERE key = $4), 0)"#,
        )
        .bind(task.user_id)
        .bind(task.game_id)
        .bind(task.position_ply)
        .bind(category)
        .fetch_one(&self.pool)
        .await?;

        Ok(CreatedTask {
            task_id,
            created: false,
        })
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<TaskRow>, WorkerError> {
        let row: Option<TaskTuple> = sqlx::query_as(&format!("{TASK_SELECT} WHERE t.id = $1"))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(task_from_tuple).transpose()
    }

    async fn list_tasks(&self, game_id: i64) -> Result<Vec<TaskRow>, WorkerError> {
        let rows: Vec<TaskTuple> = sqlx::query_as(&format!(
            "{TASK_SELECT} WHERE t.game_id = $1 ORDER BY t.position_ply, t.id"
        ))
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(task_from_tuple).collect()
    }

    async fn record_response(&self, response: &NewResponse) -> Result<i64, WorkerError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"INSERT INTO tactics_responses (
                task_id, user_id, proposed_move_uci, proposed_move_san, response_ms,
                is_correct, score_cp_delta, engine_eval_after_cp, engine_best_move_uci
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id"#,
        )
        .bind(response.task_id)
        .bind(response.user_id)
        .bind(&response.proposed_move_uci)
        .bind(&response.proposed_move_san)
        .bind(response.response_ms)
        .bind(response.is_correct)
        .bind(response.score_cp_delta)
        .bind(response.engine_eval_after_cp)
        .bind(&response.engine_best_move_uci)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn mark_task_answered(&self, task_id: i64) -> Result<bool, WorkerError> {
        let result = sqlx::query(
            r#"UPDATE tactics_tasks SET status = 'answered', answered_at = NOW()
            WHERE id = $1 AND status = 'new'"#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_responses(&self, task_id: i64) -> Result<Vec<ResponseRow>, WorkerError> {
        let rows: Vec<(
            i64,
            i64,
            String,
            Option<String>,
            i32,
            bool,
            i32,
            i32,
            Option<String>,
            DateTime<Utc>,
        )> = sqlx::query_as(
            r#"SELECT id, user_id, proposed_move_uci, proposed_move_san, response_ms,
                      is_correct, score_cp_delta, engine_eval_after_cp,
                      engine_best_move_uci, created_at
            FROM tactics_responses WHERE task_id = $1 ORDER BY id ASC"#,
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, user_id, uci, san, response_ms, is_correct, delta, after_cp, best, created_at)| {
                    ResponseRow {
                        id,
                        task_id,
                        user_id,
                        proposed_move_uci: uci,
                        proposed_move_san: san,
                        response_ms,
                        is_correct,
                        score_cp_delta: delta,
                        engine_eval_after_cp: after_cp,
                        engine_best_move_uci: best,
                        created_at,
                    }
                },
            )
            .collect())
    }

    async fn reset_analysis(&self, game_id: i64, clear_tasks: bool) -> Result<(), WorkerError> {
        let mut tx = self.pool.begin().await?;
        if clear_tasks {
            // Responses go with their tasks
            sqlx::query("DELETE FROM tactics_tasks WHERE game_id = $1")
                .bind(game_id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM move_highlights WHERE game_id = $1")
            .bind(game_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM engine_evaluations WHERE game_id = $1")
            .bind(game_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
