//! Engine oracle: a UCI engine subprocess evaluating one position at a time.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::WorkerError;

/// Magnitude mate scores are folded to.
pub const MATE_SCORE: i32 = 10_000;

/// Install locations checked after the configured path and `$PATH`.
const WELL_KNOWN_PATHS: [&str; 4] = [
    "/usr/games/stockfish",
    "/usr/bin/stockfish",
    "/usr/local/bin/stockfish",
    "/opt/homebrew/bin/stockfish",
];

/// One ranked line from a search. Scores are from the side to move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLine {
    /// Centipawns, with mates folded into +-[`MATE_SCORE`]
    pub score_cp: i32,
    /// Raw mate distance when the engine reported one
    pub mate: Option<i32>,
    pub best_move: Option<String>,
    pub pv: Vec<String>,
    pub depth: i32,
}

/// A position evaluator. Implemented by the Stockfish process and by test doubles.
#[async_trait]
pub trait Oracle: Send {
    /// Recorded as `engine_name` on evaluation rows
    fn name(&self) -> &str;

    /// Lines ordered best to worst; never empty on success.
    async fn evaluate(
        &mut self,
        fen: &str,
        movetime_ms: u64,
        multipv: u32,
    ) -> Result<Vec<EngineLine>, WorkerError>;

    /// Release the evaluator at the end of a run.
    async fn shutdown(&mut self) {}
}

/// Map a mate distance onto the centipawn scale.
/// Mate in n is worth `MATE_SCORE - n`, being mated in n is worth `-MATE_SCORE + n`.
pub fn fold_mate(mate: i32) -> i32 {
    if mate > 0 {
        MATE_SCORE - mate
    } else {
        -MATE_SCORE - mate
    }
}

/// Pick the first existing binary: the configured path, then each candidate in order.
pub fn resolve_engine_path(
    configured: Option<&str>,
    candidates: &[PathBuf],
) -> Result<PathBuf, WorkerError> {
    configured
        .map(PathBuf::from)
        .into_iter()
        .chain(candidates.iter().cloned())
        .find(|p| p.is_file())
        .ok_or_else(|| {
            WorkerError::EngineUnavailable(
                "stockfish binary not found; set ENGINE_PATH or install stockfish in PATH".into(),
            )
        })
}

/// `stockfish` on `$PATH` followed by the usual package-manager locations.
pub fn default_engine_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = env::var_os("PATH")
        .map(|paths| {
            env::split_paths(&paths)
                .map(|dir| dir.join("stockfish"))
                .collect()
        })
        .unwrap_or_default();
    candidates.extend(WELL_KNOWN_PATHS.iter().map(PathBuf::from));
    candidates
}

/// Stockfish engine instance
pub struct StockfishEngine {
    name: String,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    multipv: u32,
    grace: Duration,
}

impl StockfishEngine {
    /// Locate the binary, spawn it and complete the UCI handshake.
    pub async fn spawn(config: &EngineConfig) -> Result<Self, WorkerError> {
        let path = resolve_engine_path(config.engine_path.as_deref(), &default_engine_candidates())?;
        Self::spawn_at(&path, config).await
    }

    pub async fn spawn_at(path: &Path, config: &EngineConfig) -> Result<Self, WorkerError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WorkerError::EngineUnavailable(format!("failed to spawn {}: {e}", path.display()))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("engine stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("engine stdout not captured".into()))?;

        let mut engine = Self {
            name: config.engine_name.clone(),
            process,
            stdin,
            stdout: BufReader::new(stdout),
            multipv: 1,
            grace: Duration::from_millis(config.response_grace_ms),
        };

        engine.send("uci").await?;
        engine.wait_for("uciok").await?;
        engine
            .send(&format!("setoption name Threads value {}", config.threads))
            .await?;
        engine
            .send(&format!("setoption name Hash value {}", config.hash_mb))
            .await?;
        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        info!(path = %path.display(), "Stockfish engine ready");
        Ok(engine)
    }

    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::EngineUnavailable(format!("write to engine failed: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::EngineUnavailable(format!("flush to engine failed: {e}")))?;
        Ok(())
    }

    /// Read one line; end of output means the process died.
    async fn next_line(&mut self, buf: &mut String) -> Result<(), WorkerError> {
        buf.clear();
        let n = self
            .stdout
            .read_line(buf)
            .await
            .map_err(|e| WorkerError::EngineUnavailable(format!("read from engine failed: {e}")))?;
        if n == 0 {
            return Err(WorkerError::EngineUnavailable(
                "engine closed its output".into(),
            ));
        }
        debug!(line = buf.trim(), "SF >");
        Ok(())
    }

    async fn read_until(&mut self, expected: &str) -> Result<(), WorkerError> {
        let mut line = String::new();
        loop {
            self.next_line(&mut line).await?;
            if line.trim() == expected {
                return Ok(());
            }
        }
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), WorkerError> {
        timeout(self.grace, self.read_until(expected))
            .await
            .map_err(|_| WorkerError::EngineUnavailable(format!("timed out waiting for {expected}")))?
    }

    async fn read_search(&mut self, multipv: u32) -> Result<Vec<EngineLine>, WorkerError> {
        let mut lines: Vec<Option<EngineLine>> = vec![None; multipv.max(1) as usize];
        let mut line = String::new();

        loop {
            self.next_line(&mut line).await?;
            let trimmed = line.trim();

            if trimmed.starts_with("info") {
                if let Some((idx, parsed)) = parse_info_line(trimmed) {
                    if let Some(slot) = lines.get_mut(idx.saturating_sub(1) as usize) {
                        *slot = Some(parsed);
                    }
                }
            } else if trimmed.starts_with("bestmove") {
                let best = trimmed
                    .split_whitespace()
                    .nth(1)
                    .filter(|m| *m != "(none)")
                    .map(String::from);
                if let Some(Some(top)) = lines.first_mut() {
                    top.best_move = best;
                }
                break;
            }
        }

        let ranked: Vec<EngineLine> = lines.into_iter().flatten().collect();
        if ranked.is_empty() {
            return Err(WorkerError::EngineUnavailable(
                "search finished without a score".into(),
            ));
        }
        Ok(ranked)
    }
}

#[async_trait]
impl Oracle for StockfishEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &mut self,
        fen: &str,
        movetime_ms: u64,
        multipv: u32,
    ) -> Result<Vec<EngineLine>, WorkerError> {
        let multipv = multipv.max(1);
        if multipv != self.multipv {
            self.send(&format!("setoption name MultiPV value {multipv}"))
                .await?;
            self.multipv = multipv;
        }
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {movetime_ms}")).await?;

        let budget = Duration::from_millis(movetime_ms) + self.grace;
        timeout(budget, self.read_search(multipv))
            .await
            .map_err(|_| {
                WorkerError::EngineUnavailable(format!("no bestmove within {}ms", budget.as_millis()))
            })?
    }

    /// Send quit command and wait for process to exit
    async fn shutdown(&mut self) {
        let _ = self.send("quit").await;
        if timeout(self.grace, self.process.wait()).await.is_err() {
            warn!("Engine ignored quit, killing");
            let _ = self.process.start_kill();
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// Start the engine, search the initial position briefly and shut it down.
pub async fn health_check(config: &EngineConfig) -> Result<(PathBuf, EngineLine), WorkerError> {
    let path = resolve_engine_path(config.engine_path.as_deref(), &default_engine_candidates())?;
    let mut engine = StockfishEngine::spawn_at(&path, config).await?;
    let result = engine
        .evaluate(chess_core::board::START_FEN, config.fast_movetime_ms, 1)
        .await;
    engine.shutdown().await;
    let mut lines = result?;
    Ok((path, lines.remove(0)))
}

/// Parse a scored `info` line into its 1-based multipv index and line.
fn parse_info_line(line: &str) -> Option<(u32, EngineLine)> {
    let mate = parse_value::<i32>(line, "mate");
    let score_cp = match mate {
        Some(m) => fold_mate(m),
        None => parse_value::<i32>(line, "cp")?,
    };
    let pv = parse_pv(line);
    Some((
        parse_value(line, "multipv").unwrap_or(1),
        EngineLine {
            score_cp,
            mate,
            best_move: pv.first().cloned(),
            pv,
            depth: parse_value(line, "depth").unwrap_or(0),
        },
    ))
}

/// Value following `key` in an info line
fn parse_value<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
    let mut parts = line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == key {
            return parts.next()?.parse().ok();
        }
        // Nothing after pv is a key
        if part == "pv" {
            return None;
        }
    }
    None
}

/// Parse PV moves from info line
fn parse_pv(line: &str) -> Vec<String> {
    line.split_whitespace()
        .skip_while(|p| *p != "pv")
        .skip(1)
        .take_while(|p| !p.starts_with("bmc") && *p != "string")
        .map(String::from)
        .collect()
}
