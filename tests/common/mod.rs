#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use analysis_worker::engine::{EngineLine, Oracle, MATE_SCORE};
use analysis_worker::worker::OracleFactory;
use analysis_worker::WorkerError;
use chess_core::board::{apply_uci, to_fen};
use chess_core::replay::replay_san;
use chess_core::PlyRecord;

pub const DEMO_PGN: &str = r#"[Event "Casual Game"]
[White "White"]
[Black "Black"]
[Result "*"]

1. e4 e5 2. Nf3 *"#;

pub const OTHER_PGN: &str = "1. d4 d5 2. c4 *";

/// Budget at or above which a search counts as deep.
pub const DEEP_MOVETIME_MS: u64 = 400;

/// Plies of the demo game, replayed the same way import does.
pub fn demo_plies() -> Vec<PlyRecord> {
    let moves: Vec<String> = ["e4", "e5", "Nf3"].iter().map(|s| s.to_string()).collect();
    replay_san(&moves).unwrap()
}

/// FEN after playing `uci` on `fen`.
pub fn fen_after(fen: &str, uci: &str) -> String {
    let (_, board) = apply_uci(fen, uci).unwrap();
    to_fen(&board)
}

#[derive(Clone)]
struct Scripted {
    fast: i32,
    deep: Option<i32>,
    best: Option<String>,
}

/// Oracle answering from a table keyed by FEN. Unknown positions score 0.
/// Scores are from the side to move, like a real engine.
#[derive(Clone)]
pub struct ScriptedOracle {
    name: String,
    table: HashMap<String, Scripted>,
    pub calls: Vec<(String, u64, u32)>,
    fail_after: Option<usize>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self {
            name: "stockfish".to_string(),
            table: HashMap::new(),
            calls: Vec::new(),
            fail_after: None,
        }
    }

    pub fn score(mut self, fen: &str, cp: i32, best: Option<&str>) -> Self {
        self.table.insert(
            fen.to_string(),
            Scripted {
                fast: cp,
                deep: None,
                best: best.map(String::from),
            },
        );
        self
    }

    /// Different score for deep searches of an already scripted position.
    pub fn deep_score(mut self, fen: &str, cp: i32) -> Self {
        if let Some(entry) = self.table.get_mut(fen) {
            entry.deep = Some(cp);
        }
        self
    }

    /// Succeed `n` times, then behave like a dead engine.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn searched(&self, fen: &str) -> bool {
        self.calls.iter().any(|(f, _, _)| f == fen)
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(
        &mut self,
        fen: &str,
        movetime_ms: u64,
        multipv: u32,
    ) -> Result<Vec<EngineLine>, WorkerError> {
        if self.fail_after.is_some_and(|n| self.calls.len() >= n) {
            return Err(WorkerError::EngineUnavailable("engine closed its output".into()));
        }
        self.calls.push((fen.to_string(), movetime_ms, multipv));

        let deep = movetime_ms >= DEEP_MOVETIME_MS;
        let scripted = self.table.get(fen).cloned();
        let score_cp = match &scripted {
            Some(s) if deep => s.deep.unwrap_or(s.fast),
            Some(s) => s.fast,
            None => 0,
        };
        let best_move = scripted.and_then(|s| s.best);
        let depth = if deep { 20 } else { 10 };
        let top = EngineLine {
            score_cp,
            mate: None,
            pv: best_move.iter().cloned().collect(),
            best_move,
            depth,
        };

        // Weaker alternatives for multi-line searches
        let mut lines = vec![top];
        for i in 1..multipv.max(1) {
            lines.push(EngineLine {
                score_cp: (score_cp - 50 * i as i32).max(-MATE_SCORE),
                mate: None,
                best_move: None,
                pv: Vec::new(),
                depth,
            });
        }
        Ok(lines)
    }
}

/// Hands out clones of one scripted oracle and counts how many were started.
pub struct ScriptedFactory {
    template: ScriptedOracle,
    pub started: Arc<AtomicUsize>,
    fail_start: bool,
    panic_start: bool,
}

impl ScriptedFactory {
    pub fn new(template: ScriptedOracle) -> Self {
        Self {
            template,
            started: Arc::new(AtomicUsize::new(0)),
            fail_start: false,
            panic_start: false,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            fail_start: true,
            ..Self::new(ScriptedOracle::new())
        }
    }

    /// A factory with a bug: every start panics.
    pub fn panicking() -> Self {
        Self {
            panic_start: true,
            ..Self::new(ScriptedOracle::new())
        }
    }
}

#[async_trait]
impl OracleFactory for ScriptedFactory {
    async fn start(&self) -> Result<Box<dyn Oracle>, WorkerError> {
        if self.panic_start {
            panic!("oracle factory bug");
        }
        if self.fail_start {
            return Err(WorkerError::EngineUnavailable(
                "stockfish binary not found".into(),
            ));
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }
}
