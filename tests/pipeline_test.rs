//! Integration tests: the analysis pipeline end to end against the in-memory
//! store and a scripted engine.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use analysis_worker::classifier::{Category, Thresholds};
use analysis_worker::config::AnalysisConfig;
use analysis_worker::evaluation::{deep_refine, fast_pass};
use analysis_worker::highlights::{annotate_highlights, reclassify_game};
use analysis_worker::import::{import_pgn, ImportSource};
use analysis_worker::models::{EvalPass, EvalPosition, TaskStatus};
use analysis_worker::pipeline::{analyse_game_pipeline, reanalyse_game, PipelineStep};
use analysis_worker::store::{MemoryStore, Store};
use analysis_worker::tasks::{create_task_from_highlight, create_tasks_from_blunders};
use analysis_worker::verifier::{verify_task_answer, Answer};
use analysis_worker::worker::WorkerPool;
use analysis_worker::WorkerError;

use common::{demo_plies, fen_after, ScriptedFactory, ScriptedOracle, DEMO_PGN, OTHER_PGN};

/// Black's 1...e5 loses 13 pawns in this scripted world; 1...c5 is the engine move.
fn blunder_oracle() -> ScriptedOracle {
    let plies = demo_plies();
    ScriptedOracle::new()
        .score(&plies[1].fen_before, 0, Some("c7c5"))
        .score(&plies[1].fen_after, 1300, Some("g1f3"))
        .score(&plies[2].fen_after, -1300, None)
}

async fn import_demo(store: &MemoryStore) -> i64 {
    let imported = import_pgn(store, DEMO_PGN, ImportSource::default())
        .await
        .unwrap();
    assert!(imported.created);
    imported.game_id
}

fn answer(task_id: i64, uci: &str) -> Answer {
    Answer {
        task_id,
        user_id: 1,
        move_uci: uci.to_string(),
        response_ms: 1500,
    }
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_demo_game_blunder_to_verified_task() {
    let store = MemoryStore::new();
    let config = AnalysisConfig::default();
    let mut oracle = blunder_oracle();
    let game_id = import_demo(&store).await;
    let moves = store.list_moves(game_id).await.unwrap();
    assert_eq!(moves.len(), 3);

    let stats = fast_pass(&store, &mut oracle, game_id, &config.engine).await.unwrap();
    assert_eq!(stats.evaluated, 6);
    let evals = store.list_evaluations(game_id).await.unwrap();
    assert_eq!(evals.len(), 6);
    let mut plies: Vec<i32> = evals.iter().map(|e| e.ply).collect();
    plies.dedup();
    assert_eq!(plies, vec![1, 2, 3]);

    // Scores are stored from the mover's side: after 1...e5 Black is down 1300
    let ply2_after = evals
        .iter()
        .find(|e| e.ply == 2 && e.position == EvalPosition::After)
        .unwrap();
    assert_eq!(ply2_after.score_cp, -1300);

    let written = annotate_highlights(&store, game_id, &config.thresholds).await.unwrap();
    assert_eq!(written, 1);
    let highlights = store.list_highlights(game_id).await.unwrap();
    assert_eq!(highlights.len(), 1);
    let blunder = &highlights[0];
    assert_eq!(blunder.ply, 2);
    assert_eq!(blunder.category, Category::Blunder);
    assert_eq!(blunder.eval_before_cp, Some(0));
    assert_eq!(blunder.eval_after_cp, Some(-1300));
    assert_eq!(blunder.eval_delta_cp, Some(-1300));

    let stats = create_tasks_from_blunders(&store, game_id, 1).await.unwrap();
    assert_eq!(stats.created, 1);
    let task = store.list_tasks(game_id).await.unwrap().remove(0);
    assert_eq!(task.position_ply, 1);
    assert_eq!(Some(task.fen.clone()), moves[1].fen_before);
    assert_eq!(task.status, TaskStatus::New);

    let again = create_task_from_highlight(&store, blunder.id, 1).await.unwrap();
    assert!(!again.created);
    assert_eq!(again.task_id, task.id);

    let stored_best = evals
        .iter()
        .find(|e| e.ply == 2 && e.position == EvalPosition::Before)
        .and_then(|e| e.best_move_uci.clone())
        .unwrap();
    assert_eq!(stored_best, "c7c5");

    let verdict = verify_task_answer(&store, &mut oracle, &config, &answer(task.id, &stored_best))
        .await
        .unwrap();
    assert!(verdict.is_correct);
    assert!(verdict.first_answer);
    assert_eq!(verdict.proposed_move_san, "c5");
    assert_eq!(verdict.engine_best_move_uci.as_deref(), Some("c7c5"));

    let task = store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Answered);
    assert_eq!(store.list_responses(task.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_full_pipeline_report() {
    let store = MemoryStore::new();
    let mut oracle = blunder_oracle();
    let game_id = import_demo(&store).await;

    let report = analyse_game_pipeline(&store, &mut oracle, &AnalysisConfig::default(), game_id)
        .await
        .unwrap();
    assert_eq!(report.fast.evaluated, 6);
    assert_eq!(report.highlights_added, 1);
    assert_eq!(report.highlights_refined, 1);
    assert_eq!(report.tasks.created, 1);

    // Second run adds nothing
    let report = analyse_game_pipeline(&store, &mut oracle, &AnalysisConfig::default(), game_id)
        .await
        .unwrap();
    assert_eq!(report.fast.evaluated, 0);
    assert_eq!(report.highlights_added, 0);
    assert_eq!(report.tasks.created, 0);
    assert_eq!(report.tasks.existing, 1);
}

// ---------------------------------------------------------------------------
// Idempotence and uniqueness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_fast_pass_twice_writes_nothing_new() {
    let store = MemoryStore::new();
    let config = AnalysisConfig::default();
    let mut oracle = blunder_oracle();
    let game_id = import_demo(&store).await;

    fast_pass(&store, &mut oracle, game_id, &config.engine).await.unwrap();
    let first = store.list_evaluations(game_id).await.unwrap();
    let searches = oracle.calls.len();

    let stats = fast_pass(&store, &mut oracle, game_id, &config.engine).await.unwrap();
    assert_eq!(stats.evaluated, 0);
    assert_eq!(stats.skipped, 6);
    assert_eq!(oracle.calls.len(), searches);
    assert_eq!(store.list_evaluations(game_id).await.unwrap(), first);
}

#[tokio::test]
async fn test_annotation_never_duplicates_or_revises() {
    let store = MemoryStore::new();
    let config = AnalysisConfig::default();
    let mut oracle = blunder_oracle();
    let game_id = import_demo(&store).await;
    fast_pass(&store, &mut oracle, game_id, &config.engine).await.unwrap();

    annotate_highlights(&store, game_id, &config.thresholds).await.unwrap();

    // Looser bands would now call it a mistake; annotation keeps the blunder
    let looser = Thresholds {
        blunder_cp: -2000,
        ..Thresholds::default()
    };
    assert_eq!(annotate_highlights(&store, game_id, &looser).await.unwrap(), 0);
    let highlights = store.list_highlights(game_id).await.unwrap();
    assert_eq!(highlights.len(), 1);
    assert_eq!(highlights[0].category, Category::Blunder);

    // Reclassify is the explicit way to apply new thresholds
    let (removed, written) = reclassify_game(&store, game_id, &looser).await.unwrap();
    assert_eq!((removed, written), (1, 1));
    let highlights = store.list_highlights(game_id).await.unwrap();
    assert_eq!(highlights.len(), 1);
    assert_eq!(highlights[0].category, Category::Mistake);
}

#[tokio::test]
async fn test_deep_refine_updates_scores_but_keeps_category() {
    let store = MemoryStore::new();
    let config = AnalysisConfig::default();
    let plies = demo_plies();
    let mut oracle = blunder_oracle().deep_score(&plies[1].fen_after, 500);
    let game_id = import_demo(&store).await;

    fast_pass(&store, &mut oracle, game_id, &config.engine).await.unwrap();
    annotate_highlights(&store, game_id, &config.thresholds).await.unwrap();
    let refined = deep_refine(&store, &mut oracle, game_id, &config.engine).await.unwrap();
    assert_eq!(refined, 1);

    let highlight = store.list_highlights(game_id).await.unwrap().remove(0);
    assert_eq!(highlight.category, Category::Blunder);
    assert_eq!(highlight.eval_after_cp, Some(-500));
    assert_eq!(highlight.eval_delta_cp, Some(-500));

    let evals = store.list_evaluations(game_id).await.unwrap();
    let deep: Vec<_> = evals.iter().filter(|e| e.pass == EvalPass::Deep).collect();
    assert_eq!(deep.len(), 2);
    assert!(deep.iter().all(|e| e.ply == 2 && e.depth == 20));
    // Fast rows are kept alongside
    assert_eq!(evals.len(), 8);

    let deep_calls: Vec<_> = oracle.calls.iter().filter(|(_, ms, _)| *ms == 400).collect();
    assert_eq!(deep_calls.len(), 2);
    assert!(deep_calls.iter().all(|(_, _, multipv)| *multipv == 3));
}

// ---------------------------------------------------------------------------
// Verification
// ---------------------------------------------------------------------------

async fn demo_task(store: &MemoryStore, oracle: &mut ScriptedOracle) -> i64 {
    let game_id = import_demo(store).await;
    analyse_game_pipeline(store, oracle, &AnalysisConfig::default(), game_id)
        .await
        .unwrap();
    store.list_tasks(game_id).await.unwrap()[0].id
}

#[tokio::test]
async fn test_near_best_answer_is_correct_and_worse_is_not() {
    let task_fen = demo_plies()[1].fen_before.clone();
    let store = MemoryStore::new();
    // White to move after each reply: +5 after 1...e6, +150 after 1...d5
    let mut oracle = blunder_oracle()
        .score(&fen_after(&task_fen, "e7e6"), 5, None)
        .score(&fen_after(&task_fen, "d7d5"), 150, None);
    let task_id = demo_task(&store, &mut oracle).await;
    let config = AnalysisConfig::default();
    let searches = oracle.calls.len();

    let close = verify_task_answer(&store, &mut oracle, &config, &answer(task_id, "e7e6"))
        .await
        .unwrap();
    // Both searches run at the deep budget with the deep line count
    let deep = (config.engine.deep_movetime_ms, config.engine.deep_multipv);
    assert_eq!(
        oracle.calls[searches..],
        [
            (task_fen.clone(), deep.0, deep.1),
            (fen_after(&task_fen, "e7e6"), deep.0, deep.1),
        ]
    );
    assert!(close.is_correct);
    assert_eq!(close.engine_eval_after_cp, -5);
    assert_eq!(close.score_cp_delta, 5);
    assert!(close.first_answer);

    let worse = verify_task_answer(&store, &mut oracle, &config, &answer(task_id, "d7d5"))
        .await
        .unwrap();
    assert!(!worse.is_correct);
    assert_eq!(worse.score_cp_delta, 150);
    assert!(!worse.first_answer);

    // Every attempt is kept; the status only moved once
    assert_eq!(store.list_responses(task_id).await.unwrap().len(), 2);
    let task = store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Answered);
}

#[tokio::test]
async fn test_illegal_answer_is_rejected_before_any_search() {
    let store = MemoryStore::new();
    let mut oracle = blunder_oracle();
    let task_id = demo_task(&store, &mut oracle).await;
    let searches = oracle.calls.len();

    // White's move in a position where Black is to move
    let err = verify_task_answer(&store, &mut oracle, &AnalysisConfig::default(), &answer(task_id, "e2e4"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::IllegalMove { ref uci, .. } if uci == "e2e4"));

    let err = verify_task_answer(&store, &mut oracle, &AnalysisConfig::default(), &answer(task_id, "zz99"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::IllegalMove { .. }));

    assert_eq!(oracle.calls.len(), searches);
    assert!(store.list_responses(task_id).await.unwrap().is_empty());
    let task = store.get_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::New);
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let store = MemoryStore::new();
    let mut oracle = ScriptedOracle::new();
    let err = verify_task_answer(&store, &mut oracle, &AnalysisConfig::default(), &answer(9_999, "e2e4"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::TaskNotFound(9_999)));
    assert!(oracle.calls.is_empty());
}

#[tokio::test]
async fn test_first_ply_highlight_is_unsolvable() {
    let store = MemoryStore::new();
    let config = AnalysisConfig::default();
    // 1.e4 itself scripted as a disaster for White, level from then on
    let plies = demo_plies();
    let mut oracle = ScriptedOracle::new()
        .score(&plies[0].fen_after, 1300, None)
        .score(&plies[1].fen_after, -1300, None)
        .score(&plies[2].fen_after, 1300, None);
    let game_id = import_demo(&store).await;

    analyse_game_pipeline(&store, &mut oracle, &config, game_id).await.unwrap();
    let highlights = store.list_highlights(game_id).await.unwrap();
    assert_eq!(highlights.len(), 1);
    let highlight = &highlights[0];
    assert_eq!(highlight.ply, 1);
    assert!(store.list_tasks(game_id).await.unwrap().is_empty());

    let err = create_task_from_highlight(&store, highlight.id, 1).await.unwrap_err();
    assert!(matches!(err, WorkerError::Unsolvable(_)));
    let err = create_task_from_highlight(&store, 424_242, 1).await.unwrap_err();
    assert!(matches!(err, WorkerError::HighlightNotFound(424_242)));
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_engine_death_mid_fast_pass_keeps_partial_results() {
    let store = MemoryStore::new();
    let mut oracle = blunder_oracle().failing_after(3);
    let game_id = import_demo(&store).await;

    let err = analyse_game_pipeline(&store, &mut oracle, &AnalysisConfig::default(), game_id)
        .await
        .unwrap_err();
    assert_eq!(err.game_id, game_id);
    assert_eq!(err.step, PipelineStep::FastPass);
    assert!(matches!(err.source, WorkerError::EngineUnavailable(_)));

    assert_eq!(store.list_evaluations(game_id).await.unwrap().len(), 3);
    assert!(store.list_highlights(game_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_engine_death_in_deep_refine_leaves_fast_highlight() {
    let store = MemoryStore::new();
    let mut oracle = blunder_oracle().failing_after(6);
    let game_id = import_demo(&store).await;

    let err = analyse_game_pipeline(&store, &mut oracle, &AnalysisConfig::default(), game_id)
        .await
        .unwrap_err();
    assert_eq!(err.step, PipelineStep::DeepRefine);

    let highlight = store.list_highlights(game_id).await.unwrap().remove(0);
    assert_eq!(highlight.eval_delta_cp, Some(-1300));
    assert!(store.list_tasks(game_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_game_is_reported() {
    let store = MemoryStore::new();
    let mut oracle = ScriptedOracle::new();
    let err = analyse_game_pipeline(&store, &mut oracle, &AnalysisConfig::default(), 77)
        .await
        .unwrap_err();
    assert!(matches!(err.source, WorkerError::GameNotFound(77)));
}

#[tokio::test]
async fn test_corrupt_fen_is_a_hard_failure() {
    let store = MemoryStore::new();
    let mut oracle = ScriptedOracle::new();
    let mut plies = demo_plies();
    plies[1].fen_after = "this is not a position".to_string();
    let game = analysis_worker::models::NewGame {
        external_source: "pgn".into(),
        external_game_id: None,
        url: None,
        pgn: "corrupt".into(),
        pgn_sha256: "corrupt".into(),
        pgn_headers: serde_json::json!({}),
        white_username: "w".into(),
        black_username: "b".into(),
        white_rating: None,
        black_rating: None,
        time_control: None,
        termination: None,
        result: None,
    };
    let game_id = store.insert_game(&game, &plies).await.unwrap().game_id;

    let err = analyse_game_pipeline(&store, &mut oracle, &AnalysisConfig::default(), game_id)
        .await
        .unwrap_err();
    assert!(matches!(err.source, WorkerError::InvalidPosition(_)));
}

// ---------------------------------------------------------------------------
// Re-analysis and the worker pool
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reanalyse_with_clear_tasks_rebuilds_everything() {
    let store = MemoryStore::new();
    let mut oracle = blunder_oracle();
    let task_id = demo_task(&store, &mut oracle).await;
    let game_id = store.get_task(task_id).await.unwrap().unwrap().game_id;

    let report = reanalyse_game(&store, &mut oracle, &AnalysisConfig::default(), game_id, true)
        .await
        .unwrap();
    assert_eq!(report.fast.evaluated, 6);
    assert_eq!(report.tasks.created, 1);
    assert!(store.get_task(task_id).await.unwrap().is_none());

    let err = reanalyse_game(&store, &mut oracle, &AnalysisConfig::default(), 12_345, false)
        .await
        .unwrap_err();
    assert_eq!(err.step, PipelineStep::Reset);
}

#[tokio::test]
async fn test_pool_sweeps_pending_games_with_one_oracle_each() {
    let store = Arc::new(MemoryStore::new());
    let first = import_pgn(store.as_ref(), DEMO_PGN, ImportSource::default()).await.unwrap();
    let second = import_pgn(store.as_ref(), OTHER_PGN, ImportSource::default()).await.unwrap();

    let factory = Arc::new(ScriptedFactory::new(blunder_oracle()));
    let started = factory.started.clone();
    let pool = WorkerPool::new(store.clone(), factory, AnalysisConfig::default(), 2);

    let report = pool.sweep_pending(10).await.unwrap();
    assert!(report.failed.is_empty());
    let mut analysed: Vec<i64> = report.analysed.iter().map(|r| r.game_id).collect();
    analysed.sort_unstable();
    assert_eq!(analysed, vec![first.game_id, second.game_id]);
    assert_eq!(started.load(Ordering::SeqCst), 2);

    assert!(store.list_pending_games(10).await.unwrap().is_empty());
    assert!(pool.sweep_pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pool_reports_engine_startup_failure_per_game() {
    let store = Arc::new(MemoryStore::new());
    let game = import_pgn(store.as_ref(), DEMO_PGN, ImportSource::default()).await.unwrap();
    let pool = WorkerPool::new(
        store.clone(),
        Arc::new(ScriptedFactory::unavailable()),
        AnalysisConfig::default(),
        4,
    );

    let report = pool.analyse_games(vec![game.game_id]).await;
    assert!(report.analysed.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].step, PipelineStep::EngineStartup);
    assert_eq!(report.failed[0].game_id, game.game_id);
}

#[tokio::test]
async fn test_pool_counts_panicked_runs_against_their_game() {
    let store = Arc::new(MemoryStore::new());
    let first = import_pgn(store.as_ref(), DEMO_PGN, ImportSource::default()).await.unwrap();
    let second = import_pgn(store.as_ref(), OTHER_PGN, ImportSource::default()).await.unwrap();
    let pool = WorkerPool::new(
        store.clone(),
        Arc::new(ScriptedFactory::panicking()),
        AnalysisConfig::default(),
        2,
    );

    let report = pool.analyse_games(vec![first.game_id, second.game_id]).await;
    assert!(report.analysed.is_empty());
    assert!(report.failed.is_empty());
    let mut panicked = report.panicked.clone();
    panicked.sort_unstable();
    assert_eq!(panicked, vec![first.game_id, second.game_id]);
    assert_eq!(report.failure_count(), 2);
    assert!(!report.is_empty());
}
