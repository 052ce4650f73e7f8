//! Quiz task generation from highlighted moves.

use tracing::{debug, info};

use crate::classifier::Category;
use crate::error::WorkerError;
use crate::models::{CreatedTask, HighlightRow, NewTask};
use crate::store::Store;

/// The task asks for the move that should have been played instead of the
/// highlighted one: the position just before it, one ply earlier.
/// `None` when there is no preceding position to solve.
pub fn task_for_highlight(highlight: &HighlightRow, user_id: i64) -> Option<NewTask> {
    if highlight.ply <= 1 {
        return None;
    }
    let fen = highlight.fen_before.clone()?;
    Some(NewTask {
        user_id,
        game_id: highlight.game_id,
        move_id: highlight.move_id,
        source_highlight_id: Some(highlight.id),
        position_ply: highlight.ply - 1,
        fen,
        category: Some(highlight.category),
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub created: usize,
    pub existing: usize,
}

/// One task per blunder highlight. Safe to repeat: existing tasks are reused.
pub async fn create_tasks_from_blunders(
    store: &dyn Store,
    game_id: i64,
    user_id: i64,
) -> Result<TaskStats, WorkerError> {
    let mut stats = TaskStats::default();

    for highlight in store.list_highlights(game_id).await? {
        if highlight.category != Category::Blunder {
            continue;
        }
        let Some(task) = task_for_highlight(&highlight, user_id) else {
            continue;
        };
        let created = store.create_task_if_absent(&task).await?;
        if created.created {
            debug!(game_id, task_id = created.task_id, ply = task.position_ply, "Task created");
            stats.created += 1;
        } else {
            stats.existing += 1;
        }
    }

    info!(game_id, created = stats.created, existing = stats.existing, "Task generation complete");
    Ok(stats)
}

/// Create (or fetch) the task for one highlight of any category.
pub async fn create_task_from_highlight(
    store: &dyn Store,
    highlight_id: i64,
    user_id: i64,
) -> Result<CreatedTask, WorkerError> {
    let highlight = store
        .get_highlight(highlight_id)
        .await?
        .ok_or(WorkerError::HighlightNotFound(highlight_id))?;
    let task = task_for_highlight(&highlight, user_id).ok_or(WorkerError::Unsolvable(highlight_id))?;
    let created = store.create_task_if_absent(&task).await?;
    info!(
        highlight_id,
        task_id = created.task_id,
        created = created.created,
        "Task from highlight"
    );
    Ok(created)
}
