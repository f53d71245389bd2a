//! Queries over the follow-up task graph of one artifact.
//!
//! Assumes an acyclic dependency relation; cycles are rejected at
//! validation time, not here.

use std::collections::HashMap;

use crate::artifact::{Task, TaskStatus, Urgency};

/// Outcome of [`mark_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Status moved to completed.
    Completed,
    /// Task was already completed; nothing changed.
    AlreadyCompleted,
}

/// Error for a completion request naming a task the artifact does not have.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("no task with id \"{task_id}\"")]
pub struct TaskNotFound {
    pub task_id: String,
}

/// Tasks ready for automation: proposed, with every dependency either
/// absent from the artifact or already completed.
pub fn ready_tasks(tasks: &[Task]) -> Vec<&Task> {
    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.task_id.as_str(), t)).collect();

    tasks
        .iter()
        .filter(|task| task.status == TaskStatus::Proposed)
        .filter(|task| {
            task.dependencies.iter().all(|dep| match by_id.get(dep.as_str()) {
                Some(dep_task) => dep_task.status == TaskStatus::Completed,
                None => true,
            })
        })
        .collect()
}

/// Tasks assigned to a role, in artifact order.
pub fn tasks_by_owner<'a>(tasks: &'a [Task], owner_role: &str) -> Vec<&'a Task> {
    tasks.iter().filter(|t| t.owner_role == owner_role).collect()
}

/// Tasks at exactly the given urgency, in artifact order.
pub fn tasks_by_urgency(tasks: &[Task], urgency: Urgency) -> Vec<&Task> {
    tasks.iter().filter(|t| t.urgency == urgency).collect()
}

/// Presentation order: urgency rank first, then original list order. Stable.
pub fn presentation_order(tasks: &[Task]) -> Vec<&Task> {
    let mut ordered: Vec<&Task> = tasks.iter().collect();
    ordered.sort_by_key(|t| t.urgency.rank());
    ordered
}

/// Transition a task to completed. Idempotent: completing an
/// already-completed task is a no-op, not an error.
pub fn mark_completed(tasks: &mut [Task], task_id: &str) -> Result<CompletionOutcome, TaskNotFound> {
    let task = tasks
        .iter_mut()
        .find(|t| t.task_id == task_id)
        .ok_or_else(|| TaskNotFound {
            task_id: task_id.to_string(),
        })?;

    if task.status == TaskStatus::Completed {
        return Ok(CompletionOutcome::AlreadyCompleted);
    }
    task.status = TaskStatus::Completed;
    Ok(CompletionOutcome::Completed)
}
