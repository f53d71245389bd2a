//! Task-status updates against a stored projection: read-modify-write under
//! the optimistic `record_version` guard, retried on conflict. A human
//! operator and an automation consumer may race on the same record.

use crate::tasks::{mark_completed, CompletionOutcome};

use super::record::StorageProjection;
use super::store::ProjectionStore;
use super::StorageError;

/// Conflict-retry budget callers usually want.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Result of a stored-task completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskUpdate {
    /// Record rewritten with the task completed and counters recomputed.
    Applied,
    /// Task was already completed; the record was left untouched.
    NoChange,
}

/// Mark one task completed in the stored record.
///
/// Idempotent: completing a completed task never rewrites the record, so
/// counters cannot double-decrement. Conflicts reload the record and retry
/// up to `max_retries` times.
pub fn complete_stored_task(
    store: &dyn ProjectionStore,
    job_key: &str,
    task_id: &str,
    max_retries: u32,
) -> Result<TaskUpdate, StorageError> {
    let mut attempt = 0;
    loop {
        let mut projection = store
            .get(job_key)?
            .ok_or_else(|| StorageError::NotFound(job_key.to_string()))?;

        match apply_completion(&mut projection, task_id)? {
            TaskUpdate::NoChange => return Ok(TaskUpdate::NoChange),
            TaskUpdate::Applied => {}
        }

        let expected = projection.record_version;
        match store.update_if_version(&projection, expected) {
            Ok(()) => return Ok(TaskUpdate::Applied),
            Err(StorageError::Conflict { key, expected, found }) if attempt < max_retries => {
                attempt += 1;
                tracing::debug!(
                    job_key = %key,
                    task_id,
                    expected,
                    found,
                    attempt,
                    "Task update hit stale version; reloading"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

/// Complete the task in both task lists and recompute counters. The
/// denormalized list and the nested artifact must stay in lockstep.
fn apply_completion(
    projection: &mut StorageProjection,
    task_id: &str,
) -> Result<TaskUpdate, StorageError> {
    let denormalized = mark_completed(&mut projection.follow_up_tasks, task_id)
        .map_err(|e| StorageError::NotFound(e.to_string()))?;
    let nested = mark_completed(&mut projection.consultation_artifact.follow_up_tasks, task_id)
        .map_err(|e| StorageError::NotFound(e.to_string()))?;

    if denormalized == CompletionOutcome::AlreadyCompleted
        && nested == CompletionOutcome::AlreadyCompleted
    {
        return Ok(TaskUpdate::NoChange);
    }

    projection.recompute_counters();
    Ok(TaskUpdate::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::validate;
    use crate::derive::project_for_storage;
    use crate::storage::InMemoryProjectionStore;
    use serde_json::json;

    fn seeded_store(key: &str) -> InMemoryProjectionStore {
        let artifact = validate(&json!({
            "version": "2.0",
            "metadata": {},
            "patient_context": {},
            "soap_notes": {},
            "clinical_safety": {},
            "follow_up_tasks": [
                {"task_id": "ecg", "task_type": "lab_order", "description": "ECG", "owner_role": "nurse", "urgency": "stat"},
                {"task_id": "bloods", "task_type": "lab_order", "description": "Bloods", "owner_role": "nurse", "urgency": "urgent"},
                {"task_id": "referral", "task_type": "referral", "description": "Cardiology", "owner_role": "doctor", "urgency": "urgent", "dependencies": ["ecg", "bloods"]}
            ],
            "handover": {}
        }))
        .unwrap();

        let store = InMemoryProjectionStore::new();
        store
            .upsert(&project_for_storage(&artifact, key, "transcript"))
            .unwrap();
        store
    }

    #[test]
    fn completion_updates_counters_and_both_task_lists() {
        let store = seeded_store("uploads/PT001_a.webm");

        let update = complete_stored_task(&store, "uploads/PT001_a.webm", "ecg", 3).unwrap();
        assert_eq!(update, TaskUpdate::Applied);

        let stored = store.get("uploads/PT001_a.webm").unwrap().unwrap();
        assert_eq!(stored.pending_task_count, 2);
        assert_eq!(stored.total_task_count, 3);
        assert_eq!(stored.record_version, 2);
        assert_eq!(
            stored.task_by_id("ecg").unwrap().status,
            crate::artifact::TaskStatus::Completed
        );
        // Nested artifact copy moved in lockstep.
        assert_eq!(
            stored
                .consultation_artifact
                .follow_up_tasks
                .iter()
                .find(|t| t.task_id == "ecg")
                .unwrap()
                .status,
            crate::artifact::TaskStatus::Completed
        );
    }

    #[test]
    fn double_completion_does_not_double_decrement() {
        let store = seeded_store("uploads/PT001_a.webm");

        complete_stored_task(&store, "uploads/PT001_a.webm", "ecg", 3).unwrap();
        let after_first = store.get("uploads/PT001_a.webm").unwrap().unwrap();

        let update = complete_stored_task(&store, "uploads/PT001_a.webm", "ecg", 3).unwrap();
        assert_eq!(update, TaskUpdate::NoChange);

        let after_second = store.get("uploads/PT001_a.webm").unwrap().unwrap();
        assert_eq!(after_second.pending_task_count, after_first.pending_task_count);
        assert_eq!(after_second.record_version, after_first.record_version);
    }

    #[test]
    fn completing_dependencies_unblocks_dependents() {
        let store = seeded_store("uploads/PT001_a.webm");
        let key = "uploads/PT001_a.webm";

        let ready_ids = |store: &InMemoryProjectionStore| -> Vec<String> {
            let stored = store.get(key).unwrap().unwrap();
            crate::tasks::ready_tasks(&stored.follow_up_tasks)
                .iter()
                .map(|t| t.task_id.clone())
                .collect()
        };

        assert_eq!(ready_ids(&store), vec!["ecg", "bloods"]);
        complete_stored_task(&store, key, "ecg", 3).unwrap();
        complete_stored_task(&store, key, "bloods", 3).unwrap();
        assert_eq!(ready_ids(&store), vec!["referral"]);
    }

    #[test]
    fn unknown_task_is_not_found() {
        let store = seeded_store("uploads/PT001_a.webm");
        let err = complete_stored_task(&store, "uploads/PT001_a.webm", "ghost", 3).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn unknown_record_is_not_found() {
        let store = InMemoryProjectionStore::new();
        let err = complete_stored_task(&store, "missing", "ecg", 3).unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    /// Store wrapper that injects one stale-version conflict.
    struct ConflictOnce {
        inner: InMemoryProjectionStore,
        tripped: std::sync::atomic::AtomicBool,
    }

    impl ProjectionStore for ConflictOnce {
        fn get(&self, key: &str) -> Result<Option<crate::storage::StorageProjection>, StorageError> {
            self.inner.get(key)
        }

        fn upsert(&self, p: &crate::storage::StorageProjection) -> Result<(), StorageError> {
            self.inner.upsert(p)
        }

        fn update_if_version(
            &self,
            p: &crate::storage::StorageProjection,
            expected: u64,
        ) -> Result<(), StorageError> {
            use std::sync::atomic::Ordering;
            if !self.tripped.swap(true, Ordering::SeqCst) {
                // Simulate a concurrent writer bumping the version.
                let mut bumped = self.inner.get(&p.audio_key).unwrap().unwrap();
                bumped.record_version += 1;
                self.inner.upsert(&bumped).unwrap();
                return Err(StorageError::Conflict {
                    key: p.audio_key.clone(),
                    expected,
                    found: bumped.record_version,
                });
            }
            self.inner.update_if_version(p, expected)
        }
    }

    #[test]
    fn conflict_reloads_and_retries() {
        let store = ConflictOnce {
            inner: seeded_store("uploads/PT001_a.webm"),
            tripped: std::sync::atomic::AtomicBool::new(false),
        };

        let update = complete_stored_task(&store, "uploads/PT001_a.webm", "ecg", 3).unwrap();
        assert_eq!(update, TaskUpdate::Applied);

        let stored = store.inner.get("uploads/PT001_a.webm").unwrap().unwrap();
        assert_eq!(stored.pending_task_count, 2);
    }
}
