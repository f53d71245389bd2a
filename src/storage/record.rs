//! The persisted storage projection: the full nested artifact plus
//! denormalized tasks, precomputed counters, and the legacy flat fields old
//! consumers still read. Legacy fields are always derived, never source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{ConsultationArtifact, Task, TaskStatus, VitalSigns};
use crate::derive::interchange::InterchangeBundle;

/// One stored record per processed job, keyed by the audio key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageProjection {
    /// Partition key: the job's audio object key.
    pub audio_key: String,
    pub patient_id: Option<String>,
    /// Optimistic-concurrency version; bumped on every conditional update.
    pub record_version: u64,
    pub artifact_version: String,

    // Top-level queryable encounter fields.
    pub consultation_timestamp: Option<DateTime<Utc>>,
    pub setting_type: Option<String>,
    pub specialty: Option<String>,
    pub encounter_type: Option<String>,
    pub chief_complaint: Option<String>,
    pub primary_diagnosis: Option<String>,

    pub transcript: String,
    /// Nested structure preserved in full.
    pub consultation_artifact: ConsultationArtifact,
    /// Duplicate of the artifact's tasks for direct querying.
    pub follow_up_tasks: Vec<Task>,
    pub total_task_count: u32,
    pub pending_task_count: u32,
    pub urgent_task_count: u32,

    #[serde(default)]
    pub interchange_bundle: Option<InterchangeBundle>,

    // Legacy flat fields for old consumers.
    pub diagnosis: Option<String>,
    pub medications: Vec<String>,
    pub tasks: Vec<String>,
    pub follow_up: Option<String>,
    pub notes: Option<String>,
    pub vital_signs: VitalSigns,
    pub symptoms: Vec<String>,
}

/// Counters computed in one pass over the task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaskCounters {
    pub total: u32,
    pub pending: u32,
    pub urgent: u32,
}

impl TaskCounters {
    pub fn tally(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut counters, task| {
            counters.total += 1;
            if task.status == TaskStatus::Proposed {
                counters.pending += 1;
            }
            if task.urgency.is_urgent_band() {
                counters.urgent += 1;
            }
            counters
        })
    }
}

/// The flat shape legacy consumers read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecord {
    pub audio_key: String,
    pub patient_id: Option<String>,
    pub transcript: String,
    pub diagnosis: Option<String>,
    pub medications: Vec<String>,
    pub tasks: Vec<String>,
    pub follow_up: Option<String>,
    pub notes: Option<String>,
    pub vital_signs: VitalSigns,
    pub symptoms: Vec<String>,
}

impl StorageProjection {
    /// The nested artifact, unchanged.
    pub fn extract_artifact(&self) -> &ConsultationArtifact {
        &self.consultation_artifact
    }

    /// Whether this record carries the nested artifact format.
    pub fn is_new_format(&self) -> bool {
        self.artifact_version == crate::artifact::ARTIFACT_VERSION
    }

    /// Flat view for old consumers, derived from the stored fields.
    pub fn legacy_view(&self) -> LegacyRecord {
        LegacyRecord {
            audio_key: self.audio_key.clone(),
            patient_id: self.patient_id.clone(),
            transcript: self.transcript.clone(),
            diagnosis: self.diagnosis.clone(),
            medications: self.medications.clone(),
            tasks: self.tasks.clone(),
            follow_up: self.follow_up.clone(),
            notes: self.notes.clone(),
            vital_signs: self.vital_signs.clone(),
            symptoms: self.symptoms.clone(),
        }
    }

    pub fn task_by_id(&self, task_id: &str) -> Option<&Task> {
        self.follow_up_tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn tasks_for_owner(&self, owner_role: &str) -> Vec<&Task> {
        crate::tasks::tasks_by_owner(&self.follow_up_tasks, owner_role)
    }

    /// Tasks in the stat/urgent band.
    pub fn urgent_tasks(&self) -> Vec<&Task> {
        self.follow_up_tasks
            .iter()
            .filter(|t| t.urgency.is_urgent_band())
            .collect()
    }

    /// Recompute counters after a task-status change.
    pub fn recompute_counters(&mut self) {
        let counters = TaskCounters::tally(&self.follow_up_tasks);
        self.total_task_count = counters.total;
        self.pending_task_count = counters.pending;
        self.urgent_task_count = counters.urgent;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Urgency;

    fn task(id: &str, urgency: Urgency, status: TaskStatus) -> Task {
        let mut task: Task = serde_json::from_value(serde_json::json!({
            "task_id": id,
            "task_type": "lab_order",
            "description": format!("task {id}"),
            "owner_role": "nurse",
            "urgency": urgency.as_str(),
        }))
        .unwrap();
        task.status = status;
        task
    }

    #[test]
    fn tally_counts_in_one_pass() {
        let tasks = vec![
            task("a", Urgency::Stat, TaskStatus::Proposed),
            task("b", Urgency::Urgent, TaskStatus::Completed),
            task("c", Urgency::Routine, TaskStatus::Proposed),
            task("d", Urgency::Low, TaskStatus::Cancelled),
        ];
        let counters = TaskCounters::tally(&tasks);
        assert_eq!(counters.total, 4);
        assert_eq!(counters.pending, 2);
        assert_eq!(counters.urgent, 2);
    }

    #[test]
    fn tally_of_empty_list_is_zero() {
        assert_eq!(TaskCounters::tally(&[]), TaskCounters::default());
    }
}
