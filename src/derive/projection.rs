//! Storage projection: the nested artifact plus mechanically derived legacy
//! fields and counters. Pure and deterministic: same inputs, same record.

use crate::artifact::ConsultationArtifact;
use crate::storage::{StorageProjection, TaskCounters};

/// Legacy `tasks` field carries at most this many task descriptions.
const LEGACY_TASK_LIMIT: usize = 5;

/// Build the storage record for one processed job.
///
/// Counters come from a single pass over `follow_up_tasks`. Legacy fields
/// are derived here and nowhere else; they are never written directly.
pub fn project_for_storage(
    artifact: &ConsultationArtifact,
    job_key: &str,
    transcript: &str,
) -> StorageProjection {
    let soap = &artifact.soap_notes;
    let counters = TaskCounters::tally(&artifact.follow_up_tasks);

    StorageProjection {
        audio_key: job_key.to_string(),
        patient_id: patient_id_from_key(job_key),
        record_version: 1,
        artifact_version: artifact.version.clone(),

        consultation_timestamp: artifact.metadata.timestamp,
        setting_type: artifact.metadata.setting_type.clone(),
        specialty: artifact.metadata.specialty.clone(),
        encounter_type: artifact.metadata.encounter_type.clone(),
        chief_complaint: soap.subjective.chief_complaint.clone(),
        primary_diagnosis: soap.assessment.primary_diagnosis.clone(),

        transcript: transcript.to_string(),
        consultation_artifact: artifact.clone(),
        follow_up_tasks: artifact.follow_up_tasks.clone(),
        total_task_count: counters.total,
        pending_task_count: counters.pending,
        urgent_task_count: counters.urgent,

        interchange_bundle: None,

        diagnosis: soap.assessment.primary_diagnosis.clone(),
        medications: soap
            .plan
            .medications_prescribed
            .iter()
            .map(|m| m.medication.clone())
            .collect(),
        tasks: artifact
            .follow_up_tasks
            .iter()
            .take(LEGACY_TASK_LIMIT)
            .map(|t| t.description.clone())
            .collect(),
        follow_up: soap.plan.follow_up.timeframe.clone(),
        notes: soap.assessment.clinical_impression.clone(),
        vital_signs: soap.objective.vital_signs.clone(),
        symptoms: soap
            .subjective
            .symptoms
            .iter()
            .map(|s| s.symptom.clone())
            .collect(),
    }
}

/// Audio keys look like `uploads/{patient_id}_{uuid}.{ext}`; anything else
/// yields no patient id.
pub fn patient_id_from_key(job_key: &str) -> Option<String> {
    let file_name = job_key.rsplit('/').next()?;
    let (patient, rest) = file_name.split_once('_')?;
    if patient.is_empty() || rest.is_empty() {
        return None;
    }
    Some(patient.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::validate;
    use serde_json::json;

    fn sample_artifact() -> ConsultationArtifact {
        validate(&json!({
            "version": "2.0",
            "metadata": {
                "timestamp": "2026-01-17T10:00:00Z",
                "setting_type": "clinic",
                "specialty": "general_practice",
                "encounter_type": "initial_consultation"
            },
            "patient_context": { "age_range": "40-65" },
            "soap_notes": {
                "subjective": {
                    "chief_complaint": "Chest pain for 2 days",
                    "symptoms": [
                        {"symptom": "chest pain"},
                        {"symptom": "shortness of breath"}
                    ]
                },
                "objective": {
                    "vital_signs": { "blood_pressure": "145/90", "heart_rate": "88" }
                },
                "assessment": {
                    "primary_diagnosis": "Chest pain - query cardiac",
                    "clinical_impression": "Urgent workup required"
                },
                "plan": {
                    "medications_prescribed": [{"medication": "Aspirin", "dose": "300mg"}],
                    "follow_up": { "required": true, "timeframe": "today - after results" }
                }
            },
            "clinical_safety": { "confidence_level": "high" },
            "follow_up_tasks": [
                {
                    "task_id": "task-001",
                    "task_type": "lab_order",
                    "description": "ECG immediately",
                    "owner_role": "nurse",
                    "urgency": "stat"
                },
                {
                    "task_id": "task-002",
                    "task_type": "referral",
                    "description": "Cardiology referral",
                    "owner_role": "doctor",
                    "urgency": "urgent",
                    "dependencies": ["task-001"]
                },
                {
                    "task_id": "task-003",
                    "task_type": "nursing_observation",
                    "description": "Repeat vitals hourly",
                    "owner_role": "nurse",
                    "urgency": "routine"
                }
            ],
            "handover": { "situation": "Awaiting results" }
        }))
        .unwrap()
    }

    #[test]
    fn projection_round_trips_the_artifact() {
        let artifact = sample_artifact();
        let projection =
            project_for_storage(&artifact, "uploads/PT001_abc123.webm", "full transcript");
        assert_eq!(projection.extract_artifact(), &artifact);

        // Serde round trip keeps the nested structure intact too.
        let json = serde_json::to_value(&projection).unwrap();
        let back: StorageProjection = serde_json::from_value(json).unwrap();
        assert_eq!(back.consultation_artifact, artifact);
    }

    #[test]
    fn projection_is_deterministic() {
        let artifact = sample_artifact();
        let a = project_for_storage(&artifact, "uploads/PT001_abc.webm", "transcript");
        let b = project_for_storage(&artifact, "uploads/PT001_abc.webm", "transcript");
        assert_eq!(a, b);
    }

    #[test]
    fn counters_from_single_pass() {
        let artifact = sample_artifact();
        let projection = project_for_storage(&artifact, "uploads/PT001_abc.webm", "t");
        assert_eq!(projection.total_task_count, 3);
        assert_eq!(projection.pending_task_count, 3);
        assert_eq!(projection.urgent_task_count, 2);
    }

    #[test]
    fn legacy_fields_are_derived() {
        let artifact = sample_artifact();
        let projection = project_for_storage(&artifact, "uploads/PT001_abc.webm", "t");

        assert_eq!(projection.diagnosis.as_deref(), Some("Chest pain - query cardiac"));
        assert_eq!(projection.medications, vec!["Aspirin".to_string()]);
        assert_eq!(projection.tasks.len(), 3);
        assert_eq!(projection.tasks[0], "ECG immediately");
        assert_eq!(projection.follow_up.as_deref(), Some("today - after results"));
        assert_eq!(projection.notes.as_deref(), Some("Urgent workup required"));
        assert_eq!(
            projection.symptoms,
            vec!["chest pain".to_string(), "shortness of breath".to_string()]
        );
        assert_eq!(projection.vital_signs.blood_pressure.as_deref(), Some("145/90"));

        let legacy = projection.legacy_view();
        assert_eq!(legacy.diagnosis, projection.diagnosis);
        assert_eq!(legacy.patient_id.as_deref(), Some("PT001"));
    }

    #[test]
    fn legacy_task_list_is_capped_at_five() {
        let mut artifact = sample_artifact();
        let template = artifact.follow_up_tasks[0].clone();
        for i in 0..10 {
            let mut task = template.clone();
            task.task_id = format!("extra-{i}");
            task.dependencies.clear();
            artifact.follow_up_tasks.push(task);
        }
        let projection = project_for_storage(&artifact, "uploads/PT001_abc.webm", "t");
        assert_eq!(projection.tasks.len(), 5);
        assert_eq!(projection.total_task_count, 13);
    }

    #[test]
    fn patient_id_parsing() {
        assert_eq!(
            patient_id_from_key("uploads/PT001_9f3a.webm").as_deref(),
            Some("PT001")
        );
        assert_eq!(patient_id_from_key("PT002_file.ogg").as_deref(), Some("PT002"));
        assert_eq!(patient_id_from_key("uploads/no-separator.webm"), None);
        assert_eq!(patient_id_from_key("uploads/_orphan.webm"), None);
    }

    #[test]
    fn fallback_artifact_projects_cleanly() {
        let artifact = crate::artifact::fallback_artifact(
            chrono::Utc::now(),
            Some("model"),
            10,
            "extraction failed",
        );
        let projection = project_for_storage(&artifact, "uploads/PT001_x.webm", "t");
        assert_eq!(projection.total_task_count, 0);
        assert!(projection.diagnosis.is_none());
        assert!(projection.tasks.is_empty());
        assert!(projection.is_new_format());
    }
}
