//! The extraction contract: one transcript in, one validated artifact out,
//! with at most one inference call per successful attempt.
//!
//! Parse or validation failure earns a single repair re-ask carrying the
//! validator's findings; if that fails too, the minimal fallback artifact is
//! emitted rather than an error, so the pipeline never sees extraction fail.

use chrono::Utc;

use crate::artifact::{fallback_artifact, validate, ConsultationArtifact, ExtractionMetadata};

use super::client::{InferenceClient, InferenceRequest};
use super::parser::parse_json_payload;
use super::prompt::{
    build_extraction_prompt, build_repair_prompt, EncounterHints, EXTRACTION_SYSTEM_PROMPT,
};
use super::sanitize::sanitize_transcript;
use super::ExtractionError;

/// Request parameters for the extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 8000,
        }
    }
}

/// How the artifact was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStatus {
    /// First response parsed and validated.
    Extracted,
    /// The repair re-ask produced the valid artifact.
    Repaired,
    /// Both attempts failed; this is the fallback artifact.
    FellBack,
}

/// Always carries a schema-valid artifact, possibly the fallback.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub artifact: ConsultationArtifact,
    pub status: ExtractionStatus,
    /// Inference calls actually made (1, or 2 when the repair ran).
    pub attempts: u32,
}

impl ExtractionOutcome {
    pub fn fell_back(&self) -> bool {
        self.status == ExtractionStatus::FellBack
    }
}

/// Drives prompt → call → tolerant parse → validate → (repair) → fallback.
pub struct ArtifactExtractor {
    client: Box<dyn InferenceClient + Send + Sync>,
    options: ExtractionOptions,
}

impl ArtifactExtractor {
    pub fn new(client: Box<dyn InferenceClient + Send + Sync>, options: ExtractionOptions) -> Self {
        Self { client, options }
    }

    /// Produce one validated artifact for one transcript.
    ///
    /// The only error is an empty transcript, which is a caller bug; every
    /// inference-side failure resolves to the fallback artifact instead.
    pub fn extract(
        &self,
        transcript: &str,
        hints: &EncounterHints,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let sanitized = sanitize_transcript(transcript);
        if sanitized.trim().is_empty() {
            return Err(ExtractionError::EmptyTranscript);
        }
        let transcript_length = sanitized.chars().count();
        let extracted_at = Utc::now();

        let mut input_tokens: u32 = 0;
        let mut output_tokens: u32 = 0;

        // First (and for successful attempts, only) inference call.
        let prompt = build_extraction_prompt(&sanitized, hints);
        let first = match self.call(&prompt) {
            Ok(response) => response,
            Err(e) => {
                // Nothing to repair without a payload; fall back directly.
                tracing::warn!(error = %e, "Inference call failed; using fallback artifact");
                return Ok(self.fallback(extracted_at, transcript_length, &e.to_string(), 1));
            }
        };
        input_tokens += first.input_tokens.unwrap_or(0);
        output_tokens += first.output_tokens.unwrap_or(0);

        let first_error = match parse_and_validate(&first.text) {
            Ok(mut artifact) => {
                self.stamp(
                    &mut artifact,
                    extracted_at,
                    transcript_length,
                    input_tokens,
                    output_tokens,
                );
                return Ok(ExtractionOutcome {
                    artifact,
                    status: ExtractionStatus::Extracted,
                    attempts: 1,
                });
            }
            Err(e) => e,
        };

        // One repair re-ask, quoting the specific findings.
        tracing::warn!(error = %first_error, "Extraction response rejected; issuing repair re-ask");
        let repair_prompt = build_repair_prompt(&first.text, &first_error.to_string());
        let second = match self.call(&repair_prompt) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Repair call failed; using fallback artifact");
                return Ok(self.fallback(extracted_at, transcript_length, &e.to_string(), 2));
            }
        };
        input_tokens += second.input_tokens.unwrap_or(0);
        output_tokens += second.output_tokens.unwrap_or(0);

        match parse_and_validate(&second.text) {
            Ok(mut artifact) => {
                self.stamp(
                    &mut artifact,
                    extracted_at,
                    transcript_length,
                    input_tokens,
                    output_tokens,
                );
                Ok(ExtractionOutcome {
                    artifact,
                    status: ExtractionStatus::Repaired,
                    attempts: 2,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Repair response rejected; using fallback artifact");
                Ok(self.fallback(extracted_at, transcript_length, &e.to_string(), 2))
            }
        }
    }

    fn call(&self, prompt: &str) -> Result<super::client::InferenceResponse, ExtractionError> {
        self.client.complete(&InferenceRequest {
            system: EXTRACTION_SYSTEM_PROMPT,
            prompt,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
        })
    }

    fn stamp(
        &self,
        artifact: &mut ConsultationArtifact,
        extracted_at: chrono::DateTime<Utc>,
        transcript_length: usize,
        input_tokens: u32,
        output_tokens: u32,
    ) {
        artifact.extraction_metadata = ExtractionMetadata {
            model: Some(self.client.model_id().to_string()),
            input_tokens: Some(input_tokens),
            output_tokens: Some(output_tokens),
            extraction_timestamp: Some(extracted_at),
            transcript_length: Some(transcript_length),
            confidence: artifact.clinical_safety.confidence_level,
            processing_notes: None,
        };
    }

    fn fallback(
        &self,
        extracted_at: chrono::DateTime<Utc>,
        transcript_length: usize,
        reason: &str,
        attempts: u32,
    ) -> ExtractionOutcome {
        ExtractionOutcome {
            artifact: fallback_artifact(
                extracted_at,
                Some(self.client.model_id()),
                transcript_length,
                reason,
            ),
            status: ExtractionStatus::FellBack,
            attempts,
        }
    }
}

/// Tolerant parse then schema validation.
fn parse_and_validate(response: &str) -> Result<ConsultationArtifact, ExtractionError> {
    let payload = parse_json_payload(response)?;
    Ok(validate(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ConfidenceLevel, TaskStatus};
    use crate::extraction::client::MockInferenceClient;

    fn valid_response() -> String {
        let payload = serde_json::json!({
            "version": "2.0",
            "metadata": {
                "timestamp": "2026-01-17T10:00:00Z",
                "setting_type": "clinic",
                "specialty": "general_practice",
                "encounter_type": "initial_consultation",
                "participants": [
                    {"role": "doctor", "identifier": "GP"},
                    {"role": "patient", "identifier": "Patient A"}
                ]
            },
            "patient_context": { "age_range": "40-65", "gender": "male" },
            "soap_notes": {
                "subjective": {
                    "chief_complaint": "Chest pain for 2 days",
                    "symptoms": [{
                        "symptom": "chest pain",
                        "severity": "moderate",
                        "transcript_evidence": "sharp pain, right in the center of my chest"
                    }],
                    "allergies": [{"allergen": "Penicillin", "reaction": "rash"}]
                },
                "objective": {
                    "vital_signs": { "blood_pressure": "145/90", "heart_rate": "88" }
                },
                "assessment": {
                    "primary_diagnosis": "Chest pain - query cardiac",
                    "clinical_impression": "Requires urgent cardiac workup"
                },
                "plan": {
                    "medications_prescribed": [{
                        "medication": "Aspirin", "dose": "300mg", "route": "PO"
                    }],
                    "follow_up": { "required": true, "timeframe": "today" }
                }
            },
            "clinical_safety": {
                "red_flags": [{
                    "flag": "Chest pain with risk factors",
                    "severity": "high",
                    "action_taken": "workup initiated"
                }],
                "confidence_level": "high"
            },
            "follow_up_tasks": [
                {
                    "task_id": "task-001",
                    "task_type": "lab_order",
                    "description": "ECG immediately",
                    "owner_role": "nurse",
                    "urgency": "stat",
                    "required_inputs": { "kind": "lab_order", "test_name": "12-lead ECG" }
                },
                {
                    "task_id": "task-002",
                    "task_type": "referral",
                    "description": "Cardiology review",
                    "owner_role": "doctor",
                    "urgency": "urgent",
                    "dependencies": ["task-001"],
                    "required_inputs": { "kind": "referral", "specialty": "cardiology" }
                }
            ],
            "handover": { "situation": "Stable, awaiting results" }
        });
        format!("Here is the record:\n\n{payload}\n")
    }

    fn extractor(
        client: MockInferenceClient,
    ) -> (ArtifactExtractor, std::sync::Arc<MockInferenceClient>) {
        let shared = std::sync::Arc::new(client);
        (
            ArtifactExtractor::new(Box::new(shared.clone()), ExtractionOptions::default()),
            shared,
        )
    }

    #[test]
    fn successful_attempt_makes_exactly_one_call() {
        let (extractor, client) = extractor(MockInferenceClient::new(&valid_response()));
        let outcome = extractor
            .extract("Doctor: chest pain consult transcript", &EncounterHints::default())
            .unwrap();

        assert_eq!(client.call_count(), 1);
        assert_eq!(outcome.status, ExtractionStatus::Extracted);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.artifact.follow_up_tasks.len(), 2);
        assert_eq!(outcome.artifact.follow_up_tasks[0].status, TaskStatus::Proposed);
    }

    #[test]
    fn provenance_is_stamped_on_success() {
        let (extractor, _) = extractor(MockInferenceClient::new(&valid_response()));
        let outcome = extractor
            .extract("transcript text", &EncounterHints::default())
            .unwrap();

        let meta = &outcome.artifact.extraction_metadata;
        assert_eq!(meta.model.as_deref(), Some("mock-extraction-model"));
        assert_eq!(meta.input_tokens, Some(100));
        assert_eq!(meta.output_tokens, Some(200));
        assert!(meta.extraction_timestamp.is_some());
        assert_eq!(meta.transcript_length, Some("transcript text".chars().count()));
        assert_eq!(meta.confidence, Some(ConfidenceLevel::High));
    }

    #[test]
    fn malformed_then_valid_uses_single_repair() {
        let (extractor, client) = extractor(MockInferenceClient::with_responses(vec![
            "this is not json at all".into(),
            valid_response(),
        ]));
        let outcome = extractor
            .extract("transcript", &EncounterHints::default())
            .unwrap();

        assert_eq!(client.call_count(), 2);
        assert_eq!(outcome.status, ExtractionStatus::Repaired);
        assert_eq!(outcome.attempts, 2);
        assert!(!outcome.artifact.follow_up_tasks.is_empty());
    }

    #[test]
    fn malformed_twice_falls_back() {
        let (extractor, client) = extractor(MockInferenceClient::with_responses(vec![
            "garbage one".into(),
            "garbage two".into(),
        ]));
        let outcome = extractor
            .extract("transcript", &EncounterHints::default())
            .unwrap();

        assert_eq!(client.call_count(), 2);
        assert!(outcome.fell_back());
        assert!(outcome.artifact.follow_up_tasks.is_empty());
        assert_eq!(
            outcome.artifact.extraction_metadata.confidence,
            Some(ConfidenceLevel::Low)
        );
        // The fallback is itself schema-valid.
        let value = serde_json::to_value(&outcome.artifact).unwrap();
        assert!(crate::artifact::validate(&value).is_ok());
    }

    #[test]
    fn semantic_failure_triggers_repair() {
        // Valid JSON with a dependency cycle, then a correct record.
        let cyclic = serde_json::json!({
            "version": "2.0",
            "metadata": {},
            "patient_context": {},
            "soap_notes": {},
            "clinical_safety": {},
            "follow_up_tasks": [
                {
                    "task_id": "a",
                    "task_type": "lab_order",
                    "description": "a",
                    "owner_role": "nurse",
                    "urgency": "routine",
                    "dependencies": ["b"]
                },
                {
                    "task_id": "b",
                    "task_type": "lab_order",
                    "description": "b",
                    "owner_role": "nurse",
                    "urgency": "routine",
                    "dependencies": ["a"]
                }
            ],
            "handover": {}
        });
        let (extractor, client) = extractor(MockInferenceClient::with_responses(vec![
            cyclic.to_string(),
            valid_response(),
        ]));
        let outcome = extractor
            .extract("transcript", &EncounterHints::default())
            .unwrap();

        assert_eq!(client.call_count(), 2);
        assert_eq!(outcome.status, ExtractionStatus::Repaired);
    }

    #[test]
    fn cycle_in_both_responses_cannot_bypass_validation() {
        let cyclic = serde_json::json!({
            "version": "2.0",
            "metadata": {},
            "patient_context": {},
            "soap_notes": {},
            "clinical_safety": {},
            "follow_up_tasks": [{
                "task_id": "a",
                "task_type": "lab_order",
                "description": "a",
                "owner_role": "nurse",
                "urgency": "routine",
                "dependencies": ["a"]
            }],
            "handover": {}
        })
        .to_string();
        let (extractor, _) =
            extractor(MockInferenceClient::with_responses(vec![cyclic.clone(), cyclic]));
        let outcome = extractor
            .extract("transcript", &EncounterHints::default())
            .unwrap();

        assert!(outcome.fell_back());
        assert!(outcome.artifact.follow_up_tasks.is_empty());
    }

    #[test]
    fn endpoint_error_falls_back_without_repair() {
        let (extractor, client) = extractor(MockInferenceClient::unreachable());
        let outcome = extractor
            .extract("transcript", &EncounterHints::default())
            .unwrap();

        assert_eq!(client.call_count(), 1);
        assert!(outcome.fell_back());
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn empty_transcript_is_a_caller_error() {
        let (extractor, client) = extractor(MockInferenceClient::new(&valid_response()));
        let result = extractor.extract("   \n\u{200B}  ", &EncounterHints::default());
        assert!(matches!(result, Err(ExtractionError::EmptyTranscript)));
        assert_eq!(client.call_count(), 0);
    }
}
