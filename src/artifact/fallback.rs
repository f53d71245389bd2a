//! The minimal fallback artifact: emitted when extraction cannot produce a
//! valid result, so downstream derivation never needs a null-artifact branch.

use chrono::{DateTime, Utc};

use super::types::{ClinicalSafety, ConfidenceLevel, ConsultationArtifact, ExtractionMetadata};
use super::ARTIFACT_VERSION;

/// Note recorded in `clinical_safety.missing_information` on fallback.
pub const FALLBACK_NOTE: &str = "automated extraction failed";

/// Build the same-shaped, schema-valid artifact used when extraction fails:
/// low confidence, the failure flagged as missing information, no tasks.
pub fn fallback_artifact(
    extracted_at: DateTime<Utc>,
    model: Option<&str>,
    transcript_length: usize,
    reason: &str,
) -> ConsultationArtifact {
    ConsultationArtifact {
        version: ARTIFACT_VERSION.to_string(),
        clinical_safety: ClinicalSafety {
            missing_information: vec![FALLBACK_NOTE.to_string()],
            confidence_level: Some(ConfidenceLevel::Low),
            ..Default::default()
        },
        extraction_metadata: ExtractionMetadata {
            model: model.map(str::to_string),
            extraction_timestamp: Some(extracted_at),
            transcript_length: Some(transcript_length),
            confidence: Some(ConfidenceLevel::Low),
            processing_notes: Some(reason.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::validate::validate;

    #[test]
    fn fallback_is_schema_valid() {
        let artifact = fallback_artifact(Utc::now(), Some("test-model"), 42, "malformed JSON");
        let value = serde_json::to_value(&artifact).unwrap();
        let validated = validate(&value).unwrap();
        assert_eq!(validated, artifact);
    }

    #[test]
    fn fallback_shape_matches_contract() {
        let artifact = fallback_artifact(Utc::now(), None, 0, "endpoint unreachable");
        assert!(artifact.follow_up_tasks.is_empty());
        assert_eq!(
            artifact.extraction_metadata.confidence,
            Some(ConfidenceLevel::Low)
        );
        assert_eq!(
            artifact.clinical_safety.missing_information,
            vec![FALLBACK_NOTE.to_string()]
        );
        assert_eq!(
            artifact.extraction_metadata.processing_notes.as_deref(),
            Some("endpoint unreachable")
        );
    }
}
