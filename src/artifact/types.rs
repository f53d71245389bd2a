//! The Consultation Artifact: one structured record per consultation, from
//! which every downstream document is derived without further AI involvement.
//!
//! The typed core covers everything the derivation engine consumes. Each
//! section also carries a flattened extras map so forward-compatible fields
//! from the inference service survive a round trip instead of being dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::task::{Task, Urgency};

/// Root record produced by one extraction attempt per transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConsultationArtifact {
    pub version: String,
    pub metadata: EncounterMetadata,
    pub patient_context: PatientContext,
    pub soap_notes: SoapNotes,
    pub clinical_safety: ClinicalSafety,
    pub follow_up_tasks: Vec<Task>,
    pub handover: Handover,
    pub extraction_metadata: ExtractionMetadata,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Encounter context. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncounterMetadata {
    pub consultation_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    pub setting_type: Option<String>,
    pub specialty: Option<String>,
    pub encounter_type: Option<String>,
    pub participants: Vec<Participant>,
    pub location: Option<EncounterLocation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Participant {
    pub role: String,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EncounterLocation {
    pub facility: Option<String>,
    pub ward: Option<String>,
    pub room: Option<String>,
    pub bed: Option<String>,
}

/// De-identified demographic and clinical context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PatientContext {
    pub patient_identifier: Option<String>,
    pub age_range: Option<String>,
    pub gender: Option<String>,
    pub admission_date: Option<String>,
    pub hospital_day: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The four fixed SOAP sub-records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SoapNotes {
    pub subjective: Subjective,
    pub objective: Objective,
    pub assessment: Assessment,
    pub plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Subjective {
    pub chief_complaint: Option<String>,
    pub history_of_presenting_complaint: Option<String>,
    pub symptoms: Vec<Symptom>,
    pub past_medical_history: Vec<String>,
    pub current_medications: Vec<CurrentMedication>,
    pub allergies: Vec<Allergy>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Symptom {
    pub symptom: String,
    pub onset: Option<String>,
    pub duration: Option<String>,
    pub severity: Option<String>,
    pub characteristics: Option<String>,
    pub aggravating_factors: Vec<String>,
    pub relieving_factors: Vec<String>,
    pub associated_symptoms: Vec<String>,
    /// Verbatim quote for audit.
    pub transcript_evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CurrentMedication {
    pub medication: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub indication: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Allergy {
    pub allergen: String,
    pub reaction: Option<String>,
    pub severity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Objective {
    pub vital_signs: VitalSigns,
    pub physical_examination: Vec<ExamFinding>,
    pub investigations: Vec<Investigation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Vitals as charted. Values stay verbatim strings ("145/90", "97%").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VitalSigns {
    pub blood_pressure: Option<String>,
    pub heart_rate: Option<String>,
    pub respiratory_rate: Option<String>,
    pub temperature: Option<String>,
    pub oxygen_saturation: Option<String>,
    pub weight: Option<String>,
    pub pain_score: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl VitalSigns {
    /// Charted (label, value) pairs in the fixed table order, extras last.
    pub fn charted(&self) -> Vec<(String, String)> {
        let mut rows = Vec::new();
        let named: [(&str, &Option<String>); 7] = [
            ("Blood pressure", &self.blood_pressure),
            ("Heart rate", &self.heart_rate),
            ("Respiratory rate", &self.respiratory_rate),
            ("Temperature", &self.temperature),
            ("Oxygen saturation", &self.oxygen_saturation),
            ("Weight", &self.weight),
            ("Pain score", &self.pain_score),
        ];
        for (label, value) in named {
            if let Some(v) = value {
                rows.push((label.to_string(), v.clone()));
            }
        }
        for (key, value) in &self.extra {
            if let Value::String(v) = value {
                rows.push((humanize_key(key), v.clone()));
            }
        }
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.charted().is_empty()
    }
}

fn humanize_key(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExamFinding {
    pub system: Option<String>,
    pub findings: Option<String>,
    pub abnormalities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Investigation {
    pub test_type: Option<String>,
    pub test_name: String,
    pub result: Option<String>,
    pub interpretation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Assessment {
    pub primary_diagnosis: Option<String>,
    pub differential_diagnoses: Vec<DifferentialDiagnosis>,
    pub problem_list: Vec<Problem>,
    pub clinical_impression: Option<String>,
    pub severity_assessment: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DifferentialDiagnosis {
    pub diagnosis: String,
    pub likelihood: Option<Likelihood>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Likelihood {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Problem {
    pub problem: String,
    pub status: Option<String>,
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Plan {
    pub treatment_plan: Option<String>,
    pub medications_prescribed: Vec<PrescribedMedication>,
    pub investigations_ordered: Vec<OrderedInvestigation>,
    pub referrals: Vec<PlannedReferral>,
    pub patient_education: Vec<String>,
    pub follow_up: FollowUpPlan,
    pub safety_netting: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrescribedMedication {
    pub medication: String,
    pub dose: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub indication: Option<String>,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrderedInvestigation {
    pub test_type: Option<String>,
    pub test_name: String,
    pub urgency: Option<Urgency>,
    pub indication: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PlannedReferral {
    pub specialty: String,
    pub urgency: Option<Urgency>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FollowUpPlan {
    pub required: Option<bool>,
    pub timeframe: Option<String>,
    pub reason: Option<String>,
    pub with_whom: Option<String>,
}

/// Red flags, risk factors, gaps, and the extractor's own confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClinicalSafety {
    pub red_flags: Vec<RedFlag>,
    pub risk_factors: Vec<String>,
    pub contraindications: Vec<Contraindication>,
    pub missing_information: Vec<String>,
    pub clarifying_questions: Vec<String>,
    pub confidence_level: Option<ConfidenceLevel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedFlag {
    pub flag: String,
    pub severity: FlagSeverity,
    #[serde(default)]
    pub action_taken: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagSeverity {
    Critical,
    High,
    Moderate,
}

impl FlagSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagSeverity::Critical => "critical",
            FlagSeverity::High => "high",
            FlagSeverity::Moderate => "moderate",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Contraindication {
    pub item: String,
    pub contraindication: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Moderate,
    Low,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Moderate => "moderate",
            ConfidenceLevel::Low => "low",
        }
    }
}

/// SBAR handover plus escalation criteria and next review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Handover {
    pub situation: Option<String>,
    pub background: Option<String>,
    pub assessment: Option<String>,
    pub recommendation: Option<String>,
    pub active_issues: Vec<String>,
    pub pending_tasks_summary: Option<String>,
    pub escalation_criteria: Vec<String>,
    pub next_review_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Handover {
    pub fn is_empty(&self) -> bool {
        self.situation.is_none()
            && self.background.is_none()
            && self.assessment.is_none()
            && self.recommendation.is_none()
            && self.active_issues.is_empty()
            && self.escalation_criteria.is_empty()
            && self.next_review_time.is_none()
    }
}

/// Extraction provenance. Informational only, never consumed by derivation
/// except as the fixed generation-time field on rendered output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractionMetadata {
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub extraction_timestamp: Option<DateTime<Utc>>,
    pub transcript_length: Option<usize>,
    pub confidence: Option<ConfidenceLevel>,
    pub processing_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_fields_survive_round_trip() {
        let json = serde_json::json!({
            "version": "2.0",
            "metadata": { "setting_type": "clinic", "novel_field": "kept" },
            "soap_notes": {
                "subjective": { "chief_complaint": "chest pain" }
            },
            "future_section": { "a": 1 }
        });

        let artifact: ConsultationArtifact = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(
            artifact.metadata.extra.get("novel_field"),
            Some(&Value::String("kept".into()))
        );
        assert!(artifact.extra.contains_key("future_section"));

        let back = serde_json::to_value(&artifact).unwrap();
        assert_eq!(back["metadata"]["novel_field"], "kept");
        assert_eq!(back["future_section"]["a"], 1);
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let artifact: ConsultationArtifact =
            serde_json::from_value(serde_json::json!({ "version": "2.0" })).unwrap();
        assert!(artifact.follow_up_tasks.is_empty());
        assert!(artifact.soap_notes.subjective.chief_complaint.is_none());
        assert!(artifact.handover.is_empty());
        assert!(artifact.soap_notes.objective.vital_signs.is_empty());
    }

    #[test]
    fn charted_vitals_keep_table_order_and_extras() {
        let vitals: VitalSigns = serde_json::from_value(serde_json::json!({
            "heart_rate": "88",
            "blood_pressure": "145/90",
            "gcs": "15"
        }))
        .unwrap();

        let rows = vitals.charted();
        assert_eq!(rows[0].0, "Blood pressure");
        assert_eq!(rows[1].0, "Heart rate");
        assert_eq!(rows[2], ("Gcs".to_string(), "15".to_string()));
    }

    #[test]
    fn confidence_level_wire_names() {
        assert_eq!(
            serde_json::to_value(ConfidenceLevel::Low).unwrap(),
            Value::String("low".into())
        );
        let parsed: ConfidenceLevel = serde_json::from_value(Value::String("high".into())).unwrap();
        assert_eq!(parsed, ConfidenceLevel::High);
    }
}
