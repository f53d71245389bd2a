//! Interchange (health-record) bundle: a fixed set of FHIR-aligned wire
//! resources derived from one artifact. Every resource id is a UUIDv5 of the
//! job key plus a resource path, so repeated derivation from the same
//! artifact is byte-for-byte reproducible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::ConsultationArtifact;

use super::document::note_object_key;

/// Fixed namespace for v5 resource ids. Never change this: stored bundles
/// reference ids derived from it.
pub const INTERCHANGE_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_9b2e_41d7_4c58_8a30_52e7_b1aa_04d9);

/// Stable id for one resource of one job.
pub fn resource_id(job_key: &str, resource_path: &str) -> Uuid {
    Uuid::new_v5(
        &INTERCHANGE_NAMESPACE,
        format!("{job_key}/{resource_path}").as_bytes(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeBundle {
    pub resource_type: String,
    pub id: String,
    #[serde(rename = "type")]
    pub bundle_type: String,
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEntry {
    pub full_url: String,
    pub resource: Resource,
}

/// The fixed resource set this bundle can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "resourceType")]
pub enum Resource {
    Encounter(EncounterResource),
    Condition(ConditionResource),
    MedicationRequest(MedicationRequestResource),
    DocumentReference(DocumentReferenceResource),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EncounterResource {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<CodeableConcept>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reason_code: Vec<CodeableConcept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionResource {
    pub id: String,
    pub clinical_status: String,
    pub verification_status: String,
    pub code: CodeableConcept,
    pub encounter: Reference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationRequestResource {
    pub id: String,
    pub status: String,
    pub intent: String,
    pub medication: CodeableConcept,
    pub encounter: Reference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dosage_instruction: Vec<DosageInstruction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReferenceResource {
    pub id: String,
    pub status: String,
    #[serde(rename = "type")]
    pub doc_type: CodeableConcept,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub content: Vec<DocumentContent>,
    pub context: Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CodeableConcept {
    pub text: String,
}

impl CodeableConcept {
    fn of(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Period {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub reference: String,
}

impl Reference {
    fn urn(id: Uuid) -> Self {
        Self {
            reference: format!("urn:uuid:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosageInstruction {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContent {
    pub attachment: Attachment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub url: String,
}

/// Map one artifact onto the interchange resource set.
pub fn render_interchange_bundle(
    artifact: &ConsultationArtifact,
    job_key: &str,
) -> InterchangeBundle {
    let encounter_id = resource_id(job_key, "encounter");
    let encounter_ref = Reference::urn(encounter_id);
    let mut entries = Vec::new();

    let soap = &artifact.soap_notes;

    entries.push(entry(
        encounter_id,
        Resource::Encounter(EncounterResource {
            id: encounter_id.to_string(),
            status: "finished".into(),
            class: artifact.metadata.setting_type.clone().map(|t| CodeableConcept::of(t)),
            service_type: artifact.metadata.specialty.clone().map(|t| CodeableConcept::of(t)),
            period: artifact.metadata.timestamp.map(|start| Period { start: Some(start) }),
            reason_code: soap
                .subjective
                .chief_complaint
                .clone()
                .map(|t| CodeableConcept::of(t))
                .into_iter()
                .collect(),
        }),
    ));

    if let Some(diagnosis) = &soap.assessment.primary_diagnosis {
        let id = resource_id(job_key, "condition/primary");
        entries.push(entry(
            id,
            Resource::Condition(ConditionResource {
                id: id.to_string(),
                clinical_status: "active".into(),
                verification_status: "confirmed".into(),
                code: CodeableConcept::of(diagnosis.clone()),
                encounter: encounter_ref.clone(),
                note: None,
            }),
        ));
    }

    for (index, differential) in soap.assessment.differential_diagnoses.iter().enumerate() {
        let id = resource_id(job_key, &format!("condition/differential/{index}"));
        entries.push(entry(
            id,
            Resource::Condition(ConditionResource {
                id: id.to_string(),
                clinical_status: "active".into(),
                verification_status: "provisional".into(),
                code: CodeableConcept::of(differential.diagnosis.clone()),
                encounter: encounter_ref.clone(),
                note: differential.reasoning.clone(),
            }),
        ));
    }

    for (index, medication) in soap.plan.medications_prescribed.iter().enumerate() {
        let id = resource_id(job_key, &format!("medication-request/{index}"));
        let dosage = [
            medication.dose.as_deref(),
            medication.route.as_deref(),
            medication.frequency.as_deref(),
            medication.duration.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

        entries.push(entry(
            id,
            Resource::MedicationRequest(MedicationRequestResource {
                id: id.to_string(),
                status: "active".into(),
                intent: "order".into(),
                medication: CodeableConcept::of(medication.medication.clone()),
                encounter: encounter_ref.clone(),
                dosage_instruction: if dosage.is_empty() {
                    Vec::new()
                } else {
                    vec![DosageInstruction { text: dosage }]
                },
                reason: medication.indication.clone(),
            }),
        ));
    }

    let note_id = resource_id(job_key, "document-reference/note");
    entries.push(entry(
        note_id,
        Resource::DocumentReference(DocumentReferenceResource {
            id: note_id.to_string(),
            status: "current".into(),
            doc_type: CodeableConcept::of("Consultation note"),
            description: soap.subjective.chief_complaint.clone(),
            content: vec![DocumentContent {
                attachment: Attachment {
                    content_type: "application/pdf".into(),
                    url: note_object_key(job_key),
                },
            }],
            context: encounter_ref,
        }),
    ));

    InterchangeBundle {
        resource_type: "Bundle".into(),
        id: resource_id(job_key, "bundle").to_string(),
        bundle_type: "collection".into(),
        entry: entries,
    }
}

fn entry(id: Uuid, resource: Resource) -> BundleEntry {
    BundleEntry {
        full_url: format!("urn:uuid:{id}"),
        resource,
    }
}
