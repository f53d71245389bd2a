//! Clinical note rendering via `printpdf`. Deterministic template, no AI
//! and no wall clock: the footer and the PDF's own dates come from the
//! artifact's fixed generation-time field, so rendering the same artifact
//! twice yields identical bytes.

use std::io::BufWriter;

use chrono::{DateTime, Utc};
use printpdf::*;

use crate::artifact::{ConsultationArtifact, DueTime, Task, Urgency};
use crate::config::FacilityInfo;
use crate::tasks::tasks_by_urgency;

use super::DerivationError;

const PAGE_WIDTH_MM: f32 = 210.0;
const PAGE_HEIGHT_MM: f32 = 297.0;
const TOP_Y_MM: f32 = 280.0;
const BOTTOM_Y_MM: f32 = 18.0;

pub const DOCUMENT_DISCLAIMER: &str =
    "This document was automatically generated from a consultation transcript. Please review for accuracy.";

/// Object-store key of the rendered note for a job. Also referenced by the
/// interchange bundle's DocumentReference, so both derivations agree.
pub fn note_object_key(job_key: &str) -> String {
    format!("documents/{job_key}.note.pdf")
}

/// Render the fixed-layout consultation note. Total over any validated
/// artifact: missing sections are omitted, never errors.
pub fn render_document(
    artifact: &ConsultationArtifact,
    facility: &FacilityInfo,
) -> Result<Vec<u8>, DerivationError> {
    let generated_at = generation_time(artifact);

    let (doc, page1, layer1) = PdfDocument::new(
        "Consultation Notes",
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Layer 1",
    );
    // Pin document dates to the artifact's generation time and skip XMP
    // metadata, otherwise repeated rendering would not be byte-identical.
    let pdf_date = to_pdf_date(generated_at);
    let doc = doc
        .with_conformance(PdfConformance::Custom(CustomPdfConformance {
            requires_icc_profile: false,
            requires_xmp_metadata: false,
            ..Default::default()
        }))
        .with_creation_date(pdf_date)
        .with_mod_date(pdf_date);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| DerivationError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| DerivationError::Pdf(format!("font error: {e}")))?;

    let layer = doc.get_page(page1).get_layer(layer1);
    let mut w = NoteWriter {
        doc: &doc,
        layer,
        font,
        bold,
        y: TOP_Y_MM,
    };

    write_header(&mut w, artifact, facility);
    write_red_flags(&mut w, artifact);
    write_soap(&mut w, artifact);
    write_tasks(&mut w, &artifact.follow_up_tasks);
    write_handover(&mut w, artifact);
    write_footer(&mut w, generated_at);

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| DerivationError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| DerivationError::Pdf(format!("buffer error: {e}")))
}

/// The single fixed timestamp a rendered note may carry.
fn generation_time(artifact: &ConsultationArtifact) -> DateTime<Utc> {
    artifact
        .extraction_metadata
        .extraction_timestamp
        .or(artifact.metadata.timestamp)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn to_pdf_date(ts: DateTime<Utc>) -> time::OffsetDateTime {
    time::OffsetDateTime::from_unix_timestamp(ts.timestamp())
        .unwrap_or(time::OffsetDateTime::UNIX_EPOCH)
}

// ─── Layout writer ────────────────────────────────────────────────────────────

struct NoteWriter<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    font: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl NoteWriter<'_> {
    fn ensure_space(&mut self, needed_mm: f32) {
        if self.y - needed_mm < BOTTOM_Y_MM {
            self.new_page();
        }
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH_MM), Mm(PAGE_HEIGHT_MM), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP_Y_MM;
    }

    fn spacer(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn title(&mut self, text: &str) {
        self.ensure_space(10.0);
        self.layer.use_text(text, 14.0, Mm(20.0), Mm(self.y), &self.bold);
        self.y -= 8.0;
    }

    fn heading(&mut self, text: &str) {
        self.ensure_space(12.0);
        self.layer.use_text(text, 11.0, Mm(20.0), Mm(self.y), &self.bold);
        self.y -= 6.0;
    }

    fn subheading(&mut self, text: &str) {
        self.ensure_space(9.0);
        self.layer.use_text(text, 10.0, Mm(20.0), Mm(self.y), &self.bold);
        self.y -= 5.0;
    }

    fn body(&mut self, text: &str) {
        for line in wrap_text(text, 95) {
            self.ensure_space(5.0);
            self.layer.use_text(&line, 9.0, Mm(20.0), Mm(self.y), &self.font);
            self.y -= 4.5;
        }
    }

    fn bullet(&mut self, text: &str) {
        for (i, line) in wrap_text(text, 88).into_iter().enumerate() {
            self.ensure_space(5.0);
            let prefix = if i == 0 { "· " } else { "  " };
            self.layer
                .use_text(format!("{prefix}{line}"), 9.0, Mm(25.0), Mm(self.y), &self.font);
            self.y -= 4.5;
        }
    }

    fn kv_row(&mut self, label: &str, value: &str) {
        self.ensure_space(5.0);
        self.layer
            .use_text(label, 9.0, Mm(25.0), Mm(self.y), &self.bold);
        self.layer
            .use_text(value, 9.0, Mm(70.0), Mm(self.y), &self.font);
        self.y -= 4.5;
    }

    fn alert(&mut self, text: &str) {
        for line in wrap_text(text, 85) {
            self.ensure_space(5.5);
            self.layer
                .use_text(&line, 10.0, Mm(20.0), Mm(self.y), &self.bold);
            self.y -= 5.0;
        }
    }

    fn small(&mut self, text: &str) {
        for line in wrap_text(text, 110) {
            self.ensure_space(4.0);
            self.layer.use_text(&line, 7.0, Mm(20.0), Mm(self.y), &self.font);
            self.y -= 3.5;
        }
    }
}

// ─── Sections ─────────────────────────────────────────────────────────────────

fn write_header(w: &mut NoteWriter<'_>, artifact: &ConsultationArtifact, facility: &FacilityInfo) {
    if !facility.name.is_empty() {
        w.subheading(&facility.name);
        if let Some(address) = &facility.address {
            w.body(address);
        }
        if let Some(phone) = &facility.phone {
            w.body(&format!("Ph: {phone}"));
        }
        w.spacer(4.0);
    }

    w.title("CONSULTATION NOTES");

    for (label, value) in metadata_rows(artifact) {
        w.kv_row(&format!("{label}:"), &value);
    }
    w.spacer(4.0);
}

/// Metadata block rows, in fixed order.
fn metadata_rows(artifact: &ConsultationArtifact) -> Vec<(String, String)> {
    let meta = &artifact.metadata;
    let patient = &artifact.patient_context;
    let mut rows = Vec::new();

    if let Some(ts) = meta.timestamp {
        rows.push(("Date".to_string(), ts.format("%Y-%m-%d").to_string()));
    }
    if let Some(setting) = &meta.setting_type {
        rows.push(("Setting".to_string(), title_case(setting)));
    }
    if let Some(encounter) = &meta.encounter_type {
        rows.push(("Encounter".to_string(), title_case(encounter)));
    }
    if let Some(specialty) = &meta.specialty {
        rows.push(("Specialty".to_string(), title_case(specialty)));
    }
    if let Some(age) = &patient.age_range {
        rows.push(("Patient age".to_string(), age.clone()));
    }
    if let Some(day) = patient.hospital_day {
        rows.push(("Hospital day".to_string(), day.to_string()));
    }
    rows
}

fn write_red_flags(w: &mut NoteWriter<'_>, artifact: &ConsultationArtifact) {
    let flags = &artifact.clinical_safety.red_flags;
    if flags.is_empty() {
        return;
    }
    w.alert("!! RED FLAGS / ALERTS");
    for flag in flags {
        let action = flag.action_taken.as_deref().unwrap_or("no action documented");
        w.alert(&format!(
            "[{}] {} - {}",
            flag.severity.as_str().to_uppercase(),
            flag.flag,
            action
        ));
    }
    w.spacer(3.0);
}

fn write_soap(w: &mut NoteWriter<'_>, artifact: &ConsultationArtifact) {
    let soap = &artifact.soap_notes;

    // SUBJECTIVE
    w.heading("SUBJECTIVE");
    let subjective = &soap.subjective;
    if let Some(complaint) = &subjective.chief_complaint {
        w.subheading("Chief complaint");
        w.body(complaint);
    }
    if let Some(history) = &subjective.history_of_presenting_complaint {
        w.subheading("History of presenting complaint");
        w.body(history);
    }
    if !subjective.symptoms.is_empty() {
        w.subheading("Symptoms");
        for symptom in &subjective.symptoms {
            let mut line = symptom.symptom.clone();
            if let Some(onset) = &symptom.onset {
                line.push_str(&format!(" - onset {onset}"));
            }
            if let Some(severity) = &symptom.severity {
                line.push_str(&format!(", {severity}"));
            }
            if let Some(characteristics) = &symptom.characteristics {
                line.push_str(&format!(" - {characteristics}"));
            }
            w.bullet(&line);
        }
    }
    if !subjective.current_medications.is_empty() {
        w.subheading("Current medications");
        for med in &subjective.current_medications {
            w.bullet(&join_parts(&[
                Some(med.medication.as_str()),
                med.dose.as_deref(),
                med.frequency.as_deref(),
                med.indication.as_deref(),
            ]));
        }
    }
    if !subjective.allergies.is_empty() {
        w.subheading("Allergies");
        for allergy in &subjective.allergies {
            w.bullet(&join_parts(&[
                Some(allergy.allergen.as_str()),
                allergy.reaction.as_deref(),
                allergy.severity.as_deref(),
            ]));
        }
    }
    w.spacer(3.0);

    // OBJECTIVE
    w.heading("OBJECTIVE");
    let objective = &soap.objective;
    let vitals = objective.vital_signs.charted();
    if !vitals.is_empty() {
        w.subheading("Vital signs");
        for (label, value) in vitals {
            w.kv_row(&label, &value);
        }
    }
    if !objective.physical_examination.is_empty() {
        w.subheading("Physical examination");
        for exam in &objective.physical_examination {
            let system = exam.system.as_deref().unwrap_or("general");
            let findings = exam.findings.as_deref().unwrap_or("no findings documented");
            w.bullet(&format!("{}: {}", title_case(system), findings));
            for abnormality in &exam.abnormalities {
                w.bullet(&format!("  {abnormality}"));
            }
        }
    }
    if !objective.investigations.is_empty() {
        w.subheading("Investigations");
        for inv in &objective.investigations {
            w.bullet(&join_parts(&[
                Some(inv.test_name.as_str()),
                inv.result.as_deref(),
                inv.interpretation.as_deref(),
            ]));
        }
    }
    w.spacer(3.0);

    // ASSESSMENT
    w.heading("ASSESSMENT");
    let assessment = &soap.assessment;
    if let Some(diagnosis) = &assessment.primary_diagnosis {
        w.subheading("Primary diagnosis");
        w.body(diagnosis);
    }
    if let Some(impression) = &assessment.clinical_impression {
        w.subheading("Clinical impression");
        w.body(impression);
    }
    if !assessment.differential_diagnoses.is_empty() {
        w.subheading("Differential diagnoses");
        for differential in &assessment.differential_diagnoses {
            let likelihood = differential
                .likelihood
                .map(|l| format!("{l:?}").to_lowercase())
                .unwrap_or_else(|| "unspecified".to_string());
            w.bullet(&format!("{} ({likelihood})", differential.diagnosis));
        }
    }
    if !assessment.problem_list.is_empty() {
        w.subheading("Problem list");
        let mut problems: Vec<_> = assessment.problem_list.iter().collect();
        problems.sort_by_key(|p| p.priority.unwrap_or(u32::MAX));
        for problem in problems {
            w.bullet(&join_parts(&[
                Some(problem.problem.as_str()),
                problem.status.as_deref(),
            ]));
        }
    }
    w.spacer(3.0);

    // PLAN
    w.heading("PLAN");
    let plan = &soap.plan;
    if let Some(treatment) = &plan.treatment_plan {
        w.body(treatment);
    }
    if !plan.medications_prescribed.is_empty() {
        w.subheading("Medications prescribed");
        for med in &plan.medications_prescribed {
            w.bullet(&join_parts(&[
                Some(med.medication.as_str()),
                med.dose.as_deref(),
                med.route.as_deref(),
                med.frequency.as_deref(),
                med.duration.as_deref(),
                med.indication.as_deref(),
            ]));
        }
    }
    if !plan.investigations_ordered.is_empty() {
        w.subheading("Investigations ordered");
        for inv in &plan.investigations_ordered {
            let urgency = inv
                .urgency
                .map(|u| format!("[{}] ", u.as_str().to_uppercase()))
                .unwrap_or_default();
            w.bullet(&format!(
                "{urgency}{}{}",
                inv.test_name,
                inv.indication
                    .as_deref()
                    .map(|i| format!(" - {i}"))
                    .unwrap_or_default()
            ));
        }
    }
    if !plan.referrals.is_empty() {
        w.subheading("Referrals");
        for referral in &plan.referrals {
            w.bullet(&join_parts(&[
                Some(referral.specialty.as_str()),
                referral.urgency.map(|u| u.as_str()),
                referral.reason.as_deref(),
            ]));
        }
    }
    if plan.follow_up.required.unwrap_or(false) {
        w.subheading("Follow-up");
        w.bullet(&join_parts(&[
            plan.follow_up.timeframe.as_deref(),
            plan.follow_up.with_whom.as_deref(),
            plan.follow_up.reason.as_deref(),
        ]));
    }
    if !plan.safety_netting.is_empty() {
        w.subheading("Safety netting");
        for item in &plan.safety_netting {
            w.bullet(item);
        }
    }
}

fn write_tasks(w: &mut NoteWriter<'_>, tasks: &[Task]) {
    if tasks.is_empty() {
        return;
    }
    w.spacer(4.0);
    w.heading("FOLLOW-UP TASKS");

    let bands: [(&str, Vec<&Task>); 3] = [
        ("STAT (immediate)", tasks_by_urgency(tasks, Urgency::Stat)),
        ("Urgent", tasks_by_urgency(tasks, Urgency::Urgent)),
        (
            "Routine",
            tasks
                .iter()
                .filter(|t| matches!(t.urgency, Urgency::Routine | Urgency::Low))
                .collect(),
        ),
    ];

    for (band_label, band_tasks) in bands {
        if band_tasks.is_empty() {
            continue;
        }
        w.subheading(band_label);
        for task in band_tasks {
            let due = match &task.due_at {
                Some(DueTime::Absolute(ts)) => format!(", due {}", ts.format("%Y-%m-%d %H:%M")),
                Some(DueTime::Relative(token)) => format!(", due {token}"),
                None => String::new(),
            };
            w.bullet(&format!(
                "[{}] {} - {}{due}",
                task.task_type.label(),
                task.description,
                task.owner_role
            ));
        }
    }
}

fn write_handover(w: &mut NoteWriter<'_>, artifact: &ConsultationArtifact) {
    let handover = &artifact.handover;
    if handover.is_empty() {
        return;
    }

    // Handover starts on its own page.
    w.new_page();
    w.title("CLINICAL HANDOVER");

    let sbar: [(&str, &Option<String>); 4] = [
        ("Situation", &handover.situation),
        ("Background", &handover.background),
        ("Assessment", &handover.assessment),
        ("Recommendation", &handover.recommendation),
    ];
    for (label, value) in sbar {
        if let Some(text) = value {
            w.subheading(label);
            w.body(text);
        }
    }
    if !handover.active_issues.is_empty() {
        w.subheading("Active issues");
        for issue in &handover.active_issues {
            w.bullet(issue);
        }
    }
    if let Some(summary) = &handover.pending_tasks_summary {
        w.subheading("Pending tasks");
        w.body(summary);
    }
    if !handover.escalation_criteria.is_empty() {
        w.subheading("Escalation criteria");
        for criterion in &handover.escalation_criteria {
            w.bullet(criterion);
        }
    }
    if let Some(next_review) = &handover.next_review_time {
        w.subheading("Next review");
        w.body(next_review);
    }
}

fn write_footer(w: &mut NoteWriter<'_>, generated_at: DateTime<Utc>) {
    w.spacer(8.0);
    w.small(&format!(
        "Generated: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    w.small(DOCUMENT_DISCLAIMER);
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// "hospital_inpatient" → "Hospital inpatient"
fn title_case(value: &str) -> String {
    let spaced = value.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

/// Join present parts with " - ", skipping the missing ones.
fn join_parts(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .copied()
        .collect::<Vec<_>>()
        .join(" - ")
}

/// Simple word wrap for PDF text rendering.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::validate;
    use serde_json::json;

    fn facility() -> FacilityInfo {
        FacilityInfo {
            name: "Harbour Medical Centre".into(),
            address: Some("12 Quay Street, Auckland".into()),
            phone: Some("09-123-4567".into()),
        }
    }

    fn artifact() -> ConsultationArtifact {
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
                    "symptoms": [{"symptom": "chest pain", "onset": "Monday 9am", "severity": "moderate"}],
                    "current_medications": [{"medication": "Amlodipine", "dose": "5mg", "frequency": "daily"}],
                    "allergies": [{"allergen": "Penicillin", "reaction": "rash"}]
                },
                "objective": {
                    "vital_signs": {
                        "blood_pressure": "145/90",
                        "heart_rate": "88",
                        "oxygen_saturation": "97%"
                    },
                    "physical_examination": [
                        {"system": "respiratory", "findings": "chest clear"}
                    ]
                },
                "assessment": {
                    "primary_diagnosis": "Chest pain - query cardiac",
                    "differential_diagnoses": [
                        {"diagnosis": "Acute coronary syndrome", "likelihood": "moderate"}
                    ],
                    "clinical_impression": "Requires urgent workup"
                },
                "plan": {
                    "medications_prescribed": [{"medication": "Aspirin", "dose": "300mg", "route": "PO"}],
                    "investigations_ordered": [{"test_name": "ECG", "urgency": "stat"}],
                    "follow_up": {"required": true, "timeframe": "today"},
                    "safety_netting": ["Call ambulance if pain worsens"]
                }
            },
            "clinical_safety": {
                "red_flags": [{"flag": "Chest pain with risk factors", "severity": "high", "action_taken": "workup started"}]
            },
            "follow_up_tasks": [
                {"task_id": "t1", "task_type": "lab_order", "description": "ECG now", "owner_role": "nurse", "urgency": "stat", "due_at": "immediately"},
                {"task_id": "t2", "task_type": "referral", "description": "Cardiology review", "owner_role": "doctor", "urgency": "urgent", "dependencies": ["t1"]},
                {"task_id": "t3", "task_type": "nursing_observation", "description": "Hourly vitals", "owner_role": "nurse", "urgency": "routine"}
            ],
            "handover": {
                "situation": "Chest pain under investigation",
                "background": "Hypertensive, on amlodipine",
                "assessment": "Stable, awaiting results",
                "recommendation": "Review after ECG and troponin",
                "escalation_criteria": ["Worsening pain"],
                "next_review_time": "1-2 hours"
            }
        }))
        .unwrap()
    }

    #[test]
    fn renders_a_pdf() {
        let bytes = render_document(&artifact(), &facility()).unwrap();
        assert!(bytes.len() > 1_000);
        assert_eq!(&bytes[..5], b"%PDF-");
    }

    #[test]
    fn rendering_is_byte_for_byte_idempotent() {
        let artifact = artifact();
        let a = render_document(&artifact, &facility()).unwrap();
        let b = render_document(&artifact, &facility()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fallback_artifact_renders_nonempty_document() {
        let fallback = crate::artifact::fallback_artifact(
            chrono::Utc::now(),
            Some("model"),
            10,
            "extraction failed",
        );
        let bytes = render_document(&fallback, &FacilityInfo::default()).unwrap();
        assert!(bytes.len() > 500);
        assert_eq!(&bytes[..5], b"%PDF-");
    }

    #[test]
    fn note_object_key_is_stable() {
        assert_eq!(
            note_object_key("uploads/PT001_abc.webm"),
            "documents/uploads/PT001_abc.webm.note.pdf"
        );
    }

    #[test]
    fn metadata_rows_fixed_order() {
        let rows = metadata_rows(&artifact());
        let labels: Vec<&str> = rows.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Date", "Setting", "Encounter", "Specialty", "Patient age"]
        );
        assert_eq!(rows[0].1, "2026-01-17");
        assert_eq!(rows[2].1, "Initial consultation");
    }

    #[test]
    fn wrap_text_respects_width() {
        let lines = wrap_text("one two three four five six seven", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert_eq!(lines.join(" "), "one two three four five six seven");
    }

    #[test]
    fn title_case_replaces_underscores() {
        assert_eq!(title_case("hospital_inpatient"), "Hospital inpatient");
        assert_eq!(title_case("clinic"), "Clinic");
    }

    #[test]
    fn join_parts_skips_missing() {
        assert_eq!(
            join_parts(&[Some("Aspirin"), None, Some("PO")]),
            "Aspirin - PO"
        );
        assert_eq!(join_parts(&[None, None]), "");
    }
}
