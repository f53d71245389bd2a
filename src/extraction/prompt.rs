//! Prompt construction for the single extraction call and the one repair
//! re-ask. The prompt instructs the model to emit the artifact schema with
//! no surrounding prose.

/// Encounter-context hints used to parameterize the request.
#[derive(Debug, Clone, Default)]
pub struct EncounterHints {
    pub setting_type: Option<String>,
    pub specialty: Option<String>,
}

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"
You are a clinical extraction assistant. You convert consultation
transcripts into one structured JSON record used for medical records, SOAP
notes, task automation, and clinical handover.

RULES — ABSOLUTE, NO EXCEPTIONS:
1. Output ONLY a JSON object. No prose, no explanations, no markdown fences.
2. Extract ONLY information explicitly stated in the transcript.
3. Never infer, diagnose, or add clinical opinion of your own.
4. Use null for any field not present in the transcript.
5. Preserve exact values (doses, vitals, times) verbatim.
6. Quote the transcript verbatim in every transcript_evidence field.
7. List every actionable task with its complete required_inputs payload.
8. Flag missing critical information in clinical_safety.
"#;

/// Build the one-shot extraction prompt for a sanitized transcript.
pub fn build_extraction_prompt(transcript: &str, hints: &EncounterHints) -> String {
    let mut context = String::new();
    if let Some(setting) = &hints.setting_type {
        context.push_str(&format!("Care setting: {setting}\n"));
    }
    if let Some(specialty) = &hints.specialty {
        context.push_str(&format!("Specialty: {specialty}\n"));
    }

    format!(
        r#"{context}TRANSCRIPT TO ANALYZE:
<transcript>
{transcript}
</transcript>

Return a JSON object with EXACTLY this structure (every top-level key
required; use null or [] where nothing applies):

{{
  "version": "2.0",
  "metadata": {{
    "timestamp": "ISO 8601 datetime if mentioned, else null",
    "setting_type": "clinic|hospital_inpatient|emergency_department|telehealth|nursing_home|other",
    "specialty": "general_practice|internal_medicine|surgery|emergency_medicine|nursing|other",
    "encounter_type": "initial_consultation|follow_up|ward_round|admission|discharge|handover|procedure|emergency",
    "participants": [{{"role": "doctor|nurse|patient|family|other", "identifier": "de-identified description"}}],
    "location": {{"facility": null, "ward": null, "room": null, "bed": null}}
  }},
  "patient_context": {{
    "patient_identifier": "de-identified placeholder",
    "age_range": "0-1|1-5|5-12|12-18|18-40|40-65|65+",
    "gender": "male|female|other|not_specified",
    "admission_date": "YYYY-MM-DD if inpatient, else null",
    "hospital_day": null
  }},
  "soap_notes": {{
    "subjective": {{
      "chief_complaint": "primary reason in the patient's words",
      "history_of_presenting_complaint": "narrative",
      "symptoms": [{{"symptom": "name", "onset": null, "duration": null, "severity": "mild|moderate|severe", "characteristics": null, "aggravating_factors": [], "relieving_factors": [], "associated_symptoms": [], "transcript_evidence": "exact quote"}}],
      "past_medical_history": [],
      "current_medications": [{{"medication": "name", "dose": null, "frequency": null, "indication": null}}],
      "allergies": [{{"allergen": "substance", "reaction": null, "severity": null}}]
    }},
    "objective": {{
      "vital_signs": {{"blood_pressure": null, "heart_rate": null, "respiratory_rate": null, "temperature": null, "oxygen_saturation": null, "weight": null, "pain_score": null}},
      "physical_examination": [{{"system": "cardiovascular|respiratory|abdominal|neurological|other", "findings": "text", "abnormalities": []}}],
      "investigations": [{{"test_type": null, "test_name": "name", "result": null, "interpretation": "normal|abnormal|pending"}}]
    }},
    "assessment": {{
      "primary_diagnosis": "working diagnosis",
      "differential_diagnoses": [{{"diagnosis": "alternative", "likelihood": "high|moderate|low", "reasoning": null}}],
      "problem_list": [{{"problem": "issue", "status": "active|improving|resolved|chronic|new", "priority": 1}}],
      "clinical_impression": "overall reasoning",
      "severity_assessment": "stable|improving|deteriorating|critical|not_assessed"
    }},
    "plan": {{
      "treatment_plan": "overall strategy",
      "medications_prescribed": [{{"medication": "name", "dose": null, "route": "PO|IV|IM|SC|topical|inhaled", "frequency": null, "duration": null, "indication": null, "special_instructions": null}}],
      "investigations_ordered": [{{"test_type": null, "test_name": "name", "urgency": "stat|urgent|routine", "indication": null}}],
      "referrals": [{{"specialty": "name", "urgency": "stat|urgent|routine", "reason": null}}],
      "patient_education": [],
      "follow_up": {{"required": false, "timeframe": null, "reason": null, "with_whom": null}},
      "safety_netting": []
    }}
  }},
  "clinical_safety": {{
    "red_flags": [{{"flag": "concerning sign", "severity": "critical|high|moderate", "action_taken": null}}],
    "risk_factors": [],
    "contraindications": [{{"item": "medication/procedure", "contraindication": "reason"}}],
    "missing_information": [],
    "clarifying_questions": [],
    "confidence_level": "high|moderate|low"
  }},
  "follow_up_tasks": [
    {{
      "task_id": "task-001",
      "task_type": "prescription|imaging_order|lab_order|nursing_observation|discharge_step|procedure|referral|room_booking",
      "description": "clear human-readable description",
      "owner_role": "doctor|nurse|admin|radiology|pharmacy|lab|other",
      "urgency": "stat|urgent|routine|low",
      "due_at": "ISO datetime or relative time like 'within 2 hours'",
      "location": {{"ward": null, "room": null, "department": null}},
      "dependencies": ["task ids this task waits for"],
      "status": "proposed",
      "transcript_evidence": "exact quote supporting this task",
      "required_inputs": {{
        "kind": "same value as task_type",
        "...": "payload fields for that kind, e.g. for prescription: medication, dose, route, frequency, duration, repeats, indication, special_instructions; for imaging_order: modality, body_part, contrast, clinical_question; for lab_order: test_name, sample_type, fasting_required; for nursing_observation: observation_type, frequency, duration, parameters, escalation_criteria; for discharge_step: estimated_date, destination, transport_required, medications_to_prepare; for procedure: name, site, consent_required; for referral: specialty, urgency, reason, preferred_provider; for room_booking: room_type, duration_minutes, equipment_needed, staff_required"
      }}
    }}
  ],
  "handover": {{
    "situation": "current situation (SBAR)",
    "background": "relevant background",
    "assessment": "current assessment",
    "recommendation": "recommended actions",
    "active_issues": [],
    "pending_tasks_summary": null,
    "escalation_criteria": [],
    "next_review_time": null
  }}
}}

Task dependency rules: a task lists in "dependencies" only the task_ids it
must wait for; never create circular dependencies; the "kind" inside
required_inputs must equal the task_type.

Return ONLY the JSON object."#
    )
}

/// Build the single repair re-ask, quoting the validator's findings.
pub fn build_repair_prompt(previous_response: &str, validation_errors: &str) -> String {
    format!(
        r#"Your previous output was not a valid consultation record.

Validation errors:
{validation_errors}

Previous output:
{previous_response}

Correct these errors and return the FULL JSON object again. Return ONLY the
JSON object — no prose, no markdown fences."#
    )
}
