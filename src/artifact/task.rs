//! Follow-up tasks: the actionable output of a consultation. Each task
//! carries a structured automation payload (`required_inputs`) whose variant
//! must agree with the task's `task_type`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One actionable follow-up item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable within one artifact, e.g. "task-001".
    pub task_id: String,
    pub task_type: TaskType,
    pub description: String,
    pub owner_role: String,
    pub urgency: Urgency,
    #[serde(default)]
    pub due_at: Option<DueTime>,
    #[serde(default)]
    pub location: Option<TaskLocation>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Verbatim quote supporting this task, for audit.
    #[serde(default)]
    pub transcript_evidence: Option<String>,
    #[serde(default)]
    pub required_inputs: Option<RequiredInputs>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Closed set of automatable task kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Prescription,
    ImagingOrder,
    LabOrder,
    NursingObservation,
    DischargeStep,
    Procedure,
    Referral,
    RoomBooking,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Prescription => "prescription",
            TaskType::ImagingOrder => "imaging_order",
            TaskType::LabOrder => "lab_order",
            TaskType::NursingObservation => "nursing_observation",
            TaskType::DischargeStep => "discharge_step",
            TaskType::Procedure => "procedure",
            TaskType::Referral => "referral",
            TaskType::RoomBooking => "room_booking",
        }
    }

    /// Human label for rendered documents ("IMAGING ORDER").
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

/// stat > urgent > routine > low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Stat,
    Urgent,
    Routine,
    Low,
}

impl Urgency {
    /// Sort rank: lower is more urgent.
    pub fn rank(&self) -> u8 {
        match self {
            Urgency::Stat => 0,
            Urgency::Urgent => 1,
            Urgency::Routine => 2,
            Urgency::Low => 3,
        }
    }

    /// The band counted by `urgent_task_count`.
    pub fn is_urgent_band(&self) -> bool {
        matches!(self, Urgency::Stat | Urgency::Urgent)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Stat => "stat",
            Urgency::Urgent => "urgent",
            Urgency::Routine => "routine",
            Urgency::Low => "low",
        }
    }
}

/// proposed → pending → in_progress → completed | cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Proposed,
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Proposed => "proposed",
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

/// Either an absolute timestamp or a relative token ("within 2 hours").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DueTime {
    Absolute(DateTime<Utc>),
    Relative(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TaskLocation {
    pub ward: Option<String>,
    pub room: Option<String>,
    pub department: Option<String>,
}

/// Structured automation payload, discriminated by `kind`.
///
/// The discriminant must match the owning task's `task_type`; the validator
/// enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequiredInputs {
    Prescription(PrescriptionOrder),
    ImagingOrder(ImagingOrder),
    LabOrder(LabOrder),
    NursingObservation(ObservationSchedule),
    DischargeStep(DischargePlan),
    Procedure(ProcedureRequest),
    Referral(ReferralRequest),
    RoomBooking(RoomBookingRequest),
}

impl RequiredInputs {
    /// The task type this payload belongs to.
    pub fn kind(&self) -> TaskType {
        match self {
            RequiredInputs::Prescription(_) => TaskType::Prescription,
            RequiredInputs::ImagingOrder(_) => TaskType::ImagingOrder,
            RequiredInputs::LabOrder(_) => TaskType::LabOrder,
            RequiredInputs::NursingObservation(_) => TaskType::NursingObservation,
            RequiredInputs::DischargeStep(_) => TaskType::DischargeStep,
            RequiredInputs::Procedure(_) => TaskType::Procedure,
            RequiredInputs::Referral(_) => TaskType::Referral,
            RequiredInputs::RoomBooking(_) => TaskType::RoomBooking,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionOrder {
    pub medication: String,
    #[serde(default)]
    pub dose: Option<String>,
    #[serde(default)]
    pub route: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub repeats: Option<u32>,
    #[serde(default)]
    pub indication: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ImagingOrder {
    pub modality: Option<String>,
    pub body_part: Option<String>,
    pub contrast: Option<bool>,
    pub clinical_question: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabOrder {
    pub test_name: String,
    #[serde(default)]
    pub sample_type: Option<String>,
    #[serde(default)]
    pub fasting_required: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservationSchedule {
    pub observation_type: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub parameters: Vec<String>,
    pub escalation_criteria: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DischargePlan {
    pub estimated_date: Option<String>,
    pub estimated_time: Option<String>,
    pub destination: Option<String>,
    pub transport_required: Option<bool>,
    pub medications_to_prepare: Vec<String>,
    pub equipment_needed: Vec<String>,
    pub follow_up_appointments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcedureRequest {
    pub name: String,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub consent_required: Option<bool>,
    #[serde(default)]
    pub equipment_needed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferralRequest {
    pub specialty: String,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub preferred_provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RoomBookingRequest {
    pub room_type: Option<String>,
    pub duration_minutes: Option<u32>,
    pub equipment_needed: Vec<String>,
    pub staff_required: Vec<String>,
}
