//! Per-job state machine: Fetching → Transcribing → Extracting → Deriving →
//! Persisting → Notifying → Cleaning → Done, with `Failed` reachable from
//! any step. `run_one_job` is the single testable entry point; the
//! continuous-poll wrapper is a thin shell in `poll`.
//!
//! Every stage is safe to re-run on the same job: fetch only reads,
//! persistence is an upsert by key, cleanup tolerates already-deleted
//! objects and already-acknowledged messages.

use crate::artifact::ConsultationArtifact;
use crate::config::{FacilityInfo, WorkerConfig};
use crate::derive::{note_object_key, project_for_storage, render_document, render_interchange_bundle};
use crate::extraction::{ArtifactExtractor, EncounterHints, ExtractionStatus};
use crate::storage::{ProjectionStore, StorageProjection};

use super::interfaces::{CompletionNotice, JobQueue, Notifier, ObjectStore, TranscriptSource};
use super::job::{JobState, QueuedJob};
use super::TransientIoError;

/// Terminal result of one job run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done,
    Failed { state: JobState, reason: String },
}

/// What happened to one job, for callers and tests.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_key: String,
    pub outcome: JobOutcome,
    /// States entered, in order, ending with Done or Failed.
    pub states: Vec<JobState>,
    pub extraction: Option<ExtractionStatus>,
    /// Persisting attempts actually made.
    pub persist_attempts: u32,
}

impl JobReport {
    pub fn is_done(&self) -> bool {
        self.outcome == JobOutcome::Done
    }
}

/// One worker processes one job end-to-end; independent workers share
/// nothing but the storage layer.
pub struct PipelineWorker {
    objects: Box<dyn ObjectStore + Send + Sync>,
    transcripts: Box<dyn TranscriptSource + Send + Sync>,
    extractor: ArtifactExtractor,
    projections: Box<dyn ProjectionStore + Send + Sync>,
    queue: Box<dyn JobQueue + Send + Sync>,
    notifier: Box<dyn Notifier + Send + Sync>,
    facility: FacilityInfo,
    hints: EncounterHints,
    config: WorkerConfig,
}

impl PipelineWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        objects: Box<dyn ObjectStore + Send + Sync>,
        transcripts: Box<dyn TranscriptSource + Send + Sync>,
        extractor: ArtifactExtractor,
        projections: Box<dyn ProjectionStore + Send + Sync>,
        queue: Box<dyn JobQueue + Send + Sync>,
        notifier: Box<dyn Notifier + Send + Sync>,
        facility: FacilityInfo,
        config: WorkerConfig,
    ) -> Self {
        Self {
            objects,
            transcripts,
            extractor,
            projections,
            queue,
            notifier,
            facility,
            hints: EncounterHints::default(),
            config,
        }
    }

    /// Encounter hints passed to every extraction this worker runs.
    pub fn with_hints(mut self, hints: EncounterHints) -> Self {
        self.hints = hints;
        self
    }

    /// Receive and process at most one job.
    pub fn poll_once(&self) -> Result<Option<JobReport>, TransientIoError> {
        match self.queue.receive()? {
            Some(queued) => Ok(Some(self.run_one_job(&queued))),
            None => Ok(None),
        }
    }

    /// Drive one job through the full state machine.
    pub fn run_one_job(&self, queued: &QueuedJob) -> JobReport {
        let job_key = queued.job.audio_key.clone();
        let _span = tracing::info_span!("run_one_job", job_key = %job_key).entered();

        let mut states = Vec::new();
        let mut extraction = None;
        let mut persist_attempts = 0;

        let outcome = match self.execute(queued, &mut states, &mut extraction, &mut persist_attempts)
        {
            Ok(()) => {
                states.push(JobState::Done);
                tracing::info!(states = states.len(), "Job complete");
                JobOutcome::Done
            }
            Err((state, reason)) => {
                states.push(JobState::Failed);
                tracing::error!(state = %state, reason = %reason, "Job failed");
                JobOutcome::Failed { state, reason }
            }
        };

        JobReport {
            job_key,
            outcome,
            states,
            extraction,
            persist_attempts,
        }
    }

    fn execute(
        &self,
        queued: &QueuedJob,
        states: &mut Vec<JobState>,
        extraction: &mut Option<ExtractionStatus>,
        persist_attempts: &mut u32,
    ) -> Result<(), (JobState, String)> {
        let job = &queued.job;

        // Fetching: existence/metadata only; the audio bytes themselves are
        // consumed by the external transcription service.
        states.push(JobState::Fetching);
        let audio = self.retry(JobState::Fetching, self.config.fetch_retries, || {
            self.objects.head(&job.audio_key)
        })?;

        // Transcribing (external). An empty transcript is a transcription
        // fault, not an extraction one.
        states.push(JobState::Transcribing);
        let transcript = self.retry(JobState::Transcribing, self.config.fetch_retries, || {
            let text = self.transcripts.transcribe(&audio)?;
            if text.trim().is_empty() {
                return Err(TransientIoError::new("transcriber returned empty text"));
            }
            Ok(text)
        })?;

        // Extracting: internal fallback means this never aborts the job.
        states.push(JobState::Extracting);
        let outcome = self
            .extractor
            .extract(&transcript, &self.hints)
            .map_err(|e| (JobState::Extracting, e.to_string()))?;
        *extraction = Some(outcome.status);
        if outcome.fell_back() {
            tracing::warn!("Extraction fell back; continuing with low-confidence artifact");
        }
        let artifact = outcome.artifact;

        // Deriving: total by construction. A failure here is a programming
        // defect: log the artifact for offline diagnosis and abort.
        states.push(JobState::Deriving);
        let note_pdf = render_document(&artifact, &self.facility).map_err(|e| {
            tracing::error!(
                error = %e,
                artifact = %serde_json::to_string(&artifact).unwrap_or_default(),
                "Derivation defect"
            );
            (JobState::Deriving, e.to_string())
        })?;
        let bundle = render_interchange_bundle(&artifact, &job.audio_key);
        let mut projection = project_for_storage(&artifact, &job.audio_key, &transcript);
        projection.interchange_bundle = Some(bundle);

        // Persisting: bounded retry reusing the already-computed outputs.
        // Derivation is pure, so nothing is recomputed.
        states.push(JobState::Persisting);
        let note_key = note_object_key(&job.audio_key);
        self.retry_counted(
            JobState::Persisting,
            self.config.persist_retries,
            persist_attempts,
            || {
                self.objects.put(&note_key, &note_pdf)?;
                self.projections
                    .upsert(&projection)
                    .map_err(|e| TransientIoError::new(e.to_string()))
            },
        )?;

        // Notifying: fire and forget.
        states.push(JobState::Notifying);
        let notice = completion_notice(&projection, &artifact, outcome.status);
        if let Err(e) = self.notifier.notify(&notice) {
            tracing::warn!(error = %e, "Notification failed; job continues");
        }

        // Cleaning: only after persistence, and idempotent throughout.
        states.push(JobState::Cleaning);
        self.retry(JobState::Cleaning, self.config.fetch_retries, || {
            self.objects.delete(&job.audio_key)
        })?;
        if let Err(e) = self.queue.acknowledge(&queued.receipt) {
            // Redelivery is safe: every stage re-runs cleanly.
            tracing::warn!(error = %e, "Acknowledge failed; job will be redelivered");
        }

        Ok(())
    }

    fn retry<T>(
        &self,
        state: JobState,
        max_attempts: u32,
        op: impl FnMut() -> Result<T, TransientIoError>,
    ) -> Result<T, (JobState, String)> {
        let mut attempts = 0;
        self.retry_counted(state, max_attempts, &mut attempts, op)
    }

    fn retry_counted<T>(
        &self,
        state: JobState,
        max_attempts: u32,
        attempts: &mut u32,
        mut op: impl FnMut() -> Result<T, TransientIoError>,
    ) -> Result<T, (JobState, String)> {
        let mut last_error = String::new();
        while *attempts < max_attempts {
            *attempts += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        state = %state,
                        attempt = *attempts,
                        max_attempts,
                        error = %last_error,
                        "Stage attempt failed"
                    );
                }
            }
        }
        Err((
            state,
            format!("retries exhausted after {max_attempts} attempts: {last_error}"),
        ))
    }
}

/// `{job_key, status, summary}` pushed on completion.
fn completion_notice(
    projection: &StorageProjection,
    artifact: &ConsultationArtifact,
    status: ExtractionStatus,
) -> CompletionNotice {
    let status_text = match status {
        ExtractionStatus::Extracted | ExtractionStatus::Repaired => "complete",
        ExtractionStatus::FellBack => "complete_low_confidence",
    };
    let headline = artifact
        .soap_notes
        .assessment
        .primary_diagnosis
        .as_deref()
        .or(artifact.soap_notes.subjective.chief_complaint.as_deref())
        .unwrap_or("no diagnosis recorded");

    CompletionNotice {
        job_key: projection.audio_key.clone(),
        status: status_text.to_string(),
        summary: format!(
            "{} tasks ({} urgent); {headline}",
            projection.total_task_count, projection.urgent_task_count
        ),
    }
}
