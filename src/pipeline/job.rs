//! Jobs and the per-job state machine vocabulary.
//!
//! Upstream delivers storage-event messages (the bucket/object shape the
//! upload notification produces); decoding one yields a [`Job`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One unit of work: an uploaded audio object to process end-to-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Object key of the source audio; also the storage partition key.
    pub audio_key: String,
    pub bucket: String,
}

/// A received job plus the queue's redelivery handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    pub job: Job,
    /// Opaque handle used to acknowledge (delete) the message.
    pub receipt: String,
}

/// States of the per-job pipeline. Strictly sequential; `Failed` is terminal
/// and reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Fetching,
    Transcribing,
    Extracting,
    Deriving,
    Persisting,
    Notifying,
    Cleaning,
    Done,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Fetching => "fetching",
            JobState::Transcribing => "transcribing",
            JobState::Extracting => "extracting",
            JobState::Deriving => "deriving",
            JobState::Persisting => "persisting",
            JobState::Notifying => "notifying",
            JobState::Cleaning => "cleaning",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum JobParseError {
    #[error("message is not valid JSON: {0}")]
    Json(String),

    #[error("message carries no records")]
    NoRecords,

    #[error("record is missing {0}")]
    MissingField(&'static str),
}

#[derive(Deserialize)]
struct EventMessage {
    #[serde(rename = "Records")]
    records: Vec<EventRecord>,
}

#[derive(Deserialize)]
struct EventRecord {
    s3: S3Record,
}

#[derive(Deserialize)]
struct S3Record {
    bucket: BucketRecord,
    object: ObjectRecord,
}

#[derive(Deserialize)]
struct BucketRecord {
    name: String,
}

#[derive(Deserialize)]
struct ObjectRecord {
    key: String,
}

/// Decode the upstream storage-event message into a [`Job`].
pub fn parse_queue_message(body: &str) -> Result<Job, JobParseError> {
    let message: EventMessage =
        serde_json::from_str(body).map_err(|e| JobParseError::Json(e.to_string()))?;
    let record = message.records.into_iter().next().ok_or(JobParseError::NoRecords)?;

    if record.s3.object.key.is_empty() {
        return Err(JobParseError::MissingField("object key"));
    }
    if record.s3.bucket.name.is_empty() {
        return Err(JobParseError::MissingField("bucket name"));
    }

    Ok(Job {
        audio_key: record.s3.object.key,
        bucket: record.s3.bucket.name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_storage_event_message() {
        let body = r#"{
            "Records": [{
                "s3": {
                    "bucket": {"name": "clinical-audio"},
                    "object": {"key": "uploads/PT001_9f3a.webm"}
                }
            }]
        }"#;
        let job = parse_queue_message(body).unwrap();
        assert_eq!(job.audio_key, "uploads/PT001_9f3a.webm");
        assert_eq!(job.bucket, "clinical-audio");
    }

    #[test]
    fn rejects_empty_records() {
        let err = parse_queue_message(r#"{"Records": []}"#).unwrap_err();
        assert!(matches!(err, JobParseError::NoRecords));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            parse_queue_message("not json"),
            Err(JobParseError::Json(_))
        ));
    }

    #[test]
    fn rejects_blank_key() {
        let body = r#"{"Records": [{"s3": {"bucket": {"name": "b"}, "object": {"key": ""}}}]}"#;
        assert!(matches!(
            parse_queue_message(body),
            Err(JobParseError::MissingField("object key"))
        ));
    }

    #[test]
    fn job_state_names() {
        assert_eq!(JobState::Fetching.as_str(), "fetching");
        assert_eq!(JobState::Done.to_string(), "done");
    }
}
