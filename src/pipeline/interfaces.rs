//! External collaborators at their interface: object store, transcript
//! source, job queue, notification channel. Each has a local implementation
//! thin enough for dev use and tests; the production bindings live outside
//! this crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use super::job::{parse_queue_message, QueuedJob};
use super::TransientIoError;

// ─── Object store ─────────────────────────────────────────────────────────────

/// Existence/metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

pub trait ObjectStore {
    /// Existence + metadata check. Missing objects are a transient fault:
    /// with at-least-once delivery the upload may still be settling.
    fn head(&self, key: &str) -> Result<ObjectMeta, TransientIoError>;

    /// Idempotent write-by-key.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TransientIoError>;

    /// Idempotent delete: removing a missing object is not an error.
    fn delete(&self, key: &str) -> Result<(), TransientIoError>;
}

/// Shared handles delegate, so tests can keep a reference to a collaborator
/// after handing it to the worker.
impl<T: ObjectStore + ?Sized> ObjectStore for std::sync::Arc<T> {
    fn head(&self, key: &str) -> Result<ObjectMeta, TransientIoError> {
        (**self).head(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TransientIoError> {
        (**self).put(key, bytes)
    }

    fn delete(&self, key: &str) -> Result<(), TransientIoError> {
        (**self).delete(key)
    }
}

/// Filesystem-backed object store rooted at one directory.
pub struct LocalFsObjectStore {
    root: PathBuf,
}

impl LocalFsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for LocalFsObjectStore {
    fn head(&self, key: &str) -> Result<ObjectMeta, TransientIoError> {
        let meta = fs::metadata(self.path_for(key))
            .map_err(|e| TransientIoError::new(format!("head {key}: {e}")))?;
        Ok(ObjectMeta {
            key: key.to_string(),
            size: meta.len(),
        })
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), TransientIoError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TransientIoError::new(format!("put {key}: {e}")))?;
        }
        fs::write(&path, bytes).map_err(|e| TransientIoError::new(format!("put {key}: {e}")))
    }

    fn delete(&self, key: &str) -> Result<(), TransientIoError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransientIoError::new(format!("delete {key}: {e}"))),
        }
    }
}

// ─── Transcript source ────────────────────────────────────────────────────────

pub trait TranscriptSource {
    /// Produce the transcript text for a fetched audio object.
    fn transcribe(&self, audio: &ObjectMeta) -> Result<String, TransientIoError>;
}

/// Reads a sidecar transcript written by the external speech-to-text
/// service: `transcripts/{audio_key}.txt` under the store root.
pub struct SidecarTranscriptSource {
    root: PathBuf,
}

impl SidecarTranscriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn transcript_path(&self, audio_key: &str) -> PathBuf {
        self.root.join("transcripts").join(format!("{audio_key}.txt"))
    }
}

impl TranscriptSource for SidecarTranscriptSource {
    fn transcribe(&self, audio: &ObjectMeta) -> Result<String, TransientIoError> {
        let path = self.transcript_path(&audio.key);
        fs::read_to_string(&path)
            .map_err(|e| TransientIoError::new(format!("transcript for {}: {e}", audio.key)))
    }
}

/// Test double returning a fixed transcript.
pub struct FixedTranscriptSource {
    text: String,
}

impl FixedTranscriptSource {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }
}

impl TranscriptSource for FixedTranscriptSource {
    fn transcribe(&self, _audio: &ObjectMeta) -> Result<String, TransientIoError> {
        Ok(self.text.clone())
    }
}

// ─── Job queue ────────────────────────────────────────────────────────────────

pub trait JobQueue {
    /// Next deliverable job, if any. At-least-once: the job stays queued
    /// until acknowledged.
    fn receive(&self) -> Result<Option<QueuedJob>, TransientIoError>;

    /// Idempotent acknowledge: a receipt that is already gone is not an
    /// error.
    fn acknowledge(&self, receipt: &str) -> Result<(), TransientIoError>;
}

/// Directory-spool queue: each message is a JSON file in the spool dir,
/// named by the upstream sender; the file name is the receipt.
pub struct SpoolDirQueue {
    dir: PathBuf,
}

impl SpoolDirQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn message_files(&self) -> Result<Vec<PathBuf>, TransientIoError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(TransientIoError::from)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl JobQueue for SpoolDirQueue {
    fn receive(&self) -> Result<Option<QueuedJob>, TransientIoError> {
        for path in self.message_files()? {
            let body = match fs::read_to_string(&path) {
                Ok(body) => body,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(TransientIoError::from(e)),
            };
            match parse_queue_message(&body) {
                Ok(job) => {
                    return Ok(Some(QueuedJob {
                        job,
                        receipt: path.to_string_lossy().into_owned(),
                    }))
                }
                Err(e) => {
                    // Poison message: park it out of the way instead of
                    // blocking the queue head forever.
                    tracing::warn!(file = %path.display(), error = %e, "Unparseable queue message, parking");
                    let parked = path.with_extension("rejected");
                    let _ = fs::rename(&path, parked);
                }
            }
        }
        Ok(None)
    }

    fn acknowledge(&self, receipt: &str) -> Result<(), TransientIoError> {
        match fs::remove_file(Path::new(receipt)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TransientIoError::from(e)),
        }
    }
}

// ─── Notification channel ─────────────────────────────────────────────────────

/// Fire-and-forget completion push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionNotice {
    pub job_key: String,
    pub status: String,
    pub summary: String,
}

pub trait Notifier {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), TransientIoError>;
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), TransientIoError> {
        (**self).notify(notice)
    }
}

/// Default sink: structured log line only.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), TransientIoError> {
        tracing::info!(
            job_key = %notice.job_key,
            status = %notice.status,
            summary = %notice.summary,
            "Job notification"
        );
        Ok(())
    }
}

/// Collects notices for assertions in tests.
#[derive(Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<CompletionNotice>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<CompletionNotice> {
        self.notices.lock().expect("notifier mutex poisoned").clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, notice: &CompletionNotice) -> Result<(), TransientIoError> {
        self.notices
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice.clone());
        Ok(())
    }
}
