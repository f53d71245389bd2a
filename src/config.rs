//! Worker configuration: environment-driven settings with sane defaults.

use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "clinscribe";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,clinscribe=debug".to_string()
}

/// Static facility details injected into rendered documents. Never persisted
/// as part of the artifact.
#[derive(Debug, Clone, Default)]
pub struct FacilityInfo {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl FacilityInfo {
    pub fn from_env() -> Self {
        Self {
            name: std::env::var("CLINSCRIBE_FACILITY_NAME")
                .unwrap_or_else(|_| "Medical Facility".to_string()),
            address: std::env::var("CLINSCRIBE_FACILITY_ADDRESS").ok(),
            phone: std::env::var("CLINSCRIBE_FACILITY_PHONE").ok(),
        }
    }
}

/// Per-worker settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub inference_url: String,
    pub inference_model: String,
    pub inference_timeout_secs: u64,
    /// Whole-stage retries for fetch/transcribe transient faults.
    pub fetch_retries: u32,
    /// Retries for persisting the already-computed projection.
    pub persist_retries: u32,
    /// Idle wait between empty queue polls.
    pub poll_idle_wait: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inference_url: "http://localhost:11434".to_string(),
            inference_model: "clinical-extraction:latest".to_string(),
            inference_timeout_secs: 300,
            fetch_retries: 3,
            persist_retries: 3,
            poll_idle_wait: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            inference_url: std::env::var("CLINSCRIBE_INFERENCE_URL")
                .unwrap_or(defaults.inference_url),
            inference_model: std::env::var("CLINSCRIBE_INFERENCE_MODEL")
                .unwrap_or(defaults.inference_model),
            inference_timeout_secs: env_number("CLINSCRIBE_INFERENCE_TIMEOUT_SECS")
                .unwrap_or(defaults.inference_timeout_secs),
            fetch_retries: env_number("CLINSCRIBE_FETCH_RETRIES").unwrap_or(defaults.fetch_retries),
            persist_retries: env_number("CLINSCRIBE_PERSIST_RETRIES")
                .unwrap_or(defaults.persist_retries),
            poll_idle_wait: env_number("CLINSCRIBE_POLL_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_idle_wait),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Application data directory: ~/.clinscribe/
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".clinscribe")
}

/// Spool directory watched by the local job queue.
pub fn spool_dir() -> PathBuf {
    app_data_dir().join("spool")
}

/// Root of the filesystem object store.
pub fn object_store_dir() -> PathBuf {
    app_data_dir().join("objects")
}
