//! Worker shell: wires the pipeline to its local collaborators and polls
//! the spool queue until the process is stopped.

use std::sync::atomic::AtomicBool;

use tracing_subscriber::EnvFilter;

use clinscribe::config::{self, FacilityInfo, WorkerConfig};
use clinscribe::extraction::{ArtifactExtractor, ExtractionOptions, HttpInferenceClient};
use clinscribe::pipeline::{
    run_poll_loop, LocalFsObjectStore, LogNotifier, PipelineWorker, SidecarTranscriptSource,
    SpoolDirQueue,
};
use clinscribe::storage::InMemoryProjectionStore;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("clinscribe worker starting v{}", config::APP_VERSION);

    let worker_config = WorkerConfig::from_env();
    let facility = FacilityInfo::from_env();

    let spool = config::spool_dir();
    let objects_root = config::object_store_dir();
    for dir in [&spool, &objects_root] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!(dir = %dir.display(), error = %e, "Cannot create data directory");
            std::process::exit(1);
        }
    }

    let client = HttpInferenceClient::new(
        &worker_config.inference_url,
        &worker_config.inference_model,
        worker_config.inference_timeout_secs,
    );
    tracing::info!(
        url = %worker_config.inference_url,
        model = %worker_config.inference_model,
        "Inference endpoint configured"
    );

    let idle_wait = worker_config.poll_idle_wait;
    let worker = PipelineWorker::new(
        Box::new(LocalFsObjectStore::new(&objects_root)),
        Box::new(SidecarTranscriptSource::new(&objects_root)),
        ArtifactExtractor::new(Box::new(client), ExtractionOptions::default()),
        Box::new(InMemoryProjectionStore::new()),
        Box::new(SpoolDirQueue::new(&spool)),
        Box::new(LogNotifier),
        facility,
        worker_config,
    );

    tracing::info!(spool = %spool.display(), "Waiting for jobs");
    let shutdown = AtomicBool::new(false);
    run_poll_loop(&worker, idle_wait, &shutdown);
}
