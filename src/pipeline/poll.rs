//! Continuous-poll wrapper around [`PipelineWorker::poll_once`]. Kept thin
//! on purpose: everything interesting lives in `run_one_job`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::worker::PipelineWorker;

/// Poll until `shutdown` is set. Empty polls and queue faults wait
/// `idle_wait` before the next attempt; completed jobs poll again
/// immediately.
pub fn run_poll_loop(worker: &PipelineWorker, idle_wait: Duration, shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::SeqCst) {
        match worker.poll_once() {
            Ok(Some(report)) => {
                tracing::debug!(job_key = %report.job_key, done = report.is_done(), "Job processed");
            }
            Ok(None) => std::thread::sleep(idle_wait),
            Err(e) => {
                tracing::warn!(error = %e, "Queue receive failed");
                std::thread::sleep(idle_wait);
            }
        }
    }
    tracing::info!("Poll loop shut down");
}
