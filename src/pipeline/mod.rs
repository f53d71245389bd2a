pub mod interfaces;
pub mod job;
pub mod poll;
pub mod worker;

pub use interfaces::*;
pub use job::*;
pub use poll::*;
pub use worker::*;

use thiserror::Error;

/// Retryable store/network fault from an external collaborator.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct TransientIoError(pub String);

impl TransientIoError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<std::io::Error> for TransientIoError {
    fn from(e: std::io::Error) -> Self {
        Self(e.to_string())
    }
}
