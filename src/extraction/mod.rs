pub mod client;
pub mod contract;
pub mod parser;
pub mod prompt;
pub mod sanitize;

pub use client::*;
pub use contract::*;
pub use parser::*;
pub use prompt::*;
pub use sanitize::*;

use thiserror::Error;

use crate::artifact::ValidationError;

/// Failures inside the extraction contract. Everything except
/// `EmptyTranscript` is absorbed into the fallback artifact and never
/// surfaces as a pipeline failure.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("inference endpoint unreachable at {0}")]
    Connection(String),

    #[error("inference endpoint returned error (status {status}): {body}")]
    Endpoint { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("no JSON object found in inference response")]
    NoJsonPayload,

    #[error("JSON parsing error: {0}")]
    JsonParsing(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("transcript is empty")]
    EmptyTranscript,
}
