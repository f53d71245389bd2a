pub mod fallback;
pub mod task;
pub mod types;
pub mod validate;

pub use fallback::*;
pub use task::*;
pub use types::*;
pub use validate::*;

use thiserror::Error;

/// Artifact schema version produced by this crate.
pub const ARTIFACT_VERSION: &str = "2.0";

/// A single validation finding, anchored to a field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Dotted path into the candidate document, e.g. `follow_up_tasks[2].urgency`.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Rejection of a candidate artifact, carrying every field path that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("artifact validation failed: {}", summarize(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue {
                path: path.into(),
                message: message.into(),
            }],
        }
    }
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
