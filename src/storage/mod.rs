pub mod record;
pub mod store;
pub mod task_updates;

pub use record::*;
pub use store::*;
pub use task_updates::*;

use thiserror::Error;

/// Storage-layer failures.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Retryable store/network fault.
    #[error("transient storage error: {0}")]
    Transient(String),

    /// Optimistic-concurrency guard tripped: the stored record moved on.
    #[error("version conflict on \"{key}\": expected {expected}, found {found}")]
    Conflict {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("no record for key \"{0}\"")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
