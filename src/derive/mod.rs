pub mod document;
pub mod interchange;
pub mod projection;

pub use document::*;
pub use interchange::*;
pub use projection::*;

use thiserror::Error;

/// Derivation is total over validated artifacts; the only way to get here is
/// a defect in the PDF writer itself. The orchestrator treats it as fatal.
#[derive(Error, Debug)]
pub enum DerivationError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}
