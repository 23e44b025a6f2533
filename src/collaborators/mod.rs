//! External collaborators
//!
//! Interfaces to the systems the scanner consumes as black boxes: a
//! structured transaction record source and a risk classification service.
//! Failures here never abort a scan; the pipeline degrades the affected
//! report section instead.

use std::io;

use thiserror::Error;

pub mod classifier;
pub mod records;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for CollaboratorError {
    fn from(e: serde_json::Error) -> Self {
        CollaboratorError::InvalidResponse(e.to_string())
    }
}
