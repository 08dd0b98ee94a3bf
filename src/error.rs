//! Errors that end a workflow call or a CLI command without a run result.
//!
//! Step failures are not here: the orchestrator folds them into the run's
//! outcome and event log.

use thiserror::Error;

use crate::premis::PremisError;

#[derive(Debug, Error)]
pub enum PreprocessingError {
    /// The caller broke the input contract. Never retried, and no result exists.
    #[error("error calling workflow with unexpected inputs: {0}")]
    InvalidInput(String),

    #[error("PREMIS error: {0}")]
    Premis(#[from] PremisError),
}

impl PreprocessingError {
    /// Contract violations must not be retried by whatever scheduled the run.
    pub fn is_retryable(&self) -> bool {
        match self {
            PreprocessingError::InvalidInput(_) => false,
            PreprocessingError::Premis(e) => matches!(e, PremisError::Io(_)),
        }
    }
}
