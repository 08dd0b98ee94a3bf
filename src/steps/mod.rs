//! The port between the orchestrator and whatever actually runs its steps.
//!
//! The orchestrator only ever calls [`StepExecutor::execute`]; scheduling,
//! timeouts and retries belong to the implementation behind it.

mod command;
mod local;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::activities::{AddPremisAgentParams, AddPremisEventParams, AddPremisObjectsParams};
use crate::premis::PremisError;

pub use command::CommandSpec;
pub use local::LocalExecutor;

pub const VALIDATE_FILE_FORMATS: &str = "validate-file-formats";
pub const CREATE_BAG: &str = "create-bag";
pub const CREATE_METADATA_DIR: &str = "create-metadata-dir";
pub const ADD_PREMIS_OBJECTS: &str = "add-premis-objects";
pub const ADD_PREMIS_EVENT: &str = "add-premis-event";
pub const ADD_PREMIS_AGENT: &str = "add-premis-agent";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepRequest {
    ValidateFileFormats { path: PathBuf },
    CreateBag { source_path: PathBuf },
    CreateMetadataDir { path: PathBuf },
    AddPremisObjects(AddPremisObjectsParams),
    AddPremisEvent(AddPremisEventParams),
    AddPremisAgent(AddPremisAgentParams),
}

impl StepRequest {
    /// The step name this request belongs to.
    pub fn name(&self) -> &'static str {
        match self {
            StepRequest::ValidateFileFormats { .. } => VALIDATE_FILE_FORMATS,
            StepRequest::CreateBag { .. } => CREATE_BAG,
            StepRequest::CreateMetadataDir { .. } => CREATE_METADATA_DIR,
            StepRequest::AddPremisObjects(_) => ADD_PREMIS_OBJECTS,
            StepRequest::AddPremisEvent(_) => ADD_PREMIS_EVENT,
            StepRequest::AddPremisAgent(_) => ADD_PREMIS_AGENT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepResponse {
    /// An empty list means every format is allowed.
    FormatValidation { failures: Vec<String> },
    Bag { bag_path: PathBuf },
    Done,
}

/// Scheduling bounds for one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOptions {
    /// Upper bound on the whole call, attempts included.
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl StepOptions {
    /// One attempt, no retry.
    pub fn single_attempt(timeout: Duration) -> Self {
        Self {
            timeout,
            max_attempts: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("step {step} timed out after {after:?}")]
    Timeout { step: String, after: Duration },

    #[error("step {step} failed: {reason}")]
    Failed { step: String, reason: String },

    #[error("step {step} returned an unexpected response")]
    UnexpectedResponse { step: String },

    #[error("request for {request} sent under step name {step}")]
    NameMismatch { step: String, request: &'static str },

    #[error(transparent)]
    Premis(#[from] PremisError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StepError {
    pub fn failed(step: &str, reason: impl Into<String>) -> Self {
        StepError::Failed {
            step: step.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether another attempt could plausibly succeed. Malformed requests
    /// and unreadable documents won't fix themselves.
    pub fn is_retryable(&self) -> bool {
        match self {
            StepError::Timeout { .. } | StepError::Io(_) | StepError::Failed { .. } => true,
            StepError::Premis(PremisError::Io(_)) => true,
            StepError::Premis(_)
            | StepError::UnexpectedResponse { .. }
            | StepError::NameMismatch { .. } => false,
        }
    }
}

/// Runs named steps on behalf of the orchestrator.
pub trait StepExecutor: Send + Sync {
    fn execute(
        &self,
        name: &str,
        request: StepRequest,
        options: StepOptions,
    ) -> impl Future<Output = Result<StepResponse, StepError>> + Send;
}
