//! In-process step executor.
//!
//! External tools run as child processes; PREMIS activities run on the
//! blocking pool. When a call outlives its timeout the child is killed and
//! any activity still running is told to skip its write.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, warn};

use super::command::{CommandSpec, failures_from_stdout};
use super::{StepError, StepExecutor, StepOptions, StepRequest, StepResponse};
use crate::activities::{self, Abandon, create_dir_with_mode};
use crate::clock::Clock;
use crate::ids::IdSource;

/// Runs every step in this process: validation and bagging through external
/// commands, PREMIS activities on the blocking thread pool.
pub struct LocalExecutor {
    validation: CommandSpec,
    bagging: CommandSpec,
    ids: Arc<dyn IdSource>,
    clock: Arc<dyn Clock>,
}

impl LocalExecutor {
    pub fn new(
        validation: CommandSpec,
        bagging: CommandSpec,
        ids: Arc<dyn IdSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validation,
            bagging,
            ids,
            clock,
        }
    }

    async fn attempt(
        &self,
        request: StepRequest,
        abandon: &Abandon,
    ) -> Result<StepResponse, StepError> {
        let step = request.name();
        match request {
            StepRequest::ValidateFileFormats { path } => {
                if !self.validation.is_configured() {
                    warn!(step, "no validation command configured; accepting all formats");
                    return Ok(StepResponse::FormatValidation {
                        failures: Vec::new(),
                    });
                }
                let output = self.validation.run(step, &path).await?;
                Ok(StepResponse::FormatValidation {
                    failures: failures_from_stdout(&output.stdout),
                })
            }
            StepRequest::CreateBag { source_path } => {
                if self.bagging.is_configured() {
                    self.bagging.run(step, &source_path).await?;
                } else {
                    warn!(step, "no bagging command configured; leaving SIP as is");
                }
                Ok(StepResponse::Bag {
                    bag_path: source_path,
                })
            }
            StepRequest::CreateMetadataDir { path } => {
                blocking(step, move || create_dir_with_mode(&path, 0o750)).await??;
                Ok(StepResponse::Done)
            }
            StepRequest::AddPremisObjects(params) => {
                let ids = Arc::clone(&self.ids);
                let abandon = abandon.clone();
                blocking(step, move || {
                    activities::add_premis_objects(&params, ids.as_ref(), &abandon)
                })
                .await??;
                Ok(StepResponse::Done)
            }
            StepRequest::AddPremisEvent(params) => {
                let ids = Arc::clone(&self.ids);
                let at = self.clock.now();
                let abandon = abandon.clone();
                blocking(step, move || {
                    activities::add_premis_event(&params, ids.as_ref(), at, &abandon)
                })
                .await??;
                Ok(StepResponse::Done)
            }
            StepRequest::AddPremisAgent(params) => {
                let abandon = abandon.clone();
                blocking(step, move || activities::add_premis_agent(&params, &abandon)).await??;
                Ok(StepResponse::Done)
            }
        }
    }

    async fn run_attempts(
        &self,
        request: StepRequest,
        max_attempts: u32,
        abandon: &Abandon,
    ) -> Result<StepResponse, StepError> {
        let step = request.name();
        let mut attempt = 1;
        loop {
            match self.attempt(request.clone(), abandon).await {
                Ok(response) => return Ok(response),
                Err(e) if attempt < max_attempts && e.is_retryable() => {
                    warn!(step, attempt, max_attempts, error = %e, "step attempt failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Runs `f` on the blocking pool. Dropping the returned future does not stop
/// `f`; activities watch their [`Abandon`] flag instead.
async fn blocking<F, T>(step: &str, f: F) -> Result<T, StepError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StepError::failed(step, format!("task aborted: {e}")))
}

impl StepExecutor for LocalExecutor {
    async fn execute(
        &self,
        name: &str,
        request: StepRequest,
        options: StepOptions,
    ) -> Result<StepResponse, StepError> {
        if name != request.name() {
            return Err(StepError::NameMismatch {
                step: name.to_string(),
                request: request.name(),
            });
        }

        debug!(step = name, timeout = ?options.timeout, "executing step");
        let abandon = Abandon::default();
        let attempts = self.run_attempts(request, options.max_attempts.max(1), &abandon);
        match timeout(options.timeout, attempts).await {
            Ok(result) => result,
            Err(_) => {
                abandon.raise();
                warn!(step = name, after = ?options.timeout, "step timed out");
                Err(StepError::Timeout {
                    step: name.to_string(),
                    after: options.timeout,
                })
            }
        }
    }
}
