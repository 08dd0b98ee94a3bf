//! The preprocessing workflow: validate formats, bag the SIP, write PREMIS.
//!
//! [`PreprocessingWorkflow`] owns no I/O. It sends every step to a
//! [`StepExecutor`](crate::steps::StepExecutor), records one task per step in
//! the run's event log and lets the state machine decide when the run is over.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::activities::{AddPremisAgentParams, AddPremisEventParams, AddPremisObjectsParams};
use crate::clock::Clock;
use crate::error::PreprocessingError;
use crate::eventlog::EventHandle;
use crate::premis::{Agent, EventSummary};
use crate::state_machine::{
    RunState, StateMachine, StepVerdict, Transition, WorkflowParams, WorkflowResult,
};
use crate::steps::{
    ADD_PREMIS_AGENT, ADD_PREMIS_EVENT, ADD_PREMIS_OBJECTS, CREATE_BAG, CREATE_METADATA_DIR,
    StepError, StepExecutor, StepOptions, StepRequest, StepResponse, VALIDATE_FILE_FORMATS,
};

pub const VALIDATE_SIP_FILE_FORMATS: &str = "Validate SIP file formats";
pub const BAG_SIP: &str = "Bag SIP";
pub const CREATE_PREMIS_XML: &str = "Create premis.xml";

/// Matches the schedule-to-close bound the steps were designed around.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Runs a SIP through validation, bagging and PREMIS creation, classifying
/// the result. All side effects go through the [`StepExecutor`]; time comes
/// from the [`Clock`].
pub struct PreprocessingWorkflow<E, C> {
    shared_path: PathBuf,
    executor: E,
    clock: C,
    agent: Agent,
    step_timeout: Duration,
}

impl<E: StepExecutor, C: Clock> PreprocessingWorkflow<E, C> {
    pub fn new(shared_path: impl Into<PathBuf>, executor: E, clock: C) -> Self {
        Self {
            shared_path: shared_path.into(),
            executor,
            clock,
            agent: Agent::default(),
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Runs the workflow.
    ///
    /// Step failures are not errors: they end the run early and are reported
    /// through [`WorkflowResult::outcome`] and the closing event's message.
    /// Only a bad `params` yields `Err`, and then no result exists at all.
    pub async fn execute(&self, params: &WorkflowParams) -> Result<WorkflowResult, PreprocessingError> {
        debug!(relative_path = %params.relative_path, "preprocessing workflow running");
        check_relative_path(&params.relative_path)?;

        let mut result = WorkflowResult::new(&params.relative_path);
        let mut state = RunState::Running;
        let sip_path = self.shared_path.join(&params.relative_path);

        // Validate file formats.
        let ev = result.preservation_tasks.open(VALIDATE_SIP_FILE_FORMATS, self.clock.now());
        let failures = match self.validate(&sip_path).await {
            Ok(failures) => failures,
            Err(e) => {
                self.system_error(&mut result, &mut state, ev, &e, "file format validation has failed");
                return Ok(result);
            }
        };
        if !failures.is_empty() {
            result.preservation_tasks.content_error(
                ev,
                self.clock.now(),
                "file format validation has failed. One or more file formats are not allowed",
                &failures,
            );
            self.conclude(&mut result, &mut state, StepVerdict::ContentFailure, false);
            return Ok(result);
        }
        result
            .preservation_tasks
            .succeed(ev, self.clock.now(), "No disallowed file formats found");
        self.conclude(&mut result, &mut state, StepVerdict::Passed, false);

        // Bag the SIP.
        let ev = result.preservation_tasks.open(BAG_SIP, self.clock.now());
        if let Err(e) = self.bag(&sip_path).await {
            self.system_error(&mut result, &mut state, ev, &e, "bagging has failed");
            return Ok(result);
        }
        result
            .preservation_tasks
            .succeed(ev, self.clock.now(), "SIP has been bagged");
        self.conclude(&mut result, &mut state, StepVerdict::Passed, false);

        // Write PREMIS XML.
        let ev = result.preservation_tasks.open(CREATE_PREMIS_XML, self.clock.now());
        match self.write_premis_file(&sip_path, &failures).await {
            Ok(()) => {
                result.preservation_tasks.succeed(
                    ev,
                    self.clock.now(),
                    "Created a premis.xml and stored in metadata directory",
                );
                self.conclude(&mut result, &mut state, StepVerdict::Passed, true);
            }
            Err(e) => {
                self.system_error(&mut result, &mut state, ev, &e, "premis.xml creation has failed");
            }
        }

        Ok(result)
    }

    fn options(&self) -> StepOptions {
        StepOptions::single_attempt(self.step_timeout)
    }

    async fn call(&self, request: StepRequest) -> Result<StepResponse, StepError> {
        let name = request.name();
        self.executor.execute(name, request, self.options()).await
    }

    async fn validate(&self, sip_path: &Path) -> Result<Vec<String>, StepError> {
        let request = StepRequest::ValidateFileFormats {
            path: sip_path.to_path_buf(),
        };
        match self.call(request).await? {
            StepResponse::FormatValidation { failures } => Ok(failures),
            _ => Err(StepError::UnexpectedResponse {
                step: VALIDATE_FILE_FORMATS.to_string(),
            }),
        }
    }

    async fn bag(&self, sip_path: &Path) -> Result<PathBuf, StepError> {
        let request = StepRequest::CreateBag {
            source_path: sip_path.to_path_buf(),
        };
        match self.call(request).await? {
            StepResponse::Bag { bag_path } => Ok(bag_path),
            _ => Err(StepError::UnexpectedResponse {
                step: CREATE_BAG.to_string(),
            }),
        }
    }

    /// Builds `<sip>/metadata/premis.xml`: objects first, then one event
    /// fan-out per completed step, then the agent.
    async fn write_premis_file(&self, sip_path: &Path, failures: &[String]) -> Result<(), StepError> {
        let metadata_path = sip_path.join("metadata");
        let premis_file_path = metadata_path.join("premis.xml");

        self.call_done(
            CREATE_METADATA_DIR,
            StepRequest::CreateMetadataDir {
                path: metadata_path,
            },
        )
        .await?;

        self.call_done(
            ADD_PREMIS_OBJECTS,
            StepRequest::AddPremisObjects(AddPremisObjectsParams {
                sip_path: sip_path.to_path_buf(),
                premis_file_path: premis_file_path.clone(),
            }),
        )
        .await?;

        let summaries = [
            (
                EventSummary {
                    event_type: "validation".to_string(),
                    detail: format!("name=\"{VALIDATE_SIP_FILE_FORMATS}\""),
                    outcome_detail: "Format allowed".to_string(),
                },
                failures.to_vec(),
            ),
            (
                EventSummary {
                    event_type: "bagging".to_string(),
                    detail: format!("name=\"{BAG_SIP}\""),
                    outcome_detail: "SIP has been bagged".to_string(),
                },
                Vec::new(),
            ),
        ];
        for (summary, failures) in summaries {
            self.call_done(
                ADD_PREMIS_EVENT,
                StepRequest::AddPremisEvent(AddPremisEventParams {
                    premis_file_path: premis_file_path.clone(),
                    agent: self.agent.clone(),
                    summary,
                    failures,
                }),
            )
            .await?;
        }

        self.call_done(
            ADD_PREMIS_AGENT,
            StepRequest::AddPremisAgent(AddPremisAgentParams {
                premis_file_path,
                agent: self.agent.clone(),
            }),
        )
        .await
    }

    async fn call_done(&self, step: &str, request: StepRequest) -> Result<(), StepError> {
        match self.call(request).await? {
            StepResponse::Done => Ok(()),
            _ => Err(StepError::UnexpectedResponse {
                step: step.to_string(),
            }),
        }
    }

    fn system_error(
        &self,
        result: &mut WorkflowResult,
        state: &mut RunState,
        ev: EventHandle,
        err: &StepError,
        summary: &str,
    ) {
        error!(error = %err, "System error");
        result.preservation_tasks.system_error(ev, self.clock.now(), summary);
        self.conclude(result, state, StepVerdict::SystemFailure, false);
    }

    fn conclude(
        &self,
        result: &mut WorkflowResult,
        state: &mut RunState,
        verdict: StepVerdict,
        last_step: bool,
    ) {
        if let Transition::Complete(outcome) = StateMachine::next(state, verdict, last_step) {
            result.outcome = outcome;
            info!(relative_path = %result.relative_path, %outcome, "preprocessing workflow finished");
        }
    }
}

/// The path must be non-empty and stay inside the shared directory.
fn check_relative_path(relative_path: &str) -> Result<(), PreprocessingError> {
    if relative_path.is_empty() {
        return Err(PreprocessingError::InvalidInput("relative path is empty".to_string()));
    }
    let escapes = Path::new(relative_path).components().any(|c| {
        matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir)
    });
    if escapes {
        return Err(PreprocessingError::InvalidInput(format!(
            "relative path {relative_path:?} leaves the shared directory"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::eventlog::EventOutcome;
    use crate::ids::IdGenerator;
    use crate::premis;
    use crate::state_machine::Outcome;
    use crate::steps::{CommandSpec, LocalExecutor};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records every call and answers from canned responses; steps without a
    /// canned response succeed with the natural empty answer.
    #[derive(Default)]
    struct RecordingExecutor {
        calls: Mutex<Vec<(String, StepOptions)>>,
        responses: Mutex<HashMap<&'static str, Result<StepResponse, String>>>,
        timeouts: Mutex<Vec<&'static str>>,
    }

    impl RecordingExecutor {
        fn respond(self, step: &'static str, response: Result<StepResponse, String>) -> Self {
            self.responses.lock().unwrap().insert(step, response);
            self
        }

        fn time_out(self, step: &'static str) -> Self {
            self.timeouts.lock().unwrap().push(step);
            self
        }

        fn names(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
        }
    }

    impl StepExecutor for RecordingExecutor {
        async fn execute(
            &self,
            name: &str,
            request: StepRequest,
            options: StepOptions,
        ) -> Result<StepResponse, StepError> {
            self.calls.lock().unwrap().push((name.to_string(), options));
            if self.timeouts.lock().unwrap().contains(&request.name()) {
                return Err(StepError::Timeout {
                    step: name.to_string(),
                    after: options.timeout,
                });
            }
            let canned = self.responses.lock().unwrap().get(request.name()).cloned();
            match canned {
                Some(Ok(response)) => Ok(response),
                Some(Err(reason)) => Err(StepError::failed(name, reason)),
                None => Ok(match request {
                    StepRequest::ValidateFileFormats { .. } => {
                        StepResponse::FormatValidation { failures: vec![] }
                    }
                    StepRequest::CreateBag { source_path } => StepResponse::Bag {
                        bag_path: source_path,
                    },
                    _ => StepResponse::Done,
                }),
            }
        }
    }

    fn workflow(executor: RecordingExecutor) -> PreprocessingWorkflow<RecordingExecutor, FixedClock> {
        PreprocessingWorkflow::new("/shared", executor, FixedClock::epoch())
    }

    fn params(relative_path: &str) -> WorkflowParams {
        WorkflowParams {
            relative_path: relative_path.to_string(),
        }
    }

    fn summary(result: &WorkflowResult) -> Vec<(&str, &str, Option<EventOutcome>)> {
        result
            .preservation_tasks
            .events()
            .iter()
            .map(|e| (e.name.as_str(), e.message.as_str(), e.outcome))
            .collect()
    }

    #[tokio::test]
    async fn success_runs_every_step() {
        let wf = workflow(RecordingExecutor::default());
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.relative_path, "transfer");
        assert_eq!(
            summary(&result),
            vec![
                (
                    "Validate SIP file formats",
                    "No disallowed file formats found",
                    Some(EventOutcome::Success)
                ),
                ("Bag SIP", "SIP has been bagged", Some(EventOutcome::Success)),
                (
                    "Create premis.xml",
                    "Created a premis.xml and stored in metadata directory",
                    Some(EventOutcome::Success)
                ),
            ]
        );
        for event in result.preservation_tasks.events() {
            assert_eq!(event.started_at, FixedClock::epoch().0);
            assert_eq!(event.completed_at, Some(FixedClock::epoch().0));
        }
        assert_eq!(
            wf.executor.names(),
            vec![
                "validate-file-formats",
                "create-bag",
                "create-metadata-dir",
                "add-premis-objects",
                "add-premis-event",
                "add-premis-event",
                "add-premis-agent",
            ]
        );
    }

    #[tokio::test]
    async fn every_call_gets_one_attempt_and_the_timeout() {
        let wf = workflow(RecordingExecutor::default()).with_step_timeout(Duration::from_secs(9));
        wf.execute(&params("transfer")).await.unwrap();

        for (_, options) in wf.executor.calls.lock().unwrap().iter() {
            assert_eq!(options.max_attempts, 1);
            assert_eq!(options.timeout, Duration::from_secs(9));
        }
    }

    #[tokio::test]
    async fn empty_relative_path_is_a_contract_violation() {
        let wf = workflow(RecordingExecutor::default());
        let err = wf.execute(&params("")).await.unwrap_err();

        assert!(matches!(err, PreprocessingError::InvalidInput(_)));
        assert!(err.to_string().contains("error calling workflow with unexpected inputs"));
        assert!(!err.is_retryable());
        assert!(wf.executor.names().is_empty());
    }

    #[tokio::test]
    async fn escaping_relative_path_is_a_contract_violation() {
        let wf = workflow(RecordingExecutor::default());
        for path in ["../other", "/etc", "a/../../b"] {
            let err = wf.execute(&params(path)).await.unwrap_err();
            assert!(matches!(err, PreprocessingError::InvalidInput(_)), "{path}");
        }
    }

    #[tokio::test]
    async fn disallowed_formats_stop_with_content_error() {
        let failure = r#"file format "fmt/11" not allowed: "test_transfer/content/content/dir/file1.png""#;
        let executor = RecordingExecutor::default().respond(
            VALIDATE_FILE_FORMATS,
            Ok(StepResponse::FormatValidation {
                failures: vec![failure.to_string()],
            }),
        );
        let wf = workflow(executor);
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::ContentError);
        assert_eq!(
            summary(&result),
            vec![(
                "Validate SIP file formats",
                concat!(
                    "Content error: file format validation has failed. One or more file formats are not allowed:\n",
                    r#"file format "fmt/11" not allowed: "test_transfer/content/content/dir/file1.png""#
                ),
                Some(EventOutcome::ValidationFailure)
            )]
        );
        assert_eq!(wf.executor.names(), vec!["validate-file-formats"]);
    }

    #[tokio::test]
    async fn content_error_lists_every_failure() {
        let failures = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let executor = RecordingExecutor::default().respond(
            VALIDATE_FILE_FORMATS,
            Ok(StepResponse::FormatValidation {
                failures: failures.clone(),
            }),
        );
        let result = workflow(executor).execute(&params("transfer")).await.unwrap();
        let message = &result.preservation_tasks.events()[0].message;
        assert!(message.ends_with(":\none\ntwo\nthree"));
    }

    #[tokio::test]
    async fn validation_call_error_is_a_system_error() {
        let executor = RecordingExecutor::default()
            .respond(VALIDATE_FILE_FORMATS, Err("allowlist missing".to_string()));
        let wf = workflow(executor);
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(
            summary(&result),
            vec![(
                "Validate SIP file formats",
                "System error: file format validation has failed",
                Some(EventOutcome::SystemFailure)
            )]
        );
        assert_eq!(wf.executor.names(), vec!["validate-file-formats"]);
    }

    #[tokio::test]
    async fn bagging_failure_is_a_system_error() {
        let executor = RecordingExecutor::default().respond(
            CREATE_BAG,
            Err("bagcreate: failed to open /shared/transfer: permission denied".to_string()),
        );
        let wf = workflow(executor);
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(
            summary(&result),
            vec![
                (
                    "Validate SIP file formats",
                    "No disallowed file formats found",
                    Some(EventOutcome::Success)
                ),
                (
                    "Bag SIP",
                    "System error: bagging has failed",
                    Some(EventOutcome::SystemFailure)
                ),
            ]
        );
        assert_eq!(wf.executor.names(), vec!["validate-file-formats", "create-bag"]);
    }

    #[tokio::test]
    async fn timed_out_validation_is_a_system_error() {
        let wf = workflow(RecordingExecutor::default().time_out(VALIDATE_FILE_FORMATS));
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(
            summary(&result),
            vec![(
                "Validate SIP file formats",
                "System error: file format validation has failed",
                Some(EventOutcome::SystemFailure)
            )]
        );
        assert_eq!(wf.executor.names(), vec!["validate-file-formats"]);
    }

    #[tokio::test]
    async fn timed_out_premis_sub_step_is_a_system_error() {
        let wf = workflow(RecordingExecutor::default().time_out(ADD_PREMIS_OBJECTS));
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(
            result.preservation_tasks.events().last().unwrap().message,
            "System error: premis.xml creation has failed"
        );
        assert!(!wf.executor.names().contains(&"add-premis-event".to_string()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_bagging_command_times_out_as_system_error() {
        let shared = TempDir::new().unwrap();
        std::fs::create_dir(shared.path().join("transfer")).unwrap();

        let executor = LocalExecutor::new(
            CommandSpec::default(),
            CommandSpec::new(["sh", "-c", "sleep 5", "sh"]),
            Arc::new(IdGenerator::new(StdRng::seed_from_u64(1))),
            Arc::new(FixedClock::epoch()),
        );
        let wf = PreprocessingWorkflow::new(shared.path(), executor, FixedClock::epoch())
            .with_step_timeout(Duration::from_millis(50));
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(
            result.preservation_tasks.events()[1].message,
            "System error: bagging has failed"
        );
        assert!(!shared.path().join("transfer/metadata").exists());
    }

    #[tokio::test]
    async fn premis_sub_step_failure_is_a_system_error() {
        let executor = RecordingExecutor::default()
            .respond(ADD_PREMIS_EVENT, Err("disk full".to_string()));
        let wf = workflow(executor);
        let result = wf.execute(&params("transfer")).await.unwrap();

        assert_eq!(result.outcome, Outcome::SystemError);
        let last = result.preservation_tasks.events().last().unwrap();
        assert_eq!(last.name, "Create premis.xml");
        assert_eq!(last.message, "System error: premis.xml creation has failed");
        assert_eq!(result.preservation_tasks.len(), 3);
        // The agent is never appended once an event write fails.
        assert!(!wf.executor.names().contains(&"add-premis-agent".to_string()));
    }

    #[tokio::test]
    async fn mismatched_response_is_a_system_error() {
        let executor = RecordingExecutor::default()
            .respond(CREATE_BAG, Ok(StepResponse::Done));
        let result = workflow(executor).execute(&params("transfer")).await.unwrap();
        assert_eq!(result.outcome, Outcome::SystemError);
        assert_eq!(
            result.preservation_tasks.events()[1].message,
            "System error: bagging has failed"
        );
    }

    #[tokio::test]
    async fn end_to_end_with_local_executor_writes_premis() {
        let shared = TempDir::new().unwrap();
        let sip = shared.path().join("transfer");
        std::fs::create_dir_all(sip.join("a")).unwrap();
        std::fs::create_dir_all(sip.join("b")).unwrap();
        std::fs::write(sip.join("a/1.txt"), "one").unwrap();
        std::fs::write(sip.join("b/2.txt"), "two").unwrap();

        let executor = LocalExecutor::new(
            CommandSpec::default(),
            CommandSpec::default(),
            Arc::new(IdGenerator::new(StdRng::seed_from_u64(1))),
            Arc::new(FixedClock::epoch()),
        );
        let wf = PreprocessingWorkflow::new(shared.path(), executor, FixedClock::epoch());
        let result = wf.execute(&params("transfer")).await.unwrap();
        assert_eq!(result.outcome, Outcome::Success);

        let doc = premis::load_or_initialize(&sip.join("metadata/premis.xml")).unwrap();
        let names: Vec<_> = doc.objects().map(|o| o.original_name.as_str()).collect();
        assert_eq!(names, vec!["a/1.txt", "b/2.txt"]);
        assert_eq!(doc.events().count(), 4);
        assert_eq!(doc.agents().count(), 1);
        for object in doc.objects() {
            assert_eq!(object.linking_events.len(), 2);
        }
        let types: Vec<_> = doc.events().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, vec!["validation", "validation", "bagging", "bagging"]);
        assert!(doc.events().all(|e| e.outcome == "valid"));
        let details: Vec<_> = doc.events().map(|e| e.outcome_detail.as_str()).collect();
        assert_eq!(details, vec![
            "Format allowed",
            "Format allowed",
            "SIP has been bagged",
            "SIP has been bagged"
        ]);
    }

    #[tokio::test]
    async fn empty_sip_gets_agent_only() {
        let shared = TempDir::new().unwrap();
        std::fs::create_dir(shared.path().join("empty")).unwrap();

        let executor = LocalExecutor::new(
            CommandSpec::default(),
            CommandSpec::default(),
            Arc::new(IdGenerator::new(StdRng::seed_from_u64(1))),
            Arc::new(FixedClock::epoch()),
        );
        let wf = PreprocessingWorkflow::new(shared.path(), executor, FixedClock::epoch());
        let result = wf.execute(&params("empty")).await.unwrap();
        assert_eq!(result.outcome, Outcome::Success);

        let doc = premis::load_or_initialize(&shared.path().join("empty/metadata/premis.xml")).unwrap();
        assert_eq!(doc.objects().count(), 0);
        assert_eq!(doc.events().count(), 0);
        assert_eq!(doc.agents().count(), 1);
    }
}
