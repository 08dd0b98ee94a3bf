//! Run states and the transition function that moves between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Final disposition of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[default]
    Success,
    /// Infrastructure or tooling failed while processing the SIP.
    SystemError,
    /// The SIP itself is not acceptable.
    ContentError,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "SUCCESS"),
            Outcome::SystemError => write!(f, "SYSTEM_ERROR"),
            Outcome::ContentError => write!(f, "CONTENT_ERROR"),
        }
    }
}

/// The run is either still going or finished with an outcome.
///
/// RUNNING → DONE(SUCCESS | CONTENT_ERROR | SYSTEM_ERROR); every DONE state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Running,
    Done(Outcome),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running => write!(f, "RUNNING"),
            RunState::Done(outcome) => write!(f, "DONE({outcome})"),
        }
    }
}

/// How a single step ended, as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    Passed,
    ContentFailure,
    SystemFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the next step.
    Continue,
    /// Stop; no further step may run.
    Complete(Outcome),
}

/// Drives a [`RunState`] from step verdicts.
pub struct StateMachine;

impl StateMachine {
    /// Applies `verdict` for the step that just finished.
    ///
    /// - Any failure completes the run immediately with the matching outcome.
    /// - A pass continues, unless it was the last step, which completes with
    ///   `Success`.
    /// - A `Done` state never changes; applying a verdict to it reports the
    ///   outcome it already holds.
    pub fn next(state: &mut RunState, verdict: StepVerdict, last_step: bool) -> Transition {
        let next = match *state {
            RunState::Done(_) => *state,
            RunState::Running => match verdict {
                StepVerdict::Passed if last_step => RunState::Done(Outcome::Success),
                StepVerdict::Passed => RunState::Running,
                StepVerdict::ContentFailure => RunState::Done(Outcome::ContentError),
                StepVerdict::SystemFailure => RunState::Done(Outcome::SystemError),
            },
        };
        *state = next;

        match next {
            RunState::Running => Transition::Continue,
            RunState::Done(outcome) => Transition::Complete(outcome),
        }
    }
}
