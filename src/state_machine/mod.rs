//! Outcome state machine for a preprocessing run.

mod result;
mod state;

pub use result::{WorkflowParams, WorkflowResult};
pub use state::{Outcome, RunState, StateMachine, StepVerdict, Transition};
