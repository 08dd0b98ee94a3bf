//! Workflow input and the result handed back to the caller.

use serde::{Deserialize, Serialize};

use super::state::Outcome;
use crate::eventlog::EventLog;

/// Input to a preprocessing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowParams {
    /// SIP location relative to the shared storage root.
    pub relative_path: String,
}

/// What a run produced: its outcome and the ordered log of the tasks it performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub outcome: Outcome,
    pub relative_path: String,
    pub preservation_tasks: EventLog,
}

impl WorkflowResult {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            relative_path: relative_path.into(),
            preservation_tasks: EventLog::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn new_result_has_no_tasks() {
        let result = WorkflowResult::new("transfer");
        assert!(result.is_success());
        assert!(result.preservation_tasks.is_empty());
        assert_eq!(result.relative_path, "transfer");
    }

    #[test]
    fn result_serializes_tasks_as_a_list() {
        let mut result = WorkflowResult::new("transfer");
        let at = Utc.timestamp_opt(0, 0).single().unwrap();
        let ev = result.preservation_tasks.open("Bag SIP", at);
        result.preservation_tasks.succeed(ev, at, "SIP has been bagged");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "Success");
        assert_eq!(json["preservation_tasks"][0]["name"], "Bag SIP");
        assert_eq!(json["preservation_tasks"][0]["outcome"], "Success");

        let back: WorkflowResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }
}
