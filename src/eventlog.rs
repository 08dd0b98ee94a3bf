//! Ordered, append-only log of the preservation tasks a run performed.
//!
//! Every step opens an [`Event`] when it starts and closes it exactly once.
//! Closing consumes the [`EventHandle`], so an event cannot be reopened.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a logged step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOutcome {
    Success,
    /// The step ran but the content it inspected is not acceptable.
    ValidationFailure,
    /// The step itself could not run to completion.
    SystemFailure,
}

impl fmt::Display for EventOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOutcome::Success => write!(f, "success"),
            EventOutcome::ValidationFailure => write!(f, "validation failure"),
            EventOutcome::SystemFailure => write!(f, "system failure"),
        }
    }
}

/// A single entry in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub message: String,
    pub outcome: Option<EventOutcome>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Event {
    fn open(name: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            message: String::new(),
            outcome: None,
            started_at,
            completed_at: None,
        }
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// Token for an open event. Not `Clone`: closing it consumes it.
#[derive(Debug)]
#[must_use = "an opened event must be closed"]
pub struct EventHandle {
    index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an open event and returns the handle used to close it.
    pub fn open(&mut self, name: &str, at: DateTime<Utc>) -> EventHandle {
        self.events.push(Event::open(name, at));
        EventHandle {
            index: self.events.len() - 1,
        }
    }

    pub fn succeed(&mut self, handle: EventHandle, at: DateTime<Utc>, message: impl Into<String>) {
        self.complete(handle, at, EventOutcome::Success, message.into());
    }

    /// Closes the event as a content problem. The message lists every
    /// failure on its own line after the summary.
    pub fn content_error(
        &mut self,
        handle: EventHandle,
        at: DateTime<Utc>,
        summary: &str,
        failures: &[String],
    ) {
        let message = format!("Content error: {summary}:\n{}", failures.join("\n"));
        self.complete(handle, at, EventOutcome::ValidationFailure, message);
    }

    /// Closes the event as an infrastructure problem.
    pub fn system_error(&mut self, handle: EventHandle, at: DateTime<Utc>, summary: &str) {
        let message = format!("System error: {summary}");
        self.complete(handle, at, EventOutcome::SystemFailure, message);
    }

    fn complete(
        &mut self,
        handle: EventHandle,
        at: DateTime<Utc>,
        outcome: EventOutcome,
        message: String,
    ) {
        let event = &mut self.events[handle.index];
        // Clamp so a clock that stepped backwards can't produce a negative span.
        event.completed_at = Some(at.max(event.started_at));
        event.outcome = Some(outcome);
        event.message = message;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
