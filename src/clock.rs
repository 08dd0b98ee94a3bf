//! Wall-clock access for the workflow and its steps.
//!
//! Production code uses [`SystemClock`]; tests pin time with `FixedClock`.

use chrono::{DateTime, Utc};

/// Source of wall-clock time. Orchestration code reads time only through
/// this trait so a replayed run sees the same timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at one instant.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl FixedClock {
    /// Anchored at the Unix epoch.
    pub fn epoch() -> Self {
        use chrono::TimeZone;
        Self(Utc.timestamp_opt(0, 0).single().unwrap_or_default())
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
