//! Terminal output: a spinner while the run is in flight, then a coloured
//! per-step summary.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::eventlog::EventOutcome;
use crate::premis::Document;
use crate::state_machine::{Outcome, WorkflowResult};

pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    pub fn start(relative_path: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Preprocessing {relative_path}"));
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Stops the spinner and prints one line per recorded task, then the outcome.
    pub fn complete(&self, result: &WorkflowResult) {
        self.pb.finish_and_clear();
        for event in result.preservation_tasks.events() {
            let mark = match event.outcome {
                Some(EventOutcome::Success) => self.green.apply_to("✓"),
                Some(EventOutcome::ValidationFailure) => self.yellow.apply_to("✗"),
                Some(EventOutcome::SystemFailure) => self.red.apply_to("✗"),
                None => self.yellow.apply_to("…"),
            };
            println!("  {mark} {}", event.name);
            for line in event.message.lines() {
                println!("      {line}");
            }
        }

        let style = match result.outcome {
            Outcome::Success => &self.green,
            Outcome::ContentError => &self.yellow,
            Outcome::SystemError => &self.red,
        };
        println!();
        println!("{}", style.apply_to(format!("Outcome: {}", result.outcome)));
    }

    pub fn abandon(&self) {
        self.pb.finish_and_clear();
    }
}

/// Pretty JSON for `--json` and for piping into other tools.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DocumentSummary {
    pub objects: usize,
    pub events: usize,
    pub agents: usize,
}

impl DocumentSummary {
    pub fn of(doc: &Document) -> Self {
        Self {
            objects: doc.objects().count(),
            events: doc.events().count(),
            agents: doc.agents().count(),
        }
    }

    pub fn print(&self) {
        let bold = Style::new().bold();
        println!("{} {}", bold.apply_to("objects:"), self.objects);
        println!("{} {}", bold.apply_to("events: "), self.events);
        println!("{} {}", bold.apply_to("agents: "), self.agents);
    }
}
