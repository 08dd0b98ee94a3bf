//! External validation and bagging tools, run as child processes.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::StepError;

/// An external program invoked with the SIP path appended as its last argument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandSpec {
    pub argv: Vec<String>,
}

/// Captured result of one command run.
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub stdout: String,
}

impl CommandSpec {
    #[cfg(test)]
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.argv.is_empty()
    }

    /// Runs the command against `path`. A non-zero exit is a step failure
    /// carrying the command's stderr.
    pub(crate) async fn run(&self, step: &str, path: &Path) -> Result<CommandOutput, StepError> {
        let Some((exe, args)) = self.argv.split_first() else {
            return Err(StepError::failed(step, "no command configured"));
        };

        debug!(step, command = %exe, path = %path.display(), "running external command");
        let output = Command::new(exe)
            .args(args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StepError::failed(step, format!("spawn {exe}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(StepError::failed(
                step,
                format!("{exe} exited with {code}: {}", stderr.trim()),
            ));
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

/// One failure per non-blank stdout line.
pub(crate) fn failures_from_stdout(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}
