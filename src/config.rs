//! Runtime configuration loaded from `preprocessing.toml`.
//!
//! Every field has a default, so a missing file is not an error. The
//! `PREPROCESSING_SHARED_PATH` environment variable takes precedence over the
//! file for the shared storage root.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::premis::Agent;
use crate::steps::CommandSpec;

pub const DEFAULT_CONFIG_FILE: &str = "preprocessing.toml";
pub const SHARED_PATH_ENV: &str = "PREPROCESSING_SHARED_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct PreprocessingConfig {
    /// Root that run paths are resolved against.
    #[serde(default = "default_shared_path")]
    pub shared_path: PathBuf,

    /// Upper bound for each step call, in seconds.
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,

    #[serde(default)]
    pub validation: ToolConfig,

    #[serde(default)]
    pub bagging: ToolConfig,

    /// Identity recorded as the PREMIS agent.
    #[serde(default)]
    pub agent: Agent,

    #[serde(default)]
    pub log_json: bool,
}

/// An external tool invoked with the SIP path as its last argument.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub command: CommandSpec,
}

fn default_shared_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_step_timeout_secs() -> u64 {
    300
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            shared_path: default_shared_path(),
            step_timeout_secs: default_step_timeout_secs(),
            validation: ToolConfig::default(),
            bagging: ToolConfig::default(),
            agent: Agent::default(),
            log_json: false,
        }
    }
}

impl PreprocessingConfig {
    /// Loads `path`, or `preprocessing.toml` in the working directory when
    /// `path` is `None`. A missing file yields defaults; a broken one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));
        let config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<PreprocessingConfig>(&contents)
                .with_context(|| format!("parsing {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", path.display()));
            }
        };
        Ok(config.with_shared_path_override(std::env::var(SHARED_PATH_ENV).ok()))
    }

    fn with_shared_path_override(mut self, value: Option<String>) -> Self {
        if let Some(path) = value
            && !path.is_empty()
        {
            self.shared_path = PathBuf::from(path);
        }
        self
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}
