//! PREMIS activities: each one loads the metadata document, applies one
//! assembler operation and writes the whole document back.

use std::fs::DirBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ids::IdSource;
use crate::premis::{self, Agent, Document, EventSummary, PremisError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPremisObjectsParams {
    pub sip_path: PathBuf,
    pub premis_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPremisEventParams {
    pub premis_file_path: PathBuf,
    pub agent: Agent,
    pub summary: EventSummary,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPremisAgentParams {
    pub premis_file_path: PathBuf,
    pub agent: Agent,
}

/// Raised by whoever launched an activity once it stops waiting for it. An
/// activity that sees it skips its write, so a step reported as timed out
/// leaves the document as it was.
#[derive(Debug, Clone, Default)]
pub struct Abandon(Arc<AtomicBool>);

impl Abandon {
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn persist_unless_abandoned(
    doc: &Document,
    path: &Path,
    abandon: &Abandon,
) -> Result<(), PremisError> {
    if abandon.is_raised() {
        warn!(path = %path.display(), "step abandoned; PREMIS document left untouched");
        return Err(PremisError::Abandoned);
    }
    premis::persist(doc, path)
}

/// Creates `path` and any missing parents with the given Unix mode.
pub fn create_dir_with_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path)
}

/// Adds one object per file found under the SIP.
pub fn add_premis_objects(
    params: &AddPremisObjectsParams,
    ids: &dyn IdSource,
    abandon: &Abandon,
) -> Result<usize, PremisError> {
    if let Some(parent) = params.premis_file_path.parent() {
        create_dir_with_mode(parent, 0o700)?;
    }

    let mut doc = premis::load_or_initialize(&params.premis_file_path)?;
    let mut added = 0;
    for subpath in premis::files_within_directory(&params.sip_path) {
        premis::add_object(&mut doc, &subpath?, ids)?;
        added += 1;
    }
    persist_unless_abandoned(&doc, &params.premis_file_path, abandon)?;

    info!(objects = added, path = %params.premis_file_path.display(), "added PREMIS objects");
    Ok(added)
}

pub fn add_premis_event(
    params: &AddPremisEventParams,
    ids: &dyn IdSource,
    at: DateTime<Utc>,
    abandon: &Abandon,
) -> Result<usize, PremisError> {
    let mut doc = premis::load_or_initialize(&params.premis_file_path)?;
    let added = premis::add_event_for_each_object(
        &mut doc,
        &params.summary,
        &params.agent,
        &params.failures,
        ids,
        at,
    )?;
    persist_unless_abandoned(&doc, &params.premis_file_path, abandon)?;

    info!(events = added, event_type = %params.summary.event_type, "added PREMIS events");
    Ok(added)
}

pub fn add_premis_agent(
    params: &AddPremisAgentParams,
    abandon: &Abandon,
) -> Result<(), PremisError> {
    let mut doc = premis::load_or_initialize(&params.premis_file_path)?;
    premis::add_agent(&mut doc, &params.agent);
    persist_unless_abandoned(&doc, &params.premis_file_path, abandon)
}
