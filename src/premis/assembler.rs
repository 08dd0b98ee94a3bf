//! Read-modify-write operations on a PREMIS document.
//!
//! Each mutation works on a whole [`Document`] loaded from disk; callers
//! persist the full tree afterwards. There is no deduplication: appending the
//! same thing twice yields two nodes.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;
use walkdir::WalkDir;

use super::error::PremisError;
use super::model::{
    Agent, Document, Event, EventSummary, LinkingIdentifier, Node, OUTCOME_INVALID, OUTCOME_VALID,
    Object,
};
use super::xml;
use crate::ids::IdSource;

pub const UUID_IDENTIFIER_TYPE: &str = "UUID";

/// Returns the parsed document at `path`, or a fresh one if no file exists.
/// An existing file that doesn't parse is an error.
pub fn load_or_initialize(path: &Path) -> Result<Document, PremisError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => xml::parse(&contents),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Document::new()),
        Err(e) => Err(e.into()),
    }
}

/// Overwrites `path` with the serialized document. The parent directory must exist.
pub fn persist(doc: &Document, path: &Path) -> Result<(), PremisError> {
    std::fs::write(path, xml::render(doc)?)?;
    debug!(path = %path.display(), nodes = doc.nodes().len(), "persisted PREMIS document");
    Ok(())
}

pub fn add_object(doc: &mut Document, subpath: &str, ids: &dyn IdSource) -> Result<(), PremisError> {
    let id = ids.next_id()?;
    doc.push(Node::Object(Object {
        id_type: UUID_IDENTIFIER_TYPE.to_string(),
        id_value: id.to_string(),
        format_name: String::new(),
        original_name: subpath.to_string(),
        linking_events: Vec::new(),
    }));
    Ok(())
}

/// Appends one event per object currently in the document, each linked back
/// from its object and forward to `agent`. Returns the number of events added,
/// which is zero when the document holds no objects yet.
pub fn add_event_for_each_object(
    doc: &mut Document,
    summary: &EventSummary,
    agent: &Agent,
    failures: &[String],
    ids: &dyn IdSource,
    at: DateTime<Utc>,
) -> Result<usize, PremisError> {
    let outcome = if failures.is_empty() {
        OUTCOME_VALID
    } else {
        OUTCOME_INVALID
    };
    let date_time = at.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut events = Vec::new();
    for node in doc.nodes.iter_mut() {
        let Node::Object(object) = node else {
            continue;
        };
        let id = ids.next_id()?;
        object.linking_events.push(LinkingIdentifier {
            id_type: UUID_IDENTIFIER_TYPE.to_string(),
            id_value: id.to_string(),
        });
        events.push(Node::Event(Event {
            id_type: UUID_IDENTIFIER_TYPE.to_string(),
            id_value: id.to_string(),
            event_type: summary.event_type.clone(),
            date_time: date_time.clone(),
            detail: summary.detail.clone(),
            outcome: outcome.to_string(),
            outcome_detail: summary.outcome_detail.clone(),
            linking_agent: agent.identifier(),
        }));
    }

    let added = events.len();
    doc.nodes.extend(events);
    Ok(added)
}

/// Appends the agent unconditionally; a second call adds a second agent.
pub fn add_agent(doc: &mut Document, agent: &Agent) {
    doc.push(Node::Agent(agent.clone()));
}

/// Relative paths of every regular file under `root`, `/`-separated, in
/// lexical order at each directory level. The walk is lazy; call again to
/// restart it.
pub fn files_within_directory(root: &Path) -> impl Iterator<Item = Result<String, PremisError>> + '_ {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let relative = entry.path().strip_prefix(root).ok()?;
            let subpath = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some(Ok(subpath))
        })
}
