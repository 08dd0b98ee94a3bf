//! Typed PREMIS v3 nodes and the document that holds them.
//!
//! A [`Document`] is a flat, append-ordered list of [`Node`]s. It is the only
//! in-memory form; the XML file is rebuilt from it in full on every persist.

use serde::{Deserialize, Serialize};

/// Controlled vocabulary URI for locally minted agent identifiers.
pub const LOCAL_IDENTIFIER_VOCABULARY: &str = "http://id.loc.gov/vocabulary/identifiers/local";

pub const OUTCOME_VALID: &str = "valid";
pub const OUTCOME_INVALID: &str = "invalid";

/// Identifier pair used by the `linking*Identifier` elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingIdentifier {
    pub id_type: String,
    pub id_value: String,
}

/// A file in the SIP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub id_type: String,
    pub id_value: String,
    pub format_name: String,
    pub original_name: String,
    /// Events that reference this object, in the order they were recorded.
    pub linking_events: Vec<LinkingIdentifier>,
}

/// A processing event applied to one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id_type: String,
    pub id_value: String,
    pub event_type: String,
    /// Kept as text so a reloaded document reserializes unchanged.
    pub date_time: String,
    pub detail: String,
    pub outcome: String,
    pub outcome_detail: String,
    pub linking_agent: LinkingIdentifier,
}

/// The software that performed the events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id_type: String,
    pub id_value: String,
    pub name: String,
    #[serde(rename = "type")]
    pub agent_type: String,
}

impl Agent {
    pub fn identifier(&self) -> LinkingIdentifier {
        LinkingIdentifier {
            id_type: self.id_type.clone(),
            id_value: self.id_value.clone(),
        }
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            id_type: "url".to_string(),
            id_value: "https://github.com/artefactual-sdps/preprocessing-sfa".to_string(),
            name: "Enduro".to_string(),
            agent_type: "software".to_string(),
        }
    }
}

/// Description shared by every event in one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    #[serde(rename = "type")]
    pub event_type: String,
    pub detail: String,
    pub outcome_detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Object(Object),
    Event(Event),
    Agent(Agent),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn push(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Object(o) => Some(o),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Event(e) => Some(e),
            _ => None,
        })
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.nodes.iter().filter_map(|n| match n {
            Node::Agent(a) => Some(a),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
