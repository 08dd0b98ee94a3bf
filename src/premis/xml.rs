//! PREMIS XML reading and writing.
//!
//! Reading goes through a small generic element tree built from `quick-xml`
//! events, which is then mapped onto the typed nodes. Writing streams the
//! typed nodes through an indenting `quick_xml::Writer`. Empty elements are
//! always self-closed.

use std::borrow::Cow;

use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event as XmlEvent};
use quick_xml::{Error as XmlError, Reader, Writer};

use super::error::PremisError;
use super::model::{Agent, Document, Event, LOCAL_IDENTIFIER_VOCABULARY, LinkingIdentifier, Node, Object};

const ROOT: &str = "premis:premis";
const ROOT_ATTRIBUTES: &[(&str, &str)] = &[
    ("xmlns:premis", "http://www.loc.gov/premis/v3"),
    ("xmlns:xlink", "http://www.w3.org/1999/xlink"),
    ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
    (
        "xsi:schemaLocation",
        "http://www.loc.gov/premis/v3 https://www.loc.gov/standards/premis/premis.xsd",
    ),
    ("version", "3.0"),
];

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, PremisError> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| PremisError::malformed(format!("element name is not UTF-8: {e}")))?
            .to_string();
        // Attributes carry only fixed vocabulary and namespace data that the
        // writer re-emits, but they must still be well formed.
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            attr.unescape_value()?;
        }
        Ok(Self {
            name,
            ..Default::default()
        })
    }

    fn child(&self, name: &str) -> Result<&Element, PremisError> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| PremisError::malformed(format!("<{}> is missing <{name}>", self.name)))
    }

    fn optional_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn text_of(&self, name: &str) -> Result<String, PremisError> {
        Ok(self.child(name)?.text.clone())
    }

    /// Follows a chain of child names, returning `None` as soon as a link is absent.
    fn path(&self, names: &[&str]) -> Option<&Element> {
        names
            .iter()
            .try_fold(self, |el, name| el.optional_child(name))
    }
}

fn parse_tree(xml: &str) -> Result<Element, PremisError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            XmlEvent::Start(start) => stack.push(Element::from_start(&start)?),
            XmlEvent::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            XmlEvent::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| PremisError::malformed("unbalanced closing tag"))?;
                // Whitespace between child elements is layout, not content.
                if !element.children.is_empty() {
                    element.text.clear();
                }
                attach(&mut stack, &mut root, element)?;
            }
            XmlEvent::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape()?);
                }
            }
            XmlEvent::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    let data = std::str::from_utf8(&data)
                        .map_err(|e| PremisError::malformed(format!("CDATA is not UTF-8: {e}")))?;
                    top.text.push_str(data);
                }
            }
            XmlEvent::Eof => break,
            XmlEvent::Decl(_) | XmlEvent::Comment(_) | XmlEvent::PI(_) | XmlEvent::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(PremisError::malformed("document ended inside an element"));
    }
    root.ok_or_else(|| PremisError::malformed("document has no root element"))
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), PremisError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(PremisError::malformed("more than one root element")),
    }
    Ok(())
}

/// Parses a PREMIS document produced by [`render`] (or a compatible writer).
pub fn parse(xml: &str) -> Result<Document, PremisError> {
    let root = parse_tree(xml)?;
    if root.name != ROOT {
        return Err(PremisError::malformed(format!(
            "expected <{ROOT}> root, found <{}>",
            root.name
        )));
    }

    let mut doc = Document::new();
    for child in &root.children {
        let node = match child.name.as_str() {
            "premis:object" => Node::Object(object_from(child)?),
            "premis:event" => Node::Event(event_from(child)?),
            "premis:agent" => Node::Agent(agent_from(child)?),
            other => {
                return Err(PremisError::malformed(format!("unexpected element <{other}>")));
            }
        };
        doc.push(node);
    }
    Ok(doc)
}

fn object_from(el: &Element) -> Result<Object, PremisError> {
    let id = el.child("premis:objectIdentifier")?;
    let format_name = el
        .path(&[
            "premis:objectCharacteristics",
            "premis:format",
            "premis:formatDesignation",
            "premis:formatName",
        ])
        .map(|e| e.text.clone())
        .unwrap_or_default();

    let linking_events = el
        .children
        .iter()
        .filter(|c| c.name == "premis:linkingEventIdentifier")
        .map(|link| {
            Ok(LinkingIdentifier {
                id_type: link.text_of("premis:linkingEventIdentifierType")?,
                id_value: link.text_of("premis:linkingEventIdentifierValue")?,
            })
        })
        .collect::<Result<Vec<_>, PremisError>>()?;

    Ok(Object {
        id_type: id.text_of("premis:objectIdentifierType")?,
        id_value: id.text_of("premis:objectIdentifierValue")?,
        format_name,
        original_name: el.text_of("premis:originalName")?,
        linking_events,
    })
}

fn event_from(el: &Element) -> Result<Event, PremisError> {
    let id = el.child("premis:eventIdentifier")?;
    let outcome = el.child("premis:eventOutcomeInformation")?;
    let agent = el.child("premis:linkingAgentIdentifier")?;

    Ok(Event {
        id_type: id.text_of("premis:eventIdentifierType")?,
        id_value: id.text_of("premis:eventIdentifierValue")?,
        event_type: el.text_of("premis:eventType")?,
        date_time: el.text_of("premis:eventDateTime")?,
        detail: el
            .child("premis:eventDetailInformation")?
            .text_of("premis:eventDetail")?,
        outcome: outcome.text_of("premis:eventOutcome")?,
        outcome_detail: outcome
            .path(&["premis:eventOutcomeDetail", "premis:eventOutcomeDetailNote"])
            .map(|e| e.text.clone())
            .unwrap_or_default(),
        linking_agent: LinkingIdentifier {
            id_type: agent.text_of("premis:linkingAgentIdentifierType")?,
            id_value: agent.text_of("premis:linkingAgentIdentifierValue")?,
        },
    })
}

fn agent_from(el: &Element) -> Result<Agent, PremisError> {
    let id = el.child("premis:agentIdentifier")?;
    Ok(Agent {
        id_type: id.text_of("premis:agentIdentifierType")?,
        id_value: id.text_of("premis:agentIdentifierValue")?,
        name: el.text_of("premis:agentName")?,
        agent_type: el.text_of("premis:agentType")?,
    })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

type XmlWriter = Writer<Vec<u8>>;

/// Serializes the whole document, declaration included, ending with a newline.
pub fn render(doc: &Document) -> Result<String, PremisError> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(XmlEvent::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let root = w
        .create_element(ROOT)
        .with_attributes(ROOT_ATTRIBUTES.iter().copied());
    if doc.is_empty() {
        root.write_empty()?;
    } else {
        root.write_inner_content::<_, XmlError>(|w| {
            for node in doc.nodes() {
                match node {
                    Node::Object(object) => write_object(w, object)?,
                    Node::Event(event) => write_event(w, event)?,
                    Node::Agent(agent) => write_agent(w, agent)?,
                }
            }
            Ok(())
        })?;
    }

    let mut xml = String::from_utf8(w.into_inner())
        .map_err(|e| PremisError::malformed(format!("rendered XML is not UTF-8: {e}")))?;
    xml.push('\n');
    Ok(xml)
}

/// XML 1.0 has no representation for most C0 controls or U+FFFE/U+FFFF,
/// even as character references. They become U+FFFD.
fn xml_safe(text: &str) -> Cow<'_, str> {
    fn allowed(c: char) -> bool {
        matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
    }

    if text.chars().all(allowed) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(
        text.chars()
            .map(|c| if allowed(c) { c } else { char::REPLACEMENT_CHARACTER })
            .collect(),
    )
}

/// A text-only element, self-closed when `text` is empty. Quotes stay literal
/// in text content.
fn leaf(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), XmlError> {
    let el = w.create_element(name).with_attributes(attrs.iter().copied());
    if text.is_empty() {
        el.write_empty()?;
    } else {
        let text = xml_safe(text);
        el.write_text_content(BytesText::from_escaped(partial_escape(&text)))?;
    }
    Ok(())
}

fn write_object(w: &mut XmlWriter, object: &Object) -> Result<(), XmlError> {
    w.create_element("premis:object")
        .with_attribute(("xsi:type", "premis:file"))
        .write_inner_content::<_, XmlError>(|w| {
            w.create_element("premis:objectIdentifier")
                .write_inner_content::<_, XmlError>(|w| {
                    leaf(w, "premis:objectIdentifierType", &[], &object.id_type)?;
                    leaf(w, "premis:objectIdentifierValue", &[], &object.id_value)
                })?;

            w.create_element("premis:objectCharacteristics")
                .write_inner_content::<_, XmlError>(|w| {
                    w.create_element("premis:format").write_inner_content::<_, XmlError>(|w| {
                        w.create_element("premis:formatDesignation")
                            .write_inner_content::<_, XmlError>(|w| {
                                leaf(w, "premis:formatName", &[], &object.format_name)
                            })?;
                        Ok(())
                    })?;
                    Ok(())
                })?;

            leaf(w, "premis:originalName", &[], &object.original_name)?;

            for link in &object.linking_events {
                w.create_element("premis:linkingEventIdentifier")
                    .write_inner_content::<_, XmlError>(|w| {
                        leaf(w, "premis:linkingEventIdentifierType", &[], &link.id_type)?;
                        leaf(w, "premis:linkingEventIdentifierValue", &[], &link.id_value)
                    })?;
            }
            Ok(())
        })?;
    Ok(())
}

fn write_event(w: &mut XmlWriter, event: &Event) -> Result<(), XmlError> {
    w.create_element("premis:event").write_inner_content::<_, XmlError>(|w| {
        w.create_element("premis:eventIdentifier")
            .write_inner_content::<_, XmlError>(|w| {
                leaf(w, "premis:eventIdentifierType", &[], &event.id_type)?;
                leaf(w, "premis:eventIdentifierValue", &[], &event.id_value)
            })?;

        leaf(w, "premis:eventType", &[], &event.event_type)?;
        leaf(w, "premis:eventDateTime", &[], &event.date_time)?;

        w.create_element("premis:eventDetailInformation")
            .write_inner_content::<_, XmlError>(|w| leaf(w, "premis:eventDetail", &[], &event.detail))?;

        w.create_element("premis:eventOutcomeInformation")
            .write_inner_content::<_, XmlError>(|w| {
                leaf(w, "premis:eventOutcome", &[], &event.outcome)?;
                if !event.outcome_detail.is_empty() {
                    w.create_element("premis:eventOutcomeDetail")
                        .write_inner_content::<_, XmlError>(|w| {
                            leaf(w, "premis:eventOutcomeDetailNote", &[], &event.outcome_detail)
                        })?;
                }
                Ok(())
            })?;

        w.create_element("premis:linkingAgentIdentifier")
            .write_inner_content::<_, XmlError>(|w| {
                leaf(
                    w,
                    "premis:linkingAgentIdentifierType",
                    &[("valueURI", LOCAL_IDENTIFIER_VOCABULARY)],
                    &event.linking_agent.id_type,
                )?;
                leaf(w, "premis:linkingAgentIdentifierValue", &[], &event.linking_agent.id_value)
            })?;
        Ok(())
    })?;
    Ok(())
}

fn write_agent(w: &mut XmlWriter, agent: &Agent) -> Result<(), XmlError> {
    w.create_element("premis:agent").write_inner_content::<_, XmlError>(|w| {
        w.create_element("premis:agentIdentifier")
            .write_inner_content::<_, XmlError>(|w| {
                leaf(
                    w,
                    "premis:agentIdentifierType",
                    &[("valueURI", LOCAL_IDENTIFIER_VOCABULARY)],
                    &agent.id_type,
                )?;
                leaf(w, "premis:agentIdentifierValue", &[], &agent.id_value)
            })?;

        leaf(w, "premis:agentName", &[], &agent.name)?;
        leaf(w, "premis:agentType", &[], &agent.agent_type)
    })?;
    Ok(())
}
