//! Streaming reader for KiCad `python-bom` netlist exports.
//!
//! Only a handful of elements matter:
//!
//! ```text
//! <comp ref="R1">
//!   <value>10k</value>
//!   <footprint>Resistor_SMD:R_0603</footprint>
//!   <property name="dnp"/>
//! </comp>
//! ```
//!
//! Everything else in the document is ignored. Parse state is an explicit
//! [`ParseState`] value owned by a [`NetlistParser`], one per document.

use std::io::BufRead;

use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::Reader;

use super::error::{BomError, BomResult};
use super::Component;

const COMP: &[u8] = b"comp";
const VALUE: &[u8] = b"value";
const FOOTPRINT: &[u8] = b"footprint";
const PROPERTY: &[u8] = b"property";

/// Property name that marks a component as not fitted.
pub const DNP_PROPERTY: &str = "dnp";

/// Component field that text content is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// The `<value>` element.
    Value,
    /// The `<footprint>` element.
    Footprint,
}

/// Where the parser currently is relative to `<comp>` elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Not inside any `<comp>`; text is ignored.
    #[default]
    OutsideComponent,
    /// Inside a `<comp>`, optionally inside one of its text fields.
    InsideComponent(Option<Field>),
}

/// Event-driven netlist parser.
///
/// Feed it element and text events; the current component is always the
/// last one in the running list while the state is
/// [`ParseState::InsideComponent`].
#[derive(Debug, Default)]
pub struct NetlistParser {
    state: ParseState,
    components: Vec<Component>,
}

impl NetlistParser {
    /// Creates a parser with no components and state `OutsideComponent`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current parse state.
    #[must_use]
    pub const fn state(&self) -> ParseState {
        self.state
    }

    /// Components collected so far, in document order.
    #[must_use]
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    /// Consumes the parser and returns the collected components.
    #[must_use]
    pub fn finish(self) -> Vec<Component> {
        self.components
    }

    /// Handles an opening (or self-closing) element that starts at byte
    /// `offset` of the document.
    ///
    /// # Errors
    ///
    /// Returns [`BomError::Schema`] if a `<comp>` has no `ref` attribute, or a
    /// `<property>` inside a component has no `name` attribute, and
    /// [`BomError::Parse`] at `offset` if an attribute is malformed.
    pub fn start_element(&mut self, element: &BytesStart<'_>, offset: u64) -> BomResult<()> {
        let name = element.name();
        match name.as_ref() {
            COMP => {
                let reference = required_attribute(element, offset, "comp", "ref")?;
                tracing::debug!(reference = %reference, "Component");
                self.components.push(Component::new(reference));
                self.state = ParseState::InsideComponent(None);
            }
            other => {
                if let ParseState::InsideComponent(_) = self.state {
                    let field = match other {
                        VALUE => Some(Field::Value),
                        FOOTPRINT => Some(Field::Footprint),
                        _ => None,
                    };
                    if other == PROPERTY {
                        let property = required_attribute(element, offset, "property", "name")?;
                        if property == DNP_PROPERTY {
                            if let Some(component) = self.components.last_mut() {
                                component.fitted = false;
                            }
                        }
                    }
                    if let Some(field) = field {
                        // Each field element replaces what an earlier one set
                        if let Some(component) = self.components.last_mut() {
                            match field {
                                Field::Value => component.value.clear(),
                                Field::Footprint => component.footprint.clear(),
                            }
                        }
                    }
                    self.state = ParseState::InsideComponent(field);
                }
            }
        }
        Ok(())
    }

    /// Handles a closing element.
    pub fn end_element(&mut self, name: &[u8]) {
        let ParseState::InsideComponent(field) = self.state else {
            return;
        };

        if name == COMP {
            self.state = ParseState::OutsideComponent;
            return;
        }

        if field == Some(Field::Footprint) {
            if let Some(component) = self.components.last_mut() {
                let stripped = strip_library_prefix(&component.footprint);
                if stripped.len() != component.footprint.len() {
                    component.footprint = stripped.to_string();
                }
            }
        }
        self.state = ParseState::InsideComponent(None);
    }

    /// Handles a chunk of text content. Chunks inside one element accumulate.
    pub fn text(&mut self, text: &str) {
        let ParseState::InsideComponent(Some(field)) = self.state else {
            return;
        };
        if let Some(component) = self.components.last_mut() {
            match field {
                Field::Value => component.value.push_str(text),
                Field::Footprint => component.footprint.push_str(text),
            }
        }
    }
}

/// Removes a `Library:` prefix from a footprint identifier.
///
/// Everything up to and including the first colon is dropped; identifiers
/// without a colon are returned unchanged.
#[must_use]
pub fn strip_library_prefix(footprint: &str) -> &str {
    footprint
        .split_once(':')
        .map_or(footprint, |(_, rest)| rest)
}

/// Parses a netlist export into component records.
///
/// # Errors
///
/// Returns [`BomError::Parse`] for malformed XML and [`BomError::Schema`] for
/// missing required attributes.
pub fn parse_components<R: BufRead>(input: R) -> BomResult<Vec<Component>> {
    let mut reader = Reader::from_reader(input);
    let mut parser = NetlistParser::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| BomError::parse(reader.error_position(), e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                depth += 1;
                seen_root = true;
                parser.start_element(e, reader.buffer_position())?;
            }
            Event::Empty(ref e) => {
                seen_root = true;
                parser.start_element(e, reader.buffer_position())?;
                parser.end_element(e.name().as_ref());
            }
            Event::End(ref e) => {
                depth = depth.saturating_sub(1);
                parser.end_element(e.name().as_ref());
            }
            Event::Text(ref e) => {
                let text = e
                    .decode()
                    .map_err(|err| BomError::parse(reader.buffer_position(), err.to_string()))?;
                parser.text(&text);
            }
            Event::CData(ref e) => {
                parser.text(&String::from_utf8_lossy(e));
            }
            Event::GeneralRef(ref e) => {
                let resolved = resolve_reference(e)
                    .map_err(|message| BomError::parse(reader.buffer_position(), message))?;
                parser.text(&resolved);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(BomError::parse(
            reader.buffer_position(),
            "no root element found",
        ));
    }
    if depth != 0 {
        return Err(BomError::parse(
            reader.buffer_position(),
            format!("unexpected end of document with {depth} unclosed element(s)"),
        ));
    }

    let components = parser.finish();
    tracing::debug!(count = components.len(), "Parsed netlist components");
    Ok(components)
}

/// Reads a required attribute, unescaped.
fn required_attribute(
    element: &BytesStart<'_>,
    offset: u64,
    element_name: &'static str,
    attribute: &'static str,
) -> BomResult<String> {
    let attr = element
        .try_get_attribute(attribute)
        .map_err(|e| BomError::parse(offset, e.to_string()))?
        .ok_or_else(|| BomError::schema(element_name, attribute))?;
    let value = attr
        .unescape_value()
        .map_err(|e| BomError::parse(offset, e.to_string()))?;
    Ok(value.into_owned())
}

/// Resolves a `&name;` or `&#NN;` reference reported between text chunks.
fn resolve_reference(reference: &BytesRef<'_>) -> Result<String, String> {
    if let Some(ch) = reference.resolve_char_ref().map_err(|e| e.to_string())? {
        return Ok(ch.to_string());
    }
    let name = reference.decode().map_err(|e| e.to_string())?;
    quick_xml::escape::resolve_predefined_entity(&name)
        .map(str::to_string)
        .ok_or_else(|| format!("unknown entity '&{name};'"))
}
