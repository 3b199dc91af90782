//! # XML Tree
//!
//! A small, owned, namespace-free element tree built with `quick-xml`.
//!
//! ## Why a Tree?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  <cfdi:Comprobante Version="4.0">          Comprobante {Version}        │
//! │    <cfdi:Conceptos>                          └─ Conceptos               │
//! │      <cfdi:Concepto Importe="10"/>   ──►         └─ [Concepto]          │
//! │    </cfdi:Conceptos>                                                    │
//! │    <cfdi:Complemento>                        └─ Complemento             │
//! │      <tfd:TimbreFiscalDigital UUID=".."/>        └─ [TimbreFiscal..]    │
//! │  </cfdi:Comprobante>                                                    │
//! │                                                                         │
//! │  • Prefixes (cfdi:, tfd:, pago20:) are stripped from elements and       │
//! │    attributes, so 3.3 and 4.0 documents look the same.                  │
//! │  • Children are ALWAYS a Vec: one Concepto or fifty, the lookup code    │
//! │    never branches on cardinality.                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Node
// =============================================================================

/// One XML element with its prefix-free name, attributes and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Local element name (`Concepto`, never `cfdi:Concepto`).
    pub name: String,

    /// Attributes in document order, local names, unescaped values.
    pub attributes: Vec<(String, String)>,

    /// Child elements in document order.
    pub children: Vec<XmlNode>,

    /// Concatenated text content (rare in CFDI, kept for completeness).
    pub text: String,
}

impl XmlNode {
    fn from_start(start: &BytesStart<'_>) -> CoreResult<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();

        for attr in start.attributes() {
            let attr = attr.map_err(|e| CoreError::MalformedXml(e.to_string()))?;

            // xmlns / xmlns:cfdi carry no data
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }

            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| CoreError::MalformedXml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(XmlNode {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    /// Returns an attribute value by local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Returns an attribute value, or `""` when absent.
    pub fn attr_or_empty(&self, name: &str) -> &str {
        self.attr(name).unwrap_or("")
    }

    /// Returns the first direct child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Iterates every direct child with the given name.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Iterates `<Container><Item/>...</Container>` pairs below this node.
    ///
    /// Handles repeated containers (e.g. several `CfdiRelacionados` groups)
    /// by flattening them in document order.
    pub fn nested<'a>(
        &'a self,
        container: &'a str,
        item: &'a str,
    ) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children_named(container)
            .flat_map(move |group| group.children_named(item))
    }

    /// Depth-first search for the first descendant (or self) with the given name.
    pub fn find_descendant(&self, name: &str) -> Option<&XmlNode> {
        if self.name == name {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find_descendant(name))
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses an XML document into its root element.
///
/// ## Returns
/// * `Ok(Some(root))` - Well-formed document with a root element
/// * `Ok(None)` - Well-formed but empty (no elements at all)
/// * `Err(MalformedXml)` - Syntax error or unbalanced tags
pub fn parse(xml: &str) -> CoreResult<Option<XmlNode>> {
    let xml = xml.strip_prefix('\u{feff}').unwrap_or(xml);
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(XmlNode::from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let node = XmlNode::from_start(e)?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(_)) => {
                let node = stack
                    .pop()
                    .ok_or_else(|| CoreError::MalformedXml("unexpected closing tag".into()))?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(ref e)) => {
                let text = e
                    .unescape()
                    .map_err(|err| CoreError::MalformedXml(err.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CoreError::MalformedXml(format!(
                    "at byte {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CoreError::MalformedXml("unclosed element at end of input".into()));
    }

    Ok(root)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> CoreResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => {
            return Err(CoreError::MalformedXml("multiple root elements".into()));
        }
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
