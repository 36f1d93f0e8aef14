//! # Lightweight XML Tree Reader
//!
//! Both the catalog loaders and the document parser need the same thing: a
//! fully materialized element tree with namespace prefixes stripped and the
//! source line of every element preserved for findings. Streaming buys
//! nothing at catalog scale, so this module reads the whole document into an
//! [`XmlElement`] tree in one pass over quick-xml events.
//!
//! Text content is accumulated per element and kept verbatim, whitespace
//! included; the data-quality checks depend on seeing values exactly as
//! written. Mixed content concatenates in document order. Comments,
//! processing instructions and the XML declaration are discarded.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure to read an XML source into a tree.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("malformed XML near line {line}: {source}")]
    Malformed {
        line: u32,
        #[source]
        source: quick_xml::Error,
    },

    #[error("malformed attribute near line {line}: {source}")]
    MalformedAttribute {
        line: u32,
        #[source]
        source: quick_xml::events::attributes::AttrError,
    },

    #[error("closing tag </{name}> near line {line} has no matching opening tag")]
    UnmatchedClose { name: String, line: u32 },

    #[error("document contains no root element")]
    NoRoot,
}

// ---------------------------------------------------------------------------
// Element tree
// ---------------------------------------------------------------------------

/// One element of the materialized tree. `name` is the local name with any
/// namespace prefix removed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub name: String,
    /// Attributes in document order, local names only.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    /// Concatenated text content of this element (not of descendants).
    pub text: String,
    /// 1-based line of the opening tag in the source.
    pub line: u32,
}

impl XmlElement {
    /// Value of the named attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First direct child with the given local name.
    pub fn find(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// All descendants in document order, self excluded.
    pub fn descendants(&self) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        let mut stack: Vec<&XmlElement> = self.children.iter().rev().collect();
        while let Some(el) = stack.pop() {
            out.push(el);
            stack.extend(el.children.iter().rev());
        }
        out
    }

    /// Trimmed text content.
    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Byte offsets of line starts, for offset-to-line translation.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(input: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in input.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> u32 {
        match self.starts.binary_search(&offset) {
            Ok(i) => i as u32 + 1,
            Err(i) => i as u32,
        }
    }
}

fn local_name(raw: &[u8]) -> String {
    let name = String::from_utf8_lossy(raw);
    match name.rsplit_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

/// Read a full document into its root element.
pub fn parse(input: &str) -> Result<XmlElement, XmlError> {
    let lines = LineIndex::new(input);
    let mut reader = Reader::from_str(input);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let offset = reader.buffer_position() as usize;
        let line = lines.line_of(offset);
        match reader.read_event() {
            Err(source) => return Err(XmlError::Malformed { line, source }),
            Ok(Event::Start(e)) => {
                let element = element_from_tag(&e, line)?;
                stack.push(element);
            }
            Ok(Event::Empty(e)) => {
                let element = element_from_tag(&e, line)?;
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::End(e)) => {
                let Some(element) = stack.pop() else {
                    return Err(XmlError::UnmatchedClose {
                        name: local_name(e.name().as_ref()),
                        line,
                    });
                };
                attach(&mut stack, &mut root, element);
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last_mut() {
                    let text = e
                        .unescape()
                        .map_err(|source| XmlError::Malformed { line, source })?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            // Declaration, comments, PIs, DOCTYPE carry no tree content.
            Ok(_) => {}
        }
    }

    root.ok_or(XmlError::NoRoot)
}

fn element_from_tag(
    tag: &quick_xml::events::BytesStart<'_>,
    line: u32,
) -> Result<XmlElement, XmlError> {
    let mut element = XmlElement {
        name: local_name(tag.name().as_ref()),
        line,
        ..XmlElement::default()
    };
    for attr in tag.attributes() {
        let attr = attr.map_err(|source| XmlError::MalformedAttribute { line, source })?;
        let key = local_name(attr.key.as_ref());
        // xmlns declarations are prefix plumbing, not data.
        if key == "xmlns" {
            continue;
        }
        let value = attr
            .unescape_value()
            .map_err(|source| XmlError::Malformed { line, source })?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            // Only the first root-level element is kept; well-formed XML
            // has exactly one.
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_elements_with_text() {
        let root = parse("<AL><AL_VOLGNUM>1</AL_VOLGNUM><AL_CNTRNUM>DL1</AL_CNTRNUM></AL>")
            .unwrap();
        assert_eq!(root.name, "AL");
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.find("AL_CNTRNUM").unwrap().text_trimmed(), "DL1");
    }

    #[test]
    fn strips_namespace_prefixes() {
        let root = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:simpleType name="AFDC100"/>
               </xs:schema>"#,
        )
        .unwrap();
        assert_eq!(root.name, "schema");
        let child = root.find("simpleType").unwrap();
        assert_eq!(child.attr("name"), Some("AFDC100"));
    }

    #[test]
    fn tracks_line_numbers() {
        let root = parse("<a>\n  <b/>\n  <c>\n    <d/>\n  </c>\n</a>").unwrap();
        assert_eq!(root.line, 1);
        assert_eq!(root.find("b").unwrap().line, 2);
        assert_eq!(root.find("c").unwrap().line, 3);
        assert_eq!(root.find("c").unwrap().find("d").unwrap().line, 4);
    }

    #[test]
    fn descendants_are_preorder() {
        let root = parse("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = root.descendants().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["b", "c", "d"]);
    }

    #[test]
    fn empty_elements_and_attributes() {
        let root = parse(r#"<e min="1" max="unbounded"/>"#).unwrap();
        assert_eq!(root.attr("min"), Some("1"));
        assert_eq!(root.attr("max"), Some("unbounded"));
        assert_eq!(root.attr("missing"), None);
        assert!(root.children.is_empty());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("").is_err());
        assert!(parse("not xml at all").is_err());
        assert!(parse("<a><b></a></b>").is_err());
    }

    #[test]
    fn unescapes_entities() {
        let root = parse("<v>R&amp;D &lt;x&gt;</v>").unwrap();
        assert_eq!(root.text_trimmed(), "R&D <x>");
    }
}
