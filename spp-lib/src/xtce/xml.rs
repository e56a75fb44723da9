//! Minimal namespace-agnostic XML tree used by the XTCE loader.
//!
//! XTCE documents arrive with an `xtce:` prefix, a default namespace, or no
//! namespace at all. Elements are matched by local name only; the declared
//! namespace is captured once so serialization can reproduce it.

use std::io::BufRead;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::{Error, Result};

/// The OMG XTCE 1.2 namespace.
pub const XTCE_URI: &str = "http://www.omg.org/spec/XTCE/20180204";
/// The pre-1.2 namespace still common in mission databases.
pub const XTCE_URI_LEGACY: &str = "http://www.omg.org/space/xtce";

/// The namespace declaration seen on (or chosen for) a document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlNamespace {
    /// Prefix the document uses for XTCE elements; `None` for a default
    /// namespace or an unqualified document.
    pub prefix: Option<String>,
    pub uri: Option<String>,
}

impl Default for XmlNamespace {
    fn default() -> Self {
        XmlNamespace {
            prefix: Some("xtce".to_string()),
            uri: Some(XTCE_URI.to_string()),
        }
    }
}

/// An element with namespace prefixes stripped from names and attribute
/// keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Element::default()
        }
    }

    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value or an [`Error::Xtce`] naming the element.
    pub fn require_attr(&self, key: &str) -> Result<&str> {
        self.attr(key)
            .ok_or_else(|| Error::Xtce(format!("<{}> missing attribute {key}", self.name)))
    }

    /// First direct child with the given local name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given local name.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Walk a path of child element names.
    #[must_use]
    pub fn find_path(&self, path: &[&str]) -> Option<&Element> {
        let mut cur = self;
        for name in path {
            cur = cur.find(name)?;
        }
        Some(cur)
    }

    /// Direct child or an [`Error::Xtce`] naming the element.
    pub fn require(&self, name: &str) -> Result<&Element> {
        self.find(name)
            .ok_or_else(|| Error::Xtce(format!("<{}> missing child <{name}>", self.name)))
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.text.trim()
    }
}

fn xml_err(err: impl std::fmt::Display) -> Error {
    Error::Xtce(format!("XML error: {err}"))
}

fn local(name: &[u8]) -> String {
    let start = name.iter().rposition(|&b| b == b':').map_or(0, |i| i + 1);
    String::from_utf8_lossy(&name[start..]).into_owned()
}

/// A parsed document: element tree plus the root namespace declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
    pub namespace: XmlNamespace,
}

/// Parse an XML document into an [`Element`] tree.
pub fn parse_document<R: BufRead>(reader: R) -> Result<Document> {
    let mut reader = Reader::from_reader(reader);
    reader.trim_text(true);

    let mut namespace = XmlNamespace {
        prefix: None,
        uri: None,
    };
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(start) => {
                let element = read_element(&start, stack.is_empty().then_some(&mut namespace))?;
                stack.push(element);
            }
            Event::Empty(start) => {
                let element = read_element(&start, stack.is_empty().then_some(&mut namespace))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(text) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text.unescape().map_err(xml_err)?);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Xtce("unbalanced end tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
        }
        buf.clear();
    }

    if !stack.is_empty() {
        return Err(Error::Xtce("unexpected end of document".to_string()));
    }
    let root = root.ok_or_else(|| Error::Xtce("document has no root element".to_string()))?;
    Ok(Document { root, namespace })
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_some() {
                return Err(Error::Xtce("multiple root elements".to_string()));
            }
            *root = Some(element);
        }
    }
    Ok(())
}

fn read_element(start: &BytesStart, namespace: Option<&mut XmlNamespace>) -> Result<Element> {
    let mut element = Element::new(local(start.name().as_ref()));
    let mut declared: Option<XmlNamespace> = None;
    for attr in start.attributes() {
        let attr = attr.map_err(xml_err)?;
        let key = attr.key.as_ref();
        let value = attr.unescape_value().map_err(xml_err)?.into_owned();
        if key == b"xmlns" {
            declared.get_or_insert(XmlNamespace {
                prefix: None,
                uri: Some(value),
            });
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            // Prefer an explicitly prefixed XTCE declaration over a default
            // one when both appear.
            let ns = XmlNamespace {
                prefix: Some(String::from_utf8_lossy(prefix).into_owned()),
                uri: Some(value),
            };
            if ns.uri.as_deref() == Some(XTCE_URI) || ns.uri.as_deref() == Some(XTCE_URI_LEGACY) {
                declared = Some(ns);
            } else {
                declared.get_or_insert(ns);
            }
        } else {
            element
                .attributes
                .push((local(key), value));
        }
    }
    if let (Some(slot), Some(ns)) = (namespace, declared) {
        *slot = ns;
    }
    Ok(element)
}

/// Serialize an element tree, applying the namespace's prefix to every
/// element and declaring it on the root.
pub fn write_document(root: &Element, namespace: &XmlNamespace) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;
    write_element(&mut writer, root, namespace, true)?;
    let bytes = writer.into_inner();
    String::from_utf8(bytes).map_err(|err| Error::Xtce(format!("serialized non-UTF-8: {err}")))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    element: &Element,
    namespace: &XmlNamespace,
    is_root: bool,
) -> Result<()> {
    let name = match &namespace.prefix {
        Some(prefix) if namespace.uri.is_some() => format!("{prefix}:{}", element.name),
        _ => element.name.clone(),
    };
    let mut start = BytesStart::new(name.clone());
    if is_root {
        if let Some(uri) = &namespace.uri {
            match &namespace.prefix {
                Some(prefix) => start.push_attribute((format!("xmlns:{prefix}").as_str(), uri.as_str())),
                None => start.push_attribute(("xmlns", uri.as_str())),
            }
        }
    }
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(xml_err)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(xml_err)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(xml_err)?;
    }
    for child in &element.children {
        write_element(writer, child, namespace, false)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_err)?;
    Ok(())
}
