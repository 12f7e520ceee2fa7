//! Namespace-aware XML element tree
//!
//! SBML documents are held in memory as a tree of [`Element`]s. Every element and
//! attribute carries its resolved namespace URI next to the prefix it was read with.
//! The namespace URI is the source of truth: when a tree is serialized, prefixes are
//! re-derived from the declarations that are in scope at that point of the output.
//! This allows subtrees to be moved between documents that bind different prefixes
//! to the same package namespace without any prefix bookkeeping by the caller.
//!
//! Parsing is built on the namespace-resolving `quick-xml` reader, writing on its event
//! writer. Whitespace-only text is dropped on read unless the element has mixed
//! content; output is indented with two spaces, except inside mixed content.

use std::{borrow::Cow, io::Write};

use quick_xml::{
    escape::{escape, unescape},
    events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    name::ResolveResult,
    NsReader, Writer,
};
use thiserror::Error;

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Errors raised while reading or writing XML
#[derive(Debug, Error)]
pub enum XmlError {
    /// Malformed XML at the given byte position
    #[error("XML syntax error at position {position}: {message}")]
    Syntax { position: u64, message: String },

    /// A prefix was used without a matching `xmlns:` declaration
    #[error("Unbound namespace prefix '{0}'")]
    UnboundPrefix(String),

    /// Names, attribute values or text that are not valid UTF-8
    #[error("Invalid UTF-8 in XML: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The input contains no root element
    #[error("XML document has no root element")]
    NoRoot,

    /// Serialization to the sink failed
    #[error("Failed to write XML: {0}")]
    Write(String),
}

/// A namespace declaration (`xmlns` or `xmlns:prefix`) made on an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// `None` for the default namespace
    pub prefix: Option<String>,
    pub uri: String,
}

impl NamespaceDecl {
    pub fn new(prefix: Option<&str>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            uri: uri.into(),
        }
    }
}

/// An attribute with its resolved namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Unprefixed attributes never belong to a namespace
    pub namespace: Option<String>,
    pub prefix: Option<String>,
    pub local: String,
    /// Unescaped value
    pub value: String,
}

/// Child node of an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Text content, kept in its escaped form
    Text(String),
    CData(String),
    Comment(String),
}

/// An XML element with resolved namespaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub namespace: Option<String>,
    /// Prefix used in the source; only a hint for the writer
    pub prefix: Option<String>,
    pub local: String,
    /// Declarations made on this element
    pub namespaces: Vec<NamespaceDecl>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an empty element in the given namespace.
    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            prefix: None,
            local: local.into(),
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Same as [`Element::new`] but with a preferred prefix for serialization.
    pub fn with_prefix(namespace: &str, prefix: &str, local: impl Into<String>) -> Self {
        let mut element = Self::new(Some(namespace), local);
        element.prefix = Some(prefix.to_string());
        element
    }

    /// Returns true if the element has the given namespace and local name.
    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == Some(namespace)
    }

    /// Unqualified attribute value.
    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Namespace-qualified attribute value.
    pub fn attr_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.local == local)
            .map(|a| a.value.as_str())
    }

    /// Package attributes are written qualified, but unqualified spellings are
    /// common in hand-written files. Prefers the qualified form.
    pub fn package_attr(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attr_ns(namespace, local).or_else(|| self.attr(local))
    }

    pub fn set_attr(&mut self, local: &str, value: impl Into<String>) {
        self.set_attribute(None, local, value.into());
    }

    pub fn set_attr_ns(&mut self, namespace: &str, local: &str, value: impl Into<String>) {
        self.set_attribute(Some(namespace), local, value.into());
    }

    fn set_attribute(&mut self, namespace: Option<&str>, local: &str, value: String) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.as_deref() == namespace && a.local == local)
        {
            Some(attribute) => attribute.value = value,
            None => self.attributes.push(Attribute {
                namespace: namespace.map(str::to_string),
                prefix: None,
                local: local.to_string(),
                value,
            }),
        }
    }

    /// Removes an attribute, returning its previous value.
    pub fn remove_attr(&mut self, namespace: Option<&str>, local: &str) -> Option<String> {
        let index = self
            .attributes
            .iter()
            .position(|a| a.namespace.as_deref() == namespace && a.local == local)?;
        Some(self.attributes.remove(index).value)
    }

    /// Iterates over child elements, skipping text and comments.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// First child element with the given name.
    pub fn child(&self, namespace: &str, local: &str) -> Option<&Element> {
        self.elements().find(|e| e.is(namespace, local))
    }

    pub fn child_mut(&mut self, namespace: &str, local: &str) -> Option<&mut Element> {
        self.elements_mut().find(|e| e.is(namespace, local))
    }

    /// Child elements of the `listOf` container `list` with the name `item`.
    pub fn list_items<'a>(
        &'a self,
        namespace: &'a str,
        list: &str,
        item: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.child(namespace, list)
            .into_iter()
            .flat_map(move |l| l.elements().filter(move |e| e.is(namespace, item)))
    }

    pub fn push(&mut self, element: Element) {
        self.children.push(Node::Element(element));
    }

    /// Inserts an element before the child node at `index`.
    pub fn insert(&mut self, index: usize, element: Element) {
        let index = index.min(self.children.len());
        self.children.insert(index, Node::Element(element));
    }

    /// Removes child elements matching the predicate and returns them.
    pub fn remove_elements<F>(&mut self, mut predicate: F) -> Vec<Element>
    where
        F: FnMut(&Element) -> bool,
    {
        let mut removed = Vec::new();
        let children = std::mem::take(&mut self.children);
        for node in children {
            match node {
                Node::Element(element) if predicate(&element) => removed.push(element),
                other => self.children.push(other),
            }
        }
        removed
    }

    /// Returns true if the element has no child elements, text or comments.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Unescaped concatenated text of the direct children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .map(|node| match node {
                Node::Text(raw) => unescape(raw)
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| raw.clone()),
                Node::CData(data) => data.clone(),
                _ => String::new(),
            })
            .collect()
    }

    /// Replaces all text children by the given (unescaped) text.
    pub fn set_text(&mut self, text: &str) {
        self.children
            .retain(|node| !matches!(node, Node::Text(_) | Node::CData(_)));
        self.children.push(Node::Text(escape(text).into_owned()));
    }

    /// Visits this element and all descendants in document order.
    pub fn walk<'a, F>(&'a self, visit: &mut F)
    where
        F: FnMut(&'a Element),
    {
        visit(self);
        for child in self.elements() {
            child.walk(visit);
        }
    }

    /// Mutable pre-order traversal.
    pub fn walk_mut<F>(&mut self, visit: &mut F)
    where
        F: FnMut(&mut Element),
    {
        visit(self);
        for child in self.elements_mut() {
            child.walk_mut(visit);
        }
    }

    /// Moves every element and attribute from namespace `from` to `to`.
    pub fn rename_namespace(&mut self, from: &str, to: &str) {
        self.walk_mut(&mut |element| {
            if element.namespace.as_deref() == Some(from) {
                element.namespace = Some(to.to_string());
            }
            for attribute in element.attributes.iter_mut() {
                if attribute.namespace.as_deref() == Some(from) {
                    attribute.namespace = Some(to.to_string());
                }
            }
            for decl in element.namespaces.iter_mut() {
                if decl.uri == from {
                    decl.uri = to.to_string();
                }
            }
        });
    }

    /// Structural equality that ignores prefixes, namespace declarations and
    /// attribute order.
    pub fn same_content(&self, other: &Element) -> bool {
        if self.namespace != other.namespace
            || self.local != other.local
            || self.attributes.len() != other.attributes.len()
        {
            return false;
        }

        let attributes_match = self.attributes.iter().all(|a| {
            other.attributes.iter().any(|b| {
                a.namespace == b.namespace && a.local == b.local && a.value == b.value
            })
        });
        if !attributes_match || self.children.len() != other.children.len() {
            return false;
        }

        self.children
            .iter()
            .zip(other.children.iter())
            .all(|pair| match pair {
                (Node::Element(a), Node::Element(b)) => a.same_content(b),
                (Node::Text(a), Node::Text(b)) => a.trim() == b.trim(),
                (Node::CData(a), Node::CData(b)) => a == b,
                (Node::Comment(_), Node::Comment(_)) => true,
                _ => false,
            })
    }
}

/// Stack of namespace bindings in effect while writing
#[derive(Debug, Default)]
struct Scope {
    frames: Vec<Vec<NamespaceDecl>>,
}

impl Scope {
    fn push(&mut self, decls: Vec<NamespaceDecl>) {
        self.frames.push(decls);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Resolves a prefix, looking at `pending` declarations first.
    fn lookup<'a>(&'a self, pending: &'a [NamespaceDecl], prefix: Option<&str>) -> Option<&'a str> {
        if prefix == Some("xml") {
            return Some(XML_NAMESPACE);
        }

        pending
            .iter()
            .rev()
            .chain(self.frames.iter().rev().flat_map(|frame| frame.iter().rev()))
            .find(|decl| decl.prefix.as_deref() == prefix)
            .map(|decl| decl.uri.as_str())
            .filter(|uri| !uri.is_empty())
    }

    /// All prefixes currently bound to `uri`, innermost first.
    fn prefixes_for(&self, pending: &[NamespaceDecl], uri: &str) -> Vec<Option<String>> {
        let mut candidates = Vec::new();
        for decl in pending
            .iter()
            .rev()
            .chain(self.frames.iter().rev().flat_map(|frame| frame.iter().rev()))
        {
            if decl.uri == uri
                && !candidates.contains(&decl.prefix)
                && self.lookup(pending, decl.prefix.as_deref()) == Some(uri)
            {
                candidates.push(decl.prefix.clone());
            }
        }
        candidates
    }
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    }
}

/// Parses a complete XML document into its root element.
pub fn parse(bytes: &[u8]) -> Result<Element, XmlError> {
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut text = String::new();

    loop {
        let (resolved, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok(pair) => pair,
            Err(err) => {
                return Err(XmlError::Syntax {
                    position: reader.error_position(),
                    message: err.to_string(),
                })
            }
        };
        let namespace = namespace_of(resolved);

        match event {
            Event::Text(content) => {
                text.push_str(std::str::from_utf8(&content)?);
            }
            Event::GeneralRef(reference) => {
                text.push('&');
                text.push_str(std::str::from_utf8(&reference)?);
                text.push(';');
            }
            Event::Start(start) => {
                flush_text(&mut stack, &mut text);
                stack.push(open_element(&start, namespace?, &reader)?);
            }
            Event::Empty(start) => {
                flush_text(&mut stack, &mut text);
                let element = open_element(&start, namespace?, &reader)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                flush_text(&mut stack, &mut text);
                if let Some(mut element) = stack.pop() {
                    strip_layout(&mut element);
                    attach(&mut stack, &mut root, element);
                }
            }
            Event::CData(data) => {
                flush_text(&mut stack, &mut text);
                if let Some(parent) = stack.last_mut() {
                    let data = std::str::from_utf8(&data)?.to_string();
                    parent.children.push(Node::CData(data));
                }
            }
            Event::Comment(comment) => {
                flush_text(&mut stack, &mut text);
                if let Some(parent) = stack.last_mut() {
                    let comment = std::str::from_utf8(&comment)?.to_string();
                    parent.children.push(Node::Comment(comment));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    root.ok_or(XmlError::NoRoot)
}

/// Namespace URI of a resolved element or attribute name.
fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<String>, XmlError> {
    match resolved {
        ResolveResult::Bound(namespace) => {
            Ok(Some(std::str::from_utf8(namespace.into_inner())?.to_string()))
        }
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) if prefix == b"xml" => Ok(Some(XML_NAMESPACE.to_string())),
        ResolveResult::Unknown(prefix) => Err(XmlError::UnboundPrefix(
            String::from_utf8_lossy(&prefix).into_owned(),
        )),
    }
}

fn flush_text(stack: &mut [Element], text: &mut String) {
    if !text.is_empty() {
        if let Some(parent) = stack.last_mut() {
            parent.children.push(Node::Text(text.clone()));
        }
    }
    text.clear();
}

/// True when the element has text next to (or instead of) child elements.
fn has_mixed_content(element: &Element) -> bool {
    element
        .children
        .iter()
        .any(|node| matches!(node, Node::Text(text) if !text.trim().is_empty()))
}

/// Drops whitespace-only text, unless it separates the words of mixed content.
fn strip_layout(element: &mut Element) {
    if !has_mixed_content(element) {
        element
            .children
            .retain(|node| !matches!(node, Node::Text(text) if text.trim().is_empty()));
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn open_element(
    start: &BytesStart<'_>,
    namespace: Option<String>,
    reader: &NsReader<&[u8]>,
) -> Result<Element, XmlError> {
    let qname = std::str::from_utf8(start.name().into_inner())?;
    let (prefix, local) = split_qname(qname);

    let mut namespaces = Vec::new();
    let mut attributes = Vec::new();

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|err| XmlError::Syntax {
            position: 0,
            message: format!("invalid attribute on <{qname}>: {err}"),
        })?;
        let key = std::str::from_utf8(attribute.key.into_inner())?;
        let raw = std::str::from_utf8(&attribute.value)?;
        let value = unescape(raw)
            .map_err(|err| XmlError::Syntax {
                position: 0,
                message: format!("invalid value for '{key}' on <{qname}>: {err}"),
            })?
            .into_owned();

        if key == "xmlns" {
            namespaces.push(NamespaceDecl::new(None, value));
        } else if let Some(declared) = key.strip_prefix("xmlns:") {
            namespaces.push(NamespaceDecl::new(Some(declared), value));
        } else {
            let (resolved, _) = reader.resolve_attribute(attribute.key);
            let (attr_prefix, attr_local) = split_qname(key);
            attributes.push(Attribute {
                namespace: namespace_of(resolved)?,
                prefix: attr_prefix.map(str::to_string),
                local: attr_local.to_string(),
                value,
            });
        }
    }

    Ok(Element {
        namespace,
        prefix: prefix.map(str::to_string),
        local: local.to_string(),
        namespaces,
        attributes,
        children: Vec::new(),
    })
}

/// Serializes the tree, including an XML declaration, to the given sink.
pub fn write<W: Write>(root: &Element, sink: W) -> Result<(), XmlError> {
    let mut writer = Writer::new_with_indent(sink, b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|err| XmlError::Write(err.to_string()))?;

    let mut scope = Scope::default();
    write_element(&mut writer, root, &mut scope, true)?;

    writer
        .get_mut()
        .write_all(b"\n")
        .map_err(|err| XmlError::Write(err.to_string()))
}

/// Serializes the tree into a string.
pub fn to_string(root: &Element) -> Result<String, XmlError> {
    let mut buffer = Vec::new();
    write(root, &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| XmlError::Encoding(err.utf8_error()))
}

/// Picks the prefix to write for `namespace`, declaring it on the current element
/// when nothing suitable is in scope.
fn bind_prefix(
    scope: &Scope,
    pending: &mut Vec<NamespaceDecl>,
    namespace: Option<&str>,
    preferred: Option<&str>,
    is_element: bool,
) -> Option<String> {
    let Some(uri) = namespace else {
        if is_element && scope.lookup(pending, None).is_some() {
            pending.push(NamespaceDecl::new(None, ""));
        }
        return None;
    };

    if (is_element || preferred.is_some()) && scope.lookup(pending, preferred) == Some(uri) {
        return preferred.map(str::to_string);
    }

    if let Some(prefix) = scope
        .prefixes_for(pending, uri)
        .into_iter()
        .find(|p| is_element || p.is_some())
    {
        return prefix;
    }

    let taken = |candidate: &str, pending: &[NamespaceDecl]| {
        pending.iter().any(|d| d.prefix.as_deref() == Some(candidate))
    };

    let prefix = match preferred {
        None if is_element && !pending.iter().any(|d| d.prefix.is_none()) => None,
        Some(p) if !taken(p, pending) => Some(p.to_string()),
        _ => {
            let mut n = 0;
            loop {
                let candidate = format!("ns{n}");
                if !taken(&candidate, pending) && scope.lookup(pending, Some(&candidate)).is_none()
                {
                    break Some(candidate);
                }
                n += 1;
            }
        }
    };

    pending.push(NamespaceDecl {
        prefix: prefix.clone(),
        uri: uri.to_string(),
    });
    prefix
}

fn qualified(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn write_element<W: Write>(
    writer: &mut Writer<W>,
    element: &Element,
    scope: &mut Scope,
    indent: bool,
) -> Result<(), XmlError> {
    // Own declarations, minus those that are already in effect
    let mut pending: Vec<NamespaceDecl> = Vec::new();
    for decl in &element.namespaces {
        let current = scope.lookup(&pending, decl.prefix.as_deref()).unwrap_or("");
        if current != decl.uri {
            pending.push(decl.clone());
        }
    }

    let prefix = bind_prefix(
        scope,
        &mut pending,
        element.namespace.as_deref(),
        element.prefix.as_deref(),
        true,
    );

    let mut attributes = Vec::with_capacity(element.attributes.len());
    for attribute in &element.attributes {
        let attr_prefix = bind_prefix(
            scope,
            &mut pending,
            attribute.namespace.as_deref(),
            attribute.prefix.as_deref(),
            false,
        );
        attributes.push((
            qualified(attr_prefix.as_deref(), &attribute.local),
            attribute.value.as_str(),
        ));
    }

    // Default namespace first, then prefixes in lexical order
    pending.sort_by(|a, b| a.prefix.cmp(&b.prefix));

    let name = qualified(prefix.as_deref(), &element.local);
    let mut start = BytesStart::new(name.as_str());
    for decl in &pending {
        let key = match &decl.prefix {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => "xmlns".to_string(),
        };
        start.push_attribute((key.as_str(), decl.uri.as_str()));
    }
    for (key, value) in &attributes {
        start.push_attribute((key.as_str(), *value));
    }

    if element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|err| XmlError::Write(err.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|err| XmlError::Write(err.to_string()))?;

    scope.push(pending);
    for child in &element.children {
        let event = match child {
            // mixed content goes out verbatim, on a line of its own
            Node::Element(child) if indent && has_mixed_content(child) => {
                let mut inline = Writer::new(Vec::new());
                write_element(&mut inline, child, scope, false)?;
                writer
                    .write_indent()
                    .map_err(|err| XmlError::Write(err.to_string()))?;
                writer
                    .get_mut()
                    .write_all(&inline.into_inner())
                    .map_err(|err| XmlError::Write(err.to_string()))?;
                continue;
            }
            Node::Element(child) => {
                write_element(writer, child, scope, indent)?;
                continue;
            }
            Node::Text(raw) => Event::Text(BytesText::from_escaped(raw.as_str())),
            Node::CData(data) => Event::CData(BytesCData::new(data.as_str())),
            Node::Comment(comment) => Event::Comment(BytesText::from_escaped(comment.as_str())),
        };
        writer
            .write_event(event)
            .map_err(|err| XmlError::Write(err.to_string()))?;
    }
    scope.pop();

    writer
        .write_event(Event::End(BytesEnd::new(name.as_str())))
        .map_err(|err| XmlError::Write(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root xmlns="urn:core" xmlns:p="urn:pkg" p:flag="true">
  <p:list>
    <p:item p:id="a" name="x &amp; y"/>
  </p:list>
  <text>a &lt; b</text>
</root>"#;

    #[test]
    fn test_parse_resolves_namespaces() {
        let root = parse(SAMPLE.as_bytes()).expect("Failed to parse");
        assert!(root.is("urn:core", "root"));
        assert_eq!(root.attr_ns("urn:pkg", "flag"), Some("true"));

        let item = root
            .list_items("urn:pkg", "list", "item")
            .next()
            .expect("Missing item");
        assert_eq!(item.attr_ns("urn:pkg", "id"), Some("a"));
        assert_eq!(item.attr("name"), Some("x & y"));
        assert_eq!(root.child("urn:core", "text").unwrap().text(), "a < b");
    }

    #[test]
    fn test_unbound_prefix_is_an_error() {
        let result = parse(b"<root><q:item/></root>");
        assert!(matches!(result, Err(XmlError::UnboundPrefix(p)) if p == "q"));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(matches!(
            parse(b"<root><open></root>"),
            Err(XmlError::Syntax { .. })
        ));
        assert!(matches!(parse(b""), Err(XmlError::NoRoot)));
    }

    #[test]
    fn test_write_rebinds_moved_subtree() {
        let mut target = parse(br#"<root xmlns="urn:core" xmlns:pk="urn:pkg"/>"#).unwrap();
        let source = parse(br#"<other xmlns="urn:core" xmlns:zz="urn:pkg"><zz:item zz:id="b"/></other>"#)
            .unwrap();
        let item = source.elements().next().unwrap().clone();
        target.push(item);

        let xml = to_string(&target).unwrap();
        assert!(xml.contains(r#"<pk:item pk:id="b"/>"#), "{xml}");
        assert!(!xml.contains("zz"), "{xml}");
    }

    #[test]
    fn test_write_declares_unbound_namespace_locally() {
        let mut root = Element::new(Some("urn:core"), "root");
        root.push(Element::with_prefix("urn:pkg", "pkg", "item"));

        let xml = to_string(&root).unwrap();
        assert!(xml.contains(r#"<pkg:item xmlns:pkg="urn:pkg"/>"#), "{xml}");
        assert!(xml.contains(r#"<root xmlns="urn:core">"#), "{xml}");
    }

    #[test]
    fn test_mixed_content_keeps_whitespace() {
        let xml = br#"<notes><body xmlns="http://www.w3.org/1999/xhtml">
            <p>alpha <b>beta</b> <i>gamma</i></p>
          </body></notes>"#;
        let root = parse(xml).unwrap();
        let body = root.elements().next().unwrap();
        assert_eq!(body.children.len(), 1);

        let written = to_string(&root).unwrap();
        assert!(
            written.contains("<p>alpha <b>beta</b> <i>gamma</i></p>"),
            "{written}"
        );
        let reparsed = parse(written.as_bytes()).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_xml_prefix_is_predeclared() {
        let root = parse(br#"<root xml:lang="en"/>"#).unwrap();
        assert_eq!(root.attr_ns(XML_NAMESPACE, "lang"), Some("en"));
    }

    #[test]
    fn test_roundtrip_preserves_content() {
        let root = parse(SAMPLE.as_bytes()).unwrap();
        let reparsed = parse(to_string(&root).unwrap().as_bytes()).unwrap();
        assert!(root.same_content(&reparsed));
    }
}
