//! Owned XML element tree.
//!
//! # Responsibilities
//! - Parse request/response documents into an owned, mutable tree
//! - Answer the structural queries the pipeline needs (root name, first body
//!   child, attribute lookup, anchor search)
//! - Serialize a tree (or a detached subtree) back to bytes
//!
//! # Data Flow
//! ```text
//! bytes ──parse.rs (roxmltree)──▶ XmlElement ──mutate/detach──▶ XmlElement
//!                                                                   │
//!                                     bytes ◀──write.rs─────────────┘
//! ```
//!
//! # Design Decisions
//! - roxmltree is read-only, so the parse result is copied into owned nodes
//! - Every parsed element keeps its in-scope namespace bindings; a subtree
//!   lifted out of a SOAP body or a multipart part serializes standalone,
//!   including prefixes that only occur inside attribute values
//! - Equality is XML-equivalence: prefixes and declarations are ignored

mod parse;
mod write;

use std::fmt;
use thiserror::Error;

pub use parse::parse;

/// Errors raised while reading a document.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document contains no characters")]
    Empty,

    #[error("{0}")]
    Syntax(#[from] roxmltree::Error),
}

/// Namespace-qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_owned),
            local: local.into(),
        }
    }

    /// An un-namespaced name.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    pub fn is(&self, namespace: &str, local: &str) -> bool {
        self.namespace.as_deref() == Some(namespace) && self.local == local
    }
}

/// Renders as `{namespace}:local`, or just `local` without a namespace.
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}:{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// A prefix-to-namespace binding (`None` is the default namespace).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone)]
pub struct XmlAttribute {
    pub name: QName,
    pub prefix: Option<String>,
    pub value: String,
}

impl PartialEq for XmlAttribute {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes and children.
#[derive(Debug, Clone)]
pub struct XmlElement {
    pub name: QName,
    /// Preferred prefix when serializing.
    pub prefix: Option<String>,
    /// Bindings in scope where this element was parsed.
    pub namespaces: Vec<NamespaceBinding>,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlNode>,
}

impl PartialEq for XmlElement {
    fn eq(&self, other: &Self) -> bool {
        if self.name != other.name || self.attributes.len() != other.attributes.len() {
            return false;
        }
        let attributes_match = self
            .attributes
            .iter()
            .all(|a| other.attributes.iter().any(|b| a == b));
        attributes_match && self.children == other.children
    }
}

impl XmlElement {
    pub fn new(name: QName) -> Self {
        Self {
            name,
            prefix: None,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element in `namespace`, serialized with `prefix`.
    pub fn prefixed(namespace: &str, prefix: &str, local: &str) -> Self {
        let mut element = Self::new(QName::new(Some(namespace), local));
        element.prefix = Some(prefix.to_owned());
        element
    }

    /// Element in `namespace` using it as the default namespace.
    pub fn in_namespace(namespace: &str, local: &str) -> Self {
        Self::new(QName::new(Some(namespace), local))
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, XmlError> {
        parse::parse(bytes)
    }

    pub fn local_name(&self) -> &str {
        &self.name.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.name.namespace.as_deref()
    }

    /// Un-namespaced attribute by local name.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.namespace.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    pub fn attribute_ns(&self, namespace: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(namespace, local))
            .map(|a| a.value.as_str())
    }

    /// Set (or replace) an attribute.
    pub fn set_attribute(&mut self, name: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(XmlAttribute {
                name,
                prefix: None,
                value,
            }),
        }
    }

    pub fn with_attribute(mut self, local: &str, value: impl Into<String>) -> Self {
        self.set_attribute(QName::local(local), value);
        self
    }

    pub fn with_prefixed_attribute(
        mut self,
        namespace: &str,
        prefix: &str,
        local: &str,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push(XmlAttribute {
            name: QName::new(Some(namespace), local),
            prefix: Some(prefix.to_owned()),
            value: value.into(),
        });
        self
    }

    /// Declare a namespace binding on this element.
    pub fn with_namespace(mut self, prefix: Option<&str>, uri: &str) -> Self {
        self.namespaces.push(NamespaceBinding {
            prefix: prefix.map(str::to_owned),
            uri: uri.to_owned(),
        });
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(XmlNode::Element(child));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.push_text(text);
        self
    }

    pub fn push_child(&mut self, child: XmlElement) {
        self.children.push(XmlNode::Element(child));
    }

    pub fn push_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(&text);
        } else {
            self.children.push(XmlNode::Text(text));
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    pub fn first_child_element(&self) -> Option<&XmlElement> {
        self.child_elements().next()
    }

    /// First direct child with the given name.
    pub fn child(&self, namespace: &str, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.name.is(namespace, local))
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                XmlNode::Text(t) => Some(t.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Element reached by following child-node indices from `self`.
    pub fn element_at_path(&self, path: &[usize]) -> Option<&XmlElement> {
        let mut current = self;
        for &index in path {
            current = match current.children.get(index)? {
                XmlNode::Element(e) => e,
                XmlNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    pub fn element_at_path_mut(&mut self, path: &[usize]) -> Option<&mut XmlElement> {
        let mut current = self;
        for &index in path {
            current = match current.children.get_mut(index)? {
                XmlNode::Element(e) => e,
                XmlNode::Text(_) => return None,
            };
        }
        Some(current)
    }

    /// Paths of every element (including `self`, path `[]`) matching `predicate`,
    /// in document order.
    pub fn find_paths<F>(&self, predicate: F) -> Vec<Vec<usize>>
    where
        F: Fn(&XmlElement) -> bool,
    {
        let mut found = Vec::new();
        let mut path = Vec::new();
        self.collect_paths(&predicate, &mut path, &mut found);
        found
    }

    fn collect_paths<F>(&self, predicate: &F, path: &mut Vec<usize>, found: &mut Vec<Vec<usize>>)
    where
        F: Fn(&XmlElement) -> bool,
    {
        if predicate(self) {
            found.push(path.clone());
        }
        for (index, node) in self.children.iter().enumerate() {
            if let XmlNode::Element(child) = node {
                path.push(index);
                child.collect_paths(predicate, path, found);
                path.pop();
            }
        }
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        write::write_element(self, &mut out);
        out
    }

    pub fn to_xml_bytes(&self) -> Vec<u8> {
        self.to_xml_string().into_bytes()
    }

    /// Serialize without the XML declaration.
    pub fn to_fragment_string(&self) -> String {
        let mut out = String::new();
        write::write_element(self, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0"?>
<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs" xmlns:app="http://example.com/app" service="WFS" version="1.1.0">
  <wfs:Query typeName="app:Road"/>
</wfs:GetFeature>"#;

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::new(Some("urn:a"), "Sec").to_string(), "{urn:a}:Sec");
        assert_eq!(QName::local("Sec").to_string(), "Sec");
        assert_eq!(QName::new(Some(""), "Sec").namespace, None);
    }

    #[test]
    fn test_queries() {
        let root = XmlElement::parse(DOC.as_bytes()).unwrap();
        assert_eq!(root.local_name(), "GetFeature");
        assert_eq!(root.namespace(), Some("http://www.opengis.net/wfs"));
        assert_eq!(root.attribute("service"), Some("WFS"));
        let query = root.first_child_element().unwrap();
        assert_eq!(query.attribute("typeName"), Some("app:Road"));
        assert!(root.child("http://www.opengis.net/wfs", "Query").is_some());
    }

    #[test]
    fn test_detached_subtree_keeps_value_prefixes() {
        let root = XmlElement::parse(DOC.as_bytes()).unwrap();
        let query = root.first_child_element().unwrap().clone();
        let xml = query.to_fragment_string();
        assert!(xml.contains(r#"xmlns:app="http://example.com/app""#));
        assert!(xml.contains(r#"xmlns:wfs="http://www.opengis.net/wfs""#));
    }

    #[test]
    fn test_reparse_is_equivalent() {
        let root = XmlElement::parse(DOC.as_bytes()).unwrap();
        let again = XmlElement::parse(&root.to_xml_bytes()).unwrap();
        assert_eq!(root, again);
    }

    #[test]
    fn test_find_paths_and_mutation() {
        let mut root = XmlElement::new(QName::local("a"))
            .with_child(XmlElement::new(QName::local("b")).with_attribute("id", "x"))
            .with_child(XmlElement::new(QName::local("c")));
        let paths = root.find_paths(|e| e.attribute("id") == Some("x"));
        assert_eq!(paths, vec![vec![0]]);
        root.element_at_path_mut(&paths[0])
            .unwrap()
            .push_child(XmlElement::new(QName::local("d")));
        assert_eq!(root.to_fragment_string(), r#"<a><b id="x"><d/></b><c/></a>"#);
    }

    #[test]
    fn test_empty_document() {
        assert!(matches!(XmlElement::parse(b"   \n"), Err(XmlError::Empty)));
        assert!(matches!(XmlElement::parse(b"<a>"), Err(XmlError::Syntax(_))));
    }
}
