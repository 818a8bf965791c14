//! Conversion from a roxmltree document to owned nodes.

use super::{NamespaceBinding, QName, XmlAttribute, XmlElement, XmlError, XmlNode};

const XML_PREFIX: &str = "xml";

/// Parse a complete document and return its root element.
pub fn parse(bytes: &[u8]) -> Result<XmlElement, XmlError> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.trim_start_matches('\u{feff}');
    if text.trim().is_empty() {
        return Err(XmlError::Empty);
    }

    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let document = roxmltree::Document::parse_with_options(text, options)?;
    Ok(convert(document.root_element()))
}

fn convert(node: roxmltree::Node<'_, '_>) -> XmlElement {
    let tag = node.tag_name();
    let namespaces: Vec<NamespaceBinding> = node
        .namespaces()
        .filter(|ns| ns.name() != Some(XML_PREFIX))
        .map(|ns| NamespaceBinding {
            prefix: ns.name().map(str::to_owned),
            uri: ns.uri().to_owned(),
        })
        .collect();

    let prefix = tag.namespace().and_then(|uri| {
        namespaces
            .iter()
            .find(|b| b.uri == uri)
            .and_then(|b| b.prefix.clone())
    });

    let attributes = node
        .attributes()
        .map(|attr| {
            let prefix = attr.namespace().and_then(|uri| {
                namespaces
                    .iter()
                    .find(|b| b.uri == uri && b.prefix.is_some())
                    .and_then(|b| b.prefix.clone())
            });
            XmlAttribute {
                name: QName::new(attr.namespace(), attr.name()),
                prefix,
                value: attr.value().to_owned(),
            }
        })
        .collect();

    let mut element = XmlElement {
        name: QName::new(tag.namespace(), tag.name()),
        prefix,
        namespaces,
        attributes,
        children: Vec::new(),
    };

    for child in node.children() {
        if child.is_element() {
            element.children.push(XmlNode::Element(convert(child)));
        } else if child.is_text() {
            element.push_text(child.text().unwrap_or_default());
        }
    }
    element
}
