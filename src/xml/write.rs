//! Namespace-aware serializer.

use super::{XmlElement, XmlNode};

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Bindings visible at the current point of the output.
#[derive(Default)]
struct Scope {
    bindings: Vec<(Option<String>, String)>,
}

impl Scope {
    fn lookup(&self, prefix: Option<&str>) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    /// A prefix currently bound to `uri` that is not shadowed.
    fn prefix_for(&self, uri: &str, allow_default: bool) -> Option<Option<String>> {
        self.bindings
            .iter()
            .rev()
            .filter(|(p, u)| u == uri && (allow_default || p.is_some()))
            .find(|(p, _)| self.lookup(p.as_deref()) == Some(uri))
            .map(|(p, _)| p.clone())
    }

    fn fresh_prefix(&self) -> String {
        (0..)
            .map(|n| format!("ns{}", n))
            .find(|p| self.lookup(Some(p.as_str())).is_none())
            .unwrap_or_else(|| "ns".to_string())
    }
}

pub(super) fn write_element(element: &XmlElement, out: &mut String) {
    let mut scope = Scope::default();
    write_with_scope(element, out, &mut scope);
}

fn write_with_scope(element: &XmlElement, out: &mut String, scope: &mut Scope) {
    let mark = scope.bindings.len();
    let mut declared: Vec<(Option<String>, String)> = Vec::new();

    let mut declare = |scope: &mut Scope, prefix: Option<String>, uri: String| {
        declared.push((prefix.clone(), uri.clone()));
        scope.bindings.push((prefix, uri));
    };

    for binding in &element.namespaces {
        if scope.lookup(binding.prefix.as_deref()) != Some(binding.uri.as_str()) {
            declare(scope, binding.prefix.clone(), binding.uri.clone());
        }
    }

    let element_prefix = match element.namespace() {
        Some(ns) => {
            if scope.lookup(element.prefix.as_deref()) == Some(ns) {
                element.prefix.clone()
            } else if let Some(prefix) = scope.prefix_for(ns, true) {
                prefix
            } else {
                let prefix = element.prefix.clone();
                declare(scope, prefix.clone(), ns.to_owned());
                prefix
            }
        }
        None => {
            if scope.lookup(None).is_some_and(|uri| !uri.is_empty()) {
                declare(scope, None, String::new());
            }
            None
        }
    };

    let mut attributes = Vec::with_capacity(element.attributes.len());
    for attr in &element.attributes {
        let prefix = match attr.name.namespace.as_deref() {
            None => None,
            Some(XML_NAMESPACE) => Some("xml".to_string()),
            Some(ns) => match scope.prefix_for(ns, false).flatten() {
                Some(prefix) => Some(prefix),
                None => {
                    let prefix = attr
                        .prefix
                        .clone()
                        .filter(|p| scope.lookup(Some(p.as_str())).is_none())
                        .unwrap_or_else(|| scope.fresh_prefix());
                    declare(scope, Some(prefix.clone()), ns.to_owned());
                    Some(prefix)
                }
            },
        };
        attributes.push((prefix, attr.name.local.as_str(), attr.value.as_str()));
    }

    let qualified = qualify(element_prefix.as_deref(), element.local_name());
    out.push('<');
    out.push_str(&qualified);
    for (prefix, uri) in &declared {
        match prefix {
            Some(p) => out.push_str(&format!(" xmlns:{}=\"", p)),
            None => out.push_str(" xmlns=\""),
        }
        escape_into(uri, true, out);
        out.push('"');
    }
    for (prefix, local, value) in attributes {
        out.push(' ');
        out.push_str(&qualify(prefix.as_deref(), local));
        out.push_str("=\"");
        escape_into(value, true, out);
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>");
    } else {
        out.push('>');
        for child in &element.children {
            match child {
                XmlNode::Element(e) => write_with_scope(e, out, scope),
                XmlNode::Text(t) => escape_into(t, false, out),
            }
        }
        out.push_str("</");
        out.push_str(&qualified);
        out.push('>');
    }

    scope.bindings.truncate(mark);
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}:{}", p, local),
        _ => local.to_string(),
    }
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\n' if attribute => out.push_str("&#10;"),
            '\t' if attribute => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::xml::{QName, XmlElement};

    #[test]
    fn test_declares_namespaces_once() {
        let ows = "http://www.opengis.net/ows";
        let doc = XmlElement::prefixed(ows, "ows", "ExceptionReport")
            .with_child(XmlElement::prefixed(ows, "ows", "Exception").with_text("a < b"));
        assert_eq!(
            doc.to_fragment_string(),
            r#"<ows:ExceptionReport xmlns:ows="http://www.opengis.net/ows"><ows:Exception>a &lt; b</ows:Exception></ows:ExceptionReport>"#
        );
    }

    #[test]
    fn test_default_namespace_and_reset() {
        let doc = XmlElement::in_namespace("urn:x", "a")
            .with_child(XmlElement::new(QName::local("b")));
        assert_eq!(
            doc.to_fragment_string(),
            r#"<a xmlns="urn:x"><b xmlns=""/></a>"#
        );
    }

    #[test]
    fn test_namespaced_attribute_gets_prefix() {
        let doc = XmlElement::new(QName::local("a")).with_prefixed_attribute(
            "urn:soap",
            "soapenv",
            "mustUnderstand",
            "1",
        );
        assert_eq!(
            doc.to_fragment_string(),
            r#"<a xmlns:soapenv="urn:soap" soapenv:mustUnderstand="1"/>"#
        );
    }
}
