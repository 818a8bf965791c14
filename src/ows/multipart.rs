//! MIME multipart requests carrying out-of-line XML attachments.
//!
//! # Responsibilities
//! - Split a `multipart/form-data` body into XML fragments, in part order
//! - Name every attachment (content-disposition `name`, else `Content-ID`)
//! - Splice attachments back into the root document at handler-chosen anchors
//!
//! # Data Flow
//! ```text
//! body ──multer──▶ part 0 ─▶ root document (may be a SOAP envelope)
//!                  part 1..n ─▶ named fragments
//!
//! root (after SOAP unwrap) + fragments ──reattach(anchors)──▶ single document
//! ```
//!
//! # Design Decisions
//! - All or nothing: any unnamed, non-XML or unresolvable part rejects the request
//! - Where a fragment belongs is decided by the service handler, which knows
//!   the target document shape; the default looks for an attribute
//!   referencing the part (`name` or `cid:name`)

use std::collections::HashSet;
use std::convert::Infallible;

use bytes::Bytes;

use crate::ows::exception::ExceptionDescriptor;
use crate::xml::XmlElement;

/// A parsed part. `name_id` is `None` only for an unnamed root part.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartFragment {
    pub name_id: Option<String>,
    pub element: XmlElement,
}

/// Ordered parts; index 0 is the primary request.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartEnvelope {
    fragments: Vec<MultipartFragment>,
}

impl MultipartEnvelope {
    pub fn new(root: MultipartFragment, attachments: Vec<MultipartFragment>) -> Self {
        let mut fragments = Vec::with_capacity(attachments.len() + 1);
        fragments.push(root);
        fragments.extend(attachments);
        Self { fragments }
    }

    pub fn root(&self) -> &XmlElement {
        &self.fragments[0].element
    }

    pub fn attachments(&self) -> &[MultipartFragment] {
        &self.fragments[1..]
    }

    /// Swap the primary document, e.g. for the body of an unwrapped envelope.
    pub fn replace_root(&mut self, root: XmlElement) {
        self.fragments[0].element = root;
    }

    /// Append every attachment under its anchor in the root document.
    ///
    /// `anchors` returns the candidate insertion points (child-index paths)
    /// for a part name; exactly one is required.
    pub fn reattach<F>(self, anchors: F) -> Result<XmlElement, ExceptionDescriptor>
    where
        F: Fn(&XmlElement, &str) -> Vec<Vec<usize>>,
    {
        let mut fragments = self.fragments.into_iter();
        let mut root = match fragments.next() {
            Some(fragment) => fragment.element,
            None => return Err(ExceptionDescriptor::invalid_format("The multipart request contains no parts.")),
        };

        // anchors are resolved against the request as sent, so content of an
        // earlier attachment can never be mistaken for a reference
        let mut placements = Vec::new();
        for fragment in fragments {
            let name = fragment.name_id.unwrap_or_default();
            let mut found = anchors(&root, &name);
            if found.len() != 1 {
                return Err(ExceptionDescriptor::invalid_format(format!(
                    "Attachment '{}' must be referenced by exactly one element of the request, found {}.",
                    name,
                    found.len()
                ))
                .with_locator(name));
            }
            placements.push((found.remove(0), name, fragment.element));
        }

        // appending as last child leaves every other resolved path intact
        for (path, name, element) in placements {
            match root.element_at_path_mut(&path) {
                Some(anchor) => anchor.push_child(element),
                None => {
                    return Err(ExceptionDescriptor::internal(format!(
                        "No parent element found for attachment '{}'.",
                        name
                    )))
                }
            }
        }
        Ok(root)
    }
}

/// Elements below the root carrying an attribute whose value is `name_id` or
/// `cid:name_id`. The root itself is skipped, its `service` and `version`
/// attributes are not references.
pub fn reference_anchors(root: &XmlElement, name_id: &str) -> Vec<Vec<usize>> {
    let cid = format!("cid:{}", name_id);
    let mut paths = root.find_paths(|element| {
        element
            .attributes
            .iter()
            .any(|a| a.value == name_id || a.value == cid)
    });
    paths.retain(|path| !path.is_empty());
    paths
}

pub struct MultipartReattacher;

impl MultipartReattacher {
    pub fn is_multipart(content_type: &str) -> bool {
        content_type.to_ascii_lowercase().contains("multipart/form-data")
    }

    /// Parse every part of `body` as XML.
    pub async fn parse(content_type: &str, body: Bytes) -> Result<MultipartEnvelope, ExceptionDescriptor> {
        let boundary = multer::parse_boundary(content_type).map_err(|e| {
            ExceptionDescriptor::invalid_format(format!("Invalid multipart content type: {}", e))
        })?;
        let stream = futures_util::stream::once(async move { Ok::<Bytes, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut fragments: Vec<MultipartFragment> = Vec::new();
        let mut seen = HashSet::new();
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            ExceptionDescriptor::invalid_format(format!("Unable to read multipart request: {}", e))
        })? {
            let index = fragments.len();
            let part_type = field
                .content_type()
                .map(|mime| mime.to_string().to_ascii_lowercase())
                .unwrap_or_default();
            if !(part_type.contains("application/xml") || part_type.contains("text/xml")) {
                return Err(ExceptionDescriptor::invalid_format(format!(
                    "Part {} has content type '{}'; only application/xml or text/xml are allowed.",
                    index, part_type
                )));
            }

            let name_id = field
                .name()
                .map(str::to_owned)
                .or_else(|| {
                    field
                        .headers()
                        .get("content-id")
                        .and_then(|v| v.to_str().ok())
                        .map(|v| v.trim().trim_start_matches('<').trim_end_matches('>').to_string())
                })
                .filter(|n| !n.is_empty());
            if index > 0 && name_id.is_none() {
                return Err(ExceptionDescriptor::invalid_format(
                    "Exactly one 'name' parameter must be set in the header.",
                ));
            }
            if let Some(name) = &name_id {
                if !seen.insert(name.clone()) {
                    return Err(ExceptionDescriptor::invalid_format(format!(
                        "The name '{}' is used by more than one part.",
                        name
                    ))
                    .with_locator(name.clone()));
                }
            }

            let bytes = field.bytes().await.map_err(|e| {
                ExceptionDescriptor::invalid_format(format!("Unable to read multipart request: {}", e))
            })?;
            let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
            if first_line.iter().all(u8::is_ascii_whitespace) {
                return Err(ExceptionDescriptor::invalid_format(format!(
                    "Part {} contains no characters on its first line.",
                    index
                )));
            }
            let element = XmlElement::parse(&bytes)?;
            tracing::debug!(part = index, name = ?name_id, root = %element.name, "Parsed multipart part");
            fragments.push(MultipartFragment { name_id, element });
        }

        let mut fragments = fragments.into_iter();
        let root = fragments
            .next()
            .ok_or_else(|| ExceptionDescriptor::invalid_format("The multipart request contains no parts."))?;
        Ok(MultipartEnvelope::new(root, fragments.collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ows::ExceptionCode;

    const BOUNDARY: &str = "XyZ";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    fn body(parts: &[(&str, &str, &str)]) -> Bytes {
        let mut out = String::new();
        for (headers, ct, content) in parts {
            out.push_str(&format!("--{}\r\n{}Content-Type: {}\r\n\r\n{}\r\n", BOUNDARY, headers, ct, content));
        }
        out.push_str(&format!("--{}--\r\n", BOUNDARY));
        Bytes::from(out)
    }

    #[tokio::test]
    async fn test_parse_and_reattach() {
        let body = body(&[
            (
                "Content-Disposition: form-data; name=\"request\"\r\n",
                "text/xml",
                r#"<Transaction><Insert ref="a"/><Insert ref="cid:b"/></Transaction>"#,
            ),
            ("Content-Disposition: form-data; name=\"a\"\r\n", "application/xml", "<Road/>"),
            ("Content-ID: <b>\r\n", "text/xml; charset=UTF-8", "<River/>"),
        ]);
        let envelope = MultipartReattacher::parse(&content_type(), body).await.unwrap();
        assert_eq!(envelope.root().local_name(), "Transaction");
        assert_eq!(envelope.attachments().len(), 2);
        assert_eq!(envelope.attachments()[1].name_id.as_deref(), Some("b"));

        let merged = envelope.reattach(reference_anchors).unwrap();
        assert_eq!(
            merged.to_fragment_string(),
            r#"<Transaction><Insert ref="a"><Road/></Insert><Insert ref="cid:b"><River/></Insert></Transaction>"#
        );
    }

    #[tokio::test]
    async fn test_unnamed_attachment_is_rejected() {
        let body = body(&[
            ("", "text/xml", "<Transaction/>"),
            ("", "text/xml", "<Road/>"),
        ]);
        let error = MultipartReattacher::parse(&content_type(), body).await.unwrap_err();
        assert_eq!(error.code, ExceptionCode::InvalidFormat);
        assert_eq!(error.message, "Exactly one 'name' parameter must be set in the header.");
    }

    #[tokio::test]
    async fn test_non_xml_part_is_rejected() {
        let body = body(&[
            ("", "text/xml", "<Transaction/>"),
            ("Content-Disposition: form-data; name=\"a\"\r\n", "image/png", "PNG"),
        ]);
        let error = MultipartReattacher::parse(&content_type(), body).await.unwrap_err();
        assert!(error.message.contains("image/png"));
    }

    #[tokio::test]
    async fn test_empty_first_line_is_rejected() {
        let body = body(&[("", "text/xml", "\r\n<Transaction/>")]);
        let error = MultipartReattacher::parse(&content_type(), body).await.unwrap_err();
        assert_eq!(error.code, ExceptionCode::InvalidFormat);
    }

    #[test]
    fn test_unresolved_attachment_rejects_whole_envelope() {
        let envelope = MultipartEnvelope::new(
            MultipartFragment {
                name_id: None,
                element: XmlElement::parse(br#"<T><I ref="a"/></T>"#).unwrap(),
            },
            vec![
                MultipartFragment {
                    name_id: Some("a".into()),
                    element: XmlElement::parse(b"<A/>").unwrap(),
                },
                MultipartFragment {
                    name_id: Some("missing".into()),
                    element: XmlElement::parse(b"<M/>").unwrap(),
                },
            ],
        );
        let error = envelope.reattach(reference_anchors).unwrap_err();
        assert_eq!(error.locator.as_deref(), Some("missing"));
    }

    fn fragment(name: &str, xml: &str) -> MultipartFragment {
        MultipartFragment {
            name_id: Some(name.into()),
            element: XmlElement::parse(xml.as_bytes()).unwrap(),
        }
    }

    #[test]
    fn test_attachment_content_does_not_create_anchors() {
        let envelope = MultipartEnvelope::new(
            MultipartFragment {
                name_id: None,
                element: XmlElement::parse(br#"<T><I ref="a"/><I ref="b"/></T>"#).unwrap(),
            },
            vec![fragment("a", r#"<Road link="b"/>"#), fragment("b", "<River/>")],
        );

        let merged = envelope.reattach(reference_anchors).unwrap();
        assert_eq!(
            merged.to_fragment_string(),
            r#"<T><I ref="a"><Road link="b"/></I><I ref="b"><River/></I></T>"#
        );
    }

    #[test]
    fn test_root_attributes_are_not_references() {
        let envelope = MultipartEnvelope::new(
            MultipartFragment {
                name_id: None,
                element: XmlElement::parse(br#"<T service="WFS" version="1.1.0"><I ref="1.1.0"/></T>"#).unwrap(),
            },
            vec![fragment("1.1.0", "<Road/>")],
        );

        let merged = envelope.reattach(reference_anchors).unwrap();
        assert_eq!(
            merged.to_fragment_string(),
            r#"<T service="WFS" version="1.1.0"><I ref="1.1.0"><Road/></I></T>"#
        );
    }

    #[test]
    fn test_detection() {
        assert!(MultipartReattacher::is_multipart("Multipart/Form-Data; boundary=x"));
        assert!(!MultipartReattacher::is_multipart("text/xml"));
    }
}
