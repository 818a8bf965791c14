//! SOAP 1.1 envelope handling.
//!
//! # Responsibilities
//! - Recognize a SOAP 1.1 envelope by its root namespace
//! - Enforce `mustUnderstand` header blocks against the configured allow-list
//! - Lift the first element of `Body` out as the real request
//! - Wrap captured XML responses, and faults, into an envelope
//!
//! # Data Flow
//! ```text
//! Envelope ──unwrap()──▶ [mustUnderstand check] ──▶ Body/first child ──▶ dispatch
//!
//! captured response ──wrap_response()──▶ xml/gml? ──▶ root ~ "exception"? ──yes──▶ Server fault
//!                                            │                   └──no──▶ Envelope/Body/root
//!                                            └── other content types pass through untouched
//! ```
//!
//! # Design Decisions
//! - Header names are compared as `{namespace}:localName` (bare local name when
//!   un-namespaced), the same form used in configuration
//! - The check runs before the body is touched, so an unsupported mandatory
//!   header never reaches a service

use std::collections::HashSet;

use axum::http::StatusCode;

use crate::http::capture::ResponseCapture;
use crate::ows::exception::{ExceptionCode, ExceptionDescriptor, FaultOrigin};
use crate::ows::namespaces::SOAP_ENVELOPE;
use crate::xml::{QName, XmlElement, XmlNode};

const PREFIX: &str = "soap";

/// A header block from an incoming envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapHeaderBlock {
    pub name: QName,
    pub must_understand: bool,
    pub element: XmlElement,
}

/// An unwrapped envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapEnvelope {
    pub headers: Vec<SoapHeaderBlock>,
    /// First element child of `Body`.
    pub body: XmlElement,
}

/// Serialized fault plus the HTTP status it must be sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct SoapFault {
    pub status: StatusCode,
    pub document: XmlElement,
}

#[derive(Debug, Clone, Default)]
pub struct SoapEnvelopeCodec {
    understood: HashSet<String>,
}

impl SoapEnvelopeCodec {
    pub fn new<I, S>(understood: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            understood: understood
                .into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_envelope(root: &XmlElement) -> bool {
        root.namespace() == Some(SOAP_ENVELOPE)
    }

    pub fn understands(&self, name: &QName) -> bool {
        self.understood.contains(&name.to_string())
    }

    /// Split an envelope into header blocks and the request body.
    pub fn unwrap(&self, envelope: XmlElement) -> Result<SoapEnvelope, ExceptionDescriptor> {
        if !envelope.name.is(SOAP_ENVELOPE, "Envelope") {
            return Err(ExceptionDescriptor::invalid_format(format!(
                "Expected a SOAP 1.1 Envelope but found '{}'.",
                envelope.name
            )));
        }

        let mut headers = Vec::new();
        let mut body = None;
        for node in envelope.children {
            let XmlNode::Element(child) = node else {
                continue;
            };
            // a Header after Body is still checked before anything is dispatched
            if child.name.is(SOAP_ENVELOPE, "Header") {
                headers.extend(self.header_blocks(child)?);
            } else if child.name.is(SOAP_ENVELOPE, "Body") && body.is_none() {
                body = Some(child);
            }
        }

        let body = body.ok_or_else(|| {
            ExceptionDescriptor::invalid_format("The SOAP envelope does not contain a Body element.")
        })?;
        let payload = body
            .children
            .into_iter()
            .find_map(|node| match node {
                XmlNode::Element(e) => Some(e),
                XmlNode::Text(_) => None,
            })
            .ok_or_else(|| ExceptionDescriptor::invalid_format("The SOAP Body is empty."))?;

        Ok(SoapEnvelope {
            headers,
            body: payload,
        })
    }

    fn header_blocks(&self, header: XmlElement) -> Result<Vec<SoapHeaderBlock>, ExceptionDescriptor> {
        let mut blocks = Vec::new();
        for node in header.children {
            let XmlNode::Element(element) = node else {
                continue;
            };
            let must_understand = element
                .attribute_ns(SOAP_ENVELOPE, "mustUnderstand")
                .map(str::trim)
                .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
            if must_understand && !self.understands(&element.name) {
                tracing::info!(header = %element.name, "Rejecting mandatory SOAP header");
                return Err(ExceptionDescriptor::new(
                    ExceptionCode::MustUnderstand,
                    format!(
                        "The element: {} is not understood by this SOAP-Server.",
                        element.name
                    ),
                ));
            }
            blocks.push(SoapHeaderBlock {
                name: element.name.clone(),
                must_understand,
                element,
            });
        }
        Ok(blocks)
    }

    /// Build `Envelope[Header?]/Body/payload`.
    pub fn envelope(headers: Vec<XmlElement>, payload: XmlElement) -> XmlElement {
        let mut envelope = XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "Envelope");
        if !headers.is_empty() {
            let mut header = XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "Header");
            for block in headers {
                header.push_child(block);
            }
            envelope.push_child(header);
        }
        envelope.with_child(XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "Body").with_child(payload))
    }

    /// Rewrap a captured success response.
    ///
    /// XML (or GML) bodies are placed inside an envelope; a body whose root
    /// element name contains "exception" becomes a `Server` fault instead.
    /// Anything else is left as captured.
    pub fn wrap_response(
        &self,
        capture: &mut ResponseCapture,
        content_type: &str,
    ) -> Result<(), ExceptionDescriptor> {
        let wrappable = capture.content_type().is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("xml") || ct.contains("gml")
        });
        if !wrappable {
            tracing::info!(
                content_type = ?capture.content_type(),
                "Response is not XML; it cannot be embedded in a SOAP envelope"
            );
            return Ok(());
        }

        let root = XmlElement::parse(capture.body()).map_err(|e| {
            ExceptionDescriptor::new(
                ExceptionCode::Server,
                format!(
                    "Following error occurred while creating a soap envelope of the service response: {}",
                    e
                ),
            )
        })?;

        if root.local_name().to_lowercase().contains("exception") {
            return Err(ExceptionDescriptor::new(
                ExceptionCode::Server,
                "The service responded with an exception report.",
            )
            .with_detail(root));
        }

        let envelope = Self::envelope(Vec::new(), root);
        capture.replace_body(envelope.to_xml_bytes());
        capture.set_content_type(content_type);
        Ok(())
    }

    /// Build the fault envelope for `error`.
    ///
    /// The four SOAP classes keep their code and force status 500; other
    /// codes become `Server.<code>`, answered with 500 when the backend failed
    /// and 200 otherwise.
    pub fn fault(error: &ExceptionDescriptor, origin: FaultOrigin) -> SoapFault {
        let soap_class = error.code.is_soap_class();
        let fault_code = if soap_class {
            error.code.as_str().to_string()
        } else {
            format!("Server.{}", error.code)
        };
        let status = if soap_class || origin == FaultOrigin::Backend {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::OK
        };

        let mut fault = XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "Fault")
            .with_child(XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "faultcode").with_text(fault_code));
        let message = error.message.trim();
        if !message.is_empty() {
            fault.push_child(
                XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "faultstring").with_text(message),
            );
        }
        if let Some(detail) = &error.detail {
            fault.push_child(
                XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "detail").with_child(detail.clone()),
            );
        }

        let document = XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "Envelope")
            .with_child(XmlElement::prefixed(SOAP_ENVELOPE, PREFIX, "Body").with_child(fault));
        SoapFault { status, document }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECURITY_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";

    fn envelope_with_header(must_understand: &str) -> XmlElement {
        let xml = format!(
            r#"<soapenv:Envelope xmlns:soapenv="{soap}">
                 <soapenv:Header>
                   <wsse:Security xmlns:wsse="{sec}" soapenv:mustUnderstand="{mu}"/>
                 </soapenv:Header>
                 <soapenv:Body>
                   <GetCapabilities xmlns="http://www.opengis.net/wfs" service="WFS"/>
                 </soapenv:Body>
               </soapenv:Envelope>"#,
            soap = SOAP_ENVELOPE,
            sec = SECURITY_NS,
            mu = must_understand
        );
        XmlElement::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_unwrap_extracts_first_body_child() {
        let codec = SoapEnvelopeCodec::default();
        let envelope = codec.unwrap(envelope_with_header("0")).unwrap();
        assert_eq!(envelope.body.local_name(), "GetCapabilities");
        assert_eq!(envelope.body.attribute("service"), Some("WFS"));
        assert_eq!(envelope.headers.len(), 1);
        assert!(!envelope.headers[0].must_understand);
    }

    #[test]
    fn test_must_understand_rejected_unless_allow_listed() {
        let codec = SoapEnvelopeCodec::default();
        let error = codec.unwrap(envelope_with_header("1")).unwrap_err();
        assert_eq!(error.code, ExceptionCode::MustUnderstand);
        assert!(error.message.contains(SECURITY_NS));

        let codec = SoapEnvelopeCodec::new([format!("{{{}}}:Security", SECURITY_NS)]);
        let envelope = codec.unwrap(envelope_with_header("true")).unwrap();
        assert!(envelope.headers[0].must_understand);
    }

    #[test]
    fn test_header_after_body_is_still_enforced() {
        let xml = format!(
            r#"<s:Envelope xmlns:s="{soap}">
                 <s:Body><GetCapabilities/></s:Body>
                 <s:Header><wsse:Security xmlns:wsse="{sec}" s:mustUnderstand="1"/></s:Header>
               </s:Envelope>"#,
            soap = SOAP_ENVELOPE,
            sec = SECURITY_NS
        );
        let codec = SoapEnvelopeCodec::default();
        let error = codec.unwrap(XmlElement::parse(xml.as_bytes()).unwrap()).unwrap_err();
        assert_eq!(error.code, ExceptionCode::MustUnderstand);
    }

    #[test]
    fn test_missing_or_empty_body() {
        let codec = SoapEnvelopeCodec::default();
        let no_body = XmlElement::prefixed(SOAP_ENVELOPE, "s", "Envelope");
        assert_eq!(codec.unwrap(no_body).unwrap_err().code, ExceptionCode::InvalidFormat);

        let empty_body = XmlElement::prefixed(SOAP_ENVELOPE, "s", "Envelope")
            .with_child(XmlElement::prefixed(SOAP_ENVELOPE, "s", "Body").with_text("  "));
        assert_eq!(codec.unwrap(empty_body).unwrap_err().code, ExceptionCode::InvalidFormat);
    }

    #[test]
    fn test_wrap_then_unwrap_round_trip() {
        let codec = SoapEnvelopeCodec::new(["Trace"]);
        let payload = XmlElement::parse(
            br#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs" xmlns:app="urn:app"><wfs:Query typeName="app:Road"/></wfs:GetFeature>"#,
        )
        .unwrap();
        let header = XmlElement::new(QName::local("Trace")).with_prefixed_attribute(
            SOAP_ENVELOPE,
            "soap",
            "mustUnderstand",
            "1",
        );
        let wire = SoapEnvelopeCodec::envelope(vec![header], payload.clone()).to_xml_bytes();
        let unwrapped = codec.unwrap(XmlElement::parse(&wire).unwrap()).unwrap();
        assert_eq!(unwrapped.body, payload);
        assert!(unwrapped.body.to_fragment_string().contains("xmlns:app=\"urn:app\""));
    }

    #[test]
    fn test_wrap_response_success_and_exception() {
        let codec = SoapEnvelopeCodec::default();
        let mut capture = ResponseCapture::new();
        capture.write_document("application/xml", b"<Capabilities version=\"1.1.0\"/>");
        codec.wrap_response(&mut capture, "text/xml").unwrap();
        let wrapped = XmlElement::parse(capture.body()).unwrap();
        assert!(wrapped.name.is(SOAP_ENVELOPE, "Envelope"));
        assert_eq!(capture.content_type(), Some("text/xml"));

        let mut capture = ResponseCapture::new();
        capture.write_document("text/xml", b"<ServiceExceptionReport><ServiceException/></ServiceExceptionReport>");
        let error = codec.wrap_response(&mut capture, "text/xml").unwrap_err();
        assert_eq!(error.code, ExceptionCode::Server);
        assert_eq!(error.detail.unwrap().local_name(), "ServiceExceptionReport");

        let mut capture = ResponseCapture::new();
        capture.write_document("image/png", b"\x89PNG");
        codec.wrap_response(&mut capture, "text/xml").unwrap();
        assert_eq!(capture.body(), b"\x89PNG");
    }

    #[test]
    fn test_fault_codes_and_status() {
        let error = ExceptionDescriptor::new(ExceptionCode::MustUnderstand, "no");
        let fault = SoapEnvelopeCodec::fault(&error, FaultOrigin::Envelope);
        assert_eq!(fault.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(fault.document.to_fragment_string().contains(">MustUnderstand<"));

        let error = ExceptionDescriptor::invalid_format("bad xml");
        let fault = SoapEnvelopeCodec::fault(&error, FaultOrigin::Envelope);
        assert_eq!(fault.status, StatusCode::OK);
        let xml = fault.document.to_fragment_string();
        assert!(xml.contains("<soap:faultcode>Server.InvalidFormat</soap:faultcode>"));
        assert!(xml.contains("<soap:faultstring>bad xml</soap:faultstring>"));

        let fault = SoapEnvelopeCodec::fault(&error, FaultOrigin::Backend);
        assert_eq!(fault.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_fault_detail_is_structured() {
        let report = XmlElement::new(QName::local("ServiceExceptionReport"));
        let error = ExceptionDescriptor::new(ExceptionCode::Server, "backend failed").with_detail(report);
        let fault = SoapEnvelopeCodec::fault(&error, FaultOrigin::Backend);
        let body = fault.document.first_child_element().unwrap();
        let fault_element = body.first_child_element().unwrap();
        let detail = fault_element.child(SOAP_ENVELOPE, "detail").unwrap();
        assert_eq!(detail.first_child_element().unwrap().local_name(), "ServiceExceptionReport");
    }
}
