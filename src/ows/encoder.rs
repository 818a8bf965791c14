//! Fault serialization.
//!
//! # Responsibilities
//! - Choose the fault document shape from service, version, SOAP use and the
//!   client's declared exception format
//! - Build the report document (or error image) and write it into the capture
//! - Count every encoded fault
//!
//! # Data Flow
//! ```text
//! ExceptionDescriptor + ExceptionContext
//!     → SOAP in use?            → soap:Fault (status per fault class)
//!     → envelope stage?         → facade ows:ExceptionReport (application/xml)
//!     → WMS format negotiation  → INIMAGE / BLANK image, or XML report
//!     → service / version table → OGC, OWS 1.0, OWS 1.1, WFS 1.0 or legacy report
//! ```
//!
//! # Design Decisions
//! - Every failure is encoded exactly once; the capture is reset first so a
//!   half-written success body never leaks into a fault
//! - An image that cannot be produced degrades to the XML report

use std::fmt;

use axum::http::StatusCode;

use crate::http::capture::ResponseCapture;
use crate::http::params::ParameterMap;
use crate::ows::exception::{ExceptionDescriptor, FaultOrigin};
use crate::ows::image::{self, Canvas, ImageEncoding};
use crate::ows::namespaces;
use crate::ows::request::{service_from_uri, NormalizedRequest};
use crate::ows::soap::SoapEnvelopeCodec;
use crate::xml::{QName, XmlElement};

pub const SE_XML: &str = "application/vnd.ogc.se_xml";
pub const SE_INIMAGE: &str = "application/vnd.ogc.se_inimage";
pub const SE_BLANK: &str = "application/vnd.ogc.se_blank";
const TEXT_XML: &str = "text/xml";
const APPLICATION_XML: &str = "application/xml";

/// Fault document shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionShape {
    /// Map image with the error drawn on it.
    InImage,
    /// Empty map image.
    Blank,
    /// `ServiceExceptionReport` in the OGC namespace, version 1.3.0.
    OgcNamespaced,
    /// OWS 1.0.0 `ExceptionReport` of the catalogue service.
    Catalogue,
    /// OWS 1.1.0 `ExceptionReport` of the coordinate transformation service.
    Ows110,
    /// OGC `ServiceExceptionReport` 1.2.0 of WFS 1.0.0.
    Wfs100,
    /// OWS 1.1.0 `ExceptionReport` of WFS 1.1.0.
    Wfs110,
    /// Un-namespaced `ServiceExceptionReport` 1.1.1.
    Legacy,
    /// Envelope-stage report in the configured error namespace.
    Facade,
    SoapFault,
}

impl ExceptionShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InImage => "inimage",
            Self::Blank => "blank",
            Self::OgcNamespaced => "ogc_namespaced",
            Self::Catalogue => "catalogue",
            Self::Ows110 => "ows_1_1_0",
            Self::Wfs100 => "wfs_1_0_0",
            Self::Wfs110 => "wfs_1_1_0",
            Self::Legacy => "legacy",
            Self::Facade => "facade",
            Self::SoapFault => "soap_fault",
        }
    }
}

impl fmt::Display for ExceptionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the encoder needs to know about the failed request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExceptionContext {
    /// Upper-cased protocol family (WMS, WFS, ...), when known.
    pub service: Option<String>,
    pub version: Option<String>,
    /// Content type for SOAP faults; `Some` when the request came in a SOAP envelope.
    pub soap: Option<String>,
    pub uri: String,
    pub exceptions: Option<String>,
    pub format: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub bgcolor: Option<String>,
    pub transparent: Option<String>,
}

impl ExceptionContext {
    /// Context for a failure before any request could be read.
    pub fn envelope(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }

    /// Context from raw parameters, for requests that failed normalization.
    pub fn from_parameters(params: &ParameterMap, uri: impl Into<String>) -> Self {
        let value = |key: &str| params.get_non_empty(key).map(str::to_owned);
        Self {
            service: value("SERVICE").map(|s| s.to_uppercase()),
            version: value("VERSION").or_else(|| value("WMTVER")),
            soap: None,
            uri: uri.into(),
            exceptions: value("EXCEPTIONS"),
            format: value("FORMAT"),
            width: value("WIDTH"),
            height: value("HEIGHT"),
            bgcolor: value("BGCOLOR"),
            transparent: value("TRANSPARENT"),
        }
    }

    pub fn from_request(request: &NormalizedRequest, uri: impl Into<String>) -> Self {
        let value = |key: &str| request.parameter(key).map(str::to_owned);
        Self {
            service: Some(request.service.clone()),
            version: request.version.clone(),
            soap: None,
            uri: uri.into(),
            exceptions: value("EXCEPTIONS"),
            format: value("FORMAT"),
            width: value("WIDTH"),
            height: value("HEIGHT"),
            bgcolor: value("BGCOLOR"),
            transparent: value("TRANSPARENT"),
        }
    }

    /// Replace the dispatch name with its protocol family, e.g. a catalogue profile name.
    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.service = Some(protocol.to_uppercase());
        self
    }

    pub fn with_soap(mut self, content_type: impl Into<String>) -> Self {
        self.soap = Some(content_type.into());
        self
    }

    fn is_service(&self, name: &str) -> bool {
        self.service.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(name))
    }

    fn version_is(&self, version: &str) -> bool {
        self.version.as_deref() == Some(version)
    }
}

#[derive(Debug, Clone)]
pub struct ExceptionEncoder {
    /// Offered map exception formats, MIME names interleaved with 1.3.0 names.
    wms_formats: Vec<String>,
    max_image: (u32, u32),
    error_namespace: String,
}

impl Default for ExceptionEncoder {
    fn default() -> Self {
        Self::new(&["XML", "INIMAGE", "BLANK"], (4096, 4096), namespaces::OWS)
    }
}

impl ExceptionEncoder {
    pub fn new<S: AsRef<str>>(wms_formats: &[S], max_image: (u32, u32), error_namespace: &str) -> Self {
        let mut offered = Vec::new();
        for format in wms_formats {
            let format = format.as_ref().trim();
            let mime = match format.to_ascii_uppercase().as_str() {
                "XML" => Some(SE_XML),
                "INIMAGE" => Some(SE_INIMAGE),
                "BLANK" => Some(SE_BLANK),
                _ => None,
            };
            offered.extend(mime.map(str::to_owned));
            offered.push(format.to_string());
        }
        if offered.is_empty() {
            offered.push(SE_XML.to_string());
        }
        Self {
            wms_formats: offered,
            max_image,
            error_namespace: error_namespace.to_string(),
        }
    }

    /// Resolve the map service's exception format for a request.
    ///
    /// An unoffered format falls back to the first offered one; no format
    /// means `application/vnd.ogc.se_xml` for 1.1.1 and `XML` otherwise.
    pub fn wms_exception_format(&self, requested: Option<&str>, version: Option<&str>) -> String {
        let requested = requested.map(str::trim).filter(|r| !r.is_empty());
        let format = match requested {
            Some(requested) => self
                .wms_formats
                .iter()
                .find(|offered| offered.eq_ignore_ascii_case(requested))
                .unwrap_or(&self.wms_formats[0])
                .clone(),
            None if version == Some("1.1.1") => SE_XML.to_string(),
            None => "XML".to_string(),
        };
        match format.to_ascii_uppercase().as_str() {
            "INIMAGE" => SE_INIMAGE.to_string(),
            "BLANK" => SE_BLANK.to_string(),
            "XML" => "XML".to_string(),
            _ => format,
        }
    }

    /// Pick the document shape for `ctx`. A `wcs` locator selects the
    /// namespaced report.
    pub fn select_shape(&self, ctx: &ExceptionContext, origin: FaultOrigin, locator: Option<&str>) -> ExceptionShape {
        if ctx.soap.is_some() {
            return ExceptionShape::SoapFault;
        }
        if origin == FaultOrigin::Envelope {
            return ExceptionShape::Facade;
        }
        if ctx.is_service("WMS") {
            if let Some(shape) = self.wms_shape(ctx) {
                return shape;
            }
        }
        self.service_shape(ctx, locator)
    }

    fn wms_shape(&self, ctx: &ExceptionContext) -> Option<ExceptionShape> {
        let format = self.wms_exception_format(ctx.exceptions.as_deref(), ctx.version.as_deref());
        let image_format = ctx.format.as_deref().and_then(ImageEncoding::from_format);
        match format.as_str() {
            SE_INIMAGE if image_format.is_some() => Some(ExceptionShape::InImage),
            SE_BLANK if image_format.is_some() => Some(ExceptionShape::Blank),
            SE_INIMAGE | SE_BLANK => None,
            "XML" => Some(ExceptionShape::OgcNamespaced),
            _ => Some(ExceptionShape::Legacy),
        }
    }

    fn service_shape(&self, ctx: &ExceptionContext, locator: Option<&str>) -> ExceptionShape {
        let mut wms130 = ctx.is_service("WMS") && ctx.version_is("1.3.0");
        let mut csw = ctx.is_service("CSW");
        let mut wcts = ctx.is_service("WCTS");
        let mut wfs = ctx.is_service("WFS");
        let mut wfs100 = wfs && ctx.version_is("1.0.0");

        if !(wms130 || csw || wcts || wfs) {
            match service_from_uri(&ctx.uri) {
                Some("CSW") => csw = true,
                Some("WCTS") => wcts = true,
                Some("WFS") => {
                    wfs = true;
                    wfs100 = ctx.uri.contains("1.0.0");
                }
                _ => {}
            }
            if !(csw || wcts || wfs) {
                wms130 = ctx.version_is("1.3.0");
            }
        }

        if wms130 || locator.is_some_and(|l| l.eq_ignore_ascii_case("wcs")) {
            ExceptionShape::OgcNamespaced
        } else if csw {
            ExceptionShape::Catalogue
        } else if wcts {
            ExceptionShape::Ows110
        } else if wfs100 {
            ExceptionShape::Wfs100
        } else if wfs {
            ExceptionShape::Wfs110
        } else {
            ExceptionShape::Legacy
        }
    }

    /// Build an XML report and its content type. Image and SOAP shapes have
    /// no XML report of their own and yield the legacy document.
    pub fn report(&self, shape: ExceptionShape, error: &ExceptionDescriptor) -> (&'static str, XmlElement) {
        match shape {
            ExceptionShape::OgcNamespaced => (TEXT_XML, ogc_report(error, Some(namespaces::OGC), "1.3.0")),
            ExceptionShape::Catalogue => (TEXT_XML, ows_report(error, namespaces::OWS, "1.0.0")),
            ExceptionShape::Ows110 | ExceptionShape::Wfs110 => (TEXT_XML, ows_report(error, namespaces::OWS_1_1, "1.1.0")),
            ExceptionShape::Wfs100 => (TEXT_XML, ogc_report(error, Some(namespaces::OGC), "1.2.0")),
            ExceptionShape::Facade => (APPLICATION_XML, self.facade_report(error)),
            ExceptionShape::Legacy | ExceptionShape::InImage | ExceptionShape::Blank | ExceptionShape::SoapFault => {
                (SE_XML, ogc_report(error, None, "1.1.1"))
            }
        }
    }

    fn facade_report(&self, error: &ExceptionDescriptor) -> XmlElement {
        let entry = XmlElement::prefixed(&self.error_namespace, "err", error.code.as_str())
            .with_text(error.message.clone());
        XmlElement::prefixed(namespaces::OWS, "ows", "ExceptionReport").with_child(entry)
    }

    /// Write the fault for `error` into `capture`, replacing anything captured so far.
    pub fn encode(
        &self,
        error: &ExceptionDescriptor,
        origin: FaultOrigin,
        ctx: &ExceptionContext,
        capture: &mut ResponseCapture,
    ) -> ExceptionShape {
        capture.reset();
        let mut shape = self.select_shape(ctx, origin, error.effective_locator());

        match shape {
            ExceptionShape::SoapFault => {
                let fault = SoapEnvelopeCodec::fault(error, origin);
                capture.set_status(fault.status);
                let content_type = ctx.soap.as_deref().unwrap_or(TEXT_XML);
                capture.write_document(content_type, fault.document.to_xml_bytes());
            }
            ExceptionShape::InImage | ExceptionShape::Blank => match self.render_image(shape, error, ctx) {
                Ok((content_type, bytes)) => capture.write_document(content_type, bytes),
                Err(e) => {
                    tracing::warn!(error = %e, "Unable to render exception image, sending XML report");
                    shape = ExceptionShape::Legacy;
                    self.write_report(shape, error, capture);
                }
            },
            _ => self.write_report(shape, error, capture),
        }

        tracing::info!(
            code = %error.code,
            shape = %shape,
            origin = origin.as_str(),
            service = ?ctx.service,
            message = %error.message,
            "Sending exception"
        );
        metrics::counter!(
            "ows_exceptions_total",
            "code" => error.code.as_str().to_string(),
            "shape" => shape.as_str()
        )
        .increment(1);
        shape
    }

    fn write_report(&self, shape: ExceptionShape, error: &ExceptionDescriptor, capture: &mut ResponseCapture) {
        let (content_type, document) = self.report(shape, error);
        capture.set_status(StatusCode::OK);
        capture.write_document(content_type, document.to_xml_bytes());
    }

    fn render_image(
        &self,
        shape: ExceptionShape,
        error: &ExceptionDescriptor,
        ctx: &ExceptionContext,
    ) -> Result<(&'static str, Vec<u8>), ::image::ImageError> {
        let encoding = ctx
            .format
            .as_deref()
            .and_then(ImageEncoding::from_format)
            .unwrap_or(ImageEncoding::Png);
        let canvas = Canvas::from_request(
            ctx.width.as_deref(),
            ctx.height.as_deref(),
            ctx.bgcolor.as_deref(),
            ctx.transparent.as_deref(),
            encoding,
            self.max_image,
        );
        let bytes = if shape == ExceptionShape::Blank {
            image::render_blank(&canvas)?
        } else {
            image::render_in_image(&canvas, error.code.as_str(), &error.message)?
        };
        Ok((encoding.content_type(), bytes))
    }
}

/// `ServiceExceptionReport/ServiceException[@code, @locator]`.
fn ogc_report(error: &ExceptionDescriptor, namespace: Option<&str>, version: &str) -> XmlElement {
    let element = |local: &str| match namespace {
        Some(ns) => XmlElement::in_namespace(ns, local),
        None => XmlElement::new(QName::local(local)),
    };
    let mut exception = element("ServiceException").with_attribute("code", error.code.as_str());
    if let Some(locator) = error.effective_locator() {
        exception = exception.with_attribute("locator", locator);
    }
    element("ServiceExceptionReport")
        .with_attribute("version", version)
        .with_child(exception.with_text(error.message.clone()))
}

/// `ows:ExceptionReport/ows:Exception[@exceptionCode, @locator]/ows:ExceptionText`.
fn ows_report(error: &ExceptionDescriptor, namespace: &str, version: &str) -> XmlElement {
    let mut exception = XmlElement::prefixed(namespace, "ows", "Exception")
        .with_attribute("exceptionCode", error.code.as_str());
    if let Some(locator) = error.effective_locator() {
        exception = exception.with_attribute("locator", locator);
    }
    if !error.message.is_empty() {
        exception.push_child(XmlElement::prefixed(namespace, "ows", "ExceptionText").with_text(error.message.clone()));
    }
    XmlElement::prefixed(namespace, "ows", "ExceptionReport")
        .with_attribute("version", version)
        .with_child(exception)
}
