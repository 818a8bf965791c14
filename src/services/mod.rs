//! Backend service adapters.
//!
//! # Responsibilities
//! - Define the backend contract ([`OwsService`]) and its result sum type
//! - Provide one [`ServiceHandler`] per protocol that calls a backend and
//!   shapes its result into the response capture
//! - Hold the name → handler registry
//!
//! # Data Flow
//! ```text
//! NormalizedRequest
//!     → registry.rs (name lookup)
//!     → wms.rs / wfs.rs / csw.rs / wcs.rs / generic.rs (protocol shaping)
//!     → OwsService::handle (backend, e.g. static_backend.rs)
//!     → BackendResult → ResponseCapture
//! ```
//!
//! # Design Decisions
//! - A backend answers with a tagged [`BackendResult`]; handlers match it
//!   exhaustively instead of probing runtime types
//! - Handlers never encode faults themselves; every failure is returned as an
//!   `ExceptionDescriptor` for the gateway's encoder

pub mod capabilities;
pub mod csw;
pub mod generic;
pub mod registry;
pub mod static_backend;
pub mod wcs;
pub mod wfs;
pub mod wms;
pub mod xslt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::http::capture::ResponseCapture;
use crate::ows::exception::ExceptionDescriptor;
use crate::ows::multipart::reference_anchors;
use crate::ows::request::NormalizedRequest;
use crate::xml::XmlElement;

pub use registry::{BackendProvider, RegistryError, ServiceRegistry, SharedRegistry, StaticBackends};
pub use static_backend::StaticDocumentService;
pub use xslt::{ProcessXsltTransformer, StylesheetCache, Transformations, XsltError, XsltTransformer};

/// What a backend produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResult {
    Capabilities(XmlElement),
    Document(XmlElement),
    FeatureCollection(XmlElement),
    Image { mime: String, bytes: Bytes },
    Binary { mime: String, bytes: Bytes },
    Text { mime: String, body: String },
    /// A failure reported in-band.
    Exception(ExceptionDescriptor),
}

impl BackendResult {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Capabilities(_) => "capabilities",
            Self::Document(_) => "document",
            Self::FeatureCollection(_) => "feature_collection",
            Self::Image { .. } => "image",
            Self::Binary { .. } => "binary",
            Self::Text { .. } => "text",
            Self::Exception(_) => "exception",
        }
    }
}

/// The business logic behind one service.
#[async_trait]
pub trait OwsService: Send + Sync {
    async fn handle(&self, request: &NormalizedRequest) -> Result<BackendResult, ExceptionDescriptor>;
}

/// Protocol adapter between the gateway and a backend.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    /// Protocol family, upper-cased (`WMS`, `WFS`, ...).
    fn name(&self) -> &str;

    /// Call the backend and write the successful response into `capture`.
    async fn handle(
        &self,
        request: &NormalizedRequest,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor>;

    /// Insertion points for the multipart attachment `name_id`.
    fn attachment_anchors(&self, root: &XmlElement, name_id: &str) -> Vec<Vec<usize>> {
        reference_anchors(root, name_id)
    }
}

/// Write a backend result; XML documents get `xml_content_type`.
pub(crate) fn write_result(
    capture: &mut ResponseCapture,
    result: BackendResult,
    xml_content_type: &str,
) -> Result<(), ExceptionDescriptor> {
    match result {
        BackendResult::Capabilities(doc) | BackendResult::Document(doc) | BackendResult::FeatureCollection(doc) => {
            capture.write_document(xml_content_type, doc.to_xml_bytes());
        }
        BackendResult::Image { mime, bytes } | BackendResult::Binary { mime, bytes } => {
            capture.write_document(mime, bytes);
        }
        BackendResult::Text { mime, body } => capture.write_document(mime, body),
        BackendResult::Exception(error) => return Err(error),
    }
    Ok(())
}
