//! Feature service adapter.
//!
//! # Responsibilities
//! - Capabilities with `SECTIONS` selection (1.1.0 and later)
//! - Virtual output formats: the in-filter rewrites the XML request before
//!   the backend sees it, the out-filter rewrites the feature collection
//!
//! # Data Flow
//! ```text
//! request ─[in-filter]─▶ backend ─▶ FeatureCollection ─[out-filter]─▶ capture (format MIME)
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::VirtualFormatConfig;
use crate::http::capture::ResponseCapture;
use crate::ows::exception::ExceptionDescriptor;
use crate::ows::request::{NormalizedRequest, RequestPayload};
use crate::services::capabilities::{requested_sections, select_sections};
use crate::services::xslt::Transformations;
use crate::services::{write_result, BackendResult, OwsService, ServiceHandler};

const CAPABILITIES_CONTENT_TYPE: &str = "application/xml";
const GML_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

pub struct WfsHandler {
    backend: Arc<dyn OwsService>,
    virtual_formats: Vec<VirtualFormatConfig>,
    transformations: Arc<Transformations>,
}

impl WfsHandler {
    pub fn new(
        backend: Arc<dyn OwsService>,
        virtual_formats: Vec<VirtualFormatConfig>,
        transformations: Arc<Transformations>,
    ) -> Self {
        Self {
            backend,
            virtual_formats,
            transformations,
        }
    }

    fn virtual_format(&self, request: &NormalizedRequest) -> Option<&VirtualFormatConfig> {
        let requested = request.parameter("OUTPUTFORMAT")?.trim();
        self.virtual_formats.iter().find(|f| f.name.trim() == requested)
    }

    /// Apply the in-filter to an XML request; KVP requests pass unchanged.
    async fn prepare<'a>(
        &self,
        request: &'a NormalizedRequest,
        format: Option<&VirtualFormatConfig>,
    ) -> Result<Cow<'a, NormalizedRequest>, ExceptionDescriptor> {
        let Some(location) = format.and_then(|f| f.in_filter.as_deref()) else {
            return Ok(Cow::Borrowed(request));
        };
        let RequestPayload::Xml(root) = &request.payload else {
            tracing::debug!(request_id = %request.request_id, "In-filter skipped for KVP request");
            return Ok(Cow::Borrowed(request));
        };
        let transformed = self.transformations.apply(location, root).await?;
        let mut rewritten = request.clone();
        rewritten.payload = RequestPayload::Xml(transformed);
        Ok(Cow::Owned(rewritten))
    }
}

/// `true` for versions up to and including 1.0.0. Missing components count
/// as zero; a version that is not dotted numbers is never legacy.
fn is_legacy_version(version: Option<&str>) -> bool {
    let Some(version) = version else {
        return false;
    };
    let parts: Result<Vec<u32>, _> = version.trim().split('.').map(str::parse::<u32>).collect();
    match parts {
        Ok(mut parts) => {
            parts.resize(parts.len().max(3), 0);
            parts.as_slice() <= [1, 0, 0].as_slice()
        }
        Err(_) => false,
    }
}

#[async_trait]
impl ServiceHandler for WfsHandler {
    fn name(&self) -> &str {
        "WFS"
    }

    async fn handle(
        &self,
        request: &NormalizedRequest,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let format = self.virtual_format(request);
        let effective = self.prepare(request, format).await?;
        let result = self.backend.handle(&effective).await?;
        tracing::debug!(
            request_id = %request.request_id,
            operation = %request.operation,
            result = result.kind(),
            virtual_format = format.map(|f| f.name.as_str()),
            "WFS backend answered"
        );

        match result {
            BackendResult::Exception(error) => Err(error),
            BackendResult::Capabilities(document) => {
                let document = if is_legacy_version(request.version.as_deref()) {
                    document
                } else {
                    let sections = requested_sections(request.parameter("SECTIONS"));
                    select_sections(document, sections.as_deref())
                };
                capture.write_document(CAPABILITIES_CONTENT_TYPE, document.to_xml_bytes());
                Ok(())
            }
            BackendResult::FeatureCollection(collection) => match format {
                Some(format) => {
                    let output = match format.out_filter.as_deref() {
                        Some(location) => {
                            self.transformations
                                .apply_bytes(location, &collection.to_xml_bytes())
                                .await?
                        }
                        None => collection.to_xml_bytes(),
                    };
                    capture.write_document(format.mime_type.clone(), output);
                    Ok(())
                }
                None => write_result(capture, BackendResult::FeatureCollection(collection), GML_CONTENT_TYPE),
            },
            other => write_result(capture, other, GML_CONTENT_TYPE),
        }
    }
}
