//! Map service adapter.
//!
//! # Responsibilities
//! - Version dependent capabilities content type
//! - Image-only answers for map and legend requests
//! - Feature info in the requested `INFO_FORMAT`, optionally through a
//!   configured stylesheet
//!
//! Errors of this service may be rendered as images; that decision is left
//! to the exception encoder, which reads `EXCEPTIONS` from the same request.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::http::capture::ResponseCapture;
use crate::ows::exception::{ExceptionCode, ExceptionDescriptor};
use crate::ows::request::NormalizedRequest;
use crate::services::xslt::Transformations;
use crate::services::{write_result, BackendResult, OwsService, ServiceHandler};
use crate::xml::XmlElement;

const WMS_XML: &str = "application/vnd.ogc.wms_xml";
const DEFAULT_INFO_FORMAT: &str = "application/vnd.ogc.gml";

pub struct WmsHandler {
    backend: Arc<dyn OwsService>,
    /// Info format to stylesheet location.
    feature_info_transforms: BTreeMap<String, String>,
    transformations: Arc<Transformations>,
}

impl WmsHandler {
    pub fn new(
        backend: Arc<dyn OwsService>,
        feature_info_transforms: BTreeMap<String, String>,
        transformations: Arc<Transformations>,
    ) -> Self {
        Self {
            backend,
            feature_info_transforms,
            transformations,
        }
    }

    fn require_image_format(request: &NormalizedRequest) -> Result<(), ExceptionDescriptor> {
        let format = request.parameter("FORMAT").unwrap_or_default();
        if format.trim().to_ascii_lowercase().starts_with("image/") {
            Ok(())
        } else {
            Err(ExceptionDescriptor::new(
                ExceptionCode::InvalidFormat,
                format!("{} is not a known image format", format),
            )
            .with_locator("FORMAT"))
        }
    }

    async fn feature_info(
        &self,
        request: &NormalizedRequest,
        result: BackendResult,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let info_format = request
            .parameter("INFO_FORMAT")
            .unwrap_or(DEFAULT_INFO_FORMAT)
            .to_string();
        let stylesheet = self
            .feature_info_transforms
            .iter()
            .find(|(format, _)| format.eq_ignore_ascii_case(&info_format))
            .map(|(_, location)| location.as_str());

        let document = match (&result, stylesheet) {
            (BackendResult::Document(doc) | BackendResult::FeatureCollection(doc), Some(_)) => Some(doc.clone()),
            (BackendResult::Text { body, .. }, Some(_)) => Some(XmlElement::parse(body.as_bytes())?),
            _ => None,
        };

        match (document, stylesheet) {
            (Some(document), Some(location)) => {
                tracing::debug!(request_id = %request.request_id, stylesheet = location, "Transforming feature info");
                let output = self
                    .transformations
                    .apply_bytes(location, &document.to_xml_bytes())
                    .await?;
                capture.write_document(info_format, output);
                Ok(())
            }
            _ => match result {
                BackendResult::Text { body, .. } => {
                    capture.write_document(info_format, body);
                    Ok(())
                }
                other => write_result(capture, other, &info_format),
            },
        }
    }
}

#[async_trait]
impl ServiceHandler for WmsHandler {
    fn name(&self) -> &str {
        "WMS"
    }

    async fn handle(
        &self,
        request: &NormalizedRequest,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let operation = request.operation.as_str();
        if request.is_operation("GetStyles") || request.is_operation("PutStyles") {
            return Err(ExceptionDescriptor::not_supported(operation));
        }
        let image_operation =
            request.is_operation("GetMap") || operation == "map" || request.is_operation("GetLegendGraphic");
        if image_operation {
            Self::require_image_format(request)?;
        }

        let result = self.backend.handle(request).await?;
        tracing::debug!(request_id = %request.request_id, operation, result = result.kind(), "WMS backend answered");

        if let BackendResult::Exception(error) = result {
            return Err(error);
        }
        if request.is_operation("GetCapabilities") || operation == "capabilities" {
            let content_type = if request.version_is("1.3.0") { "text/xml" } else { WMS_XML };
            return write_result(capture, result, content_type);
        }
        if image_operation {
            return match result {
                BackendResult::Image { .. } | BackendResult::Binary { .. } => write_result(capture, result, "text/xml"),
                other => Err(ExceptionDescriptor::internal(format!(
                    "The map service answered '{}' with a {} instead of an image.",
                    operation,
                    other.kind()
                ))),
            };
        }
        if request.is_operation("GetFeatureInfo") || operation == "feature_info" {
            return self.feature_info(request, result, capture).await;
        }
        write_result(capture, result, "text/xml")
    }
}
