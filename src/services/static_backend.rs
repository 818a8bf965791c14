//! File-backed backend that answers each operation with a configured document.
//!
//! Lets the gateway run (and be exercised end to end) without linked
//! business logic: `GetCapabilities` can be served from a file on disk while
//! every unconfigured operation is reported as unsupported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use crate::ows::exception::{ExceptionCode, ExceptionDescriptor};
use crate::ows::request::NormalizedRequest;
use crate::services::{BackendResult, OwsService};
use crate::xml::XmlElement;

#[derive(Debug, Clone)]
pub struct StaticDocumentService {
    /// Lower-cased operation name to file.
    documents: BTreeMap<String, PathBuf>,
}

impl StaticDocumentService {
    /// Relative paths resolve against `base_dir`.
    pub fn new(documents: &BTreeMap<String, String>, base_dir: &Path) -> Self {
        let documents = documents
            .iter()
            .map(|(operation, file)| {
                let path = Path::new(file);
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    base_dir.join(path)
                };
                (operation.to_lowercase(), path)
            })
            .collect();
        Self { documents }
    }

    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }
}

#[async_trait]
impl OwsService for StaticDocumentService {
    async fn handle(&self, request: &NormalizedRequest) -> Result<BackendResult, ExceptionDescriptor> {
        let path = self
            .documents
            .get(&request.operation.to_lowercase())
            .ok_or_else(|| ExceptionDescriptor::not_supported(&request.operation))?;

        let content = tokio::fs::read(path).await.map_err(|e| {
            tracing::error!(path = ?path, error = %e, "Unable to read configured document");
            ExceptionDescriptor::new(
                ExceptionCode::NoApplicableCode,
                format!("The response document for '{}' is not available.", request.operation),
            )
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let result = match extension.as_str() {
            "xml" | "gml" | "xsd" | "wsdl" => {
                let document = XmlElement::parse(&content).map_err(|e| {
                    ExceptionDescriptor::new(
                        ExceptionCode::NoApplicableCode,
                        format!("The response document for '{}' is invalid: {}", request.operation, e),
                    )
                })?;
                if request.is_operation("GetCapabilities") {
                    BackendResult::Capabilities(document)
                } else if request.is_operation("GetFeature") {
                    BackendResult::FeatureCollection(document)
                } else {
                    BackendResult::Document(document)
                }
            }
            "png" | "gif" | "jpg" | "jpeg" => BackendResult::Image {
                mime: match extension.as_str() {
                    "png" => "image/png",
                    "gif" => "image/gif",
                    _ => "image/jpeg",
                }
                .to_string(),
                bytes: Bytes::from(content),
            },
            "txt" | "html" => BackendResult::Text {
                mime: if extension == "txt" { "text/plain" } else { "text/html" }.to_string(),
                body: String::from_utf8_lossy(&content).into_owned(),
            },
            _ => BackendResult::Binary {
                mime: "application/octet-stream".to_string(),
                bytes: Bytes::from(content),
            },
        };
        Ok(result)
    }
}
