//! Coverage service adapter: XML documents as `text/xml`, coverages in the
//! format the backend produced.

use std::sync::Arc;

use async_trait::async_trait;

use crate::http::capture::ResponseCapture;
use crate::ows::exception::ExceptionDescriptor;
use crate::ows::request::NormalizedRequest;
use crate::services::{write_result, BackendResult, OwsService, ServiceHandler};

pub struct WcsHandler {
    backend: Arc<dyn OwsService>,
}

impl WcsHandler {
    pub fn new(backend: Arc<dyn OwsService>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ServiceHandler for WcsHandler {
    fn name(&self) -> &str {
        "WCS"
    }

    async fn handle(
        &self,
        request: &NormalizedRequest,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let result = self.backend.handle(request).await?;
        if request.is_operation("GetCoverage") {
            if let BackendResult::Image { mime, bytes } | BackendResult::Binary { mime, bytes } = &result {
                tracing::debug!(request_id = %request.request_id, mime = %mime, size = bytes.len(), "Coverage produced");
            }
        }
        write_result(capture, result, "text/xml")
    }
}
