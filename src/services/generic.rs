//! Adapter for protocols without special response shaping
//! (WCTS, WPS, SOS, WPVS, WMPS, WAS, WSS).

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Protocol;
use crate::http::capture::ResponseCapture;
use crate::ows::exception::ExceptionDescriptor;
use crate::ows::request::NormalizedRequest;
use crate::services::{write_result, OwsService, ServiceHandler};

pub struct GenericHandler {
    name: &'static str,
    content_type: &'static str,
    backend: Arc<dyn OwsService>,
}

impl GenericHandler {
    pub fn new(protocol: Protocol, backend: Arc<dyn OwsService>) -> Self {
        Self {
            name: protocol.service_name(),
            content_type: default_content_type(protocol),
            backend,
        }
    }
}

/// Content type for XML results of `protocol`.
pub fn default_content_type(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Wcts | Protocol::Wps | Protocol::Wmps => "text/xml",
        Protocol::Was | Protocol::Wss => "application/xml",
        _ => "text/xml; charset=UTF-8",
    }
}

#[async_trait]
impl ServiceHandler for GenericHandler {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle(
        &self,
        request: &NormalizedRequest,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let result = self.backend.handle(request).await?;
        tracing::debug!(
            request_id = %request.request_id,
            service = self.name,
            operation = %request.operation,
            result = result.kind(),
            "Backend answered"
        );
        write_result(capture, result, self.content_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::params::ParameterMap;
    use crate::services::BackendResult;
    use crate::xml::XmlElement;

    struct Echo;

    #[async_trait]
    impl OwsService for Echo {
        async fn handle(&self, request: &NormalizedRequest) -> Result<BackendResult, ExceptionDescriptor> {
            Ok(BackendResult::Document(
                XmlElement::parse(format!("<{}Response/>", request.operation).as_bytes()).unwrap(),
            ))
        }
    }

    #[tokio::test]
    async fn test_protocol_content_type() {
        let handler = GenericHandler::new(Protocol::Sos, Arc::new(Echo));
        assert_eq!(handler.name(), "SOS");
        let request =
            NormalizedRequest::from_kvp(ParameterMap::from_query("request=GetObservation"), "/", "r").unwrap();
        let mut capture = ResponseCapture::new();
        handler.handle(&request, &mut capture).await.unwrap();
        assert_eq!(capture.content_type(), Some("text/xml; charset=UTF-8"));
        assert!(capture.body().ends_with(b"<GetObservationResponse/>"));
    }
}
