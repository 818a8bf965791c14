//! Catalogue service adapter, also registered under the ebRIM profile name.
//!
//! Multipart transactions of the ebRIM profile carry repository items as
//! attachments; each one belongs inside the `rim:ExtrinsicObject` whose `id`
//! equals the part name.

use std::sync::Arc;

use async_trait::async_trait;

use crate::http::capture::ResponseCapture;
use crate::ows::exception::ExceptionDescriptor;
use crate::ows::multipart::reference_anchors;
use crate::ows::namespaces;
use crate::ows::request::NormalizedRequest;
use crate::services::{write_result, OwsService, ServiceHandler};
use crate::xml::XmlElement;

const CONTENT_TYPE: &str = "application/xml";

pub struct CswHandler {
    backend: Arc<dyn OwsService>,
}

impl CswHandler {
    pub fn new(backend: Arc<dyn OwsService>) -> Self {
        Self { backend }
    }
}

/// `rim:ExtrinsicObject` elements whose `id` is `name_id`.
pub fn extrinsic_object_anchors(root: &XmlElement, name_id: &str) -> Vec<Vec<usize>> {
    root.find_paths(|element| {
        element.name.is(namespaces::EBRIM, "ExtrinsicObject") && element.attribute("id") == Some(name_id)
    })
}

#[async_trait]
impl ServiceHandler for CswHandler {
    fn name(&self) -> &str {
        "CSW"
    }

    async fn handle(
        &self,
        request: &NormalizedRequest,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let result = self.backend.handle(request).await?;
        tracing::debug!(
            request_id = %request.request_id,
            service = %request.service,
            operation = %request.operation,
            result = result.kind(),
            "CSW backend answered"
        );
        write_result(capture, result, CONTENT_TYPE)
    }

    fn attachment_anchors(&self, root: &XmlElement, name_id: &str) -> Vec<Vec<usize>> {
        let anchors = extrinsic_object_anchors(root, name_id);
        if anchors.is_empty() {
            reference_anchors(root, name_id)
        } else {
            anchors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::params::ParameterMap;
    use crate::services::BackendResult;

    const TRANSACTION: &[u8] = br#"<csw:Transaction xmlns:csw="http://www.opengis.net/cat/csw/2.0.2"
        xmlns:rim="urn:oasis:names:tc:ebxml-regrep:xsd:rim:3.0" service="CSW" version="2.0.2">
  <csw:Insert>
    <rim:RegistryPackage id="pkg">
      <rim:RegistryObjectList>
        <rim:ExtrinsicObject id="urn:item:1"/>
        <rim:ExtrinsicObject id="urn:item:2"/>
      </rim:RegistryObjectList>
    </rim:RegistryPackage>
  </csw:Insert>
</csw:Transaction>"#;

    struct Records;

    #[async_trait]
    impl OwsService for Records {
        async fn handle(&self, _request: &NormalizedRequest) -> Result<BackendResult, ExceptionDescriptor> {
            Ok(BackendResult::Document(XmlElement::parse(b"<GetRecordsResponse/>").unwrap()))
        }
    }

    #[test]
    fn test_extrinsic_object_anchor() {
        let root = XmlElement::parse(TRANSACTION).unwrap();
        let handler = CswHandler::new(Arc::new(Records));
        let anchors = handler.attachment_anchors(&root, "urn:item:2");
        assert_eq!(anchors.len(), 1);
        let anchor = root.element_at_path(&anchors[0]).unwrap();
        assert_eq!(anchor.attribute("id"), Some("urn:item:2"));
        assert!(handler.attachment_anchors(&root, "urn:item:9").is_empty());
    }

    #[tokio::test]
    async fn test_documents_are_application_xml() {
        let handler = CswHandler::new(Arc::new(Records));
        let request =
            NormalizedRequest::from_kvp(ParameterMap::from_query("request=GetRecords"), "/csw", "r").unwrap();
        let mut capture = ResponseCapture::new();
        handler.handle(&request, &mut capture).await.unwrap();
        assert_eq!(capture.content_type(), Some(CONTENT_TYPE));
    }
}
