//! Transport-independent request representation.
//!
//! # Responsibilities
//! - Build a [`NormalizedRequest`] from a parameter map or an XML document
//! - Resolve the target service name (explicit, declared, inferred, URI guess)
//! - Flag GetMap requests that carry `FILTERPROPERTY`
//!
//! # Design Decisions
//! - Service names are upper-cased here and nowhere else
//! - The URI heuristic is first-match-wins in the fixed order `csw`, `wcts`, `wfs`

use crate::http::params::ParameterMap;
use crate::ows::exception::ExceptionDescriptor;
use crate::ows::namespaces;
use crate::xml::XmlElement;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestPayload {
    Kvp(ParameterMap),
    Xml(XmlElement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    /// Upper-cased dispatch key.
    pub service: String,
    pub version: Option<String>,
    pub operation: String,
    pub payload: RequestPayload,
    pub request_id: String,
    /// Set for GetMap requests carrying `FILTERPROPERTY`.
    pub bypass_filters: bool,
}

impl NormalizedRequest {
    pub fn from_kvp(
        params: ParameterMap,
        uri: &str,
        request_id: &str,
    ) -> Result<Self, ExceptionDescriptor> {
        let operation = params
            .get_non_empty("REQUEST")
            .ok_or_else(|| ExceptionDescriptor::missing_parameter("REQUEST"))?
            .to_string();
        let version = params
            .get_non_empty("VERSION")
            .or_else(|| params.get_non_empty("WMTVER"))
            .map(str::to_owned);
        // a profile of a service is treated as the service
        let declared = params
            .get_non_empty("SERVICE")
            .or_else(|| params.get_non_empty("PROFILE"));
        let service = resolve_service(declared, &operation, None, uri)?;
        let bypass_filters = is_get_map(&operation) && params.contains("FILTERPROPERTY");

        Ok(Self {
            service,
            version,
            operation,
            payload: RequestPayload::Kvp(params),
            request_id: request_id.to_string(),
            bypass_filters,
        })
    }

    pub fn from_xml(
        root: XmlElement,
        uri: &str,
        request_id: &str,
    ) -> Result<Self, ExceptionDescriptor> {
        let operation = root.local_name().to_string();
        let version = root
            .attribute("version")
            .filter(|v| !v.trim().is_empty())
            .map(str::to_owned);
        let declared = root.attribute("service").filter(|s| !s.trim().is_empty());
        let service = resolve_service(declared, &operation, root.namespace(), uri)?;

        Ok(Self {
            service,
            version,
            operation,
            payload: RequestPayload::Xml(root),
            request_id: request_id.to_string(),
            bypass_filters: false,
        })
    }

    /// KVP value, or a root attribute (matched case-insensitively) for XML.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        match &self.payload {
            RequestPayload::Kvp(params) => params.get_non_empty(key),
            RequestPayload::Xml(root) => root
                .attributes
                .iter()
                .find(|a| a.name.namespace.is_none() && a.name.local.eq_ignore_ascii_case(key))
                .map(|a| a.value.as_str())
                .filter(|v| !v.is_empty()),
        }
    }

    pub fn document(&self) -> Option<&XmlElement> {
        match &self.payload {
            RequestPayload::Xml(root) => Some(root),
            RequestPayload::Kvp(_) => None,
        }
    }

    pub fn is_operation(&self, name: &str) -> bool {
        self.operation.eq_ignore_ascii_case(name)
    }

    pub fn version_is(&self, version: &str) -> bool {
        self.version.as_deref() == Some(version)
    }
}

fn is_get_map(operation: &str) -> bool {
    operation.eq_ignore_ascii_case("GetMap") || operation == "map"
}

/// Pick the dispatch key: declared name, inferred protocol, then URI guess.
pub fn resolve_service(
    declared: Option<&str>,
    operation: &str,
    document_namespace: Option<&str>,
    uri: &str,
) -> Result<String, ExceptionDescriptor> {
    if let Some(service) = declared.map(str::trim).filter(|s| !s.is_empty()) {
        return Ok(service.to_uppercase());
    }
    target_service(operation, document_namespace)
        .or_else(|| service_from_uri(uri))
        .map(str::to_owned)
        .ok_or_else(|| {
            ExceptionDescriptor::invalid_parameter(format!(
                "Unable to determine the target service of request '{}'.",
                operation
            ))
            .with_locator("service")
        })
}

/// Service implied by the operation name or the document namespace.
///
/// For XML requests the feature and catalogue services are recognized by
/// namespace only; for KVP requests by operation name.
pub fn target_service(operation: &str, document_namespace: Option<&str>) -> Option<&'static str> {
    let is_xml = document_namespace.is_some();
    let ns = document_namespace.unwrap_or_default();
    let op = operation;

    if matches!(
        op,
        "GetMap"
            | "map"
            | "GetFeatureInfo"
            | "feature_info"
            | "GetLegendGraphic"
            | "GetStyles"
            | "PutStyles"
            | "DescribeLayer"
    ) {
        return Some("WMS");
    }
    let wfs = if is_xml {
        ns == namespaces::WFS
    } else {
        matches!(
            op,
            "DescribeFeatureType"
                | "GetFeature"
                | "GetFeatureWithLock"
                | "GetGmlObject"
                | "Lock"
                | "Transaction"
        )
    };
    if wfs {
        return Some("WFS");
    }
    if matches!(op, "GetCoverage" | "DescribeCoverage") {
        return Some("WCS");
    }
    let csw = if is_xml {
        ns == namespaces::CSW || ns == namespaces::CSW_2_0_2
    } else {
        matches!(
            op,
            "GetRecords" | "DescribeRecord" | "GetRecordById" | "GetDomain" | "Harvest"
        )
    };
    if csw {
        return Some("CSW");
    }
    if matches!(op, "GetObservation" | "DescribeSensor" | "DescribePlatform") {
        return Some("SOS");
    }
    if op == "GetView" {
        return Some("WPVS");
    }
    if ns == namespaces::WMPS || matches!(op, "PrintMap" | "GetAvailableTemplates" | "DescribeTemplate") {
        return Some("WMPS");
    }
    if matches!(op, "DescribeProcess" | "Execute") {
        return Some("WPS");
    }
    if matches!(op, "GetSession" | "CloseSession" | "GetSAMLResponse" | "DescribeUser") {
        return Some("WAS");
    }
    if op == "DoService" {
        return Some("WSS");
    }
    if ns == namespaces::WCTS || ns == namespaces::DEEGREE_WCTS {
        return Some("WCTS");
    }
    None
}

/// Last-resort guess from the request path.
pub fn service_from_uri(uri: &str) -> Option<&'static str> {
    let uri = uri.to_lowercase();
    if uri.contains("csw") {
        Some("CSW")
    } else if uri.contains("wcts") {
        Some("WCTS")
    } else if uri.contains("wfs") {
        Some("WFS")
    } else {
        None
    }
}
