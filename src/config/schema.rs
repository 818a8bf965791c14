//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ows::namespaces;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    pub security: SecurityConfig,

    /// SOAP envelope handling.
    pub soap: SoapConfig,

    pub compression: CompressionConfig,

    /// Exception rendering options.
    pub exceptions: ExceptionsConfig,

    /// In-band registry reload.
    pub reload: ReloadConfig,

    pub xslt: XsltConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Registered services, one handler each.
    pub services: Vec<ServiceConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Total time allowed for one request, backend call included.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Largest request body accepted, in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SoapConfig {
    /// Header blocks that may carry `mustUnderstand`, as `{namespace}:localName`.
    pub understood_headers: Vec<String>,

    /// Reject every request that is not a SOAP 1.1 envelope.
    pub only_soap: bool,

    /// WSDL document answered for `?wsdl`.
    pub wsdl_location: Option<String>,

    /// Namespace of the element naming the code in envelope-stage reports.
    pub error_namespace: String,
}

impl Default for SoapConfig {
    fn default() -> Self {
        Self {
            understood_headers: Vec::new(),
            only_soap: false,
            wsdl_location: None,
            error_namespace: namespaces::OWS.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,

    /// Responses smaller than this are sent uncompressed.
    pub min_size: usize,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExceptionsConfig {
    /// Exception formats offered by the map service; the first is the fallback.
    pub wms_formats: Vec<String>,

    pub max_image_width: u32,

    pub max_image_height: u32,
}

impl Default for ExceptionsConfig {
    fn default() -> Self {
        Self {
            wms_formats: vec!["XML".to_string(), "INIMAGE".to_string(), "BLANK".to_string()],
            max_image_width: 4096,
            max_image_height: 4096,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ReloadConfig {
    pub enabled: bool,
    pub user: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct XsltConfig {
    /// XSLT 1.0 processor invoked as `<processor> <stylesheet> -`.
    pub processor: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "ows_gateway=info,tower_http=info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Protocol family of a registered service.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Wms,
    Wfs,
    Csw,
    Wcs,
    Wcts,
    Wps,
    Sos,
    Wpvs,
    Wmps,
    Was,
    Wss,
}

impl Protocol {
    /// Upper-case service name, also the default registry key.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Wms => "WMS",
            Self::Wfs => "WFS",
            Self::Csw => "CSW",
            Self::Wcs => "WCS",
            Self::Wcts => "WCTS",
            Self::Wps => "WPS",
            Self::Sos => "SOS",
            Self::Wpvs => "WPVS",
            Self::Wmps => "WMPS",
            Self::Was => "WAS",
            Self::Wss => "WSS",
        }
    }
}

/// One registered service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServiceConfig {
    /// Registry name; defaults to the protocol's service name.
    #[serde(default)]
    pub name: Option<String>,

    pub protocol: Protocol,

    /// Further names routed to the same handler.
    #[serde(default)]
    pub aliases: Vec<String>,

    /// Operation name to file served by the static backend.
    #[serde(default)]
    pub documents: BTreeMap<String, String>,

    #[serde(default)]
    pub default_version: Option<String>,

    /// Client-specific output formats of a feature service.
    #[serde(default)]
    pub virtual_formats: Vec<VirtualFormatConfig>,

    /// Feature info format to stylesheet location.
    #[serde(default)]
    pub feature_info_transforms: BTreeMap<String, String>,
}

impl ServiceConfig {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            name: None,
            protocol,
            aliases: Vec::new(),
            documents: BTreeMap::new(),
            default_version: None,
            virtual_formats: Vec::new(),
            feature_info_transforms: BTreeMap::new(),
        }
    }

    /// Primary registry key, upper-cased.
    pub fn registry_name(&self) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(self.protocol.service_name())
            .to_uppercase()
    }

    /// Primary key followed by the aliases, all upper-cased.
    pub fn registry_names(&self) -> Vec<String> {
        std::iter::once(self.registry_name())
            .chain(self.aliases.iter().map(|a| a.trim().to_uppercase()))
            .collect()
    }
}

/// An output format implemented by stylesheets around the native GML.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct VirtualFormatConfig {
    /// Value of `OUTPUTFORMAT` selecting this format.
    pub name: String,

    pub mime_type: String,

    /// Applied to the XML request before the backend sees it.
    #[serde(default)]
    pub in_filter: Option<String>,

    /// Applied to the feature collection the backend returns.
    #[serde(default)]
    pub out_filter: Option<String>,
}
