//! The request pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!   → ?wsdl                                   (served directly)
//!   → ReplayableBody::capture
//!   → form | multipart | XML | KVP            (transport envelope)
//!   → SOAP unwrap (mustUnderstand check)      → body.replace(payload)
//!   → NormalizedRequest                       (service / version / operation)
//!   → registry lookup → multipart reattach    → body.replace(document)
//!   → ServiceHandler::handle → ResponseCapture
//!   → SOAP rewrap → gzip → Response
//!
//! any failure → ExceptionEncoder::encode(origin, context) → ResponseCapture
//! ```
//!
//! # Design Decisions
//! - Every stage returns a [`Failure`] carrying the context known at that
//!   point; exactly one encoder call happens per failed request
//! - Settings and registry are loaded once per request; a reload swaps both
//!   for later requests only

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request};
use axum::response::Response;

use crate::config::GatewayConfig;
use crate::http::body::ReplayableBody;
use crate::http::capture::ResponseCapture;
use crate::http::compression::{accepts_gzip, gzip_capture};
use crate::http::params::ParameterMap;
use crate::http::request::RequestIdExt;
use crate::observability::metrics::{self, Outcome};
use crate::ows::encoder::{ExceptionContext, ExceptionEncoder};
use crate::ows::exception::{ExceptionCode, ExceptionDescriptor, FaultOrigin};
use crate::ows::multipart::{MultipartEnvelope, MultipartReattacher};
use crate::ows::request::{NormalizedRequest, RequestPayload};
use crate::ows::soap::SoapEnvelopeCodec;
use crate::services::{BackendProvider, RegistryError, ServiceRegistry, SharedRegistry, Transformations};
use crate::xml::XmlElement;

const SOAP_XML: &str = "application/soap+xml";
const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Everything derived from one configuration snapshot.
#[derive(Debug)]
pub struct GatewaySettings {
    pub config: GatewayConfig,
    pub encoder: ExceptionEncoder,
    pub codec: SoapEnvelopeCodec,
    /// Directory relative WSDL paths resolve against.
    pub base_dir: PathBuf,
}

impl GatewaySettings {
    pub fn new(config: GatewayConfig, base_dir: impl Into<PathBuf>) -> Self {
        let exceptions = &config.exceptions;
        let encoder = ExceptionEncoder::new(
            exceptions.wms_formats.as_slice(),
            (exceptions.max_image_width, exceptions.max_image_height),
            &config.soap.error_namespace,
        );
        let codec = SoapEnvelopeCodec::new(&config.soap.understood_headers);
        Self {
            config,
            encoder,
            codec,
            base_dir: base_dir.into(),
        }
    }

    fn wsdl_path(&self) -> Option<PathBuf> {
        let location = self.config.soap.wsdl_location.as_deref()?.trim();
        if location.is_empty() {
            return None;
        }
        let path = Path::new(location);
        Some(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        })
    }
}

/// A failed stage: the error plus what was known when it happened.
#[derive(Debug)]
struct Failure {
    error: ExceptionDescriptor,
    origin: FaultOrigin,
    context: ExceptionContext,
}

impl Failure {
    fn new(error: ExceptionDescriptor, origin: FaultOrigin, context: &ExceptionContext) -> Self {
        Self {
            error,
            origin,
            context: context.clone(),
        }
    }
}

/// The transport envelope after parsing.
enum Incoming {
    Kvp(ParameterMap),
    Xml(XmlElement),
    Multipart(MultipartEnvelope),
}

pub struct GatewayController {
    settings: ArcSwap<GatewaySettings>,
    registry: SharedRegistry,
    backends: Arc<dyn BackendProvider>,
    transformations: Arc<Transformations>,
}

impl GatewayController {
    /// Build the registry for `settings` and wrap both for request handling.
    pub fn new(
        settings: GatewaySettings,
        backends: Arc<dyn BackendProvider>,
        transformations: Arc<Transformations>,
    ) -> Result<Self, RegistryError> {
        let registry = ServiceRegistry::from_config(&settings.config, backends.as_ref(), transformations.clone())?;
        Ok(Self {
            settings: ArcSwap::from_pointee(settings),
            registry: registry.into_shared(),
            backends,
            transformations,
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn settings(&self) -> Arc<GatewaySettings> {
        self.settings.load_full()
    }

    /// Rebuild the registry from the current configuration.
    pub fn reload(&self) -> Result<usize, RegistryError> {
        let settings = self.settings.load();
        let result = ServiceRegistry::from_config(&settings.config, self.backends.as_ref(), self.transformations.clone());
        metrics::record_reload(result.is_ok());
        let registry = result?;
        let count = registry.len();
        self.registry.store(Arc::new(registry));
        tracing::info!(services = count, "Service registry reloaded");
        Ok(count)
    }

    /// Install a new configuration. The old settings and registry stay in
    /// place when the new services cannot be registered.
    pub fn reconfigure(&self, config: GatewayConfig) -> Result<(), RegistryError> {
        let current = self.settings.load_full();
        let result = ServiceRegistry::from_config(&config, self.backends.as_ref(), self.transformations.clone());
        metrics::record_reload(result.is_ok());
        let registry = result?;

        if config.listener != current.config.listener || config.timeouts != current.config.timeouts {
            tracing::warn!("Listener and timeout changes take effect after a restart");
        }
        self.settings
            .store(Arc::new(GatewaySettings::new(config, current.base_dir.clone())));
        self.registry.store(Arc::new(registry));
        tracing::info!(services = ?self.registry.load().names(), "Configuration applied");
        Ok(())
    }

    /// Run one request through the pipeline. Never fails: every error is
    /// encoded into the response.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let settings = self.settings.load_full();
        let registry = self.registry.load_full();
        let request_id = request.request_id().to_string();
        let gzip = settings.config.compression.enabled && accepts_gzip(request.headers());

        let mut capture = ResponseCapture::new();
        let (service, outcome) = match self
            .process(&settings, &registry, request, &request_id, &mut capture)
            .await
        {
            Ok(service) => (service, Outcome::Success),
            Err(failure) => {
                tracing::debug!(
                    request_id = %request_id,
                    origin = failure.origin.as_str(),
                    code = %failure.error.code,
                    "Request failed"
                );
                settings
                    .encoder
                    .encode(&failure.error, failure.origin, &failure.context, &mut capture);
                (failure.context.service.unwrap_or_default(), Outcome::Exception)
            }
        };

        if gzip {
            if let Err(e) = gzip_capture(&mut capture, settings.config.compression.min_size) {
                tracing::warn!(request_id = %request_id, error = %e, "gzip encoding failed, sending uncompressed");
            }
        }
        metrics::record_request(&service, outcome, start);
        capture.into_response()
    }

    async fn process(
        &self,
        settings: &GatewaySettings,
        registry: &ServiceRegistry,
        request: Request<Body>,
        request_id: &str,
        capture: &mut ResponseCapture,
    ) -> Result<String, Failure> {
        let (parts, body) = request.into_parts();
        let uri = parts.uri.path().to_string();
        let query = ParameterMap::from_query(parts.uri.query().unwrap_or_default());
        let content_type = content_type(&parts.headers);
        let envelope_ctx = ExceptionContext::envelope(&uri);

        if parts.method == Method::GET && query.contains("WSDL") {
            self.serve_wsdl(settings, &query, capture)
                .await
                .map_err(|e| Failure::new(e, FaultOrigin::Envelope, &envelope_ctx))?;
            return Ok("WSDL".to_string());
        }

        let mut body = ReplayableBody::capture(body, settings.config.security.max_body_size)
            .await
            .map_err(|e| Failure::new(e.into(), FaultOrigin::Envelope, &envelope_ctx))?;

        // SOAP is detected from the document, so the fault content type is
        // only known once the envelope has been parsed
        let mut soap: Option<String> = None;
        let incoming = if parts.method == Method::POST {
            if body.is_blank() {
                return Err(Failure::new(
                    ExceptionDescriptor::invalid_parameter("No request characters found"),
                    FaultOrigin::Envelope,
                    &envelope_ctx,
                ));
            }
            if content_type.contains(FORM_URLENCODED) {
                Incoming::Kvp(query.merge(&ParameterMap::from_form(body.bytes())))
            } else if MultipartReattacher::is_multipart(&content_type) {
                let mut envelope = MultipartReattacher::parse(&content_type, body.bytes().clone())
                    .await
                    .map_err(|e| Failure::new(e, FaultOrigin::Envelope, &envelope_ctx))?;
                if SoapEnvelopeCodec::is_envelope(envelope.root()) {
                    let response_type = soap_content_type(&content_type);
                    let soap_ctx = envelope_ctx.clone().with_soap(response_type);
                    let unwrapped = settings
                        .codec
                        .unwrap(envelope.root().clone())
                        .map_err(|e| Failure::new(e, FaultOrigin::Envelope, &soap_ctx))?;
                    envelope.replace_root(unwrapped.body);
                    soap = Some(response_type.to_string());
                }
                Incoming::Multipart(envelope)
            } else {
                let root = read_document(&body).map_err(|e| Failure::new(e, FaultOrigin::Envelope, &envelope_ctx))?;
                if SoapEnvelopeCodec::is_envelope(&root) {
                    let response_type = soap_content_type(&content_type);
                    let soap_ctx = envelope_ctx.clone().with_soap(response_type);
                    let unwrapped = settings
                        .codec
                        .unwrap(root)
                        .map_err(|e| Failure::new(e, FaultOrigin::Envelope, &soap_ctx))?;
                    tracing::debug!(
                        request_id,
                        headers = unwrapped.headers.len(),
                        payload = %unwrapped.body.name,
                        "Unwrapped SOAP envelope"
                    );
                    body.replace(unwrapped.body.to_xml_bytes());
                    soap = Some(response_type.to_string());
                    Incoming::Xml(read_document(&body).map_err(|e| Failure::new(e, FaultOrigin::Envelope, &soap_ctx))?)
                } else {
                    Incoming::Xml(root)
                }
            }
        } else {
            Incoming::Kvp(query)
        };

        if settings.config.soap.only_soap && soap.is_none() {
            return Err(Failure::new(
                ExceptionDescriptor::invalid_format("This service only accepts SOAP 1.1 encoded requests."),
                FaultOrigin::Envelope,
                &envelope_ctx,
            ));
        }
        let with_soap = |ctx: ExceptionContext| match &soap {
            Some(ct) => ctx.with_soap(ct.clone()),
            None => ctx,
        };

        let (request, pending) = match incoming {
            Incoming::Kvp(params) => {
                let ctx = with_soap(ExceptionContext::from_parameters(&params, &uri));
                if settings.config.reload.enabled && params.contains("RELOAD") {
                    self.reload_request(settings, &params, capture)
                        .map_err(|e| Failure::new(e, FaultOrigin::Dispatch, &ctx))?;
                    return Ok("RELOAD".to_string());
                }
                let request = NormalizedRequest::from_kvp(params, &uri, request_id)
                    .map_err(|e| Failure::new(e, FaultOrigin::Dispatch, &ctx))?;
                (request, None)
            }
            Incoming::Xml(root) => {
                let request = NormalizedRequest::from_xml(root, &uri, request_id)
                    .map_err(|e| Failure::new(e, FaultOrigin::Dispatch, &with_soap(envelope_ctx.clone())))?;
                (request, None)
            }
            Incoming::Multipart(envelope) => {
                let request = NormalizedRequest::from_xml(envelope.root().clone(), &uri, request_id)
                    .map_err(|e| Failure::new(e, FaultOrigin::Dispatch, &with_soap(envelope_ctx.clone())))?;
                (request, Some(envelope))
            }
        };
        let mut request = request;
        if request.version.is_none() {
            request.version = registry.default_version(&request.service).map(str::to_owned);
        }

        let ctx = with_soap(ExceptionContext::from_request(&request, &uri));
        let handler = registry.lookup(&request.service).ok_or_else(|| {
            tracing::info!(request_id, service = %request.service, "No such service");
            Failure::new(
                ExceptionDescriptor::invalid_parameter(format!(
                    "No service named '{}' is registered.",
                    request.service
                ))
                .with_locator("service"),
                FaultOrigin::Dispatch,
                &ctx,
            )
        })?;
        let ctx = ctx.with_protocol(handler.name());

        if let Some(envelope) = pending {
            let parts = envelope.attachments().len();
            let document = envelope
                .reattach(|root, name| handler.attachment_anchors(root, name))
                .map_err(|e| Failure::new(e, FaultOrigin::Dispatch, &ctx))?;
            body.replace(document.to_xml_bytes());
            let document = read_document(&body).map_err(|e| Failure::new(e, FaultOrigin::Dispatch, &ctx))?;
            tracing::debug!(request_id, attachments = parts, "Reattached multipart request");
            request.payload = RequestPayload::Xml(document);
        }

        tracing::info!(
            request_id,
            service = %request.service,
            operation = %request.operation,
            version = request.version.as_deref().unwrap_or("-"),
            soap = soap.is_some(),
            "Dispatching request"
        );
        handler
            .handle(&request, capture)
            .await
            .map_err(|e| Failure::new(e, FaultOrigin::Backend, &ctx))?;

        if let Some(response_type) = &soap {
            settings
                .codec
                .wrap_response(capture, response_type)
                .map_err(|e| Failure::new(e, FaultOrigin::Backend, &ctx))?;
        }
        Ok(request.service)
    }

    async fn serve_wsdl(
        &self,
        settings: &GatewaySettings,
        query: &ParameterMap,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        if query.len() > 1 {
            return Err(ExceptionDescriptor::invalid_parameter(
                "If the wsdl keyword is supplied, no other parameters are allowed.",
            ));
        }
        let unavailable = || ExceptionDescriptor::internal("No wsdl description document available.");
        let path = settings.wsdl_path().ok_or_else(unavailable)?;
        let document = tokio::fs::read(&path).await.map_err(|e| {
            tracing::error!(path = ?path, error = %e, "Unable to read WSDL document");
            unavailable()
        })?;
        capture.write_document("application/xml", document);
        Ok(())
    }

    fn reload_request(
        &self,
        settings: &GatewaySettings,
        params: &ParameterMap,
        capture: &mut ResponseCapture,
    ) -> Result<(), ExceptionDescriptor> {
        let reload = &settings.config.reload;
        let authorized = reload.user.as_deref().is_some_and(|u| params.get("USER") == Some(u))
            && reload.password.as_deref().is_some_and(|p| params.get("PASSWORD") == Some(p));
        if !authorized {
            tracing::warn!(user = ?params.get("USER"), "Rejected registry reload");
            return Err(ExceptionDescriptor::invalid_parameter(
                "You are not allowed to reload the services.",
            ));
        }
        let count = self.reload().map_err(|e| {
            ExceptionDescriptor::new(ExceptionCode::NoApplicableCode, format!("Reload failed: {}", e))
        })?;
        capture.write_document("text/plain", format!("Reloaded {} services.", count));
        Ok(())
    }
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// SOAP answers mirror a SOAP 1.2 style request type, else `text/xml`.
fn soap_content_type(request_content_type: &str) -> &'static str {
    if request_content_type.contains(SOAP_XML) {
        SOAP_XML
    } else {
        "text/xml"
    }
}

/// Parse the current body content through a fresh reader.
fn read_document(body: &ReplayableBody) -> Result<XmlElement, ExceptionDescriptor> {
    let mut buffer = Vec::with_capacity(body.len());
    body.as_reader().read_to_end(&mut buffer).map_err(|e| {
        ExceptionDescriptor::new(ExceptionCode::NoApplicableCode, format!("Unable to read request: {}", e))
    })?;
    Ok(XmlElement::parse(&buffer)?)
}
