//! Shared utilities for gateway integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use tower::ServiceExt;

use ows_gateway::config::{GatewayConfig, Protocol, ServiceConfig};
use ows_gateway::gateway::{GatewayController, GatewaySettings};
use ows_gateway::http::HttpServer;
use ows_gateway::ows::{ExceptionDescriptor, NormalizedRequest};
use ows_gateway::services::{
    BackendProvider, BackendResult, OwsService, ProcessXsltTransformer, StylesheetCache, Transformations,
};
use ows_gateway::xml::XmlElement;

/// What a stub backend answers with.
#[derive(Clone)]
pub enum Behavior {
    /// `<EchoResponse service=.. operation=.. token=..>`; capabilities for
    /// GetCapabilities, a PNG for GetMap.
    Echo,
    Fail(ExceptionDescriptor),
    Respond(BackendResult),
}

/// Backend that counts calls and remembers every request it saw.
pub struct StubService {
    pub name: String,
    behavior: Behavior,
    calls: AtomicUsize,
    seen: Mutex<Vec<NormalizedRequest>>,
}

impl StubService {
    pub fn new(name: &str, behavior: Behavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<NormalizedRequest> {
        self.seen.lock().unwrap().clone()
    }
}

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";

#[async_trait]
impl OwsService for StubService {
    async fn handle(&self, request: &NormalizedRequest) -> Result<BackendResult, ExceptionDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(request.clone());
        match &self.behavior {
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Respond(result) => Ok(result.clone()),
            Behavior::Echo if request.is_operation("GetMap") => Ok(BackendResult::Image {
                mime: "image/png".into(),
                bytes: Bytes::from_static(PNG),
            }),
            Behavior::Echo => {
                let echo = XmlElement::parse(b"<EchoResponse/>")
                    .unwrap()
                    .with_attribute("service", self.name.clone())
                    .with_attribute("operation", request.operation.clone())
                    .with_attribute("token", request.parameter("TOKEN").unwrap_or_default());
                if request.is_operation("GetCapabilities") {
                    Ok(BackendResult::Capabilities(echo))
                } else {
                    Ok(BackendResult::Document(echo))
                }
            }
        }
    }
}

/// Hands out one stub per registry name; unknown names get an echo stub.
#[derive(Default)]
pub struct StubBackends {
    behaviors: HashMap<String, Behavior>,
    created: Mutex<HashMap<String, Arc<StubService>>>,
}

impl StubBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(name.to_uppercase(), behavior);
        self
    }

    /// The stub created for `name` (upper-cased registry name).
    pub fn stub(&self, name: &str) -> Arc<StubService> {
        self.created
            .lock()
            .unwrap()
            .get(&name.to_uppercase())
            .cloned()
            .unwrap_or_else(|| panic!("no backend created for {}", name))
    }
}

impl BackendProvider for StubBackends {
    fn backend(&self, service: &ServiceConfig) -> Arc<dyn OwsService> {
        let name = service.registry_name();
        let behavior = self.behaviors.get(&name).cloned().unwrap_or(Behavior::Echo);
        let stub = Arc::new(StubService::new(&name, behavior));
        self.created.lock().unwrap().insert(name, stub.clone());
        stub
    }
}

/// Default config with one service per protocol.
pub fn config(protocols: &[Protocol]) -> GatewayConfig {
    GatewayConfig {
        services: protocols.iter().map(|p| ServiceConfig::new(*p)).collect(),
        ..GatewayConfig::default()
    }
}

pub fn gateway(config: GatewayConfig, backends: Arc<StubBackends>) -> Arc<GatewayController> {
    let transformations = Arc::new(Transformations::new(
        StylesheetCache::new("/"),
        Arc::new(ProcessXsltTransformer::new(None)),
    ));
    Arc::new(GatewayController::new(GatewaySettings::new(config, "/"), backends, transformations).unwrap())
}

pub fn router(config: GatewayConfig, backends: Arc<StubBackends>) -> Router {
    HttpServer::build_router(gateway(config, backends))
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    pub fn document(&self) -> XmlElement {
        XmlElement::parse(&self.body).unwrap_or_else(|e| {
            panic!("response is not XML ({}): {}", e, String::from_utf8_lossy(&self.body))
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse { status, headers, body }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", content_type)
        .body(body.into())
        .unwrap()
}
