//! End-to-end tests over a real socket.

mod common;

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use common::StubBackends;
use ows_gateway::config::Protocol;
use ows_gateway::{GatewayConfig, HttpServer, Shutdown};

async fn start(config: GatewayConfig) -> (SocketAddr, Arc<Shutdown>, tokio::task::JoinHandle<()>) {
    let gateway = common::gateway(config, Arc::new(StubBackends::new()));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Arc::new(Shutdown::new());
    let server_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        HttpServer::new(gateway).run(listener, server_shutdown).await.unwrap();
    });
    (addr, shutdown, handle)
}

#[tokio::test]
async fn test_get_capabilities_over_http() {
    let (addr, shutdown, handle) = start(common::config(&[Protocol::Wms])).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{}/ows?SERVICE=WMS&VERSION=1.1.1&REQUEST=GetCapabilities", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/vnd.ogc.wms_xml");
    let request_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
    assert!(!request_id.is_empty());
    let body = response.text().await.unwrap();
    assert!(body.contains("EchoResponse"));

    // the server subscribes once its graceful-shutdown future first runs
    while shutdown.listeners() == 0 {
        tokio::task::yield_now().await;
    }
    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_client_request_id_is_echoed() {
    let (addr, shutdown, _handle) = start(common::config(&[Protocol::Wfs])).await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/wfs", addr))
        .header("content-type", "application/x-www-form-urlencoded")
        .header("x-request-id", "client-42")
        .body("SERVICE=WFS&VERSION=1.1.0&REQUEST=GetFeature&TYPENAME=roads")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], "client-42");
    assert!(response.text().await.unwrap().contains("operation=\"GetFeature\""));
    shutdown.trigger();
}

#[tokio::test]
async fn test_wsdl_is_served() {
    let mut wsdl = tempfile::NamedTempFile::new().unwrap();
    write!(wsdl, "<definitions xmlns=\"http://schemas.xmlsoap.org/wsdl/\"/>").unwrap();
    let mut config = common::config(&[Protocol::Wms]);
    config.soap.wsdl_location = Some(wsdl.path().to_string_lossy().into_owned());
    let (addr, shutdown, _handle) = start(config).await;

    let response = reqwest::get(format!("http://{}/ows?wsdl", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/xml");
    assert!(response.text().await.unwrap().starts_with("<definitions"));
    shutdown.trigger();
}

#[tokio::test]
async fn test_missing_wsdl_is_reported() {
    let (addr, shutdown, _handle) = start(common::config(&[Protocol::Wms])).await;

    let response = reqwest::get(format!("http://{}/ows?WSDL", addr)).await.unwrap();

    assert_eq!(response.headers()["content-type"], "application/xml");
    let body = response.text().await.unwrap();
    assert!(body.contains("No wsdl description document available."));
    shutdown.trigger();
}
