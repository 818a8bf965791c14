//! SOAP 1.1 envelope handling through the full router.

mod common;

use std::sync::Arc;

use common::{Behavior, StubBackends};
use ows_gateway::config::Protocol;
use ows_gateway::ows::{ExceptionDescriptor, RequestPayload};
use ows_gateway::xml::XmlElement;

const SOAP_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const PAYLOAD: &str = r#"<wms:GetCapabilities xmlns:wms="http://www.opengis.net/wms" service="WMS" version="1.3.0"/>"#;

fn envelope(header: &str, payload: &str) -> String {
    format!(
        r#"<soapenv:Envelope xmlns:soapenv="{SOAP_NS}">{header}<soapenv:Body>{payload}</soapenv:Body></soapenv:Envelope>"#
    )
}

fn security_header(must_understand: &str) -> String {
    format!(
        r#"<soapenv:Header><sec:Security xmlns:sec="urn:test:security" soapenv:mustUnderstand="{must_understand}"><sec:Token>abc</sec:Token></sec:Security></soapenv:Header>"#
    )
}

fn fault_code(document: &XmlElement) -> String {
    let body = document.child(SOAP_NS, "Body").expect("soap body");
    let fault = body.child(SOAP_NS, "Fault").expect("soap fault");
    fault.child(SOAP_NS, "faultcode").expect("faultcode").text()
}

#[tokio::test]
async fn test_soap_request_is_unwrapped_and_response_rewrapped() {
    let backends = Arc::new(StubBackends::new());
    let router = common::router(common::config(&[Protocol::Wms]), backends.clone());

    let response = common::send(&router, common::post("/ows", "text/xml", envelope("", PAYLOAD))).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), "text/xml");
    let document = response.document();
    assert!(document.name.is(SOAP_NS, "Envelope"));
    let answer = document
        .child(SOAP_NS, "Body")
        .and_then(|body| body.first_child_element())
        .expect("wrapped payload");
    assert_eq!(answer.local_name(), "EchoResponse");
    assert_eq!(answer.attribute("operation"), Some("GetCapabilities"));

    // the service saw exactly the Body content
    let seen = backends.stub("WMS").seen();
    assert_eq!(seen.len(), 1);
    let expected = XmlElement::parse(PAYLOAD.as_bytes()).unwrap();
    assert_eq!(seen[0].payload, RequestPayload::Xml(expected));
    assert_eq!(seen[0].version.as_deref(), Some("1.3.0"));
}

#[tokio::test]
async fn test_soap_xml_content_type_is_mirrored() {
    let backends = Arc::new(StubBackends::new());
    let router = common::router(common::config(&[Protocol::Wms]), backends);

    let response = common::send(
        &router,
        common::post("/ows", "application/soap+xml; charset=utf-8", envelope("", PAYLOAD)),
    )
    .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), "application/soap+xml");
    assert!(response.document().name.is(SOAP_NS, "Envelope"));
}

#[tokio::test]
async fn test_unknown_mandatory_header_is_rejected() {
    let backends = Arc::new(StubBackends::new());
    let router = common::router(common::config(&[Protocol::Wms]), backends.clone());

    let response = common::send(
        &router,
        common::post("/ows", "text/xml", envelope(&security_header("1"), PAYLOAD)),
    )
    .await;

    assert_eq!(response.status, 500);
    assert_eq!(response.content_type(), "text/xml");
    assert_eq!(fault_code(&response.document()), "MustUnderstand");
    assert_eq!(backends.stub("WMS").calls(), 0);
}

#[tokio::test]
async fn test_optional_and_allow_listed_headers_pass() {
    let backends = Arc::new(StubBackends::new());
    let router = common::router(common::config(&[Protocol::Wms]), backends.clone());
    let response = common::send(
        &router,
        common::post("/ows", "text/xml", envelope(&security_header("0"), PAYLOAD)),
    )
    .await;
    assert_eq!(response.status, 200);

    let backends = Arc::new(StubBackends::new());
    let mut config = common::config(&[Protocol::Wms]);
    config.soap.understood_headers = vec!["{urn:test:security}:Security".to_string()];
    let router = common::router(config, backends.clone());
    let response = common::send(
        &router,
        common::post("/ows", "text/xml", envelope(&security_header("true"), PAYLOAD)),
    )
    .await;
    assert_eq!(response.status, 200);
    assert_eq!(backends.stub("WMS").calls(), 1);
}

#[tokio::test]
async fn test_backend_failure_becomes_server_fault() {
    let failure = ExceptionDescriptor::invalid_parameter("Layer 'roads' is unknown.").with_locator("layers");
    let backends = Arc::new(StubBackends::new().with("WMS", Behavior::Fail(failure)));
    let router = common::router(common::config(&[Protocol::Wms]), backends);

    let response = common::send(&router, common::post("/ows", "text/xml", envelope("", PAYLOAD))).await;

    assert_eq!(response.status, 500);
    let document = response.document();
    assert_eq!(fault_code(&document), "Server.InvalidParameterValue");
    let fault = document
        .child(SOAP_NS, "Body")
        .and_then(|body| body.child(SOAP_NS, "Fault"))
        .unwrap();
    assert_eq!(fault.child(SOAP_NS, "faultstring").unwrap().text(), "Layer 'roads' is unknown.");
}

#[tokio::test]
async fn test_empty_soap_body_is_a_fault() {
    let backends = Arc::new(StubBackends::new());
    let router = common::router(common::config(&[Protocol::Wms]), backends.clone());

    let response = common::send(&router, common::post("/ows", "text/xml", envelope("", ""))).await;

    // envelope-stage failures keep status 200 unless the code is a SOAP class
    assert_eq!(response.status, 200);
    assert_eq!(fault_code(&response.document()), "Server.InvalidFormat");
    assert_eq!(backends.stub("WMS").calls(), 0);
}

#[tokio::test]
async fn test_only_soap_rejects_plain_requests() {
    let backends = Arc::new(StubBackends::new());
    let mut config = common::config(&[Protocol::Wms]);
    config.soap.only_soap = true;
    let router = common::router(config, backends.clone());

    let response = common::send(&router, common::post("/ows", "text/xml", PAYLOAD)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), "application/xml");
    let report = response.document();
    assert_eq!(report.local_name(), "ExceptionReport");
    assert_eq!(report.first_child_element().unwrap().local_name(), "InvalidFormat");
    assert_eq!(backends.stub("WMS").calls(), 0);
}
