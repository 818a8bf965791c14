//! Buffered outbound response.
//!
//! # Responsibilities
//! - Collect status, headers, content type and body bytes written by a handler
//! - Let later stages inspect, rewrap or discard what was written
//! - Produce the final network response exactly once
//!
//! # Design Decisions
//! - Nothing reaches the network until `into_response`, so a late failure can
//!   still replace a half-written success body
//! - `Content-Length` is always derived from the final bytes

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};

#[derive(Debug)]
pub struct ResponseCapture {
    status: StatusCode,
    headers: HeaderMap,
    content_type: Option<String>,
    body: BytesMut,
}

impl Default for ResponseCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCapture {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            content_type: None,
            body: BytesMut::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Content type and body in one call.
    pub fn write_document(&mut self, content_type: impl Into<String>, bytes: impl AsRef<[u8]>) {
        self.set_content_type(content_type);
        self.write(bytes.as_ref());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn replace_body(&mut self, bytes: impl AsRef<[u8]>) {
        self.body.clear();
        self.body.extend_from_slice(bytes.as_ref());
    }

    /// Discard everything written so far.
    pub fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.content_type = None;
        self.body.clear();
    }

    pub fn into_response(self) -> Response {
        let body: Bytes = self.body.freeze();
        let length = body.len();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.extend(self.headers);
        if let Some(content_type) = self.content_type {
            match HeaderValue::from_str(&content_type) {
                Ok(value) => {
                    headers.insert(header::CONTENT_TYPE, value);
                }
                Err(_) => {
                    tracing::warn!(content_type = %content_type, "Dropping invalid content type");
                }
            }
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        response
    }
}
