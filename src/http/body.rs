//! Request body that can be read any number of times.
//!
//! # Data Flow
//! ```text
//! hyper body stream ──capture()──▶ ReplayableBody (owned Bytes)
//!                                     │  as_reader() ─▶ stage 1 (multipart / SOAP parse)
//!                                     │  replace()   ◀─ normalized request document
//!                                     │  as_reader() ─▶ stage 2 (dispatch parse)
//! ```
//!
//! # Design Decisions
//! - The whole body is held in memory; these are request documents, not bulk uploads
//! - Every reader is an independent view over a reference-counted buffer

use axum::body::Body;
use bytes::{buf::Reader, Buf, Bytes, BytesMut};
use futures_util::StreamExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds the configured limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("failed to read request body: {0}")]
    Read(#[from] axum::Error),
}

#[derive(Debug, Clone, Default)]
pub struct ReplayableBody {
    bytes: Bytes,
    replaced: bool,
}

impl ReplayableBody {
    /// Drain `body` into memory, failing once more than `limit` bytes arrive.
    pub async fn capture(body: Body, limit: usize) -> Result<Self, BodyError> {
        let mut stream = body.into_data_stream();
        let mut buffer = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if buffer.len() + chunk.len() > limit {
                return Err(BodyError::TooLarge { limit });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(Self::from_bytes(buffer.freeze()))
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            replaced: false,
        }
    }

    /// Install a synthetic body; later readers see only the new content.
    pub fn replace(&mut self, bytes: impl Into<Bytes>) {
        self.bytes = bytes.into();
        self.replaced = true;
    }

    /// A fresh reader positioned at the start of the current content.
    pub fn as_reader(&self) -> Reader<Bytes> {
        self.bytes.clone().reader()
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True when the body holds no non-whitespace characters.
    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(u8::is_ascii_whitespace)
    }

    /// Whether `replace` has been called.
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_all(body: &ReplayableBody) -> String {
        let mut out = String::new();
        body.as_reader().read_to_string(&mut out).unwrap();
        out
    }

    #[tokio::test]
    async fn test_every_reader_starts_at_the_beginning() {
        let body = ReplayableBody::capture(Body::from("<GetCapabilities/>"), 1024)
            .await
            .unwrap();
        let mut first = body.as_reader();
        let mut prefix = [0u8; 4];
        first.read_exact(&mut prefix).unwrap();
        assert_eq!(&prefix, b"<Get");
        assert_eq!(read_all(&body), "<GetCapabilities/>");
        assert_eq!(read_all(&body), "<GetCapabilities/>");
    }

    #[tokio::test]
    async fn test_replace_is_visible_to_later_readers() {
        let mut body = ReplayableBody::capture(Body::from("<soap:Envelope/>"), 1024)
            .await
            .unwrap();
        let before = body.as_reader();
        body.replace("<GetFeature/>");
        assert!(body.is_replaced());
        assert_eq!(read_all(&body), "<GetFeature/>");
        assert_eq!(before.into_inner(), Bytes::from_static(b"<soap:Envelope/>"));
    }

    #[tokio::test]
    async fn test_limit_is_enforced() {
        let result = ReplayableBody::capture(Body::from(vec![b'x'; 64]), 16).await;
        assert!(matches!(result, Err(BodyError::TooLarge { limit: 16 })));
    }

    #[test]
    fn test_blank_detection() {
        assert!(ReplayableBody::from_bytes(" \r\n").is_blank());
        assert!(!ReplayableBody::from_bytes("<a/>").is_blank());
    }
}
