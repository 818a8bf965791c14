//! gzip negotiation for captured responses.

use std::io::{self, Write};

use axum::http::{header, HeaderMap, HeaderValue};
use flate2::{write::GzEncoder, Compression};

use crate::http::capture::ResponseCapture;

/// Whether the client's `Accept-Encoding` admits gzip.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|entry| {
            let mut parts = entry.split(';');
            let coding = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            if coding != "gzip" && coding != "x-gzip" && coding != "*" {
                return false;
            }
            // q=0 means "not acceptable"
            !parts.any(|param| {
                let param = param.trim();
                param
                    .strip_prefix("q=")
                    .and_then(|q| q.trim().parse::<f32>().ok())
                    .is_some_and(|q| q == 0.0)
            })
        })
}

/// Compress the captured body in place when worthwhile.
///
/// Returns `true` when the body was replaced by its gzip encoding.
pub fn gzip_capture(capture: &mut ResponseCapture, min_size: usize) -> io::Result<bool> {
    if capture.is_empty()
        || capture.body().len() < min_size
        || capture.headers().contains_key(header::CONTENT_ENCODING)
    {
        return Ok(false);
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(capture.body().len() / 2), Compression::default());
    encoder.write_all(capture.body())?;
    let compressed = encoder.finish()?;

    capture.replace_body(compressed);
    capture.insert_header(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    capture.insert_header(header::VARY, HeaderValue::from_static("Accept-Encoding"));
    Ok(true)
}
