//! XSLT post-processing for client-specific output formats.
//!
//! # Responsibilities
//! - Load stylesheets once per location and share them across requests
//! - Run a transformation through a pluggable [`XsltTransformer`]
//!
//! # Design Decisions
//! - The cache is a `DashMap` keyed by location. Two requests racing on an
//!   empty slot both load the same stylesheet; the second insert overwrites
//!   the first with identical content
//! - The bundled transformer pipes through an external XSLT 1.0 processor
//!   (`<processor> <stylesheet> -`), so the gateway itself links no XSLT engine

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::ows::exception::{ExceptionCode, ExceptionDescriptor};
use crate::xml::{XmlElement, XmlError};

const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

#[derive(Debug, Error)]
pub enum XsltError {
    #[error("no XSLT processor configured")]
    NoProcessor,

    #[error("unable to read stylesheet '{location}': {source}")]
    Load {
        location: String,
        source: std::io::Error,
    },

    #[error("'{location}' is not an XSLT stylesheet: {reason}")]
    Invalid { location: String, reason: String },

    #[error("XSLT processor failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("XSLT processor exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
}

impl From<XsltError> for ExceptionDescriptor {
    fn from(error: XsltError) -> Self {
        ExceptionDescriptor::new(
            ExceptionCode::NoApplicableCode,
            format!("Transformation of the response failed: {}", error),
        )
    }
}

/// A validated stylesheet on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    pub location: String,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct StylesheetCache {
    base_dir: PathBuf,
    entries: DashMap<String, Arc<Stylesheet>>,
}

impl StylesheetCache {
    /// Relative locations resolve against `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn get_or_load(&self, location: &str) -> Result<Arc<Stylesheet>, XsltError> {
        if let Some(entry) = self.entries.get(location) {
            return Ok(entry.clone());
        }

        let path = if Path::new(location).is_absolute() {
            PathBuf::from(location)
        } else {
            self.base_dir.join(location)
        };
        let content = tokio::fs::read(&path).await.map_err(|source| XsltError::Load {
            location: location.to_string(),
            source,
        })?;
        let root = XmlElement::parse(&content).map_err(|e: XmlError| XsltError::Invalid {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        let is_stylesheet = root.name.is(XSLT_NAMESPACE, "stylesheet") || root.name.is(XSLT_NAMESPACE, "transform");
        if !is_stylesheet {
            return Err(XsltError::Invalid {
                location: location.to_string(),
                reason: format!("root element is '{}'", root.name),
            });
        }

        tracing::debug!(location, path = ?path, "Loaded stylesheet");
        let stylesheet = Arc::new(Stylesheet {
            location: location.to_string(),
            path,
        });
        self.entries.insert(location.to_string(), stylesheet.clone());
        Ok(stylesheet)
    }
}

#[async_trait]
pub trait XsltTransformer: Send + Sync {
    async fn transform(&self, stylesheet: &Stylesheet, input: &[u8]) -> Result<Vec<u8>, XsltError>;
}

/// Runs `<program> <stylesheet> -` with the document on stdin.
#[derive(Debug, Clone)]
pub struct ProcessXsltTransformer {
    program: Option<String>,
}

impl ProcessXsltTransformer {
    pub fn new(program: Option<String>) -> Self {
        Self {
            program: program.filter(|p| !p.trim().is_empty()),
        }
    }
}

#[async_trait]
impl XsltTransformer for ProcessXsltTransformer {
    async fn transform(&self, stylesheet: &Stylesheet, input: &[u8]) -> Result<Vec<u8>, XsltError> {
        let program = self.program.as_deref().ok_or(XsltError::NoProcessor)?;
        let mut child = Command::new(program)
            .arg(&stylesheet.path)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut stdin = child.stdin.take().ok_or_else(|| {
            XsltError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "processor stdin unavailable"))
        })?;
        let write = async move {
            stdin.write_all(input).await?;
            stdin.shutdown().await
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            return Err(XsltError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        Ok(output.stdout)
    }
}

/// Stylesheet cache plus the transformer that applies them.
pub struct Transformations {
    cache: StylesheetCache,
    transformer: Arc<dyn XsltTransformer>,
}

impl Transformations {
    pub fn new(cache: StylesheetCache, transformer: Arc<dyn XsltTransformer>) -> Self {
        Self { cache, transformer }
    }

    pub fn cache(&self) -> &StylesheetCache {
        &self.cache
    }

    /// Transform raw bytes.
    pub async fn apply_bytes(&self, location: &str, input: &[u8]) -> Result<Vec<u8>, XsltError> {
        let stylesheet = self.cache.get_or_load(location).await?;
        self.transformer.transform(&stylesheet, input).await
    }

    /// Transform a document into another document.
    pub async fn apply(&self, location: &str, input: &XmlElement) -> Result<XmlElement, ExceptionDescriptor> {
        let output = self.apply_bytes(location, &input.to_xml_bytes()).await?;
        XmlElement::parse(&output).map_err(|e| {
            ExceptionDescriptor::new(
                ExceptionCode::NoApplicableCode,
                format!("Stylesheet '{}' did not produce an XML document: {}", location, e),
            )
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Wraps the input document in `<Transformed>`.
    pub(crate) struct WrappingTransformer;

    #[async_trait]
    impl XsltTransformer for WrappingTransformer {
        async fn transform(&self, _stylesheet: &Stylesheet, input: &[u8]) -> Result<Vec<u8>, XsltError> {
            let root = XmlElement::parse(input).map_err(|e| XsltError::Failed {
                status: "1".into(),
                stderr: e.to_string(),
            })?;
            Ok(XmlElement::new(crate::xml::QName::local("Transformed"))
                .with_child(root)
                .to_xml_bytes())
        }
    }

    pub(crate) fn stylesheet_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="{}"/>"#,
            XSLT_NAMESPACE
        )
        .unwrap();
        file
    }

    #[tokio::test]
    async fn test_cache_loads_once() {
        let file = stylesheet_file();
        let location = file.path().to_string_lossy().to_string();
        let cache = StylesheetCache::new("/");
        let first = cache.get_or_load(&location).await.unwrap();
        let second = cache.get_or_load(&location).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_stylesheet() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<html/>").unwrap();
        let cache = StylesheetCache::new("/");
        let error = cache
            .get_or_load(&file.path().to_string_lossy())
            .await
            .unwrap_err();
        assert!(matches!(error, XsltError::Invalid { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_missing_processor() {
        let file = stylesheet_file();
        let transformations = Transformations::new(
            StylesheetCache::new("/"),
            Arc::new(ProcessXsltTransformer::new(None)),
        );
        let error = transformations
            .apply_bytes(&file.path().to_string_lossy(), b"<a/>")
            .await
            .unwrap_err();
        assert!(matches!(error, XsltError::NoProcessor));
    }

    #[tokio::test]
    async fn test_apply_document() {
        let file = stylesheet_file();
        let transformations = Transformations::new(StylesheetCache::new("/"), Arc::new(WrappingTransformer));
        let doc = XmlElement::parse(b"<FeatureCollection/>").unwrap();
        let out = transformations
            .apply(&file.path().to_string_lossy(), &doc)
            .await
            .unwrap();
        assert_eq!(out.to_fragment_string(), "<Transformed><FeatureCollection/></Transformed>");
    }
}
