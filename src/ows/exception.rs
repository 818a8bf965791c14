//! Typed protocol failures.
//!
//! An [`ExceptionDescriptor`] is created where a failure happens and travels
//! upward as a value until the encoder turns it into a fault document. It is
//! never inspected for "does this look like XML"; structured detail rides in
//! `detail`.

use std::fmt;

use thiserror::Error;

use crate::http::body::BodyError;
use crate::xml::{XmlElement, XmlError};

/// OGC exception codes plus the SOAP fault classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    InvalidFormat,
    InvalidParameterValue,
    MissingParameterValue,
    OperationNotSupported,
    NoApplicableCode,
    VersionNegotiationFailed,
    InvalidUpdateSequence,
    CurrentUpdateSequence,
    InternalServerError,
    LayerNotDefined,
    StyleNotDefined,
    VersionMismatch,
    MustUnderstand,
    Client,
    Server,
    Other(String),
}

impl ExceptionCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::InvalidFormat => "InvalidFormat",
            Self::InvalidParameterValue => "InvalidParameterValue",
            Self::MissingParameterValue => "MissingParameterValue",
            Self::OperationNotSupported => "OperationNotSupported",
            Self::NoApplicableCode => "NoApplicableCode",
            Self::VersionNegotiationFailed => "VersionNegotiationFailed",
            Self::InvalidUpdateSequence => "InvalidUpdateSequence",
            Self::CurrentUpdateSequence => "CurrentUpdateSequence",
            Self::InternalServerError => "InternalServerError",
            Self::LayerNotDefined => "LayerNotDefined",
            Self::StyleNotDefined => "StyleNotDefined",
            Self::VersionMismatch => "VersionMismatch",
            Self::MustUnderstand => "MustUnderstand",
            Self::Client => "Client",
            Self::Server => "Server",
            Self::Other(code) => code,
        }
    }

    /// Parse a code as it appears on the wire; unknown codes are kept verbatim.
    pub fn from_code(code: &str) -> Self {
        const KNOWN: [ExceptionCode; 15] = [
            ExceptionCode::InvalidFormat,
            ExceptionCode::InvalidParameterValue,
            ExceptionCode::MissingParameterValue,
            ExceptionCode::OperationNotSupported,
            ExceptionCode::NoApplicableCode,
            ExceptionCode::VersionNegotiationFailed,
            ExceptionCode::InvalidUpdateSequence,
            ExceptionCode::CurrentUpdateSequence,
            ExceptionCode::InternalServerError,
            ExceptionCode::LayerNotDefined,
            ExceptionCode::StyleNotDefined,
            ExceptionCode::VersionMismatch,
            ExceptionCode::MustUnderstand,
            ExceptionCode::Client,
            ExceptionCode::Server,
        ];
        KNOWN
            .into_iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(code.trim()))
            .unwrap_or_else(|| Self::Other(code.trim().to_string()))
    }

    /// One of the four canonical SOAP 1.1 fault classes.
    pub fn is_soap_class(&self) -> bool {
        matches!(
            self,
            Self::VersionMismatch | Self::MustUnderstand | Self::Client | Self::Server
        )
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage a failure was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOrigin {
    /// Transport envelope handling, before a target service is known.
    Envelope,
    /// Routing and protocol checks; no backend call was made.
    Dispatch,
    /// The backend service reported the failure.
    Backend,
}

impl FaultOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Envelope => "envelope",
            Self::Dispatch => "dispatch",
            Self::Backend => "backend",
        }
    }
}

/// A failure on its way to the client.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct ExceptionDescriptor {
    pub code: ExceptionCode,
    pub message: String,
    /// Parameter or service the failure refers to.
    pub locator: Option<String>,
    /// Pre-built XML carried as SOAP fault detail.
    pub detail: Option<XmlElement>,
}

impl ExceptionDescriptor {
    pub fn new(code: ExceptionCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            locator: None,
            detail: None,
        }
    }

    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    pub fn with_detail(mut self, detail: XmlElement) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::new(ExceptionCode::InvalidFormat, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ExceptionCode::InvalidParameterValue, message)
    }

    pub fn missing_parameter(parameter: &str) -> Self {
        Self::new(
            ExceptionCode::MissingParameterValue,
            format!("Parameter '{}' must be set.", parameter),
        )
        .with_locator(parameter.to_lowercase())
    }

    pub fn not_supported(operation: &str) -> Self {
        Self::new(
            ExceptionCode::OperationNotSupported,
            format!("Operation '{}' is not supported.", operation),
        )
        .with_locator(operation)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ExceptionCode::InternalServerError, message)
    }

    /// The locator, unless it is absent or the placeholder `unknown`.
    pub fn effective_locator(&self) -> Option<&str> {
        self.locator
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("unknown"))
    }
}

impl From<XmlError> for ExceptionDescriptor {
    fn from(error: XmlError) -> Self {
        Self::invalid_format(format!("An error occurred while parsing request: {}", error))
    }
}

impl From<BodyError> for ExceptionDescriptor {
    fn from(error: BodyError) -> Self {
        match error {
            BodyError::TooLarge { .. } => Self::invalid_parameter(error.to_string()),
            BodyError::Read(_) => Self::new(ExceptionCode::NoApplicableCode, error.to_string()),
        }
    }
}
