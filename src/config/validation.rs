//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, body limit > 0)
//! - Detect registry names claimed twice
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::GatewayConfig;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

const EXCEPTION_FORMATS: [&str; 6] = [
    "XML",
    "INIMAGE",
    "BLANK",
    "application/vnd.ogc.se_xml",
    "application/vnd.ogc.se_inimage",
    "application/vnd.ogc.se_blank",
];

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_address", "must not be empty"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.exceptions.wms_formats.is_empty() {
        errors.push(ValidationError::new("exceptions.wms_formats", "at least one format is required"));
    }
    for format in &config.exceptions.wms_formats {
        if !EXCEPTION_FORMATS.iter().any(|known| known.eq_ignore_ascii_case(format.trim())) {
            errors.push(ValidationError::new(
                "exceptions.wms_formats",
                format!("unknown exception format '{}'", format),
            ));
        }
    }
    if config.exceptions.max_image_width == 0 || config.exceptions.max_image_height == 0 {
        errors.push(ValidationError::new("exceptions", "maximum image size must be positive"));
    }

    if config.reload.enabled && (config.reload.user.is_none() || config.reload.password.is_none()) {
        errors.push(ValidationError::new("reload", "user and password are required when enabled"));
    }

    let mut names = HashSet::new();
    for (index, service) in config.services.iter().enumerate() {
        for name in service.registry_names() {
            if name.is_empty() {
                errors.push(ValidationError::new(format!("services[{}]", index), "empty service name"));
            } else if !names.insert(name.clone()) {
                errors.push(ValidationError::new(
                    format!("services[{}]", index),
                    format!("service name '{}' is registered twice", name),
                ));
            }
        }

        let mut formats = HashSet::new();
        for format in &service.virtual_formats {
            if !formats.insert(format.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("services[{}].virtual_formats", index),
                    format!("duplicate format '{}'", format.name),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
