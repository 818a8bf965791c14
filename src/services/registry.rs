//! Service name to handler mapping.
//!
//! # Responsibilities
//! - Hold one handler per registered service name (and alias)
//! - Build the full registry from configuration
//! - Report the default protocol version of a name
//!
//! # Design Decisions
//! - Immutable once built; a reload builds a new registry and swaps the
//!   shared pointer, so in-flight requests keep the snapshot they loaded
//! - Names are stored upper-cased; lookup is case-insensitive
//! - Duplicate names are a build error, never a silent overwrite

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::{GatewayConfig, Protocol, ServiceConfig};
use crate::services::csw::CswHandler;
use crate::services::generic::GenericHandler;
use crate::services::static_backend::StaticDocumentService;
use crate::services::wcs::WcsHandler;
use crate::services::wfs::WfsHandler;
use crate::services::wms::WmsHandler;
use crate::services::xslt::Transformations;
use crate::services::{OwsService, ServiceHandler};

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("service name '{0}' is registered twice")]
    Duplicate(String),

    #[error("service name must not be empty")]
    EmptyName,
}

/// Registry shared between requests and swapped on reload.
pub type SharedRegistry = Arc<ArcSwap<ServiceRegistry>>;

/// Supplies the backend for a configured service.
pub trait BackendProvider: Send + Sync {
    fn backend(&self, service: &ServiceConfig) -> Arc<dyn OwsService>;
}

/// Serves each service's configured documents from disk.
#[derive(Debug, Clone)]
pub struct StaticBackends {
    base_dir: PathBuf,
}

impl StaticBackends {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

impl BackendProvider for StaticBackends {
    fn backend(&self, service: &ServiceConfig) -> Arc<dyn OwsService> {
        Arc::new(StaticDocumentService::new(&service.documents, &self.base_dir))
    }
}

#[derive(Clone)]
struct Entry {
    handler: Arc<dyn ServiceHandler>,
    default_version: Option<String>,
}

#[derive(Clone, Default)]
pub struct ServiceRegistry {
    entries: HashMap<String, Entry>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry").field("names", &self.names()).finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`.
    pub fn register(&mut self, name: &str, handler: Arc<dyn ServiceHandler>) -> Result<(), RegistryError> {
        self.insert(name, handler, None)
    }

    fn insert(
        &mut self,
        name: &str,
        handler: Arc<dyn ServiceHandler>,
        default_version: Option<String>,
    ) -> Result<(), RegistryError> {
        let key = name.trim().to_uppercase();
        if key.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.entries.contains_key(&key) {
            return Err(RegistryError::Duplicate(key));
        }
        self.entries.insert(
            key,
            Entry {
                handler,
                default_version,
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ServiceHandler>> {
        self.entry(name).map(|e| e.handler.clone())
    }

    pub fn default_version(&self, name: &str) -> Option<&str> {
        self.entry(name).and_then(|e| e.default_version.as_deref())
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.get(&name.trim().to_uppercase())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a handler for every configured service and register it under
    /// its name and aliases.
    pub fn from_config(
        config: &GatewayConfig,
        backends: &dyn BackendProvider,
        transformations: Arc<Transformations>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for service in &config.services {
            let backend = backends.backend(service);
            let handler: Arc<dyn ServiceHandler> = match service.protocol {
                Protocol::Wms => Arc::new(WmsHandler::new(
                    backend,
                    service.feature_info_transforms.clone(),
                    transformations.clone(),
                )),
                Protocol::Wfs => Arc::new(WfsHandler::new(
                    backend,
                    service.virtual_formats.clone(),
                    transformations.clone(),
                )),
                Protocol::Csw => Arc::new(CswHandler::new(backend)),
                Protocol::Wcs => Arc::new(WcsHandler::new(backend)),
                other => Arc::new(GenericHandler::new(other, backend)),
            };
            for name in service.registry_names() {
                registry.insert(&name, handler.clone(), service.default_version.clone())?;
            }
        }
        tracing::info!(services = ?registry.names(), "Service registry built");
        Ok(registry)
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(ArcSwap::from_pointee(self))
    }
}
