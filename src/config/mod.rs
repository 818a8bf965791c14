//! Gateway configuration.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs      toml → GatewayConfig, defaults for every section
//!     → validation.rs  bind address, limits, service names, WMS formats
//!     → GatewaySettings (encoder + SOAP codec derived once)
//!     → ServiceRegistry::from_config
//!
//! watcher.rs (notify):
//!     file modified → reload + validate → mpsc → GatewayController::reconfigure
//!     invalid file → logged, running services untouched
//! ```
//!
//! # Design Decisions
//! - A loaded config is never mutated; a change produces a new snapshot
//! - Service names are compared upper-cased, the same form the registry uses

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{GatewayConfig, Protocol, ServiceConfig, VirtualFormatConfig};
pub use validation::{validate_config, ValidationError};
pub use watcher::ConfigWatcher;
