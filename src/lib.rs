//! OGC web service gateway library.

pub mod config;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod ows;
pub mod services;
pub mod xml;

pub use config::GatewayConfig;
pub use gateway::{GatewayController, GatewaySettings};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
