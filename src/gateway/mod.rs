//! Gateway subsystem.
//!
//! # Data Flow
//! ```text
//! HTTP request
//!     → controller.rs (envelope, normalization, dispatch, encoding)
//!     → HTTP response
//!
//! Config file change:
//!     ConfigWatcher → reload.rs → GatewayController::reconfigure
//! ```

pub mod controller;
pub mod reload;

pub use controller::{GatewayController, GatewaySettings};
pub use reload::apply_config_updates;
