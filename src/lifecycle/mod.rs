//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! SIGTERM / Ctrl+C (signals.rs)
//!     → Shutdown::trigger (shutdown.rs)
//!     → HttpServer stops accepting, drains in-flight requests
//!     → config update task exits
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
