//! HTTP plumbing around the gateway.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID)
//!     → params.rs (query / form parameters)
//!     → body.rs (captured, replayable request body)
//!     → [gateway pipeline]
//!     → capture.rs (buffered response)
//!     → compression.rs (gzip)
//!     → Send to client
//! ```

pub mod body;
pub mod capture;
pub mod compression;
pub mod params;
pub mod request;
pub mod server;

pub use body::{BodyError, ReplayableBody};
pub use capture::ResponseCapture;
pub use params::ParameterMap;
pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
