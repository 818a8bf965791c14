//! OGC protocol plumbing shared by every service.
//!
//! # Data Flow
//! ```text
//! body ─▶ multipart.rs (split parts) ─▶ soap.rs (unwrap, mustUnderstand)
//!      ─▶ multipart.rs (reattach) ─▶ request.rs (NormalizedRequest)
//!      ─▶ [service handler]
//!      ─▶ soap.rs (wrap) / encoder.rs (faults, exception images via image.rs)
//! ```

pub mod encoder;
pub mod exception;
pub mod image;
pub mod multipart;
pub mod namespaces;
pub mod request;
pub mod soap;

pub use encoder::{ExceptionContext, ExceptionEncoder, ExceptionShape};
pub use exception::{ExceptionCode, ExceptionDescriptor, FaultOrigin};
pub use multipart::{reference_anchors, MultipartEnvelope, MultipartFragment, MultipartReattacher};
pub use request::{NormalizedRequest, RequestPayload};
pub use soap::{SoapEnvelope, SoapEnvelopeCodec, SoapFault};
