//! # Tether Core
//!
//! Core types shared by every Tether crate.
//!
//! - [`ApiError`] - Request-facing error taxonomy with HTTP status mapping
//! - [`ErrorEnvelope`] - Serializable JSON error body
//! - [`RequestId`] - UUID v7 request identifier
//! - [`EndpointMetadata`] - Per-route metadata visible to middleware

#![doc(html_root_url = "https://docs.rs/tether-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod endpoint;
mod error;
mod id;

pub use endpoint::EndpointMetadata;
pub use error::{ApiError, ApiResult, ErrorCategory, ErrorDetail, ErrorEnvelope};
pub use id::RequestId;
