//! Bundled middleware stages.
//!
//! Each stage is an ordinary [`Middleware`](crate::Middleware) that can be
//! placed in any chain, and each can be registered by name in a
//! [`MiddlewareRegistry`](crate::MiddlewareRegistry):
//!
//! - [`check_method`] - Rejects methods the endpoint does not serve (`405`)
//! - [`check_content_type`] - Rejects media types the endpoint does not
//!   accept (`415`)
//! - [`log_request`] - Records every finished request in a request log
//! - [`handle_error`] - Turns the captured error into a JSON error response;
//!   belongs at the end of the error chain

pub mod check_content_type;
pub mod check_method;
pub mod handle_error;
pub mod log_request;

pub use check_content_type::{CheckContentTypeMiddleware, ContentTypePolicy};
pub use check_method::CheckMethodMiddleware;
pub use handle_error::HandleErrorMiddleware;
pub use log_request::{
    LogRequestMiddleware, MemoryRequestLog, RequestLogEntry, RequestLogError, RequestLogStore,
};
