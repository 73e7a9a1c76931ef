//! # Tether Middleware
//!
//! Middleware chain runtime for the Tether framework.
//!
//! A route is served by a [`ChainRunner`] built from two ordered lists of
//! middleware and an optional terminal handler:
//!
//! ```text
//! Request → use[0] → use[1] → … → handler ──────────────▶ Response
//!              │ error                                        ▲
//!              └──▶ useOnError[0] → useOnError[1] → … ───────┘
//!                                                 (or 501 fallback)
//! ```
//!
//! Every middleware receives the request, a [`ResponseWriter`], and a
//! [`MiddlewareContext`] whose [`RuntimeControl`] steers its chain:
//!
//! | Operation            | Effect                                               |
//! |----------------------|------------------------------------------------------|
//! | *(return `Ok`)*      | The next entry runs                                  |
//! | `runtime().next()`   | Runs the rest of the chain now, then resumes caller  |
//! | `runtime().done()`   | Stops the chain; later entries never run             |
//! | *(return `Err`)*     | Stops the chain; the error chain takes over          |
//! | `runtime().error()`  | The captured error, inside the error chain           |
//!
//! Control operations are idempotent. Calling `next()` or `done()` on a chain
//! that already stopped changes nothing and is reported as a [`Diagnostic`].
//! By default, ending the response stops the active chain, so middleware can
//! short-circuit simply by sending.
//!
//! Whatever the middleware does, each request ends with exactly one
//! response: if nothing was sent, the runner answers
//! `501 Not Implemented`.
//!
//! ## Example
//!
//! ```
//! use http::StatusCode;
//! use tether_core::ApiError;
//! use tether_middleware::{BufferedResponse, ChainEntry, ChainRunner};
//! use tether_middleware::stages::HandleErrorMiddleware;
//!
//! # tokio_test::block_on(async {
//! let runner = ChainRunner::builder(())
//!     .add_use_fn("auth", |request, _response, _ctx| async move {
//!         if request.headers().contains_key("authorization") {
//!             Ok(())
//!         } else {
//!             Err(ApiError::authentication("missing credentials"))
//!         }
//!     })
//!     .add_use_on_error(ChainEntry::new(HandleErrorMiddleware::new()))
//!     .handler_fn("hello", |_request, response, _ctx| async move {
//!         response.send("hello");
//!         Ok(())
//!     })
//!     .build();
//!
//! let buffer = BufferedResponse::new();
//! runner
//!     .run(http::Request::new(bytes::Bytes::new()), buffer.clone())
//!     .await
//!     .unwrap();
//! assert_eq!(buffer.status(), StatusCode::UNAUTHORIZED);
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/tether-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod context;
pub mod control;
pub mod diagnostics;
pub mod middleware;
pub mod registry;
pub mod runner;
pub mod sentinel;
pub mod stages;
pub mod types;
mod walker;

// Re-export main types at crate root
pub use context::{MiddlewareContext, Phase, RequestContext};
pub use control::{ChainKind, ChainStatus, RuntimeControl};
pub use diagnostics::{Diagnostic, DiagnosticSink, TracingDiagnostics};
pub use middleware::{
    BoxFuture, BoxedMiddleware, ChainEntry, FnMiddleware, Middleware, MiddlewareResult,
};
pub use registry::MiddlewareRegistry;
pub use runner::{
    ChainOverrides, ChainRunner, MiddlewareFactory, RunError, RunnerBuilder, RunnerConfig,
};
pub use sentinel::{BufferedResponse, ResponseSentinel, ResponseSink, ResponseWriter};
pub use types::{error_body, Request, Response, ResponseExt, SharedRequest};
