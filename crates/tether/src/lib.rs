//! # Tether
//!
//! **Middleware chain runtime for serverless-style HTTP APIs**
//!
//! Tether runs every request of a route through an ordered primary chain of
//! middleware, an optional terminal handler, and, when something fails, a
//! second error chain:
//!
//! - 🔗 **Chains by configuration** – `use` / `useOnError` lists of named
//!   middleware, specialised per route with prepend/append lists
//! - 🎛️ **Idempotent control** – `next()` and `done()` are safe to call from
//!   any middleware, any number of times
//! - 🛟 **Exactly one outcome** – every request ends with the intended
//!   response, an error-chain response, or `501 Not Implemented`
//! - 📊 **Observable** – structured `tracing` logs and a typed diagnostics
//!   channel for every no-op and skipped entry
//!
//! ## Quick Start
//!
//! ```
//! use tether::prelude::*;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = MiddlewareRegistry::<()>::new();
//! registry.register_middleware(HandleErrorMiddleware::new());
//! registry.register_fn("require-user", |request, _response, _ctx| async move {
//!     if request.uri().path().starts_with("/v1/users/") {
//!         Ok(())
//!     } else {
//!         Err(ApiError::not_found("no such user"))
//!     }
//! });
//!
//! let config = registry
//!     .runner_config_from_json(
//!         json!({"use": ["require-user"], "useOnError": ["handle-error"]}),
//!         (),
//!     )
//!     .unwrap();
//! let runner = ChainRunner::new(None, config);
//!
//! let request = http::Request::builder()
//!     .uri("/v1/groups")
//!     .body(bytes::Bytes::new())
//!     .unwrap();
//! let response = runner.handle(request).await;
//! assert_eq!(response.status(), StatusCode::NOT_FOUND);
//! # });
//! ```
//!
//! ## Crates
//!
//! | Crate               | Contents                                          |
//! |---------------------|---------------------------------------------------|
//! | `tether-core`       | `ApiError`, error envelope, request IDs, endpoints |
//! | `tether-middleware` | The chain runtime and the bundled stages          |
//! | `tether-config`     | Layered configuration for runners and logging     |
//! | `tether-telemetry`  | Logging initialization                            |

#![doc(html_root_url = "https://docs.rs/tether/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use tether_core as core;

// Re-export the chain runtime
pub use tether_middleware as middleware;

// Re-export configuration
pub use tether_config as config;

// Re-export telemetry
pub use tether_telemetry as telemetry;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```
/// use tether::prelude::*;
///
/// let runner: ChainRunner<()> = ChainRunner::builder(()).build();
/// assert!(runner.use_names().is_empty());
/// ```
pub mod prelude {
    pub use tether_core::{ApiError, EndpointMetadata, ErrorCategory, RequestId};

    // Re-export the runtime surface
    pub use tether_middleware::{
        BufferedResponse, ChainEntry, ChainKind, ChainOverrides, ChainRunner, ChainStatus,
        Diagnostic, DiagnosticSink, Middleware, MiddlewareContext, MiddlewareFactory,
        MiddlewareRegistry, MiddlewareResult, Phase, ResponseWriter, RunError, RunnerConfig,
        RuntimeControl,
    };

    // Re-export the bundled stages
    pub use tether_middleware::stages::{
        CheckContentTypeMiddleware, CheckMethodMiddleware, ContentTypePolicy,
        HandleErrorMiddleware, LogRequestMiddleware, MemoryRequestLog,
    };

    // Re-export configuration loading
    pub use tether_config::{ConfigLoader, TetherConfig};

    // Re-export logging setup
    pub use tether_telemetry::{init_logging, LogConfig};

    pub use http::StatusCode;
}
