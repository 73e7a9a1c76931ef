//! # Tether Test
//!
//! Test utilities for the Tether framework. Requests run through a real
//! [`ChainRunner`](tether_middleware::ChainRunner) against an in-memory
//! response, with every runtime diagnostic recorded.
//!
//! ## Key Features
//!
//! - **In-Memory Runs**: No server, no sockets
//! - **Request Builder**: Fluent API for building test requests
//! - **Response Assertions**: Status, headers, body, error codes, end count
//! - **Diagnostics**: Every `next()`/`done()` misuse and skipped entry is
//!   captured per run
//!
//! ## Example
//!
//! ```
//! use http::StatusCode;
//! use tether_middleware::{ChainRunner, MiddlewareContext};
//! use tether_test::{TestHarness, TestRequest};
//!
//! # tokio_test::block_on(async {
//! let harness = TestHarness::new(
//!     ChainRunner::builder(())
//!         .add_use_fn("deny", |_request, response, _ctx: MiddlewareContext<()>| async move {
//!             response.status(StatusCode::FORBIDDEN).send("no");
//!             Ok(())
//!         }),
//! );
//!
//! let outcome = harness.send(TestRequest::delete("/v1/users/alice")).await.unwrap();
//! outcome
//!     .response
//!     .assert_status(StatusCode::FORBIDDEN)
//!     .assert_body_eq("no")
//!     .assert_ended_once();
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/tether-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod diagnostics;
mod error;
mod harness;
mod request;
mod response;

pub use diagnostics::RecordingDiagnostics;
pub use error::TestError;
pub use harness::{TestHarness, TestOutcome};
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
