//! Core middleware trait and chain entries.
//!
//! Middleware in Tether is Koa-shaped: each entry receives the shared
//! request, a handle on the response, and a [`MiddlewareContext`] whose
//! runtime control can pull the rest of the chain with
//! [`RuntimeControl::next`](crate::RuntimeControl::next) or stop it with
//! [`RuntimeControl::done`](crate::RuntimeControl::done). A middleware that
//! calls neither simply returns and the walker moves on to the following
//! entry.
//!
//! # Example
//!
//! ```
//! use tether_middleware::{BoxFuture, Middleware, MiddlewareContext, MiddlewareResult};
//! use tether_middleware::{ResponseWriter, SharedRequest};
//!
//! struct Timing;
//!
//! impl<O: Send + Sync + 'static> Middleware<O> for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         _request: SharedRequest,
//!         _response: ResponseWriter,
//!         ctx: MiddlewareContext<O>,
//!     ) -> BoxFuture<'a, MiddlewareResult> {
//!         Box::pin(async move {
//!             ctx.runtime().next().await?;
//!             tracing::debug!(elapsed = ?ctx.elapsed(), "downstream finished");
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::sentinel::ResponseWriter;
use crate::types::SharedRequest;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tether_core::ApiError;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The outcome of one middleware invocation.
pub type MiddlewareResult = Result<(), ApiError>;

/// The middleware trait.
///
/// `O` is the per-runner options type every middleware of the runner can
/// read through [`MiddlewareContext::options`].
///
/// # Invariants
///
/// - Returning `Err` aborts the current chain; the runner hands the error to
///   the error chain.
/// - Calling `next()` more than once is harmless: the second call finds the
///   chain already finished and only emits a diagnostic.
pub trait Middleware<O>: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn process<'a>(
        &'a self,
        request: SharedRequest,
        response: ResponseWriter,
        ctx: MiddlewareContext<O>,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// A shared, type-erased middleware.
pub type BoxedMiddleware<O> = Arc<dyn Middleware<O>>;

/// A middleware built from an async closure.
///
/// # Example
///
/// ```
/// use tether_middleware::{ChainEntry, FnMiddleware, MiddlewareContext};
/// use tether_middleware::{ResponseWriter, SharedRequest};
///
/// let entry: ChainEntry<()> = ChainEntry::new(FnMiddleware::new(
///     "hello",
///     |_request: SharedRequest, response: ResponseWriter, _ctx: MiddlewareContext<()>| async move {
///         response.send("hello");
///         Ok(())
///     },
/// ));
/// assert!(entry.is_callable());
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<O, F, Fut> Middleware<O> for FnMiddleware<F>
where
    O: Send + Sync + 'static,
    F: Fn(SharedRequest, ResponseWriter, MiddlewareContext<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        request: SharedRequest,
        response: ResponseWriter,
        ctx: MiddlewareContext<O>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin((self.func)(request, response, ctx))
    }
}

/// One item of a middleware chain.
///
/// Chains may be assembled from configuration, where an item can name a
/// middleware nobody registered or not be a name at all. Such items are kept
/// in place as [`ChainEntry::NotCallable`] and skipped, with a diagnostic,
/// when the walker reaches them.
pub enum ChainEntry<O> {
    /// An invocable middleware.
    Middleware(BoxedMiddleware<O>),
    /// An item that cannot be invoked, with a description of what it was.
    NotCallable(String),
}

impl<O: Send + Sync + 'static> ChainEntry<O> {
    /// Wraps a middleware.
    pub fn new(middleware: impl Middleware<O>) -> Self {
        Self::Middleware(Arc::new(middleware))
    }

    /// Wraps an async closure as a middleware.
    pub fn from_fn<F, Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(SharedRequest, ResponseWriter, MiddlewareContext<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        Self::new(FnMiddleware::new(name, func))
    }
}

impl<O: 'static> ChainEntry<O> {
    /// Creates a placeholder for an item that cannot be invoked.
    pub fn not_callable(description: impl Into<String>) -> Self {
        Self::NotCallable(description.into())
    }

    /// Returns true if the entry can be invoked.
    pub const fn is_callable(&self) -> bool {
        matches!(self, Self::Middleware(_))
    }

    /// Returns the middleware name, or the description of a non-callable
    /// item.
    pub fn label(&self) -> &str {
        match self {
            Self::Middleware(middleware) => middleware.name(),
            Self::NotCallable(description) => description,
        }
    }
}

impl<O: 'static> Clone for ChainEntry<O> {
    fn clone(&self) -> Self {
        match self {
            Self::Middleware(middleware) => Self::Middleware(Arc::clone(middleware)),
            Self::NotCallable(description) => Self::NotCallable(description.clone()),
        }
    }
}

impl<O: 'static> From<BoxedMiddleware<O>> for ChainEntry<O> {
    fn from(middleware: BoxedMiddleware<O>) -> Self {
        Self::Middleware(middleware)
    }
}

impl<O: 'static> fmt::Debug for ChainEntry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Middleware(middleware) => f
                .debug_tuple("Middleware")
                .field(&middleware.name())
                .finish(),
            Self::NotCallable(description) => {
                f.debug_tuple("NotCallable").field(description).finish()
            }
        }
    }
}
