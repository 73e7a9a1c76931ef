//! The chain walker.
//!
//! Runs entries from the cursor until the chain stops. An entry that pulls
//! the rest of the chain with `next()` moves the cursor itself; the walker
//! only advances past an entry whose control left the cursor untouched, so
//! no entry is ever invoked twice.
//!
//! An error reaches the walker in one of two ways: returned by the entry,
//! or recorded by a `next()` whose caller did not propagate it. Either way
//! it stops the chain.

use crate::control::RuntimeControl;
use crate::diagnostics::Diagnostic;
use crate::middleware::{ChainEntry, MiddlewareResult};
use std::sync::Arc;
use tether_core::ApiError;

/// Walks `control`'s chain from its cursor.
///
/// Returns the first error an entry raised, after marking the chain
/// aborted.
pub(crate) async fn walk<O: Send + Sync + 'static>(control: RuntimeControl<O>) -> MiddlewareResult {
    let progress = control.progress().clone();

    while let Some(index) = progress.current() {
        match control.entry(index) {
            Some(ChainEntry::Middleware(middleware)) => {
                let middleware = middleware.clone();
                tracing::trace!(
                    request_id = %control.shared().request_id(),
                    chain = %progress.kind(),
                    index,
                    middleware = middleware.name(),
                    "invoking middleware"
                );

                let result = middleware
                    .process(
                        control.request().clone(),
                        control.response().clone(),
                        control.context(),
                    )
                    .await;

                if let Err(error) = settle(&control, result) {
                    progress.fail();
                    tracing::debug!(
                        request_id = %control.shared().request_id(),
                        chain = %progress.kind(),
                        index,
                        middleware = middleware.name(),
                        error = %error,
                        "middleware raised; chain aborted"
                    );
                    return Err(error);
                }
            }
            Some(ChainEntry::NotCallable(description)) => {
                control.shared().emit(Diagnostic::SkippedNonCallable {
                    chain: progress.kind(),
                    index,
                    description: description.clone(),
                });
            }
            None => break,
        }
        progress.advance_from(index);
    }

    Ok(())
}

/// Reconciles an entry's result with the failure its `next()` recorded.
fn settle<O: Send + Sync + 'static>(
    control: &RuntimeControl<O>,
    result: MiddlewareResult,
) -> MiddlewareResult {
    let Some(pending) = control.progress().take_failure() else {
        return result;
    };

    match result {
        Err(error) if error.as_shared().is_some_and(|raised| Arc::ptr_eq(raised, &pending)) => {
            drop(error);
            Err(unshare(pending))
        }
        Err(error) => Err(error),
        Ok(()) if control.response().is_sent() => {
            tracing::debug!(
                request_id = %control.shared().request_id(),
                error = %pending,
                "downstream error dropped by an entry that responded"
            );
            Ok(())
        }
        Ok(()) => {
            tracing::debug!(
                request_id = %control.shared().request_id(),
                error = %pending,
                "downstream error dropped by its caller; raising it"
            );
            Err(unshare(pending))
        }
    }
}

fn unshare(error: Arc<ApiError>) -> ApiError {
    Arc::try_unwrap(error).unwrap_or_else(ApiError::Shared)
}
