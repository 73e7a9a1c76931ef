//! End-to-end behavior of the chain runtime.

use bytes::Bytes;
use http::StatusCode;
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::Arc;
use tether_core::{ApiError, EndpointMetadata};
use tether_middleware::{
    BufferedResponse, ChainEntry, ChainOverrides, ChainRunner, ChainStatus, MiddlewareContext,
    MiddlewareFactory, Phase, RunError, RunnerConfig, RuntimeControl,
};
use tether_test::{TestHarness, TestRequest};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().clone()
}

/// An entry that records its name and lets the chain continue.
fn record(log: &Log, name: &'static str) -> ChainEntry<()> {
    let log = Arc::clone(log);
    ChainEntry::from_fn(name, move |_request, _response, _ctx| {
        let log = Arc::clone(&log);
        async move {
            log.lock().push(name);
            Ok(())
        }
    })
}

/// An entry that keeps its chain's control for inspection after the run.
fn capture(slot: &Arc<Mutex<Option<RuntimeControl<()>>>>) -> ChainEntry<()> {
    let slot = Arc::clone(slot);
    ChainEntry::from_fn("capture", move |_request, _response, ctx: MiddlewareContext<()>| {
        let slot = Arc::clone(&slot);
        async move {
            *slot.lock() = Some(ctx.runtime().clone());
            Ok(())
        }
    })
}

fn raise(message: &'static str) -> ChainEntry<()> {
    ChainEntry::from_fn("raise", move |_request, _response, _ctx| async move {
        Err(ApiError::validation(message))
    })
}

// Fallback

#[tokio::test]
async fn test_silent_chain_gets_501() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(record(&log, "mw1"))
            .add_use(record(&log, "mw2")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    outcome
        .response
        .assert_status(StatusCode::NOT_IMPLEMENTED)
        .assert_error_code("NOT_IMPLEMENTED")
        .assert_json_content_type()
        .assert_ended_once();
    assert_eq!(entries(&log), vec!["mw1", "mw2"]);
    assert!(outcome.diagnostics.is_empty());
}

#[tokio::test]
async fn test_silent_handler_gets_501() {
    let harness = TestHarness::new(
        ChainRunner::builder(()).handler_fn("noop", |_request, _response, _ctx| async { Ok(()) }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();
    outcome.response.assert_status(StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_handler_response_with_empty_chain() {
    let harness = TestHarness::new(ChainRunner::builder(()).handler_fn(
        "ok",
        |_request, response, _ctx| async move {
            response.status(StatusCode::OK).send("fine");
            Ok(())
        },
    ));

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    outcome
        .response
        .assert_status(StatusCode::OK)
        .assert_body_eq("fine")
        .assert_ended_once();
    assert!(outcome
        .diagnostics
        .iter()
        .all(|d| d.code() == "implicit_done_skipped"));
}

// next()

#[tokio::test]
async fn test_extra_next_calls_never_reinvoke() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("puller", |_request, _response, ctx: MiddlewareContext<()>| async move {
                for _ in 0..3 {
                    ctx.runtime().next().await?;
                }
                Ok(())
            })
            .add_use(record(&log, "mw1")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert_eq!(entries(&log), vec!["mw1"]);
    assert_eq!(
        outcome.diagnostic_codes(),
        vec!["next_after_completion", "next_after_completion"]
    );
    assert_eq!(
        outcome.diagnostics[0].to_string(),
        "primary chain already finished executing; calling runtime.next() at this point is a noop"
    );
    outcome.response.assert_status(StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_manual_next_wraps_downstream() {
    let log = new_log();
    let wrapper_log = Arc::clone(&log);
    let handler_log = Arc::clone(&log);
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("wrap", move |_request, _response, ctx: MiddlewareContext<()>| {
                let log = Arc::clone(&wrapper_log);
                async move {
                    log.lock().push("before");
                    ctx.runtime().next().await?;
                    log.lock().push("after");
                    Ok(())
                }
            })
            .add_use(record(&log, "mw1"))
            .add_use(record(&log, "mw2"))
            .handler_fn("handler", move |_request, response, _ctx| {
                let log = Arc::clone(&handler_log);
                async move {
                    log.lock().push("handler");
                    response.send("done");
                    Ok(())
                }
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert_eq!(entries(&log), vec!["before", "mw1", "mw2", "after", "handler"]);
    outcome.response.assert_body_eq("done");
}

#[tokio::test]
async fn test_error_under_manual_next_reaches_error_chain() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("wrap", |_request, _response, ctx: MiddlewareContext<()>| async move {
                ctx.runtime().next().await
            })
            .add_use(raise("deep"))
            .add_use(record(&log, "never"))
            .add_use_on_error_fn("report", |_request, response, ctx| async move {
                let message = ctx.runtime().error().map(|e| e.to_string());
                response
                    .status(StatusCode::BAD_REQUEST)
                    .send(message.unwrap_or_default());
                Ok(())
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert!(entries(&log).is_empty());
    outcome
        .response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_body_eq("deep");
}

#[tokio::test]
async fn test_dropped_next_error_still_reaches_error_chain() {
    let log = new_log();
    let handler_log = Arc::clone(&log);
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("wrap", |_request, _response, ctx: MiddlewareContext<()>| async move {
                let _ = ctx.runtime().next().await;
                Ok(())
            })
            .add_use(raise("deep"))
            .add_use_on_error_fn("report", |_request, response, ctx| async move {
                let error = ctx.runtime().error().expect("error chain sees the error");
                assert!(matches!(*error, ApiError::Validation { .. }));
                response
                    .status(StatusCode::BAD_REQUEST)
                    .send(error.to_string());
                Ok(())
            })
            .handler_fn("handler", move |_request, response, _ctx| {
                let log = Arc::clone(&handler_log);
                async move {
                    log.lock().push("handler");
                    response.send("handler-ran");
                    Ok(())
                }
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert!(entries(&log).is_empty());
    outcome
        .response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_body_eq("deep");
}

#[tokio::test]
async fn test_next_error_handled_by_responding_is_not_raised() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("rescue", |_request, response, ctx: MiddlewareContext<()>| async move {
                if let Err(error) = ctx.runtime().next().await {
                    response.status(StatusCode::CONFLICT).send(error.to_string());
                }
                Ok(())
            })
            .add_use(raise("taken"))
            .add_use_on_error(record(&log, "error-mw")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert!(entries(&log).is_empty());
    outcome
        .response
        .assert_status(StatusCode::CONFLICT)
        .assert_body_eq("taken")
        .assert_ended_once();
}

#[tokio::test]
async fn test_nested_next_error_keeps_its_variant() {
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("outer", |_request, _response, ctx: MiddlewareContext<()>| async move {
                ctx.runtime().next().await
            })
            .add_use_fn("inner", |_request, _response, ctx: MiddlewareContext<()>| async move {
                ctx.runtime().next().await
            })
            .add_use(raise("deep")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    match outcome.result {
        Err(RunError::Unhandled(error)) => {
            assert!(matches!(*error, ApiError::Validation { .. }));
            assert_eq!(error.to_string(), "deep");
        }
        other => panic!("expected unhandled error, got {other:?}"),
    }
}

// done()

#[tokio::test]
async fn test_done_twice_reports_already_aborted() {
    let log = new_log();
    let slot = Arc::new(Mutex::new(None));
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(capture(&slot))
            .add_use_fn("stop", |_request, _response, ctx: MiddlewareContext<()>| async move {
                ctx.runtime().done();
                ctx.runtime().done();
                Ok(())
            })
            .add_use(record(&log, "mw2")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert_eq!(outcome.diagnostic_codes(), vec!["done_after_abort"]);
    assert_eq!(
        outcome.diagnostics[0].to_string(),
        "primary chain already aborted; calling runtime.done() at this point is a noop"
    );
    assert!(entries(&log).is_empty());
    outcome.response.assert_status(StatusCode::NOT_IMPLEMENTED);

    let control = slot.lock().clone().unwrap();
    assert_eq!(control.status(), ChainStatus::Aborted);
    assert_eq!(control.phase(), Phase::Aborted);
}

#[tokio::test]
async fn test_done_then_next_reports_aborted() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("stop", |_request, _response, ctx: MiddlewareContext<()>| async move {
                ctx.runtime().done();
                ctx.runtime().next().await
            })
            .add_use(record(&log, "mw2")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert_eq!(outcome.diagnostic_codes(), vec!["next_after_abort"]);
    assert!(entries(&log).is_empty());
}

#[tokio::test]
async fn test_done_after_exhaustion_reports_finished() {
    let slot = Arc::new(Mutex::new(None));
    let harness = TestHarness::new(ChainRunner::builder(()).add_use(capture(&slot)));

    harness.send(TestRequest::get("/v1/users")).await.unwrap();

    let control = slot.lock().clone().unwrap();
    assert_eq!(control.status(), ChainStatus::Exhausted);
    control.done();
    assert_eq!(harness.diagnostics().codes(), vec!["done_after_completion"]);
    assert_eq!(control.phase(), Phase::Completed);
}

// Errors

#[tokio::test]
async fn test_error_skips_rest_and_reaches_error_chain() {
    let log = new_log();
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(record(&log, "mw0"))
            .add_use(raise("bad"))
            .add_use(record(&log, "mw2"))
            .add_use_on_error_fn("observe", move |_request, _response, ctx| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock() = ctx.runtime().error();
                    Ok(())
                }
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert_eq!(entries(&log), vec!["mw0"]);
    let captured = seen.lock().clone().unwrap();
    assert_eq!(captured.to_string(), "bad");

    // The error chain sent nothing: the original error escapes unchanged.
    match outcome.result {
        Err(RunError::Unhandled(error)) => assert!(Arc::ptr_eq(&error, &captured)),
        other => panic!("expected unhandled error, got {other:?}"),
    }
    outcome.response.assert_status(StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn test_error_chain_response_resolves_run() {
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(raise("bad"))
            .add_use_on_error_fn("end", |_request, response, _ctx| async move {
                response.status(StatusCode::IM_A_TEAPOT).end();
                Ok(())
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    outcome
        .response
        .assert_status(StatusCode::IM_A_TEAPOT)
        .assert_ended_once();
}

#[tokio::test]
async fn test_empty_error_chain_propagates_original() {
    let harness = TestHarness::new(ChainRunner::builder(()).add_use(raise("bad")));

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    match outcome.result {
        Err(RunError::Unhandled(error)) => {
            assert_eq!(error.to_string(), "bad");
            assert!(matches!(*error, ApiError::Validation { .. }));
        }
        other => panic!("expected unhandled error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_silent_error_chain_is_unhandled_and_gets_501() {
    let seen: Arc<Mutex<Option<Arc<ApiError>>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(raise("bad"))
            .add_use_on_error_fn("silent", move |_request, _response, ctx: MiddlewareContext<()>| {
                let sink = Arc::clone(&sink);
                async move {
                    *sink.lock() = ctx.runtime().error();
                    Ok(())
                }
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    let seen = seen.lock().clone().expect("error chain saw the error");
    match outcome.result {
        Err(RunError::Unhandled(error)) => assert!(Arc::ptr_eq(&error, &seen)),
        other => panic!("expected unhandled error, got {other:?}"),
    }
    outcome
        .response
        .assert_status(StatusCode::NOT_IMPLEMENTED)
        .assert_error_code("NOT_IMPLEMENTED")
        .assert_ended_once();
}

#[tokio::test]
async fn test_error_is_unreadable_after_the_run() {
    let slot = Arc::new(Mutex::new(None));
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(raise("bad"))
            .add_use_on_error(capture(&slot)),
    );

    harness.send(TestRequest::get("/v1/users")).await.unwrap();

    let control = slot.lock().clone().unwrap();
    assert_eq!(control.phase(), Phase::Aborted);
    assert!(control.error().is_none());
}

#[tokio::test]
async fn test_handler_error_reaches_error_chain() {
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .handler_fn("handler", |_request, _response, _ctx| async {
                Err(ApiError::not_found("no such user"))
            })
            .add_use_on_error_fn("report", |_request, response, ctx| async move {
                let status = ctx
                    .runtime()
                    .error()
                    .map_or(StatusCode::INTERNAL_SERVER_ERROR, |e| e.status_code());
                response.status(status).end();
                Ok(())
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    outcome.response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_error_chain_failure_is_fatal() {
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(raise("bad"))
            .add_use_on_error_fn("broken", |_request, _response, _ctx| async {
                Err(ApiError::internal("error handler broke"))
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    match outcome.result {
        Err(RunError::ErrorChain(error)) => assert_eq!(error.to_string(), "error handler broke"),
        other => panic!("expected error chain failure, got {other:?}"),
    }
    assert!(!outcome.response.is_ended());
}

#[tokio::test]
async fn test_error_after_send_skips_error_chain() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("send-then-raise", |_request, response, _ctx| async move {
                response.send("partial");
                Err(ApiError::internal("late"))
            })
            .add_use_on_error(record(&log, "error-mw")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(matches!(outcome.result, Err(RunError::Unhandled(_))));
    assert!(entries(&log).is_empty());
    outcome.response.assert_status(StatusCode::OK).assert_body_eq("partial");
}

// Non-callable entries

#[tokio::test]
async fn test_non_callable_entries_are_skipped_in_both_chains() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use(ChainEntry::not_callable("5"))
            .add_use(raise("bad"))
            .add_use_on_error(ChainEntry::not_callable("null"))
            .add_use_on_error(record(&log, "error-mw"))
            .add_use_on_error_fn("end", |_request, response, _ctx| async move {
                response.status(StatusCode::BAD_REQUEST).end();
                Ok(())
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert_eq!(entries(&log), vec!["error-mw"]);
    assert_eq!(
        outcome.diagnostic_codes(),
        vec!["skipped_non_callable", "skipped_non_callable"]
    );
    assert!(outcome.diagnostics[1]
        .to_string()
        .starts_with("skipping execution of non-function item in chain"));
}

// Response end

#[tokio::test]
async fn test_sending_stops_chain_by_default() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("send", |_request, response, _ctx| async move {
                response.status(StatusCode::ACCEPTED).end();
                Ok(())
            })
            .add_use(record(&log, "mw2")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert!(entries(&log).is_empty());
    outcome.response.assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_sending_without_call_done_on_end_continues_chain() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("send", |_request, response, _ctx| async move {
                response.status(StatusCode::ACCEPTED).end();
                Ok(())
            })
            .add_use(record(&log, "mw2"))
            .call_done_on_end(false),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert_eq!(entries(&log), vec!["mw2"]);
    outcome.response.assert_status(StatusCode::ACCEPTED).assert_ended_once();
}

#[tokio::test]
async fn test_double_end_runs_end_effects_once() {
    let log = new_log();
    let harness = TestHarness::new(
        ChainRunner::builder(())
            .add_use_fn("end-twice", |_request, response, _ctx| async move {
                response.end();
                response.end();
                Ok(())
            })
            .add_use(record(&log, "mw2")),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();

    assert!(outcome.result.is_ok());
    assert!(entries(&log).is_empty());
    assert_eq!(outcome.response.end_calls(), 2);
    assert!(outcome.diagnostics.is_empty());
}

// Options, endpoint, factory

#[tokio::test]
async fn test_options_reach_every_middleware() {
    #[derive(Debug)]
    struct Options {
        realm: &'static str,
    }

    let harness = TestHarness::new(
        ChainRunner::builder(Options { realm: "users" })
            .add_use_fn("check", |_request, _response, ctx: MiddlewareContext<Options>| async move {
                assert_eq!(ctx.options().realm, "users");
                Ok(())
            })
            .handler_fn("echo", |_request, response, ctx: MiddlewareContext<Options>| async move {
                response.send(ctx.options().realm);
                Ok(())
            }),
    );

    let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();
    outcome.response.assert_body_eq("users");
}

#[tokio::test]
async fn test_factory_orders_prepend_base_append() {
    let log = new_log();
    let mut defaults = RunnerConfig::new(());
    defaults.use_chain = vec![record(&log, "base")];
    defaults.endpoint = EndpointMetadata::new("v1/*");
    let factory = MiddlewareFactory::new(defaults);

    let descriptor_seen = Arc::new(Mutex::new(String::new()));
    let seen = Arc::clone(&descriptor_seen);
    let runner = factory.create(
        None,
        ChainOverrides {
            prepend_use: vec![ChainEntry::from_fn(
                "rename",
                |_request, _response, ctx: MiddlewareContext<()>| async move {
                    ctx.update_endpoint(|endpoint| endpoint.descriptor = "v1/users".to_string());
                    Ok(())
                },
            )],
            append_use: vec![
                record(&log, "append"),
                ChainEntry::from_fn("observe", move |_request, _response, ctx: MiddlewareContext<()>| {
                    let seen = Arc::clone(&seen);
                    async move {
                        *seen.lock() = ctx.endpoint().descriptor;
                        Ok(())
                    }
                }),
            ],
            ..ChainOverrides::default()
        },
    );

    assert_eq!(runner.use_names(), vec!["rename", "base", "append", "observe"]);
    runner
        .run(http::Request::new(Bytes::new()), BufferedResponse::new())
        .await
        .unwrap();

    assert_eq!(entries(&log), vec!["base", "append"]);
    assert_eq!(*descriptor_seen.lock(), "v1/users");
    // The rewrite is per request.
    assert_eq!(runner.endpoint().descriptor, "v1/*");
}

// Concurrency

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_are_isolated() {
    let runner = Arc::new(
        ChainRunner::builder(())
            .add_use_fn("yield", |_request, _response, _ctx| async {
                tokio::task::yield_now().await;
                Ok(())
            })
            .handler_fn("echo", |request, response, ctx: MiddlewareContext<()>| async move {
                response.send(format!("{} {}", request.uri().path(), ctx.request_id()));
                Ok(())
            })
            .build(),
    );

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move {
                let buffer = BufferedResponse::new();
                let request = http::Request::builder()
                    .uri(format!("/v1/users/{i}"))
                    .body(Bytes::new())
                    .unwrap();
                runner.run(request, buffer.clone()).await.unwrap();
                (i, String::from_utf8(buffer.body().to_vec()).unwrap())
            })
        })
        .collect();

    let mut ids = std::collections::HashSet::new();
    for task in tasks {
        let (i, body) = task.await.unwrap();
        let (path, id) = body.split_once(' ').unwrap();
        assert_eq!(path, format!("/v1/users/{i}"));
        assert!(ids.insert(id.to_string()));
    }
}

// Properties

proptest! {
    #[test]
    fn prop_every_entry_runs_once_in_order(len in 0usize..12, pulls in proptest::collection::vec(any::<bool>(), 12)) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut builder = ChainRunner::builder(());
        for index in 0..len {
            let log = Arc::clone(&log);
            let pull = pulls[index];
            builder = builder.add_use(ChainEntry::from_fn(
                "entry",
                move |_request, _response, ctx: MiddlewareContext<()>| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(index);
                        if pull {
                            ctx.runtime().next().await?;
                        }
                        Ok(())
                    }
                },
            ));
        }
        let runner = builder.build();
        let buffer = BufferedResponse::new();

        rt.block_on(runner.run(http::Request::new(Bytes::new()), buffer.clone())).unwrap();

        prop_assert_eq!(log.lock().clone(), (0..len).collect::<Vec<_>>());
        prop_assert_eq!(buffer.status(), StatusCode::NOT_IMPLEMENTED);
        prop_assert_eq!(buffer.end_calls(), 1);
    }

    #[test]
    fn prop_abort_at_any_index_stops_chain(len in 1usize..10, stop_seed in any::<usize>()) {
        let stop_at = stop_seed % len;
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut builder = ChainRunner::builder(());
        for index in 0..len {
            let log = Arc::clone(&log);
            builder = builder.add_use(ChainEntry::from_fn(
                "entry",
                move |_request, _response, ctx: MiddlewareContext<()>| {
                    let log = Arc::clone(&log);
                    async move {
                        log.lock().push(index);
                        if index == stop_at {
                            ctx.runtime().done();
                        }
                        Ok(())
                    }
                },
            ));
        }
        let runner = builder.build();

        rt.block_on(runner.run(http::Request::new(Bytes::new()), BufferedResponse::new())).unwrap();

        prop_assert_eq!(log.lock().clone(), (0..=stop_at).collect::<Vec<_>>());
    }
}
