mod common;

use std::sync::{Arc, Mutex};

use common::{CallLog, empty, holding};
use resmux::middleware::cache::Cache;
use resmux::middleware::env::ExpandEnv;
use resmux::middleware::trace::Trace;
use resmux::middleware::validate::{NonEmptyPath, ResourceExists, Validate};
use resmux::{Controller, Error, Pipeline, Request, ResourceId, Response};
use tokio_util::sync::CancellationToken;

/// A single-value store whose reads reflect the last write.
fn cell(log: &CallLog, initial: &str) -> Controller {
    let value = Arc::new(Mutex::new(initial.to_owned()));
    let (read, write) = (Arc::clone(&value), value);
    let (read_log, write_log) = (log.clone(), log.clone());

    Controller::builder()
        .name("cell")
        .scheme("sql")
        .get(move |req: Request, _cancel: CancellationToken| {
            read_log.push(format!("cell GET {}", req.id().path()));
            let current = read.lock().unwrap().clone();
            async move { Ok::<_, Error>(Response::text(current)) }
        })
        .put(move |req: Request, _cancel: CancellationToken| {
            write_log.push(format!("cell PUT {}", req.id().path()));
            *write.lock().unwrap() = req.payload_str().unwrap_or_default().to_owned();
            async { Ok::<_, Error>("stored") }
        })
        .build()
}

#[tokio::test]
async fn repeated_reads_are_served_from_the_cache() {
    let log = CallLog::new();
    let pipeline = Pipeline::builder()
        .controller(empty(&log, "embedded", "file").build())
        .controller(holding(&log, "physical", "file", "x").build())
        .layer(Cache::builder().build())
        .build();

    let id = ResourceId::parse("file:///a.txt").unwrap();
    let first = pipeline.invoke(Request::get(id.clone())).await.unwrap();
    let second = pipeline.invoke(Request::get(id)).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(log.callers(), vec!["embedded", "physical"]);
}

#[tokio::test]
async fn a_write_evicts_the_cached_read() {
    let log = CallLog::new();
    let cache = Cache::builder().build();
    let pipeline = Pipeline::builder()
        .controller(cell(&log, "30"))
        .layer(cache.clone())
        .build();

    let id = ResourceId::new("sql", "timeout");
    let before = pipeline.invoke(Request::get(id.clone())).await.unwrap();
    assert_eq!(before.text_body(), Some("30"));
    assert_eq!(cache.len(), 1);

    pipeline.invoke(Request::put(id.clone(), "45")).await.unwrap();
    assert!(cache.is_empty());

    let after = pipeline.invoke(Request::get(id)).await.unwrap();
    assert_eq!(after.text_body(), Some("45"));
    assert_eq!(log.calls(), vec!["cell GET timeout", "cell PUT timeout", "cell GET timeout"]);
}

#[tokio::test]
async fn properties_outside_the_ignore_list_split_the_cache() {
    let log = CallLog::new();
    let pipeline = Pipeline::builder()
        .controller(holding(&log, "store", "file", "x").build())
        .layer(Cache::builder().build())
        .build();

    let id = ResourceId::new("file", "a");
    for req in [
        Request::get(id.clone()).property("correlation-id", "1"),
        Request::get(id.clone()).property("correlation-id", "2"),
        Request::get(id.clone()).property("encoding", "utf-16"),
    ] {
        pipeline.invoke(req).await.unwrap();
    }
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn empty_resource_names_fail_validation_before_dispatch() {
    let log = CallLog::new();
    let pipeline = Pipeline::builder()
        .controller(holding(&log, "physical", "file", "x").build())
        .layer(Validate::new().with(NonEmptyPath))
        .build();

    let err = pipeline
        .invoke(Request::get(ResourceId::parse("file://").unwrap()))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ValidationFailed(_)), "{err}");
    assert_eq!(err.reason(), Some("resource.empty-path"));
    assert_eq!(log.len(), 0);
}

#[tokio::test]
async fn validation_runs_ahead_of_the_cache() {
    let log = CallLog::new();
    let cache = Cache::builder().build();
    let pipeline = Pipeline::builder()
        .controller(cell(&log, "30"))
        .layer_with(|dispatcher| Validate::new().with(ResourceExists::new(dispatcher.clone())))
        .layer(cache.clone())
        .build();

    let err = pipeline
        .invoke(Request::delete(ResourceId::new("sql", "timeout")).name("nobody"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some("resource.not-found"));
    assert_eq!(log.len(), 0);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn placeholders_expand_before_routing_and_caching() {
    let log = CallLog::new();
    let cache = Cache::builder().build();
    let pipeline = Pipeline::builder()
        .controller(holding(&log, "physical", "file", "x").build())
        .layer(Trace)
        .layer(ExpandEnv::with_lookup(|name| (name == "APPDATA").then(|| "roaming".to_owned())))
        .layer(cache.clone())
        .build();

    let raw = ResourceId::parse("file:///%APPDATA%/app.json").unwrap();
    pipeline.invoke(Request::get(raw.clone())).await.unwrap();
    pipeline.invoke(Request::get(raw)).await.unwrap();

    assert_eq!(log.calls(), vec!["physical GET roaming/app.json -"]);
    let expanded = Request::get(ResourceId::new("file", "roaming/app.json"));
    assert!(cache.get(&cache.key_for(&expanded)).is_some());
}

#[tokio::test]
async fn cancelling_a_request_stops_the_pipeline() {
    let pipeline = Pipeline::builder()
        .controller(Controller::builder()
            .scheme("slow")
            .get(|_req: Request, cancel: CancellationToken| async move {
                cancel.cancelled().await;
                Ok::<_, Error>("too late")
            })
            .build())
        .layer(Trace)
        .layer(Cache::builder().build())
        .build();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = pipeline
        .invoke_with(Request::get(ResourceId::new("slow", "x")), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}
