mod common;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use common::*;
use futures::future::join_all;
use http::Method;
use quyc_cache::prelude::*;

const DOC: &str = "https://example.com/doc";

fn async_exec(
    transport: &Arc<ScriptedTransport>,
    clock: &Arc<ManualClock>,
) -> AsyncCachingExec<Arc<ScriptedTransport>> {
    AsyncCachingExec::builder(Arc::clone(transport))
        .clock(clock.clone())
        .build()
        .expect("valid cache configuration")
}

#[tokio::test]
async fn test_async_fresh_hit_and_revalidation() {
    let transport = ScriptedTransport::new();
    let clock = manual_clock();
    let exec = async_exec(&transport, &clock);

    transport.respond(ok(
        &[
            ("date", http_date(0).as_str()),
            ("cache-control", "max-age=60"),
            ("etag", "\"v1\""),
        ],
        "hello",
    ));
    let first = exec.execute(get(DOC)).await.unwrap();
    assert_eq!(status(&first), CacheStatus::Miss);

    clock.advance(Duration::from_secs(10));
    let hit = exec.execute(get(DOC)).await.unwrap();
    assert_eq!(status(&hit), CacheStatus::Hit);
    assert_eq!(hit.headers()["age"], "10");

    clock.advance(Duration::from_secs(100));
    transport.respond(not_modified(&[("date", http_date(110).as_str()), ("etag", "\"v1\"")]));
    let validated = exec.execute(get(DOC)).await.unwrap();
    assert_eq!(status(&validated), CacheStatus::Validated);
    assert_eq!(validated.body(), &Bytes::from_static(b"hello"));
    assert_eq!(validated.headers()["age"], "0");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_async_unsafe_request_invalidates() {
    let transport = ScriptedTransport::new();
    let exec = async_exec(&transport, &manual_clock());

    transport.respond(ok(&[("cache-control", "max-age=3600")], "v1"));
    exec.execute(get(DOC)).await.unwrap();

    transport.respond(response(200, &[], ""));
    exec.execute(request(Method::PUT, DOC, &[])).await.unwrap();

    transport.respond(ok(&[("cache-control", "max-age=3600")], "v2"));
    let after = exec.execute(get(DOC)).await.unwrap();
    assert_eq!(status(&after), CacheStatus::Miss);
    assert_eq!(after.body(), &Bytes::from_static(b"v2"));
}

#[tokio::test]
async fn test_async_stale_if_error() {
    let transport = ScriptedTransport::new();
    let clock = manual_clock();
    let exec = async_exec(&transport, &clock);

    transport.respond(ok(
        &[("cache-control", "max-age=1, stale-if-error=60"), ("etag", "\"v1\"")],
        "hello",
    ));
    exec.execute(get(DOC)).await.unwrap();

    clock.advance(Duration::from_secs(30));
    transport.fail("connection reset");
    let served = exec.execute(get(DOC)).await.unwrap();
    assert_eq!(status(&served), CacheStatus::StaleServed);

    clock.advance(Duration::from_secs(60));
    transport.fail("connection reset");
    assert!(exec.execute(get(DOC)).await.unwrap_err().is_transport());
}

#[tokio::test]
async fn test_concurrent_revalidations_all_succeed() {
    const REQUESTS: usize = 8;

    let transport = ScriptedTransport::new();
    let clock = manual_clock();
    let exec = async_exec(&transport, &clock);

    transport.respond(ok(&[("cache-control", "max-age=0"), ("etag", "\"v1\"")], "hello"));
    exec.execute(get(DOC)).await.unwrap();

    clock.advance(Duration::from_secs(5));
    for _ in 0..REQUESTS {
        transport.respond(not_modified(&[("etag", "\"v1\"")]));
    }
    let responses = join_all((0..REQUESTS).map(|_| exec.execute(get(DOC)))).await;

    for response in responses {
        let response = response.unwrap();
        assert_eq!(status(&response), CacheStatus::Validated);
        assert_eq!(response.body(), &Bytes::from_static(b"hello"));
    }
    assert_eq!(exec.stats().snapshot().validations, REQUESTS as u64);
}

/// Transport that never answers within the test's patience
struct SlowTransport;

impl AsyncTransport for SlowTransport {
    fn execute(
        &self,
        _target: &Target,
        _request: HttpRequest,
    ) -> impl Future<Output = quyc_cache::Result<HttpResponse>> + Send {
        async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(ok(&[], "late"))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout_bounds_whole_request() {
    let exec = AsyncCachingExec::builder(SlowTransport)
        .config(CacheConfig::default().with_request_timeout(Duration::from_secs(1)))
        .build()
        .unwrap();

    let err = exec.execute(get(DOC)).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_async_exec_over_custom_storage() {
    let transport = ScriptedTransport::new();
    let adaptor = Arc::new(AsyncCacheStorageAdaptor::new(MemoryCacheStorage::default()));
    let exec = AsyncCachingExec::builder(Arc::clone(&transport))
        .clock(manual_clock())
        .storage(adaptor.clone())
        .build()
        .unwrap();

    transport.respond(ok(
        &[("cache-control", "max-age=60"), ("vary", "Accept-Language")],
        "bonjour",
    ));
    exec.execute(request(Method::GET, DOC, &[("accept-language", "fr")]))
        .await
        .unwrap();
    assert_eq!(adaptor.storage().len(), 2);

    let hit = exec
        .execute(request(Method::GET, DOC, &[("accept-language", "fr")]))
        .await
        .unwrap();
    assert_eq!(status(&hit), CacheStatus::Hit);
}

#[tokio::test]
async fn test_async_configured_retry_budget_reaches_adaptor() {
    let transport = ScriptedTransport::new();
    let clock = manual_clock();
    let storage = ContendedStorage::new();
    let exec = AsyncCachingExec::builder(Arc::clone(&transport))
        .config(CacheConfig::shared().with_max_update_retries(3))
        .clock(clock.clone())
        .storage(Arc::new(AsyncCacheStorageAdaptor::new(Arc::clone(&storage))))
        .build()
        .unwrap();

    transport.respond(ok(&[("cache-control", "max-age=0"), ("etag", "\"v1\"")], "old"));
    exec.execute(get(DOC)).await.unwrap();
    storage.contend.store(true, std::sync::atomic::Ordering::SeqCst);
    storage.commits.store(0, std::sync::atomic::Ordering::SeqCst);

    clock.advance(Duration::from_secs(5));
    transport.respond(not_modified(&[("etag", "\"v1\"")]));
    transport.respond(ok(&[("cache-control", "max-age=0"), ("etag", "\"v1\"")], "new"));
    let response = exec.execute(get(DOC)).await.unwrap();

    assert_eq!(status(&response), CacheStatus::Miss);
    assert_eq!(storage.commits.load(std::sync::atomic::Ordering::SeqCst), 8);
}
