#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{Method, StatusCode};
use quyc_cache::cache::storage::Versioned;
use quyc_cache::http::fmt_http_date;
use quyc_cache::prelude::*;

pub const T0: u64 = 1_700_000_000;

pub fn at(offset: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(T0 + offset)
}

pub fn http_date(offset: u64) -> String {
    fmt_http_date(at(offset))
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(at(0)))
}

pub fn request(method: Method, uri: &str, headers: &[(&str, &str)]) -> HttpRequest {
    let mut builder = http::Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Bytes::new()).expect("valid test request")
}

pub fn get(uri: &str) -> HttpRequest {
    request(Method::GET, uri, &[])
}

pub fn response(status: u16, headers: &[(&str, &str)], body: &'static str) -> HttpResponse {
    let mut builder = http::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder
        .body(Bytes::from_static(body.as_bytes()))
        .expect("valid test response")
}

pub fn ok(headers: &[(&str, &str)], body: &'static str) -> HttpResponse {
    response(200, headers, body)
}

pub fn not_modified(headers: &[(&str, &str)]) -> HttpResponse {
    response(StatusCode::NOT_MODIFIED.as_u16(), headers, "")
}

/// Transport replaying queued outcomes and recording every request it sees
#[derive(Default)]
pub struct ScriptedTransport {
    outcomes: Mutex<VecDeque<quyc_cache::Result<HttpResponse>>>,
    seen: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, response: HttpResponse) {
        self.outcomes.lock().unwrap().push_back(Ok(response));
    }

    pub fn fail(&self, message: &'static str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(quyc_cache::error::transport(message)));
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last_request_header(&self, name: &str) -> Option<String> {
        self.seen
            .lock()
            .unwrap()
            .last()
            .and_then(|request| request.headers().get(name))
            .map(|value| value.to_str().unwrap().to_string())
    }

    fn next(&self, request: HttpRequest) -> quyc_cache::Result<HttpResponse> {
        self.seen.lock().unwrap().push(request);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected transport call")
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, _target: &Target, request: HttpRequest) -> quyc_cache::Result<HttpResponse> {
        self.next(request)
    }
}

impl AsyncTransport for ScriptedTransport {
    fn execute(
        &self,
        _target: &Target,
        request: HttpRequest,
    ) -> impl Future<Output = quyc_cache::Result<HttpResponse>> + Send {
        let outcome = self.next(request);
        async move { outcome }
    }
}

pub fn status(response: &HttpResponse) -> CacheStatus {
    CacheStatus::of(response).expect("orchestrated responses carry a cache status")
}

/// Memory storage whose commits can be made to always conflict
pub struct ContendedStorage {
    pub inner: MemoryCacheStorage,
    pub contend: AtomicBool,
    pub commits: AtomicU32,
}

impl ContendedStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCacheStorage::default(),
            contend: AtomicBool::new(false),
            commits: AtomicU32::new(0),
        })
    }
}

impl CacheStorage for ContendedStorage {
    fn put(&self, key: &CacheKey, entry: CacheEntry) -> quyc_cache::Result<()> {
        self.inner.put(key, entry)
    }

    fn get(&self, key: &CacheKey) -> quyc_cache::Result<Option<Arc<CacheEntry>>> {
        self.inner.get(key)
    }

    fn remove(&self, key: &CacheKey) -> quyc_cache::Result<()> {
        self.inner.remove(key)
    }

    fn get_versioned(&self, key: &CacheKey) -> quyc_cache::Result<Option<Versioned>> {
        self.inner.get_versioned(key)
    }

    fn compare_and_swap(
        &self,
        key: &CacheKey,
        expected: Option<u64>,
        new: Option<CacheEntry>,
    ) -> quyc_cache::Result<bool> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.contend.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.inner.compare_and_swap(key, expected, new)
    }

    fn max_update_retries(&self) -> u32 {
        2
    }
}
