//! Async caching orchestrator
//!
//! Mirrors `CachingExec` over `AsyncTransport` and `AsyncCacheStorage`;
//! every branch after a transport call is chosen by the shared `Outcome`. The configured `request_timeout` bounds the whole
//! orchestrated request; dropping the future cancels the transport call.

use std::sync::Arc;

use http::StatusCode;

use super::decision::{Decision, ExecCore, Outcome, Route, StorePlan, clone_request};
use super::{CacheState, CacheStatus};
use crate::cache::{
    AsyncCacheInvalidator, AsyncCacheStorage, AsyncCacheStorageExt, CacheEntry, CacheKey, CacheStats,
};
use crate::config::CacheConfig;
use crate::error::{self, Result};
use crate::http::{CacheControl, HttpRequest, HttpResponse};
use crate::transport::{AsyncTransport, Target};

/// RFC 7234 cache in front of an `AsyncTransport`
pub struct AsyncCachingExec<T> {
    pub(super) core: ExecCore,
    pub(super) transport: T,
    pub(super) storage: Arc<dyn AsyncCacheStorage>,
    pub(super) invalidator: AsyncCacheInvalidator,
}

impl<T> std::fmt::Debug for AsyncCachingExec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncCachingExec")
            .field("config", &self.core.config)
            .finish_non_exhaustive()
    }
}

impl<T: AsyncTransport> AsyncCachingExec<T> {
    /// Start building an exec around `transport`
    pub fn builder(transport: T) -> super::AsyncCachingExecBuilder<T> {
        super::AsyncCachingExecBuilder::new(transport)
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.core.config
    }

    #[must_use]
    pub fn stats(&self) -> &CacheStats {
        self.core.stats()
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn AsyncCacheStorage> {
        &self.storage
    }

    /// Run `request` through the cache, bounded by `request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns the transport error when the origin could not be reached, or
    /// a timeout error when the configured limit elapsed first.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        match self.core.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.orchestrate(request))
                .await
                .map_err(|_| {
                    tracing::debug!(target: "quyc_cache::exec", timeout_ms = limit.as_millis() as u64, "Cached request timed out");
                    error::timeout()
                })?,
            None => self.orchestrate(request).await,
        }
    }

    async fn orchestrate(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.core.transition(CacheState::Start, &request);

        match self.core.route(&request) {
            Route::Passthrough => {
                let response = self.call(request).await?;
                Ok(self.core.finish(response, CacheStatus::Passthrough))
            }
            Route::Invalidate => {
                let probe = clone_request(&request);
                self.invalidator.on_request(&request).await;
                let response = self.call(request).await?;
                self.invalidator.on_response(&probe, &response).await;
                Ok(self.core.finish(response, CacheStatus::Passthrough))
            }
            Route::Forward(key) => {
                let probe = clone_request(&request);
                let request_date = self.core.now();
                let response = self.call(request).await?;
                let response_date = self.core.now();
                if response.status() != StatusCode::NOT_MODIFIED {
                    self.store(&key, &probe, &response, request_date, response_date).await;
                }
                Ok(self.core.finish(response, CacheStatus::Miss))
            }
            Route::Lookup(key) => self.lookup(&key, request).await,
        }
    }

    async fn call(&self, request: HttpRequest) -> Result<HttpResponse> {
        let target = Target::from_request(&request)?;
        self.transport.execute(&target, request).await
    }

    async fn lookup(&self, root_key: &CacheKey, request: HttpRequest) -> Result<HttpResponse> {
        self.core.transition(CacheState::Lookup, &request);
        let request_cc = CacheControl::parse(request.headers());

        let found = match self.read_entry(root_key, &request).await {
            Ok(found) => found,
            Err(err) => {
                self.core.storage_failed(root_key, "lookup", &err);
                let response = self.call(request).await?;
                return Ok(self.core.finish(response, CacheStatus::Failure));
            }
        };

        let Some((entry_key, entry)) = found else {
            if request_cc.only_if_cached() {
                return Ok(self.core.finish(self.core.gateway_timeout(), CacheStatus::Failure));
            }
            return self.fetch(root_key, request, None).await;
        };

        let now = self.core.now();
        match self.core.decide(&entry, &request_cc, now) {
            Decision::Serve { stale } => {
                self.core.transition(CacheState::HitFresh, &request);
                let response = self.core.hit_response(&entry, now, stale);
                Ok(self.core.finish(response, CacheStatus::Hit))
            }
            Decision::Unsatisfiable => {
                Ok(self.core.finish(self.core.gateway_timeout(), CacheStatus::Failure))
            }
            Decision::Refetch => self.fetch(root_key, request, Some(entry)).await,
            Decision::Revalidate => self.revalidate(root_key, &entry_key, entry, request).await,
        }
    }

    /// Root entry, then the variant it selects for `request`
    async fn read_entry(
        &self,
        root_key: &CacheKey,
        request: &HttpRequest,
    ) -> Result<Option<(CacheKey, Arc<CacheEntry>)>> {
        let Some(root) = self.read(root_key).await? else {
            return Ok(None);
        };
        match self.core.variant_key(root_key, &root, request) {
            None => Ok(Some((root_key.clone(), root))),
            Some(variant_key) => Ok(self.read(&variant_key).await?.map(|entry| (variant_key, entry))),
        }
    }

    async fn read(&self, key: &CacheKey) -> Result<Option<Arc<CacheEntry>>> {
        match self.storage.get(key.clone()).await {
            Ok(Some(entry)) => Ok(self.core.usable(key, entry)),
            Ok(None) => Ok(None),
            Err(err) if err.is_malformed_entry() => {
                tracing::debug!(target: "quyc_cache::exec", key = %key, error = %err, "Treating malformed entry as absent");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Unconditional origin fetch; `stale` may stand in if the origin fails
    async fn fetch(
        &self,
        root_key: &CacheKey,
        request: HttpRequest,
        stale: Option<Arc<CacheEntry>>,
    ) -> Result<HttpResponse> {
        self.core.transition(CacheState::Miss, &request);
        let request_cc = CacheControl::parse(request.headers());
        let probe = clone_request(&request);
        let request_date = self.core.now();
        let result = self.call(request).await;
        let response_date = self.core.now();

        let outcome = self.core.fetch_outcome(
            stale.as_deref(),
            &request_cc,
            result.as_ref().ok(),
            response_date,
        );
        match (outcome, result, stale) {
            (Outcome::ServeStale, result, Some(entry)) => {
                if let Err(err) = result {
                    tracing::debug!(target: "quyc_cache::exec", key = %root_key, error = %err, "Serving stale entry after transport failure");
                }
                let stale_response = self.core.stale_response(&entry, response_date);
                Ok(self.core.finish(stale_response, CacheStatus::StaleServed))
            }
            (_, Ok(response), _) => {
                self.store(root_key, &probe, &response, request_date, response_date)
                    .await;
                Ok(self.core.finish(response, CacheStatus::Miss))
            }
            (_, Err(err), _) => Err(err),
        }
    }

    async fn revalidate(
        &self,
        root_key: &CacheKey,
        entry_key: &CacheKey,
        entry: Arc<CacheEntry>,
        request: HttpRequest,
    ) -> Result<HttpResponse> {
        self.core.transition(CacheState::HitStale, &request);
        let request_cc = CacheControl::parse(request.headers());
        let conditional = self.core.conditional_request(&request, &entry);

        self.core.transition(CacheState::Revalidate, &request);
        let request_date = self.core.now();
        let result = self.call(conditional).await;
        let response_date = self.core.now();

        let outcome =
            self.core
                .revalidation_outcome(&entry, &request_cc, result.as_ref().ok(), response_date);
        let response = match (outcome, result) {
            (Outcome::ServeStale, result) => {
                if let Err(err) = result {
                    tracing::debug!(target: "quyc_cache::exec", key = %entry_key, error = %err, "Revalidation failed, serving stale entry");
                }
                let stale_response = self.core.stale_response(&entry, response_date);
                return Ok(self.core.finish(stale_response, CacheStatus::StaleServed));
            }
            (Outcome::Refetch, _) => return self.fetch(root_key, request, Some(entry)).await,
            (_, Err(err)) => return Err(err),
            (_, Ok(response)) => response,
        };

        if outcome == Outcome::Store {
            self.store(root_key, &request, &response, request_date, response_date)
                .await;
            return Ok(self.core.finish(response, CacheStatus::Miss));
        }

        let entry_date = self.core.now();
        let refreshed =
            entry.update_from_not_modified(&response, request_date, response_date, entry_date);
        let operation =
            self.core.refresh_operation(&response, request_date, response_date, entry_date);

        match self
            .storage
            .update_with_retries(entry_key.clone(), operation, self.core.config.max_update_retries)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_storage_contention() => {
                self.core.storage_failed(entry_key, "refresh", &err);
                return self.fetch(root_key, request, None).await;
            }
            Err(err) => self.core.storage_failed(entry_key, "refresh", &err),
        }

        let served = self.core.hit_response(&refreshed, self.core.now(), false);
        Ok(self.core.finish(served, CacheStatus::Validated))
    }

    /// Best-effort write; failures are logged and counted only
    async fn store(
        &self,
        root_key: &CacheKey,
        request: &HttpRequest,
        response: &HttpResponse,
        request_date: std::time::SystemTime,
        response_date: std::time::SystemTime,
    ) {
        let Some(plan) = self
            .core
            .plan_store(root_key, request, response, request_date, response_date)
        else {
            return;
        };
        let StorePlan {
            variant,
            root_key,
            root_update,
            displaced,
        } = plan;

        if let Some((variant_key, entry)) = variant {
            if let Err(err) = self.storage.put(variant_key.clone(), entry).await {
                self.core.storage_failed(&variant_key, "store", &err);
                return;
            }
        }

        if let Err(err) = self
            .storage
            .update_with_retries(root_key.clone(), root_update, self.core.config.max_update_retries)
            .await
        {
            self.core.storage_failed(&root_key, "store", &err);
            return;
        }

        for orphan in displaced.keys(&root_key) {
            if let Err(err) = self.storage.remove(orphan.clone()).await {
                self.core.storage_failed(&orphan, "store", &err);
            }
        }
    }
}
