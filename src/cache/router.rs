// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.

//! Cache router: strategy execution and generation lifecycle.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

use super::buckets::{BucketStore, Generation};
use super::fetcher::NetworkFetcher;
use super::request::{classify, PageRequest, PageResponse, Strategy};
use crate::config::SyncConfig;
use crate::metrics;

/// Lifecycle of one cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    /// App-shell population in progress
    Installing,
    /// Shell cached, not yet serving
    Installed,
    /// Sweeping buckets from older generations
    Activating,
    /// Serving requests
    Active,
    /// Superseded by a newer generation
    Redundant,
}

impl std::fmt::Display for GenerationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Activating => "activating",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    /// Network down and no cached copy anywhere, fallback included.
    #[error("offline with no cached copy for {0}")]
    Unreachable(String),
    /// Strict install aborted on a shell resource failure.
    #[error("install failed for {resource}: {reason}")]
    Install { resource: String, reason: String },
    #[error("invalid shell path {0:?}")]
    BadShellPath(String),
}

/// Per-request cache routing over one active generation.
///
/// One router instance corresponds to one deployed version. Deploying a new
/// version means constructing a new router with a bumped `cache_version`,
/// installing it, then activating it; activation sweeps every bucket the new
/// generation does not own.
pub struct CacheRouter {
    buckets: Arc<dyn BucketStore>,
    fetcher: Arc<dyn NetworkFetcher>,
    origin: Url,
    generation: Generation,
    app_shell: Vec<String>,
    offline_fallback: String,
    strict_install: bool,
    state_tx: watch::Sender<GenerationState>,
}

impl CacheRouter {
    pub fn new(
        config: &SyncConfig,
        origin: Url,
        buckets: Arc<dyn BucketStore>,
        fetcher: Arc<dyn NetworkFetcher>,
    ) -> Self {
        let (state_tx, _) = watch::channel(GenerationState::Installing);
        Self {
            buckets,
            fetcher,
            origin,
            generation: Generation::new(&config.cache_prefix, &config.cache_version),
            app_shell: config.app_shell.clone(),
            offline_fallback: config.offline_fallback.clone(),
            strict_install: config.strict_install,
            state_tx,
        }
    }

    #[must_use]
    pub fn state(&self) -> GenerationState {
        *self.state_tx.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<GenerationState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    fn set_state(&self, state: GenerationState) {
        info!(version = %self.generation.version(), %state, "cache generation transition");
        let _ = self.state_tx.send(state);
    }

    fn shell_url(&self, path: &str) -> Result<Url, CacheError> {
        self.origin
            .join(path)
            .map_err(|_| CacheError::BadShellPath(path.to_string()))
    }

    /// Fetch and cache the app shell into the static bucket.
    ///
    /// Tolerant by default: a failed resource is logged and skipped so one
    /// bad path cannot wedge the upgrade. `strict_install` restores
    /// all-or-nothing semantics.
    #[tracing::instrument(skip(self), fields(version = %self.generation.version()))]
    pub async fn install(&self) -> Result<(), CacheError> {
        self.set_state(GenerationState::Installing);
        let bucket = self.generation.static_bucket();

        for path in &self.app_shell {
            let url = self.shell_url(path)?;
            let request = PageRequest::get(url);
            match self.fetcher.fetch(&request).await {
                Ok(response) if response.status < 400 => {
                    self.buckets
                        .put(&bucket, request.cache_key(), response)
                        .await;
                }
                Ok(response) => {
                    self.install_failure(path, &format!("status {}", response.status))?;
                }
                Err(e) => {
                    self.install_failure(path, &e.to_string())?;
                }
            }
        }

        self.set_state(GenerationState::Installed);
        metrics::record_operation("cache", "install", "success");
        Ok(())
    }

    fn install_failure(&self, resource: &str, reason: &str) -> Result<(), CacheError> {
        if self.strict_install {
            metrics::record_operation("cache", "install", "error");
            return Err(CacheError::Install {
                resource: resource.to_string(),
                reason: reason.to_string(),
            });
        }
        warn!(resource, reason, "shell resource skipped during install");
        Ok(())
    }

    /// Take over serving: delete every bucket this generation does not own,
    /// then go `Active`. Cleanup completes before the state flips so no
    /// request is ever served from a stale generation's bucket.
    #[tracing::instrument(skip(self), fields(version = %self.generation.version()))]
    pub async fn activate(&self) {
        self.set_state(GenerationState::Activating);

        let mut evicted = 0usize;
        for bucket in self.buckets.bucket_names().await {
            if !self.generation.owns(&bucket) {
                if self.buckets.delete_bucket(&bucket).await {
                    info!(bucket, "evicted stale cache bucket");
                    evicted += 1;
                }
            }
        }
        if evicted > 0 {
            metrics::record_buckets_evicted(evicted);
        }

        self.set_state(GenerationState::Active);
    }

    /// Mark this generation as superseded. It stops being the serving
    /// generation; its buckets are swept by the successor's `activate`.
    pub fn retire(&self) {
        self.set_state(GenerationState::Redundant);
    }

    /// Route one intercepted request.
    pub async fn handle(&self, request: &PageRequest) -> Result<PageResponse, CacheError> {
        let strategy = classify(request, &self.origin);
        debug!(url = %request.url, strategy = strategy.label(), "routing request");

        match strategy {
            Strategy::PassThrough => self.pass_through(request).await,
            Strategy::NetworkFirst => self.network_first(request).await,
            Strategy::CacheFirst => self.cache_first(request).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
        }
    }

    async fn pass_through(&self, request: &PageRequest) -> Result<PageResponse, CacheError> {
        self.fetcher
            .fetch(request)
            .await
            .map_err(|e| CacheError::Unreachable(format!("{}: {e}", request.url)))
    }

    /// Try the network, cache a copy on success; on transport failure fall
    /// back to any cached copy, then to the offline shell document.
    async fn network_first(&self, request: &PageRequest) -> Result<PageResponse, CacheError> {
        let key = request.cache_key();

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.buckets
                    .put(&self.generation.dynamic_bucket(), key, response.clone())
                    .await;
                metrics::record_route("network_first", "network");
                Ok(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "network-first falling back to cache");
                if let Some(cached) = self.buckets.lookup_any(key).await {
                    metrics::record_route("network_first", "cache_fallback");
                    return Ok(cached);
                }

                let fallback_url = self.shell_url(&self.offline_fallback)?;
                if let Some(fallback) = self
                    .buckets
                    .lookup(&self.generation.static_bucket(), fallback_url.as_str())
                    .await
                {
                    metrics::record_route("network_first", "offline_fallback");
                    return Ok(fallback);
                }

                metrics::record_route("network_first", "unreachable");
                Err(CacheError::Unreachable(request.url.to_string()))
            }
        }
    }

    /// Serve from cache when present, never touching the network; on a cold
    /// miss fetch once and cache into the dynamic bucket.
    async fn cache_first(&self, request: &PageRequest) -> Result<PageResponse, CacheError> {
        let key = request.cache_key();

        if let Some(cached) = self.buckets.lookup_any(key).await {
            metrics::record_route("cache_first", "hit");
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.buckets
                    .put(&self.generation.dynamic_bucket(), key, response.clone())
                    .await;
                metrics::record_route("cache_first", "miss_filled");
                Ok(response)
            }
            Err(e) => {
                metrics::record_route("cache_first", "unreachable");
                Err(CacheError::Unreachable(format!("{}: {e}", request.url)))
            }
        }
    }

    /// Serve the cached copy immediately and refresh it in the background;
    /// cold misses await the network.
    ///
    /// The read checks the dynamic bucket before the static one:
    /// revalidations land in the dynamic bucket and must shadow an
    /// install-time copy of the same key.
    async fn stale_while_revalidate(
        &self,
        request: &PageRequest,
    ) -> Result<PageResponse, CacheError> {
        let key = request.cache_key();

        let cached = match self
            .buckets
            .lookup(&self.generation.dynamic_bucket(), key)
            .await
        {
            Some(response) => Some(response),
            None => {
                self.buckets
                    .lookup(&self.generation.static_bucket(), key)
                    .await
            }
        };
        if let Some(cached) = cached {
            metrics::record_route("stale_while_revalidate", "hit");
            self.spawn_revalidation(request.clone());
            return Ok(cached);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                self.buckets
                    .put(&self.generation.dynamic_bucket(), key, response.clone())
                    .await;
                metrics::record_route("stale_while_revalidate", "miss_filled");
                Ok(response)
            }
            Err(e) => {
                metrics::record_route("stale_while_revalidate", "unreachable");
                Err(CacheError::Unreachable(format!("{}: {e}", request.url)))
            }
        }
    }

    /// Detached refresh. The caller already has its response; failures here
    /// only mean the cached copy stays stale until the next hit.
    fn spawn_revalidation(&self, request: PageRequest) {
        let fetcher = self.fetcher.clone();
        let buckets = self.buckets.clone();
        let bucket = self.generation.dynamic_bucket();

        tokio::spawn(async move {
            match fetcher.fetch(&request).await {
                Ok(response) => {
                    buckets.put(&bucket, request.cache_key(), response).await;
                    metrics::record_route("stale_while_revalidate", "revalidated");
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "background revalidation failed");
                }
            }
        });
    }
}
