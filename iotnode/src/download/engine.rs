//! The download engine: fetch a registered resource into the cache.
//!
//! Transfers stream into `<key>.partial` and are renamed into place on
//! success, so a cache file is never observed half-written. An interrupted
//! fresh transfer keeps its partial file and the next attempt resumes with a
//! `Range` request; a failure on a resumed request discards the partial.

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use filetime::FileTime;
use futures::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::active::{ActiveDownloads, InFlight, Registration};
use super::config::DownloadConfig;
use super::error::DownloadError;
use super::pool::{DownloadPools, Pool};
use crate::cache::{AccessLog, CacheDir, TrimRunner};
use crate::http::{ByteRange, HttpFetcher, HttpResponse, NetError};
use crate::store::{filename_from_url, ResourceKind, ResourceStore};

/// Result shared with every caller of a coalesced fetch.
pub type FetchResult = Result<DownloadSummary, DownloadError>;

/// A completed fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub key: String,
    /// Final size of the cache file
    pub bytes: u64,
    /// Bytes received over the network by the successful attempt
    pub transferred: u64,
    /// Whether the successful attempt continued a partial file
    pub resumed: bool,
    /// Attempts made, zero if the file was already cached
    pub attempts: u32,
}

/// What a call to [`DownloadEngine::fetch`] did.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Already in the cache; nothing was transferred.
    Cached,
    Downloaded(DownloadSummary),
    /// Another fetch of the same key is running.
    InProgress(InFlight),
    Failed(DownloadError),
}

impl FetchOutcome {
    /// Whether the content is now in the cache.
    pub fn is_ready(&self) -> bool {
        matches!(self, FetchOutcome::Cached | FetchOutcome::Downloaded(_))
    }

    /// Wait for an in-progress fetch to end; other outcomes pass through.
    pub async fn settle(self) -> FetchOutcome {
        match self {
            FetchOutcome::InProgress(in_flight) => match in_flight.wait().await {
                Some(Ok(summary)) if summary.attempts == 0 => FetchOutcome::Cached,
                Some(Ok(summary)) => FetchOutcome::Downloaded(summary),
                Some(Err(e)) => FetchOutcome::Failed(e),
                None => FetchOutcome::Failed(DownloadError::Cancelled),
            },
            other => other,
        }
    }
}

struct Transfer {
    bytes: u64,
    transferred: u64,
    resumed: bool,
}

/// Fetches registered resources into the cache directory.
pub struct DownloadEngine<H: HttpFetcher> {
    http: Arc<H>,
    cache: CacheDir,
    resources: Arc<ResourceStore>,
    pools: DownloadPools,
    active: Arc<ActiveDownloads>,
    config: DownloadConfig,
    trim: Option<Arc<TrimRunner>>,
    access: Option<Arc<AccessLog>>,
    shutdown: CancellationToken,
}

impl<H: HttpFetcher> DownloadEngine<H> {
    pub fn new(
        http: Arc<H>,
        cache: CacheDir,
        resources: Arc<ResourceStore>,
        config: DownloadConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            http,
            cache,
            resources,
            pools: DownloadPools::from_config(&config),
            active: Arc::new(ActiveDownloads::new()),
            config,
            trim: None,
            access: None,
            shutdown,
        }
    }

    /// Run a trim pass after every successful download.
    pub fn with_trim(mut self, trim: Arc<TrimRunner>) -> Self {
        self.trim = Some(trim);
        self
    }

    /// Record fetches as uses for LRU eviction.
    pub fn with_access_log(mut self, access: Arc<AccessLog>) -> Self {
        self.access = Some(access);
        self
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheDir {
        &self.cache
    }

    pub fn active(&self) -> &Arc<ActiveDownloads> {
        &self.active
    }

    pub fn pools(&self) -> &DownloadPools {
        &self.pools
    }

    /// Ensure `key` is in the cache.
    pub async fn fetch(&self, key: &str, pool: Pool) -> FetchOutcome {
        if !CacheDir::is_valid_key(key) {
            return FetchOutcome::Failed(DownloadError::InvalidKey(key.to_string()));
        }

        let guard = match self.active.register(key) {
            Registration::New(guard) => guard,
            Registration::Joined(in_flight) => return FetchOutcome::InProgress(in_flight),
        };

        if let Some(bytes) = self.cached_size(key) {
            self.record_use(key);
            guard.finish(Ok(DownloadSummary {
                key: key.to_string(),
                bytes,
                transferred: 0,
                resumed: false,
                attempts: 0,
            }));
            return FetchOutcome::Cached;
        }

        let result = self.download(key, pool).await;
        guard.finish(result.clone());

        match result {
            Ok(summary) => {
                self.record_use(key);
                if let Some(trim) = &self.trim {
                    drop(trim.spawn_pass());
                }
                FetchOutcome::Downloaded(summary)
            }
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    /// Register `url` under its basename as content and fetch it.
    pub async fn fetch_url(&self, url: &str, pool: Pool) -> FetchOutcome {
        let Some(key) = filename_from_url(url) else {
            return FetchOutcome::Failed(DownloadError::InvalidKey(url.to_string()));
        };

        let kind = match self.resources.get(&key) {
            Ok(existing) => existing
                .and_then(|r| r.kind)
                .unwrap_or(ResourceKind::Content),
            Err(e) => return FetchOutcome::Failed(DownloadError::Store(e.to_string())),
        };
        if let Err(e) = self.resources.insert(&key, Some(url), kind) {
            return FetchOutcome::Failed(DownloadError::Store(e.to_string()));
        }

        self.fetch(&key, pool).await
    }

    fn cached_size(&self, key: &str) -> Option<u64> {
        match self.cache.touch(key) {
            Ok(true) => std::fs::metadata(self.cache.path(key))
                .map(|m| m.len())
                .ok(),
            Ok(false) => None,
            Err(e) => {
                warn!(key = key, error = %e, "Failed to touch cached file");
                self.cache.contains(key).then_some(0)
            }
        }
    }

    fn record_use(&self, key: &str) {
        if let Some(access) = &self.access {
            access.record(key);
        }
    }

    async fn download(&self, key: &str, pool: Pool) -> Result<DownloadSummary, DownloadError> {
        let url = self
            .resources
            .get(key)
            .map_err(|e| DownloadError::Store(e.to_string()))?
            .and_then(|r| r.url)
            .ok_or_else(|| DownloadError::NotRegistered(key.to_string()))?;

        let started = SystemTime::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = {
                let _permit = tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
                    permit = self.pools.acquire(pool) => {
                        permit.map_err(|_| DownloadError::Cancelled)?
                    }
                };
                self.attempt(key, &url, started).await
            };

            match result {
                Ok(transfer) => {
                    info!(
                        key = key,
                        url = %url,
                        bytes = transfer.bytes,
                        transferred = transfer.transferred,
                        resumed = transfer.resumed,
                        attempts = attempt,
                        pool = %pool,
                        "Download complete"
                    );
                    return Ok(DownloadSummary {
                        key: key.to_string(),
                        bytes: transfer.bytes,
                        transferred: transfer.transferred,
                        resumed: transfer.resumed,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    warn!(
                        key = key,
                        url = %url,
                        attempt = attempt,
                        max_attempts = self.config.retries,
                        error = %e,
                        "Download failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
                        _ = tokio::time::sleep(self.config.retry_delay) => {}
                    }
                }
                Err(e) => {
                    warn!(
                        key = key,
                        url = %url,
                        attempts = attempt,
                        transient = e.is_transient(),
                        error = %e,
                        "Download failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(
        &self,
        key: &str,
        url: &str,
        started: SystemTime,
    ) -> Result<Transfer, DownloadError> {
        let partial = self.cache.partial_path(key);
        let offset = fs::metadata(&partial).await.map(|m| m.len()).unwrap_or(0);
        let range = (offset > 0).then(|| ByteRange::from_start(offset));

        let result = self.transfer(key, url, &partial, range, started).await;

        if result.is_err() && range.is_some() {
            debug!(key = key, offset = offset, "Discarding partial after failed resume");
            if let Err(e) = fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %partial.display(), error = %e, "Failed to remove partial file");
                }
            }
        }
        result
    }

    async fn transfer(
        &self,
        key: &str,
        url: &str,
        partial: &Path,
        range: Option<ByteRange>,
        started: SystemTime,
    ) -> Result<Transfer, DownloadError> {
        let network = |source: NetError| DownloadError::Network {
            url: url.to_string(),
            source,
        };

        let HttpResponse {
            status,
            content_length,
            mut body,
        } = self.http.get(url, range).await.map_err(network)?;

        let resumed = match (range, status) {
            (Some(_), 206) => true,
            (_, 200..=299) => false,
            (Some(r), 416) => {
                return Err(DownloadError::ResumeRejected {
                    url: url.to_string(),
                    offset: r.start,
                    status,
                })
            }
            (_, status) => {
                return Err(DownloadError::Status {
                    url: url.to_string(),
                    status,
                })
            }
        };
        if range.is_some() && !resumed {
            debug!(key = key, status = status, "Server ignored range, restarting transfer");
        }

        let mut file = if resumed {
            OpenOptions::new().append(true).open(partial).await
        } else {
            fs::File::create(partial).await
        }
        .map_err(|e| DownloadError::io(partial, e))?;

        let mut transferred = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled),
                next = tokio::time::timeout(self.config.read_timeout, body.next()) => next,
            };
            match next {
                Err(_) => {
                    return Err(DownloadError::Stalled {
                        url: url.to_string(),
                        after: self.config.read_timeout,
                    })
                }
                Ok(None) => break,
                Ok(Some(Err(source))) => return Err(network(source)),
                Ok(Some(Ok(chunk))) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| DownloadError::io(partial, e))?;
                    transferred += chunk.len() as u64;
                }
            }
        }
        file.flush()
            .await
            .map_err(|e| DownloadError::io(partial, e))?;
        drop(file);

        if let Some(expected) = content_length {
            if transferred < expected {
                return Err(network(NetError::Body(format!(
                    "connection closed after {transferred} of {expected} bytes"
                ))));
            }
        }

        let target = self.cache.path(key);
        fs::rename(partial, &target)
            .await
            .map_err(|e| DownloadError::io(&target, e))?;
        filetime::set_file_mtime(&target, FileTime::from_system_time(started))
            .map_err(|e| DownloadError::io(&target, e))?;
        let bytes = fs::metadata(&target)
            .await
            .map_err(|e| DownloadError::io(&target, e))?
            .len();

        Ok(Transfer {
            bytes,
            transferred,
            resumed,
        })
    }
}
