// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Source resolution: turn a job's `pdf_source` into a local cache entry.
//
// `http://` and `https://` sources are downloaded; anything else is treated
// as a local path and copied byte-for-byte.  Every call produces a fresh
// entry, even for a URL seen a moment ago.

use std::fs::File;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use silentprint_core::error::{PrintError, Result};
use silentprint_core::types::{is_remote_source, CacheEntry};

use crate::cache::CacheStore;

/// Largest remote PDF accepted by default.
pub const MAX_DOWNLOAD_BYTES: u64 = 100 * 1024 * 1024;

/// Resolves PDF sources into the cache.
#[derive(Clone)]
pub struct SourceResolver {
    cache: Arc<CacheStore>,
    client: reqwest::Client,
    evict_after_download: bool,
    max_bytes: u64,
}

impl SourceResolver {
    /// Build a resolver with its own HTTP client.
    pub fn new(
        cache: Arc<CacheStore>,
        download_timeout: Duration,
        evict_after_download: bool,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| PrintError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(cache, client, evict_after_download))
    }

    /// Build a resolver around an existing client.
    pub fn with_client(
        cache: Arc<CacheStore>,
        client: reqwest::Client,
        evict_after_download: bool,
    ) -> Self {
        Self {
            cache,
            client,
            evict_after_download,
            max_bytes: MAX_DOWNLOAD_BYTES,
        }
    }

    /// Cap the size of a single download.
    pub fn with_size_limit(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Materialize `source` as a new cache entry.
    pub async fn resolve(&self, source: &str) -> Result<CacheEntry> {
        if is_remote_source(source) {
            self.download(source).await
        } else {
            self.copy_local(source).await
        }
    }

    #[instrument(skip(self))]
    async fn download(&self, url: &str) -> Result<CacheEntry> {
        let failed = |reason: String| PrintError::DownloadFailed {
            url: url.to_owned(),
            reason,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "download rejected by server");
            return Err(failed(format!("HTTP {status}")));
        }
        if let Some(length) = response.content_length().filter(|len| *len > self.max_bytes) {
            warn!(length, limit = self.max_bytes, "download larger than the limit");
            return Err(failed(format!("file is larger than {} bytes", self.max_bytes)));
        }

        // Chunks go straight to the staging file; dropping `staged` on any
        // error below removes the partial download.
        let mut staged = self.cache.stage()?;
        let mut out = tokio::fs::File::from_std(staged.file_mut().try_clone()?);
        let mut body = response.bytes_stream();
        let mut received: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            received += chunk.len() as u64;
            if received > self.max_bytes {
                warn!(received, limit = self.max_bytes, "download exceeded the limit mid-stream");
                return Err(failed(format!("file is larger than {} bytes", self.max_bytes)));
            }
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        drop(out);
        debug!(bytes = received, "download complete");

        let cache = Arc::clone(&self.cache);
        let evict = self.evict_after_download;
        let entry = tokio::task::spawn_blocking(move || cache.commit(staged, evict))
            .await
            .map_err(|e| PrintError::Internal(format!("cache write task failed: {e}")))??;

        info!(path = %entry.path.display(), "remote PDF cached");
        Ok(entry)
    }

    #[instrument(skip(self))]
    async fn copy_local(&self, path: &str) -> Result<CacheEntry> {
        let cache = Arc::clone(&self.cache);
        let source = path.to_owned();

        let entry = tokio::task::spawn_blocking(move || {
            let failed = |source_err: io::Error| PrintError::LocalCopyFailed {
                path: source.clone(),
                source: source_err,
            };

            let mut input = File::open(&source).map_err(failed)?;
            let mut staged = cache.stage()?;
            io::copy(&mut input, staged.file_mut()).map_err(failed)?;
            cache.commit(staged, true)
        })
        .await
        .map_err(|e| PrintError::Internal(format!("cache copy task failed: {e}")))??;

        info!(path = %entry.path.display(), "local PDF cached");
        Ok(entry)
    }
}
