// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Acquisition pipeline: turns a document reference into a local file the
// adapters can print, and derives a reshaped copy when the print options ask
// for one.
//
// Every file this stage creates is registered with an `ArtifactSet` owned by
// the returned `AcquiredDocument`; dropping the document removes them, so
// cleanup happens on every exit path. Files supplied by the caller are never
// registered and never deleted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use kioskprint_core::config::EngineConfig;
use kioskprint_core::error::{AcquisitionError, KioskError, Result};
use kioskprint_core::types::{MediaKind, PrintOptions, extension_of};
use kioskprint_document::DocumentTransformer;
use kioskprint_document::integrity::hash_file;

use crate::fetch::{DocumentFetcher, FetchError, redact};
use crate::retry::{RetryConfig, RetryDecision, should_retry};

// ---------------------------------------------------------------------------
// Scratch files
// ---------------------------------------------------------------------------

/// A collision-resistant path inside `work_dir`, keeping a sane extension.
pub fn scratch_path(work_dir: &Path, extension: Option<&str>) -> PathBuf {
    let mut name = Uuid::new_v4().to_string();
    if let Some(ext) = extension
        .map(str::trim)
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        name.push('.');
        name.push_str(&ext.to_ascii_lowercase());
    }
    // Some producers hand over directories with stray whitespace.
    PathBuf::from(work_dir.to_string_lossy().trim()).join(name)
}

/// Files created on behalf of one job, removed when the set is dropped.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    paths: Vec<PathBuf>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path` for removal and hand it back.
    pub fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "artifact removed"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(path = %path.display(), error = %err, "failed to remove artifact"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Acquired document
// ---------------------------------------------------------------------------

/// A document available on local disk, ready for dispatch.
#[derive(Debug)]
pub struct AcquiredDocument {
    /// The original as fetched or as supplied by the caller.
    pub source: PathBuf,
    /// Derived document, when the options required reshaping.
    pub derived: Option<PathBuf>,
    pub media_kind: MediaKind,
    /// SHA-256 of the source bytes.
    pub document_hash: String,
    /// Pages that will print, when known.
    pub total_pages: Option<u32>,
    artifacts: ArtifactSet,
}

impl AcquiredDocument {
    /// The file the adapters should print.
    pub fn dispatch_path(&self) -> &Path {
        self.derived.as_deref().unwrap_or(&self.source)
    }

    /// Files that will be removed when this document is dropped.
    pub fn artifacts(&self) -> &[PathBuf] {
        self.artifacts.paths()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct AcquisitionPipeline {
    fetcher: Arc<dyn DocumentFetcher>,
    transformer: Arc<dyn DocumentTransformer>,
    work_dir: PathBuf,
    retry: RetryConfig,
    attempt_timeout: Duration,
}

impl AcquisitionPipeline {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        transformer: Arc<dyn DocumentTransformer>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            fetcher,
            transformer,
            work_dir: config.work_dir.clone(),
            retry: RetryConfig::from(&config.fetch),
            attempt_timeout: config.fetch.attempt_timeout(),
        }
    }

    pub fn is_remote(document_ref: &str) -> bool {
        let lower = document_ref.trim().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Fetch (or locate) the document and derive a reshaped copy if needed.
    pub async fn acquire(
        &self,
        document_ref: &str,
        media_kind: MediaKind,
        options: &PrintOptions,
    ) -> Result<AcquiredDocument> {
        let mut document = self.locate(document_ref, media_kind).await?;
        self.prepare(&mut document, options).await?;
        Ok(document)
    }

    /// Make the document available locally, fingerprint it and count pages.
    #[instrument(skip(self), fields(document = %redact(document_ref.trim())))]
    pub async fn locate(&self, document_ref: &str, media_kind: MediaKind) -> Result<AcquiredDocument> {
        let document_ref = document_ref.trim();
        let mut artifacts = ArtifactSet::new();

        let source = if Self::is_remote(document_ref) {
            let bytes = self.fetch_with_retry(document_ref).await?;
            tokio::fs::create_dir_all(&self.work_dir).await?;
            let target = artifacts.track(scratch_path(&self.work_dir, extension_of(document_ref)));
            tokio::fs::write(&target, &bytes).await?;
            info!(path = %target.display(), bytes = bytes.len(), "document downloaded");
            target
        } else {
            let path = PathBuf::from(document_ref);
            let metadata = tokio::fs::metadata(&path).await?;
            if !metadata.is_file() {
                return Err(KioskError::Validation(format!(
                    "document is not a file: {}",
                    path.display()
                )));
            }
            path
        };

        let document_hash = {
            let path = source.clone();
            blocking(move || hash_file(&path)).await?
        };

        let total_pages = match media_kind {
            MediaKind::PagedDocument => Some(self.page_count(&source).await?),
            MediaKind::Image => Some(1),
            MediaKind::OfficeDocument | MediaKind::Other => None,
        };

        Ok(AcquiredDocument {
            source,
            derived: None,
            media_kind,
            document_hash,
            total_pages,
            artifacts,
        })
    }

    /// Produce the derived document when the options reshape a paged
    /// document. Other media kinds are dispatched as they are.
    #[instrument(skip_all, fields(source = %document.source.display()))]
    pub async fn prepare(&self, document: &mut AcquiredDocument, options: &PrintOptions) -> Result<()> {
        if document.media_kind != MediaKind::PagedDocument || !options.needs_transform() {
            return Ok(());
        }

        let transformer = Arc::clone(&self.transformer);
        let source = document.source.clone();
        let page_options = options.page_options();
        let bytes = blocking(move || transformer.transform(&source, &page_options)).await?;

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let derived = document
            .artifacts
            .track(scratch_path(&self.work_dir, Some("pdf")));
        tokio::fs::write(&derived, &bytes).await?;

        document.total_pages = Some(self.page_count(&derived).await?);
        debug!(derived = %derived.display(), pages = ?document.total_pages, "derived document written");
        document.derived = Some(derived);
        Ok(())
    }

    async fn page_count(&self, path: &Path) -> Result<u32> {
        let transformer = Arc::clone(&self.transformer);
        let path = path.to_path_buf();
        blocking(move || transformer.page_count(&path)).await
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(url, self.attempt_timeout).await {
                Ok(bytes) => return Ok(bytes),
                Err(err) => match should_retry(&err, attempt, &self.retry) {
                    RetryDecision::RetryAfter(delay) => {
                        warn!(attempt, error = %err, "fetch failed, retrying");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        return Err(AcquisitionError::AuthExpired(err.to_string()).into());
                    }
                    RetryDecision::Exhausted => {
                        if let FetchError::Timeout(limit) = &err {
                            return Err(KioskError::Timeout {
                                operation: "downloading document".into(),
                                seconds: limit.as_secs(),
                            });
                        }
                        return Err(AcquisitionError::Transient(format!(
                            "{err} (after {} attempts)",
                            attempt + 1
                        ))
                        .into());
                    }
                },
            }
        }
    }
}

async fn blocking<T, F>(op: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| KioskError::Internal(format!("blocking task failed: {e}")))?
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted collaborators for pipeline and engine tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use kioskprint_core::types::PageOptions;

    use super::*;
    use crate::fetch::FetchError;

    /// Replays queued results; the last one repeats once the queue drains.
    pub struct ScriptedFetcher {
        results: Mutex<VecDeque<std::result::Result<Vec<u8>, FetchError>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        pub fn new(results: Vec<std::result::Result<Vec<u8>, FetchError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DocumentFetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str, _timeout: Duration) -> std::result::Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.pop_front().unwrap()
            } else {
                results.front().cloned().unwrap()
            }
        }
    }

    /// Counts pages as the number of bytes, and "derives" by keeping the
    /// first N bytes where N is the number of selected pages.
    pub struct ByteTransformer;

    impl DocumentTransformer for ByteTransformer {
        fn page_count(&self, path: &Path) -> Result<u32> {
            Ok(std::fs::read(path)?.len() as u32)
        }

        fn transform(&self, path: &Path, options: &PageOptions) -> Result<Vec<u8>> {
            let bytes = std::fs::read(path)?;
            let pages = kioskprint_document::select_pages(&options.selection, bytes.len() as u32)?;
            Ok(pages.iter().map(|p| bytes[*p as usize - 1]).collect())
        }
    }

    pub fn config(work_dir: &Path) -> EngineConfig {
        let mut config = EngineConfig {
            work_dir: work_dir.to_path_buf(),
            ..Default::default()
        };
        config.fetch.backoff_ms = 1;
        config
    }
}
