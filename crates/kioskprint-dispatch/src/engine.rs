// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Print engine: accepts submissions and runs each job on its own detached
// worker.
//
// Worker stages and the progress they publish:
//
//   start                           5   Preparing document
//   acquire                        20   Downloading document / Reading document
//   transform (paged, reshaped)    35   Preparing pages
//   dedup check, dispatch          50   Sending to printer
//   each delivered copy        76..95   Printing copy i of n
//   completion                    100   Print job completed
//
// The dedup entry is claimed only when the document is ready to print, so a
// job that never reached the printer (an expired link, say) leaves the
// document name free for an immediate retry.
//
// Any failure publishes progress 0 with status error and a customer-facing
// message. Cancellation is honoured up to the moment dispatch starts.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use kioskprint_core::config::EngineConfig;
use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::human_errors::humanize_error;
use kioskprint_core::types::{
    JobId, JobPatch, JobStatus, MediaKind, PrintJob, PrintOptions, file_name_of,
};
use kioskprint_document::PdfTransformer;

use crate::acquire::AcquisitionPipeline;
use crate::adapters::AdapterRegistry;
use crate::devices::LpstatDirectory;
use crate::dispatcher::FallbackDispatcher;
use crate::fetch::HttpFetcher;
use crate::ledger::JobLedger;
use crate::publisher::ProgressPublisher;
use crate::retry::RetryConfig;
use crate::runner::{ProcessRunner, SystemRunner};
use crate::store::JobStore;

/// How often `wait_until_terminal` re-reads the store.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const COMPLETED_MESSAGE: &str = "Print job completed";

/// A print request as received from the kiosk frontend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Caller-chosen id; a UUID is generated when absent.
    #[serde(default)]
    pub job_id: Option<String>,
    pub document_ref: String,
    /// Display name; defaults to the last path segment of the reference.
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    pub device: String,
    #[serde(default)]
    pub options: PrintOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Clone)]
pub struct PrintEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    ledger: Arc<JobLedger>,
    store: Arc<dyn JobStore>,
    publisher: ProgressPublisher,
    acquisition: AcquisitionPipeline,
    dispatcher: FallbackDispatcher,
    completion_retry: RetryConfig,
}

impl PrintEngine {
    pub fn new(
        ledger: Arc<JobLedger>,
        store: Arc<dyn JobStore>,
        acquisition: AcquisitionPipeline,
        dispatcher: FallbackDispatcher,
        completion_retry: RetryConfig,
    ) -> Self {
        let publisher = ProgressPublisher::new(Arc::clone(&store), Arc::clone(&ledger));
        Self {
            inner: Arc::new(EngineInner {
                ledger,
                store,
                publisher,
                acquisition,
                dispatcher,
                completion_retry,
            }),
        }
    }


    /// Engine wired to the local print system, HTTP fetching and lopdf.
    pub fn system(config: &EngineConfig, store: Arc<dyn JobStore>) -> Result<Self> {
        let runner: Arc<dyn ProcessRunner> = Arc::new(SystemRunner);
        let devices = Arc::new(LpstatDirectory::new(
            Arc::clone(&runner),
            config.dispatch.lpstat_command.clone(),
        ));
        let registry = AdapterRegistry::system(&config.dispatch, config.work_dir.clone(), runner);
        let dispatcher = FallbackDispatcher::new(devices, registry, &config.dispatch);
        let acquisition =
            AcquisitionPipeline::new(Arc::new(HttpFetcher::new()?), Arc::new(PdfTransformer), config);
        let ledger = Arc::new(JobLedger::new(&config.ledger));
        let completion_retry = RetryConfig::from(&config.fetch);
        Ok(Self::new(ledger, store, acquisition, dispatcher, completion_retry))
    }

    pub fn ledger(&self) -> &Arc<JobLedger> {
        &self.inner.ledger
    }

    /// Devices the dispatcher can currently target.
    pub async fn devices(&self) -> Result<Vec<String>> {
        self.inner.dispatcher.list_devices().await
    }

    /// Validate a request, record the pending job and start its worker.
    ///
    /// Returns as soon as the worker is spawned; the job's progress is
    /// observed through the store.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        let inner = &self.inner;
        if inner.ledger.is_shut_down() {
            return Err(KioskError::Internal("engine is shutting down".into()));
        }

        let document_ref = request.document_ref.trim();
        let device = request.device.trim();
        if document_ref.is_empty() {
            return Err(KioskError::Validation("document reference is required".into()));
        }
        if device.is_empty() {
            return Err(KioskError::Validation("device is required".into()));
        }
        if request.options.copies == 0 {
            return Err(KioskError::Validation("copies must be at least 1".into()));
        }

        let media_kind = MediaKind::detect(document_ref, request.content_type.as_deref());
        if !inner.dispatcher.supports(media_kind) {
            return Err(KioskError::UnsupportedMedia(media_kind.as_str().to_string()));
        }

        let job_id = request
            .job_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(JobId::from)
            .unwrap_or_default();

        if inner.ledger.is_completed(&job_id) {
            return Ok(rejected(job_id, "job already completed"));
        }
        if let Some(existing) = inner.store.get(&job_id).await? {
            let reason = match existing.status {
                JobStatus::Completed => "job already completed",
                _ => "job already submitted",
            };
            return Ok(rejected(job_id, reason));
        }

        let document_name = request
            .document_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .or_else(|| file_name_of(document_ref))
            .unwrap_or(document_ref)
            .to_string();

        let job = PrintJob::new(
            job_id.clone(),
            document_ref.to_string(),
            document_name,
            media_kind,
            device.to_string(),
            request.options,
        );
        inner.publisher.create(&job).await?;

        let cancel = inner.ledger.cancel_token(&job_id);
        let span = info_span!("print_job", job_id = %job_id, kind = media_kind.as_str());
        tokio::spawn(Arc::clone(inner).run(job, cancel).instrument(span));

        info!(%job_id, "job accepted");
        Ok(SubmitResponse {
            job_id,
            accepted: true,
            reason: None,
        })
    }

    /// Ask a job to stop. Only effective before dispatch starts.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        self.inner.ledger.request_cancel(job_id)
    }

    /// Durable state of a job, or the ledger's snapshot if the store has
    /// none. A completion the store never accepted is taken from the ledger.
    pub async fn status(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
        let snapshot = self.inner.ledger.snapshot(job_id);
        match (self.inner.store.get(job_id).await?, snapshot) {
            (Some(mut job), Some(snapshot))
                if snapshot.status == JobStatus::Completed && job.status != JobStatus::Completed =>
            {
                job.progress = snapshot.progress;
                job.status = snapshot.status;
                job.status_message = snapshot.status_message;
                job.updated_at = snapshot.updated_at;
                Ok(Some(job))
            }
            (Some(job), _) => Ok(Some(job)),
            (None, snapshot) => Ok(snapshot),
        }
    }

    /// Poll until the job is completed or in error.
    pub async fn wait_until_terminal(&self, job_id: &JobId, timeout: Duration) -> Result<PrintJob> {
        let wait = async {
            loop {
                if let Some(job) = self.status(job_id).await?
                    && job.status.is_terminal()
                {
                    return Ok(job);
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| KioskError::Timeout {
                operation: format!("waiting for job {job_id}"),
                seconds: timeout.as_secs(),
            })?
    }

    /// Stop accepting jobs and cancel every pending worker.
    pub fn shutdown(&self) {
        self.inner.ledger.shutdown();
    }
}

fn rejected(job_id: JobId, reason: &str) -> SubmitResponse {
    info!(%job_id, reason, "submission not accepted");
    SubmitResponse {
        job_id,
        accepted: false,
        reason: Some(reason.to_string()),
    }
}

impl EngineInner {
    async fn run(self: Arc<Self>, job: PrintJob, cancel: CancellationToken) {
        let job_id = job.job_id.clone();
        if let Err(err) = self.process(&job, &cancel).await {
            self.fail(&job_id, &err).await;
        }
        self.ledger.release(&job_id);
    }

    async fn process(&self, job: &PrintJob, cancel: &CancellationToken) -> Result<()> {
        let job_id = &job.job_id;

        checkpoint(cancel)?;
        self.publish(job_id, 5, None, "Preparing document").await;

        let stage = if AcquisitionPipeline::is_remote(&job.document_ref) {
            "Downloading document"
        } else {
            "Reading document"
        };
        self.publish(job_id, 20, None, stage).await;
        let mut document = cancellable(
            cancel,
            self.acquisition.locate(&job.document_ref, job.media_kind),
        )
        .await?;
        self.publisher
            .annotate(
                job_id,
                JobPatch {
                    document_hash: Some(document.document_hash.clone()),
                    total_pages: document.total_pages,
                    ..Default::default()
                },
            )
            .await;

        if job.media_kind == MediaKind::PagedDocument && job.options.needs_transform() {
            self.publish(job_id, 35, None, "Preparing pages").await;
            cancellable(cancel, self.acquisition.prepare(&mut document, &job.options)).await?;
            self.publisher
                .annotate(
                    job_id,
                    JobPatch {
                        total_pages: document.total_pages,
                        ..Default::default()
                    },
                )
                .await;
        }

        checkpoint(cancel)?;
        if self.ledger.is_duplicate(job_id, &job.document_name) {
            self.publish(job_id, 0, Some(JobStatus::Error), "Duplicate submission ignored")
                .await;
            return Ok(());
        }
        self.publish(job_id, 50, None, "Sending to printer").await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatch = self.dispatcher.dispatch(
            document.dispatch_path(),
            job.media_kind,
            &job.device,
            &job.options,
            Some(tx),
        );
        let forward = async {
            while let Some(update) = rx.recv().await {
                let copies = update.copies.max(1);
                let progress = 75 + (20 * update.delivered).div_ceil(copies);
                let message = format!("Printing copy {} of {}", update.delivered, copies);
                self.publish(job_id, progress as i32, None, &message).await;
            }
        };
        let (outcome, ()) = tokio::join!(dispatch, forward);
        let outcome = outcome?;
        drop(document);

        self.publisher
            .annotate(
                job_id,
                JobPatch {
                    dispatch_method: Some(outcome.method.clone()),
                    ..Default::default()
                },
            )
            .await;

        self.record_completion(job_id, &outcome.method).await;
        Ok(())
    }

    /// Publish completion, retrying failed writes. Paper has already come
    /// out, so if the store never accepts it the ledger still reports the
    /// job as completed and refuses to run it again.
    async fn record_completion(&self, job_id: &JobId, method: &str) {
        let retry = &self.completion_retry;
        let mut attempt = 0;
        loop {
            let result = self
                .publisher
                .publish(job_id, 100, Some(JobStatus::Completed), Some(COMPLETED_MESSAGE))
                .await;
            let err = match result {
                Ok(()) => return,
                Err(err) => err,
            };
            if attempt >= retry.max_retries {
                error!(
                    %job_id,
                    %method,
                    attempts = attempt + 1,
                    error = %err,
                    "job printed but completion was not recorded"
                );
                self.ledger.mark_completed(job_id);
                self.ledger
                    .apply_progress(job_id, 100, JobStatus::Completed, Some(COMPLETED_MESSAGE));
                return;
            }
            warn!(%job_id, attempt, error = %err, "completion not recorded, retrying");
            tokio::time::sleep(retry.delay).await;
            attempt += 1;
        }
    }

    async fn publish(&self, job_id: &JobId, progress: i32, status: Option<JobStatus>, message: &str) {
        if let Err(err) = self.publisher.publish(job_id, progress, status, Some(message)).await {
            warn!(%job_id, error = %err, "progress not published");
        }
    }

    async fn fail(&self, job_id: &JobId, err: &KioskError) {
        let message = match err {
            KioskError::Cancelled => "Cancelled".to_string(),
            other => humanize_error(other).status_line(),
        };
        warn!(%job_id, error = %err, "job failed");
        self.publish(job_id, 0, Some(JobStatus::Error), &message).await;
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(KioskError::Cancelled);
    }
    Ok(())
}

/// Run a pre-dispatch stage, abandoning it if the job is cancelled. Dropping
/// the stage drops any artifacts it created.
async fn cancellable<T>(cancel: &CancellationToken, stage: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(KioskError::Cancelled),
        result = stage => result,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::acquire::testing::{ByteTransformer, ScriptedFetcher, config};
    use crate::adapters::AdapterReport;
    use crate::devices::StaticDirectory;
    use crate::dispatcher::testing::MockAdapter;
    use crate::fetch::FetchError;
    use crate::store::{MemoryJobStore, UpdateGuard};
    use kioskprint_core::types::PageSelection;

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        engine: PrintEngine,
        store: Arc<dyn JobStore>,
        fetcher: Arc<ScriptedFetcher>,
        work_dir: tempfile::TempDir,
        docs: tempfile::TempDir,
    }

    fn harness(registry: AdapterRegistry, fetcher: ScriptedFetcher) -> Harness {
        harness_with_store(registry, fetcher, Arc::new(MemoryJobStore::new()))
    }

    fn harness_with_store(
        registry: AdapterRegistry,
        fetcher: ScriptedFetcher,
        store: Arc<dyn JobStore>,
    ) -> Harness {
        let work_dir = tempfile::tempdir().unwrap();
        let docs = tempfile::tempdir().unwrap();
        let config = config(work_dir.path());
        let fetcher = Arc::new(fetcher);
        let acquisition = AcquisitionPipeline::new(fetcher.clone(), Arc::new(ByteTransformer), &config);
        let dispatcher = FallbackDispatcher::new(
            Arc::new(StaticDirectory::new(["Front", "Lobby"])),
            registry,
            &config.dispatch,
        );
        let engine = PrintEngine::new(
            Arc::new(JobLedger::new(&config.ledger)),
            store.clone(),
            acquisition,
            dispatcher,
            RetryConfig::from(&config.fetch),
        );
        Harness {
            engine,
            store,
            fetcher,
            work_dir,
            docs,
        }
    }

    fn pdf_chain(adapter: Arc<MockAdapter>) -> AdapterRegistry {
        AdapterRegistry::new().with_chain(MediaKind::PagedDocument, vec![adapter])
    }

    fn no_fetch() -> ScriptedFetcher {
        ScriptedFetcher::new(vec![Err(FetchError::Transient("unexpected fetch".into()))])
    }

    fn local_doc(dir: &Path, name: &str, bytes: &[u8]) -> String {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn request(document_ref: String, copies: u32) -> SubmitRequest {
        SubmitRequest {
            document_ref,
            device: "Front".into(),
            options: PrintOptions {
                copies,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn local_document_prints_to_completion() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(pdf_chain(adapter.clone()), no_fetch());
        let doc = local_doc(h.docs.path(), "report.pdf", b"abcdef");

        let response = h.engine.submit(request(doc.clone(), 2)).await.unwrap();
        assert!(response.accepted);

        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.status_message, "Print job completed");
        assert_eq!(job.document_name, "report.pdf");
        assert_eq!(job.total_pages, Some(6));
        assert_eq!(job.dispatch_method.as_deref(), Some("pdf-renderer"));
        assert!(job.document_hash.is_some());
        assert_eq!(adapter.calls(), 2);
        assert!(h.store.get_completed(&response.job_id).await.unwrap().is_some());
        assert!(h.engine.ledger().is_completed(&response.job_id));
        assert_eq!(h.fetcher.calls(), 0);
        assert!(Path::new(&doc).exists());
    }

    #[tokio::test]
    async fn page_selection_is_applied_and_cleaned_up() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(pdf_chain(adapter), no_fetch());
        let doc = local_doc(h.docs.path(), "slides.pdf", b"abcdef");

        let mut req = request(doc, 1);
        req.options.page_selection = PageSelection::Custom("1-3".into());
        let response = h.engine.submit(req).await.unwrap();

        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.total_pages, Some(3));
        let leftovers = std::fs::read_dir(h.work_dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn expired_link_fails_without_dispatch() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(
            pdf_chain(adapter.clone()),
            ScriptedFetcher::new(vec![Err(FetchError::AuthExpired("ExpiredToken".into()))]),
        );

        let response = h
            .engine
            .submit(request("https://store.example/doc.pdf?sig=abc".into(), 1))
            .await
            .unwrap();
        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();

        assert_eq!((job.status, job.progress), (JobStatus::Error, 0));
        assert!(job.status_message.contains("expired"));
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(adapter.calls(), 0);
    }

    #[tokio::test]
    async fn fresh_link_after_expiry_is_not_a_duplicate() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(
            pdf_chain(adapter.clone()),
            ScriptedFetcher::new(vec![
                Err(FetchError::AuthExpired("ExpiredToken".into())),
                Ok(b"abc".to_vec()),
            ]),
        );

        let first = h
            .engine
            .submit(request("https://store.example/report.pdf?sig=old".into(), 1))
            .await
            .unwrap();
        let job = h.engine.wait_until_terminal(&first.job_id, WAIT).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.status_message.contains("expired"));

        let retry = h
            .engine
            .submit(request("https://store.example/report.pdf?sig=new".into(), 1))
            .await
            .unwrap();
        assert_ne!(retry.job_id, first.job_id);
        let job = h.engine.wait_until_terminal(&retry.job_id, WAIT).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.document_name, "report.pdf");
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn failed_dispatch_removes_download_and_derived_copy() {
        let adapter = Arc::new(MockAdapter::failing("pdf-renderer", "renderer crashed"));
        let h = harness(
            pdf_chain(adapter.clone()),
            ScriptedFetcher::new(vec![Ok(b"abcdef".to_vec())]),
        );

        let mut req = request("https://store.example/slides.pdf?sig=abc".into(), 1);
        req.options.page_selection = PageSelection::Custom("1-3".into());
        let response = h.engine.submit(req).await.unwrap();
        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.total_pages, Some(3));
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(adapter.calls(), 1);
        let leftovers = std::fs::read_dir(h.work_dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    /// Memory store that refuses the first `n` completion writes.
    struct FlakyCompletions {
        inner: MemoryJobStore,
        failures_left: AtomicUsize,
    }

    impl FlakyCompletions {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryJobStore::new(),
                failures_left: AtomicUsize::new(failures),
            }
        }
    }

    #[async_trait]
    impl JobStore for FlakyCompletions {
        async fn get(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
            self.inner.get(job_id).await
        }
        async fn insert(&self, job: &PrintJob) -> Result<()> {
            self.inner.insert(job).await
        }
        async fn update(&self, job_id: &JobId, patch: &JobPatch) -> Result<()> {
            self.inner.update(job_id, patch).await
        }
        async fn update_if(
            &self,
            job_id: &JobId,
            patch: &JobPatch,
            guard: UpdateGuard,
        ) -> Result<Option<PrintJob>> {
            if patch.status == Some(JobStatus::Completed) && self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(KioskError::Store("database is locked".into()));
            }
            self.inner.update_if(job_id, patch, guard).await
        }
        async fn insert_completed(&self, job: &PrintJob) -> Result<()> {
            self.inner.insert_completed(job).await
        }
        async fn get_completed(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
            self.inner.get_completed(job_id).await
        }
    }

    #[tokio::test]
    async fn failed_completion_write_is_retried() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness_with_store(pdf_chain(adapter), no_fetch(), Arc::new(FlakyCompletions::new(1)));
        let doc = local_doc(h.docs.path(), "report.pdf", b"abc");

        let response = h.engine.submit(request(doc, 1)).await.unwrap();
        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        let stored = h.store.get(&response.job_id).await.unwrap().unwrap();
        assert_eq!((stored.status, stored.progress), (JobStatus::Completed, 100));
        assert!(h.store.get_completed(&response.job_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unrecorded_completion_still_reads_as_completed() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness_with_store(
            pdf_chain(adapter.clone()),
            no_fetch(),
            Arc::new(FlakyCompletions::new(usize::MAX)),
        );
        let doc = local_doc(h.docs.path(), "report.pdf", b"abc");

        let mut req = request(doc, 1);
        req.job_id = Some("order-7".into());
        let response = h.engine.submit(req.clone()).await.unwrap();
        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();

        assert_eq!((job.status, job.progress), (JobStatus::Completed, 100));
        assert_eq!(job.status_message, "Print job completed");
        let stored = h.store.get(&response.job_id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Printing);
        assert!(h.store.get_completed(&response.job_id).await.unwrap().is_none());

        let again = h.engine.submit(req).await.unwrap();
        assert!(!again.accepted);
        assert_eq!(again.reason.as_deref(), Some("job already completed"));
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_marks_job_failed() {
        let first = Arc::new(MockAdapter::failing("office-automation", "soffice crashed"));
        let second = Arc::new(MockAdapter::new(
            "direct-spooler",
            vec![AdapterReport::Failure("lp: printer is not accepting jobs".into())],
        ));
        let registry = AdapterRegistry::new()
            .with_chain(MediaKind::OfficeDocument, vec![first.clone(), second.clone()]);
        let h = harness(registry, no_fetch());
        let doc = local_doc(h.docs.path(), "letter.docx", b"PK..");

        let response = h.engine.submit(request(doc, 1)).await.unwrap();
        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert!(job.status_message.contains("paused"));
        assert_eq!((first.calls(), second.calls()), (1, 1));
    }

    #[tokio::test]
    async fn unknown_device_is_reported_to_the_customer() {
        let h = harness(pdf_chain(Arc::new(MockAdapter::succeeding("pdf-renderer"))), no_fetch());
        let doc = local_doc(h.docs.path(), "report.pdf", b"abc");

        let mut req = request(doc, 1);
        req.device = "Basement".into();
        let response = h.engine.submit(req).await.unwrap();
        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();

        assert_eq!(job.status, JobStatus::Error);
        assert!(job.status_message.contains("printer isn't available"));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected_up_front() {
        let h = harness(pdf_chain(Arc::new(MockAdapter::succeeding("pdf-renderer"))), no_fetch());

        let mut no_device = request("/tmp/a.pdf".into(), 1);
        no_device.device = "  ".into();
        assert!(matches!(h.engine.submit(no_device).await, Err(KioskError::Validation(_))));

        let zero_copies = request("/tmp/a.pdf".into(), 0);
        assert!(matches!(h.engine.submit(zero_copies).await, Err(KioskError::Validation(_))));

        let blank_ref = request(" ".into(), 1);
        assert!(matches!(h.engine.submit(blank_ref).await, Err(KioskError::Validation(_))));

        let image = request("/tmp/photo.png".into(), 1);
        assert!(matches!(h.engine.submit(image).await, Err(KioskError::UnsupportedMedia(_))));
    }

    #[tokio::test]
    async fn completed_job_id_is_not_processed_again() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(pdf_chain(adapter.clone()), no_fetch());
        let doc = local_doc(h.docs.path(), "report.pdf", b"abc");

        let mut req = request(doc, 1);
        req.job_id = Some("order-42".into());
        let first = h.engine.submit(req.clone()).await.unwrap();
        h.engine.wait_until_terminal(&first.job_id, WAIT).await.unwrap();

        let second = h.engine.submit(req).await.unwrap();
        assert_eq!(second.job_id, first.job_id);
        assert!(!second.accepted);
        assert_eq!(second.reason.as_deref(), Some("job already completed"));
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn same_document_under_new_id_is_a_duplicate() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(pdf_chain(adapter.clone()), no_fetch());
        let doc = local_doc(h.docs.path(), "report.pdf", b"abc");

        let first = h.engine.submit(request(doc.clone(), 1)).await.unwrap();
        h.engine.wait_until_terminal(&first.job_id, WAIT).await.unwrap();

        let second = h.engine.submit(request(doc, 1)).await.unwrap();
        assert!(second.accepted);
        let job = h.engine.wait_until_terminal(&second.job_id, WAIT).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.status_message, "Duplicate submission ignored");
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn cancel_before_dispatch_stops_the_job() {
        let adapter = Arc::new(MockAdapter::succeeding("pdf-renderer"));
        let h = harness(pdf_chain(adapter.clone()), no_fetch());
        let doc = local_doc(h.docs.path(), "report.pdf", b"abc");

        // The worker has not been polled yet on the single-threaded test
        // runtime, so the cancel lands before the first stage.
        let response = h.engine.submit(request(doc, 1)).await.unwrap();
        assert!(h.engine.cancel(&response.job_id));

        let job = h.engine.wait_until_terminal(&response.job_id, WAIT).await.unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.status_message, "Cancelled");
        assert_eq!(adapter.calls(), 0);
    }

    #[tokio::test]
    async fn shutdown_refuses_new_work() {
        let h = harness(pdf_chain(Arc::new(MockAdapter::succeeding("pdf-renderer"))), no_fetch());
        h.engine.shutdown();
        let err = h.engine.submit(request("/tmp/a.pdf".into(), 1)).await.unwrap_err();
        assert!(matches!(err, KioskError::Internal(_)));
    }

    #[test]
    fn submit_request_defaults_from_json() {
        let request: SubmitRequest =
            serde_json::from_str(r#"{"document_ref": "https://x/y.pdf", "device": "Front"}"#).unwrap();
        assert_eq!(request.options.copies, 1);
        assert!(request.job_id.is_none());
    }
}
