// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Job ledger: the engine's in-memory view of active and recently finished
// jobs.
//
// Holds three time-windowed maps:
//   dedup      (document name, job id) → first seen
//   completed  job id → completed at
//   snapshots  job id → latest known job state
// plus one cancellation token per running job. Each map has its own lock and
// every lock is held for a single lookup-and-mutate step, so `sweep` can run
// alongside lookups without torn reads.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use kioskprint_core::config::LedgerConfig;
use kioskprint_core::types::{JobId, JobStatus, PrintJob};

#[derive(Debug, Clone)]
struct Snapshot {
    job: PrintJob,
    touched: Instant,
}

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub dedup_entries: usize,
    pub completed_markers: usize,
    pub snapshots: usize,
}

pub struct JobLedger {
    dedup_retention: Duration,
    completed_retention: Duration,
    dedup: Mutex<HashMap<(String, JobId), Instant>>,
    completed: Mutex<HashMap<JobId, Instant>>,
    snapshots: Mutex<HashMap<JobId, Snapshot>>,
    cancels: Mutex<HashMap<JobId, CancellationToken>>,
    shutdown: CancellationToken,
}

/// Lock a ledger map, recovering the data if a holder panicked. Every
/// critical section is a single map operation, so the map is never left
/// half-updated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl JobLedger {
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            dedup_retention: config.dedup_retention(),
            completed_retention: config.completed_retention(),
            dedup: Mutex::new(HashMap::new()),
            completed: Mutex::new(HashMap::new()),
            snapshots: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    // -- Deduplication --------------------------------------------------------

    /// Whether processing `job_id` for `document_name` should be skipped.
    ///
    /// True for an already-completed id, or when another job id claimed the
    /// same document name within the retention window. Otherwise the pair is
    /// recorded and the answer is false. Blank ids or names are never
    /// duplicates.
    pub fn is_duplicate(&self, job_id: &JobId, document_name: &str) -> bool {
        self.is_duplicate_at(job_id, document_name, Instant::now())
    }

    pub fn is_duplicate_at(&self, job_id: &JobId, document_name: &str, now: Instant) -> bool {
        let name = document_name.trim();
        if job_id.is_blank() || name.is_empty() {
            return false;
        }

        if lock(&self.completed).contains_key(job_id) {
            debug!(%job_id, "job already completed");
            return true;
        }

        let mut dedup = lock(&self.dedup);
        let clash = dedup.iter().any(|((other_name, other_id), seen)| {
            other_name == name
                && other_id != job_id
                && now.saturating_duration_since(*seen) < self.dedup_retention
        });
        if clash {
            info!(%job_id, document = name, "duplicate submission within retention window");
            return true;
        }

        dedup.entry((name.to_string(), job_id.clone())).or_insert(now);
        false
    }

    // -- Completion markers ---------------------------------------------------

    pub fn mark_completed(&self, job_id: &JobId) {
        self.mark_completed_at(job_id, Instant::now());
    }

    pub fn mark_completed_at(&self, job_id: &JobId, now: Instant) {
        lock(&self.completed).insert(job_id.clone(), now);
    }

    pub fn is_completed(&self, job_id: &JobId) -> bool {
        lock(&self.completed).contains_key(job_id)
    }

    // -- Snapshots ------------------------------------------------------------

    /// Start tracking a job's state.
    pub fn track(&self, job: &PrintJob) {
        lock(&self.snapshots).insert(
            job.job_id.clone(),
            Snapshot {
                job: job.clone(),
                touched: Instant::now(),
            },
        );
    }

    /// Apply a progress transition to the snapshot.
    ///
    /// A completed job only accepts a repeat of its completion. Outside the
    /// error path progress never moves backwards. Returns whether the
    /// snapshot changed.
    pub fn apply_progress(
        &self,
        job_id: &JobId,
        progress: u8,
        status: JobStatus,
        message: Option<&str>,
    ) -> bool {
        let mut snapshots = lock(&self.snapshots);
        let Some(snapshot) = snapshots.get_mut(job_id) else {
            return false;
        };
        if !transition_allowed(&snapshot.job, progress, status) {
            return false;
        }

        snapshot.job.progress = progress;
        snapshot.job.status = status;
        if let Some(message) = message {
            snapshot.job.status_message = message.to_string();
        }
        snapshot.job.updated_at = chrono::Utc::now();
        snapshot.touched = Instant::now();
        true
    }

    pub fn snapshot(&self, job_id: &JobId) -> Option<PrintJob> {
        lock(&self.snapshots).get(job_id).map(|s| s.job.clone())
    }

    /// Jobs that have not reached a terminal state.
    pub fn active_jobs(&self) -> Vec<JobId> {
        lock(&self.snapshots)
            .values()
            .filter(|s| !s.job.status.is_terminal())
            .map(|s| s.job.job_id.clone())
            .collect()
    }

    // -- Cancellation ---------------------------------------------------------

    /// Token the worker checks between stages. Cancelled on shutdown too.
    pub fn cancel_token(&self, job_id: &JobId) -> CancellationToken {
        lock(&self.cancels)
            .entry(job_id.clone())
            .or_insert_with(|| self.shutdown.child_token())
            .clone()
    }

    /// Ask a running job to stop before dispatch. Returns false for unknown
    /// jobs.
    pub fn request_cancel(&self, job_id: &JobId) -> bool {
        match lock(&self.cancels).get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forget the job's cancellation token once its worker is done.
    pub fn release(&self, job_id: &JobId) {
        lock(&self.cancels).remove(job_id);
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Drop every record past its retention window.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        {
            let mut dedup = lock(&self.dedup);
            let before = dedup.len();
            dedup.retain(|_, seen| now.saturating_duration_since(*seen) < self.dedup_retention);
            report.dedup_entries = before - dedup.len();
        }
        {
            let mut completed = lock(&self.completed);
            let before = completed.len();
            completed.retain(|_, at| now.saturating_duration_since(*at) < self.completed_retention);
            report.completed_markers = before - completed.len();
        }
        {
            let mut snapshots = lock(&self.snapshots);
            let before = snapshots.len();
            snapshots.retain(|_, s| {
                !s.job.status.is_terminal()
                    || now.saturating_duration_since(s.touched) < self.completed_retention
            });
            report.snapshots = before - snapshots.len();
        }

        if report != SweepReport::default() {
            debug!(?report, "ledger swept");
        }
        report
    }

    /// Cancel every outstanding job token and clear all records.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        lock(&self.cancels).clear();
        lock(&self.dedup).clear();
        lock(&self.snapshots).clear();
        lock(&self.completed).clear();
        info!("job ledger shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled by [`JobLedger::shutdown`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// The monotonic transition rule shared by the ledger and the publisher.
pub fn transition_allowed(current: &PrintJob, progress: u8, status: JobStatus) -> bool {
    if current.status == JobStatus::Completed {
        return status == JobStatus::Completed && progress == 100;
    }
    status == JobStatus::Error || progress >= current.progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use kioskprint_core::types::{MediaKind, PrintOptions};

    fn ledger() -> JobLedger {
        JobLedger::new(&LedgerConfig::default())
    }

    fn job(id: &str) -> PrintJob {
        PrintJob::new(
            id.into(),
            "/tmp/report.pdf".into(),
            "report.pdf".into(),
            MediaKind::PagedDocument,
            "Front".into(),
            PrintOptions::default(),
        )
    }

    #[test]
    fn same_name_other_id_is_duplicate_within_window() {
        let ledger = ledger();
        let t0 = Instant::now();
        assert!(!ledger.is_duplicate_at(&"a".into(), "report.pdf", t0));
        assert!(ledger.is_duplicate_at(&"b".into(), "report.pdf", t0 + Duration::from_secs(5)));
        // The rejected id did not record an entry of its own.
        assert!(!ledger.is_duplicate_at(&"a".into(), "report.pdf", t0 + Duration::from_secs(6)));
    }

    #[test]
    fn window_expiry_allows_resubmission() {
        let ledger = ledger();
        let t0 = Instant::now();
        assert!(!ledger.is_duplicate_at(&"a".into(), "report.pdf", t0));
        assert!(!ledger.is_duplicate_at(&"b".into(), "report.pdf", t0 + Duration::from_secs(31)));
    }

    #[test]
    fn repeat_of_same_pair_is_not_duplicate() {
        let ledger = ledger();
        assert!(!ledger.is_duplicate(&"a".into(), "report.pdf"));
        assert!(!ledger.is_duplicate(&"a".into(), "report.pdf"));
    }

    #[test]
    fn completed_id_is_always_duplicate() {
        let ledger = ledger();
        ledger.mark_completed(&"a".into());
        assert!(ledger.is_duplicate(&"a".into(), "anything.pdf"));
        assert!(ledger.is_completed(&"a".into()));
    }

    #[test]
    fn malformed_keys_are_never_duplicates() {
        let ledger = ledger();
        ledger.mark_completed(&"".into());
        assert!(!ledger.is_duplicate(&"".into(), "report.pdf"));
        assert!(!ledger.is_duplicate(&"a".into(), "   "));
        assert!(!ledger.is_duplicate(&"b".into(), ""));
    }

    #[test]
    fn sweep_prunes_expired_records() {
        let ledger = ledger();
        let t0 = Instant::now();
        ledger.is_duplicate_at(&"a".into(), "report.pdf", t0);
        ledger.mark_completed_at(&"done".into(), t0);

        let report = ledger.sweep_at(t0 + Duration::from_secs(60));
        assert_eq!(report.dedup_entries, 1);
        assert_eq!(report.completed_markers, 0);
        assert!(ledger.is_completed(&"done".into()));

        let report = ledger.sweep_at(t0 + Duration::from_secs(601));
        assert_eq!(report.completed_markers, 1);
        assert!(!ledger.is_completed(&"done".into()));
    }

    #[test]
    fn completed_snapshot_never_regresses() {
        let ledger = ledger();
        let id: JobId = "a".into();
        ledger.track(&job("a"));

        assert!(ledger.apply_progress(&id, 50, JobStatus::Processing, Some("Sending to printer...")));
        assert!(!ledger.apply_progress(&id, 20, JobStatus::Processing, None));
        assert!(ledger.apply_progress(&id, 100, JobStatus::Completed, Some("Print job completed")));
        assert!(!ledger.apply_progress(&id, 0, JobStatus::Error, Some("late failure")));
        assert!(ledger.apply_progress(&id, 100, JobStatus::Completed, None));

        let snapshot = ledger.snapshot(&id).unwrap();
        assert_eq!((snapshot.progress, snapshot.status), (100, JobStatus::Completed));
        assert_eq!(snapshot.status_message, "Print job completed");
    }

    #[test]
    fn errors_may_reset_progress() {
        let ledger = ledger();
        let id: JobId = "a".into();
        ledger.track(&job("a"));
        ledger.apply_progress(&id, 50, JobStatus::Processing, None);
        assert!(ledger.apply_progress(&id, 0, JobStatus::Error, Some("failed")));
        assert!(ledger.active_jobs().is_empty());
    }

    #[test]
    fn cancel_tokens_follow_shutdown() {
        let ledger = ledger();
        let id: JobId = "a".into();
        assert!(!ledger.request_cancel(&id));

        let token = ledger.cancel_token(&id);
        assert!(ledger.request_cancel(&id));
        assert!(token.is_cancelled());

        let other = ledger.cancel_token(&"b".into());
        ledger.shutdown();
        assert!(other.is_cancelled());
        assert!(ledger.is_shut_down());
    }

    #[test]
    fn concurrent_claims_admit_one_job() {
        let ledger = std::sync::Arc::new(ledger());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = ledger.clone();
                std::thread::spawn(move || !ledger.is_duplicate(&JobId(format!("job-{i}")), "same.pdf"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }
}
