// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress publisher: the single write path into the durable job store.
//
// Enforces the job state machine: completion is terminal and idempotent, and
// progress only moves forward until an error resets it. The transition rule is
// checked twice: once against the record read up front, and again by the
// store inside its write lock, so a stale reader cannot overwrite a completed
// job. Intermediate updates are best effort (a failed write is logged and
// dropped); completion writes must land, so their failures propagate.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::types::{ColorAnalysis, ColorMode, JobId, JobPatch, JobStatus, PrintJob};

use crate::ledger::{JobLedger, transition_allowed};
use crate::store::{JobStore, UpdateGuard};

/// Words that mark a progress-0 message as a failure report.
const ERROR_WORDS: &[&str] = &[
    "error", "fail", "cancel", "expired", "couldn't", "can't", "cannot", "unable", "not found",
    "problem", "duplicate",
];

#[derive(Clone)]
pub struct ProgressPublisher {
    store: Arc<dyn JobStore>,
    ledger: Arc<JobLedger>,
}

impl ProgressPublisher {
    pub fn new(store: Arc<dyn JobStore>, ledger: Arc<JobLedger>) -> Self {
        Self { store, ledger }
    }

    /// Write the initial pending record and start tracking the job.
    #[instrument(skip_all, fields(job_id = %job.job_id))]
    pub async fn create(&self, job: &PrintJob) -> Result<()> {
        self.store.insert(job).await?;
        self.ledger.track(job);
        debug!("pending job recorded");
        Ok(())
    }

    /// Publish a progress transition.
    ///
    /// `progress` is clamped to 0..=100. A missing `status` is derived from
    /// the progress band (and, at 0, from the message).
    #[instrument(skip(self, message), fields(%job_id))]
    pub async fn publish(
        &self,
        job_id: &JobId,
        progress: i32,
        status: Option<JobStatus>,
        message: Option<&str>,
    ) -> Result<()> {
        let message = message.map(str::trim).filter(|m| !m.is_empty());
        let mut progress = progress.clamp(0, 100) as u8;
        let status = status.unwrap_or_else(|| derive_status(progress, message));
        if status == JobStatus::Completed {
            progress = 100;
        }
        let completing = status == JobStatus::Completed;

        let current = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return self.best_effort(
                    completing,
                    KioskError::Store(format!("job {job_id} not found")),
                );
            }
            Err(err) => return self.best_effort(completing, err),
        };

        if current.status == JobStatus::Completed {
            if completing {
                return self.confirm_completed(current).await;
            }
            debug!(progress, status = status.as_str(), "job already completed, update ignored");
            return Ok(());
        }

        if !transition_allowed(&current, progress, status) {
            debug!(
                current = current.status.as_str(),
                current_progress = current.progress,
                progress,
                "transition rejected"
            );
            return Ok(());
        }

        let mut patch = JobPatch {
            progress: Some(progress),
            status: Some(status),
            status_message: message.map(|m| normalize_message(m, status)),
            ..Default::default()
        };
        // Re-checked by the store against the record it is about to write.
        let guard: UpdateGuard = Box::new(move |job| {
            job.status != JobStatus::Completed && transition_allowed(job, progress, status)
        });

        if completing {
            patch.completed_at = Some(Utc::now());
            if current.options.color_mode == ColorMode::Monochrome {
                patch.color_analysis = Some(ColorAnalysis::all_black_and_white(
                    current.total_pages.unwrap_or(1),
                ));
            }
            return self.complete(job_id, patch, guard).await;
        }

        match self.store.update_if(job_id, &patch, guard).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(progress, "transition rejected at write time");
                return Ok(());
            }
            Err(err) => warn!(error = %err, "progress update not stored"),
        }
        self.ledger
            .apply_progress(job_id, progress, status, patch.status_message.as_deref());
        Ok(())
    }

    /// Merge metadata (hash, page count, method) without touching progress.
    /// Ignored once the job has completed.
    pub async fn annotate(&self, job_id: &JobId, patch: JobPatch) {
        if patch.is_empty() {
            return;
        }
        let guard: UpdateGuard = Box::new(|job| job.status != JobStatus::Completed);
        match self.store.update_if(job_id, &patch, guard).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(%job_id, "job completed, details not changed"),
            Err(err) => warn!(%job_id, error = %err, "job details not stored"),
        }
    }

    async fn complete(&self, job_id: &JobId, patch: JobPatch, guard: UpdateGuard) -> Result<()> {
        match self.store.update_if(job_id, &patch, guard).await? {
            Some(job) => {
                self.store.insert_completed(&job).await?;
                self.ledger.mark_completed(job_id);
                self.ledger
                    .apply_progress(job_id, 100, JobStatus::Completed, Some(&job.status_message));
                info!(%job_id, "job completed");
                Ok(())
            }
            // Another completion landed between the read and the write.
            None => match self.store.get(job_id).await? {
                Some(job) if job.status == JobStatus::Completed => self.confirm_completed(job).await,
                _ => Err(KioskError::Store(format!("completion of job {job_id} was refused"))),
            },
        }
    }

    /// Repeat completion: the live record stays as it is; only the completed
    /// record and the ledger marker are filled in if an earlier attempt
    /// stopped short of writing them.
    async fn confirm_completed(&self, job: PrintJob) -> Result<()> {
        if self.store.get_completed(&job.job_id).await?.is_none() {
            self.store.insert_completed(&job).await?;
            info!(job_id = %job.job_id, "completed record restored");
        }
        if !self.ledger.is_completed(&job.job_id) {
            self.ledger.mark_completed(&job.job_id);
        }
        self.ledger
            .apply_progress(&job.job_id, 100, JobStatus::Completed, Some(&job.status_message));
        Ok(())
    }

    fn best_effort(&self, completing: bool, err: KioskError) -> Result<()> {
        if completing {
            return Err(err);
        }
        warn!(error = %err, "progress update dropped");
        Ok(())
    }
}

/// Status implied by a progress value when the caller gave none.
pub fn derive_status(progress: u8, message: Option<&str>) -> JobStatus {
    match progress {
        100.. => JobStatus::Completed,
        76..=99 => JobStatus::Printing,
        1..=75 => JobStatus::Processing,
        0 if message.is_some_and(is_error_flavored) => JobStatus::Error,
        0 => JobStatus::Pending,
    }
}

fn is_error_flavored(message: &str) -> bool {
    let lower = message.to_lowercase();
    ERROR_WORDS.iter().any(|word| lower.contains(word))
}

/// In-progress messages read as ongoing work on the kiosk screen.
pub fn normalize_message(message: &str, status: JobStatus) -> String {
    let message = message.trim();
    let in_progress = matches!(status, JobStatus::Processing | JobStatus::Printing);
    if in_progress && !message.ends_with(['.', '!', '?', '…']) {
        format!("{message}...")
    } else {
        message.to_string()
    }
}
