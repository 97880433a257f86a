// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Durable job store: the external record of every job's state.
//
// The progress publisher is the only writer. Two collections exist: the live
// `jobs` record that clients poll, and the `completed_jobs` record that
// downstream reporting reads once a job has finished.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use kioskprint_core::error::Result;
use kioskprint_core::types::{JobId, JobPatch, PrintJob};

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

/// Check run against the current live record under the store's write lock.
pub type UpdateGuard = Box<dyn Fn(&PrintJob) -> bool + Send + Sync>;

/// Storage seam used by the publisher and the engine.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Fetch the live record for `job_id`.
    async fn get(&self, job_id: &JobId) -> Result<Option<PrintJob>>;

    /// Create the live record. Fails if the id already exists.
    async fn insert(&self, job: &PrintJob) -> Result<()>;

    /// Shallow-merge `patch` into the live record.
    async fn update(&self, job_id: &JobId, patch: &JobPatch) -> Result<()>;

    /// Merge `patch` only if `guard` accepts the record as it stands at write
    /// time. No other write can land between the check and the merge.
    /// Returns the merged record, or `None` when the guard refused.
    async fn update_if(
        &self,
        job_id: &JobId,
        patch: &JobPatch,
        guard: UpdateGuard,
    ) -> Result<Option<PrintJob>>;

    /// Write (or overwrite) the completed-jobs record for a finished job.
    async fn insert_completed(&self, job: &PrintJob) -> Result<()>;

    /// Fetch the completed-jobs record for `job_id`.
    async fn get_completed(&self, job_id: &JobId) -> Result<Option<PrintJob>>;
}
