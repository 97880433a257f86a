// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-memory job store for tests and single-shot CLI runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::types::{JobId, JobPatch, PrintJob};

use super::{JobStore, UpdateGuard};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, PrintJob>>,
    completed: Mutex<HashMap<JobId, PrintJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<'a>(
        map: &'a Mutex<HashMap<JobId, PrintJob>>,
    ) -> Result<std::sync::MutexGuard<'a, HashMap<JobId, PrintJob>>> {
        map.lock()
            .map_err(|_| KioskError::Store("job store lock poisoned".into()))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
        Ok(Self::lock(&self.jobs)?.get(job_id).cloned())
    }

    async fn insert(&self, job: &PrintJob) -> Result<()> {
        let mut jobs = Self::lock(&self.jobs)?;
        if jobs.contains_key(&job.job_id) {
            return Err(KioskError::Store(format!("job {} already exists", job.job_id)));
        }
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn update(&self, job_id: &JobId, patch: &JobPatch) -> Result<()> {
        let mut jobs = Self::lock(&self.jobs)?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| KioskError::Store(format!("job {job_id} not found")))?;
        patch.apply_to(job);
        Ok(())
    }

    async fn update_if(
        &self,
        job_id: &JobId,
        patch: &JobPatch,
        guard: UpdateGuard,
    ) -> Result<Option<PrintJob>> {
        let mut jobs = Self::lock(&self.jobs)?;
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| KioskError::Store(format!("job {job_id} not found")))?;
        if !guard(job) {
            return Ok(None);
        }
        patch.apply_to(job);
        Ok(Some(job.clone()))
    }

    async fn insert_completed(&self, job: &PrintJob) -> Result<()> {
        Self::lock(&self.completed)?.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_completed(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
        Ok(Self::lock(&self.completed)?.get(job_id).cloned())
    }
}
