// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Periodic sweeper: expires ledger records and removes scratch files that
// outlived their job (e.g. after a crash skipped the drop guard).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use kioskprint_core::config::SweepConfig;

use crate::ledger::JobLedger;

/// Start the sweep loop. It runs until `cancel` fires.
pub fn spawn_sweeper(
    ledger: Arc<JobLedger>,
    work_dir: PathBuf,
    config: SweepConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let max_age = config.stale_artifact_age();
        info!(
            interval_secs = config.interval().as_secs(),
            max_age_secs = max_age.as_secs(),
            "sweeper started"
        );

        let mut interval = tokio::time::interval(config.interval());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("sweeper stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = ledger.sweep();
                    let dir = work_dir.clone();
                    match tokio::task::spawn_blocking(move || sweep_work_dir(&dir, max_age)).await {
                        Ok(0) => debug!(?report, "sweep finished"),
                        Ok(removed) => info!(?report, removed, "stale artifacts removed"),
                        Err(e) => warn!(error = %e, "work directory sweep failed"),
                    }
                }
            }
        }
    })
}

/// Delete regular files in `dir` last modified more than `max_age` ago.
/// Returns how many were removed. A missing directory counts as clean.
pub fn sweep_work_dir(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read work directory");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "cannot remove stale artifact"),
        }
    }
    removed
}
