// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persistent engine settings, stored as `config.json` in the data directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Scratch directory for downloaded and derived documents.
    pub work_dir: PathBuf,
    pub ledger: LedgerConfig,
    pub fetch: FetchConfig,
    pub dispatch: DispatchConfig,
    pub sweep: SweepConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("kioskprint"),
            ledger: LedgerConfig::default(),
            fetch: FetchConfig::default(),
            dispatch: DispatchConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

/// Retention windows of the in-memory job ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// How long a document name blocks the same name under another job id.
    pub dedup_retention_secs: u64,
    /// How long a completed job id short-circuits further processing.
    pub completed_retention_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dedup_retention_secs: 30,
            completed_retention_secs: 600,
        }
    }
}

impl LedgerConfig {
    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }

    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }
}

/// Remote document fetch behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Retries after the first attempt (transient failures only).
    pub max_retries: u32,
    pub backoff_ms: u64,
    pub attempt_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 1000,
            attempt_timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// External programs and bounds used by the dispatch adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound for a single adapter invocation.
    pub adapter_timeout_secs: u64,
    /// Native print command (CUPS `lp`).
    pub print_command: String,
    /// Office suite binary driven headless for office documents.
    pub office_command: String,
    /// Printer enumeration command (CUPS `lpstat`).
    pub lpstat_command: String,
    /// Treat adapter output without a clear success or failure marker as a
    /// failure instead of a tentative success.
    pub strict_ambiguous: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            adapter_timeout_secs: 120,
            print_command: "lp".into(),
            office_command: "soffice".into(),
            lpstat_command: "lpstat".into(),
            strict_ambiguous: false,
        }
    }
}

impl DispatchConfig {
    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }
}

/// Background sweep cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub interval_secs: u64,
    /// Work-directory files older than this are removed by the sweep.
    pub stale_artifact_age_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 15,
            stale_artifact_age_secs: 3600,
        }
    }
}

impl SweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn stale_artifact_age(&self) -> Duration {
        Duration::from_secs(self.stale_artifact_age_secs)
    }
}
