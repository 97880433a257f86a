// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kioskprint dispatch: job ledger, acquisition pipeline, dispatch adapters
// with fallback, progress publishing and the engine that runs each job on a
// detached worker.

pub mod acquire;
pub mod adapters;
pub mod devices;
pub mod dispatcher;
pub mod engine;
pub mod fetch;
pub mod ledger;
pub mod publisher;
pub mod retry;
pub mod runner;
pub mod store;
pub mod sweeper;

pub use acquire::{AcquiredDocument, AcquisitionPipeline, ArtifactSet};
pub use adapters::{AdapterRegistry, AdapterReport, DispatchAdapter};
pub use devices::{DeviceDirectory, LpstatDirectory, StaticDirectory};
pub use dispatcher::{AmbiguousPolicy, DispatchProgress, FallbackDispatcher};
pub use engine::{PrintEngine, SubmitRequest, SubmitResponse};
pub use fetch::{DocumentFetcher, FetchError, HttpFetcher};
pub use ledger::JobLedger;
pub use publisher::ProgressPublisher;
pub use runner::{ProcessRunner, SystemRunner};
pub use store::{JobStore, MemoryJobStore, SqliteJobStore};
pub use sweeper::spawn_sweeper;
