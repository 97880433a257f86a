// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens the durable job store, loads the engine
// configuration and starts the background sweeper.
//
// Must be initialised inside a tokio runtime: the sweeper is spawned on it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kioskprint_core::EngineConfig;
use kioskprint_core::error::Result;
use kioskprint_core::types::{JobId, PrintJob};
use kioskprint_dispatch::{
    JobStore, MemoryJobStore, PrintEngine, SqliteJobStore, SubmitRequest, SubmitResponse,
    spawn_sweeper,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::data_dir;

/// Everything the CLI needs, cheaply cloneable.
#[derive(Clone)]
pub struct EngineServices {
    engine: PrintEngine,
    config: EngineConfig,
    data_dir: PathBuf,
    sweeper: Arc<JoinHandle<()>>,
}

impl EngineServices {
    /// Initialise all services against the persistent data directory.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising engine services");

        let store = SqliteJobStore::open(dir.join("jobs.db"))?;
        Self::with_store(dir, Arc::new(store))
    }

    /// In-memory store fallback when the database cannot be opened.
    pub fn fallback() -> Result<Self> {
        let dir = data_dir::data_dir();
        warn!("using in-memory job store; job history will not persist");
        Self::with_store(dir, Arc::new(MemoryJobStore::new()))
    }

    fn with_store(dir: PathBuf, store: Arc<dyn JobStore>) -> Result<Self> {
        let config = load_config(&dir).unwrap_or_else(|| default_config(&dir));
        std::fs::create_dir_all(&config.work_dir)?;

        let engine = PrintEngine::system(&config, store)?;
        let sweeper = spawn_sweeper(
            Arc::clone(engine.ledger()),
            config.work_dir.clone(),
            config.sweep.clone(),
            engine.ledger().shutdown_token(),
        );

        info!(work_dir = %config.work_dir.display(), "engine services initialised");
        Ok(Self {
            engine,
            config,
            data_dir: dir,
            sweeper: Arc::new(sweeper),
        })
    }

    // -- Engine ---------------------------------------------------------------

    pub async fn devices(&self) -> Result<Vec<String>> {
        self.engine.devices().await
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        self.engine.submit(request).await
    }

    pub async fn status(&self, job_id: &JobId) -> Result<Option<PrintJob>> {
        self.engine.status(job_id).await
    }

    pub async fn wait(&self, job_id: &JobId, timeout: Duration) -> Result<PrintJob> {
        self.engine.wait_until_terminal(job_id, timeout).await
    }

    /// Upper bound for waiting on one job: every fetch attempt plus every
    /// copy through the longest adapter chain, with headroom.
    pub fn job_timeout(&self) -> Duration {
        let fetch = self.config.fetch.attempt_timeout() * (self.config.fetch.max_retries + 1);
        fetch + self.config.dispatch.adapter_timeout() * 4
    }

    /// Cancel outstanding workers and stop the sweeper.
    pub fn shutdown(&self) {
        self.engine.shutdown();
        self.sweeper.abort();
    }

    // -- Config persistence ---------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Write `config` to `config.json`, returning the file path. Takes effect
    /// on the next start.
    pub fn save_config(&self, config: &EngineConfig) -> Result<PathBuf> {
        persist_config(&self.data_dir, config)
    }
}

// -- Config file persistence -------------------------------------------------

const CONFIG_FILE: &str = "config.json";

fn default_config(data_dir: &Path) -> EngineConfig {
    EngineConfig {
        work_dir: data_dir.join("work"),
        ..Default::default()
    }
}

fn load_config(data_dir: &Path) -> Option<EngineConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable config");
            None
        }
    }
}

fn persist_config(data_dir: &Path, config: &EngineConfig) -> Result<PathBuf> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_round_trips_through_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path()).is_none());

        let mut config = default_config(dir.path());
        config.dispatch.strict_ambiguous = true;
        config.fetch.max_retries = 4;
        persist_config(dir.path(), &config).unwrap();

        assert_eq!(load_config(dir.path()), Some(config));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"dispatch": {"print_command": "lp2"}}"#)
            .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.dispatch.print_command, "lp2");
        assert_eq!(config.fetch, EngineConfig::default().fetch);
    }

    #[test]
    fn corrupt_config_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();
        assert!(load_config(dir.path()).is_none());
    }
}
