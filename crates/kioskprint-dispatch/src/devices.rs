// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device directory: which printers the kiosk can currently target.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::error::{KioskError, Result};
use tracing::{debug, instrument};

use crate::runner::ProcessRunner;

/// Upper bound for a printer enumeration call.
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Names of the devices jobs may be sent to.
    async fn list_devices(&self) -> Result<Vec<String>>;
}

/// Enumerates CUPS destinations with `lpstat -e`.
pub struct LpstatDirectory {
    runner: Arc<dyn ProcessRunner>,
    program: String,
}

impl LpstatDirectory {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: String) -> Self {
        Self { runner, program }
    }
}

#[async_trait]
impl DeviceDirectory for LpstatDirectory {
    #[instrument(skip(self))]
    async fn list_devices(&self) -> Result<Vec<String>> {
        let output = self
            .runner
            .run(&self.program, &["-e".to_string()], LIST_TIMEOUT)
            .await?;

        if !output.success() {
            return Err(KioskError::Internal(format!(
                "{} failed: {}",
                self.program,
                output.stderr.trim()
            )));
        }

        let devices: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        debug!(count = devices.len(), "devices listed");
        Ok(devices)
    }
}

/// Fixed device list, for configured kiosks and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    devices: Vec<String>,
}

impl StaticDirectory {
    pub fn new<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn list_devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.clone())
    }
}
