// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Generic OS print command for documents no specialised adapter handles.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::types::PrintOptions;
use tracing::instrument;

use super::{AdapterReport, DispatchAdapter, classify_output, lp_args, path_arg};
use crate::runner::ProcessRunner;

pub struct PrintCommandAdapter {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    timeout: Duration,
}

impl PrintCommandAdapter {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: String, timeout: Duration) -> Self {
        Self {
            runner,
            program,
            timeout,
        }
    }
}

#[async_trait]
impl DispatchAdapter for PrintCommandAdapter {
    fn name(&self) -> &'static str {
        "print-command"
    }

    #[instrument(skip(self, options), fields(document = %document.display(), %device))]
    async fn dispatch(&self, document: &Path, device: &str, options: &PrintOptions) -> AdapterReport {
        let mut args = lp_args(device, options);
        args.push(path_arg(document));
        match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) => classify_output(&output),
            Err(err) => AdapterReport::Failure(err.to_string()),
        }
    }
}
