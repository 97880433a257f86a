// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Direct-to-spooler adapter: hands the file to the queue unfiltered. Job
// options are meaningless once filtering is bypassed, so only the
// destination is sent.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::types::PrintOptions;
use tracing::instrument;

use super::{AdapterReport, DispatchAdapter, classify_output, path_arg};
use crate::runner::ProcessRunner;

pub struct DirectSpoolerAdapter {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    timeout: Duration,
}

impl DirectSpoolerAdapter {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: String, timeout: Duration) -> Self {
        Self {
            runner,
            program,
            timeout,
        }
    }
}

#[async_trait]
impl DispatchAdapter for DirectSpoolerAdapter {
    fn name(&self) -> &'static str {
        "direct-spooler"
    }

    #[instrument(skip(self, _options), fields(document = %document.display(), %device))]
    async fn dispatch(&self, document: &Path, device: &str, _options: &PrintOptions) -> AdapterReport {
        let args = vec![
            "-d".to_string(),
            device.to_string(),
            "-o".to_string(),
            "raw".to_string(),
            path_arg(document),
        ];
        match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) => classify_output(&output),
            Err(err) => AdapterReport::Failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;

    #[tokio::test]
    async fn sends_raw_job() {
        let runner = Arc::new(ScriptedRunner::succeeding("request id is Front-9"));
        let adapter = DirectSpoolerAdapter::new(runner.clone(), "lp".into(), Duration::from_secs(5));
        let report = adapter
            .dispatch(Path::new("/work/a.docx"), "Front", &PrintOptions::default())
            .await;
        assert!(matches!(report, AdapterReport::Success(_)));
        assert_eq!(runner.calls()[0], vec!["lp", "-d", "Front", "-o", "raw", "/work/a.docx"]);
    }
}
