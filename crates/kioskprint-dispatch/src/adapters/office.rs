// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Office-document automation: drives a headless office suite to print straight
// to the named device.
//
// The suite prints silently on success, so a clean exit is usually ambiguous.
// A single profile cannot serve two headless instances, so copies run one at
// a time.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::types::PrintOptions;
use tracing::instrument;

use super::{AdapterReport, DispatchAdapter, classify_output, path_arg};
use crate::runner::ProcessRunner;

pub struct OfficeAutomationAdapter {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    timeout: Duration,
}

impl OfficeAutomationAdapter {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: String, timeout: Duration) -> Self {
        Self {
            runner,
            program,
            timeout,
        }
    }
}

#[async_trait]
impl DispatchAdapter for OfficeAutomationAdapter {
    fn name(&self) -> &'static str {
        "office-automation"
    }

    fn supports_concurrent(&self) -> bool {
        false
    }

    #[instrument(skip(self, _options), fields(document = %document.display(), %device))]
    async fn dispatch(&self, document: &Path, device: &str, _options: &PrintOptions) -> AdapterReport {
        let args = vec![
            "--headless".to_string(),
            "--norestore".to_string(),
            "--invisible".to_string(),
            "-pt".to_string(),
            device.to_string(),
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
    use crate::runner::testing::{ScriptedRunner, failed};

    #[tokio::test]
    async fn silent_exit_is_ambiguous() {
        let runner = Arc::new(ScriptedRunner::succeeding(""));
        let adapter = OfficeAutomationAdapter::new(runner.clone(), "soffice".into(), Duration::from_secs(5));
        let report = adapter
            .dispatch(Path::new("/work/letter.docx"), "Front", &PrintOptions::default())
            .await;
        assert!(matches!(report, AdapterReport::Ambiguous(_)));
        assert!(!adapter.supports_concurrent());
        assert_eq!(runner.calls()[0][4], "-pt");
    }

    #[tokio::test]
    async fn crash_is_failure() {
        let runner = Arc::new(ScriptedRunner::new(|_, _| Ok(failed(81, ""))));
        let adapter = OfficeAutomationAdapter::new(runner, "soffice".into(), Duration::from_secs(5));
        let report = adapter
            .dispatch(Path::new("/work/letter.docx"), "Front", &PrintOptions::default())
            .await;
        assert_eq!(report, AdapterReport::Failure("exited with status 81".into()));
    }
}
