// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Paged-document adapter. The print system renders the PDF itself and handles
// colour conversion and device targeting, so there is no fallback behind it.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::types::PrintOptions;
use tracing::{debug, instrument};

use super::{AdapterReport, DispatchAdapter, classify_output, lp_args, path_arg};
use crate::runner::ProcessRunner;

pub struct PdfRendererAdapter {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    timeout: Duration,
}

impl PdfRendererAdapter {
    pub fn new(runner: Arc<dyn ProcessRunner>, program: String, timeout: Duration) -> Self {
        Self {
            runner,
            program,
            timeout,
        }
    }

    fn args(&self, document: &Path, device: &str, options: &PrintOptions) -> Vec<String> {
        // Orientation and paper size were already applied when the document
        // was derived; repeating orientation here would rotate twice.
        let flattened = PrintOptions {
            orientation: None,
            ..options.clone()
        };
        let mut args = lp_args(device, &flattened);
        args.extend(["-o".to_string(), "fit-to-page".to_string()]);
        args.push(path_arg(document));
        args
    }
}

#[async_trait]
impl DispatchAdapter for PdfRendererAdapter {
    fn name(&self) -> &'static str {
        "pdf-renderer"
    }

    #[instrument(skip(self, options), fields(document = %document.display(), %device))]
    async fn dispatch(&self, document: &Path, device: &str, options: &PrintOptions) -> AdapterReport {
        let args = self.args(document, device, options);
        debug!(?args, "rendering PDF to device");
        match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) => classify_output(&output),
            Err(err) => AdapterReport::Failure(err.to_string()),
        }
    }
}
