// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatch adapters: one per mechanism that can put a document on paper.
//
// Every adapter delivers exactly one copy per invocation and reports a tagged
// outcome. The fallback dispatcher decides how many invocations to make and
// what an ambiguous report means.
//
// Chains by media kind:
//   paged document  → pdf-renderer
//   office document → office-automation → direct-spooler
//   image           → raster
//   anything else   → print-command

pub mod command;
pub mod office;
pub mod pdf;
pub mod raster;
pub mod spooler;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kioskprint_core::config::DispatchConfig;
use kioskprint_core::types::{MediaKind, PrintOptions};

use crate::runner::{ProcessOutput, ProcessRunner};

pub use command::PrintCommandAdapter;
pub use office::OfficeAutomationAdapter;
pub use pdf::PdfRendererAdapter;
pub use raster::RasterAdapter;
pub use spooler::DirectSpoolerAdapter;

/// Outcome of a single adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterReport {
    /// The mechanism confirmed it accepted the copy.
    Success(String),
    /// The mechanism clearly refused or crashed.
    Failure(String),
    /// The mechanism exited cleanly without confirming anything.
    Ambiguous(String),
}

impl AdapterReport {
    pub fn detail(&self) -> &str {
        match self {
            Self::Success(d) | Self::Failure(d) | Self::Ambiguous(d) => d,
        }
    }
}

/// Uniform contract implemented by every dispatch mechanism.
#[async_trait]
pub trait DispatchAdapter: Send + Sync {
    /// Stable method name reported in outcomes and failure lists.
    fn name(&self) -> &'static str;

    /// Whether several copies may be in flight at once.
    fn supports_concurrent(&self) -> bool {
        true
    }

    /// Deliver one copy of `document` to `device`.
    async fn dispatch(&self, document: &Path, device: &str, options: &PrintOptions) -> AdapterReport;
}

/// Ordered adapter chains keyed by media kind.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    chains: HashMap<MediaKind, Vec<Arc<dyn DispatchAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard chains backed by the local print system.
    pub fn system(config: &DispatchConfig, work_dir: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        let timeout = config.adapter_timeout();
        let lp = config.print_command.clone();

        let pdf = Arc::new(PdfRendererAdapter::new(runner.clone(), lp.clone(), timeout));
        let office = Arc::new(OfficeAutomationAdapter::new(
            runner.clone(),
            config.office_command.clone(),
            timeout,
        ));
        let spooler = Arc::new(DirectSpoolerAdapter::new(runner.clone(), lp.clone(), timeout));
        let raster = Arc::new(RasterAdapter::new(runner.clone(), lp.clone(), work_dir, timeout));
        let command = Arc::new(PrintCommandAdapter::new(runner, lp, timeout));

        Self::new()
            .with_chain(MediaKind::PagedDocument, vec![pdf])
            .with_chain(MediaKind::OfficeDocument, vec![office, spooler])
            .with_chain(MediaKind::Image, vec![raster])
            .with_chain(MediaKind::Other, vec![command])
    }

    /// Replace the chain used for `kind`.
    pub fn with_chain(mut self, kind: MediaKind, adapters: Vec<Arc<dyn DispatchAdapter>>) -> Self {
        self.chains.insert(kind, adapters);
        self
    }

    pub fn chain_for(&self, kind: MediaKind) -> &[Arc<dyn DispatchAdapter>] {
        self.chains.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Text on stderr that means the print system refused the job even when the
/// exit status says otherwise.
const FAILURE_MARKERS: &[&str] = &[
    "error",
    "unable",
    "not accepting",
    "unknown",
    "failed",
    "no such",
    "denied",
];

/// Turn a finished process into an adapter report.
///
/// Non-zero exit or a failure marker on stderr is a failure. A spooler
/// request id on stdout is a success. Anything else is ambiguous.
pub fn classify_output(output: &ProcessOutput) -> AdapterReport {
    let stdout = output.stdout.trim();
    let stderr = output.stderr.trim();

    if !output.success() {
        let detail = [stderr, stdout].into_iter().find(|s| !s.is_empty());
        return AdapterReport::Failure(match (detail, output.status_code) {
            (Some(detail), _) => detail.to_string(),
            (None, Some(code)) => format!("exited with status {code}"),
            (None, None) => "terminated by signal".to_string(),
        });
    }

    let lower_err = stderr.to_ascii_lowercase();
    if FAILURE_MARKERS.iter().any(|marker| lower_err.contains(marker)) {
        return AdapterReport::Failure(stderr.to_string());
    }

    if stdout.to_ascii_lowercase().contains("request id is") {
        return AdapterReport::Success(stdout.to_string());
    }

    match [stdout, stderr].into_iter().find(|s| !s.is_empty()) {
        Some(text) => AdapterReport::Ambiguous(text.to_string()),
        None => AdapterReport::Ambiguous("print system gave no confirmation".to_string()),
    }
}

/// Destination plus CUPS job options shared by the `lp`-based adapters.
pub(crate) fn lp_args(device: &str, options: &PrintOptions) -> Vec<String> {
    let mut args = vec!["-d".to_string(), device.to_string()];
    let mut push = |value: String| {
        args.push("-o".to_string());
        args.push(value);
    };

    push(format!("print-color-mode={}", options.color_mode.ipp_keyword()));
    push(format!("sides={}", options.duplex.ipp_sides_keyword()));
    push(format!("print-quality={}", options.quality.ipp_enum_value()));
    if let Some(size) = options.paper_size {
        push(format!("media={}", size.media_keyword()));
    }
    if let Some(orientation) = options.orientation {
        push(format!("orientation-requested={}", orientation.ipp_enum_value()));
    }
    args
}

/// Path argument for a process, rejecting names that would read as options.
pub(crate) fn path_arg(document: &Path) -> String {
    let raw = document.display().to_string();
    if raw.starts_with('-') {
        format!("./{raw}")
    } else {
        raw
    }
}
