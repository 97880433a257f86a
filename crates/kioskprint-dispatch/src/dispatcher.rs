// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fallback dispatcher: tries each adapter in the media kind's chain until one
// delivers every requested copy.
//
// Rules:
//   - the device is validated before any adapter runs
//   - N copies means N adapter invocations, concurrent only when the adapter
//     allows it; the first failed copy stops the rest
//   - an adapter that failed before delivering anything hands over to the
//     next one; after a delivered copy the chain stops, as a fallback would
//     print duplicates
//   - every invocation is bounded by the adapter timeout
//   - an exhausted chain reports one failure per attempted adapter, in order

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::future::try_join_all;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};

use kioskprint_core::config::DispatchConfig;
use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::types::{AttemptFailure, DispatchOutcome, MediaKind, PrintOptions};

use crate::adapters::{AdapterRegistry, AdapterReport, DispatchAdapter};
use crate::devices::DeviceDirectory;

/// How to read an adapter that neither confirmed nor refused a copy.
///
/// Out-of-process mechanisms rarely give a reliable completion signal, so the
/// default treats silence as acceptance. This is a weak guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmbiguousPolicy {
    /// Ambiguous counts as delivered.
    TentativeSuccess,
    /// Ambiguous counts as failed.
    Strict,
}

pub const DEFAULT_AMBIGUOUS_POLICY: AmbiguousPolicy = AmbiguousPolicy::TentativeSuccess;

impl AmbiguousPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        if config.strict_ambiguous {
            Self::Strict
        } else {
            DEFAULT_AMBIGUOUS_POLICY
        }
    }
}

/// Emitted after each delivered copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchProgress {
    pub method: &'static str,
    /// Copies delivered so far, including this one.
    pub delivered: u32,
    pub copies: u32,
}

/// How one adapter fared with the full set of copies.
enum CopyRun {
    Delivered(String),
    Failed { detail: String, delivered: u32 },
}

pub struct FallbackDispatcher {
    devices: Arc<dyn DeviceDirectory>,
    adapters: AdapterRegistry,
    policy: AmbiguousPolicy,
    timeout: Duration,
}

impl FallbackDispatcher {
    pub fn new(devices: Arc<dyn DeviceDirectory>, adapters: AdapterRegistry, config: &DispatchConfig) -> Self {
        Self {
            devices,
            adapters,
            policy: AmbiguousPolicy::from_config(config),
            timeout: config.adapter_timeout(),
        }
    }

    pub fn with_policy(mut self, policy: AmbiguousPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> AmbiguousPolicy {
        self.policy
    }

    /// Whether any adapter is registered for `media_kind`.
    pub fn supports(&self, media_kind: MediaKind) -> bool {
        !self.adapters.chain_for(media_kind).is_empty()
    }

    /// Devices currently offered by the directory.
    pub async fn list_devices(&self) -> Result<Vec<String>> {
        self.devices.list_devices().await
    }

    /// Fail unless `device` is currently listed by the directory.
    pub async fn validate_device(&self, device: &str) -> Result<()> {
        let available = self.devices.list_devices().await?;
        if available.iter().any(|d| d == device) {
            return Ok(());
        }
        Err(KioskError::Validation(format!(
            "device not found: {device} (available: {})",
            available.join(", ")
        )))
    }

    /// Deliver `options.copies` copies of `document` to `device`.
    #[instrument(skip(self, options, progress), fields(document = %document.display(), %device, kind = media_kind.as_str(), copies = options.copies))]
    pub async fn dispatch(
        &self,
        document: &Path,
        media_kind: MediaKind,
        device: &str,
        options: &PrintOptions,
        progress: Option<UnboundedSender<DispatchProgress>>,
    ) -> Result<DispatchOutcome> {
        self.validate_device(device).await?;

        let chain = self.adapters.chain_for(media_kind);
        if chain.is_empty() {
            return Err(KioskError::UnsupportedMedia(media_kind.as_str().to_string()));
        }

        let mut attempts = Vec::new();
        for adapter in chain {
            match self
                .run_copies(adapter.as_ref(), document, device, options, progress.as_ref())
                .await
            {
                CopyRun::Delivered(detail) => {
                    info!(method = adapter.name(), "dispatch accepted");
                    return Ok(DispatchOutcome {
                        succeeded: true,
                        detail,
                        method: adapter.name().to_string(),
                    });
                }
                CopyRun::Failed { detail, delivered } => {
                    warn!(method = adapter.name(), %detail, delivered, "dispatch method failed");
                    attempts.push(AttemptFailure {
                        method: adapter.name().to_string(),
                        detail,
                    });
                    if delivered > 0 {
                        break;
                    }
                }
            }
        }

        Err(KioskError::Dispatch { attempts })
    }

    async fn run_copies(
        &self,
        adapter: &dyn DispatchAdapter,
        document: &Path,
        device: &str,
        options: &PrintOptions,
        progress: Option<&UnboundedSender<DispatchProgress>>,
    ) -> CopyRun {
        let copies = options.copies.max(1);
        let delivered = AtomicU32::new(0);

        let deliver_one = |copy: u32| {
            let delivered = &delivered;
            async move {
                match self.invoke(adapter, document, device, options).await {
                    Ok(detail) => {
                        let count = delivered.fetch_add(1, Ordering::SeqCst) + 1;
                        if let Some(tx) = progress {
                            let _ = tx.send(DispatchProgress {
                                method: adapter.name(),
                                delivered: count,
                                copies,
                            });
                        }
                        Ok(detail)
                    }
                    Err(detail) if copies > 1 => Err(format!("copy {copy} of {copies}: {detail}")),
                    Err(detail) => Err(detail),
                }
            }
        };

        let result = if adapter.supports_concurrent() && copies > 1 {
            try_join_all((1..=copies).map(deliver_one))
                .await
                .map(|details| details.into_iter().last().unwrap_or_default())
        } else {
            let mut last = String::new();
            let mut outcome = Ok(());
            for copy in 1..=copies {
                match deliver_one(copy).await {
                    Ok(detail) => last = detail,
                    Err(detail) => {
                        outcome = Err(detail);
                        break;
                    }
                }
            }
            outcome.map(|()| last)
        };

        match result {
            Ok(detail) => CopyRun::Delivered(detail),
            Err(detail) => CopyRun::Failed {
                detail,
                delivered: delivered.load(Ordering::SeqCst),
            },
        }
    }

    /// One bounded adapter call, folded through the ambiguous policy.
    async fn invoke(
        &self,
        adapter: &dyn DispatchAdapter,
        document: &Path,
        device: &str,
        options: &PrintOptions,
    ) -> std::result::Result<String, String> {
        let report = match tokio::time::timeout(self.timeout, adapter.dispatch(document, device, options)).await {
            Ok(report) => report,
            Err(_) => return Err(format!("timed out after {:?}", self.timeout)),
        };

        match (report, self.policy) {
            (AdapterReport::Success(detail), _) => Ok(detail),
            (AdapterReport::Failure(detail), _) => Err(detail),
            (AdapterReport::Ambiguous(detail), AmbiguousPolicy::TentativeSuccess) => {
                warn!(method = adapter.name(), %detail, "no confirmation from adapter, assuming delivered");
                Ok(detail)
            }
            (AdapterReport::Ambiguous(detail), AmbiguousPolicy::Strict) => {
                Err(format!("no confirmation: {detail}"))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Mock adapters for dispatcher and engine tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;

    /// Replays queued reports; the last one repeats once the queue drains.
    pub struct MockAdapter {
        name: &'static str,
        concurrent: bool,
        delay: Duration,
        reports: Mutex<VecDeque<AdapterReport>>,
        pub calls: AtomicUsize,
    }

    impl MockAdapter {
        pub fn new(name: &'static str, reports: Vec<AdapterReport>) -> Self {
            Self {
                name,
                concurrent: true,
                delay: Duration::ZERO,
                reports: Mutex::new(reports.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn succeeding(name: &'static str) -> Self {
            Self::new(name, vec![AdapterReport::Success("request id is X-1".into())])
        }

        pub fn failing(name: &'static str, detail: &str) -> Self {
            Self::new(name, vec![AdapterReport::Failure(detail.into())])
        }

        pub fn serial(mut self) -> Self {
            self.concurrent = false;
            self
        }

        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DispatchAdapter for MockAdapter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn supports_concurrent(&self) -> bool {
            self.concurrent
        }

        async fn dispatch(&self, _document: &Path, _device: &str, _options: &PrintOptions) -> AdapterReport {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut reports = self.reports.lock().unwrap();
            if reports.len() > 1 {
                reports.pop_front().unwrap()
            } else {
                reports.front().cloned().unwrap()
            }
        }
    }
}
