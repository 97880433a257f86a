// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy for remote document fetches.
//
// Transient failures and timeouts are retried with a fixed backoff. An
// expired or rejected link is never retried.

use std::time::Duration;

use kioskprint_core::config::FetchConfig;
use tracing::{debug, info, warn};

use crate::fetch::FetchError;

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for RetryConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: config.backoff(),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry: the link itself is no good.
    GiveUp,
    /// Maximum retries exhausted.
    Exhausted,
}

/// Decide what to do after attempt number `attempt` (0-based) failed with `err`.
pub fn should_retry(err: &FetchError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match err {
        FetchError::AuthExpired(_) => {
            info!("document link expired, not retrying");
            RetryDecision::GiveUp
        }
        FetchError::Transient(_) | FetchError::Timeout(_) => {
            if attempt >= config.max_retries {
                warn!(attempt, max = config.max_retries, "retry limit exhausted");
                RetryDecision::Exhausted
            } else {
                debug!(attempt, delay_ms = config.delay.as_millis() as u64, "scheduling retry");
                RetryDecision::RetryAfter(config.delay)
            }
        }
    }
}
