// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for kioskprint.

use thiserror::Error;

use crate::types::AttemptFailure;

/// Why a document could not be made available locally.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The object store rejected the reference's credentials. Never retried;
    /// the caller should request a fresh reference.
    #[error("document link has expired or is not authorised: {0}")]
    AuthExpired(String),

    /// Network or read failure that survived every retry.
    #[error("document could not be fetched: {0}")]
    Transient(String),
}

/// Top-level error type for all kioskprint operations.
#[derive(Debug, Error)]
pub enum KioskError {
    // -- Submission --
    #[error("invalid submission: {0}")]
    Validation(String),

    #[error("unsupported media: {0}")]
    UnsupportedMedia(String),

    // -- Pipeline --
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("all dispatch methods failed: {}", summarize_attempts(.attempts))]
    Dispatch { attempts: Vec<AttemptFailure> },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("job cancelled before dispatch")]
    Cancelled,

    // -- Documents --
    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Storage / persistence --
    #[error("job store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl KioskError {
    /// Whether the failure came from an expired document reference.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Acquisition(AcquisitionError::AuthExpired(_)))
    }
}

fn summarize_attempts(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no method was attempted".into();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.method, a.detail))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KioskError>;
