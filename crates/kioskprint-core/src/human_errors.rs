// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for kiosk customers.
//
// Every technical error is mapped to plain English with a clear suggestion.
// The message becomes the job's status text, so it must make sense on the
// kiosk screen without any other context.

use crate::error::{AcquisitionError, KioskError};

/// Severity of an error from the customer's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or timeout; trying again will probably work.
    Transient,
    /// The customer or staff must do something (new link, add paper).
    ActionRequired,
    /// Cannot be fixed by retrying (wrong format, unknown printer).
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as the job status).
    pub message: String,
    /// What the customer should try.
    pub suggestion: String,
    /// Whether resubmitting the same job could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    /// Message and suggestion joined for a single status line.
    pub fn status_line(&self) -> String {
        format!("{} {}", self.message, self.suggestion)
    }
}

/// Convert a `KioskError` into a `HumanError` a kiosk customer can act on.
pub fn humanize_error(err: &KioskError) -> HumanError {
    match err {
        KioskError::Validation(detail) => {
            if detail.contains("device not found") {
                HumanError {
                    message: "The selected printer isn't available.".into(),
                    suggestion: "Please choose another printer from the list.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            } else {
                HumanError {
                    message: "Some print details are missing.".into(),
                    suggestion: format!("Please check your selection and try again. ({detail})"),
                    retriable: false,
                    severity: Severity::ActionRequired,
                }
            }
        }

        KioskError::UnsupportedMedia(detail) => HumanError {
            message: "This type of file can't be printed here.".into(),
            suggestion: format!("Try saving it as a PDF first. (File type: {detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        KioskError::Acquisition(AcquisitionError::AuthExpired(_)) => HumanError {
            message: "The link to your document has expired.".into(),
            suggestion: "Please upload or select the document again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        KioskError::Acquisition(AcquisitionError::Transient(_)) => HumanError {
            message: "We couldn't download your document.".into(),
            suggestion: "Check your connection and try again in a moment.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        KioskError::Dispatch { attempts } => {
            let combined = attempts
                .iter()
                .map(|a| a.detail.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            humanize_dispatch_detail(&combined)
        }

        KioskError::Timeout { operation, .. } if operation.starts_with("downloading") => HumanError {
            message: "Downloading your document took too long.".into(),
            suggestion: "Check your connection and try again in a moment.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        KioskError::Timeout { .. } => HumanError {
            message: "The printer didn't respond in time.".into(),
            suggestion: "The printer might be busy. Please try again shortly.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        KioskError::Cancelled => HumanError {
            message: "Print job cancelled.".into(),
            suggestion: "Nothing was printed.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        KioskError::PdfError(_) => HumanError {
            message: "There's a problem with this PDF file.".into(),
            suggestion: "The file may be damaged. Try exporting it again or use a different file.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        KioskError::ImageError(_) => HumanError {
            message: "There's a problem with this image.".into(),
            suggestion: "Try saving it as a JPEG or PNG first.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        KioskError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound => HumanError {
                message: "The file couldn't be found.".into(),
                suggestion: "It may have been removed. Please select it again.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            std::io::ErrorKind::PermissionDenied => HumanError {
                message: "The kiosk isn't allowed to read that file.".into(),
                suggestion: "Please ask staff for help.".into(),
                retriable: false,
                severity: Severity::ActionRequired,
            },
            _ => HumanError {
                message: "There was a problem reading or writing a file.".into(),
                suggestion: "Please try again.".into(),
                retriable: true,
                severity: Severity::Transient,
            },
        },

        KioskError::Store(_)
        | KioskError::Database(_)
        | KioskError::Serialization(_)
        | KioskError::Internal(_) => HumanError {
            message: "The kiosk had an internal problem.".into(),
            suggestion: "Please try again. If this keeps happening, ask staff for help.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

/// Parse combined adapter failure details into a human-readable message.
fn humanize_dispatch_detail(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("timed out") {
        HumanError {
            message: "The printer didn't respond in time.".into(),
            suggestion: "The printer might be busy or turned off. Please try again shortly.".into(),
            retriable: true,
            severity: Severity::Transient,
        }
    } else if lower.contains("not accepting") || lower.contains("disabled") || lower.contains("paused") {
        HumanError {
            message: "The printer is paused.".into(),
            suggestion: "Please ask staff to resume the printer, then try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("media-empty") || lower.contains("out of paper") {
        HumanError {
            message: "The printer is out of paper.".into(),
            suggestion: "Please ask staff to refill the paper tray.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("toner") || lower.contains("ink") || lower.contains("marker-supply") {
        HumanError {
            message: "The printer needs new ink or toner.".into(),
            suggestion: "Please ask staff to replace the cartridge.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        }
    } else if lower.contains("unsupported") || lower.contains("unknown format") {
        HumanError {
            message: "The printer doesn't understand this file type.".into(),
            suggestion: "Try saving the file as a PDF first, then print the PDF.".into(),
            retriable: false,
            severity: Severity::Permanent,
        }
    } else {
        HumanError {
            message: "The printer couldn't take this job.".into(),
            suggestion: format!("Please try again or choose another printer. (Detail: {detail})"),
            retriable: true,
            severity: Severity::Transient,
        }
    }
}
