// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// kioskprint-document: Document preparation for the kiosk dispatch engine.
//
// Provides page-range resolution, PDF reshaping (page subsets, paper size,
// orientation), raster preparation for image printing, and SHA-256 document
// fingerprints.

pub mod image;
pub mod integrity;
pub mod pages;
pub mod pdf;
pub mod transform;

// Re-export the primary structs so callers can use `kioskprint_document::PdfReader` etc.
pub use image::processor::ImageProcessor;
pub use pages::{parse_custom_range, select_pages};
pub use pdf::reader::PdfReader;
pub use transform::{DocumentTransformer, PdfTransformer};
