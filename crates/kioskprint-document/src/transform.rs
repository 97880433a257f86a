// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transform collaborator: derives a print-ready document from the acquired
// original (page subset, paper size, orientation).
//
// Transforms are CPU-bound and synchronous; async callers run them on the
// blocking pool.

use std::path::Path;

use kioskprint_core::error::Result;
use kioskprint_core::types::PageOptions;
use tracing::instrument;

use crate::pdf::PdfReader;

/// Produces derived documents for the acquisition pipeline.
pub trait DocumentTransformer: Send + Sync {
    /// Number of pages in the document at `path`.
    fn page_count(&self, path: &Path) -> Result<u32>;

    /// Return the bytes of a derived document honouring `options`.
    fn transform(&self, path: &Path, options: &PageOptions) -> Result<Vec<u8>>;
}

/// `lopdf`-backed transformer for paged documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTransformer;

impl DocumentTransformer for PdfTransformer {
    fn page_count(&self, path: &Path) -> Result<u32> {
        Ok(PdfReader::open(path)?.page_count())
    }

    #[instrument(skip(self, options), fields(path = %path.display()))]
    fn transform(&self, path: &Path, options: &PageOptions) -> Result<Vec<u8>> {
        let mut reader = PdfReader::open(path)?;
        reader.apply(options)?;
        reader.to_bytes()
    }
}
