// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: orientation, fit-to-paper and grayscale for raster printing.

pub mod processor;

pub use processor::{ImageProcessor, RASTER_DPI};
