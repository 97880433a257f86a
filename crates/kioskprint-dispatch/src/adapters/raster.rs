// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster adapter: rotates, scales and (for monochrome jobs) greys the image
// into a print-ready PNG, then hands that to the print command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::types::PrintOptions;
use kioskprint_document::ImageProcessor;
use tracing::{debug, instrument};

use super::{AdapterReport, DispatchAdapter, classify_output, lp_args, path_arg};
use crate::acquire::{ArtifactSet, scratch_path};
use crate::runner::ProcessRunner;

pub struct RasterAdapter {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl RasterAdapter {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        program: String,
        work_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program,
            work_dir,
            timeout,
        }
    }

    /// Render the print-ready PNG on the blocking pool.
    async fn rasterize(&self, document: &Path, options: &PrintOptions, target: PathBuf) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let source = document.to_path_buf();
        let options = options.clone();
        tokio::task::spawn_blocking(move || {
            ImageProcessor::open(&source)?
                .prepare(&options)
                .save_png(&target)
        })
        .await
        .map_err(|e| KioskError::Internal(format!("raster task failed: {e}")))?
    }
}

#[async_trait]
impl DispatchAdapter for RasterAdapter {
    fn name(&self) -> &'static str {
        "raster"
    }

    #[instrument(skip(self, options), fields(document = %document.display(), %device))]
    async fn dispatch(&self, document: &Path, device: &str, options: &PrintOptions) -> AdapterReport {
        let mut scratch = ArtifactSet::new();
        let target = scratch.track(scratch_path(&self.work_dir, Some("png")));

        if let Err(err) = self.rasterize(document, options, target.clone()).await {
            return AdapterReport::Failure(format!("could not prepare image: {err}"));
        }
        debug!(png = %target.display(), "image rasterised");

        // The PNG already carries the requested orientation.
        let flattened = PrintOptions {
            orientation: None,
            ..options.clone()
        };
        let mut args = lp_args(device, &flattened);
        args.extend(["-o".to_string(), "fit-to-page".to_string()]);
        args.push(path_arg(&target));

        match self.runner.run(&self.program, &args, self.timeout).await {
            Ok(output) => classify_output(&output),
            Err(err) => AdapterReport::Failure(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::ScriptedRunner;
    use image::{DynamicImage, Rgb, RgbImage};
    use kioskprint_core::types::{ColorMode, PaperSize};

    #[tokio::test]
    async fn prints_prepared_png_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("photo.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([10, 200, 10])))
            .save(&photo)
            .unwrap();
        let work_dir = dir.path().join("work");

        let runner = Arc::new(ScriptedRunner::new(|_, args| {
            // The PNG exists while the print command runs.
            let png = args.last().cloned().unwrap_or_default();
            assert!(Path::new(&png).exists());
            Ok(crate::runner::testing::ok("request id is Photo-1"))
        }));
        let adapter = RasterAdapter::new(runner.clone(), "lp".into(), work_dir.clone(), Duration::from_secs(5));
        let options = PrintOptions {
            color_mode: ColorMode::Monochrome,
            paper_size: Some(PaperSize::A5),
            ..Default::default()
        };

        let report = adapter.dispatch(&photo, "Photo Booth", &options).await;
        assert!(matches!(report, AdapterReport::Success(_)));
        assert!(runner.calls()[0].last().unwrap().ends_with(".png"));
        assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);
        assert!(photo.exists());
    }

    #[tokio::test]
    async fn unreadable_image_fails_without_printing() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("not-an-image.jpg");
        std::fs::write(&bogus, b"definitely not jpeg").unwrap();

        let runner = Arc::new(ScriptedRunner::succeeding("request id is X-1"));
        let adapter = RasterAdapter::new(runner.clone(), "lp".into(), dir.path().join("work"), Duration::from_secs(5));
        let report = adapter.dispatch(&bogus, "Front", &PrintOptions::default()).await;

        assert!(matches!(report, AdapterReport::Failure(_)));
        assert!(runner.calls().is_empty());
    }
}
