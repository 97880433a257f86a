// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: prepares raster images for printing: quarter-turn
// rotation, fit-to-paper scaling and grayscale conversion, using the `image`
// crate.

use image::{DynamicImage, ImageFormat};
use kioskprint_core::error::KioskError;
use kioskprint_core::types::{ColorMode, Orientation, PaperSize, PrintOptions};
use tracing::{debug, info, instrument};

/// Resolution used when fitting an image to a paper size.
pub const RASTER_DPI: u32 = 300;

/// Image processing pipeline operating on a single in-memory image.
///
/// Each method consumes `self` and returns the transformed processor, enabling
/// method chaining.
///
/// ```ignore
/// let png = ImageProcessor::open("photo.jpg")?
///     .orient(Orientation::Landscape)
///     .fit_to_paper(PaperSize::A4, RASTER_DPI)
///     .grayscale()
///     .to_png_bytes()?;
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, KioskError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            KioskError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self { image: img })
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, KioskError> {
        let img = image::load_from_memory(data).map_err(|err| {
            KioskError::ImageError(format!("failed to decode image: {}", err))
        })?;
        Ok(Self { image: img })
    }

    /// Wrap an already-decoded `DynamicImage`.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    // -- Transformations ------------------------------------------------------

    /// Apply the print options relevant to raster output in one pass.
    pub fn prepare(self, options: &PrintOptions) -> Self {
        let mut processor = self;
        if let Some(orientation) = options.orientation {
            processor = processor.orient(orientation);
        }
        processor = processor.fit_to_paper(options.paper_size.unwrap_or(PaperSize::A4), RASTER_DPI);
        if options.color_mode == ColorMode::Monochrome {
            processor = processor.grayscale();
        }
        processor
    }

    /// Rotate by a multiple of 90 degrees clockwise. Other angles are rounded
    /// to the nearest quarter turn.
    pub fn rotate_quarter_turns(self, degrees: i32) -> Self {
        let quarter = ((degrees as f32 / 90.0).round() as i32).rem_euclid(4);
        let image = match quarter {
            1 => self.image.rotate90(),
            2 => self.image.rotate180(),
            3 => self.image.rotate270(),
            _ => self.image,
        };
        Self { image }
    }

    /// Turn the image so it presents in the requested orientation. Images
    /// that are already wider than tall count as natively landscape.
    #[instrument(skip(self), fields(?orientation))]
    pub fn orient(self, orientation: Orientation) -> Self {
        let native_offset = if self.image.width() > self.image.height() { 90 } else { 0 };
        let turn = orientation.rotation_degrees() - native_offset;
        debug!(turn, "Orienting image");
        self.rotate_quarter_turns(turn)
    }

    /// Scale the image to fill the printable area of `paper` at `dpi`,
    /// preserving aspect ratio. The paper is taken in the image's own
    /// portrait/landscape sense.
    #[instrument(skip(self), fields(?paper, dpi))]
    pub fn fit_to_paper(self, paper: PaperSize, dpi: u32) -> Self {
        let (w_mm, h_mm) = paper.dimensions_mm();
        let to_px = |mm: u32| ((mm as f32 / 25.4) * dpi as f32).round().max(1.0) as u32;
        let (short, long) = (to_px(w_mm.min(h_mm)), to_px(w_mm.max(h_mm)));

        let (max_w, max_h) = if self.image.width() > self.image.height() {
            (long, short)
        } else {
            (short, long)
        };

        info!(
            from_w = self.image.width(),
            from_h = self.image.height(),
            max_w,
            max_h,
            "Fitting image to paper"
        );
        let resized = self
            .image
            .resize(max_w, max_h, image::imageops::FilterType::Lanczos3);
        Self { image: resized }
    }

    /// Convert the image to grayscale (luma).
    pub fn grayscale(self) -> Self {
        Self {
            image: self.image.grayscale(),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, KioskError> {
        encode_to_format(&self.image, ImageFormat::Png)
    }

    /// Write the image to `path` as PNG.
    pub fn save_png(&self, path: impl AsRef<std::path::Path>) -> Result<(), KioskError> {
        self.image
            .save_with_format(path.as_ref(), ImageFormat::Png)
            .map_err(|err| {
                KioskError::ImageError(format!(
                    "failed to save image to {}: {}",
                    path.as_ref().display(),
                    err
                ))
            })
    }
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, KioskError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| KioskError::ImageError(format!("image encoding failed: {}", err)))?;
    Ok(buffer)
}
