// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the kioskprint dispatch engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a logical print job.
///
/// Callers may supply their own id (e.g. the kiosk frontend's order number);
/// otherwise a random UUID is generated. The id is stable for the job's
/// lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is blank once surrounding whitespace is ignored.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Lifecycle states of a print job.
///
/// `Completed` is terminal and idempotent: once reached, progress stays at 100
/// and the status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, worker not started yet.
    Pending,
    /// Acquiring or preparing the document.
    Processing,
    /// Handed to a dispatch adapter.
    Printing,
    /// A dispatch mechanism accepted every copy.
    Completed,
    /// Processing stopped; see the status message.
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Printing => "printing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "printing" => Some(Self::Printing),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// Classification of a document that selects the dispatch chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MediaKind {
    /// PDF, rendered and targeted by the document renderer itself.
    PagedDocument,
    /// Word processor, spreadsheet and presentation formats.
    OfficeDocument,
    /// Raster images.
    Image,
    /// Anything else; handed to the generic OS print command.
    Other,
}

impl MediaKind {
    /// Infer the media kind from a file extension (without the dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim().to_ascii_lowercase().as_str() {
            "pdf" => Self::PagedDocument,
            "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp" | "rtf" => {
                Self::OfficeDocument
            }
            "jpg" | "jpeg" | "png" | "bmp" | "gif" | "tif" | "tiff" | "webp" => Self::Image,
            _ => Self::Other,
        }
    }

    /// Map a declared MIME type to a media kind, if it is one we recognise.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Some(Self::PagedDocument),
            "application/msword"
            | "application/rtf"
            | "application/vnd.ms-excel"
            | "application/vnd.ms-powerpoint" => Some(Self::OfficeDocument),
            e if e.starts_with("application/vnd.openxmlformats-officedocument.")
                || e.starts_with("application/vnd.oasis.opendocument.") =>
            {
                Some(Self::OfficeDocument)
            }
            e if e.starts_with("image/") => Some(Self::Image),
            _ => None,
        }
    }

    /// Detect the media kind of a document reference. A recognised declared
    /// content type wins over the reference's extension.
    pub fn detect(document_ref: &str, declared_content_type: Option<&str>) -> Self {
        if let Some(kind) = declared_content_type.and_then(Self::from_content_type) {
            return kind;
        }
        extension_of(document_ref)
            .map(Self::from_extension)
            .unwrap_or(Self::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PagedDocument => "paged-document",
            Self::OfficeDocument => "office-document",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

/// Last path segment of a URL or filesystem path, without query or fragment.
pub fn file_name_of(document_ref: &str) -> Option<&str> {
    let trimmed = document_ref.trim();
    let without_query = trimmed
        .split(['?', '#'])
        .next()
        .unwrap_or(trimmed);
    without_query
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
}

/// Extension (without the dot) of a URL or filesystem path.
pub fn extension_of(document_ref: &str) -> Option<&str> {
    let name = file_name_of(document_ref)?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Colour handling requested for the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Color,
    Monochrome,
}

impl ColorMode {
    /// IPP `print-color-mode` keyword.
    pub fn ipp_keyword(&self) -> &'static str {
        match self {
            Self::Color => "color",
            Self::Monochrome => "monochrome",
        }
    }
}

/// Duplex printing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplexMode {
    #[default]
    None,
    LongEdge,
    ShortEdge,
}

impl DuplexMode {
    /// IPP `sides` keyword (RFC 8011 §5.2.8).
    pub fn ipp_sides_keyword(&self) -> &'static str {
        match self {
            Self::None => "one-sided",
            Self::LongEdge => "two-sided-long-edge",
            Self::ShortEdge => "two-sided-short-edge",
        }
    }
}

/// Output quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Draft,
    #[default]
    Normal,
    High,
}

impl Quality {
    /// IPP `print-quality` enum value (RFC 8011 §5.2.13).
    pub fn ipp_enum_value(&self) -> i32 {
        match self {
            Self::Draft => 3,
            Self::Normal => 4,
            Self::High => 5,
        }
    }
}

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    A3,
    A5,
    Letter,
    Legal,
    Tabloid,
    Custom { width_mm: u32, height_mm: u32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::A3 => (297, 420),
            Self::A5 => (148, 210),
            Self::Letter => (216, 279),
            Self::Legal => (216, 356),
            Self::Tabloid => (279, 432),
            Self::Custom {
                width_mm,
                height_mm,
            } => (*width_mm, *height_mm),
        }
    }

    /// Dimensions in PostScript points (1/72 inch).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        (w as f32 * 72.0 / 25.4, h as f32 * 72.0 / 25.4)
    }

    /// CUPS `media` option value for this paper size.
    pub fn media_keyword(&self) -> String {
        match self {
            Self::A4 => "iso_a4_210x297mm".into(),
            Self::A3 => "iso_a3_297x420mm".into(),
            Self::A5 => "iso_a5_148x210mm".into(),
            Self::Letter => "na_letter_8.5x11in".into(),
            Self::Legal => "na_legal_8.5x14in".into(),
            Self::Tabloid => "na_ledger_11x17in".into(),
            Self::Custom {
                width_mm,
                height_mm,
            } => format!("Custom.{width_mm}x{height_mm}mm"),
        }
    }

    /// Parse a size name as sent by the kiosk frontend ("A4", "letter", ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "a4" => Some(Self::A4),
            "a3" => Some(Self::A3),
            "a5" => Some(Self::A5),
            "letter" => Some(Self::Letter),
            "legal" => Some(Self::Legal),
            "tabloid" | "ledger" => Some(Self::Tabloid),
            _ => None,
        }
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    Portrait,
    Landscape,
    ReversePortrait,
    ReverseLandscape,
}

impl Orientation {
    /// IPP `orientation-requested` enum value (RFC 8011 §5.2.10).
    pub fn ipp_enum_value(&self) -> i32 {
        match self {
            Self::Portrait => 3,
            Self::Landscape => 4,
            Self::ReverseLandscape => 5,
            Self::ReversePortrait => 6,
        }
    }

    /// Clockwise rotation applied to a portrait page to reach this orientation.
    pub fn rotation_degrees(&self) -> i32 {
        match self {
            Self::Portrait => 0,
            Self::Landscape => 90,
            Self::ReversePortrait => 180,
            Self::ReverseLandscape => 270,
        }
    }
}

/// Which pages of a paged document to print.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "range", rename_all = "lowercase")]
pub enum PageSelection {
    #[default]
    All,
    Odd,
    Even,
    /// Comma-separated page numbers and `start-end` ranges, 1-indexed.
    Custom(String),
}

/// Print options attached to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintOptions {
    pub copies: u32,
    pub color_mode: ColorMode,
    pub duplex: DuplexMode,
    pub quality: Quality,
    /// Explicit paper size; `None` leaves the device default in place.
    pub paper_size: Option<PaperSize>,
    /// Explicit orientation; `None` keeps the document's own.
    pub orientation: Option<Orientation>,
    pub page_selection: PageSelection,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            copies: 1,
            color_mode: ColorMode::Color,
            duplex: DuplexMode::None,
            quality: Quality::Normal,
            paper_size: None,
            orientation: None,
            page_selection: PageSelection::All,
        }
    }
}

impl PrintOptions {
    /// Whether any option requires the transform collaborator to derive a new
    /// document before dispatch.
    pub fn needs_transform(&self) -> bool {
        self.page_selection != PageSelection::All
            || self.paper_size.is_some()
            || self.orientation.is_some()
    }

    /// The subset of options consumed by the transform collaborator.
    pub fn page_options(&self) -> PageOptions {
        PageOptions {
            selection: self.page_selection.clone(),
            orientation: self.orientation,
            size: self.paper_size,
        }
    }
}

/// Input of the transform collaborator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageOptions {
    pub selection: PageSelection,
    pub orientation: Option<Orientation>,
    pub size: Option<PaperSize>,
}

/// Colour classification of a single printed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageColor {
    BlackAndWhite,
    Color,
}

/// Per-page colour classification, populated at completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorAnalysis {
    pub pages: Vec<PageColor>,
    pub color_pages: u32,
    pub black_and_white_pages: u32,
}

impl ColorAnalysis {
    /// Every page black-and-white. Monochrome dispatch cannot produce colour
    /// output whatever the source content.
    pub fn all_black_and_white(page_count: u32) -> Self {
        Self {
            pages: vec![PageColor::BlackAndWhite; page_count as usize],
            color_pages: 0,
            black_and_white_pages: page_count,
        }
    }
}

/// A complete print job as tracked by the ledger and the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    pub job_id: JobId,
    pub document_ref: String,
    pub document_name: String,
    pub media_kind: MediaKind,
    pub device: String,
    pub options: PrintOptions,
    /// Best-effort; refined once the document has been inspected.
    pub total_pages: Option<u32>,
    pub progress: u8,
    pub status: JobStatus,
    pub status_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub color_analysis: Option<ColorAnalysis>,
    /// SHA-256 of the acquired document bytes.
    pub document_hash: Option<String>,
    /// Name of the adapter that delivered the job.
    pub dispatch_method: Option<String>,
}

impl PrintJob {
    pub fn new(
        job_id: JobId,
        document_ref: String,
        document_name: String,
        media_kind: MediaKind,
        device: String,
        options: PrintOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            document_ref,
            document_name,
            media_kind,
            device,
            options,
            total_pages: None,
            progress: 0,
            status: JobStatus::Pending,
            status_message: "Waiting to start".into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            color_analysis: None,
            document_hash: None,
            dispatch_method: None,
        }
    }
}

/// Shallow-merge update for a stored job. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPatch {
    pub progress: Option<u8>,
    pub status: Option<JobStatus>,
    pub status_message: Option<String>,
    pub total_pages: Option<u32>,
    pub completed_at: Option<DateTime<Utc>>,
    pub color_analysis: Option<ColorAnalysis>,
    pub document_hash: Option<String>,
    pub dispatch_method: Option<String>,
}

impl JobPatch {
    /// Merge this patch into `job` and bump `updated_at`.
    pub fn apply_to(&self, job: &mut PrintJob) {
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(message) = &self.status_message {
            job.status_message = message.clone();
        }
        if let Some(pages) = self.total_pages {
            job.total_pages = Some(pages);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
        if let Some(analysis) = &self.color_analysis {
            job.color_analysis = Some(analysis.clone());
        }
        if let Some(hash) = &self.document_hash {
            job.document_hash = Some(hash.clone());
        }
        if let Some(method) = &self.dispatch_method {
            job.dispatch_method = Some(method.clone());
        }
        job.updated_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Result of one complete dispatch, as reported to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub succeeded: bool,
    pub detail: String,
    /// Name of the adapter that produced this outcome.
    pub method: String,
}

/// One failed adapter attempt inside an exhausted fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub method: String,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kind_from_extension() {
        assert_eq!(MediaKind::detect("https://cdn/x/report.PDF", None), MediaKind::PagedDocument);
        assert_eq!(MediaKind::detect("/media/usb/letter.docx", None), MediaKind::OfficeDocument);
        assert_eq!(MediaKind::detect("photo.jpeg?sig=abc", None), MediaKind::Image);
        assert_eq!(MediaKind::detect("notes.txt", None), MediaKind::Other);
        assert_eq!(MediaKind::detect("no-extension", None), MediaKind::Other);
    }

    #[test]
    fn declared_content_type_wins() {
        let kind = MediaKind::detect("blob/123", Some("application/pdf; charset=binary"));
        assert_eq!(kind, MediaKind::PagedDocument);

        let kind = MediaKind::detect(
            "blob/123",
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        );
        assert_eq!(kind, MediaKind::OfficeDocument);

        // Unknown declared types fall back to the extension.
        let kind = MediaKind::detect("scan.png", Some("application/octet-stream"));
        assert_eq!(kind, MediaKind::Image);
    }

    #[test]
    fn file_name_strips_query_and_directories() {
        assert_eq!(file_name_of("https://s3/b/k/My File.pdf?X-Amz=1"), Some("My File.pdf"));
        assert_eq!(file_name_of("C:\\Users\\kiosk\\doc.docx"), Some("doc.docx"));
        assert_eq!(file_name_of("https://host/dir/"), None);
        assert_eq!(extension_of(".hidden"), None);
    }

    #[test]
    fn patch_is_shallow_merge() {
        let mut job = PrintJob::new(
            "job-1".into(),
            "a.pdf".into(),
            "a.pdf".into(),
            MediaKind::PagedDocument,
            "Front Desk".into(),
            PrintOptions::default(),
        );
        job.total_pages = Some(4);

        JobPatch {
            progress: Some(50),
            status: Some(JobStatus::Printing),
            ..Default::default()
        }
        .apply_to(&mut job);

        assert_eq!(job.progress, 50);
        assert_eq!(job.status, JobStatus::Printing);
        assert_eq!(job.total_pages, Some(4));
        assert_eq!(job.status_message, "Waiting to start");
    }

    #[test]
    fn transform_needed_only_for_page_options() {
        let mut options = PrintOptions::default();
        assert!(!options.needs_transform());

        options.copies = 3;
        options.color_mode = ColorMode::Monochrome;
        assert!(!options.needs_transform());

        options.page_selection = PageSelection::Custom("1-2".into());
        assert!(options.needs_transform());
    }

    #[test]
    fn custom_paper_media_keyword() {
        let size = PaperSize::Custom {
            width_mm: 100,
            height_mm: 150,
        };
        assert_eq!(size.media_keyword(), "Custom.100x150mm");
        assert_eq!(PaperSize::from_name(" Letter "), Some(PaperSize::Letter));
    }

    #[test]
    fn monochrome_analysis_marks_every_page() {
        let analysis = ColorAnalysis::all_black_and_white(3);
        assert_eq!(analysis.pages, vec![PageColor::BlackAndWhite; 3]);
        assert_eq!(analysis.color_pages, 0);
        assert_eq!(analysis.black_and_white_pages, 3);
    }
}
