// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open, inspect and reshape existing PDF documents (page subset,
// orientation, paper size) using the `lopdf` crate.

use std::path::Path;

use kioskprint_core::error::KioskError;
use kioskprint_core::types::{Orientation, PageOptions, PaperSize};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, instrument, warn};

use crate::pages::select_pages;

/// Default page box when a page carries no /MediaBox anywhere in its tree.
const FALLBACK_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 595.0, 842.0];

/// Reads and reshapes existing PDF files.
///
/// Wraps `lopdf::Document`. Mutating operations work in place; call
/// [`PdfReader::to_bytes`] to serialise the result.
pub struct PdfReader {
    /// The underlying lopdf document.
    document: Document,
    /// Source path, if opened from a file (useful for diagnostics).
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KioskError> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            KioskError::PdfError(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded");

        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, KioskError> {
        let document = Document::load_mem(data).map_err(|err| {
            KioskError::PdfError(format!("failed to load PDF from memory: {}", err))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");

        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    /// Number of pages in the document.
    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Return the source path if the reader was created via [`PdfReader::open`].
    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Effective /Rotate of a page (1-indexed), normalised to 0..360.
    pub fn page_rotation(&self, page_number: u32) -> Option<i32> {
        let page_id = *self.document.get_pages().get(&page_number)?;
        Some(self.rotation_of(page_id))
    }

    /// Effective /MediaBox of a page (1-indexed) as `[llx, lly, urx, ury]`.
    pub fn page_media_box(&self, page_number: u32) -> Option<[f32; 4]> {
        let page_id = *self.document.get_pages().get(&page_number)?;
        Some(self.media_box_of(page_id))
    }

    // -- Reshaping ------------------------------------------------------------

    /// Apply every transform requested in `options`: page subset first, then
    /// paper size, then orientation.
    #[instrument(skip(self), fields(source = ?self.source_path))]
    pub fn apply(&mut self, options: &PageOptions) -> Result<(), KioskError> {
        let total = self.page_count();
        let keep = select_pages(&options.selection, total)?;
        if keep.is_empty() {
            return Err(KioskError::Validation(format!(
                "page selection {:?} leaves nothing to print from {} pages",
                options.selection, total
            )));
        }
        self.retain_pages(&keep);

        if let Some(size) = options.size {
            self.fit_to(size)?;
        }
        if let Some(orientation) = options.orientation {
            self.orient(orientation);
        }

        info!(
            kept = keep.len(),
            total,
            size = ?options.size,
            orientation = ?options.orientation,
            "PDF transformed"
        );
        Ok(())
    }

    /// Keep only the given 1-indexed pages, in document order.
    pub fn retain_pages(&mut self, keep: &[u32]) {
        let doomed: Vec<u32> = self
            .document
            .get_pages()
            .keys()
            .copied()
            .filter(|page| !keep.contains(page))
            .collect();

        if doomed.is_empty() {
            return;
        }

        debug!(removed = doomed.len(), "Removing unselected pages");
        self.document.delete_pages(&doomed);
        self.document.prune_objects();
    }

    /// Rotate every page so it presents in the requested orientation.
    ///
    /// Pages whose media box is already wider than tall count as natively
    /// landscape and are turned 90 degrees less.
    pub fn orient(&mut self, orientation: Orientation) {
        let pages: Vec<ObjectId> = self.document.get_pages().values().copied().collect();

        for page_id in pages {
            let [llx, lly, urx, ury] = self.media_box_of(page_id);
            let native_offset = if (urx - llx) > (ury - lly) { 90 } else { 0 };
            let existing = self.rotation_of(page_id);
            let rotation =
                (existing + orientation.rotation_degrees() - native_offset).rem_euclid(360);

            if let Ok(dict) = self.document.get_dictionary_mut(page_id) {
                dict.set("Rotate", Object::Integer(rotation as i64));
            }
        }
    }

    /// Scale every page's content into the given paper size, preserving
    /// aspect ratio and centring it. The new media box keeps the page's own
    /// portrait/landscape sense.
    pub fn fit_to(&mut self, size: PaperSize) -> Result<(), KioskError> {
        let (paper_w, paper_h) = size.dimensions_pt();
        let pages: Vec<ObjectId> = self.document.get_pages().values().copied().collect();

        for page_id in pages {
            let [llx, lly, urx, ury] = self.media_box_of(page_id);
            let (src_w, src_h) = (urx - llx, ury - lly);
            if src_w <= 0.0 || src_h <= 0.0 {
                warn!(?page_id, "Degenerate media box, page left unscaled");
                continue;
            }

            let (target_w, target_h) = if src_w > src_h {
                (paper_h.max(paper_w), paper_h.min(paper_w))
            } else {
                (paper_w.min(paper_h), paper_h.max(paper_w))
            };

            let scale = (target_w / src_w).min(target_h / src_h);
            let tx = (target_w - src_w * scale) / 2.0 - llx * scale;
            let ty = (target_h - src_h * scale) / 2.0 - lly * scale;

            self.wrap_contents(
                page_id,
                format!("q {scale:.5} 0 0 {scale:.5} {tx:.3} {ty:.3} cm\n").into_bytes(),
                b"\nQ\n".to_vec(),
            )?;

            let dict = self.document.get_dictionary_mut(page_id).map_err(|err| {
                KioskError::PdfError(format!("page {:?} is not a dictionary: {}", page_id, err))
            })?;
            dict.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(target_w.round() as i64),
                    Object::Integer(target_h.round() as i64),
                ]),
            );
            dict.remove(b"CropBox");
        }

        Ok(())
    }

    /// Serialise the (possibly reshaped) document.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>, KioskError> {
        let mut output = Vec::new();
        self.document.save_to(&mut output).map_err(|err| {
            KioskError::PdfError(format!("failed to serialise PDF: {}", err))
        })?;
        Ok(output)
    }

    // -- Helpers --------------------------------------------------------------

    /// Surround a page's content streams with `prefix` and `suffix` streams.
    fn wrap_contents(
        &mut self,
        page_id: ObjectId,
        prefix: Vec<u8>,
        suffix: Vec<u8>,
    ) -> Result<(), KioskError> {
        let existing = self
            .document
            .get_dictionary(page_id)
            .ok()
            .and_then(|dict| dict.get(b"Contents").ok())
            .cloned();

        let mut contents = Vec::new();
        contents.push(Object::Reference(
            self.document
                .add_object(Stream::new(Dictionary::new(), prefix)),
        ));
        match existing {
            Some(Object::Array(items)) => contents.extend(items),
            Some(other) => contents.push(other),
            None => {}
        }
        contents.push(Object::Reference(
            self.document
                .add_object(Stream::new(Dictionary::new(), suffix)),
        ));

        let dict = self.document.get_dictionary_mut(page_id).map_err(|err| {
            KioskError::PdfError(format!("page {:?} is not a dictionary: {}", page_id, err))
        })?;
        dict.set("Contents", Object::Array(contents));
        Ok(())
    }

    /// Look up a page attribute, following /Parent for inheritable keys.
    fn inherited(&self, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        let mut current = Some(page_id);
        // Page trees are shallow; the bound guards against cyclic /Parent links.
        for _ in 0..32 {
            let dict = self.document.get_dictionary(current?).ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(self.resolve(value).clone());
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        None
    }

    fn resolve<'a>(&'a self, object: &'a Object) -> &'a Object {
        match object {
            Object::Reference(id) => self.document.get_object(*id).unwrap_or(object),
            other => other,
        }
    }

    fn media_box_of(&self, page_id: ObjectId) -> [f32; 4] {
        let Some(Object::Array(values)) = self.inherited(page_id, b"MediaBox") else {
            return FALLBACK_MEDIA_BOX;
        };
        let numbers: Vec<f32> = values
            .iter()
            .filter_map(|v| self.resolve(v).as_float().ok())
            .collect();
        match numbers.as_slice() {
            [a, b, c, d] => [*a, *b, *c, *d],
            _ => FALLBACK_MEDIA_BOX,
        }
    }

    fn rotation_of(&self, page_id: ObjectId) -> i32 {
        self.inherited(page_id, b"Rotate")
            .and_then(|r| r.as_i64().ok())
            .map(|v| (v as i32).rem_euclid(360))
            .unwrap_or(0)
    }
}

/// Build an in-memory PDF with `pages` blank A4 pages. Test fixture.
#[cfg(test)]
pub(crate) fn sample_pdf(pages: u32) -> Vec<u8> {
    use lopdf::dictionary;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for number in 1..=pages {
        let content = Stream::new(
            dictionary! {},
            format!("BT 72 720 Td (Page {number}) Tj ET").into_bytes(),
        );
        let content_id = doc.add_object(content);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).expect("serialise sample pdf");
    out
}
