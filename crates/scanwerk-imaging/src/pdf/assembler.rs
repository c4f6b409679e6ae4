// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document assembler: one PDF page per processed page, in input order.
//
// Pages are generated with `printpdf` 0.8 (one `PdfPage` per image, the image
// XObject scaled to cover the whole MediaBox). The document information
// dictionary (title, producer, creator, creation date) is then rewritten with
// `lopdf`.

use std::path::Path;

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object};
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{PageLayout, PageOutcome, ProcessedPage};
use tracing::{debug, info, instrument, warn};

const MM_PER_INCH: f32 = 25.4;
const PT_PER_INCH: f32 = 72.0;
pub const DEFAULT_PRODUCER: &str = concat!("Scanwerk ", env!("CARGO_PKG_VERSION"));

/// The finished document.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

impl AssembledDocument {
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), &self.bytes)?;
        info!(path = %path.as_ref().display(), "Wrote assembled PDF");
        Ok(())
    }
}

/// Builds a PDF from processed pages.
#[derive(Debug, Clone)]
pub struct DocumentAssembler {
    title: String,
    producer: String,
    layout: PageLayout,
    created_at: Option<DateTime<Utc>>,
}

impl DocumentAssembler {
    pub fn new(title: impl Into<String>, layout: PageLayout) -> Self {
        Self {
            title: title.into(),
            producer: DEFAULT_PRODUCER.to_string(),
            layout,
            created_at: None,
        }
    }

    pub fn with_producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = producer.into();
        self
    }

    /// Pin the creation timestamp instead of using the current time.
    pub fn with_creation_date(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Page size in millimetres for an image of `width` x `height` pixels.
    fn page_size_mm(&self, width: u32, height: u32) -> (f32, f32) {
        match self.layout {
            PageLayout::ImageSized { dpi } => (
                width as f32 / dpi * MM_PER_INCH,
                height as f32 / dpi * MM_PER_INCH,
            ),
            PageLayout::Fixed { paper } => {
                let (w, h) = paper.dimensions_mm();
                (w as f32, h as f32)
            }
        }
    }

    /// Assemble every processed outcome, skipping failed pages.
    pub fn assemble_outcomes(&self, outcomes: &[PageOutcome]) -> Result<AssembledDocument> {
        let pages: Vec<ProcessedPage> = outcomes
            .iter()
            .filter_map(|outcome| {
                let page = outcome.as_processed().cloned();
                if page.is_none() {
                    warn!(index = outcome.index(), "Failed page left out of document");
                }
                page
            })
            .collect();
        self.assemble(&pages)
    }

    /// Build the PDF. Pages appear in the order given; the first page whose
    /// image cannot be embedded aborts the whole document with
    /// [`ScanError::PageEmbed`] naming its position.
    #[instrument(skip(self, pages), fields(pages = pages.len(), title = %self.title))]
    pub fn assemble(&self, pages: &[ProcessedPage]) -> Result<AssembledDocument> {
        if pages.is_empty() {
            return Err(ScanError::Encode("document has no pages".into()));
        }
        info!(layout = ?self.layout, "Assembling document");

        let mut doc = PdfDocument::new(&self.title);
        let mut pdf_pages = Vec::with_capacity(pages.len());

        for (index, page) in pages.iter().enumerate() {
            let decoded = ::image::load_from_memory(&page.output).map_err(|err| ScanError::PageEmbed {
                index,
                reason: err.to_string(),
            })?;
            let (img_w, img_h) = (decoded.width(), decoded.height());
            if img_w == 0 || img_h == 0 {
                return Err(ScanError::PageEmbed {
                    index,
                    reason: "image has no pixels".into(),
                });
            }

            let raw = RawImage {
                pixels: RawImageData::U8(decoded.to_rgb8().into_raw()),
                width: img_w as usize,
                height: img_h as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let (page_w, page_h) = self.page_size_mm(img_w, img_h);
            let page_w_pt = Mm(page_w).into_pt().0;
            let page_h_pt = Mm(page_h).into_pt().0;

            // At 72 dpi one pixel is one point, so the scale is the page size
            // in points over the pixel count.
            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: Some(page_w_pt / img_w as f32),
                    scale_y: Some(page_h_pt / img_h as f32),
                    dpi: Some(PT_PER_INCH),
                    rotate: None,
                },
            }];
            pdf_pages.push(PdfPage::new(Mm(page_w), Mm(page_h), ops));
            debug!(index, img_w, img_h, page_w, page_h, "Page placed");
        }

        doc.with_pages(pdf_pages);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let generated = doc.save(&PdfSaveOptions::default(), &mut warnings);
        if !warnings.is_empty() {
            debug!(count = warnings.len(), "printpdf reported warnings");
        }

        let bytes = self.write_info(&generated)?;
        info!(pages = pages.len(), bytes = bytes.len(), "Document assembled");
        Ok(AssembledDocument {
            bytes,
            page_count: pages.len(),
        })
    }

    /// Rewrite the document information dictionary.
    fn write_info(&self, pdf: &[u8]) -> Result<Vec<u8>> {
        let mut doc = Document::load_mem(pdf)
            .map_err(|err| ScanError::Encode(format!("generated PDF unreadable: {}", err)))?;

        let created = self.created_at.unwrap_or_else(Utc::now);
        let mut info = Dictionary::new();
        info.set("Title", Object::string_literal(self.title.as_str()));
        info.set("Producer", Object::string_literal(self.producer.as_str()));
        info.set("Creator", Object::string_literal(self.producer.as_str()));
        info.set(
            "CreationDate",
            Object::string_literal(created.format("D:%Y%m%d%H%M%SZ").to_string()),
        );

        let existing = match doc.trailer.get(b"Info") {
            Ok(Object::Reference(id)) if doc.objects.contains_key(id) => Some(*id),
            _ => None,
        };
        match existing {
            Some(id) => {
                doc.objects.insert(id, Object::Dictionary(info));
            }
            None => {
                let id = doc.add_object(Object::Dictionary(info));
                doc.trailer.set("Info", Object::Reference(id));
            }
        }

        let mut out = Vec::new();
        doc.save_to(&mut out)
            .map_err(|err| ScanError::Encode(format!("PDF serialisation failed: {}", err)))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use scanwerk_core::{CropArea, FailedPage, ErrorKind, PageMeta, PageStatus, PaperSize};

    use super::*;
    use crate::buffer::PixelBuffer;

    fn page(index: usize, width: u32, height: u32) -> ProcessedPage {
        let output = PixelBuffer::from_pixel(width, height, [240, 240, 240, 255])
            .to_jpeg_bytes(80)
            .expect("jpeg");
        let mut meta = PageMeta::new(index);
        meta.status = PageStatus::Processed;
        ProcessedPage {
            meta,
            output_size: output.len(),
            output,
            thumbnail: Vec::new(),
            width,
            height,
            quad: None,
            strategy: None,
            crop: CropArea::full(width, height),
            digest: String::new(),
            corrected: false,
            duration: Duration::ZERO,
        }
    }

    fn media_box_width(doc: &Document, page_id: lopdf::ObjectId) -> f64 {
        let dict = doc
            .get_object(page_id)
            .and_then(Object::as_dict)
            .expect("page dict");
        let media_box = dict.get(b"MediaBox").and_then(Object::as_array).expect("media box");
        match &media_box[2] {
            Object::Integer(v) => *v as f64,
            Object::Real(v) => *v as f64,
            other => panic!("unexpected MediaBox entry {:?}", other),
        }
    }

    #[test]
    fn pages_keep_input_order() {
        let pages = vec![page(0, 100, 50), page(1, 200, 50), page(2, 300, 50)];
        let assembler = DocumentAssembler::new("Order", PageLayout::ImageSized { dpi: 100.0 });
        let doc = assembler.assemble(&pages).expect("assemble");
        assert_eq!(doc.page_count, 3);

        let parsed = Document::load_mem(&doc.bytes).expect("parse");
        let widths: Vec<f64> = parsed
            .get_pages()
            .values()
            .map(|id| media_box_width(&parsed, *id))
            .collect();
        // 100 px at 100 dpi is one inch, 72 pt.
        for (got, want) in widths.iter().zip([72.0, 144.0, 216.0]) {
            assert!((got - want).abs() < 0.5, "{:?}", widths);
        }
    }

    #[test]
    fn fixed_layout_uses_paper_size() {
        let assembler = DocumentAssembler::new("A4", PageLayout::Fixed { paper: PaperSize::A4 });
        let doc = assembler.assemble(&[page(0, 120, 80)]).expect("assemble");
        let parsed = Document::load_mem(&doc.bytes).expect("parse");
        let id = *parsed.get_pages().values().next().expect("one page");
        // 210 mm = 595.3 pt
        assert!((media_box_width(&parsed, id) - 595.3).abs() < 1.0);
    }

    #[test]
    fn bad_page_bytes_name_the_index() {
        let mut pages = vec![page(0, 10, 10), page(1, 10, 10), page(2, 10, 10)];
        pages[1].output = vec![0, 1, 2, 3];
        let err = DocumentAssembler::new("Broken", PageLayout::default())
            .assemble(&pages)
            .unwrap_err();
        assert!(matches!(err, ScanError::PageEmbed { index: 1, .. }));
    }

    #[test]
    fn empty_input_is_an_encode_failure() {
        let err = DocumentAssembler::new("Empty", PageLayout::default())
            .assemble(&[])
            .unwrap_err();
        assert!(matches!(err, ScanError::Encode(_)));
    }

    #[test]
    fn info_dictionary_carries_metadata() {
        let created = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).single().expect("date");
        let doc = DocumentAssembler::new("Receipts", PageLayout::default())
            .with_producer("scanwerk-test")
            .with_creation_date(created)
            .assemble(&[page(0, 20, 20)])
            .expect("assemble");

        let parsed = Document::load_mem(&doc.bytes).expect("parse");
        let info_id = parsed
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .expect("info ref");
        let info = parsed.get_dictionary(info_id).expect("info dict");
        let text = |key: &[u8]| {
            info.get(key)
                .and_then(Object::as_str)
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .expect("string")
        };
        assert_eq!(text(b"Title"), "Receipts");
        assert_eq!(text(b"Producer"), "scanwerk-test");
        assert_eq!(text(b"CreationDate"), "D:20260314150926Z");
    }

    #[test]
    fn failed_outcomes_are_left_out() {
        let mut meta = PageMeta::new(1);
        meta.status = PageStatus::Error;
        let outcomes = vec![
            PageOutcome::Processed(page(0, 10, 10)),
            PageOutcome::Failed(FailedPage {
                meta,
                kind: ErrorKind::DecodeFailure,
                reason: "garbage".into(),
            }),
            PageOutcome::Processed(page(2, 10, 10)),
        ];
        let doc = DocumentAssembler::new("Partial", PageLayout::default())
            .assemble_outcomes(&outcomes)
            .expect("assemble");
        assert_eq!(doc.page_count, 2);
    }
}
