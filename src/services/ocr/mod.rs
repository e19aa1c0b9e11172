// src/services/ocr/mod.rs

//! OCR augmentation of scanned pages.
//!
//! Pages are classified by their content stream. Image-only pages are
//! rendered and recognized by a [`TextRecognizer`]; recognized words are
//! written back as invisible text (render mode 3) over their bounding
//! boxes, so the page looks the same but becomes searchable.

mod tesseract;

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};

use crate::error::{AppError, Result};
use crate::models::OcrConfig;
use crate::services::pdf::text::win_ansi_literal;
use crate::services::pdf::{self, PageBox, inherited_attribute, resolve_dict};
use crate::utils::fs::write_atomic;

pub use tesseract::{TesseractRecognizer, parse_tsv};

/// Font resource name used for the overlay.
const OCR_FONT: &str = "FOcr";

/// One recognized word, in rendered-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrWord {
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Engine turning a rendered page into positioned words.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can run on this machine.
    fn is_available(&self) -> bool;

    /// Recognize one page (1-based) of the PDF at `dpi`.
    fn recognize_page(&self, pdf_path: &Path, page_number: u32, dpi: u32) -> Result<Vec<OcrWord>>;
}

/// Content class of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    TextBearing,
    ImageOnly,
    Blank,
}

/// Outcome of augmenting one document.
#[derive(Debug, Default, Clone)]
pub struct OcrReport {
    pub pages: usize,
    pub image_only: usize,
    pub blank: usize,
    /// Pages that received a text overlay
    pub recognized: usize,
    /// Per-page recognition problems
    pub warnings: Vec<String>,
}

impl OcrReport {
    pub fn wrote_copy(&self) -> bool {
        self.recognized > 0
    }
}

/// Text bytes shown and images painted by a page.
fn page_inventory(doc: &Document, page_id: ObjectId) -> (usize, usize) {
    let Ok(raw) = doc.get_page_content(page_id) else {
        return (0, 0);
    };
    let Ok(content) = Content::decode(&raw) else {
        return (0, 0);
    };
    let xobjects = inherited_attribute(doc, page_id, b"Resources")
        .as_ref()
        .and_then(|r| resolve_dict(doc, r).cloned())
        .and_then(|r| r.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)).cloned());

    let mut text = 0;
    let mut images = 0;
    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" | "'" | "\"" | "TJ" => text += shown_bytes(&op.operands),
            "BI" => images += 1,
            "Do" => {
                let name = op.operands.first().and_then(|o| o.as_name().ok());
                if let (Some(name), Some(xobjects)) = (name, &xobjects) {
                    if is_image_xobject(doc, xobjects, name) {
                        images += 1;
                    }
                }
            }
            _ => {}
        }
    }
    (text, images)
}

fn shown_bytes(operands: &[Object]) -> usize {
    operands
        .iter()
        .map(|o| match o {
            Object::String(bytes, _) => bytes.iter().filter(|b| !b.is_ascii_whitespace()).count(),
            Object::Array(items) => shown_bytes(items),
            _ => 0,
        })
        .sum()
}

/// Image XObject, or a form XObject that paints one.
fn is_image_xobject(doc: &Document, xobjects: &Dictionary, name: &[u8]) -> bool {
    let Some(stream) = xobjects
        .get(name)
        .ok()
        .and_then(|o| o.as_reference().ok())
        .and_then(|id| doc.get_object(id).ok())
        .and_then(|o| o.as_stream().ok())
    else {
        return false;
    };
    match stream.dict.get(b"Subtype") {
        Ok(Object::Name(n)) if n == b"Image" => true,
        Ok(Object::Name(n)) if n == b"Form" => stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|r| resolve_dict(doc, r))
            .and_then(|r| r.get(b"XObject").ok())
            .and_then(|x| resolve_dict(doc, x))
            .is_some_and(|inner| {
                inner.iter().any(|(_, v)| {
                    v.as_reference()
                        .ok()
                        .and_then(|id| doc.get_object(id).ok())
                        .and_then(|o| o.as_stream().ok())
                        .is_some_and(|s| matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"))
                })
            }),
        _ => false,
    }
}

/// Classify one page.
pub fn classify_page(doc: &Document, page_id: ObjectId, min_text_chars: usize) -> PageClass {
    let (text, images) = page_inventory(doc, page_id);
    if images > 0 && text < min_text_chars {
        PageClass::ImageOnly
    } else if images == 0 && text == 0 {
        PageClass::Blank
    } else {
        PageClass::TextBearing
    }
}

/// Classify every page, in page order.
pub fn classify_pages(doc: &Document, min_text_chars: usize) -> Vec<PageClass> {
    doc.get_pages()
        .into_values()
        .map(|id| classify_page(doc, id, min_text_chars))
        .collect()
}

fn real(v: f64) -> Object {
    Object::Real(v as _)
}

/// Give the page its own resource dictionary with the overlay font.
fn install_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> Result<()> {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .as_ref()
        .and_then(|r| resolve_dict(doc, r).cloned())
        .unwrap_or_default();
    let mut fonts = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dict(doc, f).cloned())
        .unwrap_or_default();
    fonts.set(OCR_FONT, font_id);
    resources.set("Font", fonts);

    let page = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut())?;
    page.set("Resources", resources);
    Ok(())
}

/// Text matrix placing a word's baseline under its box in the rendered image.
///
/// Rendered pixels follow the displayed page, so the box is mapped back
/// through `/Rotate` into user space and the text is turned with the page.
fn text_matrix(page: &PageBox, word: &OcrWord, scale: f64) -> [f64; 6] {
    let left = word.left * scale;
    let bottom = (word.top + word.height) * scale;
    let PageBox { x0, y0, width, height, .. } = *page;
    match page.rotate {
        90 => [0.0, 1.0, -1.0, 0.0, x0 + bottom, y0 + left],
        180 => [-1.0, 0.0, 0.0, -1.0, x0 + width - left, y0 + bottom],
        270 => [0.0, -1.0, 1.0, 0.0, x0 + width - bottom, y0 + height - left],
        _ => [1.0, 0.0, 0.0, 1.0, x0 + left, y0 + height - bottom],
    }
}

/// Overlay words on a page as invisible text.
fn overlay_words(
    doc: &mut Document,
    page_id: ObjectId,
    words: &[OcrWord],
    dpi: u32,
    font_id: ObjectId,
) -> Result<()> {
    let page = pdf::page_box(doc, page_id);
    let scale = 72.0 / f64::from(dpi);

    let mut ops = vec![
        Operation::new("Q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new("Tr", vec![Object::Integer(3)]),
    ];
    for word in words {
        let size = (word.height * scale).max(1.0);
        let natural = 0.5 * size * word.text.chars().count().max(1) as f64;
        let stretch = (100.0 * word.width * scale / natural).clamp(10.0, 500.0);

        ops.push(Operation::new("Tf", vec![OCR_FONT.into(), real(size)]));
        ops.push(Operation::new("Tz", vec![real(stretch)]));
        ops.push(Operation::new(
            "Tm",
            text_matrix(&page, word, scale).into_iter().map(real).collect(),
        ));
        ops.push(Operation::new("Tj", vec![win_ansi_literal(&word.text)]));
    }
    ops.push(Operation::new("ET", vec![]));

    let save = Content {
        operations: vec![Operation::new("q", vec![])],
    };
    let overlay = Content { operations: ops };
    let save_id = doc.add_object(Stream::new(dictionary! {}, save.encode()?));
    let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay.encode()?));

    install_font(doc, page_id, font_id)?;

    let page = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut())?;
    let mut contents = vec![Object::Reference(save_id)];
    match page.get(b"Contents") {
        Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
        Ok(other) => contents.push(other.clone()),
        Err(_) => {}
    }
    contents.push(Object::Reference(overlay_id));
    page.set("Contents", contents);
    Ok(())
}

/// Adds a searchable text layer to scanned pages.
pub struct OcrAugmenter {
    recognizer: Box<dyn TextRecognizer>,
    min_text_chars: usize,
    render_dpi: u32,
}

impl OcrAugmenter {
    pub fn new(recognizer: Box<dyn TextRecognizer>, config: &OcrConfig) -> Self {
        Self {
            recognizer,
            min_text_chars: config.min_text_chars,
            render_dpi: config.render_dpi,
        }
    }

    /// Augmenter backed by the command-line tesseract engine.
    pub fn tesseract(config: &OcrConfig) -> Self {
        Self::new(Box::new(TesseractRecognizer::new(&config.language)), config)
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_available()
    }

    /// Recognize image-only pages of `source` and write the result to `dest`.
    ///
    /// `dest` is written only when at least one page received text.
    /// Per-page recognition failures are collected as warnings.
    pub fn augment(&self, source: &Path, dest: &Path) -> Result<OcrReport> {
        let mut doc = pdf::load_verified(source)?;
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let classes: Vec<PageClass> = pages
            .iter()
            .map(|&id| classify_page(&doc, id, self.min_text_chars))
            .collect();

        let mut report = OcrReport {
            pages: pages.len(),
            image_only: classes.iter().filter(|c| **c == PageClass::ImageOnly).count(),
            blank: classes.iter().filter(|c| **c == PageClass::Blank).count(),
            ..OcrReport::default()
        };
        if report.image_only == 0 {
            return Ok(report);
        }
        if !self.recognizer.is_available() {
            return Err(AppError::OcrUnavailable(format!(
                "{} is not installed",
                self.recognizer.name()
            )));
        }

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        for (index, (&page_id, class)) in pages.iter().zip(&classes).enumerate() {
            if *class != PageClass::ImageOnly {
                continue;
            }
            let page_number = index as u32 + 1;
            match self
                .recognizer
                .recognize_page(source, page_number, self.render_dpi)
            {
                Ok(words) if words.is_empty() => {
                    log::debug!("No words recognized on page {} of {}", page_number, source.display());
                }
                Ok(words) => {
                    overlay_words(&mut doc, page_id, &words, self.render_dpi, font_id)?;
                    report.recognized += 1;
                }
                Err(e) => {
                    log::warn!("OCR failed on page {} of {}: {}", page_number, source.display(), e);
                    report.warnings.push(format!("page {page_number}: {e}"));
                }
            }
        }

        if report.wrote_copy() {
            let mut bytes = Vec::new();
            doc.save_to(&mut bytes)?;
            write_atomic(dest, &bytes).map_err(|e| AppError::assembly_io(dest, e))?;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use super::*;
    use crate::testing::{blank_pdf, image_pdf, text_pdf};

    struct FakeRecognizer {
        available: bool,
        fail_page: Option<u32>,
        calls: AtomicUsize,
    }

    impl FakeRecognizer {
        fn boxed(available: bool, fail_page: Option<u32>) -> Box<Self> {
            Box::new(Self {
                available,
                fail_page,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl TextRecognizer for FakeRecognizer {
        fn name(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn recognize_page(&self, _pdf: &Path, page_number: u32, _dpi: u32) -> Result<Vec<OcrWord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_page == Some(page_number) {
                return Err(AppError::validation("engine crashed"));
            }
            Ok(vec![word()])
        }
    }

    fn doc(bytes: &[u8]) -> Document {
        Document::load_mem(bytes).unwrap()
    }

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    /// Scanned PDF whose first page has its own MediaBox and rotation.
    fn reshaped_scan(media_box: [i64; 4], rotate: i64) -> Vec<u8> {
        let mut scan = doc(&image_pdf(1));
        let page_id = *scan.get_pages().values().next().unwrap();
        let page = scan.get_object_mut(page_id).unwrap().as_dict_mut().unwrap();
        page.set("MediaBox", Object::Array(media_box.map(Object::Integer).to_vec()));
        page.set("Rotate", Object::Integer(rotate));
        let mut bytes = Vec::new();
        scan.save_to(&mut bytes).unwrap();
        bytes
    }

    fn overlay_matrix(path: &Path) -> Vec<f64> {
        let out = Document::load(path).unwrap();
        let first = *out.get_pages().values().next().unwrap();
        let content = Content::decode(&out.get_page_content(first).unwrap()).unwrap();
        let tm = content
            .operations
            .iter()
            .find(|op| op.operator == "Tm")
            .unwrap();
        tm.operands.iter().filter_map(pdf::number).collect()
    }

    fn word() -> OcrWord {
        OcrWord {
            text: "PISTA".to_string(),
            left: 144.0,
            top: 288.0,
            width: 200.0,
            height: 40.0,
        }
    }

    #[test]
    fn test_text_matrix_follows_rotation() {
        let mut page = PageBox {
            x0: 10.0,
            y0: 20.0,
            width: 600.0,
            height: 800.0,
            rotate: 0,
        };
        let cases = [
            (0, [1.0, 0.0, 0.0, 1.0, 82.0, 656.0]),
            (90, [0.0, 1.0, -1.0, 0.0, 174.0, 92.0]),
            (180, [-1.0, 0.0, 0.0, -1.0, 538.0, 184.0]),
            (270, [0.0, -1.0, 1.0, 0.0, 446.0, 748.0]),
        ];
        for (rotate, expected) in cases {
            page.rotate = rotate;
            assert_eq!(text_matrix(&page, &word(), 0.5), expected, "rotate {rotate}");
        }
    }

    #[test]
    fn test_overlay_honors_media_box_origin() {
        let tmp = TempDir::new().unwrap();
        let source = write(&tmp, "scan.pdf", &reshaped_scan([0, 200, 595, 1042], 0));
        let dest = tmp.path().join("scan.ocr.pdf");

        let config = OcrConfig {
            render_dpi: 144,
            ..OcrConfig::default()
        };
        let augmenter = OcrAugmenter::new(FakeRecognizer::boxed(true, None), &config);
        augmenter.augment(&source, &dest).unwrap();

        assert_eq!(overlay_matrix(&dest), vec![1.0, 0.0, 0.0, 1.0, 72.0, 878.0]);
    }

    #[test]
    fn test_overlay_on_rotated_page() {
        let tmp = TempDir::new().unwrap();
        let source = write(&tmp, "chart.pdf", &reshaped_scan([0, 0, 595, 842], 90));
        let dest = tmp.path().join("chart.ocr.pdf");

        let config = OcrConfig {
            render_dpi: 144,
            ..OcrConfig::default()
        };
        let augmenter = OcrAugmenter::new(FakeRecognizer::boxed(true, None), &config);
        augmenter.augment(&source, &dest).unwrap();

        assert_eq!(overlay_matrix(&dest), vec![0.0, 1.0, -1.0, 0.0, 164.0, 72.0]);
    }

    #[test]
    fn test_classify_pages() {
        let long = "x".repeat(150);
        assert_eq!(
            classify_pages(&doc(&text_pdf(1, &long)), 100),
            vec![PageClass::TextBearing]
        );
        assert_eq!(
            classify_pages(&doc(&image_pdf(2)), 100),
            vec![PageClass::ImageOnly, PageClass::ImageOnly]
        );
        assert_eq!(classify_pages(&doc(&blank_pdf()), 100), vec![PageClass::Blank]);
    }

    #[test]
    fn test_short_text_without_images_is_text_bearing() {
        assert_eq!(
            classify_pages(&doc(&text_pdf(1, "GEN")), 100),
            vec![PageClass::TextBearing]
        );
    }

    #[test]
    fn test_augment_overlays_invisible_text() {
        let tmp = TempDir::new().unwrap();
        let source = write(&tmp, "scan.pdf", &image_pdf(2));
        let dest = tmp.path().join("scan.ocr.pdf");

        let augmenter = OcrAugmenter::new(FakeRecognizer::boxed(true, None), &OcrConfig::default());
        let report = augmenter.augment(&source, &dest).unwrap();

        assert_eq!(report.pages, 2);
        assert_eq!(report.image_only, 2);
        assert_eq!(report.recognized, 2);

        let out = Document::load(&dest).unwrap();
        let first = *out.get_pages().values().next().unwrap();
        let content = String::from_utf8_lossy(&out.get_page_content(first).unwrap()).into_owned();
        assert!(content.contains("3 Tr"));
        assert!(content.contains("PISTA"));
        // Original painting is preserved.
        assert!(content.contains("/Im1 Do"));
    }

    #[test]
    fn test_augment_skips_text_documents() {
        let tmp = TempDir::new().unwrap();
        let source = write(&tmp, "text.pdf", &text_pdf(1, &"y".repeat(200)));
        let dest = tmp.path().join("text.ocr.pdf");

        let recognizer = FakeRecognizer::boxed(true, None);
        let augmenter = OcrAugmenter::new(recognizer, &OcrConfig::default());
        let report = augmenter.augment(&source, &dest).unwrap();

        assert_eq!(report.image_only, 0);
        assert!(!dest.exists());
    }

    #[test]
    fn test_unavailable_engine_is_reported() {
        let tmp = TempDir::new().unwrap();
        let source = write(&tmp, "scan.pdf", &image_pdf(1));
        let dest = tmp.path().join("scan.ocr.pdf");

        let augmenter = OcrAugmenter::new(FakeRecognizer::boxed(false, None), &OcrConfig::default());
        let err = augmenter.augment(&source, &dest).unwrap_err();
        assert!(matches!(err, AppError::OcrUnavailable(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_page_failure_is_a_warning() {
        let tmp = TempDir::new().unwrap();
        let source = write(&tmp, "scan.pdf", &image_pdf(2));
        let dest = tmp.path().join("scan.ocr.pdf");

        let augmenter =
            OcrAugmenter::new(FakeRecognizer::boxed(true, Some(1)), &OcrConfig::default());
        let report = augmenter.augment(&source, &dest).unwrap();

        assert_eq!(report.recognized, 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(dest.exists());
    }
}
