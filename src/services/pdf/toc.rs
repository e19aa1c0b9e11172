// src/services/pdf/toc.rs

//! Hyperlinked table of contents pages.

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use super::text::{truncate, win_ansi_literal};
use crate::error::Result;
use crate::models::OutlineLine;

pub const PAGE_WIDTH: f64 = 595.0;
pub const PAGE_HEIGHT: f64 = 842.0;
const MARGIN: f64 = 56.0;
const LINE_HEIGHT: f64 = 14.0;
const FONT_SIZE: f64 = 10.0;
const TITLE_SIZE: f64 = 14.0;
const INDENT: f64 = 12.0;
/// Width reserved on the right for page numbers.
const NUMBER_COLUMN: f64 = 40.0;

/// Entry slots on a full page.
pub const LINES_PER_PAGE: usize = 52;
/// Slots taken by the header on the first page.
const HEADER_LINES: usize = 4;

/// Header block of the first TOC page.
#[derive(Debug, Clone)]
pub struct TocHeader {
    pub title: String,
    pub subtitle: String,
    pub generated: String,
}

/// Number of pages needed for `entries` lines.
pub fn page_count(entries: usize) -> usize {
    let first = LINES_PER_PAGE - HEADER_LINES;
    if entries <= first {
        1
    } else {
        1 + (entries - first).div_ceil(LINES_PER_PAGE)
    }
}

fn real(v: f64) -> Object {
    Object::Real(v as _)
}

fn show_text(ops: &mut Vec<Operation>, font: &str, size: f64, x: f64, y: f64, text: &str) {
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tf", vec![font.into(), real(size)]));
    ops.push(Operation::new("Td", vec![real(x), real(y)]));
    ops.push(Operation::new("Tj", vec![win_ansi_literal(text)]));
    ops.push(Operation::new("ET", vec![]));
}

/// Baseline of slot `slot` counted from the top margin.
fn baseline(slot: usize) -> f64 {
    PAGE_HEIGHT - MARGIN - (slot as f64 + 1.0) * LINE_HEIGHT
}

/// Insert TOC pages in front of the document's pages.
///
/// `lines[i].target_page` indexes the final page sequence, TOC pages
/// included; `content_pages` are the pages that follow the TOC.
pub fn insert_toc(
    doc: &mut Document,
    pages_id: ObjectId,
    header: &TocHeader,
    lines: &[OutlineLine],
    content_pages: &[ObjectId],
) -> Result<Vec<ObjectId>> {
    let toc_ids: Vec<ObjectId> = (0..page_count(lines.len()))
        .map(|_| doc.new_object_id())
        .collect();
    let all_pages: Vec<ObjectId> = toc_ids.iter().chain(content_pages).copied().collect();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut remaining = lines;
    for (page_no, &page_id) in toc_ids.iter().enumerate() {
        let mut ops = Vec::new();
        let mut annots = Vec::new();
        let first_slot = if page_no == 0 {
            show_text(&mut ops, "F2", TITLE_SIZE, MARGIN, baseline(0), &header.title);
            show_text(&mut ops, "F1", FONT_SIZE, MARGIN, baseline(1), &header.subtitle);
            show_text(&mut ops, "F1", FONT_SIZE, MARGIN, baseline(2), &header.generated);
            HEADER_LINES
        } else {
            0
        };

        let take = (LINES_PER_PAGE - first_slot).min(remaining.len());
        let (chunk, rest) = remaining.split_at(take);
        remaining = rest;

        for (i, line) in chunk.iter().enumerate() {
            let y = baseline(first_slot + i);
            let x = MARGIN + line.depth as f64 * INDENT;
            let width = PAGE_WIDTH - MARGIN - NUMBER_COLUMN - x;
            // Helvetica averages about half the font size per glyph.
            let max_chars = (width / (FONT_SIZE * 0.5)).max(8.0) as usize;
            let font = if line.depth == 0 { "F2" } else { "F1" };
            let target = line.target_page.min(all_pages.len().saturating_sub(1));

            show_text(&mut ops, font, FONT_SIZE, x, y, &truncate(&line.label, max_chars));
            show_text(
                &mut ops,
                "F1",
                FONT_SIZE,
                PAGE_WIDTH - MARGIN - NUMBER_COLUMN + 16.0,
                y,
                &(target + 1).to_string(),
            );

            annots.push(doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => vec![
                    real(MARGIN),
                    real(y - 3.0),
                    real(PAGE_WIDTH - MARGIN),
                    real(y + LINE_HEIGHT - 3.0),
                ],
                "Border" => vec![0.into(), 0.into(), 0.into()],
                "Dest" => vec![Object::Reference(all_pages[target]), "Fit".into()],
            }));
        }

        let content = Content { operations: ops };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), real(PAGE_WIDTH), real(PAGE_HEIGHT)],
                "Resources" => dictionary! {
                    "Font" => dictionary! { "F1" => font_id, "F2" => bold_id },
                },
                "Contents" => content_id,
                "Annots" => annots.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            }),
        );
    }

    let pages = doc.get_object_mut(pages_id).and_then(|o| o.as_dict_mut())?;
    let mut kids: Vec<Object> = toc_ids.iter().map(|&id| Object::Reference(id)).collect();
    kids.extend(
        pages
            .get(b"Kids")
            .and_then(|k| k.as_array())
            .cloned()
            .unwrap_or_default(),
    );
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", kids);

    Ok(toc_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pdf::merge::merge_documents;
    use crate::testing::text_pdf;

    fn header() -> TocHeader {
        TocHeader {
            title: "ÍNDICE DE CONTENIDOS".into(),
            subtitle: "AIP".into(),
            generated: "Generado: 01/01/2024 00:00".into(),
        }
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 1);
        assert_eq!(page_count(48), 1);
        assert_eq!(page_count(49), 2);
        assert_eq!(page_count(48 + 52), 2);
        assert_eq!(page_count(48 + 53), 3);
    }

    #[test]
    fn test_insert_toc_prepends_linked_pages() {
        let mut merged =
            merge_documents(vec![Document::load_mem(&text_pdf(3, "doc")).unwrap()]).unwrap();
        let lines: Vec<OutlineLine> = (0..60)
            .map(|i| OutlineLine {
                depth: i % 3,
                label: format!("Entrada {i}"),
                target_page: 2 + i % 3,
            })
            .collect();

        let toc_ids = insert_toc(
            &mut merged.doc,
            merged.pages_id,
            &header(),
            &lines,
            &merged.page_ids,
        )
        .unwrap();
        assert_eq!(toc_ids.len(), 2);

        let mut bytes = Vec::new();
        merged.doc.save_to(&mut bytes).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        assert_eq!(pages.len(), 5);
        assert_eq!(pages[..2], toc_ids[..]);

        let first = doc.get_dictionary(pages[0]).unwrap();
        let annots = first.get(b"Annots").unwrap().as_array().unwrap();
        assert_eq!(annots.len(), 48);
        let link = doc
            .get_dictionary(annots[0].as_reference().unwrap())
            .unwrap();
        let dest = link.get(b"Dest").unwrap().as_array().unwrap();
        assert_eq!(dest[0].as_reference().unwrap(), pages[2]);
    }
}
