// src/services/pdf/mod.rs

//! Low-level PDF helpers on top of `lopdf`.
//!
//! - [`merge`]: concatenate documents, preserving page order
//! - [`outline`]: write the bookmark tree
//! - [`toc`]: render the hyperlinked table of contents
//! - [`text`]: string encodings for outline titles and page text

pub mod merge;
pub mod outline;
pub mod text;
pub mod toc;

use std::path::Path;

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{AppError, Result};

/// Bytes inspected at each end of a file for the header and trailer markers.
const MARKER_WINDOW: usize = 1024;

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Cheap structural check of a PDF payload.
///
/// Returns the reason when the bytes are not a complete PDF.
pub fn verify_pdf_bytes(bytes: &[u8]) -> std::result::Result<(), String> {
    if bytes.is_empty() {
        return Err("empty file".to_string());
    }
    let head = &bytes[..bytes.len().min(MARKER_WINDOW)];
    if !contains(head, b"%PDF-") {
        return Err("missing %PDF- header".to_string());
    }
    let tail = &bytes[bytes.len().saturating_sub(MARKER_WINDOW)..];
    if !contains(tail, b"%%EOF") {
        return Err("missing %%EOF trailer marker".to_string());
    }
    Ok(())
}

/// Verify and parse a PDF held in memory.
pub fn parse_verified(path: &Path, bytes: &[u8]) -> Result<Document> {
    verify_pdf_bytes(bytes).map_err(|reason| AppError::corrupt(path, reason))?;
    let doc = Document::load_mem(bytes).map_err(|e| AppError::corrupt(path, e))?;
    if doc.get_pages().is_empty() {
        return Err(AppError::corrupt(path, "no pages"));
    }
    Ok(doc)
}

/// Read, verify and parse a PDF from disk.
pub fn load_verified(path: &Path) -> Result<Document> {
    let bytes = std::fs::read(path).map_err(|e| AppError::corrupt(path, e))?;
    parse_verified(path, &bytes)
}

/// Numeric value of an integer or real object.
pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Dictionary behind an object, following one reference.
pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        _ => None,
    }
}

/// `/Type` name of a dictionary or stream object.
pub(crate) fn type_of(obj: &Object) -> Option<&[u8]> {
    let dict = match obj {
        Object::Dictionary(d) => d,
        Object::Stream(s) => &s.dict,
        _ => return None,
    };
    match dict.get(b"Type") {
        Ok(Object::Name(name)) => Some(name.as_slice()),
        _ => None,
    }
}

/// Page attribute, looked up through the `/Parent` chain when inherited.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..64 {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Visible page area in user space, with the page's display rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct PageBox {
    pub x0: f64,
    pub y0: f64,
    pub width: f64,
    pub height: f64,
    /// Clockwise display rotation: 0, 90, 180 or 270
    pub rotate: i64,
}

/// MediaBox origin and size plus `/Rotate`, both looked up through the page tree.
pub(crate) fn page_box(doc: &Document, page_id: ObjectId) -> PageBox {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox").and_then(|obj| match obj {
        Object::Array(values) => Some(values),
        Object::Reference(id) => doc
            .get_object(id)
            .ok()
            .and_then(|o| o.as_array().ok())
            .cloned(),
        _ => None,
    });
    let rotate = inherited_attribute(doc, page_id, b"Rotate")
        .as_ref()
        .and_then(number)
        .map(|r| (r as i64).rem_euclid(360))
        .filter(|r| r % 90 == 0)
        .unwrap_or(0);
    match media_box.as_deref().map(|v| v.iter().filter_map(number).collect::<Vec<_>>()) {
        Some(b) if b.len() == 4 => PageBox {
            x0: b[0].min(b[2]),
            y0: b[1].min(b[3]),
            width: (b[2] - b[0]).abs(),
            height: (b[3] - b[1]).abs(),
            rotate,
        },
        _ => PageBox {
            x0: 0.0,
            y0: 0.0,
            width: toc::PAGE_WIDTH,
            height: toc::PAGE_HEIGHT,
            rotate,
        },
    }
}

/// PDF date string, e.g. `D:20240215103000+00'00'`.
pub fn pdf_date(at: DateTime<Utc>) -> String {
    at.format("D:%Y%m%d%H%M%S+00'00'").to_string()
}
