// src/services/pdf/outline.rs

//! Document outline (bookmarks).

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};

use super::text::text_string;
use crate::error::Result;
use crate::models::{BookmarkNode, OutlineLine};

fn destination(pages: &[ObjectId], target: usize) -> Object {
    let index = target.min(pages.len().saturating_sub(1));
    Object::Array(vec![Object::Reference(pages[index]), "Fit".into()])
}

/// Write sibling items under `parent`, returning the first and last ids.
fn write_items(
    doc: &mut Document,
    parent: ObjectId,
    nodes: &[BookmarkNode],
    pages: &[ObjectId],
) -> (ObjectId, ObjectId) {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| doc.new_object_id()).collect();

    for (i, node) in nodes.iter().enumerate() {
        let mut item = dictionary! {
            "Title" => text_string(&node.label),
            "Parent" => parent,
            "Dest" => destination(pages, node.target_page),
        };
        if i > 0 {
            item.set("Prev", ids[i - 1]);
        }
        if i + 1 < ids.len() {
            item.set("Next", ids[i + 1]);
        }
        if !node.children.is_empty() {
            let (first, last) = write_items(doc, ids[i], &node.children, pages);
            item.set("First", first);
            item.set("Last", last);
            // Negative count: collapsed on open.
            item.set("Count", Object::Integer(-(node.descendant_count() as i64)));
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }

    (ids[0], ids[ids.len() - 1])
}

/// Attach an outline built from `roots` to the document catalog.
///
/// `pages` maps page indices used by the nodes to page objects.
pub fn write_outline(
    doc: &mut Document,
    catalog_id: ObjectId,
    roots: &[BookmarkNode],
    pages: &[ObjectId],
) -> Result<Option<ObjectId>> {
    if roots.is_empty() || pages.is_empty() {
        return Ok(None);
    }

    let outlines_id = doc.new_object_id();
    let (first, last) = write_items(doc, outlines_id, roots, pages);
    doc.objects.insert(
        outlines_id,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => first,
            "Last" => last,
            "Count" => Object::Integer(roots.len() as i64),
        }),
    );

    let catalog = doc.get_object_mut(catalog_id).and_then(|o| o.as_dict_mut())?;
    catalog.set("Outlines", outlines_id);
    catalog.set("PageMode", "UseOutlines");
    Ok(Some(outlines_id))
}

/// Decode a PDF text string (UTF-16BE with BOM, or single-byte).
pub fn decode_text(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Read the outline of a document as depth-first lines.
pub fn read_outline(doc: &Document) -> Vec<OutlineLine> {
    let page_index: HashMap<ObjectId, usize> = doc
        .get_pages()
        .into_values()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();

    let first = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .and_then(|id| doc.get_dictionary(id))
        .ok()
        .and_then(|c| c.get(b"Outlines").ok())
        .and_then(|o| o.as_reference().ok())
        .and_then(|id| doc.get_dictionary(id).ok())
        .and_then(|d| d.get(b"First").ok())
        .and_then(|o| o.as_reference().ok());

    let mut lines = Vec::new();
    walk(doc, first, 0, &page_index, &mut lines);
    lines
}

const MAX_SIBLINGS: usize = 100_000;
const MAX_DEPTH: usize = 64;

fn walk(
    doc: &Document,
    mut current: Option<ObjectId>,
    depth: usize,
    page_index: &HashMap<ObjectId, usize>,
    out: &mut Vec<OutlineLine>,
) {
    // Bounded against cyclic chains in malformed files.
    if depth > MAX_DEPTH {
        return;
    }
    for _ in 0..MAX_SIBLINGS {
        let Some(id) = current else { break };
        let Ok(item) = doc.get_dictionary(id) else { break };
        out.push(OutlineLine {
            depth,
            label: title_of(item),
            target_page: target_of(item, page_index).unwrap_or(0),
        });
        let child = item.get(b"First").and_then(Object::as_reference).ok();
        walk(doc, child, depth + 1, page_index, out);
        current = item.get(b"Next").and_then(Object::as_reference).ok();
    }
}

fn title_of(item: &Dictionary) -> String {
    match item.get(b"Title") {
        Ok(Object::String(bytes, _)) => decode_text(bytes),
        _ => String::new(),
    }
}

fn target_of(item: &Dictionary, page_index: &HashMap<ObjectId, usize>) -> Option<usize> {
    let dest = item.get(b"Dest").ok()?.as_array().ok()?;
    let page = dest.first()?.as_reference().ok()?;
    page_index.get(&page).copied()
}
