// src/services/pdf/merge.rs

//! Concatenation of whole documents.

use lopdf::{Document, Object, ObjectId, dictionary};

use super::{inherited_attribute, type_of};
use crate::error::Result;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Result of merging sources into one document.
pub struct MergedDocument {
    pub doc: Document,
    pub catalog_id: ObjectId,
    pub pages_id: ObjectId,
    /// Page objects in output order
    pub page_ids: Vec<ObjectId>,
    /// Index of the first page of each source
    pub first_pages: Vec<usize>,
}

/// Copy inherited attributes onto each page so pages can be re-parented.
fn materialize_inherited(doc: &mut Document, pages: &[ObjectId]) {
    for &page_id in pages {
        let missing: Vec<(&[u8], Object)> = match doc.get_dictionary(page_id) {
            Ok(dict) => INHERITABLE
                .iter()
                .filter(|key| !dict.has(key))
                .filter_map(|key| inherited_attribute(doc, page_id, key).map(|v| (*key, v)))
                .collect(),
            Err(_) => continue,
        };
        if let Ok(dict) = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut()) {
            for (key, value) in missing {
                dict.set(key.to_vec(), value);
            }
        }
    }
}

/// Merge documents in the given order into a single document.
///
/// Source catalogs, page trees and outlines are dropped; every page is
/// re-parented under one new page tree.
pub fn merge_documents(sources: Vec<Document>) -> Result<MergedDocument> {
    let mut merged = Document::with_version("1.5");
    let mut next_id = 1;
    let mut page_ids = Vec::new();
    let mut first_pages = Vec::with_capacity(sources.len());

    for mut source in sources {
        source.renumber_objects_with(next_id);
        next_id = source.max_id + 1;

        let pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        materialize_inherited(&mut source, &pages);
        first_pages.push(page_ids.len());
        page_ids.extend(pages);

        for (id, object) in source.objects {
            if matches!(
                type_of(&object),
                Some(b"Catalog") | Some(b"Pages") | Some(b"Outlines")
            ) {
                continue;
            }
            merged.objects.insert(id, object);
        }
    }
    merged.max_id = next_id.saturating_sub(1);

    let pages_id = merged.new_object_id();
    for &page_id in &page_ids {
        if let Ok(dict) = merged.get_object_mut(page_id).and_then(|o| o.as_dict_mut()) {
            dict.set("Parent", pages_id);
        }
    }

    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|&id| Object::Reference(id)).collect::<Vec<_>>(),
            "Count" => Object::Integer(page_ids.len() as i64),
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    Ok(MergedDocument {
        doc: merged,
        catalog_id,
        pages_id,
        page_ids,
        first_pages,
    })
}
