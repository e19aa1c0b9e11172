//! Diff calculation between crawls.
//!
//! Compares the catalog before and after a crawl to report which documents
//! appeared, changed their listing, or disappeared from the site.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::{Catalog, DocumentRecord};

/// Keys that changed between two catalogs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CatalogDiff {
    pub added: Vec<String>,
    /// Same key, different title or listed version
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl CatalogDiff {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.updated.is_empty() || !self.removed.is_empty()
    }

    /// Get the total number of changes.
    pub fn change_count(&self) -> usize {
        self.added.len() + self.updated.len() + self.removed.len()
    }
}

fn listing_changed(prev: &DocumentRecord, curr: &DocumentRecord) -> bool {
    prev.title != curr.title || prev.listed_version != curr.listed_version
}

/// Calculate the diff between the previous and current catalog, in catalog order.
pub fn calculate_diff(previous: &Catalog, current: &Catalog) -> CatalogDiff {
    let current_keys: HashSet<&str> = current.iter().map(|r| r.key.as_str()).collect();

    let mut diff = CatalogDiff::default();
    for record in current.iter() {
        match previous.get(&record.key) {
            None => diff.added.push(record.key.clone()),
            Some(prev) if listing_changed(prev, record) => diff.updated.push(record.key.clone()),
            Some(_) => {}
        }
    }
    diff.removed = previous
        .iter()
        .filter(|r| !current_keys.contains(r.key.as_str()))
        .map(|r| r.key.clone())
        .collect();
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DiscoveredDocument, Section};

    fn make_doc(id: &str, title: &str) -> DiscoveredDocument {
        DiscoveredDocument {
            section: Section::Gen,
            title: title.to_string(),
            url: format!("https://example.com/{id}.pdf"),
            hierarchy_path: vec!["GEN".into()],
            listed_version: Some("01/24".into()),
        }
    }

    fn catalog(docs: &[DiscoveredDocument]) -> Catalog {
        let mut catalog = Catalog::new();
        for doc in docs {
            catalog.upsert(doc);
        }
        catalog
    }

    fn key(id: &str) -> String {
        format!("https://example.com/{id}.pdf")
    }

    #[test]
    fn test_no_changes() {
        let prev = catalog(&[make_doc("001", "Title 1"), make_doc("002", "Title 2")]);
        let curr = prev.clone();

        let result = calculate_diff(&prev, &curr);
        assert!(!result.has_changes());
        assert_eq!(result.change_count(), 0);
    }

    #[test]
    fn test_additions_keep_catalog_order() {
        let prev = catalog(&[make_doc("001", "Title 1")]);
        let curr = catalog(&[
            make_doc("003", "Title 3"),
            make_doc("001", "Title 1"),
            make_doc("002", "Title 2"),
        ]);

        let result = calculate_diff(&prev, &curr);
        assert_eq!(result.added, vec![key("003"), key("002")]);
    }

    #[test]
    fn test_new_listed_version_is_an_update() {
        let prev = catalog(&[make_doc("001", "Title")]);
        let mut newer = make_doc("001", "Title");
        newer.listed_version = Some("02/24".into());
        let curr = catalog(&[newer]);

        let result = calculate_diff(&prev, &curr);
        assert_eq!(result.updated, vec![key("001")]);
    }

    #[test]
    fn test_mixed_changes() {
        let prev = catalog(&[
            make_doc("001", "Keep"),
            make_doc("002", "Update Me"),
            make_doc("003", "Remove Me"),
        ]);
        let curr = catalog(&[
            make_doc("001", "Keep"),
            make_doc("002", "Updated"),
            make_doc("004", "New Document"),
        ]);

        let result = calculate_diff(&prev, &curr);
        assert_eq!(result.added, vec![key("004")]);
        assert_eq!(result.updated, vec![key("002")]);
        assert_eq!(result.removed, vec![key("003")]);
    }

    #[test]
    fn test_full_to_empty() {
        let prev = catalog(&[make_doc("001", "Last")]);
        let result = calculate_diff(&prev, &Catalog::new());
        assert!(result.added.is_empty());
        assert_eq!(result.removed.len(), 1);
    }
}
