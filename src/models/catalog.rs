// src/models/catalog.rs

//! Ordered document catalog.
//!
//! The catalog holds one [`DocumentRecord`] per document key. Insertion
//! order is crawl order, and that order drives bookmark and TOC order in
//! the assembled output.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{DiscoveredDocument, DocumentRecord, Section, document_key};

/// On-disk shape of `catalog.json`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct CatalogData {
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    count: usize,
    #[serde(default)]
    records: Vec<DocumentRecord>,
}

/// Result of inserting a discovery into the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Added,
    Refreshed,
}

/// Ordered collection of document records keyed by document key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "CatalogData", into = "CatalogData")]
pub struct Catalog {
    pub updated_at: Option<DateTime<Utc>>,
    records: Vec<DocumentRecord>,
    index: HashMap<String, usize>,
}

impl From<CatalogData> for Catalog {
    fn from(data: CatalogData) -> Self {
        let mut catalog = Catalog {
            updated_at: data.updated_at,
            ..Catalog::default()
        };
        for record in data.records {
            catalog.insert(record);
        }
        catalog
    }
}

impl From<Catalog> for CatalogData {
    fn from(catalog: Catalog) -> Self {
        CatalogData {
            updated_at: catalog.updated_at,
            count: catalog.records.len(),
            records: catalog.records,
        }
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DocumentRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DocumentRecord> {
        self.records.iter_mut()
    }

    /// Records of one section, in catalog order.
    pub fn section(&self, section: Section) -> impl Iterator<Item = &DocumentRecord> {
        self.records.iter().filter(move |r| r.section == section)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&DocumentRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DocumentRecord> {
        self.index.get(key).map(|&i| &mut self.records[i])
    }

    /// Append a record; a record whose key already exists is ignored.
    ///
    /// Returns `false` when the key was already present.
    pub fn insert(&mut self, mut record: DocumentRecord) -> bool {
        if self.index.contains_key(&record.key) {
            return false;
        }
        record.ordinal = self.records.len();
        self.index.insert(record.key.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Add a discovery, or refresh the existing record with the same key.
    pub fn upsert(&mut self, doc: &DiscoveredDocument) -> Upsert {
        let key = document_key(&doc.url);
        match self.get_mut(&key) {
            Some(existing) => {
                existing.refresh_from(doc);
                Upsert::Refreshed
            }
            None => {
                self.insert(DocumentRecord::from_discovered(doc));
                Upsert::Added
            }
        }
    }

    /// Build the catalog for a new crawl.
    ///
    /// Records follow the new crawl order and keep the download state of
    /// their previous incarnation. Previous records that were not
    /// rediscovered survive only if they sit under a branch that failed to
    /// crawl; they are re-inserted after the record that preceded them.
    pub fn from_crawl(
        previous: &Catalog,
        discovered: &[DiscoveredDocument],
        failed_branches: &[Vec<String>],
    ) -> Catalog {
        let mut next = Catalog::new();
        for doc in discovered {
            let key = document_key(&doc.url);
            if next.contains(&key) {
                continue;
            }
            let record = match previous.get(&key) {
                Some(prev) => {
                    let mut record = prev.clone();
                    record.refresh_from(doc);
                    record
                }
                None => DocumentRecord::from_discovered(doc),
            };
            next.insert(record);
        }

        let carried: Vec<&DocumentRecord> = previous
            .iter()
            .filter(|r| !next.contains(&r.key))
            .filter(|r| {
                failed_branches
                    .iter()
                    .any(|branch| r.hierarchy_path.starts_with(branch))
            })
            .collect();

        if carried.is_empty() {
            return next;
        }

        let mut merged: Vec<DocumentRecord> = next.records;
        for record in carried {
            // Anchor on the nearest earlier record (in previous order) already placed.
            let anchor = previous.records[..record.ordinal.min(previous.records.len())]
                .iter()
                .rev()
                .find_map(|r| merged.iter().position(|m| m.key == r.key));
            let at = anchor.map_or(0, |i| i + 1);
            merged.insert(at, record.clone());
        }

        let mut rebuilt = Catalog::new();
        for record in merged {
            rebuilt.insert(record);
        }
        rebuilt
    }

    /// Keys of all records, in order.
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key.clone()).collect()
    }
}
