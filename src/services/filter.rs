// src/services/filter.rs

//! Inclusion policy for discovered documents.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Catalog, DocumentStatus, FilterConfig, Section};

/// ICAO location indicator prefixing aerodrome pages, e.g. `SADF-AD-2.0`.
static AERODROME_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Z]{4})-AD\b").expect("static regex"));

/// Aerodrome code of an AD title, if it names one.
pub fn aerodrome_code(title: &str) -> Option<&str> {
    AERODROME_CODE
        .captures(title)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Pure, order-independent include/exclude decision.
#[derive(Debug, Clone)]
pub struct DocumentFilter {
    sections: HashSet<Section>,
    allow_list: Option<HashSet<String>>,
    ad_general_only: bool,
    exclude_patterns: Vec<String>,
}

/// Counts from applying the filter to a catalog.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterOutcome {
    pub included: usize,
    pub excluded: usize,
}

impl DocumentFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            sections: config.sections.iter().copied().collect(),
            allow_list: config.aerodrome_allow_list.as_ref().map(|codes| {
                codes
                    .iter()
                    .map(|c| c.trim().to_ascii_uppercase())
                    .collect()
            }),
            ad_general_only: config.ad_general_only,
            exclude_patterns: config
                .exclude_patterns
                .iter()
                .map(|p| p.trim().to_uppercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether a document with this title belongs in the output.
    pub fn include(&self, title: &str, section: Section) -> bool {
        if !self.sections.contains(&section) {
            return false;
        }

        let upper = title.to_uppercase();
        if self.exclude_patterns.iter().any(|p| upper.contains(p.as_str())) {
            return false;
        }

        if section != Section::Ad {
            return true;
        }

        match aerodrome_code(title) {
            None => true,
            Some(_) if self.ad_general_only => false,
            Some(code) => self
                .allow_list
                .as_ref()
                .is_none_or(|allowed| allowed.contains(code)),
        }
    }

    /// Re-evaluate every record of the catalog.
    ///
    /// Excluded records are marked `excluded_by_filter`; records that become
    /// included again return to `pending` unless they already hold a download.
    pub fn apply(&self, catalog: &mut Catalog) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for record in catalog.iter_mut() {
            let included = self.include(&record.title, record.section);
            record.included = included;
            if included {
                outcome.included += 1;
                if record.status == DocumentStatus::ExcludedByFilter {
                    record.status = if record.local_path.as_ref().is_some_and(|p| p.exists()) {
                        DocumentStatus::Unchanged
                    } else {
                        DocumentStatus::Pending
                    };
                }
            } else {
                outcome.excluded += 1;
                if record.status != DocumentStatus::ExcludedByFilter {
                    log::info!("excluded: {} ({})", record.title, record.section);
                }
                record.status = DocumentStatus::ExcludedByFilter;
            }
        }
        outcome
    }
}
