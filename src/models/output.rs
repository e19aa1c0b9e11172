// src/models/output.rs

//! Assembly artifacts and run summaries.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Catalog, DocumentRecord, DocumentStatus, Section};

/// A set of documents assembled into one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Grouping {
    Section(Section),
    All,
}

impl fmt::Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grouping::Section(s) => write!(f, "{s}"),
            Grouping::All => f.write_str("ALL"),
        }
    }
}

/// A PDF written by the assembler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedOutput {
    pub grouping: Grouping,
    pub path: PathBuf,
    /// Source document keys, in merge order
    pub documents: Vec<String>,
    pub total_page_count: usize,
    pub total_byte_size: u64,
    /// 1-based part number when a grouping was split
    pub part_index: Option<usize>,
}

/// Per-section outcome counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionCounts {
    pub discovered: usize,
    pub downloaded: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    pub excluded: usize,
}

/// User-facing summary of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sections: BTreeMap<Section, SectionCounts>,
    pub outputs: Vec<PathBuf>,
    /// Groupings that produced no artifact, with the reason
    pub grouping_errors: Vec<String>,
    pub failed_branches: Vec<String>,
}

impl RunSummary {
    /// Count a record's current status under its section.
    pub fn record(&mut self, section: Section, status: DocumentStatus) {
        let counts = self.sections.entry(section).or_default();
        match status {
            DocumentStatus::Pending => {}
            DocumentStatus::Downloaded => counts.downloaded += 1,
            DocumentStatus::Unchanged => counts.skipped_unchanged += 1,
            DocumentStatus::DownloadFailed => counts.failed += 1,
            DocumentStatus::ExcludedByFilter | DocumentStatus::ExcludedDueToCorruption => {
                counts.excluded += 1
            }
        }
    }

    pub fn discovered(&mut self, section: Section) {
        self.sections.entry(section).or_default().discovered += 1;
    }

    /// Counts derived from the statuses held in a catalog.
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut summary = Self::default();
        for record in catalog.iter() {
            summary.discovered(record.section);
            summary.record(record.section, record.status);
        }
        summary
    }

    /// Emit the summary through the log facade.
    pub fn log(&self) {
        log::info!("Run summary");
        for (section, c) in &self.sections {
            log::info!(
                "    {}: discovered {}, downloaded {}, skipped-unchanged {}, failed {}, excluded {}",
                section,
                c.discovered,
                c.downloaded,
                c.skipped_unchanged,
                c.failed,
                c.excluded
            );
        }
        for path in &self.outputs {
            log::info!("    wrote {}", path.display());
        }
        for branch in &self.failed_branches {
            log::warn!("    crawl branch failed: {}", branch);
        }
        for error in &self.grouping_errors {
            log::error!("    {}", error);
        }
    }
}

/// Per-document entry of `metadata.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub section: Section,
    pub subsection: Option<String>,
    pub hierarchy_path: Vec<String>,
    pub url: String,
    pub cache_file: Option<PathBuf>,
    pub listed_version: Option<String>,
    pub version_signature: Option<String>,
    pub included: bool,
    pub status: DocumentStatus,
    pub reason: Option<String>,
    pub page_count: Option<usize>,
}

impl From<&DocumentRecord> for DocumentMetadata {
    fn from(record: &DocumentRecord) -> Self {
        let reason = match record.status {
            DocumentStatus::ExcludedByFilter => Some("excluded by filter".to_string()),
            _ => record.failure_reason.clone(),
        };
        Self {
            title: record.title.clone(),
            section: record.section,
            subsection: record.subsection.clone(),
            hierarchy_path: record.hierarchy_path.clone(),
            url: record.url.clone(),
            cache_file: record.local_path.clone(),
            listed_version: record.listed_version.clone(),
            version_signature: record.version_signature.clone(),
            included: record.included,
            status: record.status,
            reason,
            page_count: record.page_count,
        }
    }
}

/// Sidecar written next to the assembled PDFs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub generated_at: DateTime<Utc>,
    pub outputs: Vec<CombinedOutput>,
    pub summary: RunSummary,
    pub documents: Vec<DocumentMetadata>,
}

impl Metadata {
    pub fn new(catalog: &Catalog, outputs: Vec<CombinedOutput>, summary: RunSummary) -> Self {
        Self {
            generated_at: Utc::now(),
            outputs,
            summary,
            documents: catalog.iter().map(DocumentMetadata::from).collect(),
        }
    }
}
