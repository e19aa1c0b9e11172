// src/models/document.rs

//! Document records and their sections.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// Leading document code of a title, e.g. `GEN-0.1` or `SADF-AD-2.0`.
static SUBSECTION_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^((?:[A-Z]{4}-)?[A-Z]+-[\d.]+)").expect("static regex")
});

/// Top-level AIP section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    #[serde(rename = "GEN")]
    Gen,
    #[serde(rename = "ENR")]
    Enr,
    #[serde(rename = "AD")]
    Ad,
}

impl Section {
    /// All sections in publication order.
    pub const ALL: [Section; 3] = [Section::Gen, Section::Enr, Section::Ad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Gen => "GEN",
            Section::Enr => "ENR",
            Section::Ad => "AD",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Section {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GEN" => Ok(Section::Gen),
            "ENR" => Ok(Section::Enr),
            "AD" => Ok(Section::Ad),
            other => Err(AppError::validation(format!("unknown section '{other}'"))),
        }
    }
}

/// Processing state of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Discovered, not yet downloaded
    #[default]
    Pending,
    /// Fetched and written to the cache during the last run
    Downloaded,
    /// Cache already held the current version
    Unchanged,
    /// Fetch failed after all retries
    DownloadFailed,
    /// Filtered out by the inclusion policy
    ExcludedByFilter,
    /// Cached file could not be merged
    ExcludedDueToCorruption,
}

impl DocumentStatus {
    /// Whether a usable cache file is expected for this record.
    pub fn is_available(&self) -> bool {
        matches!(self, DocumentStatus::Downloaded | DocumentStatus::Unchanged)
    }
}

/// A document emitted by the crawler, before it enters the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDocument {
    pub section: Section,
    pub title: String,
    pub url: String,
    /// Section label followed by sub-section labels, outermost first
    pub hierarchy_path: Vec<String>,
    /// Version/date label shown next to the link on the listing page
    pub listed_version: Option<String>,
}

/// A catalogued AIP document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique key (document URL without fragment)
    pub key: String,

    /// Position in crawl order
    #[serde(default)]
    pub ordinal: usize,

    pub url: String,
    pub section: Section,
    pub title: String,

    /// Leading document code of the title, if any
    #[serde(default)]
    pub subsection: Option<String>,

    #[serde(default)]
    pub hierarchy_path: Vec<String>,

    #[serde(default)]
    pub listed_version: Option<String>,

    /// Stable cache file stem, fixed at first discovery
    pub cache_id: String,

    #[serde(default)]
    pub version_signature: Option<String>,

    #[serde(default)]
    pub content_sha256: Option<String>,

    #[serde(default)]
    pub local_path: Option<PathBuf>,

    #[serde(default)]
    pub byte_size: Option<u64>,

    #[serde(default)]
    pub page_count: Option<usize>,

    #[serde(default)]
    pub retrieved_at: Option<DateTime<Utc>>,

    /// Inclusion decision of the last filter pass
    #[serde(default = "default_true")]
    pub included: bool,

    #[serde(default)]
    pub status: DocumentStatus,

    #[serde(default)]
    pub failure_reason: Option<String>,

    /// OCR-augmented copy, preferred by the assembler
    #[serde(default)]
    pub ocr_path: Option<PathBuf>,

    #[serde(default)]
    pub ocr_pages: usize,

    /// Current cache file was already examined for OCR
    #[serde(default)]
    pub ocr_checked: bool,
}

fn default_true() -> bool {
    true
}

impl DocumentRecord {
    /// Create a fresh record from a crawl discovery.
    pub fn from_discovered(doc: &DiscoveredDocument) -> Self {
        let key = document_key(&doc.url);
        Self {
            cache_id: cache_id(doc.section, &doc.title, &key),
            key,
            ordinal: 0,
            url: doc.url.clone(),
            section: doc.section,
            title: doc.title.clone(),
            subsection: extract_subsection(&doc.title),
            hierarchy_path: doc.hierarchy_path.clone(),
            listed_version: doc.listed_version.clone(),
            version_signature: None,
            content_sha256: None,
            local_path: None,
            byte_size: None,
            page_count: None,
            retrieved_at: None,
            included: true,
            status: DocumentStatus::Pending,
            failure_reason: None,
            ocr_path: None,
            ocr_pages: 0,
            ocr_checked: false,
        }
    }

    /// Refresh crawl-owned fields from a re-crawl, keeping download state.
    pub fn refresh_from(&mut self, doc: &DiscoveredDocument) {
        self.url = doc.url.clone();
        self.section = doc.section;
        self.title = doc.title.clone();
        self.subsection = extract_subsection(&doc.title);
        self.hierarchy_path = doc.hierarchy_path.clone();
        self.listed_version = doc.listed_version.clone();
    }

    /// File the assembler should read: the OCR copy when present.
    pub fn assembly_source(&self) -> Option<&PathBuf> {
        self.ocr_path
            .as_ref()
            .filter(|p| p.exists())
            .or(self.local_path.as_ref())
    }
}

/// Normalize a document URL into its catalog key.
pub fn document_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url.trim().split('#').next().unwrap_or_default().to_string(),
    }
}

/// Stable cache file stem: section, title slug and a URL digest.
pub fn cache_id(section: Section, title: &str, key: &str) -> String {
    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    let slug = slugify(title, 48);
    if slug.is_empty() {
        format!("{}_{}", section, &digest[..10])
    } else {
        format!("{}_{}_{}", section, slug, &digest[..10])
    }
}

/// Extract the leading document code of a title.
pub fn extract_subsection(title: &str) -> Option<String> {
    SUBSECTION_CODE
        .captures(title.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn slugify(text: &str, max_len: usize) -> String {
    let mut slug = String::new();
    let mut last_sep = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            slug.push(c);
            last_sep = false;
        } else if !last_sep {
            slug.push('_');
            last_sep = true;
        }
        if slug.len() >= max_len {
            break;
        }
    }
    slug.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovered(title: &str, url: &str) -> DiscoveredDocument {
        DiscoveredDocument {
            section: Section::Gen,
            title: title.to_string(),
            url: url.to_string(),
            hierarchy_path: vec!["GEN".into()],
            listed_version: Some("02/24".into()),
        }
    }

    #[test]
    fn test_section_parse_and_display() {
        assert_eq!("gen".parse::<Section>().unwrap(), Section::Gen);
        assert_eq!(" AD ".parse::<Section>().unwrap(), Section::Ad);
        assert!("XYZ".parse::<Section>().is_err());
        assert_eq!(Section::Enr.to_string(), "ENR");
    }

    #[test]
    fn test_section_serde_uses_codes() {
        let json = serde_json::to_string(&Section::Ad).unwrap();
        assert_eq!(json, "\"AD\"");
    }

    #[test]
    fn test_extract_subsection() {
        assert_eq!(
            extract_subsection("GEN-0.1 Prefacio"),
            Some("GEN-0.1".to_string())
        );
        assert_eq!(
            extract_subsection("SADF-AD-2.0 Aeródromos - Datos del AD SAN FERNANDO"),
            Some("SADF-AD-2.0".to_string())
        );
        assert_eq!(extract_subsection("Prefacio"), None);
    }

    #[test]
    fn test_document_key_strips_fragment() {
        assert_eq!(
            document_key("https://ais.anac.gob.ar/aip/doc.pdf#page=2"),
            "https://ais.anac.gob.ar/aip/doc.pdf"
        );
        assert_eq!(document_key("docs/a.pdf#dup"), "docs/a.pdf");
    }

    #[test]
    fn test_cache_id_is_stable_and_safe() {
        let a = cache_id(Section::Gen, "GEN-0.1 Prefacio (2024)", "https://x/a.pdf");
        let b = cache_id(Section::Gen, "GEN-0.1 Prefacio (2024)", "https://x/a.pdf");
        assert_eq!(a, b);
        assert!(a.starts_with("GEN_GEN-0.1_Prefacio_2024_"));
        assert!(!a.contains(' ') && !a.contains('('));

        let other = cache_id(Section::Gen, "GEN-0.1 Prefacio (2024)", "https://x/b.pdf");
        assert_ne!(a, other);
    }

    #[test]
    fn test_refresh_keeps_download_state() {
        let mut record = DocumentRecord::from_discovered(&discovered("GEN-0.1 Old", "https://x/a.pdf"));
        record.version_signature = Some("etag:1".into());
        record.status = DocumentStatus::Downloaded;
        let original_cache_id = record.cache_id.clone();

        record.refresh_from(&discovered("GEN-0.1 New", "https://x/a.pdf"));
        assert_eq!(record.title, "GEN-0.1 New");
        assert_eq!(record.version_signature.as_deref(), Some("etag:1"));
        assert_eq!(record.status, DocumentStatus::Downloaded);
        assert_eq!(record.cache_id, original_cache_id);
    }
}
