// src/models/config.rs

//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Section;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Remote site layout
    #[serde(default)]
    pub site: SiteConfig,

    /// Inclusion policy
    #[serde(default)]
    pub filter: FilterConfig,

    /// Download and change detection settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Text recognition for scanned pages
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Merge and output settings
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Cache, output and log locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults if loading fails.
    ///
    /// The load error is handed back so the caller can report it once
    /// logging is set up.
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<AppError>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if !(1..=16).contains(&self.crawler.max_concurrent) {
            return Err(AppError::validation(
                "crawler.max_concurrent must be between 1 and 16",
            ));
        }
        if self.crawler.max_retries == 0 {
            return Err(AppError::validation("crawler.max_retries must be > 0"));
        }
        if self.assembly.max_file_size_mb == 0 {
            return Err(AppError::validation("assembly.max_file_size_mb must be > 0"));
        }
        if self.assembly.output_name.trim().is_empty() {
            return Err(AppError::validation("assembly.output_name is empty"));
        }
        if self.site.sections.is_empty() {
            return Err(AppError::validation("No site sections defined"));
        }
        if self.ocr.render_dpi < 72 {
            return Err(AppError::validation("ocr.render_dpi must be >= 72"));
        }
        url::Url::parse(&self.site.base_url)?;
        regex::Regex::new(&self.site.document_url_pattern)?;
        for entry in &self.site.sections {
            url::Url::parse(&entry.url)?;
        }
        let scopes = self.site.sections.iter().filter_map(|e| e.scope.as_ref());
        for selector in [
            &self.site.row_selector,
            &self.site.title_selector,
            &self.site.link_selector,
        ]
        .into_iter()
        .chain(self.site.version_selector.as_ref())
        .chain(scopes)
        {
            scraper::Selector::parse(selector)
                .map_err(|e| AppError::selector(selector.as_str(), format!("{e:?}")))?;
        }
        Ok(())
    }

    pub fn section_entry(&self, section: Section) -> Option<&SectionEntry> {
        self.site.sections.iter().find(|e| e.section == section)
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay after each completed request in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Maximum concurrent page sessions / downloads
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per network operation, including the first
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_concurrent: defaults::max_concurrent(),
            max_retries: defaults::max_retries(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_max_ms: defaults::backoff_max(),
        }
    }
}

/// Entry point of one section on the remote site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionEntry {
    pub section: Section,
    pub url: String,
    /// CSS selector of the element holding this section's listing
    #[serde(default)]
    pub scope: Option<String>,
}

/// Layout of the publication site, as CSS selectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Section entry pages, crawled in this order
    #[serde(default = "defaults::sections")]
    pub sections: Vec<SectionEntry>,

    /// CSS selector for listing rows
    #[serde(default = "defaults::row_selector")]
    pub row_selector: String,

    /// CSS selector for the title cell within a row
    #[serde(default = "defaults::title_selector")]
    pub title_selector: String,

    /// CSS selector for the link within a row
    #[serde(default = "defaults::link_selector")]
    pub link_selector: String,

    /// CSS selector for the version label; the link text when unset
    #[serde(default)]
    pub version_selector: Option<String>,

    /// Text of the pagination link leading to the next listing page
    #[serde(default = "defaults::next_page_text")]
    pub next_page_text: String,

    /// Listing pages followed per node
    #[serde(default = "defaults::max_listing_pages")]
    pub max_listing_pages: usize,

    /// URLs matching this pattern are documents, others are sub-sections
    #[serde(default = "defaults::document_url_pattern")]
    pub document_url_pattern: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            sections: defaults::sections(),
            row_selector: defaults::row_selector(),
            title_selector: defaults::title_selector(),
            link_selector: defaults::link_selector(),
            version_selector: None,
            next_page_text: defaults::next_page_text(),
            max_listing_pages: defaults::max_listing_pages(),
            document_url_pattern: defaults::document_url_pattern(),
        }
    }
}

/// Inclusion policy for discovered documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Sections to keep
    #[serde(default = "defaults::filter_sections")]
    pub sections: Vec<Section>,

    /// Restrict AD aerodrome pages to these ICAO codes
    #[serde(default)]
    pub aerodrome_allow_list: Option<Vec<String>>,

    /// Keep only general AD pages, no aerodrome pages
    #[serde(default)]
    pub ad_general_only: bool,

    /// Title substrings that exclude a document (e.g. "GEN-02")
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sections: defaults::filter_sections(),
            aerodrome_allow_list: None,
            ad_general_only: false,
            exclude_patterns: Vec::new(),
        }
    }
}

/// How the downloader decides a cached document is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDetection {
    /// HEAD probe for ETag/Last-Modified, content hash when absent
    #[default]
    Probe,
    /// Version label from the site listing
    ListedVersion,
    /// Always fetch and compare SHA-256
    ContentHash,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DownloadConfig {
    #[serde(default)]
    pub change_detection: ChangeDetection,
}

/// Text recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "defaults::ocr_enabled")]
    pub enabled: bool,

    /// Tesseract language code
    #[serde(default = "defaults::ocr_language")]
    pub language: String,

    /// Pages with images and fewer text bytes than this are scanned pages
    #[serde(default = "defaults::ocr_min_text_chars")]
    pub min_text_chars: usize,

    /// Rasterization resolution for recognition
    #[serde(default = "defaults::ocr_render_dpi")]
    pub render_dpi: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::ocr_enabled(),
            language: defaults::ocr_language(),
            min_text_chars: defaults::ocr_min_text_chars(),
            render_dpi: defaults::ocr_render_dpi(),
        }
    }
}

/// Merge and output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// File name prefix for outputs
    #[serde(default = "defaults::output_name")]
    pub output_name: String,

    /// Title written to the TOC page and document info
    #[serde(default = "defaults::publication_title")]
    pub publication_title: String,

    /// Size ceiling for a single artifact
    #[serde(default = "defaults::max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Write per-section files even when the combined file fits
    #[serde(default = "defaults::always_emit_sections")]
    pub always_emit_sections: bool,
}

impl AssemblyConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            output_name: defaults::output_name(),
            publication_title: defaults::publication_title(),
            max_file_size_mb: defaults::max_file_size_mb(),
            always_emit_sections: defaults::always_emit_sections(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    /// Append-only run log
    #[serde(default = "defaults::run_log")]
    pub run_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: defaults::cache_dir(),
            output_dir: defaults::output_dir(),
            run_log: defaults::run_log(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::SectionEntry;
    use crate::models::Section;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; aip-mirror/0.1)".into()
    }
    pub fn timeout() -> u64 {
        60
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_concurrent() -> usize {
        4
    }
    pub fn max_retries() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        500
    }
    pub fn backoff_max() -> u64 {
        8_000
    }

    // Site defaults
    pub fn base_url() -> String {
        "https://ais.anac.gob.ar".into()
    }
    pub fn sections() -> Vec<SectionEntry> {
        Section::ALL
            .iter()
            .map(|s| SectionEntry {
                section: *s,
                url: format!("https://ais.anac.gob.ar/aip#{}", s.as_str().to_lowercase()),
                scope: Some(format!("#{}", s.as_str().to_lowercase())),
            })
            .collect()
    }
    pub fn row_selector() -> String {
        "tbody tr".into()
    }
    pub fn title_selector() -> String {
        "td:first-child".into()
    }
    pub fn link_selector() -> String {
        "td:last-child a".into()
    }
    pub fn next_page_text() -> String {
        "Siguiente".into()
    }
    pub fn max_listing_pages() -> usize {
        20
    }
    pub fn document_url_pattern() -> String {
        r"(?i)\.pdf($|[?#])".into()
    }

    // Filter defaults
    pub fn filter_sections() -> Vec<Section> {
        Section::ALL.to_vec()
    }

    // OCR defaults
    pub fn ocr_enabled() -> bool {
        true
    }
    pub fn ocr_language() -> String {
        "spa".into()
    }
    pub fn ocr_min_text_chars() -> usize {
        100
    }
    pub fn ocr_render_dpi() -> u32 {
        144
    }

    // Assembly defaults
    pub fn output_name() -> String {
        "AIP_Argentina".into()
    }
    pub fn publication_title() -> String {
        "Publicación de Información Aeronáutica (AIP) - República Argentina".into()
    }
    pub fn max_file_size_mb() -> u64 {
        100
    }
    pub fn always_emit_sections() -> bool {
        true
    }

    // Path defaults
    pub fn cache_dir() -> PathBuf {
        PathBuf::from("aip_downloads")
    }
    pub fn output_dir() -> PathBuf {
        PathBuf::from("aip_output")
    }
    pub fn run_log() -> PathBuf {
        PathBuf::from("aip_mirror.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_selector() {
        let mut config = Config::default();
        config.site.row_selector = "[[invalid".to_string();
        assert!(matches!(
            config.validate(),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [assembly]
            max_file_size_mb = 50

            [filter]
            aerodrome_allow_list = ["SADF"]

            [download]
            change_detection = "listed_version"
            "#,
        )
        .unwrap();

        assert_eq!(config.assembly.max_file_size_mb, 50);
        assert_eq!(config.assembly.output_name, "AIP_Argentina");
        assert_eq!(
            config.filter.aerodrome_allow_list,
            Some(vec!["SADF".to_string()])
        );
        assert_eq!(
            config.download.change_detection,
            ChangeDetection::ListedVersion
        );
        assert_eq!(config.crawler.max_retries, 3);
        assert_eq!(config.site.sections.len(), 3);
    }

    #[test]
    fn section_entry_lookup() {
        let config = Config::default();
        assert_eq!(
            config.section_entry(Section::Enr).map(|e| e.url.as_str()),
            Some("https://ais.anac.gob.ar/aip#enr")
        );
    }

    #[test]
    fn malformed_file_falls_back_with_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[assembly\nmax_file_size_mb = ").unwrap();

        let (config, error) = Config::load_or_default(&path);
        assert!(matches!(error, Some(AppError::Toml(_))));
        assert_eq!(config.assembly.output_name, "AIP_Argentina");
    }

    #[test]
    fn readable_file_loads_without_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[assembly]\nmax_file_size_mb = 20\n").unwrap();

        let (config, error) = Config::load_or_default(&path);
        assert!(error.is_none());
        assert_eq!(config.assembly.max_file_size_mb, 20);
    }

    #[test]
    fn max_file_size_in_bytes() {
        let config = AssemblyConfig::default();
        assert_eq!(config.max_file_size_bytes(), 100 * 1024 * 1024);
    }
}
