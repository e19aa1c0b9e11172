// src/models/mod.rs

//! Domain models for the mirror.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod bookmark;
mod catalog;
mod config;
mod document;
mod output;

// Re-export all public types
pub use bookmark::{BookmarkNode, OutlineLine, PlacedDocument, build_tree, flatten};
pub use catalog::{Catalog, Upsert};
pub use config::{
    AssemblyConfig, ChangeDetection, Config, CrawlerConfig, DownloadConfig, FilterConfig,
    OcrConfig, PathsConfig, SectionEntry, SiteConfig,
};
pub use document::{
    DiscoveredDocument, DocumentRecord, DocumentStatus, Section, cache_id, document_key,
    extract_subsection,
};
pub use output::{
    CombinedOutput, DocumentMetadata, Grouping, Metadata, RunSummary, SectionCounts,
};
