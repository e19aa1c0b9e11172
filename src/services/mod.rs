//! Service layer for the mirror.
//!
//! This module contains the business logic for:
//! - Site access (`SiteNavigator`, `HtmlNavigator`)
//! - Section traversal (`SectionCrawler`)
//! - Inclusion policy (`DocumentFilter`)
//! - Incremental downloads (`Downloader`)
//! - OCR augmentation (`OcrAugmenter`)
//! - Combined PDF assembly (`Assembler`)

pub mod assembler;
mod crawler;
pub mod downloader;
mod filter;
mod navigator;
pub mod ocr;
pub mod pdf;

pub use assembler::{Assembler, AssemblyReport};
pub use crawler::{CrawlEvent, SectionCrawler};
pub use downloader::{DownloadReport, Downloader};
pub use filter::{DocumentFilter, FilterOutcome, aerodrome_code};
pub use navigator::{HtmlNavigator, SiteNavigator, SiteNode};
pub use ocr::{OcrAugmenter, OcrReport, TextRecognizer};
