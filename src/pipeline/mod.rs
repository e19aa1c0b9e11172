//! Pipeline entry points for mirror operations.
//!
//! - `run_crawl`: Discover documents and rebuild the catalog
//! - `run_download`: Fetch new and changed documents into the cache
//! - `run_ocr`: Add a text layer to scanned documents
//! - `run_assemble`: Write combined PDFs and `metadata.json`
//! - `run_pipeline`: All of the above, in order
//! - `run_refilter`: Re-apply the inclusion policy to the catalog
//! - `run_validate`: Check configuration and cached files

pub mod assemble;
pub mod crawl;
pub mod diff;
pub mod download;
pub mod ocr;
pub mod pipeline;
pub mod refilter;
pub mod validate;

pub use assemble::{METADATA_FILE, run_assemble};
pub use crawl::{CrawlReport, run_crawl};
pub use diff::{CatalogDiff, calculate_diff};
pub use download::run_download;
pub use ocr::{OcrSummary, run_ocr};
pub use pipeline::run_pipeline;
pub use refilter::run_refilter;
pub use validate::{ValidateReport, run_validate};
