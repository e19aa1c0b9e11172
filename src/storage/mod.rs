//! Storage abstractions for the document cache.
//!
//! ## Directory Structure
//!
//! ```text
//! aip_downloads/
//! ├── catalog.json                  # Ordered document catalog
//! ├── GEN_GEN-0.1_Prefacio_ab12cd34ef.pdf
//! ├── GEN_GEN-0.1_Prefacio_ab12cd34ef.ocr.pdf   # OCR-augmented copy
//! └── *.pdf.part                    # In-flight downloads, swept at start-up
//! ```

pub mod local;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Catalog;

// Re-export for convenience
pub use local::LocalStorage;

/// Catalog file name inside the cache directory.
pub const CATALOG_FILE: &str = "catalog.json";

/// Suffix of a download that has not been verified and renamed yet.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Trait for document cache backends.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Final location of a cached document.
    fn document_path(&self, cache_id: &str) -> PathBuf;

    /// Location of the OCR-augmented copy of a document.
    fn ocr_path(&self, cache_id: &str) -> PathBuf;

    /// Store verified document bytes: write to a partial file, then rename.
    async fn write_document(&self, cache_id: &str, bytes: &[u8]) -> Result<PathBuf>;

    /// Load the persisted catalog, or an empty one.
    async fn load_catalog(&self) -> Result<Catalog>;

    /// Persist the catalog atomically.
    async fn save_catalog(&self, catalog: &Catalog) -> Result<()>;

    /// Delete partial files left by an interrupted run.
    async fn cleanup_partials(&self) -> Result<usize>;
}
