//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── catalog.json          # Document catalog
//! ├── <cache_id>.pdf        # Verified downloads
//! └── <cache_id>.ocr.pdf    # OCR-augmented copies
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Catalog;
use crate::storage::{CATALOG_FILE, DocumentStore, PARTIAL_SUFFIX};
use crate::utils::fs::temp_path;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write `bytes` to `tmp`, then rename onto `path`.
    async fn write_via(&self, path: &Path, tmp: &Path, bytes: &[u8]) -> Result<()> {
        self.ensure_dir(path).await?;

        let written = async {
            let mut file = tokio::fs::File::create(tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(tmp).await;
            return Err(AppError::Io(e));
        }

        tokio::fs::rename(tmp, path).await?;
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    pub async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        let tmp = temp_path(&path, ".tmp");
        self.write_via(&path, &tmp, bytes).await
    }

    /// Write JSON data.
    pub async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    pub async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    pub async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl DocumentStore for LocalStorage {
    fn document_path(&self, cache_id: &str) -> PathBuf {
        self.path(&format!("{cache_id}.pdf"))
    }

    fn ocr_path(&self, cache_id: &str) -> PathBuf {
        self.path(&format!("{cache_id}.ocr.pdf"))
    }

    async fn write_document(&self, cache_id: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.document_path(cache_id);
        let tmp = temp_path(&path, PARTIAL_SUFFIX);
        self.write_via(&path, &tmp, bytes).await?;
        Ok(path)
    }

    async fn load_catalog(&self) -> Result<Catalog> {
        match self.read_json::<Catalog>(CATALOG_FILE).await? {
            Some(catalog) => Ok(catalog),
            None => {
                log::info!("No {} found, starting with an empty catalog", CATALOG_FILE);
                Ok(Catalog::new())
            }
        }
    }

    async fn save_catalog(&self, catalog: &Catalog) -> Result<()> {
        let mut snapshot = catalog.clone();
        snapshot.updated_at = Some(Utc::now());
        self.write_json(CATALOG_FILE, &snapshot).await
    }

    async fn cleanup_partials(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.root_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(PARTIAL_SUFFIX) || name.ends_with(".tmp") {
                tokio::fs::remove_file(entry.path()).await?;
                log::debug!("Removed stale partial file {}", name);
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Swept {} stale partial files", removed);
        }
        Ok(removed)
    }
}
