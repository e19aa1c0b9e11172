// src/pipeline/validate.rs

use crate::error::Result;
use crate::models::Config;
use crate::services::pdf::parse_verified;
use crate::storage::DocumentStore;

/// Result of checking configuration and cache.
#[derive(Debug, Default)]
pub struct ValidateReport {
    pub documents_checked: usize,
    pub missing: Vec<String>,
    /// Cached files that fail verification, with the reason
    pub corrupt: Vec<(String, String)>,
}

impl ValidateReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Validate the configuration, then verify every cached document.
///
/// Read-only: the catalog is not modified.
pub async fn run_validate(config: &Config, store: &dyn DocumentStore) -> Result<ValidateReport> {
    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }
    log::info!("Config OK");
    log::info!("    user agent: {}", config.crawler.user_agent);
    log::info!("    timeout: {}s", config.crawler.timeout_secs);
    log::info!("    max concurrent: {}", config.crawler.max_concurrent);
    log::info!("    sections: {}", config.site.sections.len());

    let catalog = store.load_catalog().await?;
    let mut report = ValidateReport::default();
    for record in catalog.iter().filter(|r| r.status.is_available()) {
        report.documents_checked += 1;
        let Some(path) = record.local_path.as_ref() else {
            report.missing.push(record.key.clone());
            continue;
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                if let Err(e) = parse_verified(path, &bytes) {
                    log::warn!("Corrupt cache file for {}: {}", record.title, e);
                    report.corrupt.push((record.key.clone(), e.to_string()));
                }
            }
            Err(_) => {
                log::warn!("Missing cache file for {}: {}", record.title, path.display());
                report.missing.push(record.key.clone());
            }
        }
    }

    log::info!(
        "Cache: {} documents checked, {} missing, {} corrupt",
        report.documents_checked,
        report.missing.len(),
        report.corrupt.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::{Catalog, DocumentStatus, Section};
    use crate::storage::LocalStorage;
    use crate::testing::{discovered, text_pdf};

    #[tokio::test]
    async fn test_validate_reports_cache_problems() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStorage::new(tmp.path());
        let mut catalog = Catalog::new();
        for (title, url) in [
            ("GEN-0.1", "https://x/a.pdf"),
            ("GEN-0.2", "https://x/b.pdf"),
            ("GEN-0.3", "https://x/c.pdf"),
        ] {
            catalog.upsert(&discovered(Section::Gen, title, url));
            let record = catalog.get_mut(url).unwrap();
            record.local_path = Some(store.write_document(&record.cache_id, &text_pdf(1, title)).await.unwrap());
            record.status = DocumentStatus::Unchanged;
        }
        let damaged = catalog.get("https://x/b.pdf").unwrap().local_path.clone().unwrap();
        std::fs::write(&damaged, b"<html>error</html>").unwrap();
        let gone = catalog.get("https://x/c.pdf").unwrap().local_path.clone().unwrap();
        std::fs::remove_file(&gone).unwrap();
        store.save_catalog(&catalog).await.unwrap();

        let report = run_validate(&Config::default(), &store).await.unwrap();
        assert_eq!(report.documents_checked, 3);
        assert_eq!(report.corrupt.len(), 1);
        assert_eq!(report.missing, vec!["https://x/c.pdf"]);
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.crawler.max_concurrent = 0;
        assert!(run_validate(&config, &LocalStorage::new(tmp.path())).await.is_err());
    }
}
