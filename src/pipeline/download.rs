// src/pipeline/download.rs

//! Download stage: bring the document cache up to date.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::Config;
use crate::services::{DownloadReport, Downloader, SiteNavigator};
use crate::storage::DocumentStore;
use crate::utils::RetryPolicy;

/// Download every included document that changed since the last run.
///
/// The catalog is saved even when the run was cancelled, so completed
/// downloads are not repeated.
pub async fn run_download(
    config: &Config,
    navigator: &dyn SiteNavigator,
    store: &dyn DocumentStore,
    cancel: &CancellationToken,
) -> Result<DownloadReport> {
    store.cleanup_partials().await?;

    let mut catalog = store.load_catalog().await?;
    if catalog.is_empty() {
        log::warn!("Catalog is empty; run 'crawl' first");
        return Ok(DownloadReport::default());
    }

    let report = Downloader::new(
        navigator,
        store,
        RetryPolicy::from_config(&config.crawler),
        config.download.change_detection,
    )
    .with_concurrency(config.crawler.max_concurrent)
    .with_request_delay(Duration::from_millis(config.crawler.request_delay_ms))
    .with_cancellation(cancel.clone())
    .run(&mut catalog)
    .await;

    store.save_catalog(&catalog).await?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::{Catalog, DocumentStatus, Section};
    use crate::storage::LocalStorage;
    use crate::testing::{MockNavigator, discovered, text_pdf};

    #[tokio::test]
    async fn test_download_sweeps_partials_and_persists_outcomes() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStorage::new(tmp.path());
        let mut catalog = Catalog::new();
        catalog.upsert(&discovered(Section::Gen, "GEN-0.1", "https://x/a.pdf"));
        store.save_catalog(&catalog).await.unwrap();
        std::fs::write(tmp.path().join("leftover.pdf.part"), b"%PDF-1.5").unwrap();

        let nav = MockNavigator::new().with_document("https://x/a.pdf", text_pdf(1, "a"));
        let report = run_download(&Config::default(), &nav, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.downloaded, 1);
        assert!(!tmp.path().join("leftover.pdf.part").exists());
        let saved = store.load_catalog().await.unwrap();
        assert_eq!(
            saved.get("https://x/a.pdf").unwrap().status,
            DocumentStatus::Downloaded
        );
    }

    #[tokio::test]
    async fn test_empty_catalog_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let store = LocalStorage::new(tmp.path());
        let nav = MockNavigator::new();
        let report = run_download(&Config::default(), &nav, &store, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report, DownloadReport::default());
        assert_eq!(nav.fetches(), 0);
    }
}
