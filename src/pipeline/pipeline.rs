// src/pipeline/pipeline.rs

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, RunSummary};
use crate::services::{OcrAugmenter, SiteNavigator};
use crate::storage::DocumentStore;

use super::assemble::assemble;
use super::crawl::run_crawl;
use super::download::run_download;
use super::ocr::run_ocr;

/// Run the full pipeline: Crawl → Download → OCR → Assemble.
pub async fn run_pipeline(
    config: &Config,
    navigator: &dyn SiteNavigator,
    store: &dyn DocumentStore,
    augmenter: Arc<OcrAugmenter>,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let started_at = Utc::now();
    let total_steps = if config.ocr.enabled { 4 } else { 3 };
    let mut step = 1;

    log::info!("Step {}/{}: Crawl - discovering documents", step, total_steps);
    let crawl = run_crawl(config, navigator, store, cancel).await?;
    step += 1;

    log::info!("Step {}/{}: Download - updating the cache", step, total_steps);
    run_download(config, navigator, store, cancel).await?;
    step += 1;

    if config.ocr.enabled {
        log::info!("Step {}/{}: OCR - recognizing scanned pages", step, total_steps);
        run_ocr(config, store, augmenter, cancel).await?;
        step += 1;
    }

    log::info!("Step {}/{}: Assemble - writing combined PDFs", step, total_steps);
    let mut summary = assemble(config, store, crawl.failed_branch_labels()).await?;
    summary.started_at = Some(started_at);
    summary.finished_at = Some(Utc::now());
    summary.log();

    Ok(summary)
}
