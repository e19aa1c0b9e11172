// src/pipeline/ocr.rs

//! OCR stage: add a text layer to scanned documents.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::services::{OcrAugmenter, OcrReport};
use crate::storage::DocumentStore;

/// Counts of the OCR stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OcrSummary {
    pub examined: usize,
    pub augmented: usize,
    pub pages_recognized: usize,
    pub warnings: usize,
    /// The engine was missing; remaining documents were passed through
    pub unavailable: bool,
}

/// Examine downloaded documents not yet checked and write OCR copies.
///
/// A missing engine is a warning: the stage stops and documents keep
/// their unmodified pages. They are examined again on a later run.
pub async fn run_ocr(
    config: &Config,
    store: &dyn DocumentStore,
    augmenter: Arc<OcrAugmenter>,
    cancel: &CancellationToken,
) -> Result<OcrSummary> {
    let mut summary = OcrSummary::default();
    if !config.ocr.enabled {
        log::info!("OCR disabled");
        return Ok(summary);
    }

    let mut catalog = store.load_catalog().await?;
    let pending: Vec<_> = catalog
        .iter()
        .filter(|r| r.included && r.status.is_available() && !r.ocr_checked)
        .filter_map(|r| {
            let source = r.local_path.clone().filter(|p| p.exists())?;
            Some((r.key.clone(), r.title.clone(), source, store.ocr_path(&r.cache_id)))
        })
        .collect();
    log::info!("OCR: {} documents to examine", pending.len());

    for (key, title, source, dest) in pending {
        if cancel.is_cancelled() {
            log::warn!("OCR cancelled");
            break;
        }

        let worker = Arc::clone(&augmenter);
        let task_dest = dest.clone();
        let result: Result<OcrReport> =
            tokio::task::spawn_blocking(move || worker.augment(&source, &task_dest))
                .await
                .map_err(|e| AppError::validation(format!("OCR task failed: {e}")))?;

        let Some(record) = catalog.get_mut(&key) else {
            continue;
        };
        match result {
            Ok(report) => {
                summary.examined += 1;
                summary.warnings += report.warnings.len();
                record.ocr_checked = true;
                if report.wrote_copy() {
                    log::info!(
                        "OCR: {} ({} of {} pages recognized)",
                        title,
                        report.recognized,
                        report.pages
                    );
                    record.ocr_path = Some(dest);
                    record.ocr_pages = report.recognized;
                    summary.augmented += 1;
                    summary.pages_recognized += report.recognized;
                } else {
                    record.ocr_path = None;
                    record.ocr_pages = 0;
                }
            }
            Err(AppError::OcrUnavailable(reason)) => {
                log::warn!("OCR unavailable ({}); pages passed through unmodified", reason);
                summary.unavailable = true;
                break;
            }
            Err(e) => {
                log::warn!("OCR skipped for {}: {}", title, e);
                summary.warnings += 1;
                record.ocr_checked = true;
            }
        }
    }

    store.save_catalog(&catalog).await?;
    Ok(summary)
}
