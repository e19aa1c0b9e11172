// src/pipeline/assemble.rs

//! Assembly stage: write the combined PDFs and `metadata.json`.

use crate::error::{AppError, Result};
use crate::models::{Config, DocumentStatus, Metadata, RunSummary};
use crate::services::Assembler;
use crate::storage::{DocumentStore, LocalStorage};

/// Sidecar file written next to the assembled PDFs.
pub const METADATA_FILE: &str = "metadata.json";

/// Assemble the cached documents into the output directory.
pub async fn run_assemble(config: &Config, store: &dyn DocumentStore) -> Result<RunSummary> {
    assemble(config, store, Vec::new()).await
}

/// Assemble, recording crawl branch failures in the summary.
pub(crate) async fn assemble(
    config: &Config,
    store: &dyn DocumentStore,
    failed_branches: Vec<String>,
) -> Result<RunSummary> {
    let mut catalog = store.load_catalog().await?;
    let assembler = Assembler::new(&config.assembly, &config.paths.output_dir);
    let sections = config.filter.sections.clone();

    let snapshot = catalog.clone();
    let report = tokio::task::spawn_blocking(move || assembler.assemble(&snapshot, &sections))
        .await
        .map_err(|e| AppError::validation(format!("assembly task failed: {e}")))??;

    for (key, reason) in &report.corrupt {
        if let Some(record) = catalog.get_mut(key) {
            record.status = DocumentStatus::ExcludedDueToCorruption;
            record.failure_reason = Some(reason.clone());
        }
    }
    for (key, pages) in &report.page_counts {
        if let Some(record) = catalog.get_mut(key) {
            record.page_count = Some(*pages);
        }
    }
    store.save_catalog(&catalog).await?;

    let mut summary = RunSummary::from_catalog(&catalog);
    summary.outputs = report.outputs.iter().map(|o| o.path.clone()).collect();
    summary.grouping_errors = report.grouping_errors.clone();
    summary.failed_branches = failed_branches;

    let metadata = Metadata::new(&catalog, report.outputs, summary.clone());
    LocalStorage::new(&config.paths.output_dir)
        .write_json(METADATA_FILE, &metadata)
        .await
        .map_err(|e| match e {
            AppError::Io(source) => {
                AppError::assembly_io(config.paths.output_dir.join(METADATA_FILE), source)
            }
            other => other,
        })?;

    Ok(summary)
}
