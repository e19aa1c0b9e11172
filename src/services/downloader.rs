// src/services/downloader.rs

//! Incremental document downloader.
//!
//! Every included record is checked against its stored version signature
//! and fetched only when the remote copy changed or the cache lost it.
//! Fetches run with bounded parallelism; outcomes are applied to the
//! catalog by the loop that drains the stream.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Catalog, ChangeDetection, DocumentStatus};
use crate::services::SiteNavigator;
use crate::services::pdf::verify_pdf_bytes;
use crate::storage::DocumentStore;
use crate::utils::RetryPolicy;

/// Snapshot of the record fields a download needs.
#[derive(Debug, Clone)]
struct Job {
    key: String,
    url: String,
    title: String,
    cache_id: String,
    listed_version: Option<String>,
    previous_signature: Option<String>,
    previous_sha256: Option<String>,
    cached: bool,
}

/// What happened to one record.
#[derive(Debug)]
enum Outcome {
    Downloaded {
        path: PathBuf,
        signature: Option<String>,
        sha256: String,
        size: u64,
    },
    Unchanged {
        signature: Option<String>,
    },
    Failed(AppError),
    Cancelled,
}

/// Whether the remote copy must be fetched, given the signature observed now.
///
/// `current` is `None` when the strategy yields no cheap signature, in
/// which case only a content hash can decide.
pub fn needs_fetch(previous: Option<&str>, current: Option<&str>, cached: bool) -> bool {
    match (previous, current) {
        _ if !cached => true,
        (Some(prev), Some(cur)) => prev != cur,
        _ => true,
    }
}

/// Per-run download counts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Bounded-parallel downloader writing into a [`DocumentStore`].
pub struct Downloader<'a> {
    navigator: &'a dyn SiteNavigator,
    store: &'a dyn DocumentStore,
    retry: RetryPolicy,
    strategy: ChangeDetection,
    max_concurrent: usize,
    request_delay: Duration,
    cancel: CancellationToken,
}

impl<'a> Downloader<'a> {
    pub fn new(
        navigator: &'a dyn SiteNavigator,
        store: &'a dyn DocumentStore,
        retry: RetryPolicy,
        strategy: ChangeDetection,
    ) -> Self {
        Self {
            navigator,
            store,
            retry,
            strategy,
            max_concurrent: 4,
            request_delay: Duration::ZERO,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bring the cache up to date for every included record.
    pub async fn run(&self, catalog: &mut Catalog) -> DownloadReport {
        let jobs: Vec<Job> = catalog
            .iter()
            .filter(|r| r.included)
            .map(|r| Job {
                key: r.key.clone(),
                url: r.url.clone(),
                title: r.title.clone(),
                cache_id: r.cache_id.clone(),
                listed_version: r.listed_version.clone(),
                previous_signature: r.version_signature.clone(),
                previous_sha256: r.content_sha256.clone(),
                // A cache file the assembler rejected must be fetched again.
                cached: r.status != DocumentStatus::ExcludedDueToCorruption
                    && self.store.document_path(&r.cache_id).exists(),
            })
            .collect();

        log::info!(
            "Checking {} documents ({} concurrent, {:?} change detection)",
            jobs.len(),
            self.max_concurrent,
            self.strategy
        );

        let mut report = DownloadReport::default();
        let mut outcomes = stream::iter(jobs)
            .map(|job| async move {
                let outcome = self.process(&job).await;
                (job, outcome)
            })
            .buffer_unordered(self.max_concurrent);

        while let Some((job, outcome)) = outcomes.next().await {
            let Some(record) = catalog.get_mut(&job.key) else {
                continue;
            };

            match outcome {
                Outcome::Downloaded {
                    path,
                    signature,
                    sha256,
                    size,
                } => {
                    log::info!("downloaded: {} ({} bytes)", job.title, size);
                    record.version_signature = signature.or_else(|| Some(format!("sha256:{sha256}")));
                    record.content_sha256 = Some(sha256);
                    record.local_path = Some(path);
                    record.byte_size = Some(size);
                    record.page_count = None;
                    record.retrieved_at = Some(Utc::now());
                    record.status = DocumentStatus::Downloaded;
                    record.failure_reason = None;
                    record.ocr_path = None;
                    record.ocr_pages = 0;
                    record.ocr_checked = false;
                    report.downloaded += 1;
                }
                Outcome::Unchanged { signature } => {
                    log::info!("skipped-unchanged: {}", job.title);
                    if signature.is_some() {
                        record.version_signature = signature;
                    }
                    let path = self.store.document_path(&job.cache_id);
                    if record.byte_size.is_none() {
                        record.byte_size = std::fs::metadata(&path).ok().map(|m| m.len());
                    }
                    record.local_path = Some(path);
                    record.status = DocumentStatus::Unchanged;
                    record.failure_reason = None;
                    report.unchanged += 1;
                }
                Outcome::Failed(error) => {
                    log::warn!("failed: {} ({})", job.title, error);
                    record.status = DocumentStatus::DownloadFailed;
                    record.failure_reason = Some(error.to_string());
                    report.failed += 1;
                }
                Outcome::Cancelled => {
                    report.cancelled += 1;
                }
            }

            if !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        log::info!(
            "Downloads: {} downloaded, {} unchanged, {} failed",
            report.downloaded,
            report.unchanged,
            report.failed
        );
        if report.cancelled > 0 {
            log::warn!("{} downloads not started (cancelled)", report.cancelled);
        }
        report
    }

    async fn process(&self, job: &Job) -> Outcome {
        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        let signature = match self.strategy {
            ChangeDetection::ListedVersion => job.listed_version.as_ref().map(|v| format!("listed:{v}")),
            ChangeDetection::Probe => self.probe(&job.url).await,
            ChangeDetection::ContentHash => None,
        };

        if signature.is_some()
            && !needs_fetch(job.previous_signature.as_deref(), signature.as_deref(), job.cached)
        {
            return Outcome::Unchanged { signature };
        }

        let bytes = match self.fetch_verified(&job.url).await {
            Ok(bytes) => bytes,
            Err(e) => return Outcome::Failed(AppError::download_failed(&job.url, e)),
        };
        let sha256 = hex::encode(Sha256::digest(&bytes));

        if job.cached && job.previous_sha256.as_deref() == Some(sha256.as_str()) {
            return Outcome::Unchanged { signature };
        }

        if self.cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        match self.store.write_document(&job.cache_id, &bytes).await {
            Ok(path) => Outcome::Downloaded {
                path,
                signature,
                sha256,
                size: bytes.len() as u64,
            },
            Err(e) => Outcome::Failed(e),
        }
    }

    /// Cheap remote signature; a failed probe falls back to fetching.
    async fn probe(&self, url: &str) -> Option<String> {
        let navigator = self.navigator;
        match self.retry.run(&format!("probe {url}"), || navigator.probe(url)).await {
            Ok(signature) => signature,
            Err(e) => {
                log::debug!("Probe failed for {}: {}", url, e);
                None
            }
        }
    }

    /// Fetch and verify, retrying truncated or malformed payloads.
    async fn fetch_verified(&self, url: &str) -> Result<Vec<u8>> {
        let navigator = self.navigator;
        self.retry
            .run(&format!("fetch {url}"), || async move {
                let bytes = navigator.fetch(url).await?;
                verify_pdf_bytes(&bytes).map_err(|reason| AppError::corrupt(url, reason))?;
                Ok(bytes)
            })
            .await
    }
}
