// src/pipeline/crawl.rs

//! Crawl stage: discover documents and rebuild the catalog.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Catalog, Config, DiscoveredDocument, Section};
use crate::services::{CrawlEvent, DocumentFilter, FilterOutcome, SectionCrawler, SiteNavigator, SiteNode};
use crate::storage::DocumentStore;
use crate::utils::RetryPolicy;

use super::diff::{CatalogDiff, calculate_diff};

/// Result of the crawl stage.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub discovered: BTreeMap<Section, usize>,
    /// Hierarchy paths of branches that could not be listed
    pub failed_branches: Vec<Vec<String>>,
    pub diff: CatalogDiff,
    pub filter: FilterOutcome,
}

impl CrawlReport {
    pub fn failed_branch_labels(&self) -> Vec<String> {
        self.failed_branches.iter().map(|p| p.join(" / ")).collect()
    }
}

/// Documents and failed branches of one section.
struct SectionResult {
    section: Section,
    documents: Vec<DiscoveredDocument>,
    failed: Vec<Vec<String>>,
}

async fn crawl_section(
    crawler: &SectionCrawler<'_>,
    section: Section,
    root: SiteNode,
    cancel: &CancellationToken,
) -> SectionResult {
    log::info!("Crawling {} from {}", section, root.url);
    let mut result = SectionResult {
        section,
        documents: Vec::new(),
        failed: Vec::new(),
    };

    let mut events = Box::pin(crawler.crawl(section, root).take_until(cancel.cancelled()));
    while let Some(event) = events.next().await {
        match event {
            CrawlEvent::Document(doc) => result.documents.push(doc),
            CrawlEvent::BranchFailed { path, .. } => result.failed.push(path),
        }
    }

    log::info!(
        "{}: {} documents, {} failed branches",
        section,
        result.documents.len(),
        result.failed.len()
    );
    result
}

/// Crawl the configured sections, then merge, filter and persist the catalog.
///
/// Sections are crawled concurrently; the catalog keeps section order.
pub async fn run_crawl(
    config: &Config,
    navigator: &dyn SiteNavigator,
    store: &dyn DocumentStore,
    cancel: &CancellationToken,
) -> Result<CrawlReport> {
    let crawler = SectionCrawler::new(navigator, RetryPolicy::from_config(&config.crawler))
        .with_request_delay(Duration::from_millis(config.crawler.request_delay_ms));

    let roots: Vec<(Section, SiteNode)> = Section::ALL
        .into_iter()
        .filter(|s| config.filter.sections.contains(s))
        .filter_map(|section| {
            let entry = config.section_entry(section)?;
            let root = SiteNode::new(section.as_str(), &entry.url).with_scope(entry.scope.clone());
            Some((section, root))
        })
        .collect();

    let results: Vec<SectionResult> = stream::iter(roots)
        .map(|(section, root)| crawl_section(&crawler, section, root, cancel))
        .buffered(config.crawler.max_concurrent.max(1))
        .collect()
        .await;

    if cancel.is_cancelled() {
        log::warn!("Crawl cancelled; catalog left untouched");
        return Err(AppError::Cancelled);
    }

    let mut report = CrawlReport::default();
    let mut discovered = Vec::new();
    for result in results {
        report.discovered.insert(result.section, result.documents.len());
        report.failed_branches.extend(result.failed);
        discovered.extend(result.documents);
    }

    let previous = store.load_catalog().await?;
    let mut catalog = Catalog::from_crawl(&previous, &discovered, &report.failed_branches);

    report.diff = calculate_diff(&previous, &catalog);
    for key in &report.diff.added {
        if let Some(record) = catalog.get(key) {
            log::info!("discovered: {} ({})", record.title, record.section);
        }
    }
    for key in &report.diff.removed {
        log::info!("Removed from site: {}", key);
    }
    if !report.diff.has_changes() {
        log::info!("No catalog changes since the last crawl");
    }

    report.filter = DocumentFilter::new(&config.filter).apply(&mut catalog);
    store.save_catalog(&catalog).await?;

    log::info!(
        "Catalog: {} documents ({} included, {} excluded; {} new, {} updated, {} removed)",
        catalog.len(),
        report.filter.included,
        report.filter.excluded,
        report.diff.added.len(),
        report.diff.updated.len(),
        report.diff.removed.len()
    );
    Ok(report)
}
