// src/services/crawler.rs

//! Depth-first section crawler.
//!
//! Walks one section over a [`SiteNavigator`] and yields discovered
//! documents lazily, in site-declared order. A branch that cannot be listed
//! after all retries is reported and skipped; its siblings continue.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use futures::stream::{self, Stream};

use crate::error::AppError;
use crate::models::{DiscoveredDocument, Section, document_key};
use crate::services::navigator::{SiteNavigator, SiteNode};
use crate::utils::RetryPolicy;

/// Item produced by a section crawl.
#[derive(Debug)]
pub enum CrawlEvent {
    Document(DiscoveredDocument),
    BranchFailed { path: Vec<String>, error: AppError },
}

/// Crawler for one navigator, reusable across sections.
pub struct SectionCrawler<'a> {
    navigator: &'a dyn SiteNavigator,
    retry: RetryPolicy,
    request_delay: Duration,
}

/// Pending children of one expanded branch.
struct Frame {
    path: Vec<String>,
    pending: VecDeque<SiteNode>,
}

struct Walk<'a> {
    navigator: &'a dyn SiteNavigator,
    retry: RetryPolicy,
    request_delay: Duration,
    section: Section,
    root: Option<SiteNode>,
    stack: Vec<Frame>,
    visited: HashSet<String>,
    seen_documents: HashSet<String>,
}

impl<'a> SectionCrawler<'a> {
    pub fn new(navigator: &'a dyn SiteNavigator, retry: RetryPolicy) -> Self {
        Self {
            navigator,
            retry,
            request_delay: Duration::ZERO,
        }
    }

    /// Pause after each listing request.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Lazily crawl `section` starting at `root`.
    pub fn crawl(&self, section: Section, root: SiteNode) -> impl Stream<Item = CrawlEvent> + use<'a> {
        let walk = Walk {
            navigator: self.navigator,
            retry: self.retry.clone(),
            request_delay: self.request_delay,
            section,
            root: Some(root),
            stack: Vec::new(),
            visited: HashSet::new(),
            seen_documents: HashSet::new(),
        };

        stream::unfold(walk, |mut walk| async move {
            let event = walk.next_event().await?;
            Some((event, walk))
        })
    }
}

impl Walk<'_> {
    async fn next_event(&mut self) -> Option<CrawlEvent> {
        if let Some(root) = self.root.take() {
            let path = vec![self.section.to_string()];
            self.visited.insert(root.url.clone());
            if let Err(error) = self.expand(root, path.clone()).await {
                return Some(self.branch_failed(path, error));
            }
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some(node) = frame.pending.pop_front() else {
                self.stack.pop();
                continue;
            };
            let parent_path = frame.path.clone();

            if self.navigator.is_document(&node) {
                if !self.seen_documents.insert(document_key(&node.url)) {
                    log::debug!("Duplicate document skipped: {}", node.url);
                    continue;
                }
                return Some(CrawlEvent::Document(DiscoveredDocument {
                    section: self.section,
                    title: node.label,
                    url: node.url,
                    hierarchy_path: parent_path,
                    listed_version: node.version,
                }));
            }

            if !self.visited.insert(node.url.clone()) {
                log::debug!("Branch already visited: {}", node.url);
                continue;
            }

            let mut path = parent_path;
            path.push(node.label.clone());
            if let Err(error) = self.expand(node, path.clone()).await {
                return Some(self.branch_failed(path, error));
            }
        }
    }

    /// List a branch and push its children for traversal.
    async fn expand(&mut self, node: SiteNode, path: Vec<String>) -> Result<(), AppError> {
        let navigator = self.navigator;
        let context = format!("list {}", path.join(" / "));
        let children = self
            .retry
            .run(&context, || navigator.list_children(&node))
            .await;

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let children = children?;
        log::debug!("{}: {} children", context, children.len());
        self.stack.push(Frame {
            path,
            pending: children.into(),
        });
        Ok(())
    }

    fn branch_failed(&self, path: Vec<String>, error: AppError) -> CrawlEvent {
        log::warn!("Crawl branch failed at {}: {}", path.join(" / "), error);
        CrawlEvent::BranchFailed { path, error }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use futures::StreamExt;

    use super::*;
    use crate::testing::MockNavigator;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            timeout: Duration::from_secs(5),
        }
    }

    fn node(label: &str, url: &str) -> SiteNode {
        SiteNode::new(label, url)
    }

    fn site() -> MockNavigator {
        MockNavigator::new()
            .with_children(
                "root",
                vec![
                    node("GEN-0.1 Prefacio", "gen01.pdf"),
                    node("GEN 1", "gen1"),
                    node("GEN 2", "gen2"),
                    node("GEN-3.1 Servicios", "gen31.pdf"),
                ],
            )
            .with_children(
                "gen1",
                vec![
                    node("GEN-1.1 Autoridades", "gen11.pdf"),
                    node("GEN 1.2", "gen12"),
                ],
            )
            .with_children("gen12", vec![node("GEN-1.2.1 Entrada", "gen121.pdf")])
            .with_children(
                "gen2",
                vec![
                    node("GEN-2.1 Unidades", "gen21.pdf"),
                    // Cycle back to an already visited branch.
                    node("GEN 1", "gen1"),
                    node("GEN-0.1 Prefacio", "gen01.pdf#dup"),
                ],
            )
    }

    async fn collect(nav: &MockNavigator) -> Vec<CrawlEvent> {
        let crawler = SectionCrawler::new(nav, fast_retry());
        crawler
            .crawl(Section::Gen, node("GEN", "root"))
            .collect()
            .await
    }

    fn titles(events: &[CrawlEvent]) -> Vec<&str> {
        events
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::Document(d) => Some(d.title.as_str()),
                CrawlEvent::BranchFailed { .. } => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_depth_first_in_site_order() {
        let nav = site();
        let events = collect(&nav).await;

        assert_eq!(
            titles(&events),
            vec![
                "GEN-0.1 Prefacio",
                "GEN-1.1 Autoridades",
                "GEN-1.2.1 Entrada",
                "GEN-2.1 Unidades",
                "GEN-3.1 Servicios",
            ]
        );
    }

    #[tokio::test]
    async fn test_hierarchy_paths_follow_nesting() {
        let nav = site();
        let events = collect(&nav).await;
        let deep = events
            .iter()
            .find_map(|e| match e {
                CrawlEvent::Document(d) if d.url == "gen121.pdf" => Some(d),
                _ => None,
            })
            .unwrap();
        assert_eq!(deep.hierarchy_path, vec!["GEN", "GEN 1", "GEN 1.2"]);
    }

    #[tokio::test]
    async fn test_cycle_guard_and_dedupe() {
        let nav = site();
        let events = collect(&nav).await;
        // root, gen1, gen12, gen2: the cycle back to gen1 is not listed again.
        assert_eq!(nav.list_calls.load(Ordering::SeqCst), 4);
        assert_eq!(titles(&events).len(), 5);
    }

    #[tokio::test]
    async fn test_transient_listing_failure_is_retried() {
        let nav = site();
        nav.fail("gen1", 2);
        let events = collect(&nav).await;
        assert_eq!(titles(&events).len(), 5);
        assert!(events.iter().all(|e| matches!(e, CrawlEvent::Document(_))));
    }

    #[tokio::test]
    async fn test_failed_branch_is_reported_and_siblings_continue() {
        let nav = site();
        nav.fail("gen1", u32::MAX);
        let events = collect(&nav).await;

        let failed: Vec<&Vec<String>> = events
            .iter()
            .filter_map(|e| match e {
                CrawlEvent::BranchFailed { path, .. } => Some(path),
                CrawlEvent::Document(_) => None,
            })
            .collect();
        assert_eq!(failed, vec![&vec!["GEN".to_string(), "GEN 1".to_string()]]);
        assert_eq!(
            titles(&events),
            vec!["GEN-0.1 Prefacio", "GEN-2.1 Unidades", "GEN-3.1 Servicios"]
        );
    }

    #[tokio::test]
    async fn test_root_failure_ends_stream() {
        let nav = site();
        nav.fail("root", u32::MAX);
        let events = collect(&nav).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], CrawlEvent::BranchFailed { path, .. } if path == &vec!["GEN".to_string()]));
    }
}
