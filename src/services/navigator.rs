// src/services/navigator.rs

//! Access to the remote publication site.
//!
//! The crawler only sees the [`SiteNavigator`] capability. [`HtmlNavigator`]
//! implements it for table-style listings driven by CSS selectors from
//! [`SiteConfig`].

use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::SiteConfig;
use crate::utils::{clean_text, http, resolve_url};

/// A navigable entry: a sub-section page or a document link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteNode {
    pub label: String,
    pub url: String,
    /// Version label shown next to the link, if any
    pub version: Option<String>,
    /// CSS selector restricting which part of the page lists children
    pub scope: Option<String>,
}

impl SiteNode {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
            version: None,
            scope: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_scope(mut self, scope: Option<String>) -> Self {
        self.scope = scope;
        self
    }
}

/// Capability to walk and read the remote site.
#[async_trait]
pub trait SiteNavigator: Send + Sync {
    /// Children of a node, in site-declared order.
    async fn list_children(&self, node: &SiteNode) -> Result<Vec<SiteNode>>;

    /// Whether a node is a document rather than a sub-section.
    fn is_document(&self, node: &SiteNode) -> bool;

    /// Download a document body.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Cheap version signature without downloading the body.
    async fn probe(&self, _url: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Navigator for HTML table listings with "next page" pagination.
pub struct HtmlNavigator {
    client: Client,
    row_sel: Selector,
    title_sel: Selector,
    link_sel: Selector,
    version_sel: Option<Selector>,
    anchor_sel: Selector,
    next_page_text: String,
    max_listing_pages: usize,
    document_pattern: Regex,
}

impl HtmlNavigator {
    pub fn new(client: Client, site: &SiteConfig) -> Result<Self> {
        Ok(Self {
            client,
            row_sel: parse_selector(&site.row_selector)?,
            title_sel: parse_selector(&site.title_selector)?,
            link_sel: parse_selector(&site.link_selector)?,
            version_sel: site
                .version_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?,
            anchor_sel: parse_selector("a[href]")?,
            next_page_text: site.next_page_text.trim().to_lowercase(),
            max_listing_pages: site.max_listing_pages.max(1),
            document_pattern: Regex::new(&site.document_url_pattern)?,
        })
    }

    /// Extract child nodes and the next-page URL from one listing page.
    fn parse_listing(
        &self,
        html: &str,
        page_url: &Url,
        scope: Option<&str>,
    ) -> Result<(Vec<SiteNode>, Option<String>)> {
        let document = Html::parse_document(html);

        let root = match scope {
            Some(scope) => {
                let scope_sel = parse_selector(scope)?;
                document
                    .select(&scope_sel)
                    .next()
                    .ok_or_else(|| AppError::selector(scope, "matched nothing on listing page"))?
            }
            None => document.root_element(),
        };

        let mut nodes = Vec::new();
        for row in root.select(&self.row_sel) {
            if let Some(node) = self.parse_row(&row, page_url) {
                nodes.push(node);
            }
        }

        let next = root
            .select(&self.anchor_sel)
            .find(|a| clean_text(&a.text().collect::<String>()).to_lowercase() == self.next_page_text)
            .and_then(|a| a.value().attr("href"))
            .filter(|href| !href.starts_with('#') && !href.starts_with("javascript:"))
            .map(|href| resolve_url(page_url, href));

        Ok((nodes, next))
    }

    fn parse_row(&self, row: &ElementRef, page_url: &Url) -> Option<SiteNode> {
        let title = clean_text(&row.select(&self.title_sel).next()?.text().collect::<String>());
        if title.is_empty() {
            return None;
        }

        let link = row.select(&self.link_sel).next()?;
        let href = link.value().attr("href")?.trim();
        if href.is_empty() {
            return None;
        }

        let version = match &self.version_sel {
            Some(sel) => row.select(sel).next().map(|e| e.text().collect::<String>()),
            None => Some(link.text().collect::<String>()),
        }
        .map(|v| clean_text(&v))
        .filter(|v| !v.is_empty());

        Some(SiteNode {
            label: title,
            url: resolve_url(page_url, href),
            version,
            scope: None,
        })
    }
}

#[async_trait]
impl SiteNavigator for HtmlNavigator {
    async fn list_children(&self, node: &SiteNode) -> Result<Vec<SiteNode>> {
        let mut children = Vec::new();
        let mut seen = HashSet::new();
        let mut visited_pages = HashSet::new();
        let mut page_url = node.url.clone();

        for page in 1..=self.max_listing_pages {
            if !visited_pages.insert(page_url.clone()) {
                break;
            }
            let base = Url::parse(&page_url)?;
            let html = http::fetch_text(&self.client, &page_url).await?;
            let (nodes, next) = self.parse_listing(&html, &base, node.scope.as_deref())?;

            log::debug!("Listing page {} of {}: {} rows", page, node.label, nodes.len());
            for child in nodes {
                if seen.insert(child.url.clone()) {
                    children.push(child);
                }
            }

            match next {
                Some(next) => page_url = next,
                None => break,
            }
        }

        Ok(children)
    }

    fn is_document(&self, node: &SiteNode) -> bool {
        self.document_pattern.is_match(&node.url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        http::fetch_bytes(&self.client, url).await
    }

    async fn probe(&self, url: &str) -> Result<Option<String>> {
        let response = http::check_status(self.client.head(url).send().await?)?;
        let headers = response.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Ok(header("etag")
            .map(|etag| format!("etag:{etag}"))
            .or_else(|| header("last-modified").map(|lm| format!("last-modified:{lm}"))))
    }
}

pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SiteConfig;

    const LISTING: &str = r##"
        <html><body>
        <div id="gen">
          <table><tbody>
            <tr><td> GEN-0.1  Prefacio </td><td><a href="docs/GEN-0.1.pdf">02/24</a></td></tr>
            <tr><td>GEN 1 Reglamentos</td><td><a href="/aip/gen1">Ver</a></td></tr>
            <tr><td></td><td><a href="docs/empty.pdf">01/24</a></td></tr>
            <tr><td>Sin enlace</td><td>-</td></tr>
          </tbody></table>
          <a href="?page=2">Siguiente</a>
        </div>
        <div id="enr">
          <table><tbody>
            <tr><td>ENR-1.1 Reglas</td><td><a href="docs/ENR-1.1.pdf">03/24</a></td></tr>
          </tbody></table>
        </div>
        </body></html>
    "##;

    fn navigator() -> HtmlNavigator {
        HtmlNavigator::new(Client::new(), &SiteConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_listing_rows_and_next() {
        let nav = navigator();
        let base = Url::parse("https://ais.anac.gob.ar/aip").unwrap();
        let (nodes, next) = nav.parse_listing(LISTING, &base, Some("#gen")).unwrap();

        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].label, "GEN-0.1 Prefacio");
        assert_eq!(nodes[0].url, "https://ais.anac.gob.ar/docs/GEN-0.1.pdf");
        assert_eq!(nodes[0].version.as_deref(), Some("02/24"));
        assert_eq!(nodes[1].url, "https://ais.anac.gob.ar/aip/gen1");
        assert_eq!(next.as_deref(), Some("https://ais.anac.gob.ar/aip?page=2"));
    }

    #[test]
    fn test_scope_limits_rows() {
        let nav = navigator();
        let base = Url::parse("https://ais.anac.gob.ar/aip").unwrap();
        let (nodes, next) = nav.parse_listing(LISTING, &base, Some("#enr")).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].label, "ENR-1.1 Reglas");
        assert!(next.is_none());
    }

    #[test]
    fn test_missing_scope_is_error() {
        let nav = navigator();
        let base = Url::parse("https://ais.anac.gob.ar/aip").unwrap();
        assert!(matches!(
            nav.parse_listing(LISTING, &base, Some("#ad")),
            Err(AppError::Selector { .. })
        ));
    }

    #[test]
    fn test_is_document_by_url_pattern() {
        let nav = navigator();
        assert!(nav.is_document(&SiteNode::new("a", "https://x/GEN-0.1.PDF")));
        assert!(nav.is_document(&SiteNode::new("a", "https://x/a.pdf?v=2")));
        assert!(!nav.is_document(&SiteNode::new("a", "https://x/aip/gen1")));
    }
}
