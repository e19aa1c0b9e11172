// src/testing.rs

//! Test fixtures: an in-memory navigator and generated PDFs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use crate::error::{AppError, Result};
use crate::models::{DiscoveredDocument, Section};
use crate::services::{SiteNavigator, SiteNode};

/// Site tree held in memory, with injectable failures.
#[derive(Default)]
pub struct MockNavigator {
    tree: HashMap<String, Vec<SiteNode>>,
    documents: Mutex<HashMap<String, Vec<u8>>>,
    signatures: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, u32>>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
}

impl MockNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(mut self, url: &str, children: Vec<SiteNode>) -> Self {
        self.tree.insert(url.to_string(), children);
        self
    }

    pub fn with_document(self, url: &str, bytes: Vec<u8>) -> Self {
        self.set_document(url, bytes);
        self
    }

    pub fn set_document(&self, url: &str, bytes: Vec<u8>) {
        self.documents.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn set_signature(&self, url: &str, signature: &str) {
        self.signatures
            .lock()
            .unwrap()
            .insert(url.to_string(), signature.to_string());
    }

    /// Fail the next `times` list/fetch calls for `url` with a 503.
    pub fn fail(&self, url: &str, times: u32) {
        self.failures.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, url: &str) -> Result<()> {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(AppError::Status {
                    url: url.to_string(),
                    status: 503,
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SiteNavigator for MockNavigator {
    async fn list_children(&self, node: &SiteNode) -> Result<Vec<SiteNode>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure(&node.url)?;
        self.tree.get(&node.url).cloned().ok_or_else(|| AppError::Status {
            url: node.url.clone(),
            status: 404,
        })
    }

    fn is_document(&self, node: &SiteNode) -> bool {
        node.url.split('#').next().is_some_and(|u| u.ends_with(".pdf"))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.take_failure(url)?;
        self.documents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::Status {
                url: url.to_string(),
                status: 404,
            })
    }

    async fn probe(&self, url: &str) -> Result<Option<String>> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.signatures.lock().unwrap().get(url).cloned())
    }
}

/// A discovered document with a one-level hierarchy.
pub fn discovered(section: Section, title: &str, url: &str) -> DiscoveredDocument {
    DiscoveredDocument {
        section,
        title: title.to_string(),
        url: url.to_string(),
        hierarchy_path: vec![section.to_string()],
        listed_version: Some("01/24".to_string()),
    }
}

fn finish(mut doc: Document, pages_id: lopdf::ObjectId, kids: Vec<lopdf::ObjectId>) -> Vec<u8> {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids.into_iter().map(Object::Reference).collect::<Vec<_>>(),
            "Count" => Object::Integer(count),
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// PDF whose pages carry `text` as real text, inheriting MediaBox from the tree.
pub fn text_pdf(pages: usize, text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let kids = (0..pages)
        .map(|i| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("{text} - page {}", i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            })
        })
        .collect();

    finish(doc, pages_id, kids)
}

/// PDF of scanned pages: one painted image each, no text.
pub fn image_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 2,
            "Height" => 2,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0, 255, 255, 0],
    ));

    let kids = (0..pages)
        .map(|_| {
            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![500.into(), 0.into(), 0.into(), 700.into(), 47.into(), 71.into()],
                    ),
                    Operation::new("Do", vec!["Im1".into()]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im1" => image_id },
                },
            })
        })
        .collect();

    finish(doc, pages_id, kids)
}

/// One page with an empty content stream.
pub fn blank_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    finish(doc, pages_id, vec![page_id])
}

/// A PDF cut short, as left by an interrupted transfer.
pub fn truncated_pdf() -> Vec<u8> {
    let full = text_pdf(2, "truncated");
    full[..full.len() / 2].to_vec()
}
