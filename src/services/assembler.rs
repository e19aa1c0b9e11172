// src/services/assembler.rs

//! Combined PDF assembly.
//!
//! Cached documents are merged per section and into one complete volume.
//! Every artifact carries a bookmark tree mirroring the site hierarchy, a
//! hyperlinked table of contents and an Info dictionary. Artifacts above
//! the size ceiling are split at document boundaries.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Document, Object, ObjectId};

use crate::error::{AppError, Result};
use crate::models::{
    AssemblyConfig, BookmarkNode, Catalog, CombinedOutput, Grouping, PlacedDocument, Section,
    build_tree, flatten,
};
use crate::services::pdf::merge::merge_documents;
use crate::services::pdf::outline::write_outline;
use crate::services::pdf::text::text_string;
use crate::services::pdf::toc::{self, TocHeader};
use crate::services::pdf::{load_verified, pdf_date};
use crate::utils::fs::write_atomic;

/// Bookmark and TOC entry pointing at the TOC itself.
pub const TOC_LABEL: &str = "Índice de contenidos";
const TOC_TITLE: &str = "ÍNDICE DE CONTENIDOS";
const PRODUCER: &str = concat!("aip-mirror ", env!("CARGO_PKG_VERSION"));

/// A cached document ready to merge.
struct Source {
    key: String,
    title: String,
    hierarchy_path: Vec<String>,
    section: Section,
    signature: Option<String>,
    doc: Document,
    byte_size: u64,
    page_count: usize,
}

/// Bytes of one built artifact.
struct Built {
    bytes: Vec<u8>,
    page_count: usize,
}

/// Outcome of an assembly run.
#[derive(Debug, Default)]
pub struct AssemblyReport {
    pub outputs: Vec<CombinedOutput>,
    /// Keys of unreadable sources, with the reason
    pub corrupt: Vec<(String, String)>,
    /// Page counts of the sources that were merged
    pub page_counts: Vec<(String, usize)>,
    pub grouping_errors: Vec<String>,
}

/// Greedy partition of consecutive documents so each part stays under `ceiling`.
///
/// A document larger than the ceiling gets a part of its own.
pub fn plan_parts(sizes: &[u64], ceiling: u64) -> Vec<std::ops::Range<usize>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut total = 0u64;
    for (i, &size) in sizes.iter().enumerate() {
        if i > start && total + size > ceiling {
            parts.push(start..i);
            start = i;
            total = 0;
        }
        total += size;
    }
    if start < sizes.len() {
        parts.push(start..sizes.len());
    }
    parts
}

fn shift(nodes: Vec<BookmarkNode>, offset: usize) -> Vec<BookmarkNode> {
    nodes
        .into_iter()
        .map(|node| BookmarkNode {
            label: node.label,
            target_page: node.target_page + offset,
            children: shift(node.children, offset),
        })
        .collect()
}

/// Builds and writes combined PDFs into an output directory.
pub struct Assembler {
    output_dir: PathBuf,
    output_name: String,
    publication_title: String,
    max_bytes: u64,
    always_emit_sections: bool,
    generated_at: DateTime<Utc>,
}

impl Assembler {
    pub fn new(config: &AssemblyConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: config.output_name.clone(),
            publication_title: config.publication_title.clone(),
            max_bytes: config.max_file_size_bytes(),
            always_emit_sections: config.always_emit_sections,
            generated_at: Utc::now(),
        }
    }

    /// Override the size ceiling in bytes.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }

    /// Assemble every grouping from the catalog.
    ///
    /// Only [`AppError::AssemblyIo`] aborts the run; groupings that cannot
    /// be built are reported in [`AssemblyReport::grouping_errors`].
    pub fn assemble(&self, catalog: &Catalog, sections: &[Section]) -> Result<AssemblyReport> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| AppError::assembly_io(&self.output_dir, e))?;

        let mut report = AssemblyReport::default();
        let sources = self.load_sources(catalog, &mut report);
        report.page_counts = sources.iter().map(|s| (s.key.clone(), s.page_count)).collect();
        log::info!("Assembling {} documents into {}", sources.len(), self.output_dir.display());

        let all: Vec<&Source> = sources.iter().collect();
        let complete_written = if all.is_empty() {
            report
                .grouping_errors
                .push(AppError::grouping_empty(None).to_string());
            false
        } else {
            self.assemble_complete(&all, &mut report)?
        };

        if self.always_emit_sections || !complete_written {
            for &section in sections {
                let members: Vec<&Source> = sources.iter().filter(|s| s.section == section).collect();
                if members.is_empty() {
                    let error = AppError::grouping_empty(Some(section));
                    log::warn!("{}", error);
                    report.grouping_errors.push(error.to_string());
                    continue;
                }
                self.assemble_section(section, &members, &mut report)?;
            }
        }

        Ok(report)
    }

    /// Load included, downloaded records in catalog order.
    fn load_sources(&self, catalog: &Catalog, report: &mut AssemblyReport) -> Vec<Source> {
        let mut records: Vec<_> = catalog
            .iter()
            .filter(|r| r.included && r.status.is_available())
            .collect();
        records.sort_by_key(|r| r.ordinal);

        let mut sources = Vec::with_capacity(records.len());
        for record in records {
            let Some(path) = record.assembly_source() else {
                report
                    .corrupt
                    .push((record.key.clone(), "no cached file".to_string()));
                continue;
            };
            match load_verified(path) {
                Ok(doc) => {
                    let byte_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                    sources.push(Source {
                        key: record.key.clone(),
                        title: record.title.clone(),
                        hierarchy_path: record.hierarchy_path.clone(),
                        section: record.section,
                        signature: record.version_signature.clone(),
                        page_count: doc.get_pages().len(),
                        doc,
                        byte_size,
                    });
                }
                Err(e) => {
                    log::warn!("excluded: {} ({})", record.title, e);
                    report.corrupt.push((record.key.clone(), e.to_string()));
                }
            }
        }
        sources
    }

    /// Build the complete volume; `false` when it was abandoned.
    fn assemble_complete(&self, sources: &[&Source], report: &mut AssemblyReport) -> Result<bool> {
        let built = self.build(Grouping::All, sources);
        self.place_complete(built, sources, report)
    }

    /// Write a built complete volume, or leave the directory as it was.
    ///
    /// A volume over the ceiling supersedes the previous one, which is removed.
    fn place_complete(
        &self,
        built: Result<Built>,
        sources: &[&Source],
        report: &mut AssemblyReport,
    ) -> Result<bool> {
        let path = self.output_dir.join(format!("{}_Completo.pdf", self.output_name));
        let built = match built {
            Ok(built) => built,
            Err(e) => {
                log::warn!("Complete volume could not be built, falling back to sections: {}", e);
                report
                    .grouping_errors
                    .push(format!("ALL: build failed: {e}"));
                return Ok(false);
            }
        };

        if built.bytes.len() as u64 > self.max_bytes {
            log::warn!(
                "Complete volume is {} bytes, over the {} byte ceiling; not written",
                built.bytes.len(),
                self.max_bytes
            );
            let name = path_name(&path);
            self.remove_stale(&[], |n| n == name)?;
            return Ok(false);
        }

        self.write(&path, &built.bytes)?;
        report.outputs.push(output(Grouping::All, &path, sources, &built, None));
        Ok(true)
    }

    fn assemble_section(
        &self,
        section: Section,
        sources: &[&Source],
        report: &mut AssemblyReport,
    ) -> Result<()> {
        let grouping = Grouping::Section(section);
        let whole = match self.build(grouping, sources) {
            Ok(built) => built,
            Err(e) => {
                log::error!("Section {} could not be built: {}", section, e);
                report.grouping_errors.push(format!("{section}: build failed: {e}"));
                return Ok(());
            }
        };

        let single = self
            .output_dir
            .join(format!("{}_{}.pdf", self.output_name, section));
        let part_prefix = format!("{}_{}_Parte", self.output_name, section);
        let single_name = path_name(&single);
        let is_section_file =
            |name: &str| name == single_name || (name.starts_with(&part_prefix) && name.ends_with(".pdf"));

        if whole.bytes.len() as u64 <= self.max_bytes || sources.len() == 1 {
            if sources.len() == 1 && whole.bytes.len() as u64 > self.max_bytes {
                log::warn!(
                    "{}: single document {} exceeds the size ceiling; written alone",
                    section,
                    sources[0].title
                );
            }
            self.write(&single, &whole.bytes)?;
            report.outputs.push(output(grouping, &single, sources, &whole, None));
            self.remove_stale(&[single.clone()], is_section_file)?;
            return Ok(());
        }

        log::info!(
            "{} is {} bytes, over the {} byte ceiling; splitting",
            section,
            whole.bytes.len(),
            self.max_bytes
        );
        let sizes: Vec<u64> = sources.iter().map(|s| s.byte_size).collect();
        let mut pieces = Vec::new();
        for range in plan_parts(&sizes, self.max_bytes) {
            match self.build_bounded(grouping, &sources[range]) {
                Ok(mut built) => pieces.append(&mut built),
                Err(e) => {
                    log::error!("Section {} part could not be built: {}", section, e);
                    report.grouping_errors.push(format!("{section}: build failed: {e}"));
                    return Ok(());
                }
            }
        }

        let mut written = Vec::with_capacity(pieces.len());
        for (index, (members, built)) in pieces.iter().enumerate() {
            let part = index + 1;
            let path = self.output_dir.join(format!("{part_prefix}{part}.pdf"));
            if let Err(e) = self.write(&path, &built.bytes) {
                if !written.is_empty() {
                    log::error!(
                        "{}: parts 1 to {} of {} were replaced before the failure; \
                         parts from the previous run may remain next to them",
                        section,
                        written.len(),
                        pieces.len()
                    );
                }
                return Err(e);
            }
            report
                .outputs
                .push(output(grouping, &path, members, built, Some(part)));
            written.push(path);
        }
        self.remove_stale(&written, is_section_file)?;
        Ok(())
    }

    /// Build `sources`, halving at document boundaries while over the ceiling.
    fn build_bounded<'s>(
        &self,
        grouping: Grouping,
        sources: &[&'s Source],
    ) -> Result<Vec<(Vec<&'s Source>, Built)>> {
        let built = self.build(grouping, sources)?;
        if built.bytes.len() as u64 <= self.max_bytes || sources.len() == 1 {
            if sources.len() == 1 && built.bytes.len() as u64 > self.max_bytes {
                log::warn!(
                    "{}: single document {} exceeds the size ceiling; written alone",
                    grouping,
                    sources[0].title
                );
            }
            return Ok(vec![(sources.to_vec(), built)]);
        }
        let (left, right) = sources.split_at(sources.len() / 2);
        let mut pieces = self.build_bounded(grouping, left)?;
        pieces.extend(self.build_bounded(grouping, right)?);
        Ok(pieces)
    }

    /// Merge sources and add TOC, outline and metadata.
    fn build(&self, grouping: Grouping, sources: &[&Source]) -> Result<Built> {
        let mut merged = merge_documents(sources.iter().map(|s| s.doc.clone()).collect())?;

        let content_tree = build_tree(sources.iter().zip(&merged.first_pages).map(|(s, &first)| {
            PlacedDocument {
                hierarchy_path: &s.hierarchy_path,
                label: &s.title,
                first_page: first,
            }
        }));
        let toc_pages = toc::page_count(flatten(&content_tree).len() + 1);

        let mut roots = vec![BookmarkNode::leaf(TOC_LABEL, 0)];
        roots.extend(shift(content_tree, toc_pages));
        let lines = flatten(&roots);

        let header = TocHeader {
            title: TOC_TITLE.to_string(),
            subtitle: match grouping {
                Grouping::All => self.publication_title.clone(),
                Grouping::Section(s) => format!("{} - {}", self.publication_title, s),
            },
            generated: format!("Generado: {}", self.generated_at.format("%d/%m/%Y %H:%M UTC")),
        };
        let toc_ids = toc::insert_toc(
            &mut merged.doc,
            merged.pages_id,
            &header,
            &lines,
            &merged.page_ids,
        )?;
        let all_pages: Vec<ObjectId> = toc_ids.iter().chain(&merged.page_ids).copied().collect();
        write_outline(&mut merged.doc, merged.catalog_id, &roots, &all_pages)?;

        let info_id = merged.doc.add_object(self.info(grouping, sources, all_pages.len()));
        merged.doc.trailer.set("Info", info_id);

        merged.doc.prune_objects();
        merged.doc.compress();
        let mut bytes = Vec::new();
        merged.doc.save_to(&mut bytes)?;

        Ok(Built {
            bytes,
            page_count: all_pages.len(),
        })
    }

    fn info(&self, grouping: Grouping, sources: &[&Source], page_count: usize) -> Dictionary {
        let title = match grouping {
            Grouping::All => format!("{} - Completo", self.publication_title),
            Grouping::Section(s) => format!("{} - {}", self.publication_title, s),
        };
        let versions = sources
            .iter()
            .map(|s| format!("{}={}", s.key, s.signature.as_deref().unwrap_or("-")))
            .collect::<Vec<_>>()
            .join("; ");

        let mut info = Dictionary::new();
        info.set("Title", text_string(&title));
        info.set("Producer", text_string(PRODUCER));
        info.set("CreationDate", Object::string_literal(pdf_date(self.generated_at)));
        info.set("DocumentCount", Object::Integer(sources.len() as i64));
        info.set("PageCount", Object::Integer(page_count as i64));
        info.set("DocumentVersions", text_string(&versions));
        info
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        write_atomic(path, bytes).map_err(|e| AppError::assembly_io(path, e))?;
        log::info!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Delete earlier artifacts of a grouping that this run did not produce.
    fn remove_stale(&self, keep: &[PathBuf], belongs: impl Fn(&str) -> bool) -> Result<()> {
        let keep: HashSet<&Path> = keep.iter().map(PathBuf::as_path).collect();
        let entries = std::fs::read_dir(&self.output_dir)
            .map_err(|e| AppError::assembly_io(&self.output_dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if belongs(&name) && !keep.contains(path.as_path()) {
                std::fs::remove_file(&path).map_err(|e| AppError::assembly_io(&path, e))?;
                log::info!("Removed stale output {}", path.display());
            }
        }
        Ok(())
    }
}

fn path_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn output(
    grouping: Grouping,
    path: &Path,
    sources: &[&Source],
    built: &Built,
    part_index: Option<usize>,
) -> CombinedOutput {
    CombinedOutput {
        grouping,
        path: path.to_path_buf(),
        documents: sources.iter().map(|s| s.key.clone()).collect(),
        total_page_count: built.page_count,
        total_byte_size: built.bytes.len() as u64,
        part_index,
    }
}
