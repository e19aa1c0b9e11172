//! AIP Mirror CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use aip_mirror::{
    error::{AppError, Result},
    logging,
    models::{Config, Section},
    pipeline,
    services::{HtmlNavigator, OcrAugmenter},
    storage::{DocumentStore, LocalStorage},
    utils::http,
};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

/// AIP Mirror - Argentine AIP downloader and assembler
#[derive(Parser, Debug)]
#[command(
    name = "aip-mirror",
    version,
    about = "Mirrors the Argentine AIP and assembles it into navigable PDFs"
)]
struct Cli {
    /// Path to storage directory containing config.toml
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover documents and rebuild the catalog
    Crawl,

    /// Download new and changed documents into the cache
    Download,

    /// Add a searchable text layer to scanned documents
    Ocr,

    /// Write the combined PDFs from the cache
    Assemble,

    /// Run full pipeline: Crawl → Download → OCR → Assemble
    Pipeline {
        /// Skip OCR even if enabled in config
        #[arg(long)]
        no_ocr: bool,

        /// Only these sections (e.g. --section gen --section ad)
        #[arg(long = "section", value_parser = parse_section)]
        sections: Vec<Section>,
    },

    /// Re-apply the filter settings to the catalog without crawling
    Refilter,

    /// Validate configuration and cached files
    Validate,

    /// Show catalog and output info
    Info,
}

fn parse_section(s: &str) -> std::result::Result<Section, String> {
    s.parse().map_err(|e: AppError| e.to_string())
}

/// Resolve relative cache/output paths against the storage directory.
fn resolve_paths(config: &mut Config, storage_dir: &std::path::Path) {
    for path in [
        &mut config.paths.cache_dir,
        &mut config.paths.output_dir,
        &mut config.paths.run_log,
    ] {
        if path.is_relative() {
            *path = storage_dir.join(&*path);
        }
    }
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; finishing in-flight work");
            token.cancel();
        }
    });
    cancel
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let (mut config, load_error) = Config::load_or_default(&config_path);
    resolve_paths(&mut config, &cli.storage_dir);

    logging::init(cli.verbose, &config.paths.run_log)?;
    log::info!("AIP Mirror starting...");
    match load_error {
        None => log::info!("Loaded configuration from {}", config_path.display()),
        Some(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            config_path.display(),
            e
        ),
    }

    let store = LocalStorage::new(&config.paths.cache_dir);
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Command::Crawl => {
            config.validate()?;
            let client = http::create_async_client(&config.crawler)?;
            let navigator = HtmlNavigator::new(client, &config.site)?;
            let report = pipeline::run_crawl(&config, &navigator, &store, &cancel).await?;
            for branch in report.failed_branch_labels() {
                log::warn!("Crawl branch failed: {}", branch);
            }
            log::info!("Crawl complete!");
        }

        Command::Download => {
            config.validate()?;
            let client = http::create_async_client(&config.crawler)?;
            let navigator = HtmlNavigator::new(client, &config.site)?;
            let report = pipeline::run_download(&config, &navigator, &store, &cancel).await?;
            log::info!(
                "Download complete! {} downloaded, {} unchanged, {} failed",
                report.downloaded,
                report.unchanged,
                report.failed
            );
        }

        Command::Ocr => {
            let augmenter = Arc::new(OcrAugmenter::tesseract(&config.ocr));
            let summary = pipeline::run_ocr(&config, &store, augmenter, &cancel).await?;
            log::info!(
                "OCR complete! {} documents augmented, {} pages recognized",
                summary.augmented,
                summary.pages_recognized
            );
        }

        Command::Assemble => {
            let summary = pipeline::run_assemble(&config, &store).await?;
            summary.log();
            if summary.outputs.is_empty() {
                return Err(AppError::validation("No output was written"));
            }
        }

        Command::Pipeline { no_ocr, sections } => {
            if no_ocr {
                config.ocr.enabled = false;
            }
            if !sections.is_empty() {
                config.filter.sections = sections;
            }
            config.validate()?;

            let client = http::create_async_client(&config.crawler)?;
            let navigator = HtmlNavigator::new(client, &config.site)?;
            let augmenter = Arc::new(OcrAugmenter::tesseract(&config.ocr));
            pipeline::run_pipeline(&config, &navigator, &store, augmenter, &cancel).await?;
            log::info!("Pipeline complete!");
        }

        Command::Refilter => {
            pipeline::run_refilter(&config, &store).await?;
        }

        Command::Validate => {
            let report = pipeline::run_validate(&config, &store).await?;
            if report.is_clean() {
                log::info!("All validations passed!");
            } else {
                log::warn!("Cache has problems; run 'download' to repair");
            }
        }

        Command::Info => {
            log::info!("Site: {}", config.site.base_url);
            log::info!("Storage directory: {}", cli.storage_dir.display());
            log::info!("Cache directory: {}", config.paths.cache_dir.display());
            log::info!("Output directory: {}", config.paths.output_dir.display());

            let catalog = store.load_catalog().await?;
            match catalog.updated_at {
                Some(updated) => log::info!("Catalog updated: {}", updated),
                None => log::info!("No catalog found yet."),
            }
            for section in Section::ALL {
                let records: Vec<_> = catalog.section(section).collect();
                let available = records.iter().filter(|r| r.status.is_available()).count();
                let included = records.iter().filter(|r| r.included).count();
                log::info!(
                    "    {}: {} documents, {} included, {} cached",
                    section,
                    records.len(),
                    included,
                    available
                );
            }

            let metadata = LocalStorage::new(&config.paths.output_dir)
                .read_json::<aip_mirror::models::Metadata>(pipeline::METADATA_FILE)
                .await?;
            match metadata {
                Some(metadata) => {
                    log::info!("Last assembly: {}", metadata.generated_at);
                    for output in metadata.outputs {
                        log::info!(
                            "    {} ({} pages, {} bytes)",
                            output.path.display(),
                            output.total_page_count,
                            output.total_byte_size
                        );
                    }
                }
                None => log::info!("No assembly found yet."),
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
