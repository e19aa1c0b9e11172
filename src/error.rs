// src/error.rs

//! Unified error handling for the mirror.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::models::Section;

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Regular expression failed to compile
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// PDF structure could not be read or written
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A navigation branch could not be listed after all retries
    #[error("Crawl branch failed at {path}: {message}")]
    CrawlBranchFailed { path: String, message: String },

    /// A document could not be fetched after all retries
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// A PDF on disk or on the wire is malformed
    #[error("Corrupt document {}: {reason}", path.display())]
    CorruptDocument { path: PathBuf, reason: String },

    /// The text recognition engine cannot be used
    #[error("OCR unavailable: {0}")]
    OcrUnavailable(String),

    /// Output could not be written; no artifact can be produced
    #[error("Assembly I/O failure at {}: {source}", path.display())]
    AssemblyIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A grouping has no usable documents
    #[error("No usable documents for grouping {0}")]
    GroupingEmpty(String),

    /// A network operation exceeded its deadline
    #[error("Timed out after {secs}s: {context}")]
    Timeout { context: String, secs: u64 },

    /// Remote answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },

    /// The run was stopped by the user
    #[error("Operation cancelled")]
    Cancelled,
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a branch failure for a hierarchy path.
    pub fn branch_failed(path: &[String], message: impl fmt::Display) -> Self {
        Self::CrawlBranchFailed {
            path: path.join(" / "),
            message: message.to_string(),
        }
    }

    /// Create a download failure.
    pub fn download_failed(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a corrupt document error.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::CorruptDocument {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an output write failure.
    pub fn assembly_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::AssemblyIo {
            path: path.into(),
            source,
        }
    }

    /// Create an empty-grouping error.
    pub fn grouping_empty(section: Option<Section>) -> Self {
        Self::GroupingEmpty(section.map_or_else(|| "ALL".to_string(), |s| s.to_string()))
    }

    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io(_) | Self::Http(_) | Self::Timeout { .. } => true,
            // Truncated transfers surface as corrupt payloads.
            Self::CorruptDocument { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
