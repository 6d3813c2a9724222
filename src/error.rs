//! Error taxonomy for the scraping pipeline
//!
//! Errors are split by the level at which they stop work:
//! - [`ScrapeError`]: per item or per session, raised by browser operations
//! - [`ImageError`]: per image, always recovered by the fetcher
//! - [`ExportError`]: per dataset, fatal to the export call
//! - [`BaselineError`]: per reconciliation run, unreadable or malformed input
//! - [`PipelineError`]: what the orchestrator and the application services return

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("browser session setup failed: {reason}")]
    SessionSetup { reason: String },

    #[error("navigation to {url} did not settle within {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("element '{selector}' not ready within {timeout:?}")]
    ElementTimeout { selector: String, timeout: Duration },

    #[error("element '{selector}' not found (index {index})")]
    ElementMissing { selector: String, index: usize },

    #[error("invalid CSS selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("field '{field}' could not be read from '{raw}'")]
    InvalidField { field: String, raw: String },

    #[error("page request failed: {message}")]
    Browser { message: String },

    #[error("'{operation}' is not supported by this browser driver")]
    Unsupported { operation: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl ScrapeError {
    pub fn browser(message: impl Into<String>) -> Self {
        Self::Browser {
            message: message.into(),
        }
    }

    pub fn session_setup(reason: impl Into<String>) -> Self {
        Self::SessionSetup {
            reason: reason.into(),
        }
    }

    pub fn element_missing(selector: &str, index: usize) -> Self {
        Self::ElementMissing {
            selector: selector.to_string(),
            index,
        }
    }

    pub fn invalid_field(field: &str, raw: &str) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            raw: raw.to_string(),
        }
    }

    /// Whether the item that raised this error can be skipped while the run goes on.
    pub fn is_item_level(&self) -> bool {
        !matches!(self, Self::SessionSetup { .. } | Self::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::NavigationTimeout { .. } | Self::ElementTimeout { .. }
        )
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("image request for {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("image request for {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("image from {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image from {url} could not be encoded as PNG: {source}")]
    Encode {
        url: String,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image worker for {url} stopped: {reason}")]
    Worker { url: String, reason: String },

    #[error("image request for {url} cancelled")]
    Cancelled { url: String },

    #[error("{count} image sources numbered from {start_no} run past the last product number")]
    NumberOverflow { start_no: u32, count: usize },
}

impl ImageError {
    /// Whether the whole download run stopped rather than this one image
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to build the sheet table: {0}")]
    Tabulate(String),

    #[error("failed to encode the workbook: {0}")]
    Encode(#[from] rust_xlsxwriter::XlsxError),

    #[error("failed to create export directory {path:?}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sheet worker stopped: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum BaselineError {
    #[error("failed to open baseline {path:?}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("sheet '{0}' not found in baseline workbook")]
    SheetMissing(String),

    #[error("baseline sheet has no header row")]
    NoHeader,

    #[error("baseline is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("session for site '{site}' could not be opened: {source}")]
    Session {
        site: String,
        #[source]
        source: ScrapeError,
    },

    #[error("entry page for site '{site}' could not be loaded: {source}")]
    Entry {
        site: String,
        #[source]
        source: ScrapeError,
    },

    #[error("link discovery for site '{site}' failed: {source}")]
    Discovery {
        site: String,
        #[source]
        source: ScrapeError,
    },

    #[error("product numbers ran out at {last_no} while collecting site '{site}'")]
    NumbersExhausted { site: String, last_no: u32 },

    #[error("no adapter registered for site '{0}'")]
    UnknownSite(String),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Baseline(#[from] BaselineError),

    #[error("failed to prepare output directory {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled")]
    Cancelled,
}

pub type PipelineResult<T> = Result<T, PipelineError>;
