//! Infrastructure layer for browsers, HTTP, spreadsheets, configuration and logging
//!
//! Everything that touches the outside world lives here behind small traits,
//! so the crawling and application layers can be driven by fakes in tests.

pub mod browser;
pub mod config;
pub mod html_document;
pub mod http_client;
pub mod logging;
pub mod spreadsheet;
pub mod static_page;

pub use browser::{BrowserDriver, BrowserPage, SessionProfile, Viewport};
pub use config::{AppConfig, ConfigError, OutputConfig, SessionConfig, SheetStyle};
pub use http_client::{FetchError, FetchedBody, HttpClient, HttpClientConfig, HttpFetch};
pub use logging::{LogGuard, init_logging};
pub use spreadsheet::{CellStyle, CellValue, SheetEncoder, StyledSheet, XlsxEncoder, read_table};
pub use static_page::StaticPageDriver;
