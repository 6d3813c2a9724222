//! catalog-scraper - retail catalog scraping, reconciliation and spreadsheet export
//!
//! Product data is collected from retailer sites through browser sessions,
//! numbered into a catalog snapshot, exported as a styled spreadsheet with the
//! product images, or reconciled against a previously exported baseline.

pub mod application;
pub mod crawling;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod testing;

pub use application::{AdapterRegistry, CatalogService, ExportPipeline, ImageFetcher, ReconciliationEngine};
pub use crawling::{CatalogOrchestrator, ScrapeSession, SiteAdapter};
pub use error::{ExportError, ImageError, PipelineError, ScrapeError};
