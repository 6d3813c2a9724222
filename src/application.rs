//! Application layer
//!
//! Workflows built on the crawling layer: reconciliation against a baseline,
//! spreadsheet export, image download, and the service the binary drives.

pub mod catalog_service;
pub mod export;
pub mod image_fetcher;
pub mod reconciliation;
pub mod registry;

pub use catalog_service::{CatalogService, ReconcileSummary, ScrapeSummary};
pub use export::ExportPipeline;
pub use image_fetcher::{ImageFetchReport, ImageFetcher};
pub use reconciliation::{ReconcileReport, ReconciliationEngine};
pub use registry::AdapterRegistry;
