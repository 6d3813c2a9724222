//! Domain module - catalog records, baselines and text normalization
//!
//! Everything in here is free of I/O: the types the scraping, reconciliation
//! and export stages pass between each other.

pub mod baseline;
pub mod product;
pub mod text;

pub use baseline::{BaselineColumns, BaselineDataset, BaselineRow, SiteGroup, side_columns};
pub use product::{
    CatalogSnapshot, IMAGE_SOURCE_SEPARATOR, ImageAsset, ImageSource, PRODUCT_COLUMNS,
    ProductDetail, ProductLink, ProductRecord,
};
