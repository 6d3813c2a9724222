use serde::{Deserialize, Serialize};

/// Separator used when several image URLs share one spreadsheet cell.
pub const IMAGE_SOURCE_SEPARATOR: &str = ";\n";

/// Column headers of an exported catalog, in export order.
pub const PRODUCT_COLUMNS: &[&str] = &[
    "product_no",
    "site",
    "category",
    "brand",
    "name",
    "model",
    "list_price",
    "sale_price",
    "option1",
    "option2",
    "link",
    "image_source",
];

/// A product page discovered on a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLink {
    pub category: String,
    pub url: String,
}

impl ProductLink {
    pub fn new(category: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            url: url.into(),
        }
    }
}

/// One or several product image URLs, in page order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    Single(String),
    Many(Vec<String>),
}

impl ImageSource {
    /// Parse a spreadsheet cell, splitting multi-image cells on [`IMAGE_SOURCE_SEPARATOR`].
    pub fn from_cell(cell: &str) -> Self {
        let parts: Vec<String> = cell
            .split(IMAGE_SOURCE_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();

        match parts.len() {
            0 => Self::Single(String::new()),
            1 => Self::Single(parts.into_iter().next().unwrap_or_default()),
            _ => Self::Many(parts),
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        match self {
            Self::Single(url) => vec![url.as_str()],
            Self::Many(urls) => urls.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

impl Default for ImageSource {
    fn default() -> Self {
        Self::Single(String::new())
    }
}

/// Fields extracted from a product detail page, before numbering
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductDetail {
    pub site: String,
    pub category: String,
    pub brand: String,
    pub name: String,
    pub model: String,
    pub list_price: i64,
    pub sale_price: i64,
    pub option1: String,
    pub option2: String,
    pub link: String,
    pub image_source: ImageSource,
}

/// A numbered catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub product_no: u32,
    #[serde(flatten)]
    pub detail: ProductDetail,
}

impl ProductRecord {
    pub fn new(product_no: u32, detail: ProductDetail) -> Self {
        Self { product_no, detail }
    }

    pub fn link(&self) -> &str {
        &self.detail.link
    }

    pub fn image_source(&self) -> &ImageSource {
        &self.detail.image_source
    }
}

/// Records of one orchestrator run, in adapter order then discovery order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    records: Vec<ProductRecord>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: ProductRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ProductRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first_product_no(&self) -> Option<u32> {
        self.records.first().map(|record| record.product_no)
    }

    pub fn product_numbers(&self) -> Vec<u32> {
        self.records.iter().map(|record| record.product_no).collect()
    }

    /// Records as JSON objects, ready for tabulation.
    pub fn to_rows(&self) -> Result<Vec<serde_json::Value>, serde_json::Error> {
        self.records.iter().map(serde_json::to_value).collect()
    }
}

/// An image download target: the source URL and the file it is written to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    pub url: String,
    pub filename: String,
}

impl ImageAsset {
    /// Expand one product's image source into its download targets.
    ///
    /// Single images become `{no}.png`, multi-image products `{no}_{k}.png` with `k` from 1.
    pub fn for_product(product_no: u32, source: &ImageSource) -> Vec<Self> {
        match source {
            ImageSource::Single(url) => vec![Self {
                url: url.clone(),
                filename: format!("{product_no}.png"),
            }],
            ImageSource::Many(urls) => urls
                .iter()
                .enumerate()
                .map(|(i, url)| Self {
                    url: url.clone(),
                    filename: format!("{product_no}_{}.png", i + 1),
                })
                .collect(),
        }
    }
}
