//! Declarative description of a retailer site
//!
//! A [`SiteSpec`] lists the categories to walk, how listing pages paginate,
//! and where each product field lives on a detail page. It is read from the
//! `sites` section of the configuration and driven by the selector adapter.

use scraper::Selector;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub name: String,
    pub base_url: String,
    /// Per-operation timeout override in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Consent banner button clicked once after the entry page loads
    #[serde(default)]
    pub consent_selector: Option<String>,
    pub categories: Vec<CategorySpec>,
    pub listing: ListingSpec,
    pub detail: DetailSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    /// Listing path, resolved against the base URL
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSpec {
    pub link_selector: String,
    #[serde(default = "default_link_attribute")]
    pub link_attribute: String,
    #[serde(default)]
    pub pagination: Pagination,
}

fn default_link_attribute() -> String {
    "href".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pagination {
    #[default]
    None,
    /// Infinite scroll, `step_px` pixels per round
    Scroll {
        #[serde(default = "default_scroll_step")]
        step_px: i64,
    },
    /// Click `button` until it disappears or the listing stops growing
    LoadMore { button: String },
}

fn default_scroll_step() -> i64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailSpec {
    pub brand: FieldSpec,
    pub name: FieldSpec,
    #[serde(default)]
    pub model: FieldSpec,
    #[serde(default)]
    pub option1: FieldSpec,
    #[serde(default)]
    pub option2: FieldSpec,
    pub price: PriceSpec,
    pub image: ImageSpec,
}

/// Where a text field comes from
///
/// With a `selector`, the first match is read (or every match joined by
/// `separator` when `all` is set). Without one, `fixed` is used as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSpec {
    pub selector: Option<String>,
    pub fixed: Option<String>,
    pub all: bool,
    pub separator: String,
    /// Prefix added to a non-empty value, e.g. `"Size: "`
    pub label: Option<String>,
    /// A missing element yields an empty value instead of an error
    pub optional: bool,
    pub transform: Transform,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            selector: None,
            fixed: None,
            all: false,
            separator: ", ".to_string(),
            label: None,
            optional: false,
            transform: Transform::None,
        }
    }
}

impl FieldSpec {
    pub fn selector(selector: impl Into<String>) -> Self {
        Self {
            selector: Some(selector.into()),
            ..Self::default()
        }
    }

    pub fn fixed(value: impl Into<String>) -> Self {
        Self {
            fixed: Some(value.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transform {
    #[default]
    None,
    /// Strip Hangul and colons, as on "모델명: 1W2B0K30" labels
    Model,
    /// Keep letters only
    Letters,
}

/// Price selectors
///
/// When `struck` is visible the product is discounted: the struck-through
/// price is the list price and `current` the sale price. Otherwise both
/// prices are read from `current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSpec {
    pub current: String,
    #[serde(default)]
    pub struck: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSpec {
    pub selector: String,
    #[serde(default = "default_image_attribute")]
    pub attribute: String,
    /// Read when `attribute` is absent, e.g. `data-src` on lazy images
    #[serde(default)]
    pub fallback_attribute: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

fn default_image_attribute() -> String {
    "src".to_string()
}

impl SiteSpec {
    pub fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    /// Check URLs and selectors before any session is opened.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("site name must not be empty".to_string());
        }

        let base = self
            .base()
            .map_err(|e| format!("site '{}': invalid base_url: {e}", self.name))?;

        if self.timeout_ms == Some(0) {
            return Err(format!("site '{}': timeout_ms must be greater than 0", self.name));
        }

        if self.categories.is_empty() {
            return Err(format!("site '{}': no categories configured", self.name));
        }

        for category in &self.categories {
            base.join(&category.path).map_err(|e| {
                format!("site '{}': category '{}': {e}", self.name, category.name)
            })?;
        }

        for selector in self.selectors() {
            Selector::parse(selector)
                .map_err(|e| format!("site '{}': invalid selector '{selector}': {e}", self.name))?;
        }

        Ok(())
    }

    fn selectors(&self) -> Vec<&str> {
        let detail = &self.detail;
        let mut selectors = vec![
            self.listing.link_selector.as_str(),
            detail.price.current.as_str(),
            detail.image.selector.as_str(),
        ];
        selectors.extend(self.consent_selector.as_deref());
        selectors.extend(detail.price.struck.as_deref());
        if let Pagination::LoadMore { button } = &self.listing.pagination {
            selectors.push(button);
        }
        for field in [
            &detail.brand,
            &detail.name,
            &detail.model,
            &detail.option1,
            &detail.option2,
        ] {
            selectors.extend(field.selector.as_deref());
        }
        selectors
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn boutique() -> SiteSpec {
        SiteSpec {
            name: "Boutique".into(),
            base_url: "https://boutique.test".into(),
            timeout_ms: Some(30_000),
            consent_selector: Some("#accept-cookies".into()),
            categories: vec![
                CategorySpec {
                    name: "Shoulder bags".into(),
                    path: "/women/bags/shoulder".into(),
                },
                CategorySpec {
                    name: "Clutches".into(),
                    path: "/women/bags/clutch".into(),
                },
            ],
            listing: ListingSpec {
                link_selector: "ul.grid a.tile".into(),
                link_attribute: "href".into(),
                pagination: Pagination::None,
            },
            detail: DetailSpec {
                brand: FieldSpec::fixed("BOUTIQUE"),
                name: FieldSpec::selector("h1.name"),
                model: FieldSpec {
                    transform: Transform::Model,
                    optional: true,
                    ..FieldSpec::selector("p.code")
                },
                option1: FieldSpec::selector("span.color"),
                option2: FieldSpec {
                    all: true,
                    label: Some("Size: ".into()),
                    optional: true,
                    ..FieldSpec::selector("ul.sizes li")
                },
                price: PriceSpec {
                    current: "p.price .now".into(),
                    struck: Some("p.price .was".into()),
                },
                image: ImageSpec {
                    selector: "div.gallery img".into(),
                    attribute: "src".into(),
                    fallback_attribute: Some("data-src".into()),
                    multiple: true,
                    limit: Some(3),
                },
            },
        }
    }

    #[test]
    fn sample_site_is_valid() {
        assert_eq!(boutique().validate(), Ok(()));
    }

    #[test]
    fn bad_selector_is_rejected() {
        let mut spec = boutique();
        spec.detail.name = FieldSpec::selector("h1[[");
        assert!(spec.validate().unwrap_err().contains("h1[["));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut spec = boutique();
        spec.timeout_ms = Some(0);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn parses_from_toml() {
        let spec: SiteSpec = toml_site(
            r#"
            name = "Boutique"
            base_url = "https://boutique.test"
            categories = [{ name = "Bags", path = "/bags" }]

            [listing]
            link_selector = "a.tile"
            pagination = { kind = "load_more", button = "button.more" }

            [detail]
            brand = { fixed = "BOUTIQUE" }
            name = { selector = "h1" }
            price = { current = ".price" }
            image = { selector = "img.main", fallback_attribute = "data-src" }
            "#,
        );

        assert_eq!(spec.listing.link_attribute, "href");
        assert_eq!(
            spec.listing.pagination,
            Pagination::LoadMore {
                button: "button.more".into()
            }
        );
        assert_eq!(spec.detail.model, FieldSpec::default());
        assert_eq!(spec.detail.image.attribute, "src");
        assert!(!spec.detail.image.multiple);
        assert!(spec.validate().is_ok());
    }

    fn toml_site(toml: &str) -> SiteSpec {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }
}
