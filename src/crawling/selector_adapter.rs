//! Site adapter driven by a [`SiteSpec`]

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::crawling::adapter::SiteAdapter;
use crate::crawling::session::ScrapeSession;
use crate::crawling::site_spec::{FieldSpec, ImageSpec, Pagination, PriceSpec, SiteSpec, Transform};
use crate::domain::text::{clean_model, letters_only, parse_price};
use crate::domain::{ImageSource, ProductDetail, ProductLink};
use crate::error::{ScrapeError, ScrapeResult};

pub struct SelectorAdapter {
    spec: SiteSpec,
    base: Url,
}

impl SelectorAdapter {
    pub fn new(spec: SiteSpec) -> ScrapeResult<Self> {
        let base = spec
            .base()
            .map_err(|e| ScrapeError::invalid_field("base_url", &format!("{} ({e})", spec.base_url)))?;
        Ok(Self { spec, base })
    }

    pub fn spec(&self) -> &SiteSpec {
        &self.spec
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        self.base.join(href).ok().map(String::from)
    }

    async fn read_field(&self, session: &ScrapeSession, field: &FieldSpec) -> ScrapeResult<String> {
        let Some(selector) = &field.selector else {
            return Ok(field.fixed.clone().unwrap_or_default());
        };

        let raw = if field.all {
            session
                .locate(selector)
                .all_texts()
                .await?
                .into_iter()
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join(&field.separator)
        } else {
            match session.locate(selector).text().await {
                Ok(text) => text,
                Err(ScrapeError::ElementMissing { .. }) if field.optional => String::new(),
                Err(e) => return Err(e),
            }
        };

        let value = match field.transform {
            Transform::None => raw.trim().to_string(),
            Transform::Model => clean_model(&raw),
            Transform::Letters => letters_only(&raw),
        };

        Ok(match &field.label {
            Some(label) if !value.is_empty() => format!("{label}{value}"),
            _ => value,
        })
    }

    async fn read_prices(&self, session: &ScrapeSession, price: &PriceSpec) -> ScrapeResult<(i64, i64)> {
        let current = read_price(session, &price.current).await?;

        if let Some(struck) = &price.struck {
            if session.locate(struck).is_visible().await? {
                return Ok((read_price(session, struck).await?, current));
            }
        }

        Ok((current, current))
    }

    async fn read_images(&self, session: &ScrapeSession, image: &ImageSpec) -> ScrapeResult<ImageSource> {
        let locator = session.locate(&image.selector);
        let total = locator.count().await?;
        let wanted = if image.multiple {
            image.limit.map_or(total, |limit| total.min(limit))
        } else {
            total.min(1)
        };

        let mut urls = Vec::with_capacity(wanted);
        for nth in 0..wanted {
            let element = session.locate(&image.selector).nth(nth);
            let mut value = element.attribute(&image.attribute).await?;
            if value.as_deref().is_none_or(|v| v.trim().is_empty()) {
                if let Some(fallback) = &image.fallback_attribute {
                    value = element.attribute(fallback).await?;
                }
            }
            if let Some(url) = value.as_deref().and_then(|v| self.resolve(v)) {
                urls.push(url);
            }
        }

        if urls.is_empty() {
            warn!("{}: no image found with '{}'", self.spec.name, image.selector);
            return Ok(ImageSource::default());
        }

        Ok(if image.multiple {
            ImageSource::Many(urls)
        } else {
            ImageSource::Single(urls.swap_remove(0))
        })
    }
}

async fn read_price(session: &ScrapeSession, selector: &str) -> ScrapeResult<i64> {
    let raw = session.locate(selector).text().await?;
    parse_price(&raw).ok_or_else(|| ScrapeError::invalid_field("price", &raw))
}

#[async_trait]
impl SiteAdapter for SelectorAdapter {
    fn site_name(&self) -> &str {
        &self.spec.name
    }

    fn entry_url(&self) -> &str {
        &self.spec.base_url
    }

    fn session_timeout(&self) -> Option<Duration> {
        self.spec.timeout_ms.map(Duration::from_millis)
    }

    async fn discover_links(&self, session: &ScrapeSession) -> ScrapeResult<Vec<ProductLink>> {
        if let Some(consent) = &self.spec.consent_selector {
            match session.dismiss_banner(consent).await {
                Ok(_) => {}
                Err(ScrapeError::Cancelled) => return Err(ScrapeError::Cancelled),
                Err(e) => warn!("{}: consent banner not dismissed: {}", self.spec.name, e),
            }
        }

        let listing = &self.spec.listing;
        let mut links = Vec::new();

        for category in &self.spec.categories {
            let url = self
                .resolve(&category.path)
                .ok_or_else(|| ScrapeError::invalid_field("category path", &category.path))?;
            session.goto_and_wait(&url).await?;

            match &listing.pagination {
                Pagination::None => {}
                Pagination::Scroll { step_px } => {
                    session.scroll_to_bottom(*step_px).await?;
                }
                Pagination::LoadMore { button } => {
                    session.click_load_more(button, &listing.link_selector).await?;
                }
            }

            let hrefs = session
                .locate(&listing.link_selector)
                .all_attributes(&listing.link_attribute)
                .await?;
            let before = links.len();
            links.extend(
                hrefs
                    .iter()
                    .filter_map(|href| self.resolve(href))
                    .map(|url| ProductLink::new(category.name.clone(), url)),
            );
            debug!(
                "{} / {}: {} links",
                self.spec.name,
                category.name,
                links.len() - before
            );
        }

        Ok(links)
    }

    async fn extract_detail(
        &self,
        session: &ScrapeSession,
        link: &ProductLink,
        _attempted_no: u32,
    ) -> ScrapeResult<ProductDetail> {
        session.goto_and_wait(&link.url).await?;

        let detail = &self.spec.detail;
        let brand = self.read_field(session, &detail.brand).await?;
        let name = self.read_field(session, &detail.name).await?;
        let model = self.read_field(session, &detail.model).await?;
        let (list_price, sale_price) = self.read_prices(session, &detail.price).await?;
        let option1 = self.read_field(session, &detail.option1).await?;
        let option2 = self.read_field(session, &detail.option2).await?;
        let image_source = self.read_images(session, &detail.image).await?;

        Ok(ProductDetail {
            site: self.spec.name.clone(),
            category: link.category.clone(),
            brand,
            name,
            model,
            list_price,
            sale_price,
            option1,
            option2,
            link: link.url.clone(),
            image_source,
        })
    }
}
