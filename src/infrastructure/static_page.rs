//! Browser driver for server-rendered sites
//!
//! Pages are fetched over plain HTTP and queried with CSS selectors. There is
//! no script execution: clicks are unsupported, scrolling never moves, and a
//! capture writes the HTML source instead of a screenshot. Sites that paginate
//! with "load more" buttons need a real automation backend behind
//! [`BrowserDriver`].

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ScrapeError, ScrapeResult};
use crate::infrastructure::browser::{BrowserDriver, BrowserPage, SessionProfile};
use crate::infrastructure::html_document;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig, HttpFetch};

#[derive(Debug, Default, Clone, Copy)]
pub struct StaticPageDriver;

#[async_trait]
impl BrowserDriver for StaticPageDriver {
    async fn launch(&self, profile: &SessionProfile) -> ScrapeResult<Box<dyn BrowserPage>> {
        let accept_language = profile
            .extra_headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("accept-language"))
            .map_or_else(|| profile.locale.clone(), |(_, value)| value.clone());

        let config = HttpClientConfig {
            user_agent: profile.user_agent.clone(),
            accept_language,
            timeout: profile.timeout,
            extra_headers: profile
                .extra_headers
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case("accept-language"))
                .cloned()
                .collect(),
        };
        let client =
            HttpClient::new(&config).map_err(|e| ScrapeError::session_setup(e.to_string()))?;

        debug!("Static page session ready ({})", profile.user_agent);
        Ok(Box::new(StaticPage::new(client)))
    }
}

/// A page whose document is the last fetched HTML
pub struct StaticPage<F = HttpClient> {
    fetch: F,
    current: Mutex<Option<LoadedDocument>>,
}

#[derive(Debug, Clone)]
struct LoadedDocument {
    url: String,
    html: String,
}

impl<F: HttpFetch> StaticPage<F> {
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            current: Mutex::new(None),
        }
    }

    fn document(&self) -> ScrapeResult<LoadedDocument> {
        self.current
            .lock()
            .map_err(|_| ScrapeError::browser("page state poisoned"))?
            .clone()
            .ok_or_else(|| ScrapeError::browser("no page loaded"))
    }

    /// URL of the loaded document
    pub fn url(&self) -> Option<String> {
        self.current
            .lock()
            .ok()
            .and_then(|doc| doc.as_ref().map(|d| d.url.clone()))
    }
}

#[async_trait]
impl<F: HttpFetch> BrowserPage for StaticPage<F> {
    async fn goto(&self, url: &str) -> ScrapeResult<()> {
        let fetched = self
            .fetch
            .get(url)
            .await
            .map_err(|e| ScrapeError::browser(e.to_string()))?;

        if !fetched.is_success() {
            return Err(ScrapeError::browser(format!(
                "{url} returned HTTP {}",
                fetched.status
            )));
        }

        let html = String::from_utf8_lossy(&fetched.body).into_owned();
        let mut current = self
            .current
            .lock()
            .map_err(|_| ScrapeError::browser("page state poisoned"))?;
        *current = Some(LoadedDocument {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    async fn wait_for_load(&self) -> ScrapeResult<()> {
        self.document().map(|_| ())
    }

    async fn count(&self, selector: &str) -> ScrapeResult<usize> {
        html_document::count(&self.document()?.html, selector)
    }

    async fn text(&self, selector: &str, nth: usize) -> ScrapeResult<String> {
        html_document::text(&self.document()?.html, selector, nth)
    }

    async fn attribute(
        &self,
        selector: &str,
        nth: usize,
        name: &str,
    ) -> ScrapeResult<Option<String>> {
        html_document::attribute(&self.document()?.html, selector, nth, name)
    }

    async fn is_visible(&self, selector: &str, nth: usize) -> ScrapeResult<bool> {
        html_document::is_present(&self.document()?.html, selector, nth)
    }

    async fn click(&self, _selector: &str, _nth: usize) -> ScrapeResult<()> {
        Err(ScrapeError::Unsupported {
            operation: "click".to_string(),
        })
    }

    async fn scroll_into_view(&self, selector: &str, nth: usize) -> ScrapeResult<()> {
        let html = self.document()?.html;
        if html_document::count(&html, selector)? > nth {
            Ok(())
        } else {
            Err(ScrapeError::element_missing(selector, nth))
        }
    }

    async fn scroll_by(&self, _delta: i64) -> ScrapeResult<()> {
        Ok(())
    }

    async fn scroll_extent(&self) -> ScrapeResult<f64> {
        Ok(0.0)
    }

    async fn capture(&self, path: &Path) -> ScrapeResult<()> {
        let html = self.document()?.html;
        tokio::fs::write(path, html)
            .await
            .map_err(|e| ScrapeError::browser(format!("capture to {path:?} failed: {e}")))
    }

    fn capture_extension(&self) -> &'static str {
        "html"
    }

    async fn close(&self) -> ScrapeResult<()> {
        if let Ok(mut current) = self.current.lock() {
            current.take();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHttp;

    fn page() -> StaticPage<FakeHttp> {
        let http = FakeHttp::new()
            .with_page(
                "https://shop.test/list",
                r#"<ul><li><a class="p" href="/p/1">One</a></li><li><a class="p" href="/p/2">Two</a></li></ul>"#,
            )
            .with_status("https://shop.test/gone", 404);
        StaticPage::new(http)
    }

    #[tokio::test]
    async fn queries_the_loaded_document() {
        let page = page();
        page.goto("https://shop.test/list").await.unwrap();
        page.wait_for_load().await.unwrap();

        assert_eq!(page.count("a.p").await.unwrap(), 2);
        assert_eq!(page.text("a.p", 1).await.unwrap(), "Two");
        assert_eq!(
            page.attribute("a.p", 0, "href").await.unwrap().as_deref(),
            Some("/p/1")
        );
        assert_eq!(page.url().as_deref(), Some("https://shop.test/list"));
    }

    #[tokio::test]
    async fn error_status_fails_navigation() {
        let page = page();
        let err = page.goto("https://shop.test/gone").await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn queries_before_navigation_fail() {
        let page = page();
        assert!(page.count("a").await.is_err());
    }

    #[tokio::test]
    async fn click_is_unsupported() {
        let page = page();
        page.goto("https://shop.test/list").await.unwrap();
        assert!(matches!(
            page.click("a.p", 0).await,
            Err(ScrapeError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn capture_writes_html() {
        let page = page();
        page.goto("https://shop.test/list").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.html");
        page.capture(&path).await.unwrap();
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("class=\"p\""));
    }
}
