//! Site adapter contract
//!
//! One adapter per retailer: it discovers product links and extracts one
//! product's fields. [`SiteAdapter::extract`] is the item boundary, where any
//! extraction error becomes a logged [`ExtractionOutcome::Skipped`] instead of
//! ending the run.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use crate::crawling::session::ScrapeSession;
use crate::domain::{ProductDetail, ProductLink};
use crate::error::{ScrapeError, ScrapeResult};

/// Context of an item that could not be extracted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFailure {
    pub site: String,
    pub category: String,
    pub url: String,
    /// Product number the item would have received
    pub attempted_no: u32,
    pub error: ScrapeError,
    pub screenshot: Option<PathBuf>,
}

impl ExtractionFailure {
    pub fn is_cancellation(&self) -> bool {
        self.error == ScrapeError::Cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Extracted(ProductDetail),
    Skipped(ExtractionFailure),
}

#[async_trait]
pub trait SiteAdapter: Send + Sync {
    fn site_name(&self) -> &str;

    /// Page opened before discovery or a link revisit
    fn entry_url(&self) -> &str;

    /// Per-operation timeout for this site, overriding the session default
    fn session_timeout(&self) -> Option<Duration> {
        None
    }

    /// Product links in listing order, across all categories.
    async fn discover_links(&self, session: &ScrapeSession) -> ScrapeResult<Vec<ProductLink>>;

    /// Read one product page.
    async fn extract_detail(
        &self,
        session: &ScrapeSession,
        link: &ProductLink,
        attempted_no: u32,
    ) -> ScrapeResult<ProductDetail>;

    /// Extract one item, turning any failure into a logged skip.
    async fn extract(
        &self,
        session: &ScrapeSession,
        link: &ProductLink,
        attempted_no: u32,
    ) -> ExtractionOutcome {
        let error = match self.extract_detail(session, link, attempted_no).await {
            Ok(detail) => return ExtractionOutcome::Extracted(detail),
            Err(error) => error,
        };

        let screenshot = if error == ScrapeError::Cancelled {
            info!(
                "Extraction cancelled: site '{}', category '{}', product no {}, link '{}'",
                self.site_name(),
                link.category,
                attempted_no,
                link.url
            );
            None
        } else {
            error!(
                "Extraction failed: '{}', site '{}', category '{}', product no {}, link '{}'",
                error,
                self.site_name(),
                link.category,
                attempted_no,
                link.url
            );
            session.screenshot_on_error(&link.category).await
        };

        ExtractionOutcome::Skipped(ExtractionFailure {
            site: self.site_name().to_string(),
            category: link.category.clone(),
            url: link.url.clone(),
            attempted_no,
            error,
            screenshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::crawling::clock::FakeClock;
    use crate::crawling::session::SessionSettings;
    use crate::infrastructure::config::SessionConfig;
    use crate::testing::{FakeBrowser, ScriptedAdapter};

    async fn session(browser: &FakeBrowser, dir: &std::path::Path) -> ScrapeSession {
        ScrapeSession::open(
            "Scripted",
            browser,
            &SessionConfig::default().profile(None),
            SessionSettings {
                pacing: Duration::from_millis(100),
                max_pump_rounds: 5,
                screenshot_dir: dir.to_path_buf(),
            },
            Arc::new(FakeClock::fixed()),
            CancellationToken::new(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn failure_becomes_a_skip_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let browser = FakeBrowser::new().with_page("https://scripted.test/", "<p>home</p>");
        let mut session = session(&browser, dir.path()).await;
        session.goto_and_wait("https://scripted.test/").await.unwrap();

        let adapter = ScriptedAdapter::new("Scripted").fail_on("https://scripted.test/p/2");
        let link = ProductLink::new("Bags", "https://scripted.test/p/2");

        match adapter.extract(&session, &link, 7).await {
            ExtractionOutcome::Skipped(failure) => {
                assert_eq!(failure.site, "Scripted");
                assert_eq!(failure.category, "Bags");
                assert_eq!(failure.attempted_no, 7);
                assert!(failure.error.is_item_level());
                assert!(failure.screenshot.is_some());
            }
            other => panic!("expected a skip, got {other:?}"),
        }
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn success_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let browser = FakeBrowser::new();
        let mut session = session(&browser, dir.path()).await;

        let adapter = ScriptedAdapter::new("Scripted");
        let link = ProductLink::new("Bags", "https://scripted.test/p/1");

        match adapter.extract(&session, &link, 1).await {
            ExtractionOutcome::Extracted(detail) => {
                assert_eq!(detail.link, "https://scripted.test/p/1");
                assert_eq!(detail.category, "Bags");
            }
            other => panic!("expected a record, got {other:?}"),
        }
        session.close().await.unwrap();
    }
}
