//! # Catalog Orchestrator
//!
//! Runs site adapters one after another, one browser session at a time,
//! and numbers every successfully extracted product. Failed items consume
//! no number, so the numbers of one run are contiguous from the start number.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crawling::adapter::{ExtractionFailure, ExtractionOutcome, SiteAdapter};
use crate::crawling::clock::Clock;
use crate::crawling::session::{ScrapeSession, SessionSettings};
use crate::domain::{CatalogSnapshot, ImageSource, ProductDetail, ProductLink, ProductRecord};
use crate::error::{PipelineError, PipelineResult, ScrapeError};
use crate::infrastructure::browser::BrowserDriver;
use crate::infrastructure::config::{OutputConfig, SessionConfig};

/// Everything one collection pass produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRun {
    pub snapshot: CatalogSnapshot,
    /// Image sources in snapshot order
    pub image_sources: Vec<ImageSource>,
    /// Number the run started counting from
    pub start_no: u32,
    /// Number the next run should start from
    pub next_no: u32,
    pub skipped: Vec<ExtractionFailure>,
}

impl CatalogRun {
    /// Number of the first image: the first record's, or the start number when empty.
    pub fn image_start_no(&self) -> u32 {
        self.snapshot.first_product_no().unwrap_or(self.start_no)
    }
}

/// Details re-read from known links, in link order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revisit {
    pub details: Vec<ProductDetail>,
    pub skipped: Vec<ExtractionFailure>,
}

pub struct CatalogOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    session: SessionConfig,
    output: OutputConfig,
    clock: Arc<dyn Clock>,
    cancellation_token: CancellationToken,
}

impl CatalogOrchestrator {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        session: SessionConfig,
        output: OutputConfig,
        clock: Arc<dyn Clock>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            driver,
            session,
            output,
            clock,
            cancellation_token,
        }
    }

    /// Discover and extract every adapter's products, strictly in adapter order.
    pub async fn collect(
        &self,
        adapters: &[Arc<dyn SiteAdapter>],
        start_no: u32,
    ) -> PipelineResult<CatalogRun> {
        let mut run = CatalogRun {
            start_no,
            next_no: start_no,
            ..CatalogRun::default()
        };

        for adapter in adapters {
            self.ensure_running()?;
            let first_no = run.next_no;

            let mut session = self.open_session(adapter.as_ref()).await?;
            let result = self.collect_site(&session, adapter.as_ref(), &mut run).await;
            close_session(&mut session).await;
            result?;

            info!(
                "✅ {}: {} products numbered {}..{}",
                adapter.site_name(),
                run.next_no - first_no,
                first_no,
                run.next_no
            );
        }

        info!(
            "🏁 Collected {} products from {} sites ({} skipped)",
            run.snapshot.len(),
            adapters.len(),
            run.skipped.len()
        );
        Ok(run)
    }

    /// Re-extract already known links without discovery.
    pub async fn revisit(
        &self,
        adapter: &dyn SiteAdapter,
        links: &[ProductLink],
    ) -> PipelineResult<Revisit> {
        self.ensure_running()?;

        let mut session = self.open_session(adapter).await?;
        let result = self.revisit_site(&session, adapter, links).await;
        close_session(&mut session).await;
        let revisit = result?;

        info!(
            "🔁 {}: {} of {} links re-read",
            adapter.site_name(),
            revisit.details.len(),
            links.len()
        );
        Ok(revisit)
    }

    async fn collect_site(
        &self,
        session: &ScrapeSession,
        adapter: &dyn SiteAdapter,
        run: &mut CatalogRun,
    ) -> PipelineResult<()> {
        let site = adapter.site_name();
        self.open_entry(session, adapter).await?;

        let links = adapter
            .discover_links(session)
            .await
            .map_err(|source| match source {
                ScrapeError::Cancelled => PipelineError::Cancelled,
                source => PipelineError::Discovery {
                    site: site.to_string(),
                    source,
                },
            })?;
        info!("🔍 {}: {} product links discovered", site, links.len());

        for (index, link) in links.iter().enumerate() {
            self.ensure_running()?;
            debug!("{} [{}/{}] {}", site, index + 1, links.len(), link.url);

            match adapter.extract(session, link, run.next_no).await {
                ExtractionOutcome::Extracted(detail) => {
                    let following = run.next_no.checked_add(1).ok_or_else(|| {
                        PipelineError::NumbersExhausted {
                            site: site.to_string(),
                            last_no: run.next_no,
                        }
                    })?;
                    run.image_sources.push(detail.image_source.clone());
                    run.snapshot.push(ProductRecord::new(run.next_no, detail));
                    run.next_no = following;
                }
                ExtractionOutcome::Skipped(failure) if failure.is_cancellation() => {
                    return Err(PipelineError::Cancelled);
                }
                ExtractionOutcome::Skipped(failure) => run.skipped.push(failure),
            }
        }

        Ok(())
    }

    async fn revisit_site(
        &self,
        session: &ScrapeSession,
        adapter: &dyn SiteAdapter,
        links: &[ProductLink],
    ) -> PipelineResult<Revisit> {
        self.open_entry(session, adapter).await?;

        let mut revisit = Revisit::default();
        for (index, link) in links.iter().enumerate() {
            self.ensure_running()?;
            let position = u32::try_from(index + 1).unwrap_or(u32::MAX);

            match adapter.extract(session, link, position).await {
                ExtractionOutcome::Extracted(detail) => revisit.details.push(detail),
                ExtractionOutcome::Skipped(failure) if failure.is_cancellation() => {
                    return Err(PipelineError::Cancelled);
                }
                ExtractionOutcome::Skipped(failure) => revisit.skipped.push(failure),
            }
        }

        Ok(revisit)
    }

    async fn open_session(&self, adapter: &dyn SiteAdapter) -> PipelineResult<ScrapeSession> {
        let site = adapter.site_name();
        let profile = self.session.profile(adapter.session_timeout());
        let settings = SessionSettings {
            pacing: self.session.pacing(),
            max_pump_rounds: self.session.max_pump_rounds,
            screenshot_dir: self.output.screenshots_dir(site),
        };

        ScrapeSession::open(
            site,
            self.driver.as_ref(),
            &profile,
            settings,
            Arc::clone(&self.clock),
            self.cancellation_token.clone(),
        )
        .await
        .map_err(|source| match source {
            ScrapeError::Cancelled => PipelineError::Cancelled,
            source => PipelineError::Session {
                site: site.to_string(),
                source,
            },
        })
    }

    async fn open_entry(
        &self,
        session: &ScrapeSession,
        adapter: &dyn SiteAdapter,
    ) -> PipelineResult<()> {
        session
            .goto_and_wait(adapter.entry_url())
            .await
            .map_err(|source| match source {
                ScrapeError::Cancelled => PipelineError::Cancelled,
                source => PipelineError::Entry {
                    site: adapter.site_name().to_string(),
                    source,
                },
            })
    }

    fn ensure_running(&self) -> PipelineResult<()> {
        if self.cancellation_token.is_cancelled() {
            info!("🛑 Run cancelled");
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

async fn close_session(session: &mut ScrapeSession) {
    if let Err(e) = session.close().await {
        warn!("Closing the {} session failed: {}", session.site(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::clock::FakeClock;
    use crate::testing::{FakeBrowser, ScriptedAdapter};

    fn orchestrator(browser: &FakeBrowser, cancel: CancellationToken) -> CatalogOrchestrator {
        CatalogOrchestrator::new(
            Arc::new(browser.clone()),
            SessionConfig::default(),
            OutputConfig {
                root: std::env::temp_dir().join("catalog-scraper-orchestrator-tests"),
                ..OutputConfig::default()
            },
            Arc::new(FakeClock::fixed()),
            cancel,
        )
    }

    #[tokio::test]
    async fn empty_adapter_leaves_counter_unchanged() {
        let browser = FakeBrowser::new();
        let adapters: Vec<Arc<dyn SiteAdapter>> = vec![Arc::new(ScriptedAdapter::new("Empty"))];

        let run = orchestrator(&browser, CancellationToken::new())
            .collect(&adapters, 40)
            .await
            .unwrap();

        assert!(run.snapshot.is_empty());
        assert_eq!(run.next_no, 40);
        assert_eq!(run.image_start_no(), 40);
        assert_eq!(browser.launches(), 1);
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn running_out_of_numbers_fails_and_closes_the_session() {
        let browser = FakeBrowser::new();
        let adapters: Vec<Arc<dyn SiteAdapter>> = vec![Arc::new(
            ScriptedAdapter::new("Shop")
                .with_links("Bags", &["https://shop.test/p/1", "https://shop.test/p/2"]),
        )];

        let err = orchestrator(&browser, CancellationToken::new())
            .collect(&adapters, u32::MAX - 1)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::NumbersExhausted { ref site, last_no } if site == "Shop" && last_no == u32::MAX
        ));
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn discovery_failure_still_closes_the_session() {
        let browser = FakeBrowser::new();
        let adapters: Vec<Arc<dyn SiteAdapter>> = vec![Arc::new(
            ScriptedAdapter::new("Broken").failing_discovery(ScrapeError::element_missing("ul.grid", 0)),
        )];

        let err = orchestrator(&browser, CancellationToken::new())
            .collect(&adapters, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Discovery { site, .. } if site == "Broken"));
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn revisit_keeps_link_order() {
        let browser = FakeBrowser::new();
        let adapter = ScriptedAdapter::new("Shop").fail_on("https://shop.test/p/2");
        let links = vec![
            ProductLink::new("Bags", "https://shop.test/p/3"),
            ProductLink::new("Bags", "https://shop.test/p/2"),
            ProductLink::new("Shoes", "https://shop.test/p/1"),
        ];

        let revisit = orchestrator(&browser, CancellationToken::new())
            .revisit(&adapter, &links)
            .await
            .unwrap();

        let urls: Vec<_> = revisit.details.iter().map(|d| d.link.as_str()).collect();
        assert_eq!(urls, ["https://shop.test/p/3", "https://shop.test/p/1"]);
        assert_eq!(revisit.skipped.len(), 1);
        assert_eq!(browser.closed(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_launch() {
        let browser = FakeBrowser::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let adapters: Vec<Arc<dyn SiteAdapter>> = vec![Arc::new(ScriptedAdapter::new("Shop"))];

        let err = orchestrator(&browser, cancel).collect(&adapters, 1).await.unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(browser.launches(), 0);
    }
}
