//! Browser session lifecycle
//!
//! A [`ScrapeSession`] owns one page for one adapter run. Every navigation and
//! element operation runs under the session timeout and aborts as soon as the
//! run is cancelled. The page is closed by [`ScrapeSession::close`] or, on any
//! path that skips it, when the session is dropped.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crawling::clock::{Clock, RunStamp};
use crate::crawling::pacing::{PumpReport, paced_sleep, pump_until_quiescent};
use crate::error::{ScrapeError, ScrapeResult};
use crate::infrastructure::browser::{BrowserDriver, BrowserPage, SessionProfile};

/// Per-session knobs that do not belong to the browser profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Delay between rounds of scroll and load-more loops
    pub pacing: Duration,
    pub max_pump_rounds: u32,
    /// Directory diagnostic captures are written to
    pub screenshot_dir: PathBuf,
}

enum Operation<'a> {
    Navigation(&'a str),
    Element(&'a str),
}

impl Operation<'_> {
    fn timed_out(&self, timeout: Duration) -> ScrapeError {
        match self {
            Self::Navigation(url) => ScrapeError::NavigationTimeout {
                url: (*url).to_string(),
                timeout,
            },
            Self::Element(selector) => ScrapeError::ElementTimeout {
                selector: (*selector).to_string(),
                timeout,
            },
        }
    }
}

pub struct ScrapeSession {
    site: String,
    page: Option<Box<dyn BrowserPage>>,
    timeout: Duration,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl ScrapeSession {
    /// Launch a browser page for `site`. Failure here is fatal to the adapter run.
    pub async fn open(
        site: &str,
        driver: &dyn BrowserDriver,
        profile: &SessionProfile,
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
    ) -> ScrapeResult<Self> {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        let launch = tokio::time::timeout(profile.timeout, driver.launch(profile));
        let page = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ScrapeError::Cancelled),
            launched = launch => match launched {
                Ok(Ok(page)) => page,
                Ok(Err(ScrapeError::SessionSetup { reason })) => {
                    return Err(ScrapeError::SessionSetup { reason });
                }
                Ok(Err(e)) => return Err(ScrapeError::session_setup(e.to_string())),
                Err(_) => {
                    return Err(ScrapeError::session_setup(format!(
                        "browser did not start within {:?}",
                        profile.timeout
                    )));
                }
            },
        };

        info!("🌐 Session opened for {}", site);
        Ok(Self {
            site: site.to_string(),
            page: Some(page),
            timeout: profile.timeout,
            settings,
            clock,
            cancel,
        })
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_open(&self) -> bool {
        self.page.is_some()
    }

    fn page(&self) -> ScrapeResult<&dyn BrowserPage> {
        self.page
            .as_deref()
            .ok_or_else(|| ScrapeError::browser("session already closed"))
    }

    async fn timed<T, F>(&self, operation: Operation<'_>, future: F) -> ScrapeResult<T>
    where
        F: Future<Output = ScrapeResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(ScrapeError::Cancelled),
            result = tokio::time::timeout(self.timeout, future) => {
                result.unwrap_or_else(|_| Err(operation.timed_out(self.timeout)))
            }
        }
    }

    /// Navigate and wait for the document to finish loading.
    pub async fn goto_and_wait(&self, url: &str) -> ScrapeResult<()> {
        let page = self.page()?;
        debug!("Navigating to {}", url);
        self.timed(Operation::Navigation(url), async {
            page.goto(url).await?;
            page.wait_for_load().await
        })
        .await
    }

    pub fn locate(&self, selector: &str) -> Locator<'_> {
        Locator {
            session: self,
            selector: selector.to_string(),
            nth: 0,
        }
    }

    pub async fn scroll_by(&self, delta: i64) -> ScrapeResult<()> {
        let page = self.page()?;
        self.timed(Operation::Element("window"), page.scroll_by(delta))
            .await
    }

    pub async fn scroll_extent(&self) -> ScrapeResult<f64> {
        let page = self.page()?;
        self.timed(Operation::Element("window"), page.scroll_extent())
            .await
    }

    /// Pacing delay that ends early with [`ScrapeError::Cancelled`].
    pub async fn pause(&self, duration: Duration) -> ScrapeResult<()> {
        paced_sleep(self.clock.as_ref(), &self.cancel, duration).await
    }

    /// Click a consent banner button if one is showing.
    pub async fn dismiss_banner(&self, selector: &str) -> ScrapeResult<bool> {
        self.pause(self.settings.pacing).await?;

        let button = self.locate(selector);
        if !button.is_visible().await? {
            debug!("No banner matching '{}' on {}", selector, self.site);
            return Ok(false);
        }

        button.scroll_into_view().await?;
        button.click().await?;
        info!("Dismissed banner '{}' on {}", selector, self.site);
        Ok(true)
    }

    /// Scroll down by `step` pixels per round until the scroll extent stops growing.
    pub async fn scroll_to_bottom(&self, step: i64) -> ScrapeResult<PumpReport> {
        let report = pump_until_quiescent(
            self.clock.as_ref(),
            &self.cancel,
            self.settings.pacing,
            self.settings.max_pump_rounds,
            || self.scroll_extent(),
            || async move {
                self.scroll_by(step).await?;
                Ok(true)
            },
        )
        .await?;

        debug!("Scrolled {} rounds on {} ({:?})", report.rounds, self.site, report.stop);
        Ok(report)
    }

    /// Click `button` while it is visible, until the number of `items` stops changing.
    pub async fn click_load_more(&self, button: &str, items: &str) -> ScrapeResult<PumpReport> {
        let report = pump_until_quiescent(
            self.clock.as_ref(),
            &self.cancel,
            self.settings.pacing,
            self.settings.max_pump_rounds,
            || async move { self.locate(items).count().await },
            || async move {
                let more = self.locate(button);
                if !more.is_visible().await? {
                    return Ok(false);
                }
                more.scroll_into_view().await?;
                more.click().await?;
                Ok(true)
            },
        )
        .await?;

        debug!(
            "Load-more stopped after {} rounds on {} ({:?})",
            report.rounds, self.site, report.stop
        );
        Ok(report)
    }

    /// Best-effort diagnostic capture into the screenshot directory.
    ///
    /// Never fails; a capture error is logged and `None` returned.
    pub async fn screenshot_on_error(&self, category: &str) -> Option<PathBuf> {
        let page = self.page().ok()?;
        let dir = &self.settings.screenshot_dir;

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            error!("Screenshot directory {:?} could not be created: {}", dir, e);
            return None;
        }

        let stamp = RunStamp::from_clock(self.clock.as_ref()).second();
        let path = dir.join(format!(
            "{}_{}.{}",
            file_component(category),
            stamp,
            page.capture_extension()
        ));

        match tokio::time::timeout(self.timeout, page.capture(&path)).await {
            Ok(Ok(())) => {
                debug!("Captured {:?}", path);
                Some(path)
            }
            Ok(Err(e)) => {
                error!("Screenshot for {} / {} failed: {}", self.site, category, e);
                None
            }
            Err(_) => {
                error!("Screenshot for {} / {} timed out", self.site, category);
                None
            }
        }
    }

    /// Close the page. Safe to call more than once.
    pub async fn close(&mut self) -> ScrapeResult<()> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.timeout, page.close()).await {
            Ok(result) => {
                info!("🔒 Session closed for {}", self.site);
                result
            }
            Err(_) => Err(ScrapeError::browser(format!(
                "closing the {} session timed out",
                self.site
            ))),
        }
    }
}

impl Drop for ScrapeSession {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };

        warn!("Session for {} dropped while open, closing in background", self.site);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let site = std::mem::take(&mut self.site);
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        error!("Background close for {} failed: {}", site, e);
                    }
                });
            }
            Err(_) => error!("No runtime to close the {} session on", self.site),
        }
    }
}

/// Replace characters that are not allowed in file names.
fn file_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.trim().is_empty() {
        "page".to_string()
    } else {
        cleaned
    }
}

/// The `nth` match of a selector within a session
pub struct Locator<'s> {
    session: &'s ScrapeSession,
    selector: String,
    nth: usize,
}

impl Locator<'_> {
    #[must_use]
    pub fn nth(mut self, nth: usize) -> Self {
        self.nth = nth;
        self
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub async fn count(&self) -> ScrapeResult<usize> {
        let page = self.session.page()?;
        self.session
            .timed(Operation::Element(&self.selector), page.count(&self.selector))
            .await
    }

    pub async fn text(&self) -> ScrapeResult<String> {
        let page = self.session.page()?;
        self.session
            .timed(
                Operation::Element(&self.selector),
                page.text(&self.selector, self.nth),
            )
            .await
    }

    pub async fn attribute(&self, name: &str) -> ScrapeResult<Option<String>> {
        let page = self.session.page()?;
        self.session
            .timed(
                Operation::Element(&self.selector),
                page.attribute(&self.selector, self.nth, name),
            )
            .await
    }

    pub async fn is_visible(&self) -> ScrapeResult<bool> {
        let page = self.session.page()?;
        self.session
            .timed(
                Operation::Element(&self.selector),
                page.is_visible(&self.selector, self.nth),
            )
            .await
    }

    pub async fn click(&self) -> ScrapeResult<()> {
        let page = self.session.page()?;
        self.session
            .timed(
                Operation::Element(&self.selector),
                page.click(&self.selector, self.nth),
            )
            .await
    }

    pub async fn scroll_into_view(&self) -> ScrapeResult<()> {
        let page = self.session.page()?;
        self.session
            .timed(
                Operation::Element(&self.selector),
                page.scroll_into_view(&self.selector, self.nth),
            )
            .await
    }

    /// Text of every match, in document order.
    pub async fn all_texts(&self) -> ScrapeResult<Vec<String>> {
        let total = self.count().await?;
        let mut texts = Vec::with_capacity(total);
        for nth in 0..total {
            texts.push(self.clone_at(nth).text().await?);
        }
        Ok(texts)
    }

    /// `name` attribute of every match that has it, in document order.
    pub async fn all_attributes(&self, name: &str) -> ScrapeResult<Vec<String>> {
        let total = self.count().await?;
        let mut values = Vec::with_capacity(total);
        for nth in 0..total {
            if let Some(value) = self.clone_at(nth).attribute(name).await? {
                values.push(value);
            }
        }
        Ok(values)
    }

    fn clone_at(&self, nth: usize) -> Self {
        Self {
            session: self.session,
            selector: self.selector.clone(),
            nth,
        }
    }
}
