//! Test doubles for the browser, HTTP, spreadsheet and site adapter seams
//!
//! Used by the unit tests in this crate and by the integration tests under
//! `tests/`. Fakes are cheap to clone and share their recorded state, so a
//! test can hand one clone to the code under test and assert on another.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::crawling::session::ScrapeSession;
use crate::crawling::adapter::SiteAdapter;
use crate::domain::{ImageSource, ProductDetail, ProductLink};
use crate::error::{ExportError, ScrapeError, ScrapeResult};
use crate::infrastructure::browser::{BrowserDriver, BrowserPage, SessionProfile};
use crate::infrastructure::html_document;
use crate::infrastructure::http_client::{FetchError, FetchedBody, HttpFetch};
use crate::infrastructure::spreadsheet::{SheetEncoder, StyledSheet};

pub use crate::crawling::clock::FakeClock;

#[derive(Default)]
struct BrowserState {
    pages: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    launch_error: Option<String>,
    launches: AtomicUsize,
    closed: AtomicUsize,
    clicks: Mutex<Vec<String>>,
}

/// In-memory browser serving canned HTML per URL
///
/// Unknown URLs load as an empty document. Captures write the current HTML.
#[derive(Clone, Default)]
pub struct FakeBrowser {
    state: Arc<BrowserState>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.state_mut().pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Make navigation to `url` take `delay` before it completes.
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.state_mut().delays.insert(url.to_string(), delay);
        self
    }

    pub fn failing_launch(mut self, reason: &str) -> Self {
        self.state_mut().launch_error = Some(reason.to_string());
        self
    }

    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// Pages closed so far
    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Selectors clicked so far, in order
    pub fn clicks(&self) -> Vec<String> {
        self.state
            .clicks
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    // Builders run before any clone is shared.
    fn state_mut(&mut self) -> &mut BrowserState {
        Arc::get_mut(&mut self.state).expect("configure FakeBrowser before cloning it")
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn launch(&self, _profile: &SessionProfile) -> ScrapeResult<Box<dyn BrowserPage>> {
        if let Some(reason) = &self.state.launch_error {
            return Err(ScrapeError::browser(reason.clone()));
        }
        self.state.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            state: Arc::clone(&self.state),
            current: Mutex::new(None),
        }))
    }
}

pub struct FakePage {
    state: Arc<BrowserState>,
    current: Mutex<Option<String>>,
}

impl FakePage {
    fn html(&self) -> ScrapeResult<String> {
        self.current
            .lock()
            .map_err(|_| ScrapeError::browser("page state poisoned"))?
            .clone()
            .ok_or_else(|| ScrapeError::browser("no page loaded"))
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> ScrapeResult<()> {
        if let Some(delay) = self.state.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        let html = self.state.pages.get(url).cloned().unwrap_or_default();
        if let Ok(mut current) = self.current.lock() {
            *current = Some(html);
        }
        Ok(())
    }

    async fn wait_for_load(&self) -> ScrapeResult<()> {
        self.html().map(|_| ())
    }

    async fn count(&self, selector: &str) -> ScrapeResult<usize> {
        html_document::count(&self.html()?, selector)
    }

    async fn text(&self, selector: &str, nth: usize) -> ScrapeResult<String> {
        html_document::text(&self.html()?, selector, nth)
    }

    async fn attribute(
        &self,
        selector: &str,
        nth: usize,
        name: &str,
    ) -> ScrapeResult<Option<String>> {
        html_document::attribute(&self.html()?, selector, nth, name)
    }

    async fn is_visible(&self, selector: &str, nth: usize) -> ScrapeResult<bool> {
        html_document::is_present(&self.html()?, selector, nth)
    }

    async fn click(&self, selector: &str, nth: usize) -> ScrapeResult<()> {
        if html_document::count(&self.html()?, selector)? <= nth {
            return Err(ScrapeError::element_missing(selector, nth));
        }
        if let Ok(mut clicks) = self.state.clicks.lock() {
            clicks.push(selector.to_string());
        }
        Ok(())
    }

    async fn scroll_into_view(&self, selector: &str, nth: usize) -> ScrapeResult<()> {
        if html_document::count(&self.html()?, selector)? > nth {
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
        let html = self.html()?;
        tokio::fs::write(path, html)
            .await
            .map_err(|e| ScrapeError::browser(e.to_string()))
    }

    fn capture_extension(&self) -> &'static str {
        "html"
    }

    async fn close(&self) -> ScrapeResult<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Adapter with canned links that synthesizes a detail per link
///
/// Entry URL is `https://<lowercased name>.test/`. Details can be replaced
/// per URL, and URLs can be made to fail or to cancel the run.
#[derive(Clone)]
pub struct ScriptedAdapter {
    name: String,
    entry_url: String,
    links: Vec<ProductLink>,
    details: HashMap<String, ProductDetail>,
    failing: HashSet<String>,
    discovery_error: Option<ScrapeError>,
    cancel_on: Option<(String, CancellationToken)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entry_url: format!("https://{}.test/", name.to_lowercase()),
            links: Vec::new(),
            details: HashMap::new(),
            failing: HashSet::new(),
            discovery_error: None,
            cancel_on: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Links returned by discovery, all in `category`.
    pub fn with_links(mut self, category: &str, urls: &[&str]) -> Self {
        self.links
            .extend(urls.iter().map(|url| ProductLink::new(category, *url)));
        self
    }

    pub fn with_detail(mut self, detail: ProductDetail) -> Self {
        self.details.insert(detail.link.clone(), detail);
        self
    }

    pub fn fail_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn failing_discovery(mut self, error: ScrapeError) -> Self {
        self.discovery_error = Some(error);
        self
    }

    /// Cancel `token` when `url` is extracted.
    pub fn cancel_on(mut self, url: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((url.to_string(), token));
        self
    }

    /// URLs passed to extraction so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn synthesize(&self, link: &ProductLink) -> ProductDetail {
        ProductDetail {
            site: self.name.clone(),
            category: link.category.clone(),
            brand: self.name.to_uppercase(),
            name: format!("Item {}", link.url.rsplit('/').next().unwrap_or_default()),
            model: String::new(),
            list_price: 10_000,
            sale_price: 10_000,
            option1: String::new(),
            option2: String::new(),
            link: link.url.clone(),
            image_source: ImageSource::Single(format!("{}.jpg", link.url)),
        }
    }
}

#[async_trait]
impl SiteAdapter for ScriptedAdapter {
    fn site_name(&self) -> &str {
        &self.name
    }

    fn entry_url(&self) -> &str {
        &self.entry_url
    }

    async fn discover_links(&self, _session: &ScrapeSession) -> ScrapeResult<Vec<ProductLink>> {
        match &self.discovery_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.links.clone()),
        }
    }

    async fn extract_detail(
        &self,
        _session: &ScrapeSession,
        link: &ProductLink,
        _attempted_no: u32,
    ) -> ScrapeResult<ProductDetail> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(link.url.clone());
        }
        if let Some((url, token)) = &self.cancel_on {
            if *url == link.url {
                token.cancel();
                return Err(ScrapeError::Cancelled);
            }
        }
        if self.failing.contains(&link.url) {
            return Err(ScrapeError::element_missing("h1", 0));
        }

        let mut detail = self
            .details
            .get(&link.url)
            .cloned()
            .unwrap_or_else(|| self.synthesize(link));
        detail.category.clone_from(&link.category);
        Ok(detail)
    }
}

/// Canned HTTP responses per URL; unknown URLs answer 404
#[derive(Clone, Default)]
pub struct FakeHttp {
    responses: HashMap<String, FetchedBody>,
    failing: HashSet<String>,
    cancelled: HashSet<String>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.with_bytes(url, html.as_bytes().to_vec())
    }

    pub fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses
            .insert(url.to_string(), FetchedBody { status: 200, body });
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(
            url.to_string(),
            FetchedBody {
                status,
                body: Vec::new(),
            },
        );
        self
    }

    /// Make requests to `url` fail at the transport level.
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Make requests to `url` behave as if the run was cancelled in flight.
    pub fn cancelled(mut self, url: &str) -> Self {
        self.cancelled.insert(url.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn get(&self, url: &str) -> Result<FetchedBody, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        if self.cancelled.contains(url) {
            return Err(FetchError::Cancelled {
                url: url.to_string(),
            });
        }
        if self.failing.contains(url) {
            return Err(FetchError::Request {
                url: url.to_string(),
                reason: "connection reset".to_string(),
            });
        }
        Ok(self.responses.get(url).cloned().unwrap_or(FetchedBody {
            status: 404,
            body: Vec::new(),
        }))
    }
}

/// Encoder whose every workbook is rejected
pub struct FailingEncoder;

impl SheetEncoder for FailingEncoder {
    fn encode(&self, _sheet: &StyledSheet) -> Result<Vec<u8>, ExportError> {
        Err(ExportError::Encode(
            rust_xlsxwriter::XlsxError::ParameterError("workbook rejected".to_string()),
        ))
    }
}

/// A solid-color JPEG of the given size, for image download tests.
pub fn jpeg_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([200, 40, 90]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Jpeg)
        .expect("encoding an in-memory JPEG cannot fail");
    bytes.into_inner()
}
