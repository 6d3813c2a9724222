//! Browser automation capability
//!
//! The pipeline only talks to pages through these traits. [`ScrapeSession`]
//! adds timeouts, cancellation and teardown on top, so implementations can
//! stay thin wrappers over whatever automation backend is in use.
//!
//! [`ScrapeSession`]: crate::crawling::session::ScrapeSession

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScrapeResult;

/// How a session presents itself to the site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProfile {
    pub user_agent: String,
    pub locale: String,
    pub timezone: String,
    pub viewport: Viewport,
    pub headless: bool,
    /// Extra request headers sent with every navigation
    pub extra_headers: Vec<(String, String)>,
    /// Script evaluated before any page script, hiding automation markers
    pub init_script: String,
    /// Default per-operation timeout handed to the backend
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// Start a browser context configured by `profile` and open one page in it.
    async fn launch(&self, profile: &SessionProfile) -> ScrapeResult<Box<dyn BrowserPage>>;
}

/// One open page. Element operations address the `nth` match of a CSS selector.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> ScrapeResult<()>;

    /// Resolve once the current document has finished loading.
    async fn wait_for_load(&self) -> ScrapeResult<()>;

    async fn count(&self, selector: &str) -> ScrapeResult<usize>;

    async fn text(&self, selector: &str, nth: usize) -> ScrapeResult<String>;

    async fn attribute(&self, selector: &str, nth: usize, name: &str)
    -> ScrapeResult<Option<String>>;

    async fn is_visible(&self, selector: &str, nth: usize) -> ScrapeResult<bool>;

    async fn click(&self, selector: &str, nth: usize) -> ScrapeResult<()>;

    async fn scroll_into_view(&self, selector: &str, nth: usize) -> ScrapeResult<()>;

    /// Scroll the viewport vertically by `delta` pixels.
    async fn scroll_by(&self, delta: i64) -> ScrapeResult<()>;

    /// Current vertical scroll position plus viewport height.
    async fn scroll_extent(&self) -> ScrapeResult<f64>;

    /// Write a diagnostic capture of the current page to `path`.
    async fn capture(&self, path: &Path) -> ScrapeResult<()>;

    /// File extension of what [`BrowserPage::capture`] writes.
    fn capture_extension(&self) -> &'static str {
        "png"
    }

    async fn close(&self) -> ScrapeResult<()>;
}
