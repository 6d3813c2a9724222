//! Product image download
//!
//! Every image is fetched, stretched to the configured size and written as
//! PNG. Failures are per image: a broken URL never affects its siblings,
//! including other images of the same product. There are no retries.
//! Cancellation is the exception: it stops the whole download.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use image::ImageFormat;
use image::imageops::FilterType;
use tracing::{error, info, warn};

use crate::domain::{ImageAsset, ImageSource};
use crate::error::ImageError;
use crate::infrastructure::config::ImageConfig;
use crate::infrastructure::http_client::{FetchError, HttpFetch};

/// Downloads in flight at once
const CONCURRENT_DOWNLOADS: usize = 4;

/// An image that could not be stored
#[derive(Debug)]
pub struct ImageFailure {
    pub url: String,
    pub filename: String,
    pub error: ImageError,
}

#[derive(Debug, Default)]
pub struct ImageFetchReport {
    /// Written files, in asset order
    pub written: Vec<PathBuf>,
    pub failed: Vec<ImageFailure>,
    /// Assets without a URL
    pub skipped: usize,
}

pub struct ImageFetcher {
    http: Arc<dyn HttpFetch>,
    width: u32,
    height: u32,
}

impl ImageFetcher {
    pub fn new(http: Arc<dyn HttpFetch>, width: u32, height: u32) -> Self {
        Self {
            http,
            width,
            height,
        }
    }

    pub fn from_config(http: Arc<dyn HttpFetch>, config: &ImageConfig) -> Self {
        Self::new(http, config.width, config.height)
    }

    /// Download `sources`, numbering them from `start_no`.
    pub async fn fetch_all(
        &self,
        sources: &[ImageSource],
        start_no: u32,
        dir: &Path,
    ) -> Result<ImageFetchReport, ImageError> {
        let overflow = || ImageError::NumberOverflow {
            start_no,
            count: sources.len(),
        };
        let mut assets = Vec::new();
        for (offset, source) in sources.iter().enumerate() {
            let no = u32::try_from(offset)
                .ok()
                .and_then(|offset| start_no.checked_add(offset))
                .ok_or_else(overflow)?;
            assets.extend(ImageAsset::for_product(no, source));
        }
        self.fetch_assets(&assets, dir).await
    }

    /// Download explicit assets into `dir`, created only when there is work.
    pub async fn fetch_assets(
        &self,
        assets: &[ImageAsset],
        dir: &Path,
    ) -> Result<ImageFetchReport, ImageError> {
        let mut report = ImageFetchReport::default();
        if assets.is_empty() {
            return Ok(report);
        }

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| ImageError::Write {
                path: dir.to_path_buf(),
                source,
            })?;

        let pending: Vec<&ImageAsset> = assets
            .iter()
            .filter(|asset| {
                if asset.url.trim().is_empty() {
                    warn!("No image URL for {}, skipped", asset.filename);
                    report.skipped += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        let mut results = stream::iter(pending)
            .map(|asset| async move { (asset, self.fetch_one(asset, dir).await) })
            .buffered(CONCURRENT_DOWNLOADS);

        while let Some((asset, result)) = results.next().await {
            match result {
                Ok(path) => report.written.push(path),
                Err(error) if error.is_cancellation() => {
                    info!(
                        "🛑 Image download cancelled after {} images",
                        report.written.len()
                    );
                    return Err(error);
                }
                Err(error) => {
                    error!(
                        "Image {} from {} failed: {}",
                        asset.filename, asset.url, error
                    );
                    report.failed.push(ImageFailure {
                        url: asset.url.clone(),
                        filename: asset.filename.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            "🖼️ {} images written to {} ({} failed, {} without URL)",
            report.written.len(),
            dir.display(),
            report.failed.len(),
            report.skipped
        );
        Ok(report)
    }

    async fn fetch_one(&self, asset: &ImageAsset, dir: &Path) -> Result<PathBuf, ImageError> {
        let url = asset.url.clone();
        let fetched = self.http.get(&url).await.map_err(|e| match e {
            FetchError::Cancelled { url } => ImageError::Cancelled { url },
            FetchError::Request { reason, .. } => ImageError::Transport {
                url: url.clone(),
                reason,
            },
            other => ImageError::Transport {
                url: url.clone(),
                reason: other.to_string(),
            },
        })?;

        if !fetched.is_success() {
            return Err(ImageError::Status {
                url,
                status: fetched.status,
            });
        }

        let (width, height) = (self.width, self.height);
        let worker_url = url.clone();
        let png = tokio::task::spawn_blocking(move || to_png(&worker_url, &fetched.body, width, height))
            .await
            .map_err(|e| ImageError::Worker {
                url,
                reason: e.to_string(),
            })??;

        let path = dir.join(&asset.filename);
        tokio::fs::write(&path, png)
            .await
            .map_err(|source| ImageError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

/// Decode, stretch to exactly `width`x`height`, encode as PNG.
fn to_png(url: &str, bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(|source| ImageError::Decode {
        url: url.to_string(),
        source,
    })?;
    let resized = decoded.resize_exact(width, height, FilterType::Triangle);

    let mut png = Cursor::new(Vec::new());
    resized
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|source| ImageError::Encode {
            url: url.to_string(),
            source,
        })?;
    Ok(png.into_inner())
}

#[cfg(test)]
mod tests {
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::infrastructure::http_client::{HttpClient, HttpClientConfig};
    use crate::testing::{FakeHttp, jpeg_fixture};

    fn fetcher(http: FakeHttp) -> ImageFetcher {
        ImageFetcher::new(Arc::new(http), 40, 30)
    }

    fn names(report: &ImageFetchReport) -> Vec<String> {
        report
            .written
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn failed_sibling_does_not_affect_others() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .with_bytes("https://img.test/1.jpg", jpeg_fixture(10, 10))
            .with_status("https://img.test/2.jpg", 403)
            .with_bytes("https://img.test/3.jpg", jpeg_fixture(10, 20));
        let sources = vec![ImageSource::Many(vec![
            "https://img.test/1.jpg".into(),
            "https://img.test/2.jpg".into(),
            "https://img.test/3.jpg".into(),
        ])];

        let report = fetcher(http)
            .fetch_all(&sources, 5, dir.path())
            .await
            .unwrap();

        assert_eq!(names(&report), ["5_1.png", "5_3.png"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].filename, "5_2.png");
        assert!(matches!(
            report.failed[0].error,
            ImageError::Status { status: 403, .. }
        ));
    }

    #[tokio::test]
    async fn images_are_resized_to_exact_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new().with_bytes("https://img.test/a.jpg", jpeg_fixture(100, 10));
        let sources = vec![ImageSource::Single("https://img.test/a.jpg".into())];

        let report = fetcher(http)
            .fetch_all(&sources, 12, dir.path())
            .await
            .unwrap();

        assert_eq!(names(&report), ["12.png"]);
        let written = image::open(&report.written[0]).unwrap();
        assert_eq!((written.width(), written.height()), (40, 30));
    }

    #[tokio::test]
    async fn undecodable_and_unreachable_images_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .with_page("https://img.test/page.jpg", "<html>not an image</html>")
            .failing("https://img.test/down.jpg");
        let sources = vec![
            ImageSource::Single("https://img.test/page.jpg".into()),
            ImageSource::Single("https://img.test/down.jpg".into()),
        ];

        let report = fetcher(http)
            .fetch_all(&sources, 1, dir.path())
            .await
            .unwrap();

        assert!(report.written.is_empty());
        assert!(matches!(report.failed[0].error, ImageError::Decode { .. }));
        assert!(matches!(report.failed[1].error, ImageError::Transport { .. }));
    }

    #[tokio::test]
    async fn empty_urls_are_skipped_without_a_request() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new();
        let sources = vec![ImageSource::default()];

        let report = fetcher(http.clone())
            .fetch_all(&sources, 1, dir.path())
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_the_download() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new()
            .with_bytes("https://img.test/a.jpg", jpeg_fixture(10, 10))
            .cancelled("https://img.test/b.jpg")
            .with_bytes("https://img.test/c.jpg", jpeg_fixture(10, 10));
        let sources = vec![
            ImageSource::Single("https://img.test/a.jpg".into()),
            ImageSource::Single("https://img.test/b.jpg".into()),
            ImageSource::Single("https://img.test/c.jpg".into()),
        ];

        let err = fetcher(http)
            .fetch_all(&sources, 1, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(err, ImageError::Cancelled { ref url } if url == "https://img.test/b.jpg"));
    }

    #[tokio::test]
    async fn cancelled_client_fails_instead_of_reporting_failures() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let http = HttpClient::with_cancellation(&HttpClientConfig::default(), token).unwrap();
        let sources = vec![
            ImageSource::Single("https://img.test/a.jpg".into()),
            ImageSource::Single("https://img.test/b.jpg".into()),
        ];

        let err = ImageFetcher::new(Arc::new(http), 40, 30)
            .fetch_all(&sources, 1, dir.path())
            .await
            .unwrap_err();

        assert!(err.is_cancellation());
    }

    #[tokio::test]
    async fn numbers_past_the_last_product_number_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let http = FakeHttp::new();
        let sources = vec![
            ImageSource::Single("https://img.test/a.jpg".into()),
            ImageSource::Single("https://img.test/b.jpg".into()),
        ];

        let err = fetcher(http.clone())
            .fetch_all(&sources, u32::MAX, dir.path())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ImageError::NumberOverflow { start_no: u32::MAX, count: 2 }
        ));
        assert!(http.requests().is_empty());
    }

    #[tokio::test]
    async fn no_sources_creates_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("images").join("2024-03-05_09_07");

        let report = fetcher(FakeHttp::new())
            .fetch_all(&[], 1, &target)
            .await
            .unwrap();

        assert!(report.written.is_empty());
        assert!(!target.exists());
    }
}
