//! # Catalog Service
//!
//! The three workflows the command line exposes:
//! - `scrape`: collect every selected site, then export and download images concurrently
//! - `reconcile`: revisit the links of a baseline sheet and export the updated baseline
//! - `refetch_images`: download the images listed in a previously exported sheet

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::application::export::ExportPipeline;
use crate::application::image_fetcher::{ImageFetchReport, ImageFetcher};
use crate::application::reconciliation::{ReconcileReport, ReconciliationEngine};
use crate::application::registry::AdapterRegistry;
use crate::crawling::clock::{Clock, RunStamp};
use crate::crawling::orchestrator::{CatalogOrchestrator, CatalogRun};
use crate::domain::baseline::{cell_price, cell_text};
use crate::domain::{BaselineDataset, ImageAsset, ImageSource};
use crate::error::{BaselineError, ImageError, PipelineError, PipelineResult};
use crate::infrastructure::config::OutputConfig;
use crate::infrastructure::spreadsheet::read_table;

const PRODUCT_NO_COLUMN: &str = "product_no";
const IMAGE_SOURCE_COLUMN: &str = "image_source";

/// Result of a fresh scrape
#[derive(Debug)]
pub struct ScrapeSummary {
    pub run: CatalogRun,
    pub export_path: PathBuf,
    pub images: ImageFetchReport,
}

/// Result of a reconciliation run
#[derive(Debug)]
pub struct ReconcileSummary {
    pub report: ReconcileReport,
    pub export_path: PathBuf,
    /// Baseline sites with no registered adapter
    pub skipped_sites: Vec<String>,
    /// Links that could not be re-read
    pub failed_links: usize,
}

pub struct CatalogService {
    orchestrator: CatalogOrchestrator,
    registry: AdapterRegistry,
    exporter: ExportPipeline,
    images: ImageFetcher,
    engine: ReconciliationEngine,
    output: OutputConfig,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(
        orchestrator: CatalogOrchestrator,
        registry: AdapterRegistry,
        exporter: ExportPipeline,
        images: ImageFetcher,
        engine: ReconciliationEngine,
        output: OutputConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orchestrator,
            registry,
            exporter,
            images,
            engine,
            output,
            clock,
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Scrape `sites` (all registered sites when empty) numbering from `start_no`.
    pub async fn scrape(&self, sites: &[String], start_no: u32) -> PipelineResult<ScrapeSummary> {
        let adapters = self.registry.select(sites)?;
        let run = self.orchestrator.collect(&adapters, start_no).await?;

        let image_dir = self
            .output
            .images_dir(&RunStamp::from_clock(self.clock.as_ref()).minute());
        let (export, images) = tokio::join!(
            self.exporter.export_snapshot(&run.snapshot),
            self.images
                .fetch_all(&run.image_sources, run.image_start_no(), &image_dir),
        );
        let images = images.map_err(output_error)?;
        let export_path = export?;

        info!(
            "✅ Scrape finished: {} products, {} images, sheet {}",
            run.snapshot.len(),
            images.written.len(),
            export_path.display()
        );
        Ok(ScrapeSummary {
            run,
            export_path,
            images,
        })
    }

    /// Re-read every baseline link and export the reconciled baseline.
    pub async fn reconcile(
        &self,
        baseline_path: &Path,
        sheet: Option<&str>,
    ) -> PipelineResult<ReconcileSummary> {
        let mut baseline = load_table(baseline_path, sheet).await?;
        baseline.require_columns(self.engine.columns())?;
        self.engine.prepare(&mut baseline);

        let mut summary = ReconcileSummary {
            report: ReconcileReport::default(),
            export_path: PathBuf::new(),
            skipped_sites: Vec::new(),
            failed_links: 0,
        };

        for group in baseline.site_groups(self.engine.columns()) {
            let Some(adapter) = self.registry.get(&group.site) else {
                warn!(
                    "No adapter for site '{}', {} baseline rows left unchanged",
                    group.site,
                    group.links.len()
                );
                summary.skipped_sites.push(group.site);
                continue;
            };

            let revisit = self
                .orchestrator
                .revisit(adapter.as_ref(), &group.links)
                .await?;
            summary.failed_links += revisit.skipped.len();
            summary
                .report
                .merge(self.engine.reconcile(&mut baseline, &revisit.details));
        }

        summary.export_path = self.exporter.export_baseline(&baseline).await?;
        Ok(summary)
    }

    /// Download the images of an exported sheet into a fresh refetch directory.
    pub async fn refetch_images(&self, sheet_path: &Path) -> PipelineResult<ImageFetchReport> {
        let table = load_table(sheet_path, None).await?;
        let assets = image_assets(&table)?;
        info!(
            "Refetching {} images listed in {}",
            assets.len(),
            sheet_path.display()
        );

        let dir = self
            .output
            .refetch_dir(&RunStamp::from_clock(self.clock.as_ref()).minute());
        self.images
            .fetch_assets(&assets, &dir)
            .await
            .map_err(output_error)
    }
}

/// Read a sheet off the async runtime.
async fn load_table(path: &Path, sheet: Option<&str>) -> PipelineResult<BaselineDataset> {
    let owned_path = path.to_path_buf();
    let sheet = sheet.map(str::to_string);
    let table = tokio::task::spawn_blocking(move || read_table(&owned_path, sheet.as_deref()))
        .await
        .map_err(|e| BaselineError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })??;
    info!("Loaded {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Download targets of every row that has a product number.
fn image_assets(table: &BaselineDataset) -> PipelineResult<Vec<ImageAsset>> {
    let missing: Vec<String> = [PRODUCT_NO_COLUMN, IMAGE_SOURCE_COLUMN]
        .into_iter()
        .filter(|name| !table.columns().iter().any(|c| c == name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(BaselineError::MissingColumns(missing).into());
    }

    let mut assets = Vec::new();
    for (index, row) in table.rows().iter().enumerate() {
        let number = row
            .get(PRODUCT_NO_COLUMN)
            .and_then(cell_price)
            .and_then(|n| u32::try_from(n).ok());
        let Some(number) = number else {
            warn!("Row {} has no usable product number, skipped", index + 2);
            continue;
        };
        let cell = row.get(IMAGE_SOURCE_COLUMN).map(cell_text).unwrap_or_default();
        assets.extend(ImageAsset::for_product(number, &ImageSource::from_cell(&cell)));
    }
    Ok(assets)
}

fn output_error(error: ImageError) -> PipelineError {
    match error {
        ImageError::Cancelled { .. } => PipelineError::Cancelled,
        ImageError::Write { path, source } => PipelineError::Output { path, source },
        other => PipelineError::Output {
            path: PathBuf::new(),
            source: std::io::Error::other(other.to_string()),
        },
    }
}
