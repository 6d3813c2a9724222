use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use catalog_scraper::application::{
    AdapterRegistry, CatalogService, ExportPipeline, ImageFetcher, ReconciliationEngine,
};
use catalog_scraper::crawling::{CatalogOrchestrator, Clock, TokioClock};
use catalog_scraper::error::PipelineError;
use catalog_scraper::infrastructure::logging::{init_logging, log_system_info};
use catalog_scraper::infrastructure::{AppConfig, HttpClient, StaticPageDriver, XlsxEncoder};

#[derive(Parser, Debug)]
#[command(name = "catalog-scraper", version, about = "Scrape retailer catalogs into styled spreadsheets")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape sites and export a fresh catalog with its images
    Scrape {
        /// Site to scrape, repeatable; all configured sites when omitted
        #[arg(long = "site")]
        sites: Vec<String>,

        /// Number given to the first product, at least 1
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        start_no: u32,
    },
    /// Re-read the links of a baseline sheet and export the updated baseline
    Reconcile {
        #[arg(long)]
        baseline: PathBuf,

        /// Sheet to read; the first sheet when omitted
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Download the images listed in an exported sheet again
    Images {
        #[arg(long)]
        sheet: PathBuf,
    },
    /// List configured sites
    Sites,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    if let Command::Sites = cli.command {
        for site in &config.sites {
            println!("{}\t{}\t{} categories", site.name, site.base_url, site.categories.len());
        }
        return Ok(());
    }

    let _log_guard = init_logging(&config.logging, &config.output.logs_dir())
        .context("failed to initialize logging")?;
    log_system_info();

    let cancellation_token = CancellationToken::new();
    spawn_ctrl_c_handler(cancellation_token.clone());

    let service = build_service(&config, cancellation_token)?;

    let outcome = match cli.command {
        Command::Scrape { sites, start_no } => service.scrape(&sites, start_no).await.map(|summary| {
            println!(
                "{} products numbered {}..{} ({} skipped)",
                summary.run.snapshot.len(),
                summary.run.start_no,
                summary.run.next_no,
                summary.run.skipped.len()
            );
            println!("sheet: {}", summary.export_path.display());
            println!(
                "images: {} written, {} failed",
                summary.images.written.len(),
                summary.images.failed.len()
            );
            println!("next start number: {}", summary.run.next_no);
        }),
        Command::Reconcile { baseline, sheet } => service
            .reconcile(&baseline, sheet.as_deref())
            .await
            .map(|summary| {
                let report = summary.report;
                println!(
                    "{} rows matched, {} price changes, {} name changes, {} option changes",
                    report.matched, report.prices_changed, report.names_changed, report.options_changed
                );
                if !summary.skipped_sites.is_empty() {
                    println!("sites without adapter: {}", summary.skipped_sites.join(", "));
                }
                println!("sheet: {}", summary.export_path.display());
            }),
        Command::Images { sheet } => service.refetch_images(&sheet).await.map(|report| {
            println!(
                "images: {} written, {} failed, {} without URL",
                report.written.len(),
                report.failed.len(),
                report.skipped
            );
        }),
        Command::Sites => Ok(()),
    };

    match outcome {
        Err(PipelineError::Cancelled) => {
            warn!("Run cancelled, nothing exported");
            Ok(())
        }
        Err(e) => {
            error!("Run failed: {}", e);
            Err(e.into())
        }
        Ok(()) => Ok(()),
    }
}

fn build_service(config: &AppConfig, cancellation_token: CancellationToken) -> Result<CatalogService> {
    let clock: Arc<dyn Clock> = Arc::new(TokioClock);

    let registry = AdapterRegistry::from_specs(&config.sites).context("invalid site configuration")?;
    if registry.is_empty() {
        warn!("No sites configured");
    }

    let http = HttpClient::with_cancellation(&config.images.http_config(), cancellation_token.clone())
        .context("failed to build the image HTTP client")?;

    let orchestrator = CatalogOrchestrator::new(
        Arc::new(StaticPageDriver),
        config.session.clone(),
        config.output.clone(),
        Arc::clone(&clock),
        cancellation_token,
    );
    let exporter = ExportPipeline::new(
        Arc::new(XlsxEncoder),
        config.output.clone(),
        config.export.clone(),
        Arc::clone(&clock),
    );

    Ok(CatalogService::new(
        orchestrator,
        registry,
        exporter,
        ImageFetcher::from_config(Arc::new(http), &config.images),
        ReconciliationEngine::new(config.baseline.clone()),
        config.output.clone(),
        clock,
    ))
}

fn spawn_ctrl_c_handler(cancellation_token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Ctrl-C received, cancelling the run");
            cancellation_token.cancel();
        }
    });
}
