//! Configuration infrastructure
//!
//! Settings are layered with the `config` crate:
//! 1. Built-in defaults (see [`defaults`])
//! 2. An optional TOML/JSON file, by default `<config_dir>/catalog-scraper/config.toml`
//! 3. Environment variables prefixed `CATALOG_SCRAPER_`, nested keys split on `__`
//!    (e.g. `CATALOG_SCRAPER_SESSION__TIMEOUT_MS=30000`)
//!
//! One [`AppConfig`] is built per process and handed to the services that need it.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crawling::site_spec::SiteSpec;
use crate::domain::BaselineColumns;
use crate::infrastructure::browser::{SessionProfile, Viewport};
use crate::infrastructure::http_client::HttpClientConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    FileLoad {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub output: OutputConfig,
    pub session: SessionConfig,
    pub export: ExportConfig,
    pub images: ImageConfig,
    pub logging: LoggingConfig,
    /// Column names read from a baseline sheet
    pub baseline: BaselineColumns,
    /// Sites scraped by the data-driven selector adapter
    pub sites: Vec<SiteSpec>,
}

/// Where run artifacts are written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub root: PathBuf,
    pub excel_dirname: String,
    pub images_dirname: String,
    pub refetch_dirname: String,
    pub screenshots_dirname: String,
    pub logs_dirname: String,
}

impl OutputConfig {
    /// `<root>/<excel>/<dataset>`
    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.root.join(&self.excel_dirname).join(dataset)
    }

    /// `<root>/<images>/<stamp>`
    pub fn images_dir(&self, stamp: &str) -> PathBuf {
        self.root.join(&self.images_dirname).join(stamp)
    }

    /// `<root>/<images-refetch>/<stamp>`
    pub fn refetch_dir(&self, stamp: &str) -> PathBuf {
        self.root.join(&self.refetch_dirname).join(stamp)
    }

    /// `<root>/<screenshots>/<site>`
    pub fn screenshots_dir(&self, site: &str) -> PathBuf {
        self.root.join(&self.screenshots_dirname).join(site)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(&self.logs_dirname)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_output_root(),
            excel_dirname: defaults::EXCEL_DIRNAME.to_string(),
            images_dirname: defaults::IMAGES_DIRNAME.to_string(),
            refetch_dirname: defaults::REFETCH_DIRNAME.to_string(),
            screenshots_dirname: defaults::SCREENSHOTS_DIRNAME.to_string(),
            logs_dirname: defaults::LOGS_DIRNAME.to_string(),
        }
    }
}

/// Output root next to the executable, falling back to the working directory
fn default_output_root() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join(defaults::OUTPUT_DIRNAME)
}

/// Browser session settings shared by every site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Per-operation timeout in milliseconds, unless a site overrides it
    pub timeout_ms: u64,
    pub user_agent: String,
    pub locale: String,
    pub accept_language: String,
    pub timezone: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub headless: bool,
    /// Delay between rounds of scroll and load-more loops
    pub pacing_ms: u64,
    /// Upper bound on rounds of one scroll or load-more loop
    pub max_pump_rounds: u32,
    pub init_script: String,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Session profile for one site, applying its timeout override if any.
    pub fn profile(&self, timeout_override: Option<Duration>) -> SessionProfile {
        SessionProfile {
            user_agent: self.user_agent.clone(),
            locale: self.locale.clone(),
            timezone: self.timezone.clone(),
            viewport: Viewport {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            headless: self.headless,
            extra_headers: vec![
                ("Accept-Language".to_string(), self.accept_language.clone()),
                ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
            ],
            init_script: self.init_script.clone(),
            timeout: timeout_override.unwrap_or_else(|| self.timeout()),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::SESSION_TIMEOUT_MS,
            user_agent: defaults::USER_AGENT.to_string(),
            locale: defaults::LOCALE.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            timezone: defaults::TIMEZONE.to_string(),
            viewport_width: defaults::VIEWPORT_WIDTH,
            viewport_height: defaults::VIEWPORT_HEIGHT,
            headless: true,
            pacing_ms: defaults::PACING_MS,
            max_pump_rounds: defaults::MAX_PUMP_ROUNDS,
            init_script: defaults::STEALTH_INIT_SCRIPT.to_string(),
        }
    }
}

/// Spreadsheet export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub sheet_name: String,
    /// Dataset name of a fresh scrape
    pub catalog_dataset: String,
    /// Dataset name of a reconciled baseline
    pub reconciled_dataset: String,
    pub style: SheetStyle,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sheet_name: defaults::SHEET_NAME.to_string(),
            catalog_dataset: defaults::CATALOG_DATASET.to_string(),
            reconciled_dataset: defaults::RECONCILED_DATASET.to_string(),
            style: SheetStyle::default(),
        }
    }
}

/// Visual contract of an exported sheet. Colors are `0xRRGGBB`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetStyle {
    pub header_fill: u32,
    pub header_font_color: u32,
    pub header_border_color: u32,
    /// Fill of every other body row, starting with the first
    pub stripe_fill: u32,
    pub stripe_font_color: u32,
    pub stripe_border_color: u32,
    /// Characters added to the longest cell of a column
    pub width_padding: usize,
    /// Factor applied to the padded width
    pub width_scale: f64,
}

impl Default for SheetStyle {
    fn default() -> Self {
        Self {
            header_fill: 0x0044_72C4,
            header_font_color: 0x00FF_FFFF,
            header_border_color: 0x002E_5C99,
            stripe_fill: 0x00D9_E1F2,
            stripe_font_color: 0x0000_0000,
            stripe_border_color: 0x00B4_C6E7,
            width_padding: defaults::WIDTH_PADDING,
            width_scale: defaults::WIDTH_SCALE,
        }
    }
}

/// Image download settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub width: u32,
    pub height: u32,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub accept_language: String,
}

impl ImageConfig {
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            user_agent: self.user_agent.clone(),
            accept_language: self.accept_language.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
            extra_headers: Vec::new(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            width: defaults::IMAGE_WIDTH,
            height: defaults::IMAGE_HEIGHT,
            request_timeout_secs: defaults::IMAGE_REQUEST_TIMEOUT_SECS,
            user_agent: defaults::USER_AGENT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// JSON formatted file output
    pub json_format: bool,

    pub console_output: bool,

    pub file_output: bool,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: true,
            module_filters: [
                ("reqwest", "info"),
                ("hyper", "warn"),
                ("h2", "warn"),
                ("html5ever", "warn"),
                ("selectors", "warn"),
                ("tokio", "info"),
            ]
            .into_iter()
            .map(|(module, level)| (module.to_string(), level.to_string()))
            .collect(),
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(defaults::APP_DIRNAME).join("config.toml"))
    }

    /// Load from `path` (or the default location when absent) layered under the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).required(true));
            }
            None => {
                if let Some(default) = Self::default_path() {
                    builder = builder.add_source(config::File::from(default).required(false));
                }
            }
        }

        let settings = builder.add_source(env_source()).build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document layered under the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .add_source(env_source())
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout_ms == 0 {
            return Err(ConfigError::validation(
                "session.timeout_ms must be greater than 0",
            ));
        }

        if self.session.max_pump_rounds == 0 {
            return Err(ConfigError::validation(
                "session.max_pump_rounds must be greater than 0",
            ));
        }

        if self.images.request_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "images.request_timeout_secs must be greater than 0",
            ));
        }

        if self.images.width == 0 || self.images.height == 0 {
            return Err(ConfigError::validation(format!(
                "images size must be non-zero, got {}x{}",
                self.images.width, self.images.height
            )));
        }

        if self.export.sheet_name.trim().is_empty() {
            return Err(ConfigError::validation("export.sheet_name must not be empty"));
        }

        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.name.as_str()) {
                return Err(ConfigError::validation(format!(
                    "duplicate site name '{}'",
                    site.name
                )));
            }
            site.validate().map_err(ConfigError::validation)?;
        }

        Ok(())
    }

    pub fn site(&self, name: &str) -> Option<&SiteSpec> {
        self.sites.iter().find(|site| site.name == name)
    }
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(defaults::ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

/// Built-in configuration values
pub mod defaults {
    pub const APP_DIRNAME: &str = "catalog-scraper";
    pub const ENV_PREFIX: &str = "CATALOG_SCRAPER";

    pub const OUTPUT_DIRNAME: &str = "scrape-results";
    pub const EXCEL_DIRNAME: &str = "excel";
    pub const IMAGES_DIRNAME: &str = "images";
    pub const REFETCH_DIRNAME: &str = "images-refetch";
    pub const SCREENSHOTS_DIRNAME: &str = "screenshots";
    pub const LOGS_DIRNAME: &str = "logs";

    /// Per-operation browser timeout; heavier sites override this to 30s
    pub const SESSION_TIMEOUT_MS: u64 = 15_000;
    pub const PACING_MS: u64 = 1_000;
    pub const MAX_PUMP_ROUNDS: u32 = 200;

    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    pub const LOCALE: &str = "ko-KR";
    pub const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
    pub const TIMEZONE: &str = "Asia/Seoul";
    pub const VIEWPORT_WIDTH: u32 = 1280;
    pub const VIEWPORT_HEIGHT: u32 = 720;

    /// Hides the usual automation markers from page scripts
    pub const STEALTH_INIT_SCRIPT: &str = "\
        Object.defineProperty(navigator, 'webdriver', { get: () => undefined });\n\
        Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3] });\n\
        Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => 4 });";

    pub const SHEET_NAME: &str = "Sheet1";
    pub const CATALOG_DATASET: &str = "catalog";
    pub const RECONCILED_DATASET: &str = "update";
    pub const WIDTH_PADDING: usize = 2;
    pub const WIDTH_SCALE: f64 = 1.2;

    pub const IMAGE_WIDTH: u32 = 800;
    pub const IMAGE_HEIGHT: u32 = 800;
    pub const IMAGE_REQUEST_TIMEOUT_SECS: u64 = 30;

    pub const LOG_LEVEL: &str = "info";
}
