//! # Crawling
//!
//! - `session`: one browser page per adapter run, timed and cancellable
//! - `adapter`: the per-site contract and its item-level failure boundary
//! - `orchestrator`: sequential adapter runs with contiguous product numbering
//! - `site_spec` / `selector_adapter`: config-driven adapters
//! - `pacing` / `clock`: quiescence loops over an injectable clock

pub mod adapter;
pub mod clock;
pub mod orchestrator;
pub mod pacing;
pub mod selector_adapter;
pub mod session;
pub mod site_spec;

pub use adapter::{ExtractionFailure, ExtractionOutcome, SiteAdapter};
pub use clock::{Clock, FakeClock, RunStamp, TokioClock};
pub use orchestrator::{CatalogOrchestrator, CatalogRun, Revisit};
pub use pacing::{PumpReport, PumpStop, pump_until_quiescent};
pub use selector_adapter::SelectorAdapter;
pub use session::{Locator, ScrapeSession, SessionSettings};
pub use site_spec::SiteSpec;
