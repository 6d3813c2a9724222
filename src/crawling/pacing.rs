//! Paced polling loops for infinite scroll and "load more" pagination
//!
//! A pump alternates a step (scroll, click) with a pause and a measurement,
//! and stops once two consecutive measurements are equal.

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::crawling::clock::Clock;
use crate::error::{ScrapeError, ScrapeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpStop {
    /// Two consecutive measurements were equal
    Quiescent,
    /// The step reported nothing left to do
    Exhausted,
    /// `max_rounds` steps were taken without settling
    RoundLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpReport {
    /// Steps taken
    pub rounds: u32,
    pub stop: PumpStop,
}

/// Sleep on `clock` unless `cancel` fires first.
pub async fn paced_sleep(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    pause: Duration,
) -> ScrapeResult<()> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ScrapeError::Cancelled),
        () = clock.sleep(pause) => Ok(()),
    }
}

/// Run `step` until `measure` stops changing.
///
/// Takes a baseline measurement, then per round: step, pause, measure, and
/// compare with the previous value. `step` returns `false` when there is
/// nothing left to trigger.
pub async fn pump_until_quiescent<T, M, MF, S, SF>(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    pause: Duration,
    max_rounds: u32,
    mut measure: M,
    mut step: S,
) -> ScrapeResult<PumpReport>
where
    T: PartialEq + Debug,
    M: FnMut() -> MF,
    MF: Future<Output = ScrapeResult<T>>,
    S: FnMut() -> SF,
    SF: Future<Output = ScrapeResult<bool>>,
{
    let mut previous = measure().await?;

    for round in 1..=max_rounds {
        if cancel.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }

        if !step().await? {
            debug!("Pump exhausted after {} rounds", round);
            return Ok(PumpReport {
                rounds: round,
                stop: PumpStop::Exhausted,
            });
        }

        paced_sleep(clock, cancel, pause).await?;

        let current = measure().await?;
        if current == previous {
            debug!("Pump settled at {:?} after {} rounds", current, round);
            return Ok(PumpReport {
                rounds: round,
                stop: PumpStop::Quiescent,
            });
        }
        previous = current;
    }

    Ok(PumpReport {
        rounds: max_rounds,
        stop: PumpStop::RoundLimit,
    })
}
