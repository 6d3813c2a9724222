//! Time source for pacing delays and output timestamps
//!
//! Pacing loops sleep through a [`Clock`] so tests can run them instantly and
//! assert on the delays that would have been taken.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);

    fn now(&self) -> DateTime<Local>;
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that never waits; records every requested sleep
#[derive(Debug, Clone)]
pub struct FakeClock {
    now: DateTime<Local>,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl FakeClock {
    pub fn at(now: DateTime<Local>) -> Self {
        Self {
            now,
            sleeps: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 2024-03-05 09:07:30 local time.
    pub fn fixed() -> Self {
        let now = Local
            .with_ymd_and_hms(2024, 3, 5, 9, 7, 30)
            .earliest()
            .unwrap_or_else(Local::now);
        Self::at(now)
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }

    fn now(&self) -> DateTime<Local> {
        self.now
    }
}

/// Timestamp shared by every artifact of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp(DateTime<Local>);

impl RunStamp {
    pub fn new(at: DateTime<Local>) -> Self {
        Self(at)
    }

    pub fn from_clock(clock: &dyn Clock) -> Self {
        Self(clock.now())
    }

    /// `YYYY-MM-DD_HH_MM`, used for export files and image directories.
    pub fn minute(&self) -> String {
        self.0.format("%Y-%m-%d_%H_%M").to_string()
    }

    /// `YYYY-MM-DD_HH_MM_SS`, used for diagnostic captures.
    pub fn second(&self) -> String {
        self.0.format("%Y-%m-%d_%H_%M_%S").to_string()
    }

    /// `YYYY-MM-DD`, used for the daily log file.
    pub fn date(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_formats() {
        let stamp = RunStamp::from_clock(&FakeClock::fixed());
        assert_eq!(stamp.minute(), "2024-03-05_09_07");
        assert_eq!(stamp.second(), "2024-03-05_09_07_30");
        assert_eq!(stamp.date(), "2024-03-05");
    }

    #[tokio::test]
    async fn fake_clock_records_sleeps() {
        let clock = FakeClock::fixed();
        clock.sleep(Duration::from_millis(250)).await;
        clock.sleep(Duration::from_secs(1)).await;
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(250), Duration::from_secs(1)]
        );
    }
}
