use crate::Result;
use rand::Rng;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Longest single pause a policy file may ask for.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// A uniformly sampled pause, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DelayRange {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl DelayRange {
    pub const fn new(min_secs: f64, max_secs: f64) -> Self {
        Self { min_secs, max_secs }
    }

    pub const fn fixed(secs: f64) -> Self {
        Self::new(secs, secs)
    }

    pub const fn none() -> Self {
        Self::fixed(0.0)
    }

    pub fn sample(&self) -> Duration {
        if !self.is_finite() {
            return Duration::ZERO;
        }
        let low = self.min_secs.max(0.0);
        let high = self.max_secs.max(low);
        let secs = if high > low {
            rand::rng().random_range(low..=high)
        } else {
            low
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }

    fn is_finite(&self) -> bool {
        self.min_secs.is_finite() && self.max_secs.is_finite()
    }

    /// Same distribution stretched by `factor`, used for growing backoff.
    pub fn scaled(&self, factor: u32) -> Self {
        let factor = f64::from(factor.max(1));
        Self::new(self.min_secs * factor, self.max_secs * factor)
    }

    pub fn pause(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Pacing, retry and cadence knobs for one crawl run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CrawlPolicy {
    /// Pause right after a list page navigation.
    pub list_load_delay: DelayRange,
    /// Pause once the listing container is present.
    pub list_settle_delay: DelayRange,
    pub list_wait_timeout_secs: u64,
    pub list_max_attempts: u32,
    /// Base backoff between list attempts, multiplied by the attempt number.
    pub list_retry_backoff: DelayRange,
    /// How long to sit on an anti-bot interstitial before re-checking it.
    pub challenge_delay: DelayRange,

    pub detail_scroll_passes: u32,
    pub detail_scroll_delay: DelayRange,
    pub detail_wait_timeout_secs: u64,
    pub detail_settle_delay: DelayRange,
    pub detail_max_attempts: u32,
    pub detail_retry_backoff: DelayRange,

    pub page_delay: DelayRange,
    pub relaunch_settle_delay: DelayRange,
    /// Relaunch the browser after this many processed detail pages.
    pub relaunch_every: u32,
    /// Flush the in-memory buffer every this many pages.
    pub flush_every: u32,
}

impl Default for CrawlPolicy {
    fn default() -> Self {
        Self {
            list_load_delay: DelayRange::new(10.0, 20.0),
            list_settle_delay: DelayRange::new(10.0, 20.0),
            list_wait_timeout_secs: 60,
            list_max_attempts: 3,
            list_retry_backoff: DelayRange::new(20.0, 60.0),
            challenge_delay: DelayRange::new(180.0, 240.0),
            detail_scroll_passes: 3,
            detail_scroll_delay: DelayRange::new(2.0, 4.0),
            detail_wait_timeout_secs: 20,
            detail_settle_delay: DelayRange::new(5.0, 10.0),
            detail_max_attempts: 3,
            detail_retry_backoff: DelayRange::new(5.0, 10.0),
            page_delay: DelayRange::new(5.0, 10.0),
            relaunch_settle_delay: DelayRange::fixed(5.0),
            relaunch_every: 30,
            flush_every: 5,
        }
    }
}

impl CrawlPolicy {
    /// No pauses and no waiting; retry bounds and cadences keep their defaults.
    pub fn immediate() -> Self {
        Self {
            list_load_delay: DelayRange::none(),
            list_settle_delay: DelayRange::none(),
            list_wait_timeout_secs: 0,
            list_retry_backoff: DelayRange::none(),
            challenge_delay: DelayRange::none(),
            detail_scroll_delay: DelayRange::none(),
            detail_wait_timeout_secs: 0,
            detail_settle_delay: DelayRange::none(),
            detail_retry_backoff: DelayRange::none(),
            page_delay: DelayRange::none(),
            relaunch_settle_delay: DelayRange::none(),
            ..Self::default()
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let policy: Self = toml::from_str(&raw)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.list_max_attempts == 0 || self.detail_max_attempts == 0 {
            return Err(crate::CrawlError::Configuration(
                "retry bounds must allow at least one attempt".to_string(),
            ));
        }
        if self.flush_every == 0 {
            return Err(crate::CrawlError::Configuration(
                "flush_every must be positive".to_string(),
            ));
        }
        for (name, range) in self.delays() {
            let in_bounds = |secs: f64| secs.is_finite() && (0.0..=MAX_DELAY_SECS).contains(&secs);
            if !in_bounds(range.min_secs) || !in_bounds(range.max_secs) {
                return Err(crate::CrawlError::Configuration(format!(
                    "{name} must lie within 0..={MAX_DELAY_SECS} seconds, got {}..{}",
                    range.min_secs, range.max_secs
                )));
            }
        }
        Ok(())
    }

    fn delays(&self) -> [(&'static str, DelayRange); 9] {
        [
            ("list_load_delay", self.list_load_delay),
            ("list_settle_delay", self.list_settle_delay),
            ("list_retry_backoff", self.list_retry_backoff),
            ("challenge_delay", self.challenge_delay),
            ("detail_scroll_delay", self.detail_scroll_delay),
            ("detail_settle_delay", self.detail_settle_delay),
            ("detail_retry_backoff", self.detail_retry_backoff),
            ("page_delay", self.page_delay),
            ("relaunch_settle_delay", self.relaunch_settle_delay),
        ]
    }

    pub fn list_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.list_wait_timeout_secs)
    }

    pub fn detail_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_wait_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_stays_in_range() {
        let range = DelayRange::new(0.001, 0.002);
        for _ in 0..50 {
            let delay = range.sample();
            assert!(delay >= Duration::from_secs_f64(0.001));
            assert!(delay <= Duration::from_secs_f64(0.002));
        }
    }

    #[test]
    fn inverted_or_negative_range_does_not_panic() {
        assert_eq!(DelayRange::new(-1.0, -2.0).sample(), Duration::ZERO);
        assert_eq!(DelayRange::new(3.0, 1.0).sample(), Duration::from_secs(3));
    }

    #[test]
    fn backoff_grows_with_attempt() {
        let base = DelayRange::new(20.0, 60.0);
        assert_eq!(base.scaled(2), DelayRange::new(40.0, 120.0));
        assert_eq!(base.scaled(0), base);
    }

    #[test]
    fn partial_policy_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(
            &path,
            "relaunch_every = 10\n\n[page_delay]\nmin_secs = 1.0\nmax_secs = 2.0\n",
        )
        .unwrap();

        let policy = CrawlPolicy::from_toml_file(&path).unwrap();
        assert_eq!(policy.relaunch_every, 10);
        assert_eq!(policy.page_delay, DelayRange::new(1.0, 2.0));
        assert_eq!(policy.list_max_attempts, 3);
    }

    #[test]
    fn zero_attempts_are_rejected() {
        let policy = CrawlPolicy {
            detail_max_attempts: 0,
            ..CrawlPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn non_finite_or_huge_delays_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for bound in ["inf", "nan", "1e300", "-1.0"] {
            let path = dir.path().join("policy.toml");
            std::fs::write(
                &path,
                format!("[page_delay]\nmin_secs = 1.0\nmax_secs = {bound}\n"),
            )
            .unwrap();
            assert!(
                matches!(
                    CrawlPolicy::from_toml_file(&path),
                    Err(crate::CrawlError::Configuration(_))
                ),
                "{bound} accepted"
            );
        }
    }

    #[test]
    fn sampling_a_non_finite_range_does_not_panic() {
        assert_eq!(DelayRange::new(1.0, f64::INFINITY).sample(), Duration::ZERO);
        assert_eq!(DelayRange::new(f64::NAN, 1.0).sample(), Duration::ZERO);
        assert_eq!(DelayRange::fixed(1e300).sample(), Duration::ZERO);
    }
}
