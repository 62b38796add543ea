//! Minimum-interval pacing for calls to external providers.

use std::time::Duration;

use governor::{Quota, RateLimiter};

use expofinder_shared::PacingConfig;

type DirectLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Lets at most one call through per interval. A zero interval never waits.
pub struct Pacer {
    interval: Duration,
    limiter: Option<DirectLimiter>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        // `with_period` rejects a zero period, which is what disables pacing.
        let limiter = Quota::with_period(interval).map(RateLimiter::direct);
        Self { interval, limiter }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    /// A pacer that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call is allowed. The first call passes immediately.
    pub async fn ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for Pacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pacer").field("interval", &self.interval).finish()
    }
}

/// Pacers used by the indexer. Geocoding is paced by [`crate::PacedGeocoder`].
#[derive(Debug)]
pub struct Pacers {
    /// Between venue indexings (target website and LLM).
    pub index: Pacer,
    pub places: Pacer,
}

impl Pacers {
    pub fn from_config(config: &PacingConfig) -> Self {
        Self {
            index: Pacer::from_millis(config.index_interval_ms),
            places: Pacer::from_millis(config.places_interval_ms),
        }
    }

    /// No pacing anywhere; used by tests and one-off commands.
    pub fn unlimited() -> Self {
        Self {
            index: Pacer::unlimited(),
            places: Pacer::unlimited(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let pacer = Pacer::unlimited();
        let start = Instant::now();
        for _ in 0..50 {
            pacer.ready().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn enforces_minimum_interval() {
        let pacer = Pacer::from_millis(100);
        let start = Instant::now();
        pacer.ready().await;
        assert!(start.elapsed() < Duration::from_millis(50), "first call should pass immediately");

        pacer.ready().await;
        pacer.ready().await;
        assert!(start.elapsed() >= Duration::from_millis(190));
    }

    #[test]
    fn built_from_config() {
        let pacers = Pacers::from_config(&PacingConfig::default());
        assert_eq!(pacers.index.interval(), Duration::from_millis(2000));
        assert_eq!(pacers.places.interval(), Duration::from_millis(200));
    }
}
