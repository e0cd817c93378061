//! Growth-with-jitter scheduling for status probes.
//!
//! [`BackoffPolicy::next_delay`] is a pure function of the previous delay
//! plus a random jitter term. It never shrinks the delay and never resets
//! it on an inconclusive probe: a failing endpoint is probed less often,
//! not more.

use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Tunable parameters for the probe schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first probe of a polling run.
    pub initial_delay: Duration,
    /// Growth factor applied to the previous delay. Must be in `(1, 2)`.
    pub factor: f64,
    /// Jitter is drawn uniformly from `[0, jitter_max)`.
    pub jitter_max: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Total polling budget per run. `None` polls until terminal.
    pub max_total: Option<Duration>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            factor: 1.6,
            jitter_max: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_total: Some(Duration::from_secs(600)),
        }
    }
}

impl BackoffPolicy {
    /// Reject parameter combinations that would break monotonic growth.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.factor > 1.0 && self.factor < 2.0) {
            return Err(CoreError::Validation(format!(
                "backoff factor must be in (1, 2), got {}",
                self.factor
            )));
        }
        if self.initial_delay.is_zero() {
            return Err(CoreError::Validation(
                "initial backoff delay must be positive".to_string(),
            ));
        }
        if self.initial_delay > self.cap {
            return Err(CoreError::Validation(format!(
                "initial backoff delay ({} ms) exceeds cap ({} ms)",
                self.initial_delay.as_millis(),
                self.cap.as_millis()
            )));
        }
        Ok(())
    }

    pub fn initial_delay_ms(&self) -> u64 {
        self.initial_delay.as_millis() as u64
    }

    pub fn cap_ms(&self) -> u64 {
        self.cap.as_millis() as u64
    }

    pub fn jitter_max_ms(&self) -> u64 {
        self.jitter_max.as_millis() as u64
    }

    /// Next delay using the thread-local RNG for jitter.
    pub fn next_delay(&self, previous_ms: u64) -> u64 {
        self.next_delay_with(previous_ms, &mut rand::rng())
    }

    /// Next delay drawing jitter from `rng`.
    pub fn next_delay_with<R: Rng>(&self, previous_ms: u64, rng: &mut R) -> u64 {
        let jitter_max = self.jitter_max_ms();
        let jitter = if jitter_max == 0 {
            0
        } else {
            rng.random_range(0..jitter_max)
        };
        self.grow(previous_ms, jitter)
    }

    /// `min(round(previous * factor) + jitter, cap)`.
    ///
    /// Precondition: `previous_ms <= cap`, which holds for every delay this
    /// policy produced from `initial_delay`.
    pub fn grow(&self, previous_ms: u64, jitter_ms: u64) -> u64 {
        let scaled = (previous_ms as f64 * self.factor).round() as u64;
        scaled.saturating_add(jitter_ms).min(self.cap_ms())
    }

    /// Whether a polling run that began at `started_at` is out of budget.
    pub fn exhausted(&self, started_at: Timestamp, now: Timestamp) -> bool {
        match self.max_total {
            Some(max_total) => {
                let elapsed = (now - started_at).to_std().unwrap_or_default();
                elapsed >= max_total
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn no_jitter() -> BackoffPolicy {
        BackoffPolicy {
            jitter_max: Duration::ZERO,
            ..Default::default()
        }
    }

    #[test]
    fn grow_without_jitter_sequence() {
        let policy = no_jitter();
        let mut delay = policy.initial_delay_ms();
        let expected = [5_000, 8_000, 12_800, 20_480, 32_768, 52_429, 60_000, 60_000];

        for &expected_ms in &expected {
            assert_eq!(delay, expected_ms);
            delay = policy.next_delay(delay);
        }
    }

    #[test]
    fn grow_adds_jitter_before_capping() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.grow(5_000, 999), 8_999);
        assert_eq!(policy.grow(59_000, 999), 60_000);
    }

    #[test]
    fn delays_are_monotonic_and_bounded() {
        let policy = BackoffPolicy::default();
        let bound = policy.cap_ms() + policy.jitter_max_ms();

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut delay = policy.initial_delay_ms();
            for _ in 0..40 {
                let next = policy.next_delay_with(delay, &mut rng);
                assert!(next >= delay, "delay shrank: {delay} -> {next}");
                assert!(next <= bound, "delay {next} exceeds {bound}");
                delay = next;
            }
        }
    }

    #[test]
    fn jitter_stays_below_maximum() {
        let policy = BackoffPolicy {
            cap: Duration::from_secs(3600),
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let next = policy.next_delay_with(5_000, &mut rng);
            assert!((8_000..9_000).contains(&next));
        }
    }

    #[test]
    fn default_policy_is_valid() {
        assert!(BackoffPolicy::default().validate().is_ok());
    }

    #[test]
    fn factor_outside_open_interval_is_rejected() {
        for factor in [1.0, 2.0, 0.5, 3.0] {
            let policy = BackoffPolicy {
                factor,
                ..Default::default()
            };
            assert_matches!(policy.validate(), Err(CoreError::Validation(_)));
        }
    }

    #[test]
    fn initial_above_cap_is_rejected() {
        let policy = BackoffPolicy {
            initial_delay: Duration::from_secs(90),
            ..Default::default()
        };
        assert_matches!(policy.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn exhausted_after_budget() {
        let policy = BackoffPolicy::default();
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(!policy.exhausted(start, start + chrono::Duration::seconds(599)));
        assert!(policy.exhausted(start, start + chrono::Duration::seconds(600)));
    }

    #[test]
    fn unbounded_budget_never_exhausts() {
        let policy = BackoffPolicy {
            max_total: None,
            ..Default::default()
        };
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert!(!policy.exhausted(start, start + chrono::Duration::days(30)));
    }
}
