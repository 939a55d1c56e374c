//! Bounded randomisation of nominal intervals.
//!
//! Every cadence in the orchestrator (loop cycles, inter-batch pauses, window
//! retries) goes through here so no two waits are exactly alike.

use std::time::Duration;

use rand::Rng;

/// A nominal interval plus a symmetric jitter ratio.
///
/// `ratio = 0.2` means the produced value falls in `[0.8 * base, 1.2 * base]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jitter {
    /// Nominal value.
    pub base: Duration,
    /// Fraction of `base` to deviate by, clamped to `[0.0, 1.0]`.
    pub ratio: f64,
}

impl Jitter {
    /// Build a jittered interval.
    #[must_use]
    pub const fn new(base: Duration, ratio: f64) -> Self {
        Self { base, ratio }
    }

    /// Smallest value `sample` can return.
    #[must_use]
    pub fn lower_bound(&self) -> Duration {
        scale(self.base, 1.0 - self.clamped_ratio())
    }

    /// Largest value `sample` can return.
    #[must_use]
    pub fn upper_bound(&self) -> Duration {
        scale(self.base, 1.0 + self.clamped_ratio())
    }

    /// Draw one value from the jitter window.
    #[must_use]
    pub fn sample(&self) -> Duration {
        let ratio = self.clamped_ratio();
        if ratio == 0.0 || self.base.is_zero() {
            return self.base;
        }
        let factor = rand::rng().random_range((1.0 - ratio)..=(1.0 + ratio));
        scale(self.base, factor)
    }

    fn clamped_ratio(&self) -> f64 {
        if self.ratio.is_nan() {
            return 0.0;
        }
        self.ratio.clamp(0.0, 1.0)
    }
}

/// `base * factor`, saturating at [`Duration::MAX`] instead of panicking.
fn scale(base: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Uniform random duration in `[min, max]`; returns `min` when the range is empty.
#[must_use]
pub fn between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::rng().random_range(min.as_millis()..=max.as_millis());
    Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
}

/// Time left of a jittered interval once `elapsed` has already been spent.
#[must_use]
pub fn remaining(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_stays_in_window() {
        let jitter = Jitter::new(Duration::from_secs(100), 0.25);
        for _ in 0..500 {
            let value = jitter.sample();
            assert!(value >= Duration::from_secs(75));
            assert!(value <= Duration::from_secs(125));
        }
    }

    #[test]
    fn test_zero_ratio_is_exact() {
        let jitter = Jitter::new(Duration::from_millis(1500), 0.0);
        assert_eq!(jitter.sample(), Duration::from_millis(1500));
    }

    #[test]
    fn test_ratio_is_clamped() {
        let jitter = Jitter::new(Duration::from_secs(10), 4.0);
        assert_eq!(jitter.lower_bound(), Duration::ZERO);
        assert_eq!(jitter.upper_bound(), Duration::from_secs(20));
    }

    #[test]
    fn test_huge_base_saturates() {
        let jitter = Jitter::new(Duration::from_secs(u64::MAX), 0.2);
        assert_eq!(jitter.upper_bound(), Duration::MAX);
        assert!(jitter.sample() >= jitter.lower_bound());
    }

    #[test]
    fn test_between_bounds() {
        for _ in 0..200 {
            let value = between(Duration::from_millis(50), Duration::from_millis(80));
            assert!(value >= Duration::from_millis(50) && value <= Duration::from_millis(80));
        }
        assert_eq!(
            between(Duration::from_millis(90), Duration::from_millis(10)),
            Duration::from_millis(90)
        );
    }

    #[test]
    fn test_remaining_subtracts_elapsed() {
        assert_eq!(
            remaining(Duration::from_secs(60), Duration::from_secs(45)),
            Duration::from_secs(15)
        );
        assert_eq!(remaining(Duration::from_secs(5), Duration::from_secs(9)), Duration::ZERO);
    }
}
