//! # Reconnect Policy
//!
//! Capped exponential backoff: attempt `n` waits
//! `base_delay × multiplier^(n-1)`, and once `n` exceeds `max_attempts`
//! there is no further attempt.

use std::time::Duration;

/// Backoff schedule for unexpected disconnections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl ReconnectPolicy {
    /// Creates a policy; a multiplier below 1.0 is treated as 1.0.
    pub fn new(base_delay: Duration, multiplier: f64, max_attempts: u32) -> Self {
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        Self {
            base_delay,
            multiplier,
            max_attempts,
        }
    }

    /// Delay before the first attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Growth factor per attempt.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Attempt ceiling.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt number `attempt` (1-based), or `None` when the
    /// ceiling has been passed.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_attempts {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        // Clamp so a long schedule cannot overflow Duration.
        let millis = millis.round().min(u64::MAX as f64);
        Some(Duration::from_millis(millis as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_geometrically_from_the_base() {
        let policy = ReconnectPolicy::new(Duration::from_millis(2_000), 1.5, 5);
        let delays: Vec<u64> = (1..=5)
            .map(|n| policy.delay_for(n).unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2_000, 3_000, 4_500, 6_750, 10_125]);
    }

    #[test]
    fn stops_after_the_ceiling() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 2.0, 3);
        assert!(policy.delay_for(3).is_some());
        assert!(policy.delay_for(4).is_none());
        assert!(policy.delay_for(40).is_none());
    }

    #[test]
    fn zero_ceiling_never_retries() {
        let policy = ReconnectPolicy::new(Duration::from_millis(100), 2.0, 0);
        assert!(policy.delay_for(1).is_none());
    }

    #[test]
    fn shrinking_multiplier_is_clamped() {
        let policy = ReconnectPolicy::new(Duration::from_millis(250), 0.1, 3);
        assert_eq!(policy.multiplier(), 1.0);
        assert_eq!(policy.delay_for(3), Some(Duration::from_millis(250)));
    }
}
