use std::time::Duration;

/// Exponential reconnect schedule: `base * factor^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub factor: u32,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2,
            max: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, factor: u32, max: Duration) -> Self {
        Self { base, factor, max }
    }

    /// Delay before the reconnect attempt numbered `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.factor
            .max(1)
            .checked_pow(attempt)
            .and_then(|multiplier| self.base.checked_mul(multiplier))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_doubles_then_caps() {
        let backoff = Backoff::default();
        let secs: Vec<u64> = (0..8).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn huge_attempts_saturate_at_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(64), Duration::from_secs(30));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn factor_one_is_constant() {
        let backoff = Backoff::new(Duration::from_millis(250), 1, Duration::from_secs(5));
        assert_eq!(backoff.delay(0), Duration::from_millis(250));
        assert_eq!(backoff.delay(10), Duration::from_millis(250));
    }

    #[test]
    fn zero_factor_treated_as_one() {
        let backoff = Backoff::new(Duration::from_secs(2), 0, Duration::from_secs(10));
        assert_eq!(backoff.delay(3), Duration::from_secs(2));
    }
}
