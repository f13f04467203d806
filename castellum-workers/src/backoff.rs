//! Exponential backoff with full jitter, for the resize executor's
//! `errored` retry schedule (spec §4.5 "exponential with full jitter,
//! capped").

use chrono::Duration;
use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base_secs: u64,
    pub max_secs: u64,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_secs: 30,
            max_secs: 3600,
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// `30s · 2^n`, capped at `max_secs`, then jittered uniformly in
    /// `[0, cap]` ("full jitter").
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_secs.saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX).max(1));
        let cap = exp.min(self.max_secs);
        let jittered = rand::thread_rng().gen_range(0..=cap.max(1));
        Duration::seconds(jittered as i64)
    }

    pub fn exceeded(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let policy = BackoffPolicy {
            base_secs: 30,
            max_secs: 120,
            max_attempts: 10,
        };
        for attempt in 0..20 {
            let delay = policy.next_delay(attempt);
            assert!(delay.num_seconds() <= 120);
            assert!(delay.num_seconds() >= 0);
        }
    }

    #[test]
    fn exceeded_respects_ceiling() {
        let policy = BackoffPolicy::default();
        assert!(!policy.exceeded(9));
        assert!(policy.exceeded(10));
        assert!(policy.exceeded(11));
    }
}
