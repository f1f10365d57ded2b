//! Reconnection backoff policy
//!
//! Exponential backoff with jitter for transport reconnection attempts.
//! Attempts are bounded; an external connectivity-restored signal resets the
//! counter and starts a fresh cycle.

use std::time::Duration;

/// Policy governing reconnection attempts after a transport loss
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt
    pub base: Duration,

    /// Upper bound on any single delay
    pub cap: Duration,

    /// Backoff multiplier (typically 2.0 for exponential backoff)
    pub multiplier: f64,

    /// Maximum number of attempts before giving up until the next external trigger
    pub max_attempts: u32,

    /// Add random jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
            jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// Calculate the delay before a given attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.cap.as_secs_f64());

        let final_delay = if self.jitter {
            // Add 0-25% jitter
            capped * (1.0 + rand_jitter() * 0.25)
        } else {
            capped
        };

        Duration::from_secs_f64(final_delay)
    }

    /// Whether another attempt is allowed (0-based attempt counter)
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Simple pseudo-random jitter (0.0 to 1.0) without external dependency
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_are_non_decreasing_up_to_cap() {
        let policy = ReconnectPolicy::default();
        let mut prev = Duration::ZERO;
        for attempt in 0..policy.max_attempts {
            let delay = policy.delay_for(attempt);
            assert!(delay >= prev, "delay shrank at attempt {}", attempt);
            assert!(delay <= policy.cap);
            prev = delay;
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        // 1 * 2^10 = 1024s, well past the 30s cap
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let policy = ReconnectPolicy::default();
        assert!(policy.allows(0));
        assert!(policy.allows(4));
        assert!(!policy.allows(5));
    }

    #[test]
    fn test_jitter_stays_within_envelope() {
        let policy = ReconnectPolicy {
            jitter: true,
            ..Default::default()
        };
        for attempt in 0..3 {
            let plain = ReconnectPolicy::default().delay_for(attempt);
            let jittered = policy.delay_for(attempt);
            assert!(jittered >= plain);
            assert!(jittered <= plain.mul_f64(1.25));
        }
    }
}
