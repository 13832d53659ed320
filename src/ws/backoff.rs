//! Reconnection backoff with jitter

use rand::Rng;
use std::time::Duration;

/// Exponential backoff that doubles up to a cap and spreads each delay by a
/// random jitter so many clients do not reconnect in lockstep.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    jitter: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, jitter: f64) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            current: initial.min(max),
        }
    }

    /// Base delay of the next attempt, before jitter
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Delay to wait now; advances the base delay for the following attempt
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        self.current = (self.current * 2).min(self.max);
        self.apply_jitter(base)
    }

    /// Start over after a connection was established
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
    }

    fn apply_jitter(&self, base: Duration) -> Duration {
        if self.jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        base.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.0);
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_backoff_jitter_within_bounds() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.2);
        for _ in 0..200 {
            let base = backoff.peek();
            let delay = backoff.next_delay();
            assert!(delay >= base.mul_f64(0.8), "{delay:?} below {base:?} - 20%");
            assert!(delay <= base.mul_f64(1.2), "{delay:?} above {base:?} + 20%");
            if backoff.peek() == Duration::from_secs(30) {
                backoff.reset();
            }
        }
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 0.0);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.peek(), Duration::from_secs(4));
        backoff.reset();
        assert_eq!(backoff.peek(), Duration::from_secs(1));
    }
}
