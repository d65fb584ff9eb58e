//! Monotonic clock wrapper.
//!
//! Wraps the platform monotonic clock behind the [`hw_trait::SteadyClock`]
//! capability: a fixed tick rate plus an uptime counter that never runs
//! backwards. The origin is captured at construction, so uptime is relative
//! to the wrapper, not to boot.

use std::time::Instant;

use crate::hw_trait;

/// Nanosecond tick rate of the underlying clock.
const TICKS_PER_SECOND: f64 = 1_000_000_000.0;

/// Monotonic clock counting nanoseconds since its construction.
#[derive(Debug, Clone, Copy)]
pub struct SteadyClock {
    origin: Instant,
}

impl SteadyClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SteadyClock {
    fn default() -> Self {
        Self::new()
    }
}

impl hw_trait::SteadyClock for SteadyClock {
    fn frequency(&self) -> f64 {
        TICKS_PER_SECOND
    }

    fn uptime(&mut self) -> u64 {
        // Saturates around 584 years of uptime.
        self.origin.elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw_trait::SteadyClock as _;
    use std::time::Duration;

    #[test]
    fn test_uptime_is_monotone() {
        let mut clock = SteadyClock::new();
        let first = clock.uptime();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.uptime();
        assert!(second > first);
    }

    #[test]
    fn test_uptime_matches_frequency_scale() {
        let mut clock = SteadyClock::new();
        std::thread::sleep(Duration::from_millis(10));
        let seconds = clock.uptime() as f64 / clock.frequency();
        assert!(seconds >= 0.010, "measured {seconds}s");
        assert!(seconds < 1.0, "measured {seconds}s");
    }

    #[test]
    fn test_fresh_clock_starts_near_zero() {
        let mut clock = SteadyClock::new();
        let seconds = clock.uptime() as f64 / clock.frequency();
        assert!(seconds < 0.5, "measured {seconds}s");
    }
}
