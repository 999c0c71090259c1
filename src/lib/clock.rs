use std::time::{Duration, Instant};

/// Monotonic time source for hosts that drive devices in real time. Tests
/// skip it and feed synthetic instants straight to the devices' `tick`.
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        WallClock {
            origin: Instant::now(),
        }
    }

    /// Time elapsed since the clock was created.
    pub fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for WallClock {
    fn default() -> Self {
        WallClock::new()
    }
}

/// A fixed-interval trigger advanced by the host pump. The first firing is
/// one interval after time zero.
pub struct Periodic {
    interval: Duration,
    next: Duration,
}

impl Periodic {
    pub fn new(interval: Duration) -> Self {
        Periodic {
            interval,
            next: interval,
        }
    }

    /// Count the intervals that have elapsed up to `now`, consuming them.
    pub fn poll(&mut self, now: Duration) -> u32 {
        let mut fires = 0;
        while now >= self.next {
            self.next += self.interval;
            fires += 1;
        }
        fires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_counts_elapsed_intervals() {
        let mut periodic = Periodic::new(Duration::from_millis(100));

        assert_eq!(periodic.poll(Duration::from_millis(50)), 0);
        assert_eq!(periodic.poll(Duration::from_millis(100)), 1);
        // Elapsed intervals are consumed; polling the same instant again
        // fires nothing.
        assert_eq!(periodic.poll(Duration::from_millis(100)), 0);
        assert_eq!(periodic.poll(Duration::from_millis(350)), 2);
        assert_eq!(periodic.poll(Duration::from_millis(350)), 0);
    }

    #[test]
    fn test_wall_clock_monotonic() {
        let clock = WallClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
