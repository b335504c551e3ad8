//! General time utility functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use chrono;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of nanoseconds in a second
pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Fixed-period control clock.
///
/// Control time is counted in whole cycles rather than read from the wall
/// clock, so that a run is reproducible regardless of how long each cycle
/// actually took to execute.
#[derive(Debug, Clone, Copy)]
pub struct ControlClock {
    period_s: f64,
    cycle: u64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl ControlClock {
    pub fn new(period_s: f64) -> Self {
        Self { period_s, cycle: 0 }
    }

    /// Advance the clock by one control period.
    pub fn tick(&mut self) {
        self.cycle += 1;
    }

    pub fn period_s(&self) -> f64 {
        self.period_s
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Control time in seconds since the clock was created.
    pub fn time_s(&self) -> f64 {
        self.cycle as f64 * self.period_s
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Convert a duration into a number of seconds, or `None` if overflow
pub fn duration_to_seconds(duration: chrono::Duration) -> Option<f64> {
    duration
        .num_nanoseconds()
        .map(|ns| ns as f64 / NANOS_PER_SECOND as f64)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_control_clock() {
        let mut clock = ControlClock::new(0.004);
        assert_eq!(clock.time_s(), 0.0);

        for _ in 0..250 {
            clock.tick();
        }

        assert_eq!(clock.cycle(), 250);
        approx::assert_abs_diff_eq!(clock.time_s(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_duration_to_seconds() {
        let d = chrono::Duration::milliseconds(1500);
        assert_eq!(duration_to_seconds(d), Some(1.5));
    }
}
