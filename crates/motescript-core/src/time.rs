//! Simulated time.

use std::{
    fmt,
    ops::{Add, Sub},
    time::Duration,
};

/// Point in simulated time, in microseconds since simulation start.
///
/// Microseconds are the simulator's native resolution and the unit printed
/// in its log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(u64);

impl SimTime {
    /// Simulation start.
    pub const ZERO: Self = Self(0);

    /// Time from raw microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Time from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    /// Raw microseconds.
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Whole milliseconds.
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000
    }

    /// Seconds as a float, for display.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl Add<Duration> for SimTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl Sub for SimTime {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Round to two decimals and render with exactly two fractional digits.
pub fn format_fixed2(value: f64) -> String {
    format!("{:.2}", (value * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_round_trip_through_micros() {
        let t = SimTime::from_millis(3_600_000);
        assert_eq!(t.as_micros(), 3_600_000_000);
        assert_eq!(t.as_millis(), 3_600_000);
    }

    #[test]
    fn add_duration_saturates() {
        let t = SimTime::from_micros(u64::MAX - 1) + Duration::from_secs(1);
        assert_eq!(t.as_micros(), u64::MAX);
    }

    #[test]
    fn sub_never_goes_negative() {
        let early = SimTime::from_millis(5);
        let late = SimTime::from_millis(8);
        assert_eq!(late - early, Duration::from_millis(3));
        assert_eq!(early - late, Duration::ZERO);
    }

    #[test]
    fn fixed2_formatting() {
        assert_eq!(format_fixed2(3600.0), "3600.00");
        assert_eq!(format_fixed2(1.005_1), "1.01");
        assert_eq!(format_fixed2(0.5), "0.50");
    }

    #[test]
    fn seconds_for_display() {
        assert_eq!(format_fixed2(SimTime::from_millis(1_500).as_secs_f64()), "1.50");
    }
}
