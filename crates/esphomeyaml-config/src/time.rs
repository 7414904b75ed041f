//! Time periods with integer microsecond precision.

use std::fmt;

/// Resolution a time period is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeUnit {
    /// `us`
    Microseconds,
    /// `ms`
    Milliseconds,
    /// `s`
    Seconds,
    /// `min`
    Minutes,
    /// `h`
    Hours,
    /// `d`
    Days,
}

impl TimeUnit {
    const ALL: [TimeUnit; 6] = [
        TimeUnit::Days,
        TimeUnit::Hours,
        TimeUnit::Minutes,
        TimeUnit::Seconds,
        TimeUnit::Milliseconds,
        TimeUnit::Microseconds,
    ];

    /// Microseconds in one unit.
    #[must_use]
    pub const fn micros(self) -> i64 {
        match self {
            TimeUnit::Microseconds => 1,
            TimeUnit::Milliseconds => 1_000,
            TimeUnit::Seconds => 1_000_000,
            TimeUnit::Minutes => 60_000_000,
            TimeUnit::Hours => 3_600_000_000,
            TimeUnit::Days => 86_400_000_000,
        }
    }

    /// Short suffix used when printing.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }

    /// Long name, also the key in the mapping form.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            TimeUnit::Microseconds => "microseconds",
            TimeUnit::Milliseconds => "milliseconds",
            TimeUnit::Seconds => "seconds",
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }

    /// Parse a unit suffix such as `ms`, `sec` or `hours`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "us" | "microseconds" => TimeUnit::Microseconds,
            "ms" | "milliseconds" => TimeUnit::Milliseconds,
            "s" | "sec" | "seconds" => TimeUnit::Seconds,
            "min" | "minutes" => TimeUnit::Minutes,
            "h" | "hours" => TimeUnit::Hours,
            "d" | "days" => TimeUnit::Days,
            _ => return None,
        })
    }
}

/// A duration stored as whole microseconds plus the unit it is expressed in.
/// The stored total is always an exact multiple of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimePeriod {
    total_us: i64,
    unit: TimeUnit,
}

impl TimePeriod {
    /// Period of `value` units. Fails when the value has precision below
    /// one microsecond.
    pub fn new(value: f64, unit: TimeUnit) -> Result<Self, String> {
        let total = value * unit.micros() as f64;
        if !total.is_finite() || total.abs() > i64::MAX as f64 {
            return Err(format!("Time period {value}{} is out of range", unit.suffix()));
        }
        if (total - total.round()).abs() > 1e-6 {
            return Err("Maximum precision is microseconds".to_string());
        }
        Ok(Self::from_micros(total.round() as i64))
    }

    /// Period from a microsecond total, expressed in the coarsest exact unit.
    #[must_use]
    pub fn from_micros(total_us: i64) -> Self {
        if total_us == 0 {
            return Self::zero();
        }
        let unit = TimeUnit::ALL
            .into_iter()
            .find(|unit| total_us % unit.micros() == 0)
            .unwrap_or(TimeUnit::Microseconds);
        Self { total_us, unit }
    }

    /// Zero-length period.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            total_us: 0,
            unit: TimeUnit::Milliseconds,
        }
    }

    /// Canonical microsecond total.
    #[must_use]
    pub fn total_microseconds(&self) -> i64 {
        self.total_us
    }

    /// Unit the period is expressed in.
    #[must_use]
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Value in [`Self::unit`]; exact by construction.
    #[must_use]
    pub fn value(&self) -> i64 {
        self.total_us / self.unit.micros()
    }

    /// Re-express in `unit`, failing if precision would be lost.
    pub fn in_unit(self, unit: TimeUnit) -> Result<Self, String> {
        if self.total_us % unit.micros() != 0 {
            return Err(format!("Maximum precision is {}", unit.name()));
        }
        Ok(Self {
            total_us: self.total_us,
            unit,
        })
    }

    /// True for negative periods.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.total_us < 0
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value(), self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_coarsest_exact_unit() {
        assert_eq!(TimePeriod::new(1.5, TimeUnit::Seconds).unwrap().to_string(), "1500ms");
        assert_eq!(TimePeriod::new(5.0, TimeUnit::Minutes).unwrap().to_string(), "5min");
        assert_eq!(TimePeriod::new(90.0, TimeUnit::Seconds).unwrap().to_string(), "90s");
    }

    #[test]
    fn conversions_round_trip_through_microseconds() {
        for (value, unit) in [
            (350.0, TimeUnit::Milliseconds),
            (2.0, TimeUnit::Hours),
            (0.25, TimeUnit::Seconds),
            (7.0, TimeUnit::Microseconds),
        ] {
            let period = TimePeriod::new(value, unit).unwrap();
            for target in TimeUnit::ALL {
                if let Ok(converted) = period.in_unit(target) {
                    assert_eq!(
                        converted.value() * target.micros(),
                        period.total_microseconds()
                    );
                }
            }
        }
    }

    #[test]
    fn coarser_conversion_checks_precision() {
        let period = TimePeriod::new(1500.0, TimeUnit::Microseconds).unwrap();
        assert_eq!(
            period.in_unit(TimeUnit::Milliseconds).unwrap_err(),
            "Maximum precision is milliseconds"
        );
        assert_eq!(period.in_unit(TimeUnit::Microseconds).unwrap().value(), 1500);
    }

    #[test]
    fn sub_microsecond_values_are_rejected() {
        assert!(TimePeriod::new(0.5, TimeUnit::Microseconds).is_err());
    }
}
