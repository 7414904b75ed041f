//! Time period validators.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{any, Validator};
use crate::error::Invalid;
use crate::node::{Node, Value};
use crate::time::{TimePeriod, TimeUnit};

static WITH_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([-+]?[0-9]*\.?[0-9]*)\s*(\w*)$").expect("static regex"));

fn format_error(node: &Node) -> String {
    format!("Time period {node} should be format number + unit, for example 5ms, 5s, 5min, 5h")
}

fn str_unit() -> Validator {
    Validator::scalar(|node| {
        let text = match &node.value {
            Value::Time(period) => return Ok(Value::Time(*period)),
            Value::Int(value) => value.to_string(),
            Value::Str(text) => text.clone(),
            _ => return Err("Expected string for time period with unit.".to_string()),
        };
        let unknown = || format!("Expected time period with unit, got {text}");
        let caps = WITH_UNIT.captures(text.trim()).ok_or_else(unknown)?;
        let unit = TimeUnit::parse(&caps[2]).ok_or_else(unknown)?;
        let value: f64 = caps[1].parse().map_err(|_| unknown())?;
        TimePeriod::new(value, unit).map(Value::Time)
    })
}

fn str_colon() -> Validator {
    Validator::scalar(|node| {
        let text = match &node.value {
            Value::Int(_) => return Err("Make sure you wrap time values in quotes".to_string()),
            Value::Str(text) => text,
            _ => return Err(format_error(node)),
        };
        let parsed: Vec<i64> = text
            .split(':')
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<_, _>>()
            .map_err(|_| format_error(node))?;
        let (hours, minutes, seconds) = match parsed.as_slice() {
            [h, m] => (*h, *m, 0),
            [h, m, s] => (*h, *m, *s),
            _ => return Err(format_error(node)),
        };
        let total = [
            (hours, TimeUnit::Hours),
            (minutes, TimeUnit::Minutes),
            (seconds, TimeUnit::Seconds),
        ]
        .into_iter()
        .try_fold(0_i64, |acc, (amount, unit)| {
            amount.checked_mul(unit.micros())?.checked_add(acc)
        })
        .ok_or_else(|| "time period out of range".to_string())?;
        Ok(Value::Time(TimePeriod::from_micros(total)))
    })
}

fn dict() -> Validator {
    const KEYS: [TimeUnit; 6] = [
        TimeUnit::Days,
        TimeUnit::Hours,
        TimeUnit::Minutes,
        TimeUnit::Seconds,
        TimeUnit::Milliseconds,
        TimeUnit::Microseconds,
    ];
    Validator::new(|node, _| {
        let Some(map) = node.as_map() else {
            return Err(Invalid::at(node, "expected a dictionary"));
        };
        let mut total = 0.0;
        let mut found = false;
        for (key, value) in map {
            let Some(unit) = KEYS.into_iter().find(|unit| unit.name() == key.as_str()) else {
                return Err(Invalid::of_kind(
                    crate::error::InvalidKind::ExtraKey,
                    vec![crate::error::PathSegment::Key(key.clone())],
                    value.mark.clone(),
                ));
            };
            let amount = super::primitives::as_float(value)
                .map_err(|message| Invalid::at(value, message))?;
            total += amount * unit.micros() as f64;
            found = true;
        }
        if !found {
            return Err(Invalid::at(
                node,
                "Must contain at least one of days, hours, minutes, seconds, milliseconds, microseconds.",
            ));
        }
        TimePeriod::new(total, TimeUnit::Microseconds)
            .map(|period| node.with_value(Value::Time(period)))
            .map_err(|message| Invalid::at(node, message))
    })
}

/// `5s`, `1.5min`, `"01:30"` or `{minutes: 1, seconds: 30}`.
#[must_use]
pub fn time_period() -> Validator {
    let colon = str_colon();
    let other = any(vec![str_unit(), dict()]);
    Validator::new(move |node, ctx| match &node.value {
        Value::Str(text) if text.contains(':') => colon.validate(node, ctx),
        _ => other.validate(node, ctx),
    })
}

fn map_period(
    base: Validator,
    f: impl Fn(TimePeriod) -> Result<TimePeriod, String> + Send + Sync + 'static,
) -> Validator {
    base.then(Validator::scalar(move |node| match node.as_time() {
        Some(period) => f(period).map(Value::Time),
        None => Err(format_error(node)),
    }))
}

/// Non-negative period.
#[must_use]
pub fn positive_time_period() -> Validator {
    map_period(time_period(), |period| {
        if period.is_negative() {
            Err("value must be at least 0s".to_string())
        } else {
            Ok(period)
        }
    })
}

/// Strictly positive period.
#[must_use]
pub fn positive_not_null_time_period() -> Validator {
    map_period(time_period(), |period| {
        if period.total_microseconds() <= 0 {
            Err("value must be higher than 0s".to_string())
        } else {
            Ok(period)
        }
    })
}

/// Non-negative period expressed in milliseconds.
#[must_use]
pub fn positive_time_period_milliseconds() -> Validator {
    map_period(positive_time_period(), |period| {
        period.in_unit(TimeUnit::Milliseconds)
    })
}

/// Non-negative period expressed in seconds.
#[must_use]
pub fn positive_time_period_seconds() -> Validator {
    map_period(positive_time_period(), |period| period.in_unit(TimeUnit::Seconds))
}

/// Period expressed in microseconds.
#[must_use]
pub fn time_period_microseconds() -> Validator {
    map_period(time_period(), |period| {
        period.in_unit(TimeUnit::Microseconds)
    })
}

/// Non-negative period expressed in microseconds.
#[must_use]
pub fn positive_time_period_microseconds() -> Validator {
    map_period(positive_time_period(), |period| {
        period.in_unit(TimeUnit::Microseconds)
    })
}

/// Update interval in milliseconds; `never` is the largest 32-bit value.
#[must_use]
pub fn update_interval() -> Validator {
    let period = positive_time_period_milliseconds();
    Validator::new(move |node, ctx| {
        if node.as_str() == Some("never") {
            return Ok(node.with_value(Value::Int(4_294_967_295)));
        }
        period.validate(node, ctx)
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::check;
    use super::*;

    fn micros(validator: &Validator, node: impl Into<Node>) -> i64 {
        check(validator, node).unwrap().as_time().unwrap().total_microseconds()
    }

    #[test]
    fn unit_strings() {
        assert_eq!(micros(&time_period(), "5ms"), 5_000);
        assert_eq!(micros(&time_period(), "1.5s"), 1_500_000);
        assert_eq!(micros(&time_period(), "2 min"), 120_000_000);
        assert_eq!(
            check(&time_period(), "5").unwrap_err(),
            "Expected time period with unit, got 5"
        );
    }

    #[test]
    fn colon_and_mapping_forms() {
        assert_eq!(micros(&time_period(), "01:30"), 5_400_000_000);
        let node = Node::map([("minutes", Node::from(1_i64)), ("seconds", Node::from(30_i64))]);
        assert_eq!(micros(&time_period(), node), 90_000_000);
    }

    #[test]
    fn huge_colon_values_are_rejected() {
        assert_eq!(
            check(&time_period(), "9999999999999:00").unwrap_err(),
            "time period out of range"
        );
        assert_eq!(
            check(&time_period(), "00:00:9223372036854775807").unwrap_err(),
            "time period out of range"
        );
    }

    #[test]
    fn precision_is_checked_on_conversion() {
        assert_eq!(
            check(&positive_time_period_milliseconds(), "1500us").unwrap_err(),
            "Maximum precision is milliseconds"
        );
        let out = check(&positive_time_period_milliseconds(), "2s").unwrap();
        assert_eq!(out.as_time().unwrap().value(), 2000);
        assert_eq!(out.to_expression().unwrap().to_string(), "2000");
    }

    #[test]
    fn negative_periods() {
        assert_eq!(
            check(&positive_time_period(), "-5s").unwrap_err(),
            "value must be at least 0s"
        );
        assert!(check(&positive_not_null_time_period(), "0s").is_err());
    }

    #[test]
    fn never_update_interval() {
        assert_eq!(
            check(&update_interval(), "never").unwrap().as_i64(),
            Some(4_294_967_295)
        );
    }
}
