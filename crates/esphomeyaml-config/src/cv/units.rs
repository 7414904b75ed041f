//! Physical quantities with SI suffixes.

use regex::Regex;

use super::primitives::as_string;
use super::Validator;
use crate::node::Value;

fn metric_multiplier(suffix: &str) -> Option<f64> {
    Some(match suffix {
        "E" => 1e18,
        "P" => 1e15,
        "T" => 1e12,
        "G" => 1e9,
        "M" => 1e6,
        "k" => 1e3,
        "da" => 10.0,
        "d" => 1e-1,
        "c" => 1e-2,
        "m" => 1e-3,
        "µ" | "u" => 1e-6,
        "n" => 1e-9,
        "p" => 1e-12,
        "f" => 1e-15,
        "a" => 1e-18,
        "" => 1.0,
        _ => return None,
    })
}

fn float_with_unit(quantity: &'static str, suffix: &str) -> Validator {
    let pattern = Regex::new(&format!(r"^([-+]?[0-9]*\.?[0-9]*)\s*(\w*?){suffix}$"));
    Validator::scalar(move |node| {
        let text = as_string(node)?;
        let caps = pattern
            .as_ref()
            .ok()
            .and_then(|pattern| pattern.captures(text.trim()))
            .ok_or_else(|| format!("Expected {quantity} with unit, got {text}"))?;
        let mantissa: f64 = caps[1]
            .parse()
            .map_err(|_| format!("Expected {quantity} with unit, got {text}"))?;
        let multiplier = metric_multiplier(&caps[2])
            .ok_or_else(|| format!("Invalid {quantity} suffix {}", &caps[2]))?;
        Ok(Value::Float(mantissa * multiplier))
    })
}

/// Frequency in Hz: `50kHz`, `1.5MHz`, `800`.
#[must_use]
pub fn frequency() -> Validator {
    float_with_unit("frequency", "(?:Hz|HZ|hz)?")
}

/// Resistance in Ω.
#[must_use]
pub fn resistance() -> Validator {
    float_with_unit("resistance", "(?:Ω|Ω|ohm|Ohm|OHM)?")
}

/// Current in A.
#[must_use]
pub fn current() -> Validator {
    float_with_unit("current", "(?:a|A|amp|Amp|amps|Amps|ampere|Ampere)?")
}

/// Voltage in V.
#[must_use]
pub fn voltage() -> Validator {
    float_with_unit("voltage", "(?:v|V|volt|Volts)?")
}

/// Byte count such as `512`, `4kB` or `1MB`.
#[must_use]
pub fn validate_bytes() -> Validator {
    let pattern = Regex::new(r"^([0-9]+)\s*(\w*?)(?:byte|B|b)?s?$");
    Validator::scalar(move |node| {
        let text = as_string(node)?;
        let caps = pattern
            .as_ref()
            .ok()
            .and_then(|pattern| pattern.captures(text.trim()))
            .ok_or_else(|| format!("Expected number of bytes with unit, got {text}"))?;
        let mantissa: i64 = caps[1]
            .parse()
            .map_err(|_| format!("Expected number of bytes with unit, got {text}"))?;
        let multiplier = metric_multiplier(&caps[2])
            .ok_or_else(|| format!("Invalid metric suffix {}", &caps[2]))?;
        if multiplier < 1.0 {
            return Err(format!(
                "Only suffixes with positive exponents are supported. Got {}",
                &caps[2]
            ));
        }
        Ok(Value::Int((mantissa as f64 * multiplier) as i64))
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::check;
    use super::*;

    #[test]
    fn metric_suffixes() {
        assert_eq!(check(&frequency(), "50kHz").unwrap().value, Value::Float(50_000.0));
        assert_eq!(check(&frequency(), 800_i64).unwrap().value, Value::Float(800.0));
        assert_eq!(check(&voltage(), "3.3V").unwrap().value, Value::Float(3.3));
        assert_eq!(
            check(&frequency(), "5 xHz").unwrap_err(),
            "Invalid frequency suffix x"
        );
    }

    #[test]
    fn byte_counts() {
        assert_eq!(check(&validate_bytes(), "4kB").unwrap().as_i64(), Some(4000));
        assert_eq!(check(&validate_bytes(), "512").unwrap().as_i64(), Some(512));
    }
}
