//! Scalar validators: strings, numbers, booleans, lambdas and lists.

use esphomeyaml_codegen::Lambda;
use once_cell::sync::Lazy;
use regex::Regex;

use super::Validator;
use crate::error::Invalid;
use crate::node::{Node, Value};

const ALLOWED_NAME_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789_";

static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\{?([0-9a-fA-F]{8})-?([0-9a-fA-F]{4})-?([0-9a-fA-F]{4})-?([0-9a-fA-F]{4})-?([0-9a-fA-F]{12})\}?$",
    )
    .expect("static regex")
});

pub(crate) fn as_string(node: &Node) -> Result<String, String> {
    match &node.value {
        Value::Map(_) | Value::Seq(_) => Err("string value cannot be dictionary or list.".to_string()),
        Value::Null => Err("string value is None".to_string()),
        _ => Ok(node.to_string()),
    }
}

pub(crate) fn as_strict_string(node: &Node) -> Result<&str, String> {
    node.as_str().ok_or_else(|| {
        "Must be string, did you forget putting quotes around the value?".to_string()
    })
}

pub(crate) fn as_integer(node: &Node) -> Result<i64, String> {
    match &node.value {
        Value::Int(value) => Ok(*value),
        Value::HexInt(value) => i64::try_from(*value).map_err(|_| format!("{value} is too large")),
        Value::Float(value) if value.fract() == 0.0 && value.is_finite() => Ok(*value as i64),
        Value::Str(text) => {
            let lower = text.trim().to_lowercase();
            let parsed = match lower.strip_prefix("0x") {
                Some(hex) => i64::from_str_radix(hex, 16),
                None => lower.parse::<i64>(),
            };
            parsed.map_err(|_| format!("expected integer, got {text}"))
        }
        _ => Err(format!("expected integer, got {node}")),
    }
}

pub(crate) fn as_float(node: &Node) -> Result<f64, String> {
    match &node.value {
        Value::Float(value) => Ok(*value),
        Value::Int(value) => Ok(*value as f64),
        Value::HexInt(value) => Ok(*value as f64),
        Value::Str(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("expected float, got {text}")),
        _ => Err(format!("expected float, got {node}")),
    }
}

fn check_range<T: PartialOrd + std::fmt::Display + Copy>(
    value: T,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), String> {
    if let Some(min) = min {
        if value < min {
            return Err(format!("value must be at least {min}"));
        }
    }
    if let Some(max) = max {
        if value > max {
            return Err(format!("value must be at most {max}"));
        }
    }
    Ok(())
}

/// Any scalar, converted to a string.
#[must_use]
pub fn string() -> Validator {
    Validator::scalar(|node| as_string(node).map(Value::Str))
}

/// Only values that already are strings.
#[must_use]
pub fn string_strict() -> Validator {
    Validator::scalar(|node| as_strict_string(node).map(|text| Value::Str(text.to_string())))
}

/// Device name: lowercase letters, digits and underscores.
#[must_use]
pub fn valid_name() -> Validator {
    Validator::scalar(|node| {
        let text = as_strict_string(node)?;
        if let Some(bad) = text.chars().find(|ch| !ALLOWED_NAME_CHARS.contains(*ch)) {
            return Err(format!(
                "'{bad}' is an invalid character for names. Valid characters are: {ALLOWED_NAME_CHARS}"
            ));
        }
        Ok(Value::Str(text.to_string()))
    })
}

/// Material design icon reference.
#[must_use]
pub fn icon() -> Validator {
    Validator::scalar(|node| {
        let text = as_strict_string(node)?;
        if text.starts_with("mdi:") {
            Ok(Value::Str(text.to_string()))
        } else {
            Err("Icons should start with prefix \"mdi:\"".to_string())
        }
    })
}

/// Boolean, also accepting `enable`/`disable` and `1`/`0` strings.
#[must_use]
pub fn boolean() -> Validator {
    Validator::scalar(|node| match &node.value {
        Value::Bool(value) => Ok(Value::Bool(*value)),
        Value::Null => Ok(Value::Bool(false)),
        Value::Int(value) => Ok(Value::Bool(*value != 0)),
        Value::Str(text) => match text.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "enable" => Ok(Value::Bool(true)),
            "0" | "false" | "no" | "off" | "disable" => Ok(Value::Bool(false)),
            other => Err(format!("invalid boolean value {other}")),
        },
        _ => Err(format!("invalid boolean value {node}")),
    })
}

/// Integer, also from decimal or `0x` strings.
#[must_use]
pub fn int() -> Validator {
    Validator::scalar(|node| as_integer(node).map(Value::Int))
}

/// Integer within inclusive bounds.
#[must_use]
pub fn int_range(min: Option<i64>, max: Option<i64>) -> Validator {
    Validator::scalar(move |node| {
        let value = as_integer(node)?;
        check_range(value, min, max)?;
        Ok(Value::Int(value))
    })
}

/// TCP/UDP port.
#[must_use]
pub fn port() -> Validator {
    int_range(Some(1), Some(65535))
}

/// Integer `>= 0`.
#[must_use]
pub fn positive_int() -> Validator {
    int_range(Some(0), None)
}

/// Integer `> 0`.
#[must_use]
pub fn positive_not_null_int() -> Validator {
    Validator::scalar(|node| {
        let value = as_integer(node)?;
        if value <= 0 {
            return Err("value must be higher than 0".to_string());
        }
        Ok(Value::Int(value))
    })
}

/// 8-bit unsigned.
#[must_use]
pub fn uint8() -> Validator {
    int_range(Some(0), Some(255))
}

/// 16-bit unsigned.
#[must_use]
pub fn uint16() -> Validator {
    int_range(Some(0), Some(65535))
}

/// 32-bit unsigned.
#[must_use]
pub fn uint32() -> Validator {
    int_range(Some(0), Some(4_294_967_295))
}

/// Integer emitted in hexadecimal.
#[must_use]
pub fn hex_int() -> Validator {
    Validator::scalar(|node| {
        let value = as_integer(node)?;
        u64::try_from(value)
            .map(Value::HexInt)
            .map_err(|_| "value must be at least 0".to_string())
    })
}

fn hex_range(max: u64) -> Validator {
    Validator::scalar(move |node| {
        let value = as_integer(node)?;
        check_range(value, Some(0), i64::try_from(max).ok())?;
        Ok(Value::HexInt(value.unsigned_abs()))
    })
}

/// 8-bit unsigned, emitted in hexadecimal.
#[must_use]
pub fn hex_uint8() -> Validator {
    hex_range(255)
}

/// 16-bit unsigned, emitted in hexadecimal.
#[must_use]
pub fn hex_uint16() -> Validator {
    hex_range(65535)
}

/// I²C device address.
#[must_use]
pub fn i2c_address() -> Validator {
    hex_uint8()
}

/// Float.
#[must_use]
pub fn float() -> Validator {
    Validator::scalar(|node| as_float(node).map(Value::Float))
}

/// Float `>= 0`.
#[must_use]
pub fn positive_float() -> Validator {
    Validator::scalar(|node| {
        let value = as_float(node)?;
        check_range(value, Some(0.0), None)?;
        Ok(Value::Float(value))
    })
}

/// Float in `0..=1`.
#[must_use]
pub fn zero_to_one_float() -> Validator {
    Validator::scalar(|node| {
        let value = as_float(node)?;
        check_range(value, Some(0.0), Some(1.0))?;
        Ok(Value::Float(value))
    })
}

/// `50%` or a float in `0..=1`.
#[must_use]
pub fn percentage() -> Validator {
    Validator::scalar(|node| {
        let value = match node.as_str().and_then(|text| text.strip_suffix('%')) {
            Some(number) => {
                number
                    .trim_end()
                    .parse::<f64>()
                    .map_err(|_| format!("expected percentage, got {node}"))?
                    / 100.0
            }
            None => as_float(node)?,
        };
        check_range(value, Some(0.0), Some(1.0))?;
        Ok(Value::Float(value))
    })
}

/// `!lambda` or a plain string treated as lambda source.
#[must_use]
pub fn lambda() -> Validator {
    Validator::scalar(|node| match &node.value {
        Value::Lambda(lambda) => Ok(Value::Lambda(lambda.clone())),
        _ => as_strict_string(node).map(|text| Value::Lambda(Lambda::new(text))),
    })
}

/// UUID in any common spelling, normalized to lowercase with hyphens.
#[must_use]
pub fn uuid() -> Validator {
    Validator::scalar(|node| {
        let text = as_string(node)?;
        let caps = UUID
            .captures(text.trim())
            .ok_or_else(|| format!("expected UUID, got {text}"))?;
        let parts: Vec<&str> = (1..=5).filter_map(|i| caps.get(i).map(|m| m.as_str())).collect();
        Ok(Value::Str(parts.join("-").to_lowercase()))
    })
}

/// Wrap a single value in a list. Null and an empty mapping become `[]`.
#[must_use]
pub fn ensure_list() -> Validator {
    Validator::new(|node, _| {
        Ok(match &node.value {
            Value::Seq(_) => node.clone(),
            Value::Null => node.with_value(Value::Seq(Vec::new())),
            Value::Map(map) if map.is_empty() => node.with_value(Value::Seq(Vec::new())),
            _ => node.with_value(Value::Seq(vec![node.clone()])),
        })
    })
}

/// Wrap a single value in a list, keeping null and empty mappings as items.
#[must_use]
pub fn ensure_list_not_empty() -> Validator {
    Validator::new(|node, _| {
        Ok(match &node.value {
            Value::Seq(_) => node.clone(),
            _ => node.with_value(Value::Seq(vec![node.clone()])),
        })
    })
}

/// Existing file relative to the configuration directory.
#[must_use]
pub fn file_path() -> Validator {
    Validator::new(|node, ctx| {
        let text = as_string(node).map_err(|message| Invalid::at(node, message))?;
        let path = ctx.config_dir.join(&text);
        if !path.exists() {
            return Err(Invalid::at(
                node,
                format!(
                    "Could not find file '{}'. Please make sure it exists.",
                    path.display()
                ),
            ));
        }
        if !path.is_file() {
            return Err(Invalid::at(
                node,
                format!("Path '{}' is not a file.", path.display()),
            ));
        }
        Ok(node.with_value(Value::Str(text)))
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::check;
    use super::*;

    #[test]
    fn strict_strings_reject_numbers() {
        assert_eq!(
            check(&string_strict(), 5_i64).unwrap_err(),
            "Must be string, did you forget putting quotes around the value?"
        );
        assert_eq!(check(&string(), 5_i64).unwrap().as_str(), Some("5"));
    }

    #[test]
    fn names_are_lowercase_identifiers() {
        assert!(check(&valid_name(), "living_room").is_ok());
        assert_eq!(
            check(&valid_name(), "Living").unwrap_err(),
            "'L' is an invalid character for names. Valid characters are: \
             abcdefghijklmnopqrstuvwxyz0123456789_"
        );
    }

    #[test]
    fn booleans_and_integers() {
        assert_eq!(check(&boolean(), "Enable").unwrap().as_bool(), Some(true));
        assert_eq!(check(&boolean(), "maybe").unwrap_err(), "invalid boolean value maybe");
        assert_eq!(check(&int(), "0x10").unwrap().as_i64(), Some(16));
        assert_eq!(check(&port(), 0_i64).unwrap_err(), "value must be at least 1");
        assert_eq!(
            check(&i2c_address(), 0x5A_i64).unwrap().value,
            Value::HexInt(0x5A)
        );
    }

    #[test]
    fn percentages() {
        assert_eq!(check(&percentage(), "50%").unwrap().value, Value::Float(0.5));
        assert_eq!(check(&percentage(), 1.5).unwrap_err(), "value must be at most 1");
    }

    #[test]
    fn lists_wrap_scalars() {
        let out = check(&ensure_list(), "x").unwrap();
        assert_eq!(out.as_seq().unwrap().len(), 1);
        assert!(check(&ensure_list(), Node::null()).unwrap().as_seq().unwrap().is_empty());
    }

    #[test]
    fn uuids_are_normalized() {
        assert_eq!(
            check(&uuid(), "C29CE823E67A4E71BFF2ABAA32E77A98").unwrap().as_str(),
            Some("c29ce823-e67a-4e71-bff2-abaa32e77a98")
        );
    }
}
