//! Network values: hostnames, addresses and MQTT topics.

use super::primitives::{as_integer, as_string, as_strict_string};
use super::Validator;
use crate::node::{Node, Value};

/// Hostname of at most 63 characters.
#[must_use]
pub fn hostname() -> Validator {
    Validator::scalar(|node| {
        let text = as_string(node)?;
        if text.chars().count() > 63 {
            return Err("Hostnames can only be 63 characters long".to_string());
        }
        if !text.chars().all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-') {
            return Err("Hostname can only have alphanumeric characters and _ or -".to_string());
        }
        Ok(Value::Str(text))
    })
}

/// Domain suffix such as `.local`.
#[must_use]
pub fn domain_name() -> Validator {
    Validator::scalar(|node| {
        let text = as_string(node)?;
        if !text.starts_with('.') {
            return Err("Domain name must start with .".to_string());
        }
        if text.starts_with("..") {
            return Err("Domain name must start with single .".to_string());
        }
        if !text
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '.' | '_' | '-'))
        {
            return Err("Domain name can only have alphanumeric characters and _ or -".to_string());
        }
        Ok(Value::Str(text))
    })
}

/// WiFi network name.
#[must_use]
pub fn ssid() -> Validator {
    Validator::scalar(|node| {
        let text = match &node.value {
            Value::Null => return Err("SSID can not be None".to_string()),
            Value::Str(text) => text,
            _ => return Err("SSID must be a string. Did you wrap it in quotes?".to_string()),
        };
        if text.is_empty() {
            return Err("SSID can't be empty.".to_string());
        }
        if text.chars().count() > 31 {
            return Err("SSID can't be longer than 31 characters".to_string());
        }
        Ok(Value::Str(text.clone()))
    })
}

/// Dotted IPv4 address or list of four integers.
#[must_use]
pub fn ipv4() -> Validator {
    Validator::scalar(|node| {
        let parts: Vec<i64> = match &node.value {
            Value::Ip(bytes) => return Ok(Value::Ip(*bytes)),
            Value::Str(text) => text
                .split('.')
                .map(|part| part.trim().parse::<i64>())
                .collect::<Result<_, _>>()
                .map_err(|_| {
                    "IPv4 address must consist of four point-separated integers".to_string()
                })?,
            Value::Seq(items) => items
                .iter()
                .map(as_integer)
                .collect::<Result<_, _>>()?,
            _ => {
                return Err(
                    "IPv4 address must consist of either string or integer list".to_string()
                )
            }
        };
        if parts.len() != 4 {
            return Err("IPv4 address must consist of four point-separated integers".to_string());
        }
        let mut bytes = [0_u8; 4];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            *slot = u8::try_from(*part)
                .map_err(|_| "IPv4 address parts must be in range from 0 to 255".to_string())?;
        }
        Ok(Value::Ip(bytes))
    })
}

/// `XX:XX:XX:XX:XX:XX`.
#[must_use]
pub fn mac_address() -> Validator {
    Validator::scalar(|node| {
        let text = as_strict_string(node)?;
        let parts: Vec<&str> = text.split(':').collect();
        if parts.len() != 6 {
            return Err("MAC Address must consist of 6 : (colon) separated parts".to_string());
        }
        if parts.iter().any(|part| part.len() != 2) {
            return Err("MAC Address must be format XX:XX:XX:XX:XX:XX".to_string());
        }
        let mut bytes = [0_u8; 6];
        for (slot, part) in bytes.iter_mut().zip(&parts) {
            *slot = u8::from_str_radix(part, 16).map_err(|_| {
                "MAC Address parts must be hexadecimal values from 00 to FF".to_string()
            })?;
        }
        Ok(Value::Mac(bytes))
    })
}

fn valid_topic(node: &Node) -> Result<String, String> {
    if node.as_map().is_some() {
        return Err("Can't use dictionary with topic".to_string());
    }
    let text = as_string(node)?;
    if text.is_empty() {
        return Err("MQTT topic name/filter must not be empty.".to_string());
    }
    if text.len() > 65535 {
        return Err("MQTT topic name/filter must not be longer than 65535 encoded bytes.".to_string());
    }
    if text.contains('\0') {
        return Err("MQTT topic name/filter must not contain null character.".to_string());
    }
    Ok(text)
}

/// Topic filter usable for subscriptions (wildcards allowed).
#[must_use]
pub fn subscribe_topic() -> Validator {
    Validator::scalar(|node| {
        let text = valid_topic(node)?;
        let bytes = text.as_bytes();
        for (index, byte) in bytes.iter().enumerate() {
            if *byte != b'+' {
                continue;
            }
            let before_ok = index == 0 || bytes[index - 1] == b'/';
            let after_ok = index == bytes.len() - 1 || bytes[index + 1] == b'/';
            if !before_ok || !after_ok {
                return Err(
                    "Single-level wildcard must occupy an entire level of the filter".to_string(),
                );
            }
        }
        if let Some(index) = text.find('#') {
            if index != bytes.len() - 1 {
                return Err(
                    "Multi-level wildcard must be the last character in the topic filter."
                        .to_string(),
                );
            }
            if bytes.len() > 1 && bytes[index - 1] != b'/' {
                return Err(
                    "Multi-level wildcard must be after a topic level separator.".to_string(),
                );
            }
        }
        Ok(Value::Str(text))
    })
}

/// Topic name usable for publishing (no wildcards).
#[must_use]
pub fn publish_topic() -> Validator {
    Validator::scalar(|node| {
        let text = valid_topic(node)?;
        if text.contains('+') || text.contains('#') {
            return Err("Wildcards can not be used in topic names".to_string());
        }
        Ok(Value::Str(text))
    })
}

/// Payload string; null is the empty payload.
#[must_use]
pub fn mqtt_payload() -> Validator {
    Validator::scalar(|node| {
        if node.is_null() {
            return Ok(Value::Str(String::new()));
        }
        as_string(node).map(Value::Str)
    })
}

/// QoS 0, 1 or 2.
#[must_use]
pub fn mqtt_qos() -> Validator {
    Validator::scalar(|node| {
        let value = as_integer(node)
            .map_err(|_| format!("MQTT Quality of Service must be integer, got {node}"))?;
        if !(0..=2).contains(&value) {
            return Err(format!("Unknown value '{value}', must be one of '0', '1', '2'"));
        }
        Ok(Value::Int(value))
    })
}
