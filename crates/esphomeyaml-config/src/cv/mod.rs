//! Composable configuration validators.
//!
//! A [`Validator`] turns a raw [`Node`] into its normalized form or fails
//! with a located [`Invalid`]. Validators compose through [`all`], [`any`]
//! and [`Schema`]; the primitive kinds live in the submodules and are
//! re-exported here so component schemas can write `cv::port()`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use smol_str::SmolStr;

use crate::error::{Invalid, InvalidKind, PathSegment};
use crate::node::{Map, Node, Value};
use crate::registry::Registries;

mod ids;
mod net;
mod primitives;
mod schema;
mod time;
mod units;

pub use ids::{declare_variable_id, use_variable_id, valid_id_name};
pub use net::{
    domain_name, hostname, ipv4, mac_address, mqtt_payload, mqtt_qos, publish_topic, ssid,
    subscribe_topic,
};
pub use primitives::{
    boolean, ensure_list, ensure_list_not_empty, file_path, float, hex_int, hex_uint16,
    hex_uint8, i2c_address, icon, int, int_range, lambda, percentage, port, positive_float,
    positive_int, positive_not_null_int, string, string_strict, uint16, uint32, uint8, uuid,
    valid_name, zero_to_one_float,
};
pub use schema::Schema;
pub use time::{
    positive_not_null_time_period, positive_time_period, positive_time_period_microseconds,
    positive_time_period_milliseconds, positive_time_period_seconds, time_period,
    time_period_microseconds, update_interval,
};
pub use units::{current, frequency, resistance, validate_bytes, voltage};

/// Target chip family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EspPlatform {
    /// ESP8266 (platformio `espressif8266`).
    Esp8266,
    /// ESP32 (platformio `espressif32`).
    Esp32,
}

impl EspPlatform {
    /// Both platforms.
    pub const ALL: [EspPlatform; 2] = [EspPlatform::Esp8266, EspPlatform::Esp32];

    /// Name as written in configuration files and the sidecar.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EspPlatform::Esp8266 => "ESP8266",
            EspPlatform::Esp32 => "ESP32",
        }
    }

    /// Parse `ESP8266`, `ESPRESSIF8266`, `ESP32` or `ESPRESSIF32`, ignoring
    /// case.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "ESP8266" | "ESPRESSIF8266" => Some(EspPlatform::Esp8266),
            "ESP32" | "ESPRESSIF32" => Some(EspPlatform::Esp32),
            _ => None,
        }
    }

    /// platformio platform name.
    #[must_use]
    pub fn platformio_name(self) -> &'static str {
        match self {
            EspPlatform::Esp8266 => "espressif8266",
            EspPlatform::Esp32 => "espressif32",
        }
    }
}

impl fmt::Display for EspPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Information validators may consult besides the node itself.
#[derive(Debug, Clone)]
pub struct ValidateContext {
    /// Active chip family.
    pub platform: EspPlatform,
    /// Board from the core section.
    pub board: SmolStr,
    /// Device name from the core section.
    pub name: SmolStr,
    /// Directory of the configuration file; relative paths resolve here.
    pub config_dir: PathBuf,
    /// Action, condition, filter, pin and trigger registries.
    pub registries: Arc<Registries>,
}

impl ValidateContext {
    /// Context with empty registries, mainly for tests.
    #[must_use]
    pub fn new(platform: EspPlatform, board: &str) -> Self {
        Self {
            platform,
            board: SmolStr::new(board),
            name: SmolStr::new("test"),
            config_dir: PathBuf::from("."),
            registries: Arc::new(Registries::default()),
        }
    }

    /// Replace the registries.
    #[must_use]
    pub fn with_registries(mut self, registries: Arc<Registries>) -> Self {
        self.registries = registries;
        self
    }
}

type ValidateFn = dyn Fn(&Node, &ValidateContext) -> Result<Node, Invalid> + Send + Sync;

/// Shared validation function.
#[derive(Clone)]
pub struct Validator(Arc<ValidateFn>);

impl Validator {
    /// Wrap a validation function.
    pub fn new(
        f: impl Fn(&Node, &ValidateContext) -> Result<Node, Invalid> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    /// Validator of a scalar that replaces the node value. Errors are
    /// reported at the node.
    pub fn scalar(f: impl Fn(&Node) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        Self::new(move |node, _| {
            f(node)
                .map(|value| node.with_value(value))
                .map_err(|message| Invalid::at(node, message))
        })
    }

    /// Run the validator.
    pub fn validate(&self, node: &Node, ctx: &ValidateContext) -> Result<Node, Invalid> {
        (self.0)(node, ctx)
    }

    /// Run `next` on the output of `self`.
    #[must_use]
    pub fn then(self, next: Validator) -> Validator {
        all(vec![self, next])
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Validator")
    }
}

impl From<Schema> for Validator {
    fn from(schema: Schema) -> Self {
        schema.into_validator()
    }
}

/// Accept anything unchanged.
#[must_use]
pub fn valid() -> Validator {
    Validator::new(|node, _| Ok(node.clone()))
}

/// Reject anything with `message`.
#[must_use]
pub fn invalid(message: &str) -> Validator {
    let message = message.to_string();
    Validator::new(move |node, _| Err(Invalid::at(node, message.clone())))
}

/// Run validators in sequence, each on the output of the previous one.
#[must_use]
pub fn all(validators: Vec<Validator>) -> Validator {
    Validator::new(move |node, ctx| {
        let mut current = node.clone();
        for validator in &validators {
            current = validator.validate(&current, ctx)?;
        }
        Ok(current)
    })
}

/// First validator that accepts. When all fail, the error that got deepest
/// into the input is reported.
#[must_use]
pub fn any(validators: Vec<Validator>) -> Validator {
    Validator::new(move |node, ctx| {
        let mut best: Option<Invalid> = None;
        for validator in &validators {
            match validator.validate(node, ctx) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if best.as_ref().is_none_or(|b| err.depth() > b.depth()) {
                        best = Some(err);
                    }
                }
            }
        }
        Err(best.unwrap_or_else(|| Invalid::at(node, "no valid value")))
    })
}

/// Accept null as-is, validate everything else.
#[must_use]
pub fn nullable(validator: Validator) -> Validator {
    Validator::new(move |node, ctx| {
        if node.is_null() {
            Ok(node.clone())
        } else {
            validator.validate(node, ctx)
        }
    })
}

/// Map every item of a list (a scalar or mapping is wrapped first; null is
/// the empty list).
#[must_use]
pub fn list_of(item: Validator) -> Validator {
    ensure_list().then(validate_items(item))
}

/// Map every item of a list without wrapping.
#[must_use]
pub fn validate_items(item: Validator) -> Validator {
    Validator::new(move |node, ctx| {
        let Some(items) = node.as_seq() else {
            return Err(Invalid::at(node, "expected a list"));
        };
        let mut out = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (index, child) in items.iter().enumerate() {
            match item.validate(child, ctx) {
                Ok(value) => out.push(value),
                Err(err) => errors.push(err.prefixed(PathSegment::Index(index))),
            }
        }
        match Invalid::merge(errors) {
            Some(err) => Err(err),
            None => Ok(node.with_value(Value::Seq(out))),
        }
    })
}

/// Accept a lambda as-is, otherwise run `validator`.
#[must_use]
pub fn templatable(validator: Validator) -> Validator {
    Validator::new(move |node, ctx| {
        if node.as_lambda().is_some() {
            Ok(node.clone())
        } else {
            validator.validate(node, ctx)
        }
    })
}

/// Accept the full mapping form, or a scalar that becomes `{key: scalar}`.
#[must_use]
pub fn maybe_simple_value(key: &str, schema: Validator) -> Validator {
    let key = SmolStr::new(key);
    Validator::new(move |node, ctx| {
        if node.as_map().is_some() {
            return schema.validate(node, ctx);
        }
        let wrapped = node.with_value(Value::Map(Map::from_iter([(key.clone(), node.clone())])));
        schema.validate(&wrapped, ctx)
    })
}

/// Value must be one of `options`.
#[must_use]
pub fn one_of(options: &[&str]) -> Validator {
    one_of_impl(options, Case::Exact)
}

/// [`one_of`] comparing upper-cased input.
#[must_use]
pub fn one_of_upper(options: &[&str]) -> Validator {
    one_of_impl(options, Case::Upper)
}

/// [`one_of`] comparing lower-cased input.
#[must_use]
pub fn one_of_lower(options: &[&str]) -> Validator {
    one_of_impl(options, Case::Lower)
}

#[derive(Clone, Copy)]
enum Case {
    Exact,
    Upper,
    Lower,
}

fn one_of_impl(options: &[&str], case: Case) -> Validator {
    let options: Vec<String> = options.iter().map(ToString::to_string).collect();
    let rendered = options
        .iter()
        .map(|option| format!("'{option}'"))
        .collect::<Vec<_>>()
        .join(", ");
    Validator::scalar(move |node| {
        let text = match &node.value {
            Value::Str(text) => match case {
                Case::Exact => text.clone(),
                Case::Upper => text.to_uppercase(),
                Case::Lower => text.to_lowercase(),
            },
            Value::Int(_) | Value::Float(_) | Value::Bool(_) => node.to_string(),
            _ => return Err(format!("Unknown value '{node}', must be one of {rendered}")),
        };
        if options.contains(&text) {
            Ok(Value::Str(text))
        } else {
            Err(format!("Unknown value '{text}', must be one of {rendered}"))
        }
    })
}

fn expect_map<'a>(node: &'a Node) -> Result<&'a Map, Invalid> {
    node.as_map().ok_or_else(|| Invalid::at(node, "expected dictionary"))
}

fn count_keys(map: &Map, keys: &[&str]) -> usize {
    keys.iter().filter(|key| map.contains_key(**key)).count()
}

/// Mapping must contain at least one of `keys`.
#[must_use]
pub fn has_at_least_one_key(keys: &[&str]) -> Validator {
    let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
    Validator::new(move |node, _| {
        let map = expect_map(node)?;
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        if count_keys(map, &refs) == 0 {
            return Err(Invalid::at(
                node,
                format!("Must contain at least one of {}.", refs.join(", ")),
            ));
        }
        Ok(node.clone())
    })
}

/// Mapping must contain exactly one of `keys`.
#[must_use]
pub fn has_exactly_one_key(keys: &[&str]) -> Validator {
    let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
    Validator::new(move |node, _| {
        let map = expect_map(node)?;
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        match count_keys(map, &refs) {
            1 => Ok(node.clone()),
            0 => Err(Invalid::at(
                node,
                format!("Must contain exactly one of {}.", refs.join(", ")),
            )),
            _ => Err(Invalid::at(
                node,
                format!("Cannot specify more than one of {}.", refs.join(", ")),
            )),
        }
    })
}

/// Mapping may contain at most one of `keys`.
#[must_use]
pub fn has_at_most_one_key(keys: &[&str]) -> Validator {
    let keys: Vec<String> = keys.iter().map(ToString::to_string).collect();
    Validator::new(move |node, _| {
        let map = expect_map(node)?;
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        if count_keys(map, &refs) > 1 {
            return Err(Invalid::at(
                node,
                format!("Cannot specify more than one of {}.", refs.join(", ")),
            ));
        }
        Ok(node.clone())
    })
}

/// Feature restricted to some chip families.
#[must_use]
pub fn only_on(platforms: &[EspPlatform]) -> Validator {
    let platforms = platforms.to_vec();
    Validator::new(move |node, ctx| {
        if platforms.contains(&ctx.platform) {
            Ok(node.clone())
        } else {
            let names: Vec<String> = platforms.iter().map(|p| format!("'{p}'")).collect();
            Err(Invalid::at(
                node,
                format!("This feature is only available on [{}]", names.join(", ")),
            ))
        }
    })
}

/// [`only_on`] ESP32.
#[must_use]
pub fn only_on_esp32() -> Validator {
    only_on(&[EspPlatform::Esp32])
}

/// [`only_on`] ESP8266.
#[must_use]
pub fn only_on_esp8266() -> Validator {
    only_on(&[EspPlatform::Esp8266])
}

/// Require `name` or a manual `id`. Without a name the ID doubles as name
/// and the entity is marked internal.
#[must_use]
pub fn nameable(schema: Validator) -> Validator {
    Validator::new(move |node, ctx| {
        let mut out = schema.validate(node, ctx)?;
        let message = "At least one of 'id:' or 'name:' is required!";
        if out.contains_key("name") {
            return Ok(out);
        }
        let Some(id) = out.get_id("id").filter(|id| id.is_manual()).cloned() else {
            return Err(Invalid::at(node, message));
        };
        if let Some(map) = out.as_map_mut() {
            map.insert("name".into(), Node::from(id.as_str()));
            map.insert("internal".into(), Node::from(true));
        }
        Ok(out)
    })
}

/// Platform entry base: `platform:` is required and passed through.
#[must_use]
pub fn platform_schema() -> Schema {
    Schema::new().required("platform", valid())
}

/// Common MQTT-backed entity options.
#[must_use]
pub fn mqtt_component_schema() -> Schema {
    let availability = Schema::new()
        .required("topic", subscribe_topic())
        .optional_default("payload_available", Node::from("online"), mqtt_payload())
        .optional_default("payload_not_available", Node::from("offline"), mqtt_payload());
    Schema::new()
        .optional("name", string())
        .optional("retain", boolean())
        .optional("discovery", boolean())
        .optional("state_topic", publish_topic())
        .optional("availability", nullable(availability.into()))
        .optional("internal", boolean())
}

/// [`mqtt_component_schema`] plus a command topic.
#[must_use]
pub fn mqtt_command_component_schema() -> Schema {
    mqtt_component_schema().optional("command_topic", subscribe_topic())
}

/// Error shorthand with a kind.
pub(crate) fn kind_error(kind: InvalidKind, key: &SmolStr, node: &Node) -> Invalid {
    Invalid::of_kind(kind, vec![PathSegment::Key(key.clone())], node.mark.clone())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn ctx() -> ValidateContext {
        ValidateContext::new(EspPlatform::Esp8266, "nodemcuv2")
    }

    pub fn ctx32() -> ValidateContext {
        ValidateContext::new(EspPlatform::Esp32, "nodemcu-32s")
    }

    pub fn check(validator: &Validator, node: impl Into<Node>) -> Result<Node, String> {
        validator.validate(&node.into(), &ctx()).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{check, ctx32};
    use super::*;

    #[test]
    fn any_reports_deepest_error() {
        let validator = any(vec![
            int(),
            Schema::new().required("a", int()).into(),
        ]);
        let err = check(&validator, Node::map([("a", Node::from("x"))])).unwrap_err();
        assert!(err.ends_with("@ a"), "{err}");
    }

    #[test]
    fn key_predicates() {
        let node = Node::map([("a", Node::from(1_i64)), ("b", Node::from(2_i64))]);
        assert_eq!(
            check(&has_exactly_one_key(&["a", "b"]), node.clone()).unwrap_err(),
            "Cannot specify more than one of a, b."
        );
        assert!(check(&has_at_least_one_key(&["b", "c"]), node.clone()).is_ok());
        assert_eq!(
            check(&has_exactly_one_key(&["c", "d"]), node.clone()).unwrap_err(),
            "Must contain exactly one of c, d."
        );
        assert!(check(&has_at_most_one_key(&["c", "d"]), node).is_ok());
    }

    #[test]
    fn one_of_lists_options() {
        assert_eq!(
            check(&one_of(&["qio", "dio"]), "foo").unwrap_err(),
            "Unknown value 'foo', must be one of 'qio', 'dio'"
        );
        assert_eq!(
            check(&one_of_upper(&["DEBUG"]), "debug").unwrap().as_str(),
            Some("DEBUG")
        );
    }

    #[test]
    fn only_on_checks_platform() {
        let validator = only_on_esp32();
        assert_eq!(
            check(&validator, "x").unwrap_err(),
            "This feature is only available on ['ESP32']"
        );
        assert!(validator.validate(&Node::from("x"), &ctx32()).is_ok());
    }

    #[test]
    fn nameable_falls_back_to_manual_id() {
        let schema = nameable(
            Schema::new()
                .optional("name", string())
                .generate_id(esphomeyaml_codegen::ClassRef::new("Foo"))
                .into(),
        );
        let out = check(&schema, Node::map([("id", Node::from("door"))])).unwrap();
        assert_eq!(out.get_str("name"), Some("door"));
        assert_eq!(out.get_bool("internal"), Some(true));
        assert_eq!(
            check(&schema, Node::empty_map()).unwrap_err(),
            "At least one of 'id:' or 'name:' is required!"
        );
    }

    #[test]
    fn maybe_simple_wraps_scalars() {
        let schema = maybe_simple_value("id", Schema::new().required("id", string()).into());
        let out = check(&schema, "relay").unwrap();
        assert_eq!(out.get_str("id"), Some("relay"));
    }

    #[test]
    fn platform_names() {
        assert_eq!(EspPlatform::parse("espressif32"), Some(EspPlatform::Esp32));
        assert_eq!(EspPlatform::parse("esp8266"), Some(EspPlatform::Esp8266));
        assert_eq!(EspPlatform::parse("avr"), None);
    }
}
