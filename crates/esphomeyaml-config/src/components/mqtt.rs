//! MQTT client: broker connection, discovery, status messages, log
//! forwarding and message triggers.

use esphomeyaml_codegen::builtin::{bool_, std_string, uint8, void};
use esphomeyaml_codegen::{ClassRef, CodegenContext, Expression, Halt, Id, Namespace};
use once_cell::sync::Lazy;
use regex::Regex;
use smol_str::SmolStr;

use crate::automation::{self, build_variable_item, templatable};
use crate::component::Component;
use crate::components::logger;
use crate::core_config;
use crate::cpp;
use crate::cv::{self, Schema, Validator};
use crate::error::Invalid;
use crate::node::{Node, Value};
use crate::registry::{ActionEntry, BuildEnv, BuildTriggerFn, Registries, RegistryError, TriggerEntry};

const DOMAIN: &str = "mqtt";
const DEFAULT_PORT: i64 = 1883;
const DEFAULT_DISCOVERY_PREFIX: &str = "homeassistant";

static FINGERPRINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{40}$").expect("static regex"));

fn mqtt_ns() -> Namespace {
    cpp::esphomelib_ns().namespace("mqtt")
}

fn client_component() -> ClassRef {
    mqtt_ns().class("MQTTClientComponent", &[&cpp::component()])
}

fn json_object_const_ref() -> ClassRef {
    ClassRef::new("JsonObject").constant().reference()
}

fn json_object_ref() -> ClassRef {
    ClassRef::new("JsonObject").reference()
}

fn message_base() -> Schema {
    Schema::new()
        .required("topic", cv::publish_topic())
        .optional_default("qos", Node::from(0_i64), cv::mqtt_qos())
        .optional_default("retain", Node::from(true), cv::boolean())
}

fn just_topic() -> Validator {
    let base: Validator = message_base().into();
    Validator::new(move |node, ctx| {
        let topic = cv::publish_topic().validate(node, ctx)?;
        base.validate(&node.with_value(Value::Map([("topic".into(), topic)].into_iter().collect())), ctx)
    })
}

/// Status message: null disables it, otherwise topic and payload.
fn message_schema() -> Validator {
    let full: Validator = message_base().required("payload", cv::mqtt_payload()).into();
    Validator::new(move |node, ctx| {
        if node.is_null() {
            return Ok(node.clone());
        }
        full.validate(node, ctx)
    })
}

fn log_topic_schema() -> Validator {
    let full: Validator = message_base().optional("level", cv::one_of_upper(logger::LOG_LEVELS)).into();
    let topic = just_topic();
    Validator::new(move |node, ctx| match &node.value {
        Value::Null => Ok(node.clone()),
        Value::Map(_) => full.validate(node, ctx),
        _ => topic.validate(node, ctx),
    })
}

fn validate_fingerprint() -> Validator {
    Validator::new(|node, ctx| {
        let value = cv::string().validate(node, ctx)?;
        if !FINGERPRINT.is_match(value.as_str().unwrap_or_default()) {
            return Err(Invalid::at(node, "fingerprint must be valid SHA1 hash"));
        }
        Ok(value)
    })
}

fn client_id() -> Validator {
    Validator::new(|node, ctx| {
        let value = cv::string().validate(node, ctx)?;
        if value.as_str().unwrap_or_default().chars().count() > 23 {
            return Err(Invalid::at(node, "length of value must be at most 23"));
        }
        Ok(value)
    })
}

/// Splits `host:port` in `broker:` when no explicit port is given.
fn validate_broker_port() -> Validator {
    Validator::new(|node, ctx| {
        let mut out = node.clone();
        let Some(map) = out.as_map_mut() else {
            return Err(Invalid::at(node, "expected dictionary"));
        };
        if map.contains_key("port") {
            return Ok(out);
        }
        let broker = map.get("broker").cloned().unwrap_or_else(Node::null);
        let text = broker.as_str().unwrap_or_default().to_string();
        let parts: Vec<&str> = text.split(':').collect();
        let port = if let [host, port] = parts.as_slice() {
            let port = cv::port().validate(&broker.with_value(Value::Str((*port).to_string())), ctx)?;
            map.insert("broker".into(), broker.with_value(Value::Str((*host).to_string())));
            port
        } else {
            broker.with_value(Value::Int(DEFAULT_PORT))
        };
        map.insert("port".into(), port);
        Ok(out)
    })
}

fn config_schema() -> Validator {
    cv::all(vec![
        Schema::new()
            .generate_id(client_component())
            .required("broker", cv::string_strict())
            .optional("port", cv::port())
            .optional_default("username", Node::from(""), cv::string())
            .optional_default("password", Node::from(""), cv::string())
            .optional("client_id", client_id())
            .optional("discovery", cv::any(vec![cv::boolean(), cv::one_of_upper(&["CLEAN"])]))
            .optional("discovery_retain", cv::boolean())
            .optional("discovery_prefix", cv::publish_topic())
            .optional("birth_message", message_schema())
            .optional("will_message", message_schema())
            .optional("shutdown_message", message_schema())
            .optional("topic_prefix", cv::publish_topic())
            .optional("log_topic", log_topic_schema())
            .optional(
                "ssl_fingerprints",
                cv::all(vec![cv::only_on_esp8266(), cv::list_of(validate_fingerprint())]),
            )
            .optional("keepalive", cv::positive_time_period_seconds())
            .optional("reboot_timeout", cv::positive_time_period_milliseconds())
            .optional("on_message", automation::trigger_automation("on_message"))
            .optional("on_json_message", automation::trigger_automation("on_json_message"))
            .into(),
        validate_broker_port(),
    ])
}

fn literal(config: &Node, key: &str) -> Option<Expression> {
    config.get(key).and_then(Node::to_expression)
}

fn message(config: &Node) -> Expression {
    let field = |key: &str, default: Expression| literal(config, key).unwrap_or(default);
    Expression::struct_init(
        &mqtt_ns().struct_("MQTTMessage"),
        vec![
            ("topic", field("topic", "".into())),
            ("payload", field("payload", "".into())),
            ("qos", field("qos", 0.into())),
            ("retain", field("retain", true.into())),
        ],
    )
}

fn fingerprint_bytes(fingerprint: &str) -> Expression {
    let bytes = fingerprint
        .as_bytes()
        .chunks(2)
        .map(|pair| Expression::raw(format!("0x{}", String::from_utf8_lossy(pair))))
        .collect();
    Expression::array(bytes)
}

fn to_code(config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let args = ["broker", "port", "username", "password"]
        .into_iter()
        .map(|key| literal(config, key).unwrap_or_else(|| "".into()))
        .collect();
    let mqtt = ctx.declare_pointer(id, cpp::app().method("init_mqtt", args))?;

    let discovery = config.get("discovery");
    let retain = config.get_bool("discovery_retain").unwrap_or(true);
    let prefix = config.get_str("discovery_prefix").unwrap_or(DEFAULT_DISCOVERY_PREFIX);
    match discovery.map(|node| &node.value) {
        Some(Value::Bool(false)) => ctx.add(mqtt.clone().method("disable_discovery", Vec::new())),
        Some(Value::Str(clean)) if clean == "CLEAN" => ctx.add(mqtt.clone().method(
            "set_discovery_info",
            vec![prefix.into(), retain.into(), true.into()],
        )),
        _ if config.contains_key("discovery_retain") || config.contains_key("discovery_prefix") => {
            ctx.add(mqtt.clone().method("set_discovery_info", vec![prefix.into(), retain.into()]));
        }
        _ => {}
    }

    if let Some(prefix) = config.get_str("topic_prefix") {
        ctx.add(mqtt.clone().method("set_topic_prefix", vec![prefix.into()]));
    }
    for (key, setter, disable) in [
        ("birth_message", "set_birth_message", "disable_birth_message"),
        ("will_message", "set_last_will", "disable_last_will"),
        ("shutdown_message", "set_shutdown_message", "disable_shutdown_message"),
    ] {
        match config.get(key) {
            Some(node) if node.is_null() => ctx.add(mqtt.clone().method(disable, Vec::new())),
            Some(node) => ctx.add(mqtt.clone().method(setter, vec![message(node)])),
            None => {}
        }
    }
    if let Some(client_id) = config.get_str("client_id") {
        ctx.add(mqtt.clone().method("set_client_id", vec![client_id.into()]));
    }
    match config.get("log_topic") {
        Some(node) if node.is_null() => ctx.add(mqtt.clone().method("disable_log_message", Vec::new())),
        Some(node) => {
            ctx.add(mqtt.clone().method("set_log_message_template", vec![message(node)]));
            if let Some(level) = node.get_str("level") {
                ctx.add(mqtt.clone().method(
                    "set_log_level",
                    vec![Expression::raw(format!("ESPHOMELIB_LOG_LEVEL_{level}"))],
                ));
            }
        }
        None => {}
    }
    let fingerprints = config.get_seq("ssl_fingerprints");
    for fingerprint in fingerprints {
        let bytes = fingerprint_bytes(fingerprint.as_str().unwrap_or_default());
        ctx.add(mqtt.clone().method("add_ssl_fingerprint", vec![bytes]));
    }
    if !fingerprints.is_empty() {
        ctx.add_build_flag("-DASYNC_TCP_SSL_ENABLED=1");
    }
    if let Some(keepalive) = literal(config, "keepalive") {
        ctx.add(mqtt.clone().method("set_keep_alive", vec![keepalive]));
    }
    if let Some(timeout) = literal(config, "reboot_timeout") {
        ctx.add(mqtt.clone().method("set_reboot_timeout", vec![timeout]));
    }
    automation::build_triggers(DOMAIN, config, &mqtt, env, ctx)
}

fn message_trigger(
    config: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let topic = literal(config, "topic").unwrap_or_else(|| "".into());
    let rhs = cpp::app().method(
        "register_component",
        vec![owner.clone().method("make_message_trigger", vec![topic])],
    );
    let trigger = ctx.declare_pointer(id, rhs)?;
    if let Some(qos) = literal(config, "qos") {
        ctx.add(trigger.clone().method("set_qos", vec![qos]));
    }
    if let Some(payload) = literal(config, "payload") {
        ctx.add(trigger.clone().method("set_payload", vec![payload]));
    }
    Ok(trigger)
}

fn json_message_trigger(
    config: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let topic = literal(config, "topic").unwrap_or_else(|| "".into());
    let qos = literal(config, "qos").unwrap_or_else(|| 0.into());
    let rhs = owner.clone().method("make_json_message_trigger", vec![topic, qos]);
    Ok(ctx.declare_pointer(id, rhs)?)
}

fn publish_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = mqtt_ns().class("MQTTPublishAction", &[&cpp::action()]);
    let action = build_variable_item(config, id, arg_type, "make_publish_action", &ty, ctx)?;
    for (key, setter, output) in [
        ("topic", "set_topic", std_string()),
        ("payload", "set_payload", std_string()),
        ("qos", "set_qos", uint8()),
        ("retain", "set_retain", bool_()),
    ] {
        if let Some(value) = config.get(key) {
            let value = templatable(value, arg_type, output, ctx)?;
            ctx.add(action.clone().method(setter, vec![value]));
        }
    }
    Ok(action)
}

fn publish_json_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = mqtt_ns().class("MQTTPublishJsonAction", &[&cpp::action()]);
    let action = build_variable_item(config, id, arg_type, "make_publish_json_action", &ty, ctx)?;
    if let Some(topic) = config.get("topic") {
        let topic = templatable(topic, arg_type, std_string(), ctx)?;
        ctx.add(action.clone().method("set_topic", vec![topic]));
    }
    if let Some(lambda) = config.get("payload").and_then(Node::as_lambda) {
        let payload = ctx.process_lambda(
            lambda,
            vec![
                (arg_type.clone(), SmolStr::new("x")),
                (json_object_ref(), SmolStr::new("root")),
            ],
            Some(void()),
        )?;
        ctx.add(action.clone().method("set_payload", vec![payload]));
    }
    for (key, setter) in [("qos", "set_qos"), ("retain", "set_retain")] {
        if let Some(value) = literal(config, key) {
            ctx.add(action.clone().method(setter, vec![value]));
        }
    }
    Ok(action)
}

fn register(registries: &mut Registries) -> Result<(), RegistryError> {
    let trigger = |ty: &str, arg_type: ClassRef, extra: Schema, build: BuildTriggerFn| TriggerEntry {
        owner: SmolStr::new(DOMAIN),
        trigger_type: mqtt_ns().class(ty, &[&cpp::trigger().template(&[&arg_type])]),
        arg_type,
        extra,
        build,
    };
    registries.triggers.register(
        "on_message",
        trigger(
            "MQTTMessageTrigger",
            std_string(),
            Schema::new()
                .required("topic", cv::subscribe_topic())
                .optional("qos", cv::mqtt_qos())
                .optional("payload", cv::string_strict()),
            message_trigger,
        ),
    )?;
    registries.triggers.register(
        "on_json_message",
        trigger(
            "MQTTJsonMessageTrigger",
            json_object_const_ref(),
            Schema::new()
                .required("topic", cv::subscribe_topic())
                .optional_default("qos", Node::from(0_i64), cv::mqtt_qos()),
            json_message_trigger,
        ),
    )?;

    let client = Schema::new().optional_default("id", Node::null(), cv::use_variable_id(client_component()));
    registries.actions.register(
        "mqtt.publish",
        ActionEntry {
            schema: client
                .clone()
                .required("topic", cv::templatable(cv::publish_topic()))
                .required("payload", cv::templatable(cv::mqtt_payload()))
                .optional("qos", cv::templatable(cv::mqtt_qos()))
                .optional("retain", cv::templatable(cv::boolean()))
                .into(),
            id_type: mqtt_ns().class("MQTTPublishAction", &[&cpp::action()]),
            build: publish_action,
        },
    )?;
    registries.actions.register(
        "mqtt.publish_json",
        ActionEntry {
            schema: client
                .required("topic", cv::templatable(cv::publish_topic()))
                .required("payload", cv::lambda())
                .optional("qos", cv::mqtt_qos())
                .optional("retain", cv::boolean())
                .into(),
            id_type: mqtt_ns().class("MQTTPublishJsonAction", &[&cpp::action()]),
            build: publish_json_action,
        },
    )
}

/// Per-entity MQTT options shared by every MQTT-backed component.
pub fn setup_mqtt_component(obj: &Expression, config: &Node, ctx: &mut CodegenContext) {
    if let Some(retain) = config.get_bool("retain") {
        ctx.add(obj.clone().method("set_retain", vec![retain.into()]));
    }
    if config.get_bool("discovery") == Some(false) {
        ctx.add(obj.clone().method("disable_discovery", Vec::new()));
    }
    if let Some(topic) = config.get_str("state_topic") {
        ctx.add(obj.clone().method("set_custom_state_topic", vec![topic.into()]));
    }
    if let Some(topic) = config.get_str("command_topic") {
        ctx.add(obj.clone().method("set_custom_command_topic", vec![topic.into()]));
    }
    match config.get("availability") {
        Some(node) if node.is_null() => ctx.add(obj.clone().method("disable_availability", Vec::new())),
        Some(node) => {
            let args = ["topic", "payload_available", "payload_not_available"]
                .into_iter()
                .map(|key| literal(node, key).unwrap_or_else(|| "".into()))
                .collect();
            ctx.add(obj.clone().method("set_availability", args));
        }
        None => {}
    }
}

/// Connection and topic settings the log tail and the maintenance
/// commands need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttSettings {
    /// Broker host.
    pub broker: String,
    /// Broker port.
    pub port: u16,
    /// Username, empty for anonymous access.
    pub username: String,
    /// Password.
    pub password: String,
    /// Client ID the device uses.
    pub client_id: Option<String>,
    /// Prefix of the device's topics.
    pub topic_prefix: String,
    /// Home Assistant discovery prefix.
    pub discovery_prefix: String,
    /// Topic log lines are published to; `None` when disabled.
    pub log_topic: Option<String>,
}

impl MqttSettings {
    /// Settings of the `mqtt:` section, `None` without one.
    #[must_use]
    pub fn from_config(full_config: &Node) -> Option<Self> {
        let mqtt = full_config.get(DOMAIN)?;
        let name = full_config
            .get(core_config::DOMAIN)
            .and_then(|core| core.get_str("name"))
            .unwrap_or_default();
        let topic_prefix = mqtt.get_str("topic_prefix").unwrap_or(name).to_string();
        let log_topic = match mqtt.get("log_topic") {
            Some(node) if node.is_null() => None,
            Some(node) => node.get_str("topic").map(ToString::to_string),
            None => Some(format!("{topic_prefix}/debug")),
        };
        let text = |key: &str| mqtt.get_str(key).unwrap_or_default().to_string();
        Some(Self {
            broker: text("broker"),
            port: mqtt
                .get_i64("port")
                .and_then(|port| u16::try_from(port).ok())
                .unwrap_or(1883),
            username: text("username"),
            password: text("password"),
            client_id: mqtt.get_str("client_id").map(ToString::to_string),
            discovery_prefix: mqtt
                .get_str("discovery_prefix")
                .unwrap_or(DEFAULT_DISCOVERY_PREFIX)
                .to_string(),
            topic_prefix,
            log_topic,
        })
    }
}

/// Descriptor of `mqtt:`.
#[must_use]
pub fn component() -> Component {
    Component::new(DOMAIN)
        .auto_load(&["json"])
        .schema(config_schema)
        .to_code(to_code)
        .register(register)
        .build_flags(&["-DUSE_MQTT"])
        .libraries(&["AsyncMqttClient@0.8.2"])
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate, validate_on};
    use crate::cv::test_support::ctx32;

    #[test]
    fn broker_port_is_split_out() {
        let config = validate(&config_schema(), Node::map([("broker", Node::from("10.0.0.2:1884"))])).unwrap();
        assert_eq!(config.get_str("broker"), Some("10.0.0.2"));
        assert_eq!(config.get_i64("port"), Some(1884));
        let config = validate(&config_schema(), Node::map([("broker", Node::from("broker.lan"))])).unwrap();
        assert_eq!(config.get_i64("port"), Some(1883));
    }

    #[test]
    fn fingerprints_are_checked() {
        let bad = Node::map([
            ("broker", Node::from("broker")),
            ("ssl_fingerprints", Node::from("abc")),
        ]);
        assert!(validate(&config_schema(), bad).unwrap_err().starts_with("fingerprint must be valid SHA1 hash"));
        let esp32 = Node::map([
            ("broker", Node::from("broker")),
            ("ssl_fingerprints", Node::from("a".repeat(40))),
        ]);
        assert!(validate_on(&config_schema(), esp32, ctx32())
            .unwrap_err()
            .starts_with("This feature is only available on"));
    }

    #[test]
    fn emits_client_and_messages() {
        let node = Node::map([
            ("broker", Node::from("10.0.0.2")),
            ("username", Node::from("dev")),
            ("discovery", Node::from(false)),
            ("birth_message", Node::null()),
            ("log_topic", Node::from("logs/node1")),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            mqtt::MQTTClientComponent *mqtt_mqttclientcomponent = App.init_mqtt("10.0.0.2", 1883, "dev", "");
            mqtt_mqttclientcomponent->disable_discovery();
            mqtt_mqttclientcomponent->disable_birth_message();
            mqtt_mqttclientcomponent->set_log_message_template(mqtt::MQTTMessage{
                .topic = "logs/node1",
                .payload = "",
                .qos = 0,
                .retain = true,
            });

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn settings_default_to_device_name() {
        let full = Node::map([
            ("esphomeyaml", Node::map([("name", Node::from("node1"))])),
            ("mqtt", Node::map([("broker", Node::from("b")), ("port", Node::from(1883_i64))])),
        ]);
        let settings = MqttSettings::from_config(&full).unwrap();
        assert_eq!(settings.topic_prefix, "node1");
        assert_eq!(settings.log_topic.as_deref(), Some("node1/debug"));
        assert_eq!(settings.discovery_prefix, "homeassistant");
        let full = Node::map([("mqtt", Node::map([("log_topic", Node::null())]))]);
        assert_eq!(MqttSettings::from_config(&full).unwrap().log_topic, None);
    }
}
