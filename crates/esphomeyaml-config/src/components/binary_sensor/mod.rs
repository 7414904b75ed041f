//! Binary sensors: the shared entity schema, filters, press/click triggers
//! and `is_on`/`is_off` conditions. Hardware comes from the platforms below.

use esphomeyaml_codegen::builtin::bool_;
use esphomeyaml_codegen::{emit_task, ClassRef, CodegenContext, Expression, Halt, Id, Namespace};
use smol_str::SmolStr;
use tracing::debug;

use crate::automation::{self, build_variable_item, maybe_simple_id, unsupported};
use crate::component::Component;
use crate::components::mqtt;
use crate::cpp;
use crate::cv::{self, Schema, Validator};
use crate::node::Node;
use crate::registry::{
    item_entry, validate_registry_list, BuildEnv, BuildFilterFn, BuildTriggerFn, ConditionEntry,
    FilterEntry, Registries, RegistryError, TriggerEntry,
};

pub mod gpio;
pub mod mpr121;

const DOMAIN: &str = "binary_sensor";

/// Home Assistant device classes.
pub const DEVICE_CLASSES: &[&str] = &[
    "", "battery", "cold", "connectivity", "door", "garage_door", "gas", "heat", "light", "lock",
    "moisture", "motion", "moving", "occupancy", "opening", "plug", "power", "presence", "problem",
    "safety", "smoke", "sound", "vibration", "window",
];

const TRIGGER_KEYS: &[&str] = &["on_press", "on_release", "on_click", "on_double_click"];

pub(crate) fn binary_sensor_ns() -> Namespace {
    cpp::esphomelib_ns().namespace("binary_sensor")
}

/// `binary_sensor::BinarySensor`.
#[must_use]
pub fn binary_sensor() -> ClassRef {
    binary_sensor_ns().class("BinarySensor", &[&cpp::nameable()])
}

fn mqtt_binary_sensor() -> ClassRef {
    binary_sensor_ns().class("MQTTBinarySensorComponent", &[&cpp::mqtt_component()])
}

fn validate_filters() -> Validator {
    Validator::new(|node, ctx| {
        validate_registry_list(&ctx.registries.filters, None, node, ctx, |entry| {
            (&entry.schema, None)
        })
    })
}

/// Options every binary sensor platform accepts.
#[must_use]
pub fn binary_sensor_schema() -> Schema {
    cv::mqtt_component_schema()
        .generate_id_key("mqtt_id", mqtt_binary_sensor())
        .optional("device_class", cv::one_of_lower(DEVICE_CLASSES))
        .optional("filters", validate_filters())
        .optional("on_press", automation::trigger_automation("on_press"))
        .optional("on_release", automation::trigger_automation("on_release"))
        .optional("on_click", automation::trigger_automation("on_click"))
        .optional("on_double_click", automation::trigger_automation("on_double_click"))
        .optional(
            "inverted",
            cv::invalid(
                "The inverted binary_sensor property has been replaced by the new 'invert' \
                 binary  sensor filter. Please see \
                 https://esphomelib.com/esphomeyaml/components/binary_sensor/index.html.",
            ),
        )
}

/// `platform:` plus [`binary_sensor_schema`].
#[must_use]
pub fn platform_schema() -> Schema {
    cv::platform_schema().extend(&binary_sensor_schema())
}

fn build_filters(
    filters: &[Node],
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let registries = env.registries.clone();
    let mut out = Vec::with_capacity(filters.len());
    for filter in filters {
        let (key, value) = item_entry(filter, None)
            .ok_or_else(|| unsupported(format!("Unsupported filter {filter}")))?;
        let entry = registries
            .filters
            .get(key)
            .ok_or_else(|| unsupported(format!("Unknown filter {key}")))?;
        out.push((entry.build)(value, env, ctx)?);
    }
    Ok(Expression::array(out))
}

fn trigger_ids(config: &Node) -> Vec<SmolStr> {
    TRIGGER_KEYS
        .iter()
        .flat_map(|key| config.get_seq(key))
        .filter_map(|automation| automation.get_id("trigger_id"))
        .map(|id| SmolStr::new(id.as_str()))
        .collect()
}

fn setup_core(
    sensor: &Expression,
    mqtt_var: &Expression,
    config: &Node,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<(), Halt> {
    // Filters may wait on lambda IDs, so they are built before anything is emitted.
    let filters = config
        .get("filters")
        .map(|filters| build_filters(filters.as_seq().unwrap_or(&[]), env, ctx))
        .transpose()?;
    if let Some(internal) = config.get_bool("internal") {
        ctx.add(sensor.clone().method("set_internal", vec![internal.into()]));
    }
    if let Some(class) = config.get_str("device_class") {
        ctx.add(sensor.clone().method("set_device_class", vec![class.into()]));
    }
    if let Some(filters) = filters {
        ctx.add(sensor.clone().method("add_filters", vec![filters]));
    }
    automation::build_triggers(DOMAIN, config, sensor, env, ctx)?;
    mqtt::setup_mqtt_component(mqtt_var, config, ctx);
    Ok(())
}

fn queue_core(sensor: Expression, mqtt_var: Expression, config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) {
    let name = format!("binary_sensor {sensor}");
    let config = config.clone();
    let env = env.clone();
    ctx.add_job(emit_task(name, trigger_ids(&config), move |ctx| {
        debug!("Setting up binary sensor {sensor}");
        setup_core(&sensor, &mqtt_var, &config, &env, ctx)
    }));
}

fn ids(config: &Node) -> Result<(&Id, &Id), Halt> {
    let missing = |key: &str| unsupported(format!("binary sensor without {key}"));
    Ok((
        config.get_id("id").ok_or_else(|| missing("id"))?,
        config.get_id("mqtt_id").ok_or_else(|| missing("mqtt_id"))?,
    ))
}

/// Declare a sensor whose object and MQTT component the platform already
/// created, and queue the common setup.
pub fn setup_binary_sensor(
    sensor: Expression,
    mqtt_obj: Expression,
    config: &Node,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<(), Halt> {
    let (id, mqtt_id) = ids(config)?;
    let sensor = ctx.declare_pointer(id, sensor)?;
    let mqtt_var = ctx.declare_pointer(mqtt_id, mqtt_obj)?;
    queue_core(sensor, mqtt_var, config, env, ctx);
    Ok(())
}

/// Declare a sensor, register it with the application and queue the
/// common setup.
pub fn register_binary_sensor(
    sensor: Expression,
    config: &Node,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<(), Halt> {
    let (id, mqtt_id) = ids(config)?;
    let sensor = ctx.declare_pointer(id, sensor)?;
    let rhs = cpp::app().method("register_binary_sensor", vec![sensor.clone()]);
    let mqtt_var = ctx.declare_pointer(mqtt_id, rhs)?;
    queue_core(sensor, mqtt_var, config, env, ctx);
    Ok(())
}

fn time_ms(config: &Node, key: &str) -> Expression {
    config
        .get(key)
        .and_then(Node::to_expression)
        .unwrap_or_else(|| 0.into())
}

fn invert_filter(_: &Node, _: &BuildEnv, _: &mut CodegenContext) -> Result<Expression, Halt> {
    Ok(binary_sensor_ns().struct_("InvertFilter").new_instance(Vec::new()))
}

fn registered_filter(name: &str, value: &Node) -> Expression {
    let filter = binary_sensor_ns()
        .struct_(name)
        .new_instance(value.to_expression().into_iter().collect());
    cpp::app().method("register_component", vec![filter])
}

fn delayed_on_filter(value: &Node, _: &BuildEnv, _: &mut CodegenContext) -> Result<Expression, Halt> {
    Ok(registered_filter("DelayedOnFilter", value))
}

fn delayed_off_filter(value: &Node, _: &BuildEnv, _: &mut CodegenContext) -> Result<Expression, Halt> {
    Ok(registered_filter("DelayedOffFilter", value))
}

fn heartbeat_filter(value: &Node, _: &BuildEnv, _: &mut CodegenContext) -> Result<Expression, Halt> {
    Ok(registered_filter("HeartbeatFilter", value))
}

fn lambda_filter(value: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<Expression, Halt> {
    let lambda = value
        .as_lambda()
        .ok_or_else(|| unsupported("lambda filter without lambda".to_string()))?;
    let optional_bool = ClassRef::new("optional").template(&[&bool_()]);
    let lambda = ctx.process_lambda(
        lambda,
        vec![(bool_(), SmolStr::new("x"))],
        Some(optional_bool),
    )?;
    Ok(binary_sensor_ns()
        .struct_("LambdaFilter")
        .new_instance(vec![lambda]))
}

fn simple_trigger(factory: &'static str) -> impl Fn(&Expression) -> Expression {
    move |owner| owner.clone().method(factory, Vec::new())
}

fn press_trigger(
    _: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    Ok(ctx.declare_pointer(id, simple_trigger("make_press_trigger")(owner))?)
}

fn release_trigger(
    _: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    Ok(ctx.declare_pointer(id, simple_trigger("make_release_trigger")(owner))?)
}

fn double_click_trigger(
    _: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    Ok(ctx.declare_pointer(id, simple_trigger("make_double_click_trigger")(owner))?)
}

fn click_trigger(
    config: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let args = vec![time_ms(config, "min_length"), time_ms(config, "max_length")];
    Ok(ctx.declare_pointer(id, owner.clone().method("make_click_trigger", args))?)
}

fn is_on_condition(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = binary_sensor_ns().class("BinarySensorCondition", &[&cpp::condition()]);
    build_variable_item(config, id, arg_type, "make_binary_sensor_is_on_condition", &ty, ctx)
}

fn is_off_condition(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = binary_sensor_ns().class("BinarySensorCondition", &[&cpp::condition()]);
    build_variable_item(config, id, arg_type, "make_binary_sensor_is_off_condition", &ty, ctx)
}

fn register(registries: &mut Registries) -> Result<(), RegistryError> {
    let filters: [(&str, Validator, BuildFilterFn); 5] = [
        ("invert", cv::valid(), invert_filter),
        ("delayed_on", cv::positive_time_period_milliseconds(), delayed_on_filter),
        ("delayed_off", cv::positive_time_period_milliseconds(), delayed_off_filter),
        ("heartbeat", cv::positive_time_period_milliseconds(), heartbeat_filter),
        ("lambda", cv::lambda(), lambda_filter),
    ];
    for (name, schema, build) in filters {
        registries.filters.register(name, FilterEntry { schema, build })?;
    }

    let no_arg_trigger = cpp::trigger().template(&[&cpp::no_arg()]);
    let click_extra = Schema::new()
        .optional_default(
            "min_length",
            Node::from("50ms"),
            cv::positive_time_period_milliseconds(),
        )
        .optional_default(
            "max_length",
            Node::from("350ms"),
            cv::positive_time_period_milliseconds(),
        );
    let triggers: [(&str, &str, Schema, BuildTriggerFn); 4] = [
        ("on_press", "PressTrigger", Schema::new(), press_trigger),
        ("on_release", "ReleaseTrigger", Schema::new(), release_trigger),
        ("on_click", "ClickTrigger", click_extra, click_trigger),
        ("on_double_click", "DoubleClickTrigger", Schema::new(), double_click_trigger),
    ];
    for (key, ty, extra, build) in triggers {
        registries.triggers.register(
            key,
            TriggerEntry {
                owner: SmolStr::new(DOMAIN),
                trigger_type: binary_sensor_ns().class(ty, &[&no_arg_trigger]),
                arg_type: cpp::no_arg(),
                extra,
                build,
            },
        )?;
    }

    let condition_type = binary_sensor_ns().class("BinarySensorCondition", &[&cpp::condition()]);
    registries.conditions.register(
        "binary_sensor.is_on",
        ConditionEntry {
            schema: maybe_simple_id(binary_sensor()),
            id_type: condition_type.clone(),
            build: is_on_condition,
        },
    )?;
    registries.conditions.register(
        "binary_sensor.is_off",
        ConditionEntry {
            schema: maybe_simple_id(binary_sensor()),
            id_type: condition_type,
            build: is_off_condition,
        },
    )
}

/// Descriptor of the `binary_sensor:` platform host.
#[must_use]
pub fn component() -> Component {
    Component::new(DOMAIN)
        .platform_host()
        .register(register)
        .build_flags(&["-DUSE_BINARY_SENSOR"])
}

#[cfg(test)]
mod tests {
    use esphomeyaml_codegen::Lambda;
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::validate;
    use crate::node::Value;

    fn schema() -> Validator {
        platform_schema()
            .generate_id(binary_sensor())
            .into()
    }

    fn sensor(extra: Vec<(&str, Node)>) -> Node {
        let mut entries = vec![("platform", Node::from("gpio")), ("name", Node::from("Button"))];
        entries.extend(extra);
        Node::map(entries)
    }

    #[test]
    fn inverted_points_to_the_filter() {
        let err = validate(&schema(), sensor(vec![("inverted", Node::from(true))])).unwrap_err();
        assert!(err.starts_with("The inverted binary_sensor property has been replaced"), "{err}");
    }

    #[test]
    fn device_class_is_checked() {
        let ok = validate(&schema(), sensor(vec![("device_class", Node::from("Motion"))])).unwrap();
        assert_eq!(ok.get_str("device_class"), Some("motion"));
        assert!(validate(&schema(), sensor(vec![("device_class", Node::from("toaster"))])).is_err());
    }

    #[test]
    fn click_lengths_default() {
        let config = validate(
            &schema(),
            sensor(vec![(
                "on_click",
                Node::map([("lambda", Node::new(Value::Lambda(Lambda::new("return;"))))]),
            )]),
        )
        .unwrap();
        let click = &config.get_seq("on_click")[0];
        assert_eq!(click.get("min_length").and_then(Node::as_time).map(|t| t.value()), Some(50));
        assert_eq!(click.get("max_length").and_then(Node::as_time).map(|t| t.value()), Some(350));
    }

    #[test]
    fn filters_render_in_order() {
        let config = validate(
            &schema(),
            sensor(vec![(
                "filters",
                Node::seq(vec![
                    Node::map([("invert", Node::null())]),
                    Node::map([("delayed_on", Node::from("100ms"))]),
                ]),
            )]),
        )
        .unwrap();
        let env = BuildEnv {
            registries: crate::components::test_support::registries(),
            platform: cv::EspPlatform::Esp8266,
            config: std::sync::Arc::new(Node::empty_map()),
        };
        let mut ctx = CodegenContext::new();
        let filters = build_filters(config.get_seq("filters"), &env, &mut ctx).unwrap();
        expect![[r#"{new binary_sensor::InvertFilter(), App.register_component(new binary_sensor::DelayedOnFilter(100))}"#]]
            .assert_eq(&filters.to_string());
    }
}
