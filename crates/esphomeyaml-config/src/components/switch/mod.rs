//! Switches: the shared entity schema and the `switch.turn_on`,
//! `switch.turn_off` and `switch.toggle` actions.

use esphomeyaml_codegen::{emit_task, ClassRef, CodegenContext, Expression, Halt, Id, Namespace};

use crate::automation::{build_variable_item, maybe_simple_id, unsupported};
use crate::component::Component;
use crate::components::mqtt;
use crate::cpp;
use crate::cv::{self, Schema};
use crate::node::Node;
use crate::registry::{ActionEntry, BuildEnv, BuildFn, Registries, RegistryError};

pub mod gpio;

pub(crate) fn switch_ns() -> Namespace {
    cpp::esphomelib_ns().namespace("switch_")
}

/// `switch_::Switch`.
#[must_use]
pub fn switch() -> ClassRef {
    switch_ns().class("Switch", &[&cpp::nameable()])
}

/// Options every switch platform accepts.
#[must_use]
pub fn switch_schema() -> Schema {
    cv::mqtt_command_component_schema()
        .generate_id_key(
            "mqtt_id",
            switch_ns().class("MQTTSwitchComponent", &[&cpp::mqtt_component()]),
        )
        .optional("icon", cv::icon())
        .optional("inverted", cv::boolean())
}

/// `platform:` plus [`switch_schema`].
#[must_use]
pub fn platform_schema() -> Schema {
    cv::platform_schema().extend(&switch_schema())
}

fn setup_core(switch: &Expression, mqtt_var: &Expression, config: &Node, ctx: &mut CodegenContext) {
    if let Some(internal) = config.get_bool("internal") {
        ctx.add(switch.clone().method("set_internal", vec![internal.into()]));
    }
    if let Some(icon) = config.get_str("icon") {
        ctx.add(switch.clone().method("set_icon", vec![icon.into()]));
    }
    if let Some(inverted) = config.get_bool("inverted") {
        ctx.add(switch.clone().method("set_inverted", vec![inverted.into()]));
    }
    mqtt::setup_mqtt_component(mqtt_var, config, ctx);
}

/// Declare a switch and its MQTT component created by the platform and
/// queue the common setup.
pub fn setup_switch(
    switch: Expression,
    mqtt_obj: Expression,
    config: &Node,
    ctx: &mut CodegenContext,
) -> Result<(), Halt> {
    let missing = |key: &str| unsupported(format!("switch without {key}"));
    let id = config.get_id("id").ok_or_else(|| missing("id"))?;
    let mqtt_id = config.get_id("mqtt_id").ok_or_else(|| missing("mqtt_id"))?;
    let switch = ctx.declare_pointer(id, switch)?;
    let mqtt_var = ctx.declare_pointer(mqtt_id, mqtt_obj)?;
    let config = config.clone();
    ctx.add_job(emit_task(format!("switch {switch}"), Vec::new(), move |ctx| {
        setup_core(&switch, &mqtt_var, &config, ctx);
        Ok(())
    }));
    Ok(())
}

fn action(factory: &'static str, name: &str) -> impl Fn(&Node, &Id, &ClassRef, &mut CodegenContext) -> Result<Expression, Halt> {
    let ty = switch_ns().class(name, &[&cpp::action()]);
    move |config, id, arg_type, ctx| build_variable_item(config, id, arg_type, factory, &ty, ctx)
}

fn toggle_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    action("make_toggle_action", "ToggleAction")(config, id, arg_type, ctx)
}

fn turn_on_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    action("make_turn_on_action", "TurnOnAction")(config, id, arg_type, ctx)
}

fn turn_off_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    action("make_turn_off_action", "TurnOffAction")(config, id, arg_type, ctx)
}

fn register(registries: &mut Registries) -> Result<(), RegistryError> {
    let actions: [(&str, &str, BuildFn); 3] = [
        ("switch.toggle", "ToggleAction", toggle_action),
        ("switch.turn_on", "TurnOnAction", turn_on_action),
        ("switch.turn_off", "TurnOffAction", turn_off_action),
    ];
    for (key, ty, build) in actions {
        registries.actions.register(
            key,
            ActionEntry {
                schema: maybe_simple_id(switch()),
                id_type: switch_ns().class(ty, &[&cpp::action()]),
                build,
            },
        )?;
    }
    Ok(())
}

/// Descriptor of the `switch:` platform host.
#[must_use]
pub fn component() -> Component {
    Component::new("switch")
        .platform_host()
        .register(register)
        .build_flags(&["-DUSE_SWITCH"])
}
