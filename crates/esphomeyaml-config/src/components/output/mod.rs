//! Binary outputs and the `output.turn_on`/`output.turn_off` actions.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Expression, Halt, Id, Namespace};

use crate::automation::{build_variable_item, maybe_simple_id};
use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Schema};
use crate::node::Node;
use crate::registry::{ActionEntry, BuildEnv, Registries, RegistryError};

pub mod gpio;

pub(crate) fn output_ns() -> Namespace {
    cpp::esphomelib_ns().namespace("output")
}

/// `output::BinaryOutput`.
#[must_use]
pub fn binary_output() -> ClassRef {
    output_ns().struct_("BinaryOutput")
}

/// `platform:` plus the options every binary output accepts.
#[must_use]
pub fn platform_schema() -> Schema {
    cv::platform_schema().optional("inverted", cv::boolean())
}

/// Apply the common output options to `output`.
pub fn setup_output_platform(output: &Expression, config: &Node, ctx: &mut CodegenContext) {
    if let Some(inverted) = config.get_bool("inverted") {
        ctx.add(output.clone().method("set_inverted", vec![inverted.into()]));
    }
}

fn turn_on_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = output_ns().class("TurnOnAction", &[&cpp::action()]);
    build_variable_item(config, id, arg_type, "make_turn_on_action", &ty, ctx)
}

fn turn_off_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = output_ns().class("TurnOffAction", &[&cpp::action()]);
    build_variable_item(config, id, arg_type, "make_turn_off_action", &ty, ctx)
}

fn register(registries: &mut Registries) -> Result<(), RegistryError> {
    registries.actions.register(
        "output.turn_on",
        ActionEntry {
            schema: maybe_simple_id(binary_output()),
            id_type: output_ns().class("TurnOnAction", &[&cpp::action()]),
            build: turn_on_action,
        },
    )?;
    registries.actions.register(
        "output.turn_off",
        ActionEntry {
            schema: maybe_simple_id(binary_output()),
            id_type: output_ns().class("TurnOffAction", &[&cpp::action()]),
            build: turn_off_action,
        },
    )
}

/// Descriptor of the `output:` platform host.
#[must_use]
pub fn component() -> Component {
    Component::new("output")
        .platform_host()
        .register(register)
        .build_flags(&["-DUSE_OUTPUT"])
}
