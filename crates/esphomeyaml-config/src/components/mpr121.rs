//! MPR121 capacitive touch controller on the I²C bus.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Halt};
use rustc_hash::FxHashSet;

use crate::component::Component;
use crate::components::binary_sensor::binary_sensor_ns;
use crate::cpp;
use crate::cv::{self, Schema, ValidateContext, Validator};
use crate::error::Invalid;
use crate::node::Node;
use crate::registry::BuildEnv;

const DEFAULT_ADDRESS: i64 = 0x5A;

/// `binary_sensor::MPR121Component`.
#[must_use]
pub fn mpr121_component() -> ClassRef {
    binary_sensor_ns().class("MPR121Component", &[&cpp::component()])
}

fn config_schema() -> Validator {
    Schema::new()
        .generate_id(mpr121_component())
        .optional_default("address", Node::from(DEFAULT_ADDRESS), cv::i2c_address())
        .optional("max_touch_channel", cv::int_range(Some(3), Some(11)))
        .into()
}

/// Channels of the `mpr121` binary sensors wired to `hub`.
pub(crate) fn channels_of<'a>(full_config: &'a Node, hub: &str) -> impl Iterator<Item = &'a Node> + 'a {
    let hub = hub.to_string();
    full_config
        .get_seq("binary_sensor")
        .iter()
        .filter(|entry| entry.get_str("platform") == Some("mpr121"))
        .filter(move |entry| entry.get_id("mpr121_id").is_some_and(|id| id.as_str() == hub))
}

fn final_validate(config: &Node, full_config: &Node, _: &ValidateContext) -> Result<(), Invalid> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let mut seen = FxHashSet::default();
    for entry in channels_of(full_config, id.as_str()) {
        let Some(channel) = entry.get_i64("channel") else {
            continue;
        };
        if !seen.insert(channel) {
            return Err(Invalid::at(
                entry,
                format!("Channel {channel} of {id} is used by more than one binary sensor."),
            ));
        }
    }
    Ok(())
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let address = config
        .get("address")
        .and_then(Node::to_expression)
        .unwrap_or_else(|| DEFAULT_ADDRESS.into());
    let hub = ctx.declare_pointer(id, cpp::app().method("make_mpr121", vec![address]))?;
    if let Some(max) = config.get_i64("max_touch_channel") {
        ctx.add(hub.method("set_max_touch_channel", vec![max.into()]));
    }
    Ok(())
}

/// Descriptor of `mpr121:`.
#[must_use]
pub fn component() -> Component {
    Component::new("mpr121")
        .dependencies(&["i2c"])
        .auto_load(&["binary_sensor"])
        .multi_conf()
        .schema(config_schema)
        .final_validate(final_validate)
        .to_code(to_code)
        .build_flags(&["-DUSE_MPR121"])
}
