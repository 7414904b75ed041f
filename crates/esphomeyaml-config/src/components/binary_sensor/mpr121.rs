//! Touch channel of an MPR121 hub.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Halt};

use super::{binary_sensor, binary_sensor_ns, platform_schema, register_binary_sensor};
use crate::automation::unsupported;
use crate::component::Component;
use crate::components::mpr121::mpr121_component;
use crate::cv::{self, ValidateContext, Validator};
use crate::error::Invalid;
use crate::node::Node;
use crate::registry::BuildEnv;

const MAX_CHANNEL: i64 = 11;

fn mpr121_channel() -> ClassRef {
    binary_sensor_ns().class("MPR121Channel", &[&binary_sensor()])
}

fn config_schema() -> Validator {
    cv::nameable(
        platform_schema()
            .generate_id(mpr121_channel())
            .optional_default("mpr121_id", Node::null(), cv::use_variable_id(mpr121_component()))
            .required("channel", cv::int_range(Some(0), Some(MAX_CHANNEL)))
            .into(),
    )
}

fn final_validate(config: &Node, full_config: &Node, _: &ValidateContext) -> Result<(), Invalid> {
    let (Some(hub), Some(channel)) = (config.get_id("mpr121_id"), config.get_i64("channel")) else {
        return Ok(());
    };
    let max = full_config
        .get_seq("mpr121")
        .iter()
        .find(|entry| entry.get_id("id").is_some_and(|id| id.as_str() == hub.as_str()))
        .and_then(|entry| entry.get_i64("max_touch_channel"))
        .unwrap_or(MAX_CHANNEL);
    if channel > max {
        return Err(Invalid::at(
            config,
            format!("Channel {channel} of {hub} is above its max_touch_channel ({max})."),
        ));
    }
    Ok(())
}

fn to_code(config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let hub_id = config
        .get_id("mpr121_id")
        .ok_or_else(|| unsupported("mpr121 channel without hub".to_string()))?;
    let hub = ctx.variable(hub_id)?;
    let name = config.get_str("name").unwrap_or_default();
    let channel = config.get_i64("channel").unwrap_or_default();
    let rhs = mpr121_channel().new_instance(vec![name.into(), channel.into()]);
    register_binary_sensor(hub.method("add_channel", vec![rhs]), config, env, ctx)
}

/// Descriptor of `binary_sensor: [{platform: mpr121}]`.
#[must_use]
pub fn component() -> Component {
    Component::new("binary_sensor.mpr121")
        .dependencies(&["mpr121"])
        .schema(config_schema)
        .final_validate(final_validate)
        .to_code(to_code)
}

#[cfg(test)]
mod tests {
    use esphomeyaml_codegen::{CodegenContext, Id};
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit_with, validate};
    use crate::cpp;
    use crate::cv::test_support::ctx;

    fn channel(channel: i64) -> Node {
        Node::map([
            ("platform", Node::from("mpr121")),
            ("name", Node::from("Pad")),
            ("mpr121_id", Node::from("touch")),
            ("channel", Node::from(channel)),
        ])
    }

    #[test]
    fn channel_range() {
        assert!(validate(&config_schema(), channel(11)).is_ok());
        assert!(validate(&config_schema(), channel(12)).is_err());
    }

    #[test]
    fn respects_hub_max_touch_channel() {
        let config = validate(&config_schema(), channel(7)).unwrap();
        let full = |max: i64| {
            Node::map([(
                "mpr121",
                Node::seq(vec![Node::map([
                    ("id", Node::new(crate::node::Value::Id(Id::declaration(Some("touch"), None)))),
                    ("max_touch_channel", Node::from(max)),
                ])]),
            )])
        };
        assert!(final_validate(&config, &full(8), &ctx()).is_ok());
        assert_eq!(
            final_validate(&config, &full(5), &ctx()).unwrap_err().to_string(),
            "Channel 7 of touch is above its max_touch_channel (5)."
        );
    }

    #[test]
    fn registers_channel_on_hub() {
        let config = validate(&config_schema(), channel(3)).unwrap();
        let setup = |ctx: &mut CodegenContext| -> Result<(), Halt> {
            let id = Id::declaration(Some("touch"), Some(mpr121_component()));
            ctx.declare_pointer(&id, cpp::app().method("make_mpr121", vec![0x5A_i64.into()]))?;
            Ok(())
        };
        expect![[r#"
            binary_sensor::MPR121Component *touch = App.make_mpr121(90);
            binary_sensor::MPR121Channel *binary_sensor_mpr121channel = touch->add_channel(new binary_sensor::MPR121Channel("Pad", 3));
            binary_sensor::MQTTBinarySensorComponent *binary_sensor_mqttbinarysensorcomponent = App.register_binary_sensor(binary_sensor_mpr121channel);

        "#]]
        .assert_eq(&emit_with(setup, to_code, &config));
    }
}
