//! Binary output on a GPIO pin.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Halt};

use super::{binary_output, output_ns, platform_schema, setup_output_platform};
use crate::automation::unsupported;
use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Validator};
use crate::node::Node;
use crate::pins;
use crate::registry::BuildEnv;

fn gpio_output() -> ClassRef {
    output_ns().class("GPIOBinaryOutputComponent", &[&binary_output(), &cpp::component()])
}

fn config_schema() -> Validator {
    platform_schema()
        .required("id", cv::declare_variable_id(gpio_output()))
        .required("pin", pins::gpio_output_pin_schema())
        .into()
}

fn to_code(config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let missing = |key: &str| unsupported(format!("gpio output without {key}"));
    let pin = config.get("pin").ok_or_else(|| missing("pin"))?;
    let pin = pins::gpio_output_pin_expression(pin, env, ctx)?;
    let id = config.get_id("id").ok_or_else(|| missing("id"))?;
    let output = ctx.declare_pointer(id, cpp::app().method("make_gpio_output", vec![pin]))?;
    setup_output_platform(&output, config, ctx);
    Ok(())
}

/// Descriptor of `output: [{platform: gpio}]`.
#[must_use]
pub fn component() -> Component {
    Component::new("output.gpio")
        .schema(config_schema)
        .to_code(to_code)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn emits_output() {
        let node = Node::map([
            ("platform", Node::from("gpio")),
            ("id", Node::from("led")),
            ("pin", Node::map([("number", Node::from("D4")), ("mode", Node::from("OUTPUT_OPEN_DRAIN"))])),
            ("inverted", Node::from(true)),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            output::GPIOBinaryOutputComponent *led = App.make_gpio_output(GPIOOutputPin(2, OUTPUT_OPEN_DRAIN, false));
            led->set_inverted(true);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn id_is_required() {
        let node = Node::map([("platform", Node::from("gpio")), ("pin", Node::from(2_i64))]);
        assert!(validate(&config_schema(), node).unwrap_err().starts_with("required key not provided"));
    }
}
