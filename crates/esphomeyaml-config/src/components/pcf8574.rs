//! PCF8574/PCF8575 I/O expander. Its pins are used anywhere a GPIO pin is
//! accepted by adding `pcf8574: <hub id>` to the pin mapping.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Expression, Halt, Namespace};

use crate::automation::unsupported;
use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Schema, ValidateContext, Validator};
use crate::error::Invalid;
use crate::node::Node;
use crate::registry::{BuildEnv, PinDirection, PinEntry, Registries, RegistryError};

const DOMAIN: &str = "pcf8574";

fn io_ns() -> Namespace {
    cpp::esphomelib_ns().namespace("io")
}

fn pcf8574_component() -> ClassRef {
    io_ns().class("PCF8574Component", &[&cpp::component()])
}

fn config_schema() -> Validator {
    Schema::new()
        .required("id", cv::declare_variable_id(pcf8574_component()))
        .optional_default("address", Node::from(0x21_i64), cv::i2c_address())
        .optional_default("pcf8575", Node::from(false), cv::boolean())
        .into()
}

fn pin_schema(modes: &[&str]) -> Validator {
    Schema::new()
        .required(DOMAIN, cv::use_variable_id(pcf8574_component()))
        .required("number", cv::int_range(Some(0), Some(15)))
        .optional("mode", cv::one_of_upper(modes))
        .optional_default("inverted", Node::from(false), cv::boolean())
        .into()
}

fn build_pin(
    conf: &Node,
    direction: PinDirection,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let hub_id = conf
        .get_id(DOMAIN)
        .ok_or_else(|| unsupported("pcf8574 pin without hub".to_string()))?;
    let hub = ctx.variable(hub_id)?;
    let number = conf.get_i64("number").unwrap_or_default().into();
    let inverted = conf.get_bool("inverted").unwrap_or(false).into();
    Ok(match direction {
        PinDirection::Input => {
            let mode = conf.get_str("mode").unwrap_or("INPUT");
            let mode = io_ns().member(&format!("PCF8574_{mode}"));
            hub.method("make_input_pin", vec![number, mode, inverted])
        }
        PinDirection::Output => hub.method("make_output_pin", vec![number, inverted]),
    })
}

fn register(registries: &mut Registries) -> Result<(), RegistryError> {
    registries.pins.register(
        DOMAIN,
        PinEntry {
            input_schema: pin_schema(&["INPUT", "INPUT_PULLUP"]),
            output_schema: pin_schema(&["OUTPUT"]),
            build: build_pin,
        },
    )
}

/// The 8-bit variant only has pins 0 to 7.
fn final_validate(config: &Node, full_config: &Node, _: &ValidateContext) -> Result<(), Invalid> {
    let (Some(id), false) = (config.get_id("id"), config.get_bool("pcf8575").unwrap_or(false)) else {
        return Ok(());
    };
    let mut error = None;
    full_config.visit(&mut |node| {
        let on_hub = node.get_id(DOMAIN).is_some_and(|hub| hub.as_str() == id.as_str());
        match node.get_i64("number") {
            Some(number) if on_hub && number > 7 && error.is_none() => {
                error = Some(Invalid::at(
                    node,
                    format!("Pin {number} does not exist on {id}, set pcf8575: true for a PCF8575."),
                ));
            }
            _ => {}
        }
    });
    error.map_or(Ok(()), Err)
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let args = vec![
        config.get("address").and_then(Node::to_expression).unwrap_or_else(|| 0x21_i64.into()),
        config.get_bool("pcf8575").unwrap_or(false).into(),
    ];
    ctx.declare_pointer(id, cpp::app().method("make_pcf8574_component", args))?;
    Ok(())
}

/// Descriptor of `pcf8574:`.
#[must_use]
pub fn component() -> Component {
    Component::new(DOMAIN)
        .dependencies(&["i2c"])
        .multi_conf()
        .schema(config_schema)
        .final_validate(final_validate)
        .to_code(to_code)
        .register(register)
        .build_flags(&["-DUSE_PCF8574"])
}

#[cfg(test)]
mod tests {
    use esphomeyaml_codegen::{CodegenContext, Id};
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, registries, validate};
    use crate::cv::test_support::ctx;
    use crate::cv::EspPlatform;
    use crate::pins;

    fn expander_pin(number: i64) -> Node {
        Node::map([
            ("pcf8574", Node::from("hub")),
            ("number", Node::from(number)),
            ("mode", Node::from("input_pullup")),
        ])
    }

    #[test]
    fn hub_declaration() {
        let config = validate(&config_schema(), Node::map([("id", Node::from("hub"))])).unwrap();
        expect![[r#"
            io::PCF8574Component *hub = App.make_pcf8574_component(0x21, false);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn gpio_schema_dispatches_to_expander() {
        let pin = validate(&pins::gpio_input_pin_schema(), expander_pin(3)).unwrap();
        assert_eq!(pin.get_str("mode"), Some("INPUT_PULLUP"));
        let err = validate(&pins::gpio_output_pin_schema(), expander_pin(3)).unwrap_err();
        assert!(err.starts_with("Unknown value 'INPUT_PULLUP'"), "{err}");

        let env = BuildEnv {
            registries: registries(),
            platform: EspPlatform::Esp8266,
            config: std::sync::Arc::new(Node::empty_map()),
        };
        let mut ctx = CodegenContext::new();
        let hub = Id::declaration(Some("hub"), Some(pcf8574_component()));
        ctx.declare_pointer(&hub, cpp::app().method("make_pcf8574_component", Vec::new()))
            .unwrap();
        let expr = pins::gpio_input_pin_expression(&pin, &env, &mut ctx).unwrap();
        assert_eq!(expr.to_string(), "hub->make_input_pin(3, io::PCF8574_INPUT_PULLUP, false)");
    }

    #[test]
    fn eight_bit_variant_has_eight_pins() {
        let hub = validate(&config_schema(), Node::map([("id", Node::from("hub"))])).unwrap();
        let with_pin = |number: i64| {
            let pin = validate(&pins::gpio_input_pin_schema(), expander_pin(number)).unwrap();
            Node::map([("binary_sensor", Node::seq(vec![Node::map([("pin", pin)])]))])
        };
        assert!(final_validate(&hub, &with_pin(7), &ctx()).is_ok());
        assert_eq!(
            final_validate(&hub, &with_pin(9), &ctx()).unwrap_err().to_string(),
            "Pin 9 does not exist on hub, set pcf8575: true for a PCF8575."
        );
    }
}
