//! Binary sensor reading a GPIO pin.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Halt};

use super::{binary_sensor, binary_sensor_ns, platform_schema, setup_binary_sensor};
use crate::automation::unsupported;
use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Validator};
use crate::node::Node;
use crate::pins;
use crate::registry::BuildEnv;

fn gpio_binary_sensor() -> ClassRef {
    binary_sensor_ns().class("GPIOBinarySensorComponent", &[&binary_sensor(), &cpp::component()])
}

fn make_gpio_binary_sensor() -> ClassRef {
    cpp::esphomelib_ns()
        .namespace("Application")
        .struct_("MakeGPIOBinarySensor")
}

fn config_schema() -> Validator {
    cv::nameable(
        platform_schema()
            .generate_id(gpio_binary_sensor())
            .generate_id_key("make_id", make_gpio_binary_sensor())
            .required("pin", pins::gpio_input_pin_schema())
            .into(),
    )
}

fn to_code(config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let pin = config
        .get("pin")
        .ok_or_else(|| unsupported("gpio binary sensor without pin".to_string()))?;
    let pin = pins::gpio_input_pin_expression(pin, env, ctx)?;
    let make_id = config
        .get_id("make_id")
        .ok_or_else(|| unsupported("gpio binary sensor without make_id".to_string()))?;
    let name = config.get_str("name").unwrap_or_default();
    let rhs = cpp::app().method("make_gpio_binary_sensor", vec![name.into(), pin]);
    let make = ctx.declare_variable(make_id, rhs)?;
    setup_binary_sensor(
        make.clone().dot("Pgpio"),
        make.dot("Pmqtt"),
        config,
        env,
        ctx,
    )
}

/// Descriptor of `binary_sensor: [{platform: gpio}]`.
#[must_use]
pub fn component() -> Component {
    Component::new("binary_sensor.gpio")
        .schema(config_schema)
        .to_code(to_code)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn emits_sensor_and_filters() {
        let node = Node::map([
            ("platform", Node::from("gpio")),
            ("name", Node::from("Button")),
            ("pin", Node::map([("number", Node::from("D2")), ("inverted", Node::from(true))])),
            ("device_class", Node::from("door")),
            ("filters", Node::seq(vec![Node::map([("delayed_off", Node::from("1s"))])])),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            Application::MakeGPIOBinarySensor application_makegpiobinarysensor = App.make_gpio_binary_sensor("Button", GPIOInputPin(4, INPUT, true));
            binary_sensor::GPIOBinarySensorComponent *binary_sensor_gpiobinarysensorcomponent = application_makegpiobinarysensor.Pgpio;
            binary_sensor::MQTTBinarySensorComponent *binary_sensor_mqttbinarysensorcomponent = application_makegpiobinarysensor.Pmqtt;
            binary_sensor_gpiobinarysensorcomponent->set_device_class("door");
            binary_sensor_gpiobinarysensorcomponent->add_filters({App.register_component(new binary_sensor::DelayedOffFilter(1000))});

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn id_alone_names_an_internal_sensor() {
        let node = Node::map([
            ("platform", Node::from("gpio")),
            ("id", Node::from("door")),
            ("pin", Node::from(4_i64)),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        assert_eq!(config.get_str("name"), Some("door"));
        assert_eq!(config.get_bool("internal"), Some(true));
        let err = validate(
            &config_schema(),
            Node::map([("platform", Node::from("gpio")), ("pin", Node::from(4_i64))]),
        )
        .unwrap_err();
        assert_eq!(err, "At least one of 'id:' or 'name:' is required!");
    }
}
