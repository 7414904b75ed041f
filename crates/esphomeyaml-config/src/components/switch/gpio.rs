//! Switch driving a GPIO pin.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Halt};

use super::{platform_schema, setup_switch, switch, switch_ns};
use crate::automation::unsupported;
use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Validator};
use crate::node::Node;
use crate::pins;
use crate::registry::BuildEnv;

const RESTORE_MODES: &[&str] = &[
    "RESTORE_DEFAULT_OFF",
    "RESTORE_DEFAULT_ON",
    "ALWAYS_OFF",
    "ALWAYS_ON",
];

fn gpio_switch() -> ClassRef {
    switch_ns().class("GPIOSwitch", &[&switch(), &cpp::component()])
}

fn config_schema() -> Validator {
    cv::nameable(
        platform_schema()
            .generate_id(gpio_switch())
            .generate_id_key(
                "make_id",
                cpp::esphomelib_ns().namespace("Application").struct_("MakeGPIOSwitch"),
            )
            .required("pin", pins::gpio_output_pin_schema())
            .optional("restore_mode", cv::one_of_upper(RESTORE_MODES))
            .into(),
    )
}

fn to_code(config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let pin = config
        .get("pin")
        .ok_or_else(|| unsupported("gpio switch without pin".to_string()))?;
    let pin = pins::gpio_output_pin_expression(pin, env, ctx)?;
    let make_id = config
        .get_id("make_id")
        .ok_or_else(|| unsupported("gpio switch without make_id".to_string()))?;
    let name = config.get_str("name").unwrap_or_default();
    let make = ctx.declare_variable(make_id, cpp::app().method("make_gpio_switch", vec![name.into(), pin]))?;
    let gpio = make.clone().dot("Pswitch_");
    if let Some(mode) = config.get_str("restore_mode") {
        let mode = switch_ns().member(&format!("GPIO_SWITCH_{mode}"));
        ctx.add(gpio.clone().arrow("set_restore_mode").call(vec![mode]));
    }
    setup_switch(gpio, make.dot("Pmqtt"), config, ctx)
}

/// Descriptor of `switch: [{platform: gpio}]`.
#[must_use]
pub fn component() -> Component {
    Component::new("switch.gpio")
        .schema(config_schema)
        .to_code(to_code)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn emits_switch_with_restore_mode() {
        let node = Node::map([
            ("platform", Node::from("gpio")),
            ("name", Node::from("Relay")),
            ("pin", Node::from("D1")),
            ("restore_mode", Node::from("always_on")),
            ("inverted", Node::from(true)),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            Application::MakeGPIOSwitch application_makegpioswitch = App.make_gpio_switch("Relay", GPIOOutputPin(5, OUTPUT, false));
            application_makegpioswitch.Pswitch_->set_restore_mode(switch_::GPIO_SWITCH_ALWAYS_ON);
            switch_::GPIOSwitch *switch__gpioswitch = application_makegpioswitch.Pswitch_;
            switch_::MQTTSwitchComponent *switch__mqttswitchcomponent = application_makegpioswitch.Pmqtt;
            switch__gpioswitch->set_inverted(true);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn unknown_restore_mode() {
        let node = Node::map([
            ("platform", Node::from("gpio")),
            ("name", Node::from("Relay")),
            ("pin", Node::from("D1")),
            ("restore_mode", Node::from("sometimes")),
        ]);
        assert!(validate(&config_schema(), node).is_err());
    }
}
