//! I²C bus.

use esphomeyaml_codegen::{CodegenContext, Halt};

use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Schema, Validator};
use crate::error::Invalid;
use crate::node::Node;
use crate::pins;
use crate::registry::BuildEnv;

fn positive_frequency() -> Validator {
    cv::frequency().then(Validator::new(|node, _| match node.as_f64() {
        Some(value) if value > 0.0 => Ok(node.clone()),
        _ => Err(Invalid::at(node, "frequency must be greater than 0")),
    }))
}

fn config_schema() -> Validator {
    Schema::new()
        .generate_id(cpp::esphomelib_ns().class("I2CComponent", &[&cpp::component()]))
        .optional_default("sda", Node::from("SDA"), pins::input_output_pin())
        .optional_default("scl", Node::from("SCL"), pins::input_output_pin())
        .optional("frequency", positive_frequency())
        .optional("scan", cv::boolean())
        .optional(
            "receive_timeout",
            cv::invalid(
                "The receive_timeout option has been removed because timeouts are already \
                 handled by the low-level i2c interface.",
            ),
        )
        .into()
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let mut args = vec![
        config.get_i64("sda").unwrap_or_default().into(),
        config.get_i64("scl").unwrap_or_default().into(),
    ];
    if let Some(scan) = config.get_bool("scan") {
        args.push(scan.into());
    }
    let i2c = ctx.declare_pointer(id, cpp::app().method("init_i2c", args))?;
    if let Some(frequency) = config.get("frequency").and_then(Node::to_expression) {
        ctx.add(i2c.method("set_frequency", vec![frequency]));
    }
    Ok(())
}

/// Descriptor of `i2c:`.
#[must_use]
pub fn component() -> Component {
    Component::new("i2c")
        .schema(config_schema)
        .to_code(to_code)
        .build_flags(&["-DUSE_I2C"])
        .libraries(&["Wire"])
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn board_default_pins() {
        let config = validate(&config_schema(), Node::map([("scan", Node::from(true))])).unwrap();
        assert_eq!(config.get_i64("sda"), Some(4));
        assert_eq!(config.get_i64("scl"), Some(5));
        expect![[r#"
            I2CComponent *i2ccomponent = App.init_i2c(4, 5, true);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn frequency_must_be_positive() {
        let node = Node::map([("frequency", Node::from("0kHz"))]);
        assert!(validate(&config_schema(), node).is_err());
    }
}
