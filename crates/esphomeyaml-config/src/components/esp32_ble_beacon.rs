//! iBeacon advertiser (ESP32 only).

use esphomeyaml_codegen::{CodegenContext, Expression, Halt};

use crate::component::Component;
use crate::cpp;
use crate::cv::{self, EspPlatform, Schema, Validator};
use crate::node::Node;
use crate::registry::BuildEnv;

fn config_schema() -> Validator {
    Schema::new()
        .generate_id(cpp::esphomelib_ns().class("ESP32BLEBeacon", &[&cpp::component()]))
        .required("type", cv::one_of_upper(&["IBEACON"]))
        .required("uuid", cv::uuid())
        .optional("major", cv::uint16())
        .optional("minor", cv::uint16())
        .into()
}

/// The 16 bytes of a normalized UUID as hex literals.
fn uuid_bytes(uuid: &str) -> Expression {
    let digits: Vec<char> = uuid.chars().filter(char::is_ascii_hexdigit).collect();
    Expression::array(
        digits
            .chunks(2)
            .map(|pair| Expression::raw(format!("0x{}", pair.iter().collect::<String>())))
            .collect(),
    )
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let uuid = uuid_bytes(config.get_str("uuid").unwrap_or_default());
    let beacon = ctx.declare_pointer(id, cpp::app().method("make_esp32_ble_beacon", vec![uuid]))?;
    for (key, setter) in [("major", "set_major"), ("minor", "set_minor")] {
        if let Some(value) = config.get_i64(key) {
            ctx.add(beacon.clone().method(setter, vec![value.into()]));
        }
    }
    Ok(())
}

/// Descriptor of `esp32_ble_beacon:`.
#[must_use]
pub fn component() -> Component {
    Component::new("esp32_ble_beacon")
        .only_on(&[EspPlatform::Esp32])
        .schema(config_schema)
        .to_code(to_code)
        .build_flags(&["-DUSE_ESP32_BLE_BEACON"])
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate_on};
    use crate::cv::test_support::ctx32;

    #[test]
    fn uuid_becomes_byte_array() {
        let node = Node::map([
            ("type", Node::from("iBeacon")),
            ("uuid", Node::from("C29CE823-E67A-4E71-BFF2-ABAA32E77A98")),
            ("major", Node::from(10_i64)),
        ]);
        let config = validate_on(&config_schema(), node, ctx32()).unwrap();
        expect![[r#"
            ESP32BLEBeacon *esp32blebeacon = App.make_esp32_ble_beacon({0xc2, 0x9c, 0xe8, 0x23, 0xe6, 0x7a, 0x4e, 0x71, 0xbf, 0xf2, 0xab, 0xaa, 0x32, 0xe7, 0x7a, 0x98});
            esp32blebeacon->set_major(10);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }
}
