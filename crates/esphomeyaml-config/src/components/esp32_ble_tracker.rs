//! BLE advertisement scanner (ESP32 only).

use esphomeyaml_codegen::{CodegenContext, Halt};

use crate::component::Component;
use crate::cpp;
use crate::cv::{self, EspPlatform, Schema, Validator};
use crate::node::Node;
use crate::registry::BuildEnv;

/// Key of the component; its presence switches ESP32 builds to the
/// larger application partition.
pub const DOMAIN: &str = "esp32_ble_tracker";

fn config_schema() -> Validator {
    Schema::new()
        .generate_id(cpp::esphomelib_ns().class("ESP32BLETracker", &[&cpp::component()]))
        .optional("scan_interval", cv::positive_time_period_seconds())
        .into()
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let tracker = ctx.declare_pointer(id, cpp::app().method("make_esp32_ble_tracker", Vec::new()))?;
    if let Some(interval) = config.get("scan_interval").and_then(Node::to_expression) {
        ctx.add(tracker.method("set_scan_interval", vec![interval]));
    }
    Ok(())
}

/// Whether the validated configuration uses the BLE stack.
#[must_use]
pub fn uses_ble(full_config: &Node) -> bool {
    full_config.contains_key(DOMAIN)
}

/// Descriptor of `esp32_ble_tracker:`.
#[must_use]
pub fn component() -> Component {
    Component::new(DOMAIN)
        .only_on(&[EspPlatform::Esp32])
        .conflicts_with(&["esp32_ble_beacon"])
        .schema(config_schema)
        .to_code(to_code)
        .build_flags(&["-DUSE_ESP32_BLE_TRACKER"])
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate_on};
    use crate::cv::test_support::ctx32;

    #[test]
    fn scan_interval_in_seconds() {
        let node = Node::map([("scan_interval", Node::from("60s"))]);
        let config = validate_on(&config_schema(), node, ctx32()).unwrap();
        expect![[r#"
            ESP32BLETracker *esp32bletracker = App.make_esp32_ble_tracker();
            esp32bletracker->set_scan_interval(60);

        "#]]
        .assert_eq(&emit(to_code, &config));
        assert!(uses_ble(&Node::map([(DOMAIN, config)])));
    }
}
