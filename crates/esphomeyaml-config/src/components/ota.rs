//! Over-the-air update server on the device.

use esphomeyaml_codegen::{CodegenContext, Halt};
use md5::{Digest, Md5};

use crate::component::Component;
use crate::cpp;
use crate::cv::{self, EspPlatform, Schema, Validator};
use crate::node::Node;
use crate::registry::BuildEnv;

fn config_schema() -> Validator {
    Schema::new()
        .generate_id(cpp::esphomelib_ns().class("OTAComponent", &[&cpp::component()]))
        .optional_default("safe_mode", Node::from(true), cv::boolean())
        .optional("port", cv::port())
        .optional("password", cv::string())
        .into()
}

/// Hex MD5 of the OTA password, as the device stores it.
#[must_use]
pub fn password_hash(password: &str) -> String {
    hex::encode(Md5::digest(password.as_bytes()))
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let ota = ctx.declare_pointer(id, cpp::app().method("init_ota", Vec::new()))?;
    if let Some(port) = config.get_i64("port") {
        ctx.add(ota.clone().method("set_port", vec![port.into()]));
    }
    if let Some(password) = config.get_str("password") {
        ctx.add(ota.clone().method("set_auth_password_hash", vec![password_hash(password).into()]));
    }
    if config.get_bool("safe_mode").unwrap_or(true) {
        ctx.add(ota.method("start_safe_mode", Vec::new()));
    }
    Ok(())
}

/// Port the device listens on: the configured one or the platform default.
#[must_use]
pub fn port(full_config: &Node, platform: EspPlatform) -> Option<u16> {
    let ota = full_config.get("ota")?;
    if let Some(port) = ota.get_i64("port").and_then(|port| u16::try_from(port).ok()) {
        return Some(port);
    }
    Some(match platform {
        EspPlatform::Esp8266 => 8266,
        EspPlatform::Esp32 => 3232,
    })
}

/// Configured password, empty without one.
#[must_use]
pub fn password(full_config: &Node) -> String {
    full_config
        .get("ota")
        .and_then(|ota| ota.get_str("password"))
        .unwrap_or_default()
        .to_string()
}

/// Descriptor of `ota:`.
#[must_use]
pub fn component() -> Component {
    Component::new("ota")
        .schema(config_schema)
        .to_code(to_code)
        .build_flags(&["-DUSE_OTA", "-DUSE_NEW_OTA"])
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn password_is_sent_hashed() {
        let node = Node::map([("password", Node::from("hunter2")), ("port", Node::from(3000_i64))]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            OTAComponent *otacomponent = App.init_ota();
            otacomponent->set_port(3000);
            otacomponent->set_auth_password_hash("2ab96390c7dbe3439de74d0c9b0b1767");
            otacomponent->start_safe_mode();

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn default_ports_follow_platform() {
        let full = Node::map([("ota", Node::empty_map())]);
        assert_eq!(port(&full, EspPlatform::Esp8266), Some(8266));
        assert_eq!(port(&full, EspPlatform::Esp32), Some(3232));
        assert_eq!(port(&Node::empty_map(), EspPlatform::Esp32), None);
        assert_eq!(password(&full), "");
    }
}
