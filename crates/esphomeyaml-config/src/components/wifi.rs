//! WiFi station networks, access point and the device's network address.

use esphomeyaml_codegen::{ClassRef, CodegenContext, Expression, Halt};

use crate::component::Component;
use crate::core_config;
use crate::cpp;
use crate::cv::{self, Schema, Validator};
use crate::error::{Invalid, PathSegment};
use crate::node::{Node, Value};
use crate::registry::BuildEnv;

const POWER_SAVE_MODES: &[&str] = &["NONE", "LIGHT", "HIGH"];

fn wifi_component() -> ClassRef {
    cpp::esphomelib_ns().class("WiFiComponent", &[&cpp::component()])
}

fn wifi_ap() -> ClassRef {
    cpp::esphomelib_ns().struct_("WiFiAP")
}

fn manual_ip_type() -> ClassRef {
    cpp::esphomelib_ns().struct_("ManualIP")
}

fn validate_password() -> Validator {
    Validator::new(|node, ctx| {
        let value = cv::string_strict().validate(node, ctx)?;
        let length = value.as_str().unwrap_or_default().chars().count();
        if length > 0 && length < 8 {
            return Err(Invalid::at(node, "WPA password must be at least 8 characters long"));
        }
        if length > 64 {
            return Err(Invalid::at(node, "WPA password must be at most 64 characters long"));
        }
        Ok(value)
    })
}

fn validate_channel() -> Validator {
    cv::int_range(Some(1), Some(14))
}

fn sta_manual_ip_schema() -> Validator {
    Schema::new()
        .required("static_ip", cv::ipv4())
        .required("gateway", cv::ipv4())
        .required("subnet", cv::ipv4())
        .optional_default("dns1", Node::from("1.1.1.1"), cv::ipv4())
        .optional_default("dns2", Node::from("1.0.0.1"), cv::ipv4())
        .into()
}

fn ap_manual_ip_schema() -> Validator {
    Schema::new()
        .required("static_ip", cv::ipv4())
        .required("gateway", cv::ipv4())
        .required("subnet", cv::ipv4())
        .into()
}

fn network_base() -> Schema {
    Schema::new()
        .generate_id(wifi_ap())
        .optional("ssid", cv::ssid())
        .optional("password", validate_password())
        .optional("channel", validate_channel())
        .optional("manual_ip", sta_manual_ip_schema())
}

fn network_sta() -> Validator {
    network_base()
        .optional("bssid", cv::mac_address())
        .optional("hidden", cv::boolean())
        .into()
}

fn network_ap() -> Validator {
    network_base().optional("manual_ip", ap_manual_ip_schema()).into()
}

/// Moves the `ssid:`/`password:` shorthand into `networks:` and checks that
/// something is configured.
fn validate_networks() -> Validator {
    let sta = network_sta();
    Validator::new(move |node, ctx| {
        let mut out = node.clone();
        let Some(map) = out.as_map_mut() else {
            return Err(Invalid::at(node, "expected dictionary"));
        };
        if map.contains_key("password") && !map.contains_key("ssid") {
            return Err(Invalid::at(node, "Cannot have WiFi password without SSID!"));
        }
        if let Some(ssid) = map.shift_remove("ssid") {
            if map.contains_key("networks") {
                return Err(Invalid::at(
                    node,
                    "You cannot use the 'ssid:' option together with 'networks:'. Please copy \
                     your network into the 'networks:' key",
                ));
            }
            let mut network = vec![("ssid", ssid)];
            if let Some(password) = map.shift_remove("password") {
                network.push(("password", password));
            }
            let network = sta
                .validate(&Node::map(network), ctx)
                .map_err(|err| err.prefixed(PathSegment::Key("networks".into())))?;
            map.insert("networks".into(), node.with_value(Value::Seq(vec![network])));
        }
        if !map.contains_key("networks") && !map.contains_key("ap") {
            return Err(Invalid::at(
                node,
                "Please specify at least an SSID or an Access Point to create.",
            ));
        }
        let networks = map.get("networks").and_then(Node::as_seq).unwrap_or(&[]);
        if networks.iter().any(|network| !network.contains_key("ssid")) {
            return Err(Invalid::at(node, "One of your WiFi networks doesn't have an SSID!"));
        }
        Ok(out)
    })
}

fn config_schema() -> Validator {
    cv::all(vec![
        Schema::new()
            .generate_id(wifi_component())
            .optional("networks", cv::list_of(network_sta()))
            .optional("ssid", cv::ssid())
            .optional("password", validate_password())
            .optional("manual_ip", sta_manual_ip_schema())
            .optional("ap", network_ap())
            .optional("hostname", cv::hostname())
            .optional_default("domain", Node::from(".local"), cv::domain_name())
            .optional("reboot_timeout", cv::positive_time_period_milliseconds())
            .optional("power_save_mode", cv::one_of_upper(POWER_SAVE_MODES))
            .into(),
        validate_networks(),
    ])
}

fn ip_field(config: &Node, key: &str) -> Expression {
    config
        .get(key)
        .and_then(Node::to_expression)
        .unwrap_or_else(|| Expression::raw("IPAddress(0, 0, 0, 0)"))
}

fn manual_ip(config: &Node) -> Expression {
    let ty = manual_ip_type();
    Expression::struct_init(
        &ty,
        vec![
            ("static_ip", ip_field(config, "static_ip")),
            ("gateway", ip_field(config, "gateway")),
            ("subnet", ip_field(config, "subnet")),
            ("dns1", ip_field(config, "dns1")),
            ("dns2", ip_field(config, "dns2")),
        ],
    )
}

fn wifi_network(
    config: &Node,
    fallback_ip: Option<&Node>,
    ctx: &mut CodegenContext,
) -> Result<Option<Expression>, Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(None);
    };
    let ap = ctx.declare_variable(id, Expression::raw(wifi_ap().path()).call(Vec::new()))?;
    for (key, setter) in [
        ("ssid", "set_ssid"),
        ("password", "set_password"),
        ("bssid", "set_bssid"),
        ("hidden", "set_hidden"),
        ("channel", "set_channel"),
    ] {
        if let Some(value) = config.get(key).and_then(Node::to_expression) {
            ctx.add(ap.clone().method(setter, vec![value]));
        }
    }
    if let Some(static_ip) = config.get("manual_ip").or(fallback_ip) {
        ctx.add(ap.clone().method("set_manual_ip", vec![manual_ip(static_ip)]));
    }
    Ok(Some(ap))
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let wifi = ctx.declare_pointer(id, cpp::app().method("init_wifi", Vec::new()))?;
    let fallback_ip = config.get("manual_ip");
    for network in config.get_seq("networks") {
        if let Some(ap) = wifi_network(network, fallback_ip, ctx)? {
            ctx.add(wifi.clone().method("add_sta", vec![ap]));
        }
    }
    if let Some(ap_config) = config.get("ap") {
        if let Some(ap) = wifi_network(ap_config, None, ctx)? {
            ctx.add(wifi.clone().method("set_ap", vec![ap]));
        }
    }
    if let Some(hostname) = config.get_str("hostname") {
        ctx.add(wifi.clone().method("set_hostname", vec![hostname.into()]));
    }
    if let Some(timeout) = config.get("reboot_timeout").and_then(Node::to_expression) {
        ctx.add(wifi.clone().method("set_reboot_timeout", vec![timeout]));
    }
    if let Some(mode) = config.get_str("power_save_mode") {
        ctx.add(wifi.method(
            "set_power_save_mode",
            vec![Expression::raw(format!("WIFI_POWER_SAVE_{mode}"))],
        ));
    }
    Ok(())
}

/// Address uploads and log tails reach the device at: the static IP, else
/// `hostname + domain`, else `name + domain`.
#[must_use]
pub fn upload_address(full_config: &Node) -> Option<String> {
    let wifi = full_config.get("wifi")?;
    let static_ip = wifi
        .get("manual_ip")
        .or_else(|| wifi.get_seq("networks").first().and_then(|net| net.get("manual_ip")))
        .and_then(|manual| manual.get("static_ip"));
    if let Some(ip) = static_ip {
        return Some(ip.to_string());
    }
    let domain = wifi.get_str("domain").unwrap_or(".local");
    if let Some(hostname) = wifi.get_str("hostname") {
        return Some(format!("{hostname}{domain}"));
    }
    let name = full_config.get(core_config::DOMAIN)?.get_str("name")?;
    Some(format!("{name}{domain}"))
}

/// Descriptor of `wifi:`.
#[must_use]
pub fn component() -> Component {
    Component::new("wifi").schema(config_schema).to_code(to_code)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn shorthand_becomes_a_network() {
        let node = Node::map([
            ("ssid", Node::from("home")),
            ("password", Node::from("correct horse")),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        assert!(config.get("ssid").is_none());
        let networks = config.get_seq("networks");
        assert_eq!(networks.len(), 1);
        assert_eq!(networks[0].get_str("password"), Some("correct horse"));
        assert_eq!(config.get_str("domain"), Some(".local"));
    }

    #[test]
    fn rejects_incomplete_setups() {
        let password_only = Node::map([("password", Node::from("secret123"))]);
        assert_eq!(
            validate(&config_schema(), password_only).unwrap_err(),
            "Cannot have WiFi password without SSID!"
        );
        assert_eq!(
            validate(&config_schema(), Node::empty_map()).unwrap_err(),
            "Please specify at least an SSID or an Access Point to create."
        );
        let both = Node::map([
            ("ssid", Node::from("a")),
            ("networks", Node::seq(vec![Node::map([("ssid", Node::from("b"))])])),
        ]);
        assert!(validate(&config_schema(), both)
            .unwrap_err()
            .starts_with("You cannot use the 'ssid:' option together with 'networks:'."));
        let short = Node::map([("ssid", Node::from("a")), ("password", Node::from("short"))]);
        assert!(validate(&config_schema(), short)
            .unwrap_err()
            .starts_with("WPA password must be at least 8 characters long"));
    }

    #[test]
    fn emits_networks_with_manual_ip() {
        let node = Node::map([
            ("ssid", Node::from("home")),
            (
                "manual_ip",
                Node::map([
                    ("static_ip", Node::from("192.168.1.50")),
                    ("gateway", Node::from("192.168.1.1")),
                    ("subnet", Node::from("255.255.255.0")),
                ]),
            ),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            WiFiComponent *wificomponent = App.init_wifi();
            WiFiAP wifiap = WiFiAP();
            wifiap.set_ssid("home");
            wifiap.set_manual_ip(ManualIP{
                .static_ip = IPAddress(192, 168, 1, 50),
                .gateway = IPAddress(192, 168, 1, 1),
                .subnet = IPAddress(255, 255, 255, 0),
                .dns1 = IPAddress(1, 1, 1, 1),
                .dns2 = IPAddress(1, 0, 0, 1),
            });
            wificomponent->add_sta(wifiap);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }

    #[test]
    fn upload_address_prefers_static_ip() {
        let wifi = Node::map([
            ("domain", Node::from(".lan")),
            ("hostname", Node::from("kitchen")),
        ]);
        let full = Node::map([
            ("esphomeyaml", Node::map([("name", Node::from("node1"))])),
            ("wifi", wifi),
        ]);
        assert_eq!(upload_address(&full).as_deref(), Some("kitchen.lan"));
        let full = Node::map([
            ("esphomeyaml", Node::map([("name", Node::from("node1"))])),
            ("wifi", Node::map([("domain", Node::from(".local"))])),
        ]);
        assert_eq!(upload_address(&full).as_deref(), Some("node1.local"));
        let full = Node::map([(
            "wifi",
            Node::map([(
                "manual_ip",
                Node::map([("static_ip", Node::new(Value::Ip([10, 0, 0, 7])))]),
            )]),
        )]);
        assert_eq!(upload_address(&full).as_deref(), Some("10.0.0.7"));
    }
}
