mod common;

use esphomeyaml_config::{
    dump, generate, read_config, ComponentRegistry, ConfigError, ValidatedConfig,
};

use common::{config, temp_project, write_file};

fn read(name: &str, text: &str) -> Result<ValidatedConfig, ConfigError> {
    let dir = temp_project(name);
    let path = write_file(&dir, "node1.yaml", text);
    read_config(&path, &ComponentRegistry::builtin())
}

fn issues(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::Invalid(issues) => issues.0.iter().map(ToString::to_string).collect(),
        other => panic!("expected validation issues, got {other}"),
    }
}

#[test]
fn minimal_config_names_the_app_once() {
    let validated = read(
        "minimal",
        &config("mqtt:\n  broker: 1.2.3.4\n\nlogger:\n"),
    )
    .expect("valid config");
    assert_eq!(validated.order[0], "esphomeyaml");
    let components = ComponentRegistry::builtin();
    let generated = generate(&validated, &components, false).expect("generate");
    assert_eq!(generated.main.matches("App.set_name(\"node1\");").count(), 1);
    assert!(generated.libraries.iter().any(|lib| lib.starts_with("ArduinoJson")), "{:?}", generated.libraries);
}

#[test]
fn platform_pulls_in_its_host() {
    let validated = read(
        "expansion",
        &config("binary_sensor:\n  - platform: gpio\n    pin: D3\n    name: x\n"),
    )
    .expect("valid config");
    let host = validated.order.iter().position(|key| key == "binary_sensor").unwrap();
    let platform = validated.order.iter().position(|key| key == "binary_sensor.gpio").unwrap();
    assert!(host < platform);
}

#[test]
fn duplicate_id_cites_both_lines() {
    let err = read(
        "duplicate",
        &config(
            "switch:\n  - platform: gpio\n    id: foo\n    pin: D1\n  - platform: gpio\n    id: foo\n    pin: D2\n",
        ),
    )
    .unwrap_err();
    let issues = issues(err);
    assert_eq!(issues.len(), 1, "{issues:?}");
    assert!(issues[0].starts_with("ID foo redefined!"), "{}", issues[0]);
    assert!(issues[0].contains("line 12"), "{}", issues[0]);
    assert!(issues[0].contains("line 15"), "{}", issues[0]);
}

#[test]
fn mpr121_max_touch_channel_vetoes_channel() {
    let err = read(
        "veto",
        &config(
            "i2c:\n\nmpr121:\n  id: touch\n  max_touch_channel: 5\n\nbinary_sensor:\n  - platform: mpr121\n    name: Pad\n    channel: 8\n",
        ),
    )
    .unwrap_err();
    let issues = issues(err);
    assert_eq!(issues.len(), 1, "{issues:?}");
    assert!(
        issues[0].contains("Channel 8 of touch is above its max_touch_channel (5)."),
        "{}",
        issues[0]
    );
}

#[test]
fn secrets_and_includes_resolve_next_to_the_file() {
    let dir = temp_project("includes");
    write_file(&dir, "secrets.yaml", "wifi_password: hunter2hunter2\n");
    write_file(&dir, "common/logger.yaml", "level: DEBUG\n");
    let path = write_file(
        &dir,
        "node1.yaml",
        "esphomeyaml:\n  name: node1\n  platform: ESP8266\n  board: nodemcuv2\n\nwifi:\n  ssid: home\n  password: !secret wifi_password\n\nlogger: !include common/logger.yaml\n",
    );
    let validated = read_config(&path, &ComponentRegistry::builtin()).expect("valid config");
    let wifi = validated.config.get("wifi").unwrap();
    assert_eq!(wifi.get_str("password"), Some("hunter2hunter2"));
    assert_eq!(validated.config.get("logger").and_then(|l| l.get_str("level")), Some("DEBUG"));
}

#[test]
fn dump_is_stable_across_key_order() {
    let a = read("dump-a", &config("logger:\n  level: INFO\n  baud_rate: 0\n")).unwrap();
    let b = read("dump-b", &config("logger:\n  baud_rate: 0\n  level: INFO\n")).unwrap();
    assert_eq!(dump(&a.config), dump(&b.config));
}
