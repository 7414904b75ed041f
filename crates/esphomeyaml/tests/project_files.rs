mod common;

use std::fs;
use std::path::Path;

use esphomeyaml::{write_project, Project, StorageJson, WriteReport};
use esphomeyaml_config::{generate, ComponentRegistry};

use common::{config, read, temp_project, write_file, NODE};

fn load(path: &Path) -> Project {
    Project::load(path, &ComponentRegistry::builtin()).expect("valid config")
}

fn write(project: &Project) -> WriteReport {
    let generated =
        generate(&project.validated, &ComponentRegistry::builtin(), false).expect("generate");
    write_project(project, &generated).expect("write project")
}

#[test]
fn fresh_project_gets_every_file() {
    let dir = temp_project("fresh");
    let path = write_file(&dir, "livingroom.yaml", NODE);
    let project = load(&path);
    let report = write(&project);

    assert_eq!(project.build_dir, dir.join("livingroom"));
    assert!(report.changed.contains(&dir.join(".gitignore")));
    assert!(report.cleaned);

    let ini = read(&project.platformio_ini());
    assert!(ini.contains("[env:livingroom]"), "{ini}");
    assert!(ini.contains("board = nodemcuv2"), "{ini}");
    assert!(ini.contains("framework = arduino"), "{ini}");
    assert!(!project.partitions_csv().exists());

    let cpp = read(&project.main_cpp());
    assert_eq!(cpp.matches("App.set_name(\"livingroom\");").count(), 1, "{cpp}");
    assert!(cpp.contains("AUTO GENERATED CODE BEGIN"));
    assert!(cpp.contains("AUTO GENERATED INCLUDE BLOCK END"));

    let storage = StorageJson::load(&project.storage_path()).expect("sidecar");
    assert_eq!(storage.name, "livingroom");
    assert_eq!(storage.esp_platform, "ESP8266");
    assert_eq!(storage.board, "nodemcuv2");
    assert_eq!(storage.address.as_deref(), Some("livingroom.local"));
    assert!(storage.use_legacy_ota);
    assert_eq!(storage.input_fingerprint.len(), 64);
    assert!(project
        .storage_path()
        .ends_with(".esphomeyaml/livingroom.yaml.json"));
}

#[test]
fn rewriting_is_idempotent_and_keeps_user_code() {
    let dir = temp_project("rewrite");
    let path = write_file(&dir, "livingroom.yaml", NODE);
    let project = load(&path);
    write(&project);

    let cpp_path = project.main_cpp();
    let mut cpp = read(&cpp_path);
    cpp.push_str("\nvoid my_helper() {}\n");
    fs::write(&cpp_path, &cpp).unwrap();

    let report = write(&load(&path));
    assert!(report.changed.is_empty(), "{:?}", report.changed);
    assert!(!report.cleaned);
    assert_eq!(read(&cpp_path), cpp);
}

#[test]
fn config_change_updates_only_the_generated_block() {
    let dir = temp_project("change");
    let path = write_file(&dir, "livingroom.yaml", NODE);
    write(&load(&path));

    write_file(&dir, "livingroom.yaml", &config("i2c:\n  sda: D1\n  scl: D2\n"));
    let project = load(&path);
    let report = write(&project);
    assert!(report.changed.contains(&project.main_cpp()));
    assert!(!report.cleaned, "a component change keeps the build cache");
    assert!(read(&project.main_cpp()).contains("App.init_i2c("));
}

#[test]
fn board_change_cleans_the_build_cache() {
    let dir = temp_project("clean");
    let path = write_file(&dir, "livingroom.yaml", NODE);
    let project = load(&path);
    write(&project);
    let cache = project.build_dir.join(".pioenvs").join("livingroom");
    fs::create_dir_all(&cache).unwrap();

    write_file(&dir, "livingroom.yaml", &NODE.replace("nodemcuv2", "d1_mini"));
    let report = write(&load(&path));
    assert!(report.cleaned);
    assert!(!cache.exists());
    assert!(read(&project.platformio_ini()).contains("board = d1_mini"));
}

#[test]
fn broken_markers_are_reported_with_the_file() {
    let dir = temp_project("markers");
    let path = write_file(&dir, "livingroom.yaml", NODE);
    let project = load(&path);
    write(&project);
    let cpp = read(&project.main_cpp()).replace("AUTO GENERATED CODE END", "removed");
    fs::write(project.main_cpp(), cpp).unwrap();

    let generated =
        generate(&project.validated, &ComponentRegistry::builtin(), false).expect("generate");
    let err = write_project(&project, &generated).expect_err("marker missing");
    let message = err.to_string();
    assert!(message.contains("main.cpp"), "{message}");
    assert!(message.contains("Could not find auto generated code end"), "{message}");
}

#[test]
fn failed_write_keeps_the_previous_sidecar() {
    let dir = temp_project("failed-write");
    let path = write_file(&dir, "livingroom.yaml", NODE);
    let project = load(&path);
    write(&project);
    let cache = project.build_dir.join(".pioenvs").join("livingroom");
    fs::create_dir_all(&cache).unwrap();
    let cpp = read(&project.main_cpp()).replace("AUTO GENERATED CODE END", "removed");
    fs::write(project.main_cpp(), cpp).unwrap();

    write_file(&dir, "livingroom.yaml", &NODE.replace("nodemcuv2", "d1_mini"));
    let changed = load(&path);
    let generated =
        generate(&changed.validated, &ComponentRegistry::builtin(), false).expect("generate");
    write_project(&changed, &generated).expect_err("marker missing");

    let storage = StorageJson::load(&changed.storage_path()).expect("sidecar");
    assert_eq!(storage.board, "nodemcuv2");
    assert!(cache.is_dir(), "the build cache survives a failed write");
}

#[test]
fn esp32_ble_gets_a_partition_table() {
    let dir = temp_project("ble");
    let text = NODE
        .replace("ESP8266", "ESP32")
        .replace("nodemcuv2", "nodemcu-32s")
        + "\nesp32_ble_tracker:\n";
    let path = write_file(&dir, "livingroom.yaml", &text);
    let project = load(&path);
    write(&project);

    assert!(project.partitions_csv().is_file());
    let ini = read(&project.platformio_ini());
    assert!(ini.contains("board_build.partitions = partitions.csv"), "{ini}");
    assert!(ini.contains("    Preferences"), "{ini}");
}
