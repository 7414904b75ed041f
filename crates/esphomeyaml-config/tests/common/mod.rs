#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Fresh directory under the system temp dir.
pub fn temp_project(name: &str) -> PathBuf {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let root = std::env::temp_dir().join(format!(
        "esphomeyaml-config-{name}-{}-{stamp}",
        std::process::id()
    ));
    std::fs::create_dir_all(&root).expect("create temp dir");
    root
}

/// Write `text` to `dir/file` and return the path.
pub fn write_file(dir: &Path, file: &str, text: &str) -> PathBuf {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent");
    }
    std::fs::write(&path, text).expect("write fixture");
    path
}

/// Core and wifi sections shared by every fixture.
pub const BASE: &str = "\
esphomeyaml:
  name: node1
  platform: ESP8266
  board: nodemcuv2

wifi:
  ssid: home
  password: password1
";

/// `BASE` followed by `extra`.
pub fn config(extra: &str) -> String {
    format!("{BASE}\n{extra}")
}
