//! A loaded device configuration and the paths derived from it.

use std::path::{Path, PathBuf};

use esphomeyaml_config::components::{logger, mqtt::MqttSettings, ota, wifi};
use esphomeyaml_config::{
    read_config, ComponentRegistry, ConfigError, CoreInfo, EspPlatform, Node, ValidatedConfig,
};

/// Directory next to the configuration holding the storage sidecars.
pub const STORAGE_DIR: &str = ".esphomeyaml";

/// Validated configuration plus everything the driver derives from it.
#[derive(Debug)]
pub struct Project {
    /// Path of the YAML file as given on the command line.
    pub config_path: PathBuf,
    /// Directory containing the YAML file.
    pub config_dir: PathBuf,
    /// platformio project directory.
    pub build_dir: PathBuf,
    /// Core settings.
    pub core: CoreInfo,
    /// Validated document and load order.
    pub validated: ValidatedConfig,
}

impl Project {
    /// Read and validate `config_path`.
    pub fn load(config_path: &Path, components: &ComponentRegistry) -> Result<Self, ConfigError> {
        let validated = read_config(config_path, components)?;
        Self::from_validated(config_path, validated)
    }

    /// Wrap an already validated document read from `config_path`.
    pub fn from_validated(
        config_path: &Path,
        validated: ValidatedConfig,
    ) -> Result<Self, ConfigError> {
        let core = validated.core()?;
        let config_dir = config_dir(config_path);
        let build_dir = config_dir.join(&core.build_path);
        Ok(Self {
            config_path: config_path.to_path_buf(),
            config_dir,
            build_dir,
            core,
            validated,
        })
    }

    /// The validated document.
    #[must_use]
    pub fn config(&self) -> &Node {
        &self.validated.config
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    #[must_use]
    pub fn platform(&self) -> EspPlatform {
        self.core.platform
    }

    /// File name of the configuration, e.g. `livingroom.yaml`.
    #[must_use]
    pub fn config_filename(&self) -> String {
        self.config_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn platformio_ini(&self) -> PathBuf {
        self.build_dir.join("platformio.ini")
    }

    #[must_use]
    pub fn main_cpp(&self) -> PathBuf {
        self.build_dir.join("src").join("main.cpp")
    }

    #[must_use]
    pub fn partitions_csv(&self) -> PathBuf {
        self.build_dir.join("partitions.csv")
    }

    /// Binary platformio produces for this node.
    #[must_use]
    pub fn firmware_bin(&self) -> PathBuf {
        self.build_dir.join(".pioenvs").join(self.name()).join("firmware.bin")
    }

    /// `<config dir>/.esphomeyaml/<config file name>.json`.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.config_dir
            .join(STORAGE_DIR)
            .join(format!("{}.json", self.config_filename()))
    }

    /// Host the device is reached at over the network.
    #[must_use]
    pub fn upload_address(&self) -> Option<String> {
        wifi::upload_address(self.config())
    }

    /// OTA port, `None` without an `ota:` section.
    #[must_use]
    pub fn ota_port(&self) -> Option<u16> {
        ota::port(self.config(), self.platform())
    }

    #[must_use]
    pub fn ota_password(&self) -> String {
        ota::password(self.config())
    }

    #[must_use]
    pub fn mqtt(&self) -> Option<MqttSettings> {
        MqttSettings::from_config(self.config())
    }

    /// Serial baud rate of the logger; `0` when serial logging is off.
    #[must_use]
    pub fn logger_baud_rate(&self) -> u32 {
        self.config()
            .get(logger::DOMAIN)
            .and_then(|logger| logger.get_i64("baud_rate"))
            .and_then(|baud| u32::try_from(baud).ok())
            .unwrap_or(logger::DEFAULT_BAUD_RATE)
    }
}

fn config_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_file_name_lives_in_the_current_directory() {
        assert_eq!(config_dir(Path::new("node.yaml")), PathBuf::from("."));
        assert_eq!(config_dir(Path::new("conf/node.yaml")), PathBuf::from("conf"));
    }
}
