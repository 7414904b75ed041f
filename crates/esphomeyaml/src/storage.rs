//! The per-configuration storage sidecar.
//!
//! `<config dir>/.esphomeyaml/<config file>.json` records the settings of
//! the last successful project write. Comparing it with the current
//! settings decides whether the platformio build cache is stale and
//! whether `main.cpp` needs a source migration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use esphomeyaml_config::{dump, EsphomelibVersion, GitRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::project::Project;
use crate::writer::write_atomic;

/// Layout version of the sidecar itself.
pub const STORAGE_VERSION: u32 = 1;

/// Layout version of the generated `main.cpp`.
pub const SRC_VERSION: u32 = 1;

/// Version of this tool recorded in the sidecar.
pub const ESPHOMEYAML_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Error serializing storage: {0}")]
    Json(#[from] serde_json::Error),
}

/// Contents of the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageJson {
    pub storage_version: u32,
    pub name: String,
    /// Plain version string or a `{repository, commit|branch|tag}` /
    /// `{local}` object.
    pub esphomelib_version: Value,
    pub esphomeyaml_version: String,
    pub src_version: u32,
    pub arduino_version: String,
    pub address: Option<String>,
    pub esp_platform: String,
    pub board: String,
    pub build_path: String,
    pub firmware_bin_path: String,
    #[serde(default = "default_use_legacy_ota")]
    pub use_legacy_ota: bool,
    #[serde(default)]
    pub input_fingerprint: String,
}

fn default_use_legacy_ota() -> bool {
    true
}

impl StorageJson {
    /// Sidecar describing `project`. `use_legacy_ota` carries over from
    /// `old` and starts out `true`.
    #[must_use]
    pub fn from_project(project: &Project, old: Option<&StorageJson>) -> Self {
        Self {
            storage_version: STORAGE_VERSION,
            name: project.name().to_string(),
            esphomelib_version: version_value(&project.core.esphomelib_version),
            esphomeyaml_version: ESPHOMEYAML_VERSION.to_string(),
            src_version: SRC_VERSION,
            arduino_version: project.core.arduino_version.clone(),
            address: project.upload_address(),
            esp_platform: project.platform().as_str().to_string(),
            board: project.core.board.to_string(),
            build_path: project.build_dir.display().to_string(),
            firmware_bin_path: project.firmware_bin().display().to_string(),
            use_legacy_ota: old.map_or(true, |old| old.use_legacy_ota),
            input_fingerprint: fingerprint(&dump(project.config())),
        }
    }

    /// Read a sidecar. Missing and unreadable files are both `None`.
    #[must_use]
    pub fn load(path: &Path) -> Option<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("Could not read {}: {err}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(storage) => Some(storage),
            Err(err) => {
                warn!("Ignoring malformed storage file {}: {err}", path.display());
                None
            }
        }
    }

    /// Write as pretty JSON through a temporary file.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        write_atomic(path, &text).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Whether going from `old` to `self` invalidates the platformio
    /// build cache.
    #[must_use]
    pub fn needs_clean(&self, old: Option<&StorageJson>) -> bool {
        let Some(old) = old else {
            return true;
        };
        old.esphomelib_version != self.esphomelib_version
            || old.esphomeyaml_version != self.esphomeyaml_version
            || old.src_version != self.src_version
            || old.arduino_version != self.arduino_version
            || old.board != self.board
            || old.build_path != self.build_path
    }
}

/// Hex SHA-256 of `text`.
#[must_use]
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn version_value(version: &EsphomelibVersion) -> Value {
    let mut object = Map::new();
    match version {
        EsphomelibVersion::Local(path) => {
            object.insert("local".into(), Value::String(path.display().to_string()));
        }
        EsphomelibVersion::Repository { url, reference } => {
            object.insert("repository".into(), Value::String(url.clone()));
            let (key, value) = match reference {
                Some(GitRef::Commit(value)) => ("commit", value),
                Some(GitRef::Branch(value)) => ("branch", value),
                Some(GitRef::Tag(value)) => ("tag", value),
                None => return Value::Object(object),
            };
            object.insert(key.into(), Value::String(value.clone()));
        }
    }
    Value::Object(object)
}

/// Record that the device accepted a native OTA session.
pub fn mark_native_ota(path: &Path) -> Result<(), StorageError> {
    let Some(mut storage) = StorageJson::load(path) else {
        return Ok(());
    };
    if !storage.use_legacy_ota {
        return Ok(());
    }
    storage.use_legacy_ota = false;
    storage.save(path)
}
