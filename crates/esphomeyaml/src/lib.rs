//! `esphomeyaml` - turns a device configuration into a platformio project
//! and gets the firmware onto the device.
//!
//! - [`writer`]: `platformio.ini`, `src/main.cpp` and friends
//! - [`storage`]: the sidecar recording the last project write
//! - [`build`]: platformio and esptool invocations
//! - [`ota`]: over-the-air upload
//! - [`logs`] and [`mqtt`]: log tails and broker maintenance

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod interrupt;
pub mod logs;
pub mod mqtt;
pub mod ota;
pub mod project;
pub mod storage;
pub mod writer;

pub use build::BuildError;
pub use logs::LogTailError;
pub use mqtt::MqttError;
pub use ota::OtaError;
pub use project::Project;
pub use storage::StorageJson;
pub use writer::{write_project, WriteReport, WriterError};

/// Version printed by `esphomeyaml version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
