//! `esphomeyaml-config` - loading and validating device configurations.
//!
//! A configuration goes through these stages:
//!
//! - **Loading**: YAML with marks, `!include`, `!secret`, `!env_var` and
//!   `!lambda` ([`loader`])
//! - **Validation**: discovery of components and platforms, schema checks,
//!   identifier resolution and cross-component checks ([`pipeline`])
//! - **Generation**: component code emission through the scheduler
//!   ([`generate`])
//!
//! # Example
//!
//! ```ignore
//! use esphomeyaml_config::{generate, read_config, ComponentRegistry};
//!
//! let components = ComponentRegistry::builtin();
//! let validated = read_config(Path::new("livingroom.yaml"), &components)?;
//! let generated = generate(&validated, &components, false)?;
//! println!("{}", generated.main);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod automation;
pub mod component;
pub mod components;
pub mod core_config;
pub mod cpp;
pub mod cv;
pub mod dump;
pub mod error;
pub mod generate;
pub mod loader;
pub mod node;
pub mod pins;
pub mod pipeline;
pub mod registry;
pub mod time;

pub use component::{Component, ComponentRegistry};
pub use core_config::{CoreInfo, EsphomelibVersion, GitRef};
pub use cv::{EspPlatform, ValidateContext};
pub use dump::dump;
pub use error::{ConfigError, ConfigIssue, ConfigIssues, Invalid};
pub use generate::{generate, Generated, PRE_INITIALIZE};
pub use loader::{load_str, load_yaml};
pub use node::{Mark, Node, Value};
pub use pipeline::{read_config, validate_config, ValidatedConfig};
pub use time::TimePeriod;
