//! Component descriptors and the registry of bundled components.
//!
//! Every top-level configuration key resolves to a [`Component`]. Platform
//! entries (`binary_sensor: [{platform: gpio}]`) resolve to the descriptor
//! registered under the dotted key `binary_sensor.gpio`.

use std::collections::BTreeSet;

use esphomeyaml_codegen::{CodegenContext, Halt};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::automation;
use crate::cv::{EspPlatform, ValidateContext, Validator};
use crate::error::Invalid;
use crate::node::Node;
use crate::registry::{BuildEnv, Registries, RegistryError};

/// Builds the validator of a component's configuration.
pub type SchemaFn = fn() -> Validator;

/// Emits the code of one validated configuration entry.
pub type ToCodeFn = fn(&Node, &BuildEnv, &mut CodegenContext) -> Result<(), Halt>;

/// Cross-document check of one validated entry against the whole validated
/// configuration.
pub type FinalValidateFn = fn(&Node, &Node, &ValidateContext) -> Result<(), Invalid>;

/// Adds a component's actions, conditions, filters, pins and triggers.
pub type RegisterFn = fn(&mut Registries) -> Result<(), RegistryError>;

/// Static description of a component or platform.
#[derive(Debug, Clone)]
pub struct Component {
    /// Configuration key, `domain` or `domain.platform`.
    pub key: SmolStr,
    /// Components that must be present.
    pub dependencies: &'static [&'static str],
    /// Components loaded with an empty configuration when absent.
    pub auto_load: &'static [&'static str],
    /// Components that may not be used together with this one.
    pub conflicts_with: &'static [&'static str],
    /// Accepts a list of configurations.
    pub multi_conf: bool,
    /// Hosts platform entries under a list.
    pub platform_host: bool,
    /// Supported chip families; `None` supports all.
    pub platforms: Option<&'static [EspPlatform]>,
    /// Configuration validator.
    pub schema: Option<SchemaFn>,
    /// Cross-document validation.
    pub final_validate: Option<FinalValidateFn>,
    /// Code generator.
    pub to_code: Option<ToCodeFn>,
    /// Registry contributions.
    pub register: Option<RegisterFn>,
    /// `-D` flags added when the component is loaded.
    pub build_flags: &'static [&'static str],
    /// platformio `lib_deps` added when the component is loaded.
    pub libraries: &'static [&'static str],
}

impl Component {
    /// Descriptor with no metadata.
    #[must_use]
    pub fn new(key: &str) -> Self {
        Self {
            key: SmolStr::new(key),
            dependencies: &[],
            auto_load: &[],
            conflicts_with: &[],
            multi_conf: false,
            platform_host: false,
            platforms: None,
            schema: None,
            final_validate: None,
            to_code: None,
            register: None,
            build_flags: &[],
            libraries: &[],
        }
    }

    #[must_use]
    pub fn dependencies(mut self, keys: &'static [&'static str]) -> Self {
        self.dependencies = keys;
        self
    }

    #[must_use]
    pub fn auto_load(mut self, keys: &'static [&'static str]) -> Self {
        self.auto_load = keys;
        self
    }

    #[must_use]
    pub fn conflicts_with(mut self, keys: &'static [&'static str]) -> Self {
        self.conflicts_with = keys;
        self
    }

    #[must_use]
    pub fn multi_conf(mut self) -> Self {
        self.multi_conf = true;
        self
    }

    #[must_use]
    pub fn platform_host(mut self) -> Self {
        self.platform_host = true;
        self
    }

    #[must_use]
    pub fn only_on(mut self, platforms: &'static [EspPlatform]) -> Self {
        self.platforms = Some(platforms);
        self
    }

    #[must_use]
    pub fn schema(mut self, schema: SchemaFn) -> Self {
        self.schema = Some(schema);
        self
    }

    #[must_use]
    pub fn final_validate(mut self, check: FinalValidateFn) -> Self {
        self.final_validate = Some(check);
        self
    }

    #[must_use]
    pub fn to_code(mut self, to_code: ToCodeFn) -> Self {
        self.to_code = Some(to_code);
        self
    }

    #[must_use]
    pub fn register(mut self, register: RegisterFn) -> Self {
        self.register = Some(register);
        self
    }

    #[must_use]
    pub fn build_flags(mut self, flags: &'static [&'static str]) -> Self {
        self.build_flags = flags;
        self
    }

    #[must_use]
    pub fn libraries(mut self, libraries: &'static [&'static str]) -> Self {
        self.libraries = libraries;
        self
    }

    /// Whether the component can run on `platform`.
    #[must_use]
    pub fn supports(&self, platform: EspPlatform) -> bool {
        self.platforms.is_none_or(|list| list.contains(&platform))
    }

    /// Domain part of the key.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.key.split_once('.').map_or(self.key.as_str(), |(domain, _)| domain)
    }
}

/// All components known to a run.
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    components: IndexMap<SmolStr, Component>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ComponentRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            components: IndexMap::new(),
        }
    }

    /// Registry holding every bundled component.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for component in crate::components::all() {
            registry.insert(component);
        }
        registry
    }

    /// Add a descriptor, failing when the key is taken.
    pub fn register(&mut self, component: Component) -> Result<(), RegistryError> {
        if self.components.contains_key(&component.key) {
            return Err(RegistryError::Duplicate {
                kind: "component",
                name: component.key,
            });
        }
        self.insert(component);
        Ok(())
    }

    fn insert(&mut self, component: Component) {
        self.components.insert(component.key.clone(), component);
    }

    /// Descriptor of a top-level key or a dotted `domain.platform` key.
    #[must_use]
    pub fn resolve(&self, key: &str) -> Option<&Component> {
        self.components.get(key)
    }

    /// Descriptor of the `platform` entry type under `domain`.
    #[must_use]
    pub fn platform(&self, domain: &str, platform: &str) -> Option<&Component> {
        self.components.get(format!("{domain}.{platform}").as_str())
    }

    /// Keys in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &SmolStr> {
        self.components.keys()
    }

    /// Build the action, condition, filter, pin and trigger registries from
    /// the built-ins plus every component's contributions.
    pub fn registries(&self) -> Result<Registries, RegistryError> {
        let mut registries = Registries::default();
        automation::register_builtins(&mut registries)?;
        for component in self.components.values() {
            if let Some(register) = component.register {
                register(&mut registries)?;
            }
        }
        Ok(registries)
    }

    /// Build flags and libraries contributed by `keys`, sorted.
    #[must_use]
    pub fn harvest<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> (BTreeSet<&'static str>, BTreeSet<&'static str>) {
        let mut flags = BTreeSet::new();
        let mut libraries = BTreeSet::new();
        for key in keys {
            if let Some(component) = self.resolve(key) {
                flags.extend(component.build_flags.iter().copied());
                libraries.extend(component.libraries.iter().copied());
            }
        }
        (flags, libraries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_keys_resolve_to_platforms() {
        let registry = ComponentRegistry::builtin();
        assert!(registry.resolve("binary_sensor").unwrap().platform_host);
        let gpio = registry.platform("binary_sensor", "gpio").unwrap();
        assert_eq!(gpio.key, "binary_sensor.gpio");
        assert_eq!(gpio.domain(), "binary_sensor");
        assert!(registry.resolve("binary_sensor.nope").is_none());
    }

    #[test]
    fn duplicate_components_are_rejected() {
        let mut registry = ComponentRegistry::builtin();
        let err = registry.register(Component::new("logger")).unwrap_err();
        assert_eq!(err.to_string(), "component 'logger' is already registered");
    }

    #[test]
    fn bundled_registries_have_no_name_clashes() {
        let registries = ComponentRegistry::builtin().registries().unwrap();
        assert!(registries.actions.contains("switch.toggle"));
        assert!(registries.conditions.contains("binary_sensor.is_on"));
        assert!(registries.filters.contains("delayed_on"));
        assert!(registries.pins.contains("pcf8574"));
        assert!(registries.triggers.contains("on_press"));
    }

    #[test]
    fn platform_whitelist() {
        let registry = ComponentRegistry::builtin();
        let tracker = registry.resolve("esp32_ble_tracker").unwrap();
        assert!(tracker.supports(EspPlatform::Esp32));
        assert!(!tracker.supports(EspPlatform::Esp8266));
        assert!(registry.resolve("wifi").unwrap().supports(EspPlatform::Esp8266));
    }
}
