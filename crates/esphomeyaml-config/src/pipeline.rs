//! Whole-document validation.
//!
//! Discovers which components a document loads (including auto-loads),
//! gates them on platform, dependencies and conflicts, validates every
//! entry against its schema, allocates and resolves identifiers, orders
//! components by dependency and finally runs cross-component checks.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use esphomeyaml_codegen::{ClassRef, IdAllocator};
use indexmap::{IndexMap, IndexSet};
use smol_str::SmolStr;
use tracing::{debug, info};

use crate::component::{Component, ComponentRegistry};
use crate::core_config::{self, CoreInfo};
use crate::cv::ValidateContext;
use crate::error::{
    format_path, ConfigError, ConfigIssue, ConfigIssues, Invalid, InvalidKind, PathSegment,
};
use crate::loader;
use crate::node::{Map, Mark, Node, Value};

/// Top-level keys every document must carry.
pub const REQUIRED_COMPONENTS: [&str; 2] = [core_config::DOMAIN, "wifi"];

/// A document that passed validation.
#[derive(Clone)]
pub struct ValidatedConfig {
    /// Normalized document with every identifier named.
    pub config: Node,
    /// Loaded component keys (dotted for platforms) in dependency order,
    /// core first.
    pub order: Vec<SmolStr>,
    /// Context the document was validated with.
    pub context: ValidateContext,
}

impl std::fmt::Debug for ValidatedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatedConfig")
            .field("config", &self.config)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

impl ValidatedConfig {
    /// Typed view of the core section.
    pub fn core(&self) -> Result<CoreInfo, ConfigError> {
        CoreInfo::from_config(&self.config)
    }

    /// Entries configured for `key`: the matching platform entries for a
    /// dotted key, every item of a multi-conf list, or the single section.
    #[must_use]
    pub fn entries(&self, key: &str) -> Vec<&Node> {
        if let Some((domain, platform)) = key.split_once('.') {
            return self
                .config
                .get_seq(domain)
                .iter()
                .filter(|entry| entry.get_str("platform") == Some(platform))
                .collect();
        }
        match self.config.get(key) {
            Some(Node {
                value: Value::Seq(items),
                ..
            }) => items.iter().collect(),
            Some(node) => vec![node],
            None => Vec::new(),
        }
    }
}

/// Load `path` and validate it with `components`.
pub fn read_config(path: &Path, components: &ComponentRegistry) -> Result<ValidatedConfig, ConfigError> {
    info!("Reading configuration {}...", path.display());
    let raw = loader::load_yaml(path)?;
    let config_dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    validate_config(&raw, config_dir, components)
}

/// Validate a loaded document.
pub fn validate_config(
    raw: &Node,
    config_dir: PathBuf,
    components: &ComponentRegistry,
) -> Result<ValidatedConfig, ConfigError> {
    let Some(document) = raw.as_map() else {
        return Err(ConfigError::Core("Configuration must be a mapping.".to_string()));
    };
    for required in REQUIRED_COMPONENTS {
        if !document.contains_key(required) {
            return Err(ConfigError::MissingComponent(SmolStr::new(required)));
        }
    }
    let registries = components
        .registries()
        .map_err(|err| ConfigError::Core(err.to_string()))?;
    let context = core_config::preload(raw, config_dir)?.with_registries(Arc::new(registries));

    let mut run = Run::new(components, &context);
    run.discover(document);
    run.gate();
    let mut config = run.validate_entries();
    run.resolve_ids(&mut config);
    if !run.issues.is_empty() {
        return Err(ConfigError::Invalid(ConfigIssues(run.issues)));
    }
    let order = run.order()?;
    run.final_validate(&config, &order);
    if !run.issues.is_empty() {
        return Err(ConfigError::Invalid(ConfigIssues(run.issues)));
    }
    debug!("Component order: {order:?}");
    Ok(ValidatedConfig {
        config,
        order,
        context,
    })
}

/// State of one validation run.
struct Run<'a> {
    components: &'a ComponentRegistry,
    context: &'a ValidateContext,
    /// Top-level sections by domain, auto-loaded ones appended.
    sections: IndexMap<SmolStr, Node>,
    /// Loaded keys in discovery order, dotted for platforms.
    loaded: IndexSet<SmolStr>,
    /// Keys whose checks failed; they are not validated further.
    rejected: IndexSet<SmolStr>,
    issues: Vec<ConfigIssue>,
}

impl<'a> Run<'a> {
    fn new(components: &'a ComponentRegistry, context: &'a ValidateContext) -> Self {
        Self {
            components,
            context,
            sections: IndexMap::new(),
            loaded: IndexSet::new(),
            rejected: IndexSet::new(),
            issues: Vec::new(),
        }
    }

    fn report(&mut self, domain: &str, message: impl Into<String>, mark: Option<Mark>) {
        self.issues.push(ConfigIssue {
            domain: Some(SmolStr::new(domain)),
            message: message.into(),
            mark,
        });
    }

    fn descriptor(&self, key: &str) -> Option<&'a Component> {
        self.components.resolve(key)
    }

    /// Collect sections and the platforms they name, following auto-loads.
    fn discover(&mut self, document: &Map) {
        for (key, conf) in document {
            if key.starts_with('.') {
                continue;
            }
            let conf = if conf.is_null() {
                Node::marked(Value::Map(Map::new()), conf.mark.clone())
            } else {
                conf.clone()
            };
            self.sections.insert(key.clone(), conf);
        }

        let mut queue: VecDeque<SmolStr> = self.sections.keys().cloned().collect();
        while let Some(domain) = queue.pop_front() {
            if self.loaded.contains(&domain) {
                continue;
            }
            let mark = self.sections.get(&domain).and_then(|conf| conf.mark.clone());
            let Some(component) = self.descriptor(&domain) else {
                self.report(&domain, format!("Component not found: {domain}"), mark);
                continue;
            };
            self.loaded.insert(domain.clone());
            let mut auto_load: Vec<&'static str> = component.auto_load.to_vec();
            if component.platform_host {
                auto_load.extend(self.discover_platforms(&domain));
            }
            for key in auto_load {
                if self.sections.contains_key(key) {
                    continue;
                }
                let Some(loaded) = self.descriptor(key) else {
                    self.report(&domain, format!("Component not found: {key}"), None);
                    continue;
                };
                info!("Auto-loading component {key} for {domain}");
                let empty = if loaded.platform_host {
                    Node::seq(Vec::new())
                } else {
                    Node::empty_map()
                };
                self.sections.insert(SmolStr::new(key), empty);
                queue.push_back(SmolStr::new(key));
            }
        }
    }

    /// Normalize a host section to a list and register its platforms.
    /// Returns what those platforms auto-load.
    fn discover_platforms(&mut self, domain: &SmolStr) -> Vec<&'static str> {
        let Some(section) = self.sections.get_mut(domain) else {
            return Vec::new();
        };
        let items = match &section.value {
            Value::Seq(_) => None,
            Value::Map(map) if map.is_empty() => Some(Vec::new()),
            _ => Some(vec![section.clone()]),
        };
        if let Some(items) = items {
            *section = Node::marked(Value::Seq(items), section.mark.clone());
        }
        let entries = section.as_seq().map(<[Node]>::to_vec).unwrap_or_default();

        let mut auto_load = Vec::new();
        for entry in entries {
            if entry.as_map().is_none() {
                self.report(domain, "Platform schemas must have 'platform:' key", entry.mark.clone());
                continue;
            }
            let Some(platform) = entry.get_str("platform") else {
                self.report(domain, format!("No platform specified for {domain}"), entry.mark.clone());
                continue;
            };
            let key = SmolStr::new(format!("{domain}.{platform}"));
            let Some(component) = self.descriptor(&key) else {
                self.report(domain, format!("Platform not found: '{key}'"), entry.mark.clone());
                continue;
            };
            if self.loaded.insert(key) {
                auto_load.extend(component.auto_load.iter().copied());
            }
        }
        auto_load
    }

    /// Platform support, dependencies, conflicts and multi-conf checks.
    fn gate(&mut self) {
        let platform = self.context.platform;
        let keys: Vec<SmolStr> = self.loaded.iter().cloned().collect();
        for key in keys {
            let Some(component) = self.descriptor(&key) else {
                continue;
            };
            let label = if key.contains('.') { "Platform" } else { "Component" };
            let mark = self.sections.get(component.domain()).and_then(|conf| conf.mark.clone());
            let before = self.issues.len();

            if !component.supports(platform) {
                self.report(&key, format!("{label} {key} doesn't support {platform}."), mark.clone());
            }
            for dependency in component.dependencies {
                if !self.sections.contains_key(*dependency) {
                    self.report(
                        &key,
                        format!("{label} {key} requires component {dependency}"),
                        mark.clone(),
                    );
                }
            }
            for other in component.conflicts_with {
                if self.sections.contains_key(*other) {
                    self.report(
                        &key,
                        format!("Component {key} cannot be used together with component {other}"),
                        mark.clone(),
                    );
                }
            }
            let is_list = self
                .sections
                .get(&key)
                .is_some_and(|conf| matches!(conf.value, Value::Seq(_)));
            if is_list && !component.multi_conf && !component.platform_host {
                self.report(&key, format!("Component {key} cannot be loaded multiple times."), mark);
            }

            if self.issues.len() > before {
                self.rejected.insert(key);
            }
        }
    }

    /// Run every section through its schema.
    fn validate_entries(&mut self) -> Node {
        let mut out = Map::new();
        let sections: Vec<(SmolStr, Node)> = self
            .sections
            .iter()
            .map(|(key, conf)| (key.clone(), conf.clone()))
            .collect();
        for (domain, conf) in sections {
            if !self.loaded.contains(&domain) || self.rejected.contains(&domain) {
                continue;
            }
            let Some(component) = self.descriptor(&domain) else {
                continue;
            };
            let validated = if component.platform_host {
                self.validate_platforms(&domain, &conf)
            } else if component.multi_conf {
                let items = match &conf.value {
                    Value::Seq(items) => items.clone(),
                    _ => vec![conf.clone()],
                };
                let mut validated = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    match self.check(component, item) {
                        Ok(node) => validated.push(node),
                        Err(err) => {
                            self.report_invalid(&domain, err.prefixed(PathSegment::Index(index)), item)
                        }
                    }
                }
                Node::marked(Value::Seq(validated), conf.mark.clone())
            } else {
                match self.check(component, &conf) {
                    Ok(node) => node,
                    Err(err) => {
                        self.report_invalid(&domain, err, &conf);
                        continue;
                    }
                }
            };
            out.insert(domain, validated);
        }
        Node::new(Value::Map(out))
    }

    fn validate_platforms(&mut self, domain: &SmolStr, conf: &Node) -> Node {
        let mut validated = Vec::new();
        for entry in conf.as_seq().unwrap_or_default() {
            let Some(platform) = entry.get_str("platform") else {
                continue;
            };
            let key = format!("{domain}.{platform}");
            if self.rejected.contains(key.as_str()) {
                continue;
            }
            let Some(component) = self.descriptor(&key) else {
                continue;
            };
            match self.check(component, entry) {
                Ok(node) => validated.push(node),
                Err(err) => self.report_invalid(&key, err, entry),
            }
        }
        Node::marked(Value::Seq(validated), conf.mark.clone())
    }

    fn check(&self, component: &Component, conf: &Node) -> Result<Node, Invalid> {
        match component.schema {
            Some(schema) => schema()
                .validate(conf, self.context)
                .map_err(|err| err.or_mark(conf.mark.as_ref())),
            None => Ok(conf.clone()),
        }
    }

    fn report_invalid(&mut self, domain: &str, err: Invalid, conf: &Node) {
        for item in err.items() {
            let text = match &item.kind {
                InvalidKind::ExtraKey => {
                    format!("[{}] is an invalid option for [{domain}].", item.last_key())
                }
                InvalidKind::MissingKey => {
                    format!("'{}' is a required option for [{domain}].", item.last_key())
                }
                InvalidKind::Message(message) => with_period(message),
            };
            let mut message = format!("Invalid config for [{domain}]: {text}");
            if !item.path.is_empty() {
                message.push_str(&format!(" Check {domain}->{}.", format_path(&item.path)));
            }
            let mark = item.mark.clone().or_else(|| conf.mark.clone());
            self.report(domain, message, mark);
        }
    }

    /// Name generated declarations and check every reference.
    fn resolve_ids(&mut self, config: &mut Node) {
        struct Declared {
            name: SmolStr,
            declared_type: Option<ClassRef>,
            mark: Option<Mark>,
        }
        let mut allocator = IdAllocator::new();
        let mut declared: Vec<Declared> = Vec::new();
        let mut issues = Vec::new();

        config.visit_mut(&mut Vec::new(), &mut |node, path| {
            let Value::Id(id) = &node.value else { return };
            let Some(name) = id.name().filter(|_| id.is_declaration()).cloned() else {
                return;
            };
            if let Some(previous) = declared.iter().find(|entry| entry.name == name) {
                let mut message = format!("ID {name} redefined!");
                if let Some(first) = &previous.mark {
                    message.push_str(&format!(" First defined at {first}."));
                }
                issues.push(id_issue(path, message, node.mark.clone()));
                return;
            }
            if let Err(err) = allocator.claim(&name) {
                issues.push(id_issue(path, err.to_string(), node.mark.clone()));
            }
            declared.push(Declared {
                name,
                declared_type: id.declared_type().cloned(),
                mark: node.mark.clone(),
            });
        });

        config.visit_mut(&mut Vec::new(), &mut |node, _| {
            let mark = node.mark.clone();
            let Value::Id(id) = &mut node.value else { return };
            if id.is_declaration() && id.name().is_none() {
                let name = allocator.resolve(id);
                declared.push(Declared {
                    name,
                    declared_type: id.declared_type().cloned(),
                    mark,
                });
            }
        });

        config.visit_mut(&mut Vec::new(), &mut |node, path| {
            let mark = node.mark.clone();
            match &mut node.value {
                Value::Id(id) if !id.is_declaration() => match id.name().cloned() {
                    Some(name) => {
                        let Some(target) = declared.iter().find(|entry| entry.name == name) else {
                            issues.push(id_issue(path, format!("Couldn't find ID {name}"), mark));
                            return;
                        };
                        if let (Some(actual), Some(wanted)) = (&target.declared_type, id.declared_type()) {
                            if !actual.inherits_from(wanted) {
                                issues.push(id_issue(
                                    path,
                                    format!(
                                        "ID '{name}' of type {} doesn't inherit from {}. Please \
                                         double check your ID is pointing to the correct value",
                                        actual.path(),
                                        wanted.path()
                                    ),
                                    mark,
                                ));
                            }
                        }
                    }
                    None => {
                        let Some(wanted) = id.declared_type().cloned() else {
                            return;
                        };
                        let found = declared.iter().find(|entry| {
                            entry
                                .declared_type
                                .as_ref()
                                .is_some_and(|actual| actual.inherits_from(&wanted))
                        });
                        match found {
                            Some(entry) => id.set_name(entry.name.clone()),
                            None => issues.push(id_issue(
                                path,
                                format!("Couldn't resolve ID for type {}", wanted.path()),
                                mark,
                            )),
                        }
                    }
                },
                Value::Lambda(lambda) => {
                    for name in lambda.requires_ids() {
                        if !declared.iter().any(|entry| entry.name == name) {
                            issues.push(id_issue(path, format!("Couldn't find ID {name}"), mark.clone()));
                        }
                    }
                }
                _ => {}
            }
        });
        self.issues.extend(issues);
    }

    /// Dependency order: core first, then every key after what it needs.
    fn order(&self) -> Result<Vec<SmolStr>, ConfigError> {
        let mut order = IndexSet::new();
        let mut visiting = Vec::new();
        if self.loaded.contains(core_config::DOMAIN) {
            order.insert(SmolStr::new(core_config::DOMAIN));
        }
        for key in &self.loaded {
            self.visit_order(key, &mut visiting, &mut order)?;
        }
        Ok(order.into_iter().collect())
    }

    fn visit_order(
        &self,
        key: &SmolStr,
        visiting: &mut Vec<SmolStr>,
        order: &mut IndexSet<SmolStr>,
    ) -> Result<(), ConfigError> {
        if order.contains(key) {
            return Ok(());
        }
        if let Some(position) = visiting.iter().position(|entry| entry == key) {
            let mut cycle: Vec<&str> = visiting[position..].iter().map(SmolStr::as_str).collect();
            cycle.push(key);
            return Err(ConfigError::DependencyCycle(cycle.join(" -> ")));
        }
        let Some(component) = self.descriptor(key) else {
            return Ok(());
        };
        visiting.push(key.clone());
        let host = key.split_once('.').map(|(domain, _)| domain);
        let needs = component
            .dependencies
            .iter()
            .chain(component.auto_load)
            .copied()
            .chain(host);
        for need in needs {
            let need = SmolStr::new(need);
            if self.loaded.contains(&need) {
                self.visit_order(&need, visiting, order)?;
            }
        }
        visiting.pop();
        order.insert(key.clone());
        Ok(())
    }

    /// Cross-component checks on the fully resolved document.
    fn final_validate(&mut self, config: &Node, order: &[SmolStr]) {
        let view = ValidatedConfig {
            config: config.clone(),
            order: order.to_vec(),
            context: self.context.clone(),
        };
        for key in order {
            let Some(check) = self.descriptor(key).and_then(|component| component.final_validate) else {
                continue;
            };
            for entry in view.entries(key) {
                if let Err(err) = check(entry, config, self.context) {
                    self.report_invalid(key, err, entry);
                }
            }
        }
    }
}

fn id_issue(path: &[PathSegment], message: String, mark: Option<Mark>) -> ConfigIssue {
    let domain = match path.first() {
        Some(PathSegment::Key(key)) => Some(key.clone()),
        _ => None,
    };
    ConfigIssue {
        domain,
        message,
        mark,
    }
}

fn with_period(message: &str) -> String {
    if message.ends_with(['.', '!', '?']) {
        message.to_string()
    } else {
        format!("{message}.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<(&'static str, Node)> {
        vec![
            (
                "esphomeyaml",
                Node::map([
                    ("name", Node::from("node1")),
                    ("platform", Node::from("ESP8266")),
                    ("board", Node::from("nodemcuv2")),
                ]),
            ),
            (
                "wifi",
                Node::map([("ssid", Node::from("home")), ("password", Node::from("secret1234"))]),
            ),
        ]
    }

    fn run(extra: Vec<(&'static str, Node)>) -> Result<ValidatedConfig, ConfigError> {
        let mut entries = base();
        entries.extend(extra);
        validate_config(&Node::map(entries), PathBuf::from("."), &ComponentRegistry::builtin())
    }

    fn messages(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::Invalid(issues) => issues.0.into_iter().map(|issue| issue.message).collect(),
            other => vec![other.to_string()],
        }
    }

    #[test]
    fn minimal_document_orders_core_first() {
        let validated = run(Vec::new()).unwrap();
        assert_eq!(validated.order, vec!["esphomeyaml", "wifi"]);
        assert_eq!(validated.core().unwrap().name, "node1");
    }

    #[test]
    fn wifi_is_required() {
        let err = validate_config(
            &Node::map([base().remove(0)]),
            PathBuf::from("."),
            &ComponentRegistry::builtin(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Component wifi is required for esphomeyaml.");
    }

    #[test]
    fn unknown_component_and_platform() {
        let err = run(vec![
            ("frobnicator", Node::null()),
            ("switch", Node::seq(vec![Node::map([("platform", Node::from("warp"))])])),
        ])
        .unwrap_err();
        assert_eq!(
            messages(err),
            vec!["Component not found: frobnicator", "Platform not found: 'switch.warp'"]
        );
    }

    #[test]
    fn platform_entries_need_platform_key() {
        let err = run(vec![("switch", Node::seq(vec![Node::map([("name", Node::from("x"))])]))])
            .unwrap_err();
        assert_eq!(messages(err), vec!["No platform specified for switch"]);
    }

    #[test]
    fn missing_dependency_is_reported() {
        let err = run(vec![("mpr121", Node::null())]).unwrap_err();
        assert_eq!(messages(err), vec!["Component mpr121 requires component i2c"]);
    }

    #[test]
    fn auto_load_inserts_host_before_platform() {
        let validated = run(vec![
            ("i2c", Node::null()),
            ("mpr121", Node::map([("id", Node::from("touch"))])),
        ])
        .unwrap();
        let position = |key: &str| validated.order.iter().position(|entry| entry == key).unwrap();
        assert!(position("i2c") < position("mpr121"));
        assert!(position("binary_sensor") < position("mpr121"));
        assert!(validated.config.get_seq("binary_sensor").is_empty());
    }

    #[test]
    fn esp32_only_component_is_gated() {
        let err = run(vec![("esp32_ble_tracker", Node::null())]).unwrap_err();
        assert_eq!(messages(err), vec!["Component esp32_ble_tracker doesn't support ESP8266."]);
    }

    #[test]
    fn non_multi_conf_lists_are_rejected() {
        let err = run(vec![("logger", Node::seq(vec![Node::empty_map(), Node::empty_map()]))])
            .unwrap_err();
        assert_eq!(messages(err), vec!["Component logger cannot be loaded multiple times."]);
    }

    #[test]
    fn schema_errors_name_the_option() {
        let err = run(vec![("logger", Node::map([("baud", Node::from(9600_i64))]))]).unwrap_err();
        assert_eq!(
            messages(err),
            vec!["Invalid config for [logger]: [baud] is an invalid option for [logger]. Check logger->baud."]
        );
    }

    #[test]
    fn duplicate_and_dangling_ids() {
        let gpio = |id: &str, pin: i64| {
            Node::map([
                ("platform", Node::from("gpio")),
                ("id", Node::from(id)),
                ("pin", Node::from(pin)),
            ])
        };
        let err = run(vec![("switch", Node::seq(vec![gpio("relay", 4), gpio("relay", 5)]))])
            .unwrap_err();
        assert_eq!(messages(err), vec!["ID relay redefined!"]);

        let err = run(vec![(
            "switch",
            Node::seq(vec![Node::map([
                ("platform", Node::from("output")),
                ("name", Node::from("Fan")),
            ])]),
        )])
        .unwrap_err();
        assert_eq!(messages(err), vec!["Platform not found: 'switch.output'"]);

        let err = run(vec![(
            "binary_sensor",
            Node::seq(vec![Node::map([
                ("platform", Node::from("mpr121")),
                ("name", Node::from("Pad")),
                ("mpr121_id", Node::from("nowhere")),
                ("channel", Node::from(1_i64)),
            ])]),
        )])
        .unwrap_err();
        assert_eq!(messages(err), vec!["Platform binary_sensor.mpr121 requires component mpr121"]);
    }

    #[test]
    fn generated_ids_avoid_manual_names() {
        let validated = run(vec![(
            "switch",
            Node::seq(vec![
                Node::map([
                    ("platform", Node::from("gpio")),
                    ("name", Node::from("A")),
                    ("pin", Node::from(4_i64)),
                ]),
                Node::map([
                    ("platform", Node::from("gpio")),
                    ("id", Node::from("switch__gpioswitch")),
                    ("pin", Node::from(5_i64)),
                ]),
            ]),
        )])
        .unwrap();
        let first = &validated.config.get_seq("switch")[0];
        assert_eq!(first.get_id("id").map(|id| id.as_str().to_string()), Some("switch__gpioswitch_2".to_string()));
    }

    #[test]
    fn final_validate_vetoes_after_ids_resolve() {
        let pad = |channel: i64| {
            Node::map([
                ("platform", Node::from("mpr121")),
                ("name", Node::from(format!("Pad {channel}"))),
                ("channel", Node::from(channel)),
            ])
        };
        let err = run(vec![
            ("i2c", Node::null()),
            ("mpr121", Node::map([("id", Node::from("touch"))])),
            ("binary_sensor", Node::seq(vec![pad(2), pad(2)])),
        ])
        .unwrap_err();
        assert_eq!(
            messages(err),
            vec!["Invalid config for [mpr121]: Channel 2 of touch is used by more than one binary sensor."]
        );
    }
}
