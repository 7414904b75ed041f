//! Named registries of actions, conditions, filters, pin expanders and
//! triggers.
//!
//! Components register entries once at startup; validators look entries up
//! through [`ValidateContext::registries`](crate::cv::ValidateContext) and
//! code generation calls the bound builders.

use std::sync::Arc;

use esphomeyaml_codegen::{ClassRef, CodegenContext, Expression, Halt, Id};
use indexmap::IndexMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::cv::{declare_variable_id, EspPlatform, Schema, ValidateContext, Validator};
use crate::error::{Invalid, PathSegment};
use crate::node::{Map, Node, Value};

/// Registering an entry failed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The name is already taken in this registry.
    #[error("{kind} '{name}' is already registered")]
    Duplicate {
        /// Registry kind, e.g. `action`.
        kind: &'static str,
        /// Offending name.
        name: SmolStr,
    },
}

/// Ordered name → entry map.
#[derive(Debug, Clone)]
pub struct Registry<E> {
    kind: &'static str,
    entries: IndexMap<SmolStr, E>,
}

impl<E> Registry<E> {
    /// Empty registry; `kind` names the entries in error messages.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
        }
    }

    /// Add an entry. Names are unique per registry.
    pub fn register(&mut self, name: &str, entry: E) -> Result<(), RegistryError> {
        if self.entries.contains_key(name) {
            return Err(RegistryError::Duplicate {
                kind: self.kind,
                name: SmolStr::new(name),
            });
        }
        self.entries.insert(SmolStr::new(name), entry);
        Ok(())
    }

    /// Entry by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&E> {
        self.entries.get(name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&SmolStr, &E)> {
        self.entries.iter()
    }

    /// Kind used in messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

/// Builds an action or condition: receives the validated value, the item's
/// declared ID and the automation argument type, declares the variable and
/// returns it.
pub type BuildFn =
    fn(&Node, &Id, &ClassRef, &BuildEnv, &mut CodegenContext) -> Result<Expression, Halt>;

/// Builds a filter expression from its validated value.
pub type BuildFilterFn = fn(&Node, &BuildEnv, &mut CodegenContext) -> Result<Expression, Halt>;

/// Builds a pin object from the full validated pin mapping.
pub type BuildPinFn =
    fn(&Node, PinDirection, &BuildEnv, &mut CodegenContext) -> Result<Expression, Halt>;

/// Declares a trigger on its owner: receives the automation config, the
/// trigger ID and the owner variable, and returns the trigger variable.
pub type BuildTriggerFn =
    fn(&Node, &Id, &Expression, &BuildEnv, &mut CodegenContext) -> Result<Expression, Halt>;

/// Read-only state shared by every code generator of one run.
#[derive(Debug, Clone)]
pub struct BuildEnv {
    /// Registries the configuration was validated against.
    pub registries: Arc<Registries>,
    /// Active chip family.
    pub platform: EspPlatform,
    /// The whole validated configuration.
    pub config: Arc<Node>,
}

/// Action or condition entry.
#[derive(Debug, Clone)]
pub struct ActionEntry {
    /// Validator for the value under the key.
    pub schema: Validator,
    /// Type used to name generated IDs.
    pub id_type: ClassRef,
    /// Code generator.
    pub build: BuildFn,
}

/// Conditions share the action entry shape.
pub type ConditionEntry = ActionEntry;

/// Binary sensor filter entry.
#[derive(Debug, Clone)]
pub struct FilterEntry {
    /// Validator for the value under the key.
    pub schema: Validator,
    /// Code generator.
    pub build: BuildFilterFn,
}

/// Direction of a pin built by an expander.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    /// Digital input.
    Input,
    /// Digital output.
    Output,
}

/// Pin expander entry, selected by a key in the pin mapping.
#[derive(Debug, Clone)]
pub struct PinEntry {
    /// Schema of an input pin on the expander.
    pub input_schema: Validator,
    /// Schema of an output pin on the expander.
    pub output_schema: Validator,
    /// Code generator.
    pub build: BuildPinFn,
}

/// Automation trigger entry, keyed by the configuration key (`on_press`).
#[derive(Debug, Clone)]
pub struct TriggerEntry {
    /// Component domain whose entries carry this key.
    pub owner: SmolStr,
    /// Declared type of the trigger variable.
    pub trigger_type: ClassRef,
    /// Argument type passed to actions.
    pub arg_type: ClassRef,
    /// Extra keys accepted next to `then:`.
    pub extra: Schema,
    /// Code generator for the trigger.
    pub build: BuildTriggerFn,
}

/// All registries of one run.
#[derive(Debug, Clone)]
pub struct Registries {
    /// Automation actions.
    pub actions: Registry<ActionEntry>,
    /// Automation conditions.
    pub conditions: Registry<ConditionEntry>,
    /// Binary sensor filters.
    pub filters: Registry<FilterEntry>,
    /// Pin expanders.
    pub pins: Registry<PinEntry>,
    /// Automation triggers.
    pub triggers: Registry<TriggerEntry>,
}

impl Default for Registries {
    fn default() -> Self {
        Self {
            actions: Registry::new("action"),
            conditions: Registry::new("condition"),
            filters: Registry::new("filter"),
            pins: Registry::new("pin"),
            triggers: Registry::new("trigger"),
        }
    }
}

fn capitalized(kind: &str) -> String {
    let mut chars = kind.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

/// Validate a list of single-key mappings against `registry`.
///
/// A single mapping is treated as a one-item list. When `id_key` is set
/// every item gets that key with an ID declaration typed by `id_type_of`;
/// the registry key follows it in the output.
pub(crate) fn validate_registry_list<E>(
    registry: &Registry<E>,
    id_key: Option<&str>,
    node: &Node,
    ctx: &ValidateContext,
    parts: impl Fn(&E) -> (&Validator, Option<&ClassRef>),
) -> Result<Node, Invalid> {
    let (items, is_list): (Vec<Node>, bool) = match &node.value {
        Value::Seq(items) => (items.clone(), true),
        Value::Null => (Vec::new(), true),
        _ => (vec![node.clone()], false),
    };
    let mut out = Vec::with_capacity(items.len());
    let mut errors = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let result = validate_registry_item(registry, id_key, item, ctx, &parts);
        match result {
            Ok(value) => out.push(value),
            Err(err) if is_list => errors.push(err.prefixed(PathSegment::Index(index))),
            Err(err) => errors.push(err),
        }
    }
    if let Some(err) = Invalid::merge(errors) {
        return Err(err);
    }
    Ok(node.with_value(Value::Seq(out)))
}

fn validate_registry_item<E>(
    registry: &Registry<E>,
    id_key: Option<&str>,
    item: &Node,
    ctx: &ValidateContext,
    parts: &impl Fn(&E) -> (&Validator, Option<&ClassRef>),
) -> Result<Node, Invalid> {
    let kind = registry.kind();
    let Some(map) = item.as_map() else {
        return Err(Invalid::at(
            item,
            format!("{} must consist of key-value mapping! Got {item}", capitalized(kind)),
        ));
    };
    let is_id_key = |key: &SmolStr| id_key.is_some_and(|id_key| key.as_str() == id_key);
    let Some(key) = map.keys().find(|key| !is_id_key(key)).cloned() else {
        return Err(Invalid::at(item, format!("Key missing from {kind}! Got {item}")));
    };
    let Some(entry) = registry.get(&key) else {
        return Err(Invalid::at(
            item,
            format!("Unable to find {kind} with the name '{key}', is the component loaded?"),
        )
        .prefixed(PathSegment::Key(key)));
    };
    if let Some(other) = map.keys().find(|other| !is_id_key(other) && **other != key) {
        return Err(Invalid::at(
            item,
            format!("Cannot have two {kind}s in one item. Key {key} overrides {other}!"),
        ));
    }
    let (schema, id_type) = parts(entry);
    let value = map.get(&key).cloned().unwrap_or_else(Node::null);
    let value = schema
        .validate(&value, ctx)
        .map_err(|err| err.prefixed(PathSegment::Key(key.clone())))?;
    let mut out = Map::new();
    if let Some(id_key) = id_key {
        let raw_id = map.get(id_key).cloned().unwrap_or_else(Node::null);
        let ty = id_type.cloned().unwrap_or_else(|| ClassRef::new(kind));
        let id = declare_variable_id(ty)
            .validate(&raw_id, ctx)
            .map_err(|err| err.prefixed(PathSegment::Key(SmolStr::new(id_key))))?;
        out.insert(SmolStr::new(id_key), id);
    }
    out.insert(key, value);
    Ok(item.with_value(Value::Map(out)))
}

/// The registry key of a validated item and its value.
#[must_use]
pub fn item_entry<'a>(item: &'a Node, id_key: Option<&str>) -> Option<(&'a SmolStr, &'a Node)> {
    item.as_map()?
        .iter()
        .find(|(key, _)| id_key.is_none_or(|id_key| key.as_str() != id_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::{self, test_support::ctx};

    fn sample() -> Registry<FilterEntry> {
        fn build(_: &Node, _: &BuildEnv, _: &mut CodegenContext) -> Result<Expression, Halt> {
            Ok(Expression::raw("x"))
        }
        let mut registry = Registry::new("filter");
        registry
            .register(
                "invert",
                FilterEntry {
                    schema: cv::valid(),
                    build,
                },
            )
            .unwrap();
        registry
            .register(
                "delayed_on",
                FilterEntry {
                    schema: cv::positive_time_period_milliseconds(),
                    build,
                },
            )
            .unwrap();
        registry
    }

    fn run(node: Node) -> Result<Node, String> {
        let registry = sample();
        validate_registry_list(&registry, None, &node, &ctx(), |entry| (&entry.schema, None))
            .map_err(|err| err.to_string())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = sample();
        let err = registry
            .register(
                "invert",
                FilterEntry {
                    schema: cv::valid(),
                    build: |_, _, _| Ok(Expression::raw("y")),
                },
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "filter 'invert' is already registered");
    }

    #[test]
    fn validates_each_item() {
        let node = Node::seq(vec![
            Node::map([("invert", Node::null())]),
            Node::map([("delayed_on", Node::from("10ms"))]),
        ]);
        let out = run(node).unwrap();
        let items = out.as_seq().unwrap();
        let (key, value) = item_entry(&items[1], None).unwrap();
        assert_eq!(key, "delayed_on");
        assert_eq!(value.as_time().unwrap().value(), 10);
    }

    #[test]
    fn unknown_names_are_located() {
        let node = Node::seq(vec![
            Node::map([("invert", Node::null())]),
            Node::map([("flip", Node::null())]),
        ]);
        assert_eq!(
            run(node).unwrap_err(),
            "Unable to find filter with the name 'flip', is the component loaded? @ 1->flip"
        );
    }

    #[test]
    fn items_must_be_single_key_mappings() {
        assert_eq!(
            run(Node::seq(vec![Node::from("invert")])).unwrap_err(),
            "Filter must consist of key-value mapping! Got invert @ 0"
        );
        let two = Node::map([("invert", Node::null()), ("delayed_on", Node::from("1s"))]);
        assert_eq!(
            run(two).unwrap_err(),
            "Cannot have two filters in one item. Key invert overrides delayed_on!"
        );
    }
}
