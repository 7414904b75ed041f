//! Namespace and class references used as declaration types.

use std::fmt;
use std::hash::{Hash, Hasher};

use smol_str::SmolStr;

use crate::expr::Expression;

/// A C++ namespace such as `esphomelib::binary_sensor`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    path: SmolStr,
}

impl Namespace {
    /// Top-level namespace.
    #[must_use]
    pub fn root(name: &str) -> Self {
        Self {
            path: SmolStr::new(name),
        }
    }

    /// Nested namespace `self::name`.
    #[must_use]
    pub fn namespace(&self, name: &str) -> Self {
        Self {
            path: join(&self.path, name),
        }
    }

    /// Class `self::name` deriving from `parents`.
    #[must_use]
    pub fn class(&self, name: &str, parents: &[&ClassRef]) -> ClassRef {
        ClassRef::with_parents(join(&self.path, name), parents)
    }

    /// Plain struct without base classes.
    #[must_use]
    pub fn struct_(&self, name: &str) -> ClassRef {
        self.class(name, &[])
    }

    /// Raw reference to a namespace member, e.g. an enum value.
    #[must_use]
    pub fn member(&self, name: &str) -> Expression {
        Expression::Raw(join(&self.path, name).to_string())
    }

    /// Fully qualified path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// A C++ type. Equality is structural on the rendered path; the flattened
/// ancestor list only feeds [`ClassRef::inherits_from`].
#[derive(Debug, Clone)]
pub struct ClassRef {
    path: SmolStr,
    parents: Vec<ClassRef>,
}

impl ClassRef {
    /// Type without known ancestors (builtins, raw names).
    #[must_use]
    pub fn new(path: impl Into<SmolStr>) -> Self {
        Self {
            path: path.into(),
            parents: Vec::new(),
        }
    }

    fn with_parents(path: SmolStr, parents: &[&ClassRef]) -> Self {
        let mut flat = Vec::new();
        for parent in parents {
            flat.push(ClassRef::new(parent.path.clone()));
            flat.extend(parent.parents.iter().cloned());
        }
        Self {
            path,
            parents: flat,
        }
    }

    /// Instantiate a template, e.g. `Trigger<NoArg>`. The instance inherits
    /// from the template itself and from all of its ancestors.
    #[must_use]
    pub fn template(&self, args: &[&ClassRef]) -> Self {
        let args = args
            .iter()
            .map(|arg| arg.path.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut parents = self.parents.clone();
        parents.push(ClassRef::new(self.path.clone()));
        Self {
            path: SmolStr::new(format!("{}<{args}>", self.path)),
            parents,
        }
    }

    /// `const T`.
    #[must_use]
    pub fn constant(&self) -> Self {
        Self::new(format!("const {}", self.path))
    }

    /// `T &`.
    #[must_use]
    pub fn reference(&self) -> Self {
        Self::new(format!("{} &", self.path))
    }

    /// `T *`.
    #[must_use]
    pub fn pointer(&self) -> Self {
        Self::new(format!("{} *", self.path))
    }

    /// True if `self` is `other` or derives from it.
    #[must_use]
    pub fn inherits_from(&self, other: &ClassRef) -> bool {
        self == other || self.parents.iter().any(|parent| parent == other)
    }

    /// `new T(args)`.
    #[must_use]
    pub fn new_instance(&self, args: Vec<Expression>) -> Expression {
        Expression::New {
            class: self.clone(),
            args,
        }
    }

    /// Static member `T::name`.
    #[must_use]
    pub fn scope(&self, name: &str) -> Expression {
        Expression::Raw(join(&self.path, name).to_string())
    }

    /// Rendered type name.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

fn join(base: &str, name: &str) -> SmolStr {
    if base.is_empty() {
        SmolStr::new(name)
    } else {
        SmolStr::new(format!("{base}::{name}"))
    }
}

/// Builtin scalar types.
pub mod builtin {
    #![allow(missing_docs)]

    use super::ClassRef;

    #[must_use]
    pub fn bool_() -> ClassRef {
        ClassRef::new("bool")
    }

    #[must_use]
    pub fn int32() -> ClassRef {
        ClassRef::new("int32_t")
    }

    #[must_use]
    pub fn uint8() -> ClassRef {
        ClassRef::new("uint8_t")
    }

    #[must_use]
    pub fn uint16() -> ClassRef {
        ClassRef::new("uint16_t")
    }

    #[must_use]
    pub fn uint32() -> ClassRef {
        ClassRef::new("uint32_t")
    }

    #[must_use]
    pub fn float_() -> ClassRef {
        ClassRef::new("float")
    }

    #[must_use]
    pub fn std_string() -> ClassRef {
        ClassRef::new("std::string")
    }

    #[must_use]
    pub fn void() -> ClassRef {
        ClassRef::new("void")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_paths_follow_namespaces() {
        let ns = Namespace::root("esphomelib").namespace("binary_sensor");
        let sensor = ns.class("BinarySensor", &[]);
        assert_eq!(sensor.path(), "esphomelib::binary_sensor::BinarySensor");
        assert_eq!(ns.member("ON").to_string(), "esphomelib::binary_sensor::ON");
    }

    #[test]
    fn inheritance_is_transitive() {
        let ns = Namespace::root("esphomelib");
        let nameable = ns.class("Nameable", &[]);
        let sensor = ns.class("BinarySensor", &[&nameable]);
        let gpio = ns.class("GPIOBinarySensor", &[&sensor]);
        assert!(gpio.inherits_from(&nameable));
        assert!(gpio.inherits_from(&gpio));
        assert!(!nameable.inherits_from(&gpio));
    }

    #[test]
    fn template_instances_inherit_from_their_template() {
        let ns = Namespace::root("esphomelib");
        let trigger = ns.class("Trigger", &[]);
        let no_arg = ns.struct_("NoArg");
        let instance = trigger.template(&[&no_arg]);
        assert_eq!(instance.path(), "esphomelib::Trigger<esphomelib::NoArg>");
        assert!(instance.inherits_from(&trigger));
    }

    #[test]
    fn operator_decorations() {
        let ty = ClassRef::new("std::string");
        assert_eq!(ty.constant().reference().path(), "const std::string &");
        assert_eq!(ty.pointer().path(), "std::string *");
    }
}
