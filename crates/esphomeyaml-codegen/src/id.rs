//! Declaration identifiers and deterministic name allocation.

use std::fmt;

use rustc_hash::FxHashSet;
use smol_str::SmolStr;
use thiserror::Error;

use crate::types::ClassRef;

/// C++ keywords plus symbols the generated sketch already defines.
pub const RESERVED_IDS: &[&str] = &[
    // C++ keywords
    "alignas",
    "alignof",
    "and",
    "and_eq",
    "asm",
    "auto",
    "bitand",
    "bitor",
    "bool",
    "break",
    "case",
    "catch",
    "char",
    "char16_t",
    "char32_t",
    "class",
    "compl",
    "concept",
    "const",
    "constexpr",
    "const_cast",
    "continue",
    "decltype",
    "default",
    "delete",
    "do",
    "double",
    "dynamic_cast",
    "else",
    "enum",
    "explicit",
    "export",
    "extern",
    "false",
    "float",
    "for",
    "friend",
    "goto",
    "if",
    "inline",
    "int",
    "long",
    "mutable",
    "namespace",
    "new",
    "noexcept",
    "not",
    "not_eq",
    "nullptr",
    "operator",
    "or",
    "or_eq",
    "private",
    "protected",
    "public",
    "register",
    "reinterpret_cast",
    "requires",
    "return",
    "short",
    "signed",
    "sizeof",
    "static",
    "static_assert",
    "static_cast",
    "struct",
    "switch",
    "template",
    "this",
    "thread_local",
    "throw",
    "true",
    "try",
    "typedef",
    "typeid",
    "typename",
    "union",
    "unsigned",
    "using",
    "virtual",
    "void",
    "volatile",
    "wchar_t",
    "while",
    "xor",
    "xor_eq",
    // Arduino / application globals
    "App",
    "pinMode",
    "delay",
    "delayMicroseconds",
    "digitalRead",
    "digitalWrite",
    "INPUT",
    "OUTPUT",
];

/// Returns true if `name` cannot be used as a variable name.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    RESERVED_IDS.contains(&name)
}

/// Rejected manual identifier.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("ID must not be empty")]
    Empty,
    #[error("First character in ID cannot be a digit.")]
    LeadingDigit,
    #[error("Dashes are not supported in IDs, please use underscores instead.")]
    Dash,
    #[error(
        "IDs must only consist of upper/lowercase characters, the underscore character and \
         numbers. The character '{0}' cannot be used"
    )]
    InvalidCharacter(char),
    #[error("ID {0} is reserved internally and cannot be used")]
    Reserved(SmolStr),
    #[error("ID {0} redefined!")]
    Redefined(SmolStr),
}

/// Check that a user-supplied name is a usable C++ symbol.
pub fn validate_id_name(name: &str) -> Result<(), IdError> {
    let Some(first) = name.chars().next() else {
        return Err(IdError::Empty);
    };
    if first.is_ascii_digit() {
        return Err(IdError::LeadingDigit);
    }
    if name.contains('-') {
        return Err(IdError::Dash);
    }
    if let Some(ch) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_'))
    {
        return Err(IdError::InvalidCharacter(ch));
    }
    if is_reserved(name) {
        return Err(IdError::Reserved(SmolStr::new(name)));
    }
    Ok(())
}

/// Identifier of a declared or referenced variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Id {
    name: Option<SmolStr>,
    is_declaration: bool,
    is_manual: bool,
    declared_type: Option<ClassRef>,
}

impl Id {
    /// Declaration; `name` is `None` when the user did not pick one.
    #[must_use]
    pub fn declaration(name: Option<&str>, declared_type: Option<ClassRef>) -> Self {
        Self {
            name: name.map(SmolStr::new),
            is_declaration: true,
            is_manual: name.is_some(),
            declared_type,
        }
    }

    /// Reference to another declaration; `name` is `None` when the target is
    /// found by type.
    #[must_use]
    pub fn reference(name: Option<&str>, declared_type: Option<ClassRef>) -> Self {
        Self {
            name: name.map(SmolStr::new),
            is_declaration: false,
            is_manual: name.is_some(),
            declared_type,
        }
    }

    /// Resolved or manual name.
    #[must_use]
    pub fn name(&self) -> Option<&SmolStr> {
        self.name.as_ref()
    }

    /// Name or the empty string when unresolved.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Declaration site rather than a reference.
    #[must_use]
    pub fn is_declaration(&self) -> bool {
        self.is_declaration
    }

    /// The user wrote the name.
    #[must_use]
    pub fn is_manual(&self) -> bool {
        self.is_manual
    }

    /// Type used for automatic naming and inheritance checks.
    #[must_use]
    pub fn declared_type(&self) -> Option<&ClassRef> {
        self.declared_type.as_ref()
    }

    /// Override the declared type.
    pub fn set_type(&mut self, declared_type: ClassRef) {
        self.declared_type = Some(declared_type);
    }

    /// Bind a reference to a resolved name.
    pub fn set_name(&mut self, name: SmolStr) {
        self.name = Some(name);
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slug used for automatic names: `esphomelib::mqtt::MQTTClientComponent`
/// becomes `esphomelib_mqtt_mqttclientcomponent`.
#[must_use]
pub fn slugify_type(ty: &ClassRef) -> String {
    ty.path()
        .replace("::", "_")
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_')
        .collect()
}

/// First of `base`, `base_2`, `base_3`, ... not in `taken`.
#[must_use]
pub fn ensure_unique_name(base: &str, taken: &FxHashSet<SmolStr>) -> SmolStr {
    let mut candidate = SmolStr::new(base);
    let mut tries = 1;
    while taken.contains(&candidate) {
        tries += 1;
        candidate = SmolStr::new(format!("{base}_{tries}"));
    }
    candidate
}

/// Hands out names for one document. Manual names are registered first so
/// generated names never shadow them.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    taken: FxHashSet<SmolStr>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Allocator that already refuses every reserved name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            taken: RESERVED_IDS.iter().map(|name| SmolStr::new(name)).collect(),
        }
    }

    /// Claim a manual name.
    pub fn claim(&mut self, name: &str) -> Result<(), IdError> {
        validate_id_name(name)?;
        if !self.taken.insert(SmolStr::new(name)) {
            return Err(IdError::Redefined(SmolStr::new(name)));
        }
        Ok(())
    }

    /// Generate a fresh name for an identifier of type `ty`.
    pub fn generate(&mut self, ty: Option<&ClassRef>) -> SmolStr {
        let base = ty.map_or_else(|| "id".to_string(), slugify_type);
        let base = if base.is_empty() { "id".to_string() } else { base };
        let name = ensure_unique_name(&base, &self.taken);
        self.taken.insert(name.clone());
        name
    }

    /// Resolve `id` in place: manual names are returned as they are,
    /// automatic ones get a generated name.
    pub fn resolve(&mut self, id: &mut Id) -> SmolStr {
        if let Some(name) = &id.name {
            return name.clone();
        }
        let name = self.generate(id.declared_type.as_ref());
        id.name = Some(name.clone());
        name
    }

    /// True if `name` is already handed out or reserved.
    #[must_use]
    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_name_checks() {
        assert_eq!(validate_id_name(""), Err(IdError::Empty));
        assert_eq!(validate_id_name("1abc"), Err(IdError::LeadingDigit));
        assert_eq!(validate_id_name("my-id"), Err(IdError::Dash));
        assert_eq!(
            validate_id_name("my.id"),
            Err(IdError::InvalidCharacter('.'))
        );
        assert_eq!(
            validate_id_name("delay"),
            Err(IdError::Reserved("delay".into()))
        );
        assert!(validate_id_name("living_room_2").is_ok());
    }

    #[test]
    fn generated_names_slugify_type_and_count_up() {
        let ty = ClassRef::new("binary_sensor::GPIOBinarySensorComponent");
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.generate(Some(&ty)), "binary_sensor_gpiobinarysensorcomponent");
        assert_eq!(
            alloc.generate(Some(&ty)),
            "binary_sensor_gpiobinarysensorcomponent_2"
        );
        assert_eq!(
            alloc.generate(Some(&ty)),
            "binary_sensor_gpiobinarysensorcomponent_3"
        );
    }

    #[test]
    fn generated_names_skip_manual_and_reserved() {
        let mut alloc = IdAllocator::new();
        alloc.claim("trigger").unwrap();
        assert_eq!(alloc.generate(Some(&ClassRef::new("Trigger"))), "trigger_2");
        assert_eq!(alloc.generate(Some(&ClassRef::new("App"))), "app");
    }

    #[test]
    fn duplicate_manual_claim_is_rejected() {
        let mut alloc = IdAllocator::new();
        alloc.claim("relay").unwrap();
        assert_eq!(alloc.claim("relay"), Err(IdError::Redefined("relay".into())));
    }

    #[test]
    fn resolve_keeps_manual_names() {
        let mut alloc = IdAllocator::new();
        let mut manual = Id::declaration(Some("door"), None);
        assert_eq!(alloc.resolve(&mut manual), "door");
        let mut auto = Id::declaration(None, Some(ClassRef::new("mqtt::MQTTClientComponent")));
        assert_eq!(alloc.resolve(&mut auto), "mqtt_mqttclientcomponent");
        assert!(!auto.is_manual());
    }
}
