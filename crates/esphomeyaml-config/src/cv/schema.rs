//! Mapping schemas.

use esphomeyaml_codegen::ClassRef;
use smol_str::SmolStr;

use super::{declare_variable_id, kind_error, Validator};
use crate::error::{Invalid, InvalidKind, PathSegment};
use crate::node::{Map, Node, Value};

#[derive(Debug, Clone)]
enum FieldKind {
    Required { message: Option<String> },
    Optional { default: Option<Node> },
}

#[derive(Debug, Clone)]
struct Field {
    key: SmolStr,
    kind: FieldKind,
    validator: Validator,
    exclusive: Option<SmolStr>,
    inclusive: Option<SmolStr>,
}

/// Mapping validator.
///
/// Output keys keep the input order; defaults for absent optional keys
/// follow in schema order. Defaults pass through the key's validator, so
/// an absent `id:` still yields a generated ID declaration.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<Field>,
    allow_extra: bool,
}

impl Schema {
    /// Empty schema rejecting every key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, field: Field) -> Self {
        self.fields.retain(|existing| existing.key != field.key);
        self.fields.push(field);
        self
    }

    fn field(key: &str, kind: FieldKind, validator: Validator) -> Field {
        Field {
            key: SmolStr::new(key),
            kind,
            validator,
            exclusive: None,
            inclusive: None,
        }
    }

    /// Key that must be present.
    #[must_use]
    pub fn required(self, key: &str, validator: Validator) -> Self {
        self.push(Self::field(key, FieldKind::Required { message: None }, validator))
    }

    /// Required key with a custom message when missing.
    #[must_use]
    pub fn required_msg(self, key: &str, message: &str, validator: Validator) -> Self {
        self.push(Self::field(
            key,
            FieldKind::Required {
                message: Some(message.to_string()),
            },
            validator,
        ))
    }

    /// Key that may be absent.
    #[must_use]
    pub fn optional(self, key: &str, validator: Validator) -> Self {
        self.push(Self::field(key, FieldKind::Optional { default: None }, validator))
    }

    /// Optional key filled with `default` when absent.
    #[must_use]
    pub fn optional_default(self, key: &str, default: impl Into<Node>, validator: Validator) -> Self {
        self.push(Self::field(
            key,
            FieldKind::Optional {
                default: Some(default.into()),
            },
            validator,
        ))
    }

    /// `id:` declaring a variable of type `ty`, generated when absent.
    #[must_use]
    pub fn generate_id(self, ty: ClassRef) -> Self {
        self.generate_id_key("id", ty)
    }

    /// Generated declaration under a custom key such as `trigger_id`.
    #[must_use]
    pub fn generate_id_key(self, key: &str, ty: ClassRef) -> Self {
        self.optional_default(key, Node::null(), declare_variable_id(ty))
    }

    /// Optional key that may not appear together with other keys of
    /// `group`.
    #[must_use]
    pub fn exclusive(self, key: &str, group: &str, validator: Validator) -> Self {
        let mut field = Self::field(key, FieldKind::Optional { default: None }, validator);
        field.exclusive = Some(SmolStr::new(group));
        self.push(field)
    }

    /// Optional key that must appear together with all other keys of
    /// `group`.
    #[must_use]
    pub fn inclusive(self, key: &str, group: &str, validator: Validator) -> Self {
        let mut field = Self::field(key, FieldKind::Optional { default: None }, validator);
        field.inclusive = Some(SmolStr::new(group));
        self.push(field)
    }

    /// Accept keys the schema does not name.
    #[must_use]
    pub fn allow_extra(mut self) -> Self {
        self.allow_extra = true;
        self
    }

    /// Copy with the fields of `other` added, overriding same-named keys.
    #[must_use]
    pub fn extend(mut self, other: &Schema) -> Self {
        for field in &other.fields {
            self = self.push(field.clone());
        }
        self.allow_extra |= other.allow_extra;
        self
    }

    /// Run the schema on a node. Null validates like an empty mapping.
    pub fn validate(&self, node: &Node, ctx: &super::ValidateContext) -> Result<Node, Invalid> {
        let empty = Map::new();
        let input = match &node.value {
            Value::Map(map) => map,
            Value::Null => &empty,
            _ => return Err(Invalid::at(node, "expected a dictionary")),
        };
        let mut out = Map::new();
        let mut errors = Vec::new();

        for (key, value) in input {
            match self.fields.iter().find(|field| field.key == *key) {
                Some(field) => match field.validator.validate(value, ctx) {
                    Ok(validated) => {
                        out.insert(key.clone(), validated);
                    }
                    Err(err) => errors.push(err.prefixed(PathSegment::Key(key.clone()))),
                },
                None if self.allow_extra => {
                    out.insert(key.clone(), value.clone());
                }
                None => errors.push(kind_error(InvalidKind::ExtraKey, key, value)),
            }
        }

        for field in &self.fields {
            if input.contains_key(&field.key) {
                continue;
            }
            match &field.kind {
                FieldKind::Required { message: None } => {
                    errors.push(kind_error(InvalidKind::MissingKey, &field.key, node));
                }
                FieldKind::Required {
                    message: Some(message),
                } => errors.push(
                    Invalid::at(node, message.clone()).prefixed(PathSegment::Key(field.key.clone())),
                ),
                FieldKind::Optional { default: Some(default) } => {
                    let default = Node::marked(default.value.clone(), node.mark.clone());
                    match field.validator.validate(&default, ctx) {
                        Ok(validated) => {
                            out.insert(field.key.clone(), validated);
                        }
                        Err(err) => errors.push(err.prefixed(PathSegment::Key(field.key.clone()))),
                    }
                }
                FieldKind::Optional { default: None } => {}
            }
        }

        errors.extend(self.check_groups(input, node));

        match Invalid::merge(errors) {
            Some(err) => Err(err),
            None => Ok(node.with_value(Value::Map(out))),
        }
    }

    fn check_groups(&self, input: &Map, node: &Node) -> Vec<Invalid> {
        let mut errors = Vec::new();
        let mut seen: Vec<&SmolStr> = Vec::new();
        for field in &self.fields {
            if let Some(group) = &field.exclusive {
                if seen.contains(&group) {
                    continue;
                }
                seen.push(group);
                let present: Vec<&SmolStr> = self
                    .fields
                    .iter()
                    .filter(|f| f.exclusive.as_ref() == Some(group) && input.contains_key(&f.key))
                    .map(|f| &f.key)
                    .collect();
                if present.len() > 1 {
                    errors.push(Invalid::at(
                        node,
                        format!("two or more values in the same group of exclusion '{group}'"),
                    ));
                }
            }
            if let Some(group) = &field.inclusive {
                if seen.contains(&group) {
                    continue;
                }
                seen.push(group);
                let members: Vec<&Field> = self
                    .fields
                    .iter()
                    .filter(|f| f.inclusive.as_ref() == Some(group))
                    .collect();
                let present = members.iter().filter(|f| input.contains_key(&f.key)).count();
                if present != 0 && present != members.len() {
                    errors.push(Invalid::at(
                        node,
                        format!("some but not all values in the same group of inclusion '{group}'"),
                    ));
                }
            }
        }
        errors
    }

    pub(crate) fn into_validator(self) -> Validator {
        Validator::new(move |node, ctx| self.validate(node, ctx))
    }
}
