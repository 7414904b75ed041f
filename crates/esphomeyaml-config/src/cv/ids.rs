//! Identifier declarations and references.

use esphomeyaml_codegen::{validate_id_name, ClassRef, Id};

use super::primitives::as_string;
use super::Validator;
use crate::node::{Node, Value};

fn id_name(node: &Node) -> Result<Option<String>, String> {
    if node.is_null() {
        return Ok(None);
    }
    let name = as_string(node)?;
    validate_id_name(&name).map_err(|err| err.to_string())?;
    Ok(Some(name))
}

/// A valid manual identifier as plain string.
#[must_use]
pub fn valid_id_name() -> Validator {
    Validator::scalar(|node| {
        id_name(node)?
            .map(Value::Str)
            .ok_or_else(|| "ID must not be empty".to_string())
    })
}

/// Declaration of a variable of type `ty`. Null leaves the name to the
/// allocator.
#[must_use]
pub fn declare_variable_id(ty: ClassRef) -> Validator {
    Validator::scalar(move |node| {
        if let Value::Id(id) = &node.value {
            return Ok(Value::Id(id.clone()));
        }
        let name = id_name(node)?;
        Ok(Value::Id(Id::declaration(name.as_deref(), Some(ty.clone()))))
    })
}

/// Reference to a variable of type `ty`. Null is resolved by type in the
/// ID pass.
#[must_use]
pub fn use_variable_id(ty: ClassRef) -> Validator {
    Validator::scalar(move |node| {
        if let Value::Id(id) = &node.value {
            return Ok(Value::Id(id.clone()));
        }
        let name = id_name(node)?;
        Ok(Value::Id(Id::reference(name.as_deref(), Some(ty.clone()))))
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::check;
    use super::*;

    #[test]
    fn declarations_and_references() {
        let ty = ClassRef::new("Switch");
        let decl = check(&declare_variable_id(ty.clone()), "relay").unwrap();
        assert!(decl.as_id().unwrap().is_declaration());
        assert!(decl.as_id().unwrap().is_manual());
        let reference = check(&use_variable_id(ty), Node::null()).unwrap();
        assert!(!reference.as_id().unwrap().is_declaration());
        assert!(reference.as_id().unwrap().name().is_none());
    }

    #[test]
    fn manual_names_are_checked() {
        assert_eq!(
            check(&declare_variable_id(ClassRef::new("X")), "my-relay").unwrap_err(),
            "Dashes are not supported in IDs, please use underscores instead."
        );
        assert_eq!(
            check(&valid_id_name(), "App").unwrap_err(),
            "ID App is reserved internally and cannot be used"
        );
    }
}
