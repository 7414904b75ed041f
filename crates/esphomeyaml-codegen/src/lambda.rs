//! Inline C++ lambdas written in the configuration (`!lambda`).

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use smol_str::SmolStr;

use crate::expr::{indent_all_but_first_and_last, VarRef};
use crate::types::ClassRef;

static ID_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"id\(\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\)(\.?)").expect("static regex")
});

static COMMENT_OR_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)//[^\n]*|/\*.*?\*/|'(?:\\.|[^\\'])*'|"(?:\\.|[^\\"])*""#)
        .expect("static regex")
});

/// A piece of lambda source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LambdaPart {
    /// Verbatim C++ text.
    Text(String),
    /// `id(name)` reference, optionally followed by member access.
    Id {
        /// Referenced identifier.
        name: SmolStr,
        /// The reference was followed by `.`.
        member_access: bool,
    },
}

/// Lambda source split around its `id(...)` references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lambda {
    source: String,
    parts: Vec<LambdaPart>,
}

impl Lambda {
    /// Parse lambda source. References inside comments are left alone.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let comments: Vec<(usize, usize)> = COMMENT_OR_STRING
            .find_iter(&source)
            .filter(|m| m.as_str().starts_with('/'))
            .map(|m| (m.start(), m.end()))
            .collect();
        let mut parts = Vec::new();
        let mut cursor = 0;
        for caps in ID_REFERENCE.captures_iter(&source) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            if comments
                .iter()
                .any(|(start, end)| whole.start() >= *start && whole.start() < *end)
            {
                continue;
            }
            parts.push(LambdaPart::Text(source[cursor..whole.start()].to_string()));
            parts.push(LambdaPart::Id {
                name: SmolStr::new(&caps[1]),
                member_access: !caps[2].is_empty(),
            });
            cursor = whole.end();
        }
        parts.push(LambdaPart::Text(source[cursor..].to_string()));
        Self { source, parts }
    }

    /// Original source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed parts.
    #[must_use]
    pub fn parts(&self) -> &[LambdaPart] {
        &self.parts
    }

    /// Every identifier referenced through `id(...)`, in source order.
    #[must_use]
    pub fn requires_ids(&self) -> Vec<SmolStr> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                LambdaPart::Id { name, .. } => Some(name.clone()),
                LambdaPart::Text(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Segment of a resolved lambda body.
#[derive(Debug, Clone, PartialEq)]
pub enum LambdaSegment {
    /// Verbatim C++ text.
    Text(String),
    /// Variable substituted for an `id(...)` reference.
    Var {
        /// Captured variable.
        var: VarRef,
        /// Emit the variable's member operator after its name.
        member_access: bool,
    },
}

/// A lambda whose `id(...)` references have been bound to declared variables.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpression {
    /// Body segments.
    pub segments: Vec<LambdaSegment>,
    /// Parameters as `(type, name)`.
    pub parameters: Vec<(ClassRef, SmolStr)>,
    /// Capture clause without brackets.
    pub capture: SmolStr,
    /// Explicit return type.
    pub return_type: Option<ClassRef>,
}

impl LambdaExpression {
    /// Variables captured by the body.
    pub fn captured(&self) -> impl Iterator<Item = &VarRef> {
        self.segments.iter().filter_map(|segment| match segment {
            LambdaSegment::Var { var, .. } => Some(var),
            LambdaSegment::Text(_) => None,
        })
    }

    /// Body text with variables substituted.
    #[must_use]
    pub fn content(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                LambdaSegment::Text(text) => out.push_str(text),
                LambdaSegment::Var { var, member_access } => {
                    out.push_str(&var.name);
                    if *member_access {
                        out.push_str(if var.pointer { "->" } else { "." });
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for LambdaExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .parameters
            .iter()
            .map(|(ty, name)| format!("{ty} {name}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut cpp = format!("[{}]({params})", self.capture);
        if let Some(ret) = &self.return_type {
            cpp.push_str(&format!(" -> {ret}"));
        }
        cpp.push_str(&format!(" {{\n{}\n}}", self.content()));
        f.write_str(&indent_all_but_first_and_last(&cpp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_id_references() {
        let lambda = Lambda::new("return id(temp).state > id( limit );");
        assert_eq!(lambda.requires_ids(), vec!["temp", "limit"]);
        assert_eq!(
            lambda.parts()[1],
            LambdaPart::Id {
                name: "temp".into(),
                member_access: true
            }
        );
    }

    #[test]
    fn ignores_references_in_comments() {
        let lambda = Lambda::new("// id(old)\n/* id(older) */ return id(new_one);");
        assert_eq!(lambda.requires_ids(), vec!["new_one"]);
    }

    #[test]
    fn resolved_lambda_renders_with_member_operators() {
        let expr = LambdaExpression {
            segments: vec![
                LambdaSegment::Text("return ".into()),
                LambdaSegment::Var {
                    var: VarRef {
                        name: "temp".into(),
                        pointer: true,
                    },
                    member_access: true,
                },
                LambdaSegment::Text("state;".into()),
            ],
            parameters: vec![(ClassRef::new("float"), "x".into())],
            capture: "=".into(),
            return_type: Some(ClassRef::new("bool")),
        };
        assert_eq!(
            expr.to_string(),
            "[=](float x) -> bool {\n  return temp->state;\n}"
        );
    }
}
