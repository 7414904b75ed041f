//! C++ expression tree.
//!
//! Expressions are plain values. Navigation on a declared variable (`.`
//! versus `->`) is recorded explicitly in [`Expression::Member`], and
//! variable usage is recovered afterwards by walking the tree with
//! [`Expression::visit_vars`].

use std::fmt;

use smol_str::SmolStr;

use crate::lambda::LambdaExpression;
use crate::types::ClassRef;

/// Member access operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberOp {
    /// `a.b`
    Dot,
    /// `a->b`
    Arrow,
    /// `a::b`
    Scope,
}

impl MemberOp {
    fn as_str(self) -> &'static str {
        match self {
            MemberOp::Dot => ".",
            MemberOp::Arrow => "->",
            MemberOp::Scope => "::",
        }
    }
}

/// Reference to a declared variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VarRef {
    /// Resolved identifier.
    pub name: SmolStr,
    /// Declared through the pointer form (`T *name = ...`).
    pub pointer: bool,
}

/// Variable declaration `T name = rhs` or `T *name = rhs`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Declared type.
    pub ty: ClassRef,
    /// Pointer declaration.
    pub pointer: bool,
    /// Variable name.
    pub name: SmolStr,
    /// Initializer.
    pub rhs: Box<Expression>,
}

/// A C++ expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Opaque source text.
    Raw(String),
    /// `true` / `false`.
    Bool(bool),
    /// Decimal integer with range suffixes.
    Int(i64),
    /// Hexadecimal integer.
    HexInt(u64),
    /// `1.500000f`.
    Float(f64),
    /// Escaped string literal.
    Str(String),
    /// Declared variable.
    Var(VarRef),
    /// `base.name`, `base->name` or `base::name`.
    Member {
        /// Object being navigated.
        base: Box<Expression>,
        /// Operator.
        op: MemberOp,
        /// Member name.
        name: SmolStr,
    },
    /// `callee<T...>(args)`.
    Call {
        /// Function or method.
        callee: Box<Expression>,
        /// Explicit template arguments.
        template_args: Vec<ClassRef>,
        /// Call arguments.
        args: Vec<Expression>,
    },
    /// `new T(args)`.
    New {
        /// Instantiated class.
        class: ClassRef,
        /// Constructor arguments.
        args: Vec<Expression>,
    },
    /// Declaration.
    Assignment(Assignment),
    /// `T{ .field = value, ... }`.
    Struct {
        /// Struct type.
        ty: ClassRef,
        /// Fields in declaration order.
        fields: Vec<(SmolStr, Expression)>,
    },
    /// `{a, b, c}`.
    Array {
        /// Elements.
        items: Vec<Expression>,
        /// One element per line.
        multiline: bool,
    },
    /// Lambda with captured variable references.
    Lambda(LambdaExpression),
    /// Optional value; empty renders as `{}`.
    Optional(Option<Box<Expression>>),
}

impl Expression {
    /// Opaque source text.
    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        Expression::Raw(text.into())
    }

    /// Global object such as `App`.
    #[must_use]
    pub fn global(name: &str) -> Self {
        Expression::Raw(name.to_string())
    }

    /// Reference to a declared variable.
    #[must_use]
    pub fn var(name: impl Into<SmolStr>, pointer: bool) -> Self {
        Expression::Var(VarRef {
            name: name.into(),
            pointer,
        })
    }

    /// Member access choosing `->` for pointer variables and `.` otherwise.
    #[must_use]
    pub fn member(self, name: &str) -> Self {
        let op = match &self {
            Expression::Var(var) if var.pointer => MemberOp::Arrow,
            _ => MemberOp::Dot,
        };
        self.navigate(op, name)
    }

    /// Explicit `->` access.
    #[must_use]
    pub fn arrow(self, name: &str) -> Self {
        self.navigate(MemberOp::Arrow, name)
    }

    /// Explicit `.` access.
    #[must_use]
    pub fn dot(self, name: &str) -> Self {
        self.navigate(MemberOp::Dot, name)
    }

    fn navigate(self, op: MemberOp, name: &str) -> Self {
        Expression::Member {
            base: Box::new(self),
            op,
            name: SmolStr::new(name),
        }
    }

    /// Call this expression.
    #[must_use]
    pub fn call(self, args: Vec<Expression>) -> Self {
        self.call_templated(Vec::new(), args)
    }

    /// Call with explicit template arguments.
    #[must_use]
    pub fn call_templated(self, template_args: Vec<ClassRef>, args: Vec<Expression>) -> Self {
        Expression::Call {
            callee: Box::new(self),
            template_args,
            args,
        }
    }

    /// `self.name(args)` (or `->` for pointers).
    #[must_use]
    pub fn method(self, name: &str, args: Vec<Expression>) -> Self {
        self.member(name).call(args)
    }

    /// Single-line array initializer.
    #[must_use]
    pub fn array(items: Vec<Expression>) -> Self {
        Expression::Array {
            items,
            multiline: false,
        }
    }

    /// Struct initializer.
    #[must_use]
    pub fn struct_init(ty: &ClassRef, fields: Vec<(&str, Expression)>) -> Self {
        Expression::Struct {
            ty: ty.clone(),
            fields: fields
                .into_iter()
                .map(|(name, value)| (SmolStr::new(name), value))
                .collect(),
        }
    }

    /// True if evaluating the expression can do something beyond producing
    /// a value, i.e. it contains a call, an allocation or a lambda.
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match self {
            Expression::Call { .. } | Expression::New { .. } | Expression::Raw(_) => true,
            Expression::Member { base, .. } => base.has_side_effects(),
            Expression::Assignment(assignment) => assignment.rhs.has_side_effects(),
            Expression::Struct { fields, .. } => {
                fields.iter().any(|(_, value)| value.has_side_effects())
            }
            Expression::Array { items, .. } => items.iter().any(Expression::has_side_effects),
            Expression::Optional(inner) => inner.as_ref().is_some_and(|e| e.has_side_effects()),
            Expression::Bool(_)
            | Expression::Int(_)
            | Expression::HexInt(_)
            | Expression::Float(_)
            | Expression::Str(_)
            | Expression::Var(_)
            | Expression::Lambda(_) => false,
        }
    }

    /// Post-order walk over every variable reference.
    pub fn visit_vars(&self, visit: &mut impl FnMut(&VarRef)) {
        self.walk(visit, &mut |_| {});
    }

    /// Walk over the text of every raw fragment.
    pub fn visit_raw(&self, visit: &mut impl FnMut(&str)) {
        self.walk(&mut |_| {}, visit);
    }

    fn walk(&self, var: &mut impl FnMut(&VarRef), raw: &mut impl FnMut(&str)) {
        match self {
            Expression::Var(reference) => var(reference),
            Expression::Raw(text) => raw(text),
            Expression::Member { base, .. } => base.walk(var, raw),
            Expression::Call { callee, args, .. } => {
                callee.walk(var, raw);
                for arg in args {
                    arg.walk(var, raw);
                }
            }
            Expression::New { args, .. } => {
                for arg in args {
                    arg.walk(var, raw);
                }
            }
            Expression::Assignment(assignment) => assignment.rhs.walk(var, raw),
            Expression::Struct { fields, .. } => {
                for (_, value) in fields {
                    value.walk(var, raw);
                }
            }
            Expression::Array { items, .. } => {
                for item in items {
                    item.walk(var, raw);
                }
            }
            Expression::Lambda(lambda) => {
                for reference in lambda.captured() {
                    var(reference);
                }
            }
            Expression::Optional(Some(inner)) => inner.walk(var, raw),
            Expression::Optional(None)
            | Expression::Bool(_)
            | Expression::Int(_)
            | Expression::HexInt(_)
            | Expression::Float(_)
            | Expression::Str(_) => {}
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Raw(text) => f.write_str(text),
            Expression::Bool(value) => f.write_str(if *value { "true" } else { "false" }),
            Expression::Int(value) => write_int(f, *value),
            Expression::HexInt(value) => {
                if *value <= 0xFF {
                    write!(f, "0x{value:02X}")
                } else {
                    write!(f, "0x{value:X}")
                }
            }
            Expression::Float(value) => write!(f, "{value:.6}f"),
            Expression::Str(value) => f.write_str(&cpp_string_escape(value)),
            Expression::Var(var) => f.write_str(&var.name),
            Expression::Member { base, op, name } => write!(f, "{base}{}{name}", op.as_str()),
            Expression::Call {
                callee,
                template_args,
                args,
            } => {
                write!(f, "{callee}")?;
                if !template_args.is_empty() {
                    let targs = template_args
                        .iter()
                        .map(ClassRef::path)
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "<{targs}>")?;
                }
                write!(f, "({})", expression_list(args))
            }
            Expression::New { class, args } => write!(f, "new {class}({})", expression_list(args)),
            Expression::Assignment(assignment) => {
                let modifier = if assignment.pointer { "*" } else { "" };
                write!(
                    f,
                    "{} {modifier}{} = {}",
                    assignment.ty, assignment.name, assignment.rhs
                )
            }
            Expression::Struct { ty, fields } => {
                writeln!(f, "{ty}{{")?;
                for (name, value) in fields {
                    writeln!(f, "  .{name} = {value},")?;
                }
                f.write_str("}")
            }
            Expression::Array { items, multiline } => {
                if items.is_empty() {
                    return f.write_str("{}");
                }
                if *multiline {
                    writeln!(f, "{{")?;
                    for item in items {
                        writeln!(f, "  {item},")?;
                    }
                    f.write_str("}")
                } else {
                    let joined = items
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "{{{joined}}}")
                }
            }
            Expression::Lambda(lambda) => write!(f, "{lambda}"),
            Expression::Optional(Some(inner)) => write!(f, "{inner}"),
            Expression::Optional(None) => f.write_str("{}"),
        }
    }
}

fn write_int(f: &mut fmt::Formatter<'_>, value: i64) -> fmt::Result {
    if value > 4_294_967_295 {
        write!(f, "{value}ULL")
    } else if value > 2_147_483_647 {
        write!(f, "{value}UL")
    } else if value < -2_147_483_648 {
        write!(f, "{value}LL")
    } else {
        write!(f, "{value}")
    }
}

fn expression_list(args: &[Expression]) -> String {
    let text = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    indent_all_but_first_and_last(&text)
}

/// Indent every line except the first and the last by two spaces.
#[must_use]
pub fn indent_all_but_first_and_last(text: &str) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    if lines.len() <= 2 {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + lines.len() * 2);
    out.push_str(lines[0]);
    for line in &lines[1..lines.len() - 1] {
        out.push_str("  ");
        out.push_str(line);
    }
    out.push_str(lines[lines.len() - 1]);
    out
}

/// Quote a string for C++. Bytes outside printable ASCII, quotes and
/// backslashes are written as three-digit octal escapes.
#[must_use]
pub fn cpp_string_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for byte in value.bytes() {
        if (32..127).contains(&byte) && byte != b'\\' && byte != b'"' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("\\{byte:03o}"));
        }
    }
    out.push('"');
    out
}

impl From<bool> for Expression {
    fn from(value: bool) -> Self {
        Expression::Bool(value)
    }
}

impl From<i64> for Expression {
    fn from(value: i64) -> Self {
        Expression::Int(value)
    }
}

impl From<i32> for Expression {
    fn from(value: i32) -> Self {
        Expression::Int(i64::from(value))
    }
}

impl From<u8> for Expression {
    fn from(value: u8) -> Self {
        Expression::Int(i64::from(value))
    }
}

impl From<u16> for Expression {
    fn from(value: u16) -> Self {
        Expression::Int(i64::from(value))
    }
}

impl From<u32> for Expression {
    fn from(value: u32) -> Self {
        Expression::Int(i64::from(value))
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Float(value)
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Str(value.to_string())
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::Str(value)
    }
}

impl From<&SmolStr> for Expression {
    fn from(value: &SmolStr) -> Self {
        Expression::Str(value.to_string())
    }
}

impl From<Vec<Expression>> for Expression {
    fn from(items: Vec<Expression>) -> Self {
        Expression::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn int_literals_carry_range_suffixes() {
        assert_eq!(Expression::Int(42).to_string(), "42");
        assert_eq!(Expression::Int(2_147_483_648).to_string(), "2147483648UL");
        assert_eq!(Expression::Int(4_294_967_296).to_string(), "4294967296ULL");
        assert_eq!(Expression::Int(-2_147_483_649).to_string(), "-2147483649LL");
    }

    #[test]
    fn scalar_literals() {
        assert_eq!(Expression::Bool(true).to_string(), "true");
        assert_eq!(Expression::HexInt(0x5A).to_string(), "0x5A");
        assert_eq!(Expression::HexInt(0x1234).to_string(), "0x1234");
        assert_eq!(Expression::Float(1.5).to_string(), "1.500000f");
    }

    #[test]
    fn strings_use_octal_escapes() {
        assert_eq!(
            Expression::from("say \"hi\"\n").to_string(),
            r#""say \042hi\042\012""#
        );
    }

    #[test]
    fn navigation_picks_operator_from_variable_kind() {
        let sensor = Expression::var("door", true);
        let call = sensor.method("set_device_class", vec!["door".into()]);
        assert_eq!(call.to_string(), r#"door->set_device_class("door")"#);

        let make = Expression::var("make", false);
        assert_eq!(make.member("mqtt").to_string(), "make.mqtt");
    }

    #[test]
    fn templated_call() {
        let app = Expression::global("App");
        let call = app.member("make_automation").call_templated(
            vec![ClassRef::new("NoArg")],
            vec![Expression::var("trigger", true)],
        );
        assert_eq!(call.to_string(), "App.make_automation<NoArg>(trigger)");
    }

    #[test]
    fn struct_initializer_in_call_is_indented() {
        let event = ClassRef::new("MultiClickTriggerEvent");
        let init = Expression::struct_init(
            &event,
            vec![("state", true.into()), ("min_length", 50u32.into())],
        );
        let call = Expression::global("f").call(vec![init]);
        expect![[r#"
            f(MultiClickTriggerEvent{
                .state = true,
                .min_length = 50,
            })"#]]
        .assert_eq(&call.to_string());
    }

    #[test]
    fn array_initializers() {
        assert_eq!(Expression::array(vec![]).to_string(), "{}");
        assert_eq!(
            Expression::array(vec![1.into(), 2.into()]).to_string(),
            "{1, 2}"
        );
        let multi = Expression::Array {
            items: vec![1.into(), 2.into()],
            multiline: true,
        };
        assert_eq!(multi.to_string(), "{\n  1,\n  2,\n}");
    }

    #[test]
    fn visit_vars_is_post_order_over_arguments() {
        let expr = Expression::var("a", true)
            .method("add", vec![Expression::var("b", true), Expression::var("c", false)]);
        let mut seen = Vec::new();
        expr.visit_vars(&mut |var| seen.push(var.name.to_string()));
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[test]
    fn side_effects() {
        assert!(!Expression::Int(3).has_side_effects());
        assert!(!Expression::var("x", true).has_side_effects());
        assert!(Expression::global("App")
            .method("make_x", vec![])
            .has_side_effects());
    }
}
