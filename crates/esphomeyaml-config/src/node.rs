//! Document tree with source marks.
//!
//! The loader produces [`Node`]s holding plain YAML values. Validation
//! replaces them with normalized values (time periods, identifiers,
//! lambdas, addresses) while keeping the original marks so errors and the
//! ID pass can point back to the source.

use std::fmt;
use std::sync::Arc;

use esphomeyaml_codegen::{Expression, Id, Lambda};
use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::PathSegment;
use crate::time::TimePeriod;

/// Ordered mapping.
pub type Map = IndexMap<SmolStr, Node>;

/// Position of a node in its source file. Lines start at 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mark {
    /// File the node was read from.
    pub file: Arc<str>,
    /// Line of the node.
    pub line: usize,
}

impl Mark {
    /// Mark in `file` at `line`.
    pub fn new(file: impl Into<Arc<str>>, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, line {}", self.file, self.line)
    }
}

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `~`, `null` or an empty value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Integer that should be emitted in hexadecimal.
    HexInt(u64),
    /// Float.
    Float(f64),
    /// String.
    Str(String),
    /// Sequence.
    Seq(Vec<Node>),
    /// Ordered mapping.
    Map(Map),
    /// `!lambda` C++ snippet.
    Lambda(Lambda),
    /// Validated time period.
    Time(TimePeriod),
    /// Declared or referenced identifier.
    Id(Id),
    /// IPv4 address.
    Ip([u8; 4]),
    /// MAC address.
    Mac([u8; 6]),
}

/// A value and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Payload.
    pub value: Value,
    /// Source position, if the node was read from a file.
    pub mark: Option<Mark>,
}

impl Node {
    /// Unmarked node.
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self { value, mark: None }
    }

    /// Node with a source mark.
    #[must_use]
    pub fn marked(value: Value, mark: Option<Mark>) -> Self {
        Self { value, mark }
    }

    /// Unmarked null.
    #[must_use]
    pub fn null() -> Self {
        Self::new(Value::Null)
    }

    /// Empty mapping.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::new(Value::Map(Map::new()))
    }

    /// Mapping built from `(key, node)` pairs.
    pub fn map<K: Into<SmolStr>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        Self::new(Value::Map(
            entries
                .into_iter()
                .map(|(key, node)| (key.into(), node))
                .collect(),
        ))
    }

    /// Sequence of nodes.
    #[must_use]
    pub fn seq(items: Vec<Node>) -> Self {
        Self::new(Value::Seq(items))
    }

    /// Same mark, different value.
    #[must_use]
    pub fn with_value(&self, value: Value) -> Self {
        Self {
            value,
            mark: self.mark.clone(),
        }
    }

    /// Human readable type name used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::HexInt(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Seq(_) => "list",
            Value::Map(_) => "dictionary",
            Value::Lambda(_) => "lambda",
            Value::Time(_) => "time period",
            Value::Id(_) => "ID",
            Value::Ip(_) => "IP address",
            Value::Mac(_) => "MAC address",
        }
    }

    /// True for null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self.value, Value::Null)
    }

    /// String payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    /// Boolean payload.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(value) => Some(value),
            _ => None,
        }
    }

    /// Integer payload, including hex integers that fit.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self.value {
            Value::Int(value) => Some(value),
            Value::HexInt(value) => i64::try_from(value).ok(),
            _ => None,
        }
    }

    /// Numeric payload as float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self.value {
            Value::Float(value) => Some(value),
            Value::Int(value) => Some(value as f64),
            Value::HexInt(value) => Some(value as f64),
            _ => None,
        }
    }

    /// Mapping payload.
    #[must_use]
    pub fn as_map(&self) -> Option<&Map> {
        match &self.value {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable mapping payload.
    pub fn as_map_mut(&mut self) -> Option<&mut Map> {
        match &mut self.value {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Sequence payload.
    #[must_use]
    pub fn as_seq(&self) -> Option<&[Node]> {
        match &self.value {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    /// Identifier payload.
    #[must_use]
    pub fn as_id(&self) -> Option<&Id> {
        match &self.value {
            Value::Id(id) => Some(id),
            _ => None,
        }
    }

    /// Lambda payload.
    #[must_use]
    pub fn as_lambda(&self) -> Option<&Lambda> {
        match &self.value {
            Value::Lambda(lambda) => Some(lambda),
            _ => None,
        }
    }

    /// Time period payload.
    #[must_use]
    pub fn as_time(&self) -> Option<TimePeriod> {
        match self.value {
            Value::Time(period) => Some(period),
            _ => None,
        }
    }

    /// Child of a mapping.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// True if this is a mapping containing `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// String child of a mapping.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }

    /// Boolean child of a mapping.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Node::as_bool)
    }

    /// Integer child of a mapping.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Node::as_i64)
    }

    /// Identifier child of a mapping.
    #[must_use]
    pub fn get_id(&self, key: &str) -> Option<&Id> {
        self.get(key).and_then(Node::as_id)
    }

    /// Sequence child of a mapping, empty if absent.
    #[must_use]
    pub fn get_seq(&self, key: &str) -> &[Node] {
        self.get(key).and_then(Node::as_seq).unwrap_or(&[])
    }

    /// C++ literal for a scalar value. Identifiers become variable
    /// references; containers are not representable and yield `None`.
    #[must_use]
    pub fn to_expression(&self) -> Option<Expression> {
        Some(match &self.value {
            Value::Bool(value) => Expression::Bool(*value),
            Value::Int(value) => Expression::Int(*value),
            Value::HexInt(value) => Expression::HexInt(*value),
            Value::Float(value) => Expression::Float(*value),
            Value::Str(text) => Expression::Str(text.clone()),
            Value::Time(period) => Expression::Int(period.value()),
            Value::Ip([a, b, c, d]) => Expression::raw(format!("IPAddress({a}, {b}, {c}, {d})")),
            Value::Mac(bytes) => Expression::array(
                bytes.iter().map(|byte| Expression::HexInt(u64::from(*byte))).collect(),
            ),
            Value::Null => Expression::raw("nullptr"),
            Value::Id(_) | Value::Lambda(_) | Value::Seq(_) | Value::Map(_) => return None,
        })
    }

    /// Names of every identifier declared in this subtree.
    #[must_use]
    pub fn declared_ids(&self) -> Vec<SmolStr> {
        let mut out = Vec::new();
        self.visit(&mut |node| {
            if let Value::Id(id) = &node.value {
                if id.is_declaration() {
                    if let Some(name) = id.name() {
                        out.push(name.clone());
                    }
                }
            }
        });
        out
    }

    /// Every identifier referenced in this subtree, including `id(...)`
    /// uses inside lambdas.
    #[must_use]
    pub fn referenced_ids(&self) -> Vec<Id> {
        let mut out = Vec::new();
        self.visit(&mut |node| match &node.value {
            Value::Id(id) if !id.is_declaration() && id.name().is_some() => out.push(id.clone()),
            Value::Lambda(lambda) => {
                for name in lambda.requires_ids() {
                    out.push(Id::reference(Some(name.as_str()), None));
                }
            }
            _ => {}
        });
        out
    }

    /// Pre-order walk.
    pub fn visit(&self, f: &mut impl FnMut(&Node)) {
        f(self);
        match &self.value {
            Value::Seq(items) => {
                for item in items {
                    item.visit(f);
                }
            }
            Value::Map(map) => {
                for value in map.values() {
                    value.visit(f);
                }
            }
            _ => {}
        }
    }

    /// Pre-order walk with mutable access and the path from this node.
    pub fn visit_mut(
        &mut self,
        path: &mut Vec<PathSegment>,
        f: &mut impl FnMut(&mut Node, &[PathSegment]),
    ) {
        f(self, path);
        match &mut self.value {
            Value::Seq(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    path.push(PathSegment::Index(index));
                    item.visit_mut(path, f);
                    path.pop();
                }
            }
            Value::Map(map) => {
                for (key, value) in map.iter_mut() {
                    path.push(PathSegment::Key(key.clone()));
                    value.visit_mut(path, f);
                    path.pop();
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Null => f.write_str("None"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::HexInt(value) => write!(f, "0x{value:02X}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Str(text) => f.write_str(text),
            Value::Seq(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (index, (key, value)) in map.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Lambda(lambda) => write!(f, "{lambda}"),
            Value::Time(period) => write!(f, "{period}"),
            Value::Id(id) => write!(f, "{id}"),
            Value::Ip([a, b, c, d]) => write!(f, "{a}.{b}.{c}.{d}"),
            Value::Mac(bytes) => {
                let parts: Vec<String> = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
                f.write_str(&parts.join(":"))
            }
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        Node::new(value)
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::new(Value::Str(value.to_string()))
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::new(Value::Str(value))
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::new(Value::Bool(value))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::new(Value::Int(value))
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::new(Value::Float(value))
    }
}

impl From<Map> for Node {
    fn from(value: Map) -> Self {
        Node::new(Value::Map(value))
    }
}

impl From<Vec<Node>> for Node {
    fn from(value: Vec<Node>) -> Self {
        Node::new(Value::Seq(value))
    }
}
