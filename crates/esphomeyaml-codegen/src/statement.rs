//! Statements in the emission buffer.

use std::fmt;

use crate::expr::Expression;

/// One line (or block) of generated code.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Expression followed by `;`.
    Expression(Expression),
    /// Verbatim text.
    Raw(String),
    /// `// text`
    Comment(String),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Expression(expr) => write!(f, "{expr};"),
            Statement::Raw(text) => f.write_str(text),
            Statement::Comment(text) => write!(f, "// {text}"),
        }
    }
}

impl From<Expression> for Statement {
    fn from(expr: Expression) -> Self {
        Statement::Expression(expr)
    }
}
