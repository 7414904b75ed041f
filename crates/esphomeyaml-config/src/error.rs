//! Loading and validation errors.

use std::fmt;
use std::path::PathBuf;

use smol_str::SmolStr;
use thiserror::Error;

use crate::node::{Mark, Node};

/// One step into a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Mapping key.
    Key(SmolStr),
    /// Sequence index.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// `a->b->0` rendering of a path.
#[must_use]
pub fn format_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("->")
}

/// What a validator complained about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidKind {
    /// Free-form message.
    Message(String),
    /// Key not allowed by the schema.
    ExtraKey,
    /// Required key not present.
    MissingKey,
}

/// Single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidItem {
    /// Failure kind.
    pub kind: InvalidKind,
    /// Path from the validated node to the offending value.
    pub path: Vec<PathSegment>,
    /// Location of the offending value.
    pub mark: Option<Mark>,
}

impl InvalidItem {
    /// Message without path information.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.kind {
            InvalidKind::Message(message) => message.clone(),
            InvalidKind::ExtraKey => "extra keys not allowed".to_string(),
            InvalidKind::MissingKey => "required key not provided".to_string(),
        }
    }

    /// Last path element, used to name the offending key.
    #[must_use]
    pub fn last_key(&self) -> String {
        self.path.last().map(ToString::to_string).unwrap_or_default()
    }
}

/// Validator failure carrying one or more located items.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct Invalid {
    items: Vec<InvalidItem>,
}

impl Invalid {
    /// Failure with a message at `node`.
    pub fn at(node: &Node, message: impl Into<String>) -> Self {
        Self::with_mark(node.mark.clone(), message)
    }

    /// Failure with a message and optional mark.
    pub fn with_mark(mark: Option<Mark>, message: impl Into<String>) -> Self {
        Self {
            items: vec![InvalidItem {
                kind: InvalidKind::Message(message.into()),
                path: Vec::new(),
                mark,
            }],
        }
    }

    /// Failure of a given kind at `path`.
    #[must_use]
    pub fn of_kind(kind: InvalidKind, path: Vec<PathSegment>, mark: Option<Mark>) -> Self {
        Self {
            items: vec![InvalidItem { kind, path, mark }],
        }
    }

    /// Combine several failures. Returns `None` when `errors` is empty.
    pub fn merge(errors: impl IntoIterator<Item = Invalid>) -> Option<Self> {
        let items: Vec<InvalidItem> = errors.into_iter().flat_map(|err| err.items).collect();
        if items.is_empty() {
            None
        } else {
            Some(Self { items })
        }
    }

    /// Prefix every item's path with `segment`.
    #[must_use]
    pub fn prefixed(mut self, segment: PathSegment) -> Self {
        for item in &mut self.items {
            item.path.insert(0, segment.clone());
        }
        self
    }

    /// Fill in `mark` for items that have none.
    #[must_use]
    pub fn or_mark(mut self, mark: Option<&Mark>) -> Self {
        for item in &mut self.items {
            if item.mark.is_none() {
                item.mark = mark.cloned();
            }
        }
        self
    }

    /// Individual failures.
    #[must_use]
    pub fn items(&self) -> &[InvalidItem] {
        &self.items
    }

    /// Length of the longest path, used to prefer the most specific error.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.items.iter().map(|item| item.path.len()).max().unwrap_or(0)
    }
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, item) in self.items.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&item.message())?;
            if !item.path.is_empty() {
                write!(f, " @ {}", format_path(&item.path))?;
            }
        }
        Ok(())
    }
}

/// A reported configuration problem, ready to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Component or platform the problem belongs to.
    pub domain: Option<SmolStr>,
    /// Formatted message.
    pub message: String,
    /// Location, when known.
    pub mark: Option<Mark>,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(mark) = &self.mark {
            write!(f, " (See {mark})")?;
        }
        Ok(())
    }
}

/// All problems found in one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigIssues(pub Vec<ConfigIssue>);

impl fmt::Display for ConfigIssues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, issue) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Loading or validating a configuration failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Could not read configuration file at {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// YAML syntax error.
    #[error("Error while parsing {}: {message}", path.display())]
    Yaml {
        /// File that failed.
        path: PathBuf,
        /// Parser message with position.
        message: String,
    },
    /// Structurally invalid document (tags, keys, includes).
    #[error("{message} (See {mark})")]
    Document {
        /// Description.
        message: String,
        /// Location.
        mark: Mark,
    },
    /// `!secret` names a key that `secrets.yaml` does not define.
    #[error("Secret {0} not defined")]
    MissingSecret(String),
    /// `!env_var` without default names an unset variable.
    #[error("Environment variable {0} not defined.")]
    MissingEnvVar(String),
    /// A required top-level component is absent.
    #[error("Component {0} is required for esphomeyaml.")]
    MissingComponent(SmolStr),
    /// The core section could not be pre-loaded.
    #[error("{0}")]
    Core(String),
    /// Components depend on each other in a cycle.
    #[error("Circular dependency between components: {0}")]
    DependencyCycle(String),
    /// Validation failures.
    #[error("{0}")]
    Invalid(ConfigIssues),
}
