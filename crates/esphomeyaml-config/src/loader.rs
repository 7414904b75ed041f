//! YAML loading with source marks and the configuration tags.
//!
//! Supported tags: `!secret`, `!env_var`, `!include`, `!include_dir_list`,
//! `!include_dir_named`, `!include_dir_merge_list`,
//! `!include_dir_merge_named` and `!lambda`. Plain scalars are resolved
//! with YAML 1.1 rules (`on`/`off`/`yes`/`no` are booleans); quoted scalars
//! always stay strings. Mapping keys are kept as written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use esphomeyaml_codegen::Lambda;
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::{debug, warn};
use yaml_rust2::parser::{Event, MarkedEventReceiver, Parser, Tag};
use yaml_rust2::scanner::{Marker, TScalarStyle};

use crate::error::ConfigError;
use crate::node::{Map, Mark, Node, Value};

/// Name of the secrets file looked up next to the including file.
pub const SECRET_YAML: &str = "secrets.yaml";

const MAX_INCLUDE_DEPTH: usize = 32;

static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-+]?(?:[0-9][0-9_]*\.[0-9_]*|\.[0-9_]+)(?:[eE][-+][0-9]+)?$")
        .expect("static regex")
});

/// Load a YAML file and everything it includes.
pub fn load_yaml(path: &Path) -> Result<Node, ConfigError> {
    Loader::default().load_file(path)
}

/// Parse YAML text as if it had been read from `path`. Includes and secrets
/// are resolved relative to `path`.
pub fn load_str(text: &str, path: &Path) -> Result<Node, ConfigError> {
    Loader::default().load_text(text, path)
}

/// Shared state across one load: cached secrets and include depth.
#[derive(Default)]
struct Loader {
    secrets: FxHashMap<PathBuf, Node>,
    depth: usize,
}

impl Loader {
    fn load_file(&mut self, path: &Path) -> Result<Node, ConfigError> {
        debug!("Loading YAML file {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_text(&text, path)
    }

    fn load_text(&mut self, text: &str, path: &Path) -> Result<Node, ConfigError> {
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(ConfigError::Document {
                message: "Includes are nested too deeply".to_string(),
                mark: Mark::new(path.display().to_string(), 1),
            });
        }
        self.depth += 1;
        let result = self.parse(text, path);
        self.depth -= 1;
        result
    }

    fn parse(&mut self, text: &str, path: &Path) -> Result<Node, ConfigError> {
        let mut builder = Builder {
            loader: self,
            file: Arc::from(path.display().to_string()),
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            stack: Vec::new(),
            anchors: FxHashMap::default(),
            root: None,
            error: None,
        };
        let mut parser = Parser::new_from_str(text);
        parser
            .load(&mut builder, false)
            .map_err(|err| ConfigError::Yaml {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        if let Some(err) = builder.error {
            return Err(err);
        }
        Ok(builder.root.unwrap_or_else(Node::empty_map))
    }

    fn secrets(&mut self, dir: &Path) -> Result<Node, ConfigError> {
        let path = dir.join(SECRET_YAML);
        if let Some(secrets) = self.secrets.get(&path) {
            return Ok(secrets.clone());
        }
        let secrets = self.load_file(&path)?;
        self.secrets.insert(path, secrets.clone());
        Ok(secrets)
    }
}

enum Frame {
    Seq {
        items: Vec<Node>,
        mark: Mark,
        anchor: usize,
    },
    Map {
        entries: Map,
        lines: FxHashMap<SmolStr, usize>,
        key: Option<(SmolStr, usize)>,
        merges: Vec<Node>,
        mark: Mark,
        anchor: usize,
    },
}

struct Builder<'a> {
    loader: &'a mut Loader,
    file: Arc<str>,
    dir: PathBuf,
    stack: Vec<Frame>,
    anchors: FxHashMap<usize, Node>,
    root: Option<Node>,
    error: Option<ConfigError>,
}

impl MarkedEventReceiver for Builder<'_> {
    fn on_event(&mut self, event: Event, marker: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.handle(event, marker) {
            self.error = Some(err);
        }
    }
}

impl Builder<'_> {
    fn mark(&self, marker: Marker) -> Mark {
        Mark {
            file: self.file.clone(),
            line: marker.line(),
        }
    }

    fn document_error(&self, marker: Marker, message: impl Into<String>) -> ConfigError {
        ConfigError::Document {
            message: message.into(),
            mark: self.mark(marker),
        }
    }

    fn awaiting_key(&self) -> bool {
        matches!(self.stack.last(), Some(Frame::Map { key: None, .. }))
    }

    fn handle(&mut self, event: Event, marker: Marker) -> Result<(), ConfigError> {
        match event {
            Event::Scalar(text, style, anchor, tag) => {
                if self.awaiting_key() {
                    if tag.is_some() {
                        return Err(self.document_error(marker, "Tags are not allowed on keys"));
                    }
                    if let Some(Frame::Map { key, .. }) = self.stack.last_mut() {
                        *key = Some((SmolStr::new(text), marker.line()));
                    }
                    return Ok(());
                }
                let node = self.scalar(text, style, tag.as_ref(), marker)?;
                self.push(node, anchor, marker)
            }
            Event::SequenceStart(anchor, tag) => {
                self.check_collection_tag(tag.as_ref(), marker, "seq")?;
                self.reject_collection_key(marker)?;
                self.stack.push(Frame::Seq {
                    items: Vec::new(),
                    mark: self.mark(marker),
                    anchor,
                });
                Ok(())
            }
            Event::MappingStart(anchor, tag) => {
                self.check_collection_tag(tag.as_ref(), marker, "map")?;
                self.reject_collection_key(marker)?;
                self.stack.push(Frame::Map {
                    entries: Map::new(),
                    lines: FxHashMap::default(),
                    key: None,
                    merges: Vec::new(),
                    mark: self.mark(marker),
                    anchor,
                });
                Ok(())
            }
            Event::SequenceEnd | Event::MappingEnd => {
                let Some(frame) = self.stack.pop() else {
                    return Ok(());
                };
                let (node, anchor) = match frame {
                    Frame::Seq {
                        items,
                        mark,
                        anchor,
                    } => (Node::marked(Value::Seq(items), Some(mark)), anchor),
                    Frame::Map {
                        mut entries,
                        merges,
                        mark,
                        anchor,
                        ..
                    } => {
                        apply_merges(&mut entries, merges);
                        (Node::marked(Value::Map(entries), Some(mark)), anchor)
                    }
                };
                self.push(node, anchor, marker)
            }
            Event::Alias(anchor) => {
                if self.awaiting_key() {
                    return Err(self.document_error(marker, "Aliases are not allowed as keys"));
                }
                let Some(node) = self.anchors.get(&anchor).cloned() else {
                    return Err(self.document_error(marker, "Unknown alias"));
                };
                self.push(node, 0, marker)
            }
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => Ok(()),
        }
    }

    fn reject_collection_key(&self, marker: Marker) -> Result<(), ConfigError> {
        if self.awaiting_key() {
            return Err(self.document_error(marker, "invalid key: keys must be scalars"));
        }
        Ok(())
    }

    fn check_collection_tag(
        &self,
        tag: Option<&Tag>,
        marker: Marker,
        expected: &str,
    ) -> Result<(), ConfigError> {
        match tag {
            None => Ok(()),
            Some(tag) if is_core_tag(tag) && tag.suffix == expected => Ok(()),
            Some(tag) => Err(self.document_error(
                marker,
                format!("Unsupported tag {}{} on a collection", tag.handle, tag.suffix),
            )),
        }
    }

    fn push(&mut self, node: Node, anchor: usize, marker: Marker) -> Result<(), ConfigError> {
        if anchor != 0 {
            self.anchors.insert(anchor, node.clone());
        }
        let file = self.file.clone();
        match self.stack.last_mut() {
            None => {
                self.root = Some(node);
                Ok(())
            }
            Some(Frame::Seq { items, .. }) => {
                items.push(node);
                Ok(())
            }
            Some(Frame::Map {
                entries,
                lines,
                key,
                merges,
                ..
            }) => {
                let Some((key, line)) = key.take() else {
                    return Err(ConfigError::Document {
                        message: "invalid key".to_string(),
                        mark: Mark::new(file, marker.line()),
                    });
                };
                if key == "<<" {
                    merges.push(node);
                    return Ok(());
                }
                if let Some(previous) = lines.insert(key.clone(), line) {
                    warn!(
                        "YAML file {file} contains duplicate key \"{key}\". Check lines {previous} and {line}."
                    );
                }
                entries.insert(key, node);
                Ok(())
            }
        }
    }

    fn scalar(
        &mut self,
        text: String,
        style: TScalarStyle,
        tag: Option<&Tag>,
        marker: Marker,
    ) -> Result<Node, ConfigError> {
        let mark = Some(self.mark(marker));
        let Some(tag) = tag else {
            let value = if matches!(style, TScalarStyle::Plain) {
                resolve_plain(&text)
            } else {
                Value::Str(text)
            };
            return Ok(Node::marked(value, mark));
        };
        if is_core_tag(tag) {
            let value = match tag.suffix.as_str() {
                "str" => Value::Str(text),
                "int" | "float" | "bool" | "null" => resolve_plain(&text),
                other => {
                    return Err(self.document_error(marker, format!("Unsupported tag !!{other}")))
                }
            };
            return Ok(Node::marked(value, mark));
        }
        match tag.suffix.as_str() {
            "lambda" => Ok(Node::marked(Value::Lambda(Lambda::new(text)), mark)),
            "secret" => self.secret(&text, marker),
            "env_var" => env_var(&text).map(|value| Node::marked(Value::Str(value), mark)),
            "include" => {
                let path = self.dir.join(text.trim());
                self.loader.load_file(&path)
            }
            "include_dir_list" => self.include_dir(&text, marker, IncludeDir::List),
            "include_dir_named" => self.include_dir(&text, marker, IncludeDir::Named),
            "include_dir_merge_list" => self.include_dir(&text, marker, IncludeDir::MergeList),
            "include_dir_merge_named" => self.include_dir(&text, marker, IncludeDir::MergeNamed),
            other => Err(self.document_error(marker, format!("Unknown tag !{other}"))),
        }
    }

    fn secret(&mut self, name: &str, marker: Marker) -> Result<Node, ConfigError> {
        let secrets = self.loader.secrets(&self.dir)?;
        let name = name.trim();
        match secrets.get(name) {
            Some(value) => {
                debug!("Secret {name} retrieved from {SECRET_YAML}");
                Ok(Node::marked(value.value.clone(), Some(self.mark(marker))))
            }
            None => Err(ConfigError::MissingSecret(name.to_string())),
        }
    }

    fn include_dir(
        &mut self,
        relative: &str,
        marker: Marker,
        kind: IncludeDir,
    ) -> Result<Node, ConfigError> {
        let dir = self.dir.join(relative.trim());
        let files = find_yaml_files(&dir).map_err(|message| self.document_error(marker, message))?;
        let mark = Some(self.mark(marker));
        let value = match kind {
            IncludeDir::List => {
                let mut items = Vec::with_capacity(files.len());
                for file in &files {
                    items.push(self.loader.load_file(file)?);
                }
                Value::Seq(items)
            }
            IncludeDir::MergeList => {
                let mut items = Vec::new();
                for file in &files {
                    if let Value::Seq(loaded) = self.loader.load_file(file)?.value {
                        items.extend(loaded);
                    }
                }
                Value::Seq(items)
            }
            IncludeDir::Named => {
                let mut entries = Map::new();
                for file in &files {
                    let stem = file
                        .file_stem()
                        .map(|stem| stem.to_string_lossy().to_string())
                        .unwrap_or_default();
                    entries.insert(SmolStr::new(stem), self.loader.load_file(file)?);
                }
                Value::Map(entries)
            }
            IncludeDir::MergeNamed => {
                let mut entries = Map::new();
                for file in &files {
                    if let Value::Map(loaded) = self.loader.load_file(file)?.value {
                        entries.extend(loaded);
                    }
                }
                Value::Map(entries)
            }
        };
        Ok(Node::marked(value, mark))
    }
}

#[derive(Clone, Copy)]
enum IncludeDir {
    List,
    Named,
    MergeList,
    MergeNamed,
}

fn is_core_tag(tag: &Tag) -> bool {
    tag.handle == "!!" || tag.handle == "tag:yaml.org,2002:"
}

fn apply_merges(entries: &mut Map, merges: Vec<Node>) {
    for merge in merges {
        let sources = match merge.value {
            Value::Map(map) => vec![map],
            Value::Seq(items) => items
                .into_iter()
                .filter_map(|item| match item.value {
                    Value::Map(map) => Some(map),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        for source in sources {
            for (key, value) in source {
                entries.entry(key).or_insert(value);
            }
        }
    }
}

/// `*.yaml` files below `dir` in sorted order, skipping hidden entries and
/// the secrets file.
fn find_yaml_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let pattern = format!(
        "{}/**/*.yaml",
        glob::Pattern::escape(&dir.display().to_string())
    );
    let paths = glob::glob(&pattern).map_err(|err| format!("Invalid directory {}: {err}", dir.display()))?;
    let mut files: Vec<PathBuf> = paths
        .filter_map(Result::ok)
        .filter(|path| {
            path.strip_prefix(dir).is_ok_and(|relative| {
                relative
                    .components()
                    .all(|part| !part.as_os_str().to_string_lossy().starts_with('.'))
            })
        })
        .filter(|path| path.file_name().is_none_or(|name| name != SECRET_YAML))
        .collect();
    files.sort();
    Ok(files)
}

fn env_var(spec: &str) -> Result<String, ConfigError> {
    let mut parts = spec.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let default: Vec<&str> = parts.collect();
    match std::env::var(name) {
        Ok(value) => Ok(value),
        Err(_) if !default.is_empty() => Ok(default.join(" ")),
        Err(_) => Err(ConfigError::MissingEnvVar(spec.trim().to_string())),
    }
}

/// YAML 1.1 resolution of a plain scalar.
#[must_use]
pub fn resolve_plain(text: &str) -> Value {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return Value::Null,
        _ => {}
    }
    match text.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => return Value::Bool(true),
        "false" | "no" | "off" => return Value::Bool(false),
        ".inf" | "+.inf" => return Value::Float(f64::INFINITY),
        "-.inf" => return Value::Float(f64::NEG_INFINITY),
        ".nan" => return Value::Float(f64::NAN),
        _ => {}
    }
    if let Some(value) = parse_yaml_int(text) {
        return Value::Int(value);
    }
    if FLOAT.is_match(text) && text.chars().any(|ch| ch.is_ascii_digit()) {
        if let Ok(value) = text.replace('_', "").parse::<f64>() {
            return Value::Float(value);
        }
    }
    Value::Str(text.to_string())
}

fn parse_yaml_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "");
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    if digits.is_empty() {
        return None;
    }
    let magnitude = if let Some(hex) = digits.strip_prefix("0x") {
        i64::from_str_radix(hex, 16).ok()?
    } else if let Some(bin) = digits.strip_prefix("0b") {
        i64::from_str_radix(bin, 2).ok()?
    } else if let Some(oct) = digits.strip_prefix("0o") {
        i64::from_str_radix(oct, 8).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else if digits.chars().all(|ch| ch.is_ascii_digit()) {
        digits.parse::<i64>().ok()?
    } else {
        return None;
    };
    Some(if negative { -magnitude } else { magnitude })
}
