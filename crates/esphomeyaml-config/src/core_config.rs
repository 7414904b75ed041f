//! The `esphomeyaml:` section: device name, chip, board and framework
//! versions.

use std::path::PathBuf;

use esphomeyaml_codegen::{ClassRef, CodegenContext, Expression, Halt, Id};
use once_cell::sync::Lazy;
use regex::Regex;
use smol_str::SmolStr;

use crate::automation;
use crate::component::Component;
use crate::cpp;
use crate::cv::{self, EspPlatform, Schema, ValidateContext, Validator};
use crate::error::{ConfigError, Invalid};
use crate::node::{Map, Node, Value};
use crate::pins;
use crate::registry::{BuildEnv, BuildTriggerFn, Registries, RegistryError, TriggerEntry};

/// Key of the core section.
pub const DOMAIN: &str = "esphomeyaml";

/// esphomelib release matching this tool.
pub const ESPHOMELIB_VERSION: &str = "1.10.0";

/// Upstream esphomelib repository.
pub const LIBRARY_URI_REPO: &str = "https://github.com/OttoWinter/esphomelib.git";

const ARDUINO_VERSION_ESP8266_DEV: &str =
    "https://github.com/platformio/platform-espressif8266.git#feature/stage";
const ARDUINO_VERSION_ESP32_DEV: &str =
    "https://github.com/platformio/platform-espressif32.git#feature/stage";

const PLATFORMIO_ESP8266_LUT: &[(&str, &str)] = &[
    ("2.4.2", "espressif8266@1.8.0"),
    ("2.4.1", "espressif8266@1.7.3"),
    ("2.4.0", "espressif8266@1.6.0"),
    ("2.3.0", "espressif8266@1.5.0"),
    ("RECOMMENDED", "espressif8266@>=1.8.0"),
    ("LATEST", "espressif8266"),
    ("DEV", ARDUINO_VERSION_ESP8266_DEV),
];

const PLATFORMIO_ESP32_LUT: &[(&str, &str)] = &[
    ("1.0.0", "espressif32@1.4.0"),
    ("RECOMMENDED", "espressif32@>=1.4.0"),
    ("LATEST", "espressif32"),
    ("DEV", ARDUINO_VERSION_ESP32_DEV),
];

const BUILD_FLASH_MODES: &[&str] = &["qio", "qout", "dio", "dout"];

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+(?:-beta)?(?:-alpha)?$").expect("static regex")
});
static COMMIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{7,}$").expect("static regex"));

/// Git reference selected for a repository checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitRef {
    /// Commit hash.
    Commit(String),
    /// Branch name.
    Branch(String),
    /// Tag name.
    Tag(String),
}

/// Where the esphomelib sources come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EsphomelibVersion {
    /// Local checkout, relative to the configuration directory.
    Local(PathBuf),
    /// Git repository, optionally pinned.
    Repository {
        /// Clone URL.
        url: String,
        /// Pinned reference; `None` follows the default branch.
        reference: Option<GitRef>,
    },
}

impl EsphomelibVersion {
    fn from_node(node: &Node) -> Option<Self> {
        if let Some(local) = node.get_str("local") {
            return Some(Self::Local(PathBuf::from(local)));
        }
        let url = node.get_str("repository")?.to_string();
        let reference = if let Some(commit) = node.get_str("commit") {
            Some(GitRef::Commit(commit.to_string()))
        } else if let Some(branch) = node.get_str("branch") {
            Some(GitRef::Branch(branch.to_string()))
        } else {
            node.get_str("tag").map(|tag| GitRef::Tag(tag.to_string()))
        };
        Some(Self::Repository { url, reference })
    }

    /// platformio `lib_deps` entry.
    #[must_use]
    pub fn lib_dep(&self, config_dir: &std::path::Path) -> String {
        match self {
            Self::Local(path) => format!("file://{}", config_dir.join(path).display()),
            Self::Repository { url, reference } => match reference {
                Some(GitRef::Commit(r) | GitRef::Branch(r) | GitRef::Tag(r)) => format!("{url}#{r}"),
                None => url.clone(),
            },
        }
    }
}

/// Core settings the project writer and the driver need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInfo {
    /// Device name.
    pub name: SmolStr,
    /// Chip family.
    pub platform: EspPlatform,
    /// platformio board.
    pub board: SmolStr,
    /// esphomelib source.
    pub esphomelib_version: EsphomelibVersion,
    /// platformio platform string, e.g. `espressif8266@>=1.8.0`.
    pub arduino_version: String,
    /// Build directory relative to the configuration directory.
    pub build_path: String,
    /// `board_flash_mode` override.
    pub board_flash_mode: Option<String>,
    /// Keep user code outside the marker blocks and skip the default
    /// build flags.
    pub use_custom_code: bool,
    /// Header files copied into the project and included by `main.cpp`.
    pub includes: Vec<String>,
    /// Extra platformio `lib_deps`.
    pub libraries: Vec<String>,
}

impl CoreInfo {
    /// Extract the core settings from a validated configuration.
    pub fn from_config(config: &Node) -> Result<Self, ConfigError> {
        let core = config
            .get(DOMAIN)
            .ok_or_else(|| ConfigError::MissingComponent(SmolStr::new(DOMAIN)))?;
        let missing = |key: &str| ConfigError::Core(format!("{DOMAIN}.{key} not specified."));
        let platform = core
            .get_str("platform")
            .and_then(EspPlatform::parse)
            .ok_or_else(|| missing("platform"))?;
        let strings = |key: &str| {
            core.get_seq(key)
                .iter()
                .filter_map(|item| item.as_str().map(ToString::to_string))
                .collect()
        };
        Ok(Self {
            name: core.get_str("name").map(SmolStr::new).ok_or_else(|| missing("name"))?,
            platform,
            board: core.get_str("board").map(SmolStr::new).ok_or_else(|| missing("board"))?,
            esphomelib_version: core
                .get("esphomelib_version")
                .and_then(EsphomelibVersion::from_node)
                .ok_or_else(|| missing("esphomelib_version"))?,
            arduino_version: core
                .get_str("arduino_version")
                .ok_or_else(|| missing("arduino_version"))?
                .to_string(),
            build_path: core.get_str("build_path").ok_or_else(|| missing("build_path"))?.to_string(),
            board_flash_mode: core.get_str("board_flash_mode").map(ToString::to_string),
            use_custom_code: core.get_bool("use_custom_code").unwrap_or(false),
            includes: strings("includes"),
            libraries: strings("libraries"),
        })
    }
}

/// Read platform, board and name from the raw document before anything
/// else is validated; the rest of validation depends on them.
pub fn preload(raw: &Node, config_dir: PathBuf) -> Result<ValidateContext, ConfigError> {
    let core = raw
        .get(DOMAIN)
        .ok_or_else(|| ConfigError::Core(format!("No {DOMAIN} section in config")))?;
    for key in ["platform", "board", "name"] {
        if !core.contains_key(key) {
            return Err(ConfigError::Core(format!("{DOMAIN}.{key} not specified.")));
        }
    }
    let platform_node = core.get("platform").map(ToString::to_string).unwrap_or_default();
    let platform = EspPlatform::parse(&platform_node).ok_or_else(|| {
        ConfigError::Core(format!(
            "Invalid platform '{platform_node}'. Only options are ESP8266 and ESP32. Please note \
             the old way to use the latest arduino framework version has been split up into the \
             arduino_version configuration option."
        ))
    })?;
    let board = core.get("board").map(ToString::to_string).unwrap_or_default();
    check_board(platform, &board).map_err(ConfigError::Core)?;
    let name_node = core.get("name").cloned().unwrap_or_else(Node::null);
    let probe = ValidateContext::new(platform, &board);
    let name = cv::valid_name()
        .validate(&name_node, &probe)
        .map_err(|err| ConfigError::Core(err.to_string()))?;
    let mut ctx = ValidateContext::new(platform, &board);
    ctx.name = SmolStr::new(name.as_str().unwrap_or_default());
    ctx.config_dir = config_dir;
    Ok(ctx)
}

fn check_board(platform: EspPlatform, board: &str) -> Result<(), String> {
    if pins::is_known_board(platform, board) {
        return Ok(());
    }
    let valid: Vec<&str> = pins::board_names(platform).collect();
    Err(format!(
        "Could not find board '{board}'. Valid boards are {}",
        valid.join(", ")
    ))
}

fn validate_board() -> Validator {
    Validator::new(|node, ctx| {
        let board = node.to_string();
        check_board(ctx.platform, &board).map_err(|message| Invalid::at(node, message))?;
        Ok(node.with_value(Value::Str(board)))
    })
}

fn repository_map(node: &Node, reference: (&str, String)) -> Node {
    node.with_value(Value::Map(Map::from_iter([
        ("repository".into(), Node::from(LIBRARY_URI_REPO)),
        (reference.0.into(), Node::from(reference.1)),
    ])))
}

fn simple_esphomelib_version() -> Validator {
    Validator::new(|node, ctx| {
        let text = cv::string_strict().validate(node, ctx)?;
        let text = text.as_str().unwrap_or_default();
        match text.to_uppercase().as_str() {
            "LATEST" => Ok(repository_map(node, ("tag", format!("v{ESPHOMELIB_VERSION}")))),
            "DEV" => Ok(repository_map(node, ("branch", "master".to_string()))),
            _ if VERSION_REGEX.is_match(text) => Ok(repository_map(node, ("tag", format!("v{text}")))),
            _ => Err(Invalid::at(node, "Only simple esphomelib versions!")),
        }
    })
}

fn local_esphomelib_version() -> Validator {
    Validator::new(|node, ctx| {
        let text = cv::string().validate(node, ctx)?;
        let text = text.as_str().unwrap_or_default().to_string();
        let path = ctx.config_dir.join(&text);
        if !path.is_dir() {
            return Err(Invalid::at(
                node,
                format!("Could not find directory '{}'. Please make sure it exists.", path.display()),
            ));
        }
        let library_json = path.join("library.json");
        if !library_json.exists() {
            return Err(Invalid::at(
                node,
                format!(
                    "Could not find '{}' file. '{text}' does not seem to point to an esphomelib copy.",
                    library_json.display()
                ),
            ));
        }
        Ok(node.with_value(Value::Str(text)))
    })
}

fn commit() -> Validator {
    Validator::new(|node, ctx| {
        let value = cv::string().validate(node, ctx)?;
        if !COMMIT_REGEX.is_match(value.as_str().unwrap_or_default()) {
            return Err(Invalid::at(node, "Commit option only accepts commit hashes in hex format."));
        }
        Ok(value)
    })
}

fn esphomelib_version_schema() -> Validator {
    let local: Validator = Schema::new().required("local", local_esphomelib_version()).into();
    let repository = cv::all(vec![
        Schema::new()
            .optional_default("repository", Node::from(LIBRARY_URI_REPO), cv::string())
            .optional("commit", commit())
            .optional("branch", cv::string())
            .optional("tag", cv::string())
            .into(),
        cv::has_at_most_one_key(&["commit", "branch", "tag"]),
    ]);
    let simple = simple_esphomelib_version();
    Validator::new(move |node, ctx| match node.as_map() {
        Some(map) if map.contains_key("local") => local.validate(node, ctx),
        Some(_) => repository.validate(node, ctx),
        None => simple.validate(node, ctx),
    })
}

fn validate_arduino_version() -> Validator {
    Validator::new(|node, ctx| {
        let value = cv::string_strict().validate(node, ctx)?;
        let text = value.as_str().unwrap_or_default().to_string();
        let (lut, family) = match ctx.platform {
            EspPlatform::Esp8266 => (PLATFORMIO_ESP8266_LUT, "espressif8266"),
            EspPlatform::Esp32 => (PLATFORMIO_ESP32_LUT, "espressif32"),
        };
        let upper = text.to_uppercase();
        if let Some((_, platformio)) = lut.iter().find(|(key, _)| *key == upper) {
            return Ok(node.with_value(Value::Str((*platformio).to_string())));
        }
        if VERSION_REGEX.is_match(&text) {
            return Err(Invalid::at(
                node,
                format!(
                    "Unfortunately the arduino framework version '{text}' is unsupported at this \
                     time. You can override this by manually using {family}@<platformio version>"
                ),
            ));
        }
        Ok(node.with_value(Value::Str(text)))
    })
}

fn core_schema() -> Schema {
    Schema::new()
        .required("name", cv::valid_name())
        .required(
            "platform",
            cv::one_of_upper(&["ESP8266", "ESPRESSIF8266", "ESP32", "ESPRESSIF32"]),
        )
        .required("board", validate_board())
        .optional_default("esphomelib_version", Node::from("latest"), esphomelib_version_schema())
        .optional_default("arduino_version", Node::from("recommended"), validate_arduino_version())
        .optional_default("use_custom_code", Node::from(false), cv::boolean())
        .optional("build_path", cv::string())
        .optional("board_flash_mode", cv::one_of_lower(BUILD_FLASH_MODES))
        .optional("includes", cv::list_of(cv::file_path()))
        .optional("libraries", cv::list_of(cv::string_strict()))
        .optional("on_boot", automation::trigger_automation("on_boot"))
        .optional("on_shutdown", automation::trigger_automation("on_shutdown"))
        .optional("on_loop", automation::trigger_automation("on_loop"))
        .optional(
            "library_uri",
            cv::invalid(
                "The library_uri option has been removed in 1.8.0 and was moved into the \
                 esphomelib_version option.",
            ),
        )
        .optional(
            "use_build_flags",
            cv::invalid(
                "The use_build_flags option has been replaced by use_custom_code option in 1.8.0.",
            ),
        )
}

/// Validator of the core section. `build_path` defaults to the device
/// name.
#[must_use]
pub fn config_schema() -> Validator {
    let schema: Validator = core_schema().into();
    Validator::new(move |node, ctx| {
        let mut out = schema.validate(node, ctx)?;
        if !out.contains_key("build_path") {
            let name = out.get_str("name").unwrap_or(ctx.name.as_str()).to_string();
            if let Some(map) = out.as_map_mut() {
                map.insert("build_path".into(), Node::marked(Value::Str(name), node.mark.clone()));
            }
        }
        Ok(out)
    })
}

fn startup_trigger(
    config: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let args = config.get("priority").and_then(Node::to_expression).into_iter().collect();
    let ty = cpp::esphomelib_ns().struct_("StartupTrigger");
    let rhs = owner.clone().dot("register_component").call(vec![ty.new_instance(args)]);
    Ok(ctx.declare_pointer(id, rhs)?)
}

fn shutdown_trigger(
    _: &Node,
    id: &Id,
    _: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = cpp::esphomelib_ns().struct_("ShutdownTrigger");
    Ok(ctx.declare_pointer(id, ty.new_instance(Vec::new()))?)
}

fn loop_trigger(
    _: &Node,
    id: &Id,
    owner: &Expression,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let ty = cpp::esphomelib_ns().struct_("LoopTrigger");
    let rhs = owner.clone().dot("register_component").call(vec![ty.new_instance(Vec::new())]);
    Ok(ctx.declare_pointer(id, rhs)?)
}

fn register(registries: &mut Registries) -> Result<(), RegistryError> {
    let ns = cpp::esphomelib_ns();
    let trigger = cpp::trigger().template(&[&cpp::no_arg()]);
    let shutdown_base = cpp::trigger().template(&[&cpp::const_char_ptr()]);
    let entry = |ty: &str,
                 parent: &ClassRef,
                 arg_type: ClassRef,
                 extra: Schema,
                 build: BuildTriggerFn| TriggerEntry {
        owner: SmolStr::new(DOMAIN),
        trigger_type: ns.class(ty, &[parent, &cpp::component()]),
        arg_type,
        extra,
        build,
    };
    registries.triggers.register(
        "on_boot",
        entry(
            "StartupTrigger",
            &trigger,
            cpp::no_arg(),
            Schema::new().optional("priority", cv::float()),
            startup_trigger,
        ),
    )?;
    registries.triggers.register(
        "on_shutdown",
        entry(
            "ShutdownTrigger",
            &shutdown_base,
            cpp::const_char_ptr(),
            Schema::new(),
            shutdown_trigger,
        ),
    )?;
    registries.triggers.register(
        "on_loop",
        entry("LoopTrigger", &trigger, cpp::no_arg(), Schema::new(), loop_trigger),
    )
}

fn to_code(config: &Node, env: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let name = config.get_str("name").unwrap_or_default();
    ctx.add(cpp::app().method("set_name", vec![name.into()]));
    automation::build_triggers(DOMAIN, config, &cpp::app(), env, ctx)?;
    ctx.add(
        cpp::app()
            .method("set_compilation_datetime", vec![Expression::raw(r#"__DATE__ ", " __TIME__"#)]),
    );
    Ok(())
}

/// Descriptor of the core section.
#[must_use]
pub fn component() -> Component {
    Component::new(DOMAIN)
        .schema(config_schema)
        .to_code(to_code)
        .register(register)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentRegistry;
    use crate::cv::test_support::ctx;
    use std::sync::Arc;

    fn validate(node: Node) -> Result<Node, Invalid> {
        let registries = Arc::new(ComponentRegistry::builtin().registries().unwrap());
        config_schema().validate(&node, &ctx().with_registries(registries))
    }

    fn base() -> Vec<(&'static str, Node)> {
        vec![
            ("name", Node::from("node1")),
            ("platform", Node::from("esp8266")),
            ("board", Node::from("nodemcuv2")),
        ]
    }

    #[test]
    fn defaults_fill_versions_and_build_path() {
        let out = validate(Node::map(base())).unwrap();
        assert_eq!(out.get_str("platform"), Some("ESP8266"));
        assert_eq!(out.get_str("build_path"), Some("node1"));
        assert_eq!(out.get_str("arduino_version"), Some("espressif8266@>=1.8.0"));
        let info = CoreInfo::from_config(&Node::map([("esphomeyaml", out)])).unwrap();
        assert_eq!(
            info.esphomelib_version,
            EsphomelibVersion::Repository {
                url: LIBRARY_URI_REPO.to_string(),
                reference: Some(GitRef::Tag(format!("v{ESPHOMELIB_VERSION}"))),
            }
        );
        assert_eq!(
            info.esphomelib_version.lib_dep(std::path::Path::new(".")),
            "https://github.com/OttoWinter/esphomelib.git#v1.10.0"
        );
    }

    #[test]
    fn arduino_versions_map_to_platformio() {
        let mut entries = base();
        entries.push(("arduino_version", Node::from("2.4.1")));
        let out = validate(Node::map(entries)).unwrap();
        assert_eq!(out.get_str("arduino_version"), Some("espressif8266@1.7.3"));

        let mut entries = base();
        entries.push(("arduino_version", Node::from("2.2.0")));
        let err = validate(Node::map(entries)).unwrap_err();
        assert!(err.to_string().contains("'2.2.0' is unsupported"));
    }

    #[test]
    fn only_one_git_reference() {
        let mut entries = base();
        entries.push((
            "esphomelib_version",
            Node::map([("branch", Node::from("dev")), ("tag", Node::from("v1.9.0"))]),
        ));
        let err = validate(Node::map(entries)).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Cannot specify more than one of commit, branch, tag."));
    }

    #[test]
    fn unknown_boards_are_rejected() {
        let err = check_board(EspPlatform::Esp8266, "nodemcu-foo").unwrap_err();
        assert!(err.starts_with("Could not find board 'nodemcu-foo'. Valid boards are"));
    }

    #[test]
    fn preload_reports_missing_keys() {
        let raw = Node::map([("esphomeyaml", Node::map([("name", Node::from("x"))]))]);
        let err = preload(&raw, PathBuf::from(".")).unwrap_err();
        assert_eq!(err.to_string(), "esphomeyaml.platform not specified.");
        let err = preload(&Node::empty_map(), PathBuf::from(".")).unwrap_err();
        assert_eq!(err.to_string(), "No esphomeyaml section in config");
    }

    #[test]
    fn removed_options_explain_themselves() {
        let mut entries = base();
        entries.push(("library_uri", Node::from("x")));
        let err = validate(Node::map(entries)).unwrap_err();
        assert!(err.to_string().contains("esphomelib_version option"));
    }
}
