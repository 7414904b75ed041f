//! platformio project writer.
//!
//! Generated content lives between fixed BEGIN/END marker comments in
//! `platformio.ini` and `src/main.cpp`. Rewrites only replace the text
//! between the markers; everything the user added outside of them is kept
//! byte for byte. Files are only touched when their content changes.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use esphomeyaml_config::components::esp32_ble_tracker;
use esphomeyaml_config::{EspPlatform, Generated};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::project::Project;
use crate::storage::{StorageError, StorageJson};

pub const CPP_AUTO_GENERATE_BEGIN: &str = "// ========== AUTO GENERATED CODE BEGIN ===========";
pub const CPP_AUTO_GENERATE_END: &str = "// =========== AUTO GENERATED CODE END ============";
pub const CPP_INCLUDE_BEGIN: &str = "// ========== AUTO GENERATED INCLUDE BLOCK BEGIN ===========";
pub const CPP_INCLUDE_END: &str = "// ========== AUTO GENERATED INCLUDE BLOCK END ===========";
pub const INI_AUTO_GENERATE_BEGIN: &str = "; ========== AUTO GENERATED CODE BEGIN ===========";
pub const INI_AUTO_GENERATE_END: &str = "; =========== AUTO GENERATED CODE END ============";

const CPP_BASE_HEAD: &str = "// Auto generated code by esphomeyaml\n";
const CPP_BASE_MIDDLE: &str = "

void setup() {
  // ===== DO NOT EDIT ANYTHING BELOW THIS LINE =====
  ";
const CPP_BASE_TAIL: &str = "
  // ========= YOU CAN EDIT AFTER THIS LINE =========
  App.setup();
}

void loop() {
  App.loop();
}
";

const INI_BASE_HEAD: &str = "; Auto generated code by esphomeyaml

[common]
lib_deps =
build_flags =
upload_flags =

; ===== DO NOT EDIT ANYTHING BELOW THIS LINE =====
";
const INI_BASE_TAIL: &str = "
; ========= YOU CAN EDIT AFTER THIS LINE =========

";

const GITIGNORE_CONTENT: &str = "# Gitignore settings for esphomeyaml
# This is an example and may include too much for your use-case.
# You can modify this file to suit your needs.
/.esphomeyaml/
/secrets.yaml
";

/// Partition table with room for two OTA slots, used when the BLE stack
/// makes the firmware too large for the default table.
const PARTITIONS_CSV: &str = "\
nvs,      data, nvs,     0x009000, 0x005000,
otadata,  data, ota,     0x00e000, 0x002000,
app0,     app,  ota_0,   0x010000, 0x190000,
app1,     app,  ota_1,   0x200000, 0x190000,
eeprom,   data, 0x99,    0x390000, 0x001000,
spiffs,   data, spiffs,  0x391000, 0x00F000
";

const INCLUDE_EXTENSIONS: &[&str] = &["h", "hpp", "tcc", "ino", "cpp", "c"];
const HEADER_EXTENSIONS: &[&str] = &["h", "hpp", "tcc"];

/// Build directories platformio regenerates; the only paths `clean`
/// removes.
pub const BUILD_CACHE_DIRS: [&str; 2] = [".piolibdeps", ".pioenvs"];

#[derive(Debug, Error)]
pub enum WriterError {
    #[error(
        "Could not find auto generated code {0} in file, either delete the main sketch file or insert the comment again."
    )]
    MarkerMissing(&'static str),
    #[error(
        "Found multiple auto generate code {0}s, don't know which to chose, please remove one of them."
    )]
    MarkerDuplicated(&'static str),
    #[error("{path}: {error}")]
    InFile {
        path: PathBuf,
        #[source]
        error: Box<WriterError>,
    },
    #[error("Could not access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Include has invalid file extension: {0}")]
    InvalidInclude(PathBuf),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> WriterError + '_ {
    move |source| WriterError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `content` through a temporary sibling and rename it into place.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp{}", std::process::id()));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path).inspect_err(|_| {
        let _ = fs::remove_file(&tmp);
    })
}

/// Write `content` unless the file already holds it. Returns whether the
/// file changed.
pub fn write_if_changed(path: &Path, content: &str) -> io::Result<bool> {
    match fs::read_to_string(path) {
        Ok(existing) if existing == content => return Ok(false),
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    write_atomic(path, content)?;
    Ok(true)
}

/// Split `text` around the single `begin`..`end` marker pair, dropping the
/// markers and what is between them.
pub fn find_begin_end<'a>(
    text: &'a str,
    begin: &str,
    end: &str,
) -> Result<(&'a str, &'a str), WriterError> {
    let begin_index = text.find(begin).ok_or(WriterError::MarkerMissing("begin"))?;
    if text[begin_index + 1..].contains(begin) {
        return Err(WriterError::MarkerDuplicated("begin"));
    }
    let end_index = text.find(end).ok_or(WriterError::MarkerMissing("end"))?;
    if text[end_index + 1..].contains(end) {
        return Err(WriterError::MarkerDuplicated("end"));
    }
    if end_index < begin_index {
        return Err(WriterError::MarkerMissing("end"));
    }
    Ok((&text[..begin_index], &text[end_index + end.len()..]))
}

/// Files written by [`write_project`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// Paths whose content changed.
    pub changed: Vec<PathBuf>,
    /// Whether the build cache was removed.
    pub cleaned: bool,
}

/// Write the platformio project for `project`.
pub fn write_project(project: &Project, generated: &Generated) -> Result<WriteReport, WriterError> {
    let mut report = WriteReport::default();
    fs::create_dir_all(&project.build_dir).map_err(io_error(&project.build_dir))?;
    if write_gitignore(&project.config_dir)? {
        report.changed.push(project.config_dir.join(".gitignore"));
    }
    let storage = prepare_storage(project)?;

    let use_partitions = project.platform() == EspPlatform::Esp32
        && esp32_ble_tracker::uses_ble(project.config());
    if use_partitions {
        let path = project.partitions_csv();
        if write_if_changed(&path, PARTITIONS_CSV).map_err(io_error(&path))? {
            report.changed.push(path);
        }
    }

    let ini = project.platformio_ini();
    let content = ini_content(project, generated, use_partitions);
    if write_ini(&ini, &content)? {
        report.changed.push(ini);
    }

    let mut includes = Vec::new();
    for include in &project.core.includes {
        if let Some(line) = copy_include(project, Path::new(include), &mut report)? {
            includes.push(line);
        }
    }
    let cpp = project.main_cpp();
    if write_cpp(&cpp, &include_block(generated, &includes), &generated.main)? {
        report.changed.push(cpp);
    }
    if let Some(update) = storage {
        report.cleaned = update.commit(&project.build_dir)?;
    }
    debug!("Wrote {} file(s) to {}", report.changed.len(), project.build_dir.display());
    Ok(report)
}

fn write_gitignore(config_dir: &Path) -> Result<bool, WriterError> {
    let path = config_dir.join(".gitignore");
    if path.is_file() {
        return Ok(false);
    }
    write_atomic(&path, GITIGNORE_CONTENT).map_err(io_error(&path))?;
    Ok(true)
}

/// Sidecar change computed before the project files are written.
struct StorageUpdate {
    path: PathBuf,
    storage: StorageJson,
    clean: bool,
}

impl StorageUpdate {
    /// Clean the build cache when the core settings changed, then record
    /// the new settings. Returns whether the cache was cleaned.
    fn commit(self, build_dir: &Path) -> Result<bool, WriterError> {
        if self.clean {
            info!("Core config or version changed, cleaning build files...");
            if let Err(err) = clean_build(build_dir) {
                warn!("Error deleting build files ({err})! Ignoring...");
            }
        }
        self.storage.save(&self.path)?;
        Ok(self.clean)
    }
}

/// Compare the sidecar with the project and migrate `main.cpp` to the
/// current source version. `None` when nothing changed.
fn prepare_storage(project: &Project) -> Result<Option<StorageUpdate>, WriterError> {
    let path = project.storage_path();
    let old = StorageJson::load(&path);
    let storage = StorageJson::from_project(project, old.as_ref());
    if old.as_ref() == Some(&storage) {
        return Ok(None);
    }
    let old_src_version = old.as_ref().map_or(0, |old| old.src_version);
    migrate_src_version(&project.main_cpp(), old_src_version, storage.src_version)?;
    let clean = storage.needs_clean(old.as_ref());
    Ok(Some(StorageUpdate {
        path,
        storage,
        clean,
    }))
}

/// Remove the platformio build caches below `build_dir`.
pub fn clean_build(build_dir: &Path) -> Result<(), WriterError> {
    for directory in BUILD_CACHE_DIRS {
        let path = build_dir.join(directory);
        if !path.is_dir() {
            continue;
        }
        info!("Deleting {}", path.display());
        fs::remove_dir_all(&path).map_err(io_error(&path))?;
    }
    Ok(())
}

fn upload_speed(board: &str) -> u32 {
    match board {
        "esp210" => 57_600,
        _ => 115_200,
    }
}

enum IniValue {
    Single(String),
    List(Vec<String>),
}

fn format_ini(entries: &[(&str, IniValue)]) -> String {
    let mut sorted: Vec<&(&str, IniValue)> = entries.iter().collect();
    sorted.sort_by_key(|(key, _)| *key);
    let mut out = String::new();
    for (key, value) in sorted {
        match value {
            IniValue::Single(value) => {
                let _ = writeln!(out, "{key} = {value}");
            }
            IniValue::List(values) => {
                let _ = writeln!(out, "{key} =");
                for value in values {
                    let _ = writeln!(out, "    {value}");
                }
            }
        }
    }
    out
}

fn lib_deps(project: &Project, generated: &Generated) -> Vec<String> {
    let mut deps = vec![project.core.esphomelib_version.lib_dep(&project.config_dir)];
    deps.extend(generated.libraries.iter().cloned());
    deps.extend(project.core.libraries.iter().cloned());
    if project.platform() == EspPlatform::Esp32 {
        deps.push("Preferences".to_string());
    }
    deps.retain(|dep| !dep.is_empty());
    deps.sort();
    deps.dedup();
    deps
}

fn build_flags(project: &Project, generated: &Generated) -> Vec<String> {
    let mut flags = Vec::new();
    if !project.core.use_custom_code {
        flags.extend(generated.build_flags.iter().cloned());
        flags.push("-DESPHOMEYAML_USE".to_string());
        flags.push("-Wno-unused-variable".to_string());
    }
    flags.sort();
    flags.dedup();
    flags
}

/// Body of the `[env:<name>]` section between the ini markers.
fn ini_content(project: &Project, generated: &Generated, use_partitions: bool) -> String {
    let mut flags = build_flags(project, generated);
    flags.push("${common.build_flags}".to_string());
    let mut deps = lib_deps(project, generated);
    deps.push("${common.lib_deps}".to_string());

    let mut entries = vec![
        ("board", IniValue::Single(project.core.board.to_string())),
        ("build_flags", IniValue::List(flags)),
        ("framework", IniValue::Single("arduino".to_string())),
        ("lib_deps", IniValue::List(deps)),
        ("platform", IniValue::Single(project.core.arduino_version.clone())),
        (
            "upload_speed",
            IniValue::Single(upload_speed(&project.core.board).to_string()),
        ),
    ];
    if let Some(mode) = &project.core.board_flash_mode {
        entries.push(("board_build.flash_mode", IniValue::Single(mode.clone())));
    }
    if use_partitions {
        entries.push(("board_build.partitions", IniValue::Single("partitions.csv".to_string())));
    }
    format!("[env:{}]\n{}", project.name(), format_ini(&entries))
}

fn read_existing(path: &Path) -> Result<Option<String>, WriterError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(WriterError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn in_file(path: &Path) -> impl FnOnce(WriterError) -> WriterError + '_ {
    move |error| WriterError::InFile {
        path: path.to_path_buf(),
        error: Box::new(error),
    }
}

/// Splice `content` into the ini markers of `path`.
pub fn write_ini(path: &Path, content: &str) -> Result<bool, WriterError> {
    let existing = read_existing(path)?;
    let full = render_ini(existing.as_deref(), content).map_err(in_file(path))?;
    write_if_changed(path, &full).map_err(io_error(path))
}

fn render_ini(existing: Option<&str>, content: &str) -> Result<String, WriterError> {
    let (head, tail) = match existing {
        Some(text) => find_begin_end(text, INI_AUTO_GENERATE_BEGIN, INI_AUTO_GENERATE_END)?,
        None => (INI_BASE_HEAD, INI_BASE_TAIL),
    };
    Ok(format!("{head}{INI_AUTO_GENERATE_BEGIN}\n{content}{INI_AUTO_GENERATE_END}{tail}"))
}

/// Splice the include block and the setup code into the markers of
/// `path`.
pub fn write_cpp(path: &Path, includes: &str, code: &str) -> Result<bool, WriterError> {
    let existing = read_existing(path)?;
    let full = render_cpp(existing.as_deref(), includes, code).map_err(in_file(path))?;
    write_if_changed(path, &full).map_err(io_error(path))
}

fn render_cpp(existing: Option<&str>, includes: &str, code: &str) -> Result<String, WriterError> {
    let (head, middle, tail) = match existing {
        Some(text) => {
            let (before, tail) = find_begin_end(text, CPP_AUTO_GENERATE_BEGIN, CPP_AUTO_GENERATE_END)?;
            let (head, middle) = find_begin_end(before, CPP_INCLUDE_BEGIN, CPP_INCLUDE_END)?;
            (head, middle, tail)
        }
        None => (CPP_BASE_HEAD, CPP_BASE_MIDDLE, CPP_BASE_TAIL),
    };
    let mut out = String::with_capacity(head.len() + includes.len() + code.len() + tail.len() + 256);
    out.push_str(head);
    out.push_str(CPP_INCLUDE_BEGIN);
    out.push('\n');
    out.push_str(includes);
    out.push_str(CPP_INCLUDE_END);
    out.push_str(middle);
    out.push_str(CPP_AUTO_GENERATE_BEGIN);
    out.push('\n');
    out.push_str(&indent_code(code));
    out.push_str(CPP_AUTO_GENERATE_END);
    out.push_str(tail);
    Ok(out)
}

/// Indent setup statements by two spaces, leaving blank lines empty.
fn indent_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 64);
    for line in code.lines() {
        if !line.is_empty() {
            out.push_str("  ");
            out.push_str(line);
        }
        out.push('\n');
    }
    if !out.is_empty() {
        out.push_str("  ");
    }
    out
}

fn include_block(generated: &Generated, custom: &[String]) -> String {
    let mut out = String::from("#include \"esphomelib/application.h\"\nusing namespace esphomelib;\n");
    for line in generated.includes.iter().chain(custom) {
        out.push_str(line);
        out.push('\n');
    }
    if !generated.globals.trim().is_empty() {
        out.push_str(&generated.globals);
    }
    out
}

/// Copy a user include next to `main.cpp`. Headers are also `#include`d.
fn copy_include(
    project: &Project,
    include: &Path,
    report: &mut WriteReport,
) -> Result<Option<String>, WriterError> {
    let source = project.config_dir.join(include);
    let extension = source
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if !INCLUDE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(WriterError::InvalidInclude(include.to_path_buf()));
    }
    let Some(file_name) = source.file_name().map(|name| name.to_string_lossy().into_owned()) else {
        return Err(WriterError::InvalidInclude(include.to_path_buf()));
    };
    let content = fs::read_to_string(&source).map_err(io_error(&source))?;
    let target = project.build_dir.join("src").join(&file_name);
    if write_if_changed(&target, &content).map_err(io_error(&target))? {
        report.changed.push(target);
    }
    Ok(HEADER_EXTENSIONS
        .contains(&extension.as_str())
        .then(|| format!("#include \"{file_name}\"")))
}

static DELAY_LOOP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)\s*delay\((?:16|20)\);").expect("static regex"));
static USING_NAMESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)using namespace esphomelib;").expect("static regex"));
static APPLICATION_INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)#include "esphomelib/application.h""#).expect("static regex"));

/// A rewrite bringing `main.cpp` to `version`.
struct Migration {
    version: u32,
    apply: fn(&str, &Path) -> String,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    apply: migrate_include_block,
}];

/// Move the application include into a marker block and drop the
/// hard-coded loop delay.
fn migrate_include_block(content: &str, path: &Path) -> String {
    if content.contains(CPP_INCLUDE_BEGIN) {
        return content.to_string();
    }
    let count = DELAY_LOOP.find_iter(content).count();
    let content = DELAY_LOOP.replace_all(content, "");
    if count != 0 {
        info!("Migration: Removed {count} occurrence of 'delay(16);' in {}", path.display());
    }
    let count = USING_NAMESPACE.find_iter(&content).count();
    let content = USING_NAMESPACE.replace_all(&content, "");
    if count != 0 {
        info!(
            "Migration: Removed {count} occurrence of 'using namespace esphomelib;' in {}",
            path.display()
        );
    }
    let block = format!("{CPP_INCLUDE_BEGIN}\n{CPP_INCLUDE_END}");
    if !APPLICATION_INCLUDE.is_match(&content) {
        error!(
            "Migration failed. {} needs an auto-generated include section. Please remove it and let it be generated again.",
            path.display()
        );
        return content.into_owned();
    }
    info!("Migration: Added include section to {}", path.display());
    APPLICATION_INCLUDE.replace_all(&content, block.as_str()).into_owned()
}

/// Apply every migration newer than `old` up to `new` to `main_cpp`.
pub fn migrate_src_version(main_cpp: &Path, old: u32, new: u32) -> Result<(), WriterError> {
    if old == new {
        return Ok(());
    }
    if old > new {
        warn!("The source version rolled backwards! Ignoring.");
        return Ok(());
    }
    let Some(original) = read_existing(main_cpp)? else {
        return Ok(());
    };
    let mut content = original.clone();
    for migration in MIGRATIONS.iter().filter(|m| m.version > old && m.version <= new) {
        content = (migration.apply)(&content, main_cpp);
    }
    if content != original {
        write_atomic(main_cpp, &content).map_err(io_error(main_cpp))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    #[test]
    fn fresh_cpp_uses_the_base_layout() {
        let cpp = render_cpp(None, "#include \"esphomelib/application.h\"\n", "App.set_name(\"node1\");\n\n").unwrap();
        expect![[r#"
            // Auto generated code by esphomeyaml
            // ========== AUTO GENERATED INCLUDE BLOCK BEGIN ===========
            #include "esphomelib/application.h"
            // ========== AUTO GENERATED INCLUDE BLOCK END ===========

            void setup() {
              // ===== DO NOT EDIT ANYTHING BELOW THIS LINE =====
              // ========== AUTO GENERATED CODE BEGIN ===========
              App.set_name("node1");

              // =========== AUTO GENERATED CODE END ============
              // ========= YOU CAN EDIT AFTER THIS LINE =========
              App.setup();
            }

            void loop() {
              App.loop();
            }
        "#]]
        .assert_eq(&cpp);
    }

    #[test]
    fn rewrite_keeps_user_content_outside_markers() {
        let first = render_cpp(None, "", "a();\n").unwrap();
        let edited = first
            .replace("void loop() {", "// user helper\nint helper() { return 1; }\n\nvoid loop() {")
            .replacen("// Auto generated", "#include <user.h>\n// Auto generated", 1);
        let second = render_cpp(Some(&edited), "", "b();\n").unwrap();
        assert!(second.starts_with("#include <user.h>\n"));
        assert!(second.contains("int helper() { return 1; }"));
        assert!(second.contains("  b();\n"));
        assert!(!second.contains("a();"));
        assert_eq!(render_cpp(Some(&second), "", "b();\n").unwrap(), second);
    }

    #[test]
    fn marker_errors() {
        let err = render_cpp(Some("void setup() {}\n"), "", "").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find auto generated code begin in file, either delete the main sketch file or insert the comment again."
        );
        let doubled = format!(
            "{CPP_AUTO_GENERATE_BEGIN}\n{CPP_AUTO_GENERATE_BEGIN}\n{CPP_AUTO_GENERATE_END}\n"
        );
        let err = render_cpp(Some(&doubled), "", "").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found multiple auto generate code begins, don't know which to chose, please remove one of them."
        );
        let unterminated = format!("{INI_AUTO_GENERATE_BEGIN}\n");
        assert!(matches!(
            render_ini(Some(&unterminated), "").unwrap_err(),
            WriterError::MarkerMissing("end")
        ));
    }

    #[test]
    fn ini_sections_are_sorted() {
        let entries = vec![
            ("upload_speed", IniValue::Single("115200".into())),
            ("board", IniValue::Single("nodemcuv2".into())),
            (
                "lib_deps",
                IniValue::List(vec!["ArduinoJson".into(), "${common.lib_deps}".into()]),
            ),
        ];
        let ini = render_ini(None, &format!("[env:node1]\n{}", format_ini(&entries))).unwrap();
        expect![[r#"
            ; Auto generated code by esphomeyaml

            [common]
            lib_deps =
            build_flags =
            upload_flags =

            ; ===== DO NOT EDIT ANYTHING BELOW THIS LINE =====
            ; ========== AUTO GENERATED CODE BEGIN ===========
            [env:node1]
            board = nodemcuv2
            lib_deps =
                ArduinoJson
                ${common.lib_deps}
            upload_speed = 115200
            ; =========== AUTO GENERATED CODE END ============
            ; ========= YOU CAN EDIT AFTER THIS LINE =========

        "#]]
        .assert_eq(&ini);
    }

    #[test]
    fn migration_adds_include_block() {
        let old = "// Auto generated code by esphomeyaml\n#include \"esphomelib/application.h\"\n\nusing namespace esphomelib;\n\nvoid setup() {\n}\n\nvoid loop() {\n  App.loop();\n  delay(16);\n}\n";
        let migrated = migrate_include_block(old, Path::new("main.cpp"));
        expect![[r#"
            // Auto generated code by esphomeyaml
            // ========== AUTO GENERATED INCLUDE BLOCK BEGIN ===========
            // ========== AUTO GENERATED INCLUDE BLOCK END ===========



            void setup() {
            }

            void loop() {
              App.loop();
            }
        "#]]
        .assert_eq(&migrated);
        assert_eq!(migrate_include_block(&migrated, Path::new("main.cpp")), migrated);
    }

    #[test]
    fn upload_speed_override() {
        assert_eq!(upload_speed("esp210"), 57_600);
        assert_eq!(upload_speed("nodemcuv2"), 115_200);
    }
}
