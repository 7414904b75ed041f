//! Serial logger and log levels.

use esphomeyaml_codegen::{CodegenContext, Expression, Halt};

use crate::component::Component;
use crate::cpp;
use crate::cv::{self, Schema, Validator};
use crate::error::{Invalid, PathSegment};
use crate::node::{Map, Node, Value};
use crate::registry::BuildEnv;

/// Component key.
pub const DOMAIN: &str = "logger";

/// Baud rate used when `baud_rate` is not set.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Levels from least to most verbose.
pub const LOG_LEVELS: &[&str] = &["NONE", "ERROR", "WARN", "INFO", "DEBUG", "VERBOSE", "VERY_VERBOSE"];

const DEFAULT_LEVEL: &str = "DEBUG";

fn severity(level: &str) -> usize {
    LOG_LEVELS.iter().position(|known| *known == level).unwrap_or(0)
}

fn level_constant(level: &str) -> Expression {
    Expression::raw(format!("ESPHOMELIB_LOG_LEVEL_{level}"))
}

fn is_log_level() -> Validator {
    cv::one_of_upper(LOG_LEVELS)
}

fn validate_logs() -> Validator {
    Validator::new(|node, ctx| {
        let Some(map) = node.as_map() else {
            return Err(Invalid::at(node, format!("expected dictionary, got {node}")));
        };
        let level = is_log_level();
        let mut out = Map::new();
        let mut errors = Vec::new();
        for (tag, value) in map {
            match level.validate(value, ctx) {
                Ok(value) => {
                    out.insert(tag.clone(), value);
                }
                Err(err) => errors.push(err.prefixed(PathSegment::Key(tag.clone()))),
            }
        }
        if let Some(err) = Invalid::merge(errors) {
            return Err(err);
        }
        Ok(node.with_value(Value::Map(out)))
    })
}

fn validate_local_no_higher_than_global() -> Validator {
    Validator::new(|node, _| {
        let global = node.get_str("level").unwrap_or(DEFAULT_LEVEL);
        let logs = node.get("logs").and_then(Node::as_map);
        for (tag, level) in logs.into_iter().flatten() {
            let level = level.as_str().unwrap_or_default();
            if severity(level) > severity(global) {
                return Err(Invalid::at(
                    node,
                    format!(
                        "The local log level {level} for {tag} must be less severe than the \
                         global log level {global}."
                    ),
                ));
            }
        }
        Ok(node.clone())
    })
}

fn config_schema() -> Validator {
    cv::all(vec![
        Schema::new()
            .generate_id(cpp::esphomelib_ns().class("LogComponent", &[&cpp::component()]))
            .optional_default("baud_rate", Node::from(i64::from(DEFAULT_BAUD_RATE)), cv::positive_int())
            .optional("tx_buffer_size", cv::validate_bytes())
            .optional("level", is_log_level())
            .optional("logs", validate_logs())
            .into(),
        validate_local_no_higher_than_global(),
    ])
}

fn to_code(config: &Node, _: &BuildEnv, ctx: &mut CodegenContext) -> Result<(), Halt> {
    let Some(id) = config.get_id("id") else {
        return Ok(());
    };
    let baud_rate = config.get_i64("baud_rate").unwrap_or(i64::from(DEFAULT_BAUD_RATE));
    let log = ctx.declare_pointer(id, cpp::app().method("init_log", vec![baud_rate.into()]))?;
    if let Some(size) = config.get_i64("tx_buffer_size") {
        ctx.add(log.clone().method("set_tx_buffer_size", vec![size.into()]));
    }
    if let Some(level) = config.get_str("level") {
        ctx.add(log.clone().method("set_global_log_level", vec![level_constant(level)]));
        ctx.add_build_flag(format!("-DESPHOMELIB_LOG_LEVEL=ESPHOMELIB_LOG_LEVEL_{level}"));
    }
    for (tag, level) in config.get("logs").and_then(Node::as_map).into_iter().flatten() {
        let level = level.as_str().unwrap_or(DEFAULT_LEVEL);
        ctx.add(log.clone().method(
            "set_log_level",
            vec![tag.as_str().into(), level_constant(level)],
        ));
    }
    Ok(())
}

/// Descriptor of `logger:`.
#[must_use]
pub fn component() -> Component {
    Component::new(DOMAIN).schema(config_schema).to_code(to_code)
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::components::test_support::{emit, validate};

    #[test]
    fn local_levels_may_not_exceed_global() {
        let node = Node::map([
            ("level", Node::from("info")),
            ("logs", Node::map([("mqtt.client", Node::from("debug"))])),
        ]);
        let err = validate(&config_schema(), node).unwrap_err();
        assert_eq!(
            err,
            "The local log level DEBUG for mqtt.client must be less severe than the global log \
             level INFO."
        );
    }

    #[test]
    fn emits_levels() {
        let node = Node::map([
            ("baud_rate", Node::from(0_i64)),
            ("level", Node::from("verbose")),
            ("logs", Node::map([("sensor", Node::from("warn"))])),
        ]);
        let config = validate(&config_schema(), node).unwrap();
        expect![[r#"
            LogComponent *logcomponent = App.init_log(0);
            logcomponent->set_global_log_level(ESPHOMELIB_LOG_LEVEL_VERBOSE);
            logcomponent->set_log_level("sensor", ESPHOMELIB_LOG_LEVEL_WARN);

        "#]]
        .assert_eq(&emit(to_code, &config));
    }
}
