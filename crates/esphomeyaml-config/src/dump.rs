//! Canonical YAML rendering of a validated document.
//!
//! Mapping keys are sorted with `platform` first, so the output only depends
//! on the document's content. Used by the `config` command and for the
//! sidecar's input fingerprint.

use std::fmt::Write;

use crate::node::{Map, Node, Value};

/// Render `node` as block YAML ending with a newline.
#[must_use]
pub fn dump(node: &Node) -> String {
    let mut out = String::new();
    match &node.value {
        Value::Map(map) if !map.is_empty() => dump_map(map, 0, &mut out),
        Value::Seq(items) if !items.is_empty() => dump_seq(items, 0, &mut out),
        _ => {
            out.push_str(&scalar(node, 0));
            out.push('\n');
        }
    }
    out
}

fn sorted_keys(map: &Map) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(|key| key.as_str()).collect();
    keys.sort_by_key(|key| (*key != "platform", *key));
    keys
}

fn dump_map(map: &Map, indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for key in sorted_keys(map) {
        let Some(value) = map.get(key) else { continue };
        let _ = write!(out, "{pad}{}:", quote(key));
        dump_child(value, indent, out);
    }
}

fn dump_seq(items: &[Node], indent: usize, out: &mut String) {
    let pad = " ".repeat(indent);
    for item in items {
        match &item.value {
            Value::Map(map) if !map.is_empty() => {
                // First key shares the dash line.
                let mut first = true;
                for key in sorted_keys(map) {
                    let Some(value) = map.get(key) else { continue };
                    if first {
                        let _ = write!(out, "{pad}- {}:", quote(key));
                        first = false;
                    } else {
                        let _ = write!(out, "{pad}  {}:", quote(key));
                    }
                    dump_child(value, indent + 2, out);
                }
            }
            _ => {
                let _ = write!(out, "{pad}-");
                dump_child(item, indent, out);
            }
        }
    }
}

/// Value after `key:` or `-`: inline scalars, nested blocks on new lines.
fn dump_child(value: &Node, indent: usize, out: &mut String) {
    match &value.value {
        Value::Map(map) if !map.is_empty() => {
            out.push('\n');
            dump_map(map, indent + 2, out);
        }
        Value::Seq(items) if !items.is_empty() => {
            out.push('\n');
            dump_seq(items, indent + 2, out);
        }
        _ => {
            out.push(' ');
            out.push_str(&scalar(value, indent + 2));
            out.push('\n');
        }
    }
}

fn scalar(node: &Node, indent: usize) -> String {
    match &node.value {
        Value::Null => "null".to_string(),
        Value::Map(_) => "{}".to_string(),
        Value::Seq(_) => "[]".to_string(),
        Value::Str(text) => quote(text),
        Value::HexInt(value) => format!("0x{value:02X}"),
        Value::Lambda(lambda) => {
            let pad = " ".repeat(indent);
            let mut text = "!lambda |-".to_string();
            for line in lambda.source().lines() {
                let _ = write!(text, "\n{pad}{line}");
            }
            text
        }
        Value::Id(id) => quote(id.as_str()),
        _ => node.to_string(),
    }
}

/// Plain scalar when it reads back as the same string, double-quoted
/// otherwise.
fn quote(text: &str) -> String {
    if is_plain_safe(text) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            ch if ch.is_control() => {
                let _ = write!(out, "\\x{:02X}", u32::from(ch));
            }
            ch => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn is_plain_safe(text: &str) -> bool {
    let Some(first) = text.chars().next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '/') {
        return false;
    }
    if text.ends_with(' ') || text.contains(": ") || text.contains(" #") {
        return false;
    }
    let lower = text.to_ascii_lowercase();
    if matches!(
        lower.as_str(),
        "true" | "false" | "yes" | "no" | "on" | "off" | "y" | "n" | "null" | "nan" | "inf"
    ) {
        return false;
    }
    text.chars()
        .all(|ch| ch.is_ascii_alphanumeric() || " _-./@+".contains(ch))
}

#[cfg(test)]
mod tests {
    use esphomeyaml_codegen::{Id, Lambda};
    use expect_test::expect;

    use super::*;

    #[test]
    fn sorts_keys_platform_first() {
        let node = Node::map([
            ("wifi", Node::map([("ssid", Node::from("home")), ("password", Node::from(""))])),
            (
                "switch",
                Node::seq(vec![Node::map([
                    ("pin", Node::from(4_i64)),
                    ("id", Node::new(Value::Id(Id::declaration(Some("relay"), None)))),
                    ("platform", Node::from("gpio")),
                    ("on", Node::from("on")),
                ])]),
            ),
            ("logger", Node::empty_map()),
        ]);
        expect![[r#"
            logger: {}
            switch:
              - platform: gpio
                id: relay
                "on": "on"
                pin: 4
            wifi:
              password: ""
              ssid: home
        "#]]
        .assert_eq(&dump(&node));
    }

    #[test]
    fn lambdas_become_block_scalars() {
        let node = Node::map([(
            "lambda",
            Node::new(Value::Lambda(Lambda::new("if (x) {\n  return true;\n}"))),
        )]);
        expect![[r#"
            lambda: !lambda |-
              if (x) {
                return true;
              }
        "#]]
        .assert_eq(&dump(&node));
    }

    #[test]
    fn dump_is_order_independent() {
        let a = Node::map([("a", Node::from(1_i64)), ("b", Node::from("x: y"))]);
        let b = Node::map([("b", Node::from("x: y")), ("a", Node::from(1_i64))]);
        assert_eq!(dump(&a), dump(&b));
        assert_eq!(dump(&a), "a: 1\nb: \"x: y\"\n");
    }
}
