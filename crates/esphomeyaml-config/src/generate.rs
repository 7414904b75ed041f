//! Turns a validated document into C++ statements.
//!
//! Every loaded entry becomes one scheduler task declaring the IDs found
//! in its configuration, so a task waiting on a variable is resumed once
//! the entry that declares it has run.

use std::sync::Arc;

use esphomeyaml_codegen::{emit_task, CodegenContext, CodegenError, Scheduler, Statement};
use smol_str::SmolStr;
use tracing::debug;

use crate::component::ComponentRegistry;
use crate::core_config;
use crate::pipeline::ValidatedConfig;
use crate::registry::BuildEnv;

/// Components set up before everything else, in this order.
pub const PRE_INITIALIZE: [&str; 7] = [
    core_config::DOMAIN,
    "logger",
    "wifi",
    "ota",
    "mqtt",
    "web_server",
    "i2c",
];

/// Output of code generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// `setup()` statements.
    pub main: String,
    /// Statements placed before `setup()`.
    pub globals: String,
    /// `#include` lines requested by components.
    pub includes: Vec<String>,
    /// platformio `build_flags`, sorted.
    pub build_flags: Vec<String>,
    /// platformio `lib_deps` from components, sorted.
    pub libraries: Vec<String>,
}

/// Run every loaded component's code generation.
pub fn generate(
    validated: &ValidatedConfig,
    components: &ComponentRegistry,
    simplify: bool,
) -> Result<Generated, CodegenError> {
    let env = BuildEnv {
        registries: Arc::clone(&validated.context.registries),
        platform: validated.context.platform,
        config: Arc::new(validated.config.clone()),
    };

    let (early, rest): (Vec<&SmolStr>, Vec<&SmolStr>) = validated
        .order
        .iter()
        .partition(|key| PRE_INITIALIZE.contains(&key.as_str()));
    let mut early = early;
    early.sort_by_key(|key| PRE_INITIALIZE.iter().position(|name| *name == key.as_str()));

    let mut scheduler = Scheduler::new();
    for key in &early {
        queue_entries(&mut scheduler, validated, components, key, &env);
    }
    scheduler.push(emit_task("pre-initialize", Vec::new(), |ctx| {
        ctx.add(Statement::Raw(String::new()));
        Ok(())
    }));
    for key in &rest {
        queue_entries(&mut scheduler, validated, components, key, &env);
    }

    let mut ctx = CodegenContext::new().with_simplify(simplify);
    scheduler.run(&mut ctx)?;

    let (flags, libraries) = components.harvest(validated.order.iter().map(SmolStr::as_str));
    let mut build_flags: Vec<String> = flags.iter().map(ToString::to_string).collect();
    build_flags.extend(ctx.build_flags().iter().cloned());
    build_flags.sort();
    build_flags.dedup();
    let mut lib_deps: Vec<String> = libraries.iter().map(ToString::to_string).collect();
    lib_deps.extend(ctx.lib_deps().iter().cloned());
    lib_deps.sort();
    lib_deps.dedup();

    debug!(
        "Generated {} statements, {} build flags",
        ctx.statements().len(),
        build_flags.len()
    );
    Ok(Generated {
        main: ctx.main_section(),
        globals: ctx.global_section(),
        includes: ctx.includes().to_vec(),
        build_flags,
        libraries: lib_deps,
    })
}

fn queue_entries(
    scheduler: &mut Scheduler,
    validated: &ValidatedConfig,
    components: &ComponentRegistry,
    key: &SmolStr,
    env: &BuildEnv,
) {
    let Some(to_code) = components.resolve(key).and_then(|component| component.to_code) else {
        return;
    };
    for entry in validated.entries(key) {
        let conf = entry.clone();
        let env = env.clone();
        scheduler.push(emit_task(key.clone(), entry.declared_ids(), move |ctx| {
            to_code(&conf, &env, ctx)
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::node::Node;
    use crate::pipeline::validate_config;

    fn document(extra: Vec<(&'static str, Node)>) -> Node {
        let mut entries = vec![
            (
                "esphomeyaml",
                Node::map([
                    ("name", Node::from("node1")),
                    ("platform", Node::from("ESP8266")),
                    ("board", Node::from("nodemcuv2")),
                ]),
            ),
            ("wifi", Node::map([("ssid", Node::from("a")), ("password", Node::from("password1"))])),
        ];
        entries.extend(extra);
        Node::map(entries)
    }

    fn run(extra: Vec<(&'static str, Node)>) -> Generated {
        let components = ComponentRegistry::builtin();
        let validated = validate_config(&document(extra), PathBuf::from("."), &components).unwrap();
        generate(&validated, &components, false).unwrap()
    }

    #[test]
    fn core_runs_first_and_names_the_app_once() {
        let generated = run(vec![("logger", Node::null())]);
        assert!(generated.main.starts_with("App.set_name(\"node1\");"), "{}", generated.main);
        assert_eq!(generated.main.matches("App.set_name(").count(), 1);
        let log = generated.main.find("App.init_log(").unwrap();
        let wifi = generated.main.find("App.init_wifi(").unwrap();
        assert!(log < wifi);
    }

    #[test]
    fn pre_initialized_block_is_separated() {
        let generated = run(vec![(
            "switch",
            Node::seq(vec![Node::map([
                ("platform", Node::from("gpio")),
                ("name", Node::from("Relay")),
                ("pin", Node::from("D1")),
            ])]),
        )]);
        let blank = generated.main.find("\n\n").unwrap();
        let relay = generated.main.find("make_gpio_switch").unwrap();
        assert!(blank < relay, "{}", generated.main);
        assert!(generated.build_flags.contains(&"-DUSE_SWITCH".to_string()));
    }

    #[test]
    fn consumers_wait_for_producers_declared_later() {
        let generated = run(vec![
            (
                "binary_sensor",
                Node::seq(vec![Node::map([
                    ("platform", Node::from("gpio")),
                    ("name", Node::from("Button")),
                    ("pin", Node::from("D3")),
                    ("on_press", Node::map([("switch.toggle", Node::from("relay"))])),
                ])]),
            ),
            (
                "switch",
                Node::seq(vec![Node::map([
                    ("platform", Node::from("gpio")),
                    ("id", Node::from("relay")),
                    ("pin", Node::from("D1")),
                ])]),
            ),
        ]);
        let declared = generated.main.find("*relay = ").unwrap();
        let used = generated.main.find("make_toggle_action").unwrap();
        assert!(declared < used, "{}", generated.main);
    }

    #[test]
    fn generation_is_deterministic() {
        let extra = || {
            vec![(
                "switch",
                Node::seq(vec![Node::map([
                    ("platform", Node::from("gpio")),
                    ("name", Node::from("Relay")),
                    ("pin", Node::from("D1")),
                ])]),
            )]
        };
        assert_eq!(run(extra()), run(extra()));
    }
}
