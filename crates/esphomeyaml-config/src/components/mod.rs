//! Bundled components.
//!
//! Each module exposes a `component()` descriptor; platform modules live
//! below their host (`binary_sensor::gpio`).

use crate::component::Component;
use crate::core_config;

pub mod binary_sensor;
pub mod esp32_ble_beacon;
pub mod esp32_ble_tracker;
pub mod i2c;
pub mod json;
pub mod logger;
pub mod mpr121;
pub mod mqtt;
pub mod ota;
pub mod output;
pub mod pcf8574;
pub mod switch;
pub mod wifi;

/// Every bundled descriptor, core first.
#[must_use]
pub fn all() -> Vec<Component> {
    vec![
        core_config::component(),
        logger::component(),
        wifi::component(),
        ota::component(),
        mqtt::component(),
        json::component(),
        i2c::component(),
        binary_sensor::component(),
        binary_sensor::gpio::component(),
        binary_sensor::mpr121::component(),
        mpr121::component(),
        pcf8574::component(),
        esp32_ble_tracker::component(),
        esp32_ble_beacon::component(),
        switch::component(),
        switch::gpio::component(),
        output::component(),
        output::gpio::component(),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use esphomeyaml_codegen::{emit_task, CodegenContext, IdAllocator, Scheduler};

    use crate::component::{ComponentRegistry, ToCodeFn};
    use crate::cv::{test_support::ctx, EspPlatform, ValidateContext, Validator};
    use crate::node::{Node, Value};
    use crate::registry::{BuildEnv, Registries};

    pub fn registries() -> Arc<Registries> {
        Arc::new(ComponentRegistry::builtin().registries().unwrap())
    }

    pub fn validate_on(schema: &Validator, node: Node, ctx: ValidateContext) -> Result<Node, String> {
        let mut out = schema
            .validate(&node, &ctx.with_registries(registries()))
            .map_err(|err| err.to_string())?;
        let mut ids = IdAllocator::new();
        out.visit_mut(&mut Vec::new(), &mut |node, _| {
            if let Value::Id(id) = &mut node.value {
                if id.is_declaration() {
                    ids.resolve(id);
                }
            }
        });
        Ok(out)
    }

    /// Validate for ESP8266 and name every generated declaration.
    pub fn validate(schema: &Validator, node: Node) -> Result<Node, String> {
        validate_on(schema, node, ctx())
    }

    /// Run `to_code` for `conf` and its jobs after `setup` ran.
    pub fn emit_with(
        setup: impl FnMut(&mut CodegenContext) -> Result<(), esphomeyaml_codegen::Halt> + 'static,
        to_code: ToCodeFn,
        conf: &Node,
    ) -> String {
        let env = BuildEnv {
            registries: registries(),
            platform: EspPlatform::Esp8266,
            config: Arc::new(Node::empty_map()),
        };
        let conf = conf.clone();
        let mut scheduler = Scheduler::new();
        scheduler.push(emit_task("setup", Vec::new(), setup));
        scheduler.push(emit_task("component", Vec::new(), move |ctx| {
            to_code(&conf, &env, ctx)
        }));
        let mut ctx = CodegenContext::new();
        scheduler.run(&mut ctx).unwrap();
        ctx.main_section()
    }

    /// Run `to_code` for `conf` and its jobs.
    pub fn emit(to_code: ToCodeFn, conf: &Node) -> String {
        emit_with(|_| Ok(()), to_code, conf)
    }
}
