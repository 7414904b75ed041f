//! Automations: triggers, conditions and actions.
//!
//! Validation accepts the shorthand forms users write (`on_press: {lambda:
//! ...}`, a bare list of actions, a list of automations) and normalizes them
//! to a list of `{trigger_id, automation_id, if?, then}` mappings. Code
//! generation of each automation runs as a scheduled job after its owner
//! declared the trigger.

use esphomeyaml_codegen::builtin::{bool_, float_, uint32};
use esphomeyaml_codegen::{emit_task, ClassRef, CodegenContext, CodegenError, Expression, Halt, Id};
use smol_str::SmolStr;
use tracing::debug;

use crate::cpp;
use crate::cv::{self, Schema, Validator};
use crate::error::Invalid;
use crate::node::{Node, Value};
use crate::registry::{
    item_entry, validate_registry_list, ActionEntry, BuildEnv, BuildFn, ConditionEntry,
    Registries, RegistryError,
};

pub(crate) fn unsupported(message: String) -> Halt {
    Halt::Error(CodegenError::Other(message))
}

fn templated(name: &str, arg_type: &ClassRef) -> ClassRef {
    cpp::esphomelib_ns().struct_(name).template(&[arg_type])
}

/// `{id: ...}` mapping or the bare ID, referencing a variable of type `ty`.
#[must_use]
pub fn maybe_simple_id(ty: ClassRef) -> Validator {
    cv::maybe_simple_value(
        "id",
        Schema::new().required("id", cv::use_variable_id(ty)).into(),
    )
}

/// Declare `var.<factory><T>()` as the action or condition `id`, where
/// `var` is the variable the item's `id:` references.
pub fn build_variable_item(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    factory: &str,
    ty: &ClassRef,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let target = config
        .get_id("id")
        .ok_or_else(|| unsupported(format!("{factory} without id")))?;
    let var = ctx.variable(target)?;
    let rhs = var
        .member(factory)
        .call_templated(vec![arg_type.clone()], Vec::new());
    Ok(ctx.declare_pointer_as(id, rhs, ty.template(&[arg_type]))?)
}

/// Registry-validated list of actions; each item gets an `action_id`.
#[must_use]
pub fn validate_actions() -> Validator {
    Validator::new(|node, ctx| {
        validate_registry_list(&ctx.registries.actions, Some("action_id"), node, ctx, |entry| {
            (&entry.schema, Some(&entry.id_type))
        })
    })
}

/// Registry-validated list of conditions. A bare lambda is shorthand for
/// `{lambda: ...}`.
#[must_use]
pub fn validate_conditions() -> Validator {
    Validator::new(|node, ctx| {
        let expand = |item: &Node| {
            if item.as_lambda().is_some() {
                item.with_value(Value::Map([("lambda".into(), item.clone())].into_iter().collect()))
            } else {
                item.clone()
            }
        };
        let node = match &node.value {
            Value::Seq(items) => node.with_value(Value::Seq(items.iter().map(expand).collect())),
            _ => expand(node),
        };
        validate_registry_list(
            &ctx.registries.conditions,
            Some("condition_id"),
            &node,
            ctx,
            |entry| (&entry.schema, Some(&entry.id_type)),
        )
    })
}

fn automation_schema(trigger_type: ClassRef) -> Schema {
    Schema::new()
        .generate_id_key("trigger_id", trigger_type)
        .generate_id_key("automation_id", cpp::automation())
        .optional("if", validate_conditions())
        .required("then", validate_actions())
}

/// Validator of one automation key. The result is always a list of
/// automation mappings.
#[must_use]
pub fn validate_automation(trigger_type: ClassRef, extra: &Schema) -> Validator {
    let schema: Validator = automation_schema(trigger_type).extend(extra).into();
    Validator::new(move |node, ctx| {
        let wrap_then = || {
            node.with_value(Value::Map([("then".into(), node.clone())].into_iter().collect()))
        };
        let single = |value: Node| node.with_value(Value::Seq(vec![value]));
        match &node.value {
            Value::Seq(_) => match schema.validate(&wrap_then(), ctx) {
                Ok(value) => Ok(single(value)),
                Err(as_actions) => cv::validate_items(schema.clone())
                    .validate(node, ctx)
                    .map_err(|as_automations| {
                        Invalid::merge([as_actions, as_automations])
                            .unwrap_or_else(|| Invalid::at(node, "invalid automation"))
                    }),
            },
            Value::Map(map) if map.contains_key("then") => schema.validate(node, ctx).map(single),
            Value::Map(_) => schema.validate(&wrap_then(), ctx).map(single),
            _ => schema.validate(node, ctx).map(single),
        }
    })
}

/// Automation for the trigger registered under `key`. The trigger type and
/// the extra keys come from the trigger registry of the run.
#[must_use]
pub fn trigger_automation(key: &str) -> Validator {
    let key = SmolStr::new(key);
    Validator::new(move |node, ctx| {
        let Some(entry) = ctx.registries.triggers.get(&key) else {
            return Err(Invalid::at(node, format!("Unknown trigger {key}")));
        };
        validate_automation(entry.trigger_type.clone(), &entry.extra).validate(node, ctx)
    })
}

/// `value` as a C++ expression: a lambda taking `x` of `arg_type` and
/// returning `output_type`, or the literal.
pub fn templatable(
    value: &Node,
    arg_type: &ClassRef,
    output_type: ClassRef,
    ctx: &CodegenContext,
) -> Result<Expression, Halt> {
    if let Some(lambda) = value.as_lambda() {
        return Ok(ctx.process_lambda(
            lambda,
            vec![(arg_type.clone(), SmolStr::new("x"))],
            Some(output_type),
        )?);
    }
    value
        .to_expression()
        .ok_or_else(|| unsupported(format!("Cannot convert {value} to an expression")))
}

fn build_item(
    item: &Node,
    id_key: &str,
    lookup: impl Fn(&str) -> Option<BuildFn>,
    arg_type: &ClassRef,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let missing = || unsupported(format!("Unsupported {id_key} item {item}"));
    let (key, value) = item_entry(item, Some(id_key)).ok_or_else(missing)?;
    let id = item.get_id(id_key).ok_or_else(missing)?;
    let build = lookup(key).ok_or_else(missing)?;
    build(value, id, arg_type, env, ctx)
}

/// `{action, ...}` array of the validated action list.
pub fn build_actions(
    actions: &[Node],
    arg_type: &ClassRef,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let registries = env.registries.clone();
    let mut out = Vec::with_capacity(actions.len());
    for item in actions {
        let lookup = |key: &str| registries.actions.get(key).map(|entry| entry.build);
        out.push(build_item(item, "action_id", lookup, arg_type, env, ctx)?);
    }
    Ok(Expression::array(out))
}

/// `{condition, ...}` array of the validated condition list.
pub fn build_conditions(
    conditions: &[Node],
    arg_type: &ClassRef,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let registries = env.registries.clone();
    let mut out = Vec::with_capacity(conditions.len());
    for item in conditions {
        let lookup = |key: &str| registries.conditions.get(key).map(|entry| entry.build);
        out.push(build_item(item, "condition_id", lookup, arg_type, env, ctx)?);
    }
    Ok(Expression::array(out))
}

/// Queue the code generation of one automation attached to `trigger`.
///
/// The job first waits for every identifier the automation references,
/// including `id(...)` uses inside lambdas, and only then emits.
pub fn build_automation(
    trigger: Expression,
    arg_type: ClassRef,
    config: Node,
    env: BuildEnv,
    ctx: &mut CodegenContext,
) {
    let Some(automation_id) = config.get_id("automation_id").cloned() else {
        return;
    };
    let declared = config.declared_ids();
    let required: Vec<Id> = config
        .referenced_ids()
        .into_iter()
        .filter(|id| !declared.iter().any(|name| name.as_str() == id.as_str()))
        .collect();
    let name = format!("automation {automation_id}");
    ctx.add_job(emit_task(name, declared, move |ctx| {
        if let Some(id) = ctx.first_missing(&required) {
            return Err(Halt::Need(id));
        }
        debug!("Building automation {automation_id}");
        let rhs = cpp::app()
            .dot("make_automation")
            .call_templated(vec![arg_type.clone()], vec![trigger.clone()]);
        let ty = cpp::automation().template(&[&arg_type]);
        let automation = ctx.declare_pointer_as(&automation_id, rhs, ty)?;
        let conditions = config.get_seq("if");
        if !conditions.is_empty() {
            let conditions = build_conditions(conditions, &arg_type, &env, ctx)?;
            ctx.add(automation.clone().arrow("add_conditions").call(vec![conditions]));
        }
        let actions = build_actions(config.get_seq("then"), &arg_type, &env, ctx)?;
        ctx.add(automation.arrow("add_actions").call(vec![actions]));
        Ok(())
    }));
}

/// Declare every trigger `conf` configures for `domain` on `owner` and
/// queue its automations.
pub fn build_triggers(
    domain: &str,
    conf: &Node,
    owner: &Expression,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<(), Halt> {
    let registries = env.registries.clone();
    for (key, entry) in registries.triggers.iter() {
        if entry.owner != domain {
            continue;
        }
        for automation in conf.get_seq(key) {
            let Some(trigger_id) = automation.get_id("trigger_id") else {
                continue;
            };
            let trigger = (entry.build)(automation, trigger_id, owner, env, ctx)?;
            build_automation(
                trigger,
                entry.arg_type.clone(),
                automation.clone(),
                env.clone(),
                ctx,
            );
        }
    }
    Ok(())
}

fn delay_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let delay = templatable(config, arg_type, uint32(), ctx)?;
    let ty = templated("DelayAction", arg_type);
    let rhs = cpp::app().method("register_component", vec![ty.new_instance(vec![])]);
    let action = ctx.declare_pointer_as(id, rhs, ty)?;
    ctx.add(action.clone().arrow("set_delay").call(vec![delay]));
    Ok(action)
}

fn lambda_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let Some(lambda) = config.as_lambda() else {
        return Err(unsupported("lambda action without lambda".to_string()));
    };
    let lambda = ctx.process_lambda(lambda, vec![(arg_type.clone(), SmolStr::new("x"))], None)?;
    let ty = templated("LambdaAction", arg_type);
    Ok(ctx.declare_pointer_as(id, ty.new_instance(vec![lambda]), ty)?)
}

fn if_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let conditions = build_conditions(config.get_seq("condition"), arg_type, env, ctx)?;
    let ty = templated("IfAction", arg_type);
    let action = ctx.declare_pointer_as(id, ty.new_instance(vec![conditions]), ty)?;
    if config.contains_key("then") {
        let actions = build_actions(config.get_seq("then"), arg_type, env, ctx)?;
        ctx.add(action.clone().arrow("add_then").call(vec![actions]));
    }
    if config.contains_key("else") {
        let actions = build_actions(config.get_seq("else"), arg_type, env, ctx)?;
        ctx.add(action.clone().arrow("add_else").call(vec![actions]));
    }
    Ok(action)
}

fn component_update_action(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let target = config
        .get_id("id")
        .ok_or_else(|| unsupported("component.update without id".to_string()))?;
    let component = ctx.variable(target)?;
    let ty = templated("UpdateComponentAction", arg_type);
    Ok(ctx.declare_pointer_as(id, ty.new_instance(vec![component]), ty)?)
}

fn and_condition(
    config: &Node,
    _: &Id,
    arg_type: &ClassRef,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let conditions = build_conditions(config.as_seq().unwrap_or(&[]), arg_type, env, ctx)?;
    Ok(templated("AndCondition", arg_type).new_instance(vec![conditions]))
}

fn or_condition(
    config: &Node,
    _: &Id,
    arg_type: &ClassRef,
    env: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let conditions = build_conditions(config.as_seq().unwrap_or(&[]), arg_type, env, ctx)?;
    Ok(templated("OrCondition", arg_type).new_instance(vec![conditions]))
}

fn lambda_condition(
    config: &Node,
    _: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let Some(lambda) = config.as_lambda() else {
        return Err(unsupported("lambda condition without lambda".to_string()));
    };
    let lambda = ctx.process_lambda(
        lambda,
        vec![(arg_type.clone(), SmolStr::new("x"))],
        Some(bool_()),
    )?;
    Ok(templated("LambdaCondition", arg_type).new_instance(vec![lambda]))
}

fn range_condition(
    config: &Node,
    id: &Id,
    arg_type: &ClassRef,
    _: &BuildEnv,
    ctx: &mut CodegenContext,
) -> Result<Expression, Halt> {
    let above = config
        .get("above")
        .map(|value| templatable(value, arg_type, float_(), ctx))
        .transpose()?;
    let below = config
        .get("below")
        .map(|value| templatable(value, arg_type, float_(), ctx))
        .transpose()?;
    let ty = templated("RangeCondition", arg_type);
    let condition = ctx.declare_pointer_as(id, ty.new_instance(vec![]), ty)?;
    if let Some(above) = above {
        ctx.add(condition.clone().arrow("set_min").call(vec![above]));
    }
    if let Some(below) = below {
        ctx.add(condition.clone().arrow("set_max").call(vec![below]));
    }
    Ok(condition)
}

/// Register the built-in actions and conditions.
pub fn register_builtins(registries: &mut Registries) -> Result<(), RegistryError> {
    let action = |name: &str, schema: Validator, build| ActionEntry {
        schema,
        id_type: cpp::esphomelib_ns().class(name, &[&cpp::action()]),
        build,
    };
    registries.actions.register(
        "delay",
        action(
            "DelayAction",
            cv::templatable(cv::positive_time_period_milliseconds()),
            delay_action,
        ),
    )?;
    registries
        .actions
        .register("lambda", action("LambdaAction", cv::lambda(), lambda_action))?;
    let if_schema = cv::all(vec![
        Schema::new()
            .required("condition", validate_conditions())
            .optional("then", validate_actions())
            .optional("else", validate_actions())
            .into(),
        cv::has_at_least_one_key(&["then", "else"]),
    ]);
    registries
        .actions
        .register("if", action("IfAction", if_schema, if_action))?;
    let update_schema = maybe_simple_id(cpp::polling_component());
    registries.actions.register(
        "component.update",
        action("UpdateComponentAction", update_schema, component_update_action),
    )?;

    let condition = |name: &str, schema: Validator, build| ConditionEntry {
        schema,
        id_type: cpp::esphomelib_ns().class(name, &[&cpp::condition()]),
        build,
    };
    registries
        .conditions
        .register("and", condition("AndCondition", validate_conditions(), and_condition))?;
    registries
        .conditions
        .register("or", condition("OrCondition", validate_conditions(), or_condition))?;
    registries.conditions.register(
        "lambda",
        condition("LambdaCondition", cv::lambda(), lambda_condition),
    )?;
    let range_schema = cv::all(vec![
        Schema::new()
            .optional("above", cv::templatable(cv::float()))
            .optional("below", cv::templatable(cv::float()))
            .into(),
        cv::has_at_least_one_key(&["above", "below"]),
    ]);
    registries.conditions.register(
        "range",
        condition("RangeCondition", range_schema, range_condition),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use esphomeyaml_codegen::{IdAllocator, Lambda, Scheduler};

    use super::*;
    use crate::cv::{EspPlatform, ValidateContext};

    fn registries() -> Arc<Registries> {
        let mut registries = Registries::default();
        register_builtins(&mut registries).unwrap();
        Arc::new(registries)
    }

    fn ctx() -> ValidateContext {
        ValidateContext::new(EspPlatform::Esp8266, "nodemcuv2").with_registries(registries())
    }

    fn validate(node: Node) -> Result<Node, String> {
        validate_automation(cpp::trigger().template(&[&cpp::no_arg()]), &Schema::new())
            .validate(&node, &ctx())
            .map_err(|err| err.to_string())
    }

    fn lambda(source: &str) -> Node {
        Node::new(Value::Lambda(Lambda::new(source)))
    }

    #[test]
    fn shorthand_forms_normalize_to_lists() {
        let single = validate(Node::map([("delay", Node::from("1s"))])).unwrap();
        let items = single.as_seq().unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].get_id("trigger_id").is_some());
        assert_eq!(items[0].get_seq("then").len(), 1);

        let actions = validate(Node::seq(vec![
            Node::map([("delay", Node::from("1s"))]),
            Node::map([("lambda", lambda("return;"))]),
        ]))
        .unwrap();
        assert_eq!(actions.as_seq().unwrap()[0].get_seq("then").len(), 2);

        let automations = validate(Node::seq(vec![
            Node::map([("then", Node::map([("delay", Node::from("1s"))]))]),
            Node::map([("then", Node::map([("delay", Node::from("2s"))]))]),
        ]))
        .unwrap();
        assert_eq!(automations.as_seq().unwrap().len(), 2);
    }

    #[test]
    fn action_errors() {
        let err = validate(Node::map([("blink", Node::null())])).unwrap_err();
        assert!(
            err.starts_with("Unable to find action with the name 'blink', is the component loaded?"),
            "{err}"
        );
        let err = validate(Node::map([(
            "then",
            Node::map([("delay", Node::from("1s")), ("lambda", lambda("return;"))]),
        )]))
        .unwrap_err();
        assert_eq!(
            err,
            "Cannot have two actions in one item. Key delay overrides lambda! @ then"
        );
    }

    #[test]
    fn if_needs_then_or_else() {
        let node = Node::map([(
            "if",
            Node::map([("condition", Node::map([("lambda", lambda("return true;"))]))]),
        )]);
        let err = validate(node).unwrap_err();
        assert!(err.contains("Must contain at least one of then, else."), "{err}");
    }

    fn resolve_ids(node: &mut Node) {
        let mut ids = IdAllocator::new();
        node.visit_mut(&mut Vec::new(), &mut |node, _| {
            if let Value::Id(id) = &mut node.value {
                if id.is_declaration() {
                    ids.resolve(id);
                }
            }
        });
    }

    #[test]
    fn automation_job_emits_after_trigger() {
        let mut config = validate(Node::map([(
            "then",
            Node::seq(vec![
                Node::map([("delay", Node::from("500ms"))]),
                Node::map([("lambda", lambda("ESP_LOGD(\"main\", \"hi\");"))]),
            ]),
        )]))
        .unwrap();
        resolve_ids(&mut config);
        let automation = config.as_seq().unwrap()[0].clone();
        let env = BuildEnv {
            registries: registries(),
            platform: EspPlatform::Esp8266,
            config: Arc::new(Node::empty_map()),
        };
        let mut ctx = CodegenContext::new();
        build_automation(
            Expression::var("trigger", true),
            cpp::no_arg(),
            automation,
            env,
            &mut ctx,
        );
        let mut scheduler = Scheduler::new();
        scheduler.push(emit_task("noop", vec![], |_| Ok(())));
        scheduler.run(&mut ctx).unwrap();
        expect_test::expect![[r#"
            Automation<NoArg> *automation = App.make_automation<NoArg>(trigger);
            DelayAction<NoArg> *delayaction = App.register_component(new DelayAction<NoArg>());
            delayaction->set_delay(500);
            LambdaAction<NoArg> *lambdaaction = new LambdaAction<NoArg>([=](NoArg x) {
                ESP_LOGD("main", "hi");
            });
            automation->add_actions({delayaction, lambdaaction});

        "#]]
        .assert_eq(&ctx.main_section());
    }
}
