//! Per-run emission state.
//!
//! A [`CodegenContext`] owns everything one code generation run produces:
//! the ordered statement buffer, the variable table, harvested build flags,
//! library dependencies and include lines, plus jobs queued by running
//! tasks. It is created per run and threaded through the scheduler.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::debug;

use crate::error::CodegenError;
use crate::expr::{Assignment, Expression};
use crate::id::Id;
use crate::lambda::{Lambda, LambdaExpression, LambdaPart, LambdaSegment};
use crate::scheduler::Task;
use crate::statement::Statement;
use crate::types::ClassRef;

/// Declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Identifier as declared.
    pub id: Id,
    /// Declared type.
    pub ty: ClassRef,
    /// Declared through `T *name`.
    pub pointer: bool,
}

impl Variable {
    /// Expression referring to the variable.
    #[must_use]
    pub fn expr(&self) -> Expression {
        Expression::var(self.id.as_str(), self.pointer)
    }
}

/// Emission buffer and variable table for one run.
#[derive(Default)]
pub struct CodegenContext {
    statements: Vec<Statement>,
    global_statements: Vec<Statement>,
    variables: IndexMap<SmolStr, Variable>,
    build_flags: BTreeSet<String>,
    lib_deps: BTreeSet<String>,
    includes: Vec<String>,
    jobs: Vec<Box<dyn Task>>,
    simplify: bool,
}

/// Snapshot used to detect side effects of a suspended task step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Watermark {
    statements: usize,
    globals: usize,
    variables: usize,
    jobs: usize,
}

impl CodegenContext {
    /// Empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable elision of unused declarations when rendering.
    #[must_use]
    pub fn with_simplify(mut self, simplify: bool) -> Self {
        self.simplify = simplify;
        self
    }

    /// Append a statement to `setup()`.
    pub fn add(&mut self, statement: impl Into<Statement>) {
        let statement = statement.into();
        debug!("Adding: {statement}");
        self.statements.push(statement);
    }

    /// Append a statement before `setup()`.
    pub fn add_global(&mut self, statement: impl Into<Statement>) {
        self.global_statements.push(statement.into());
    }

    /// Emit `T name = rhs;` and register `id`.
    pub fn declare_variable(&mut self, id: &Id, rhs: Expression) -> Result<Expression, CodegenError> {
        self.declare(id, rhs, None, false)
    }

    /// Emit `T *name = rhs;` and register `id`.
    pub fn declare_pointer(&mut self, id: &Id, rhs: Expression) -> Result<Expression, CodegenError> {
        self.declare(id, rhs, None, true)
    }

    /// Pointer declaration with an explicit type instead of the ID's own.
    pub fn declare_pointer_as(
        &mut self,
        id: &Id,
        rhs: Expression,
        ty: ClassRef,
    ) -> Result<Expression, CodegenError> {
        self.declare(id, rhs, Some(ty), true)
    }

    fn declare(
        &mut self,
        id: &Id,
        rhs: Expression,
        ty: Option<ClassRef>,
        pointer: bool,
    ) -> Result<Expression, CodegenError> {
        let ty = ty
            .or_else(|| id.declared_type().cloned())
            .unwrap_or_else(|| ClassRef::new("auto"));
        let Some(name) = id.name().cloned() else {
            return Err(CodegenError::Unresolved(SmolStr::new(ty.path())));
        };
        if self.variables.contains_key(&name) {
            return Err(CodegenError::Redeclared(name));
        }
        debug!("Registered variable {name} of type {ty}");
        self.add(Expression::Assignment(Assignment {
            ty: ty.clone(),
            pointer,
            name: name.clone(),
            rhs: Box::new(rhs),
        }));
        let mut declared = id.clone();
        declared.set_type(ty.clone());
        self.variables.insert(
            name,
            Variable {
                id: declared,
                ty,
                pointer,
            },
        );
        Ok(Expression::var(id.as_str(), pointer))
    }

    /// Variable for `id`, or `Err(id)` naming what the caller must wait for.
    pub fn variable(&self, id: &Id) -> Result<Expression, Id> {
        self.variables
            .get(id.as_str())
            .map(Variable::expr)
            .ok_or_else(|| id.clone())
    }

    /// Declared variable by name.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// First identifier in `ids` that is not declared yet.
    pub fn first_missing<'a>(&self, ids: impl IntoIterator<Item = &'a Id>) -> Option<Id> {
        ids.into_iter()
            .find(|id| !self.variables.contains_key(id.as_str()))
            .cloned()
    }

    /// Bind the `id(...)` references of a lambda to declared variables.
    /// Returns the first missing reference as `Err`.
    pub fn process_lambda(
        &self,
        lambda: &Lambda,
        parameters: Vec<(ClassRef, SmolStr)>,
        return_type: Option<ClassRef>,
    ) -> Result<Expression, Id> {
        let mut segments = Vec::with_capacity(lambda.parts().len());
        for part in lambda.parts() {
            match part {
                LambdaPart::Text(text) => segments.push(LambdaSegment::Text(text.clone())),
                LambdaPart::Id {
                    name,
                    member_access,
                } => {
                    let Some(variable) = self.variables.get(name) else {
                        return Err(Id::reference(Some(name.as_str()), None));
                    };
                    let Expression::Var(var) = variable.expr() else {
                        continue;
                    };
                    segments.push(LambdaSegment::Var {
                        var,
                        member_access: *member_access,
                    });
                }
            }
        }
        Ok(Expression::Lambda(LambdaExpression {
            segments,
            parameters,
            capture: SmolStr::new("="),
            return_type,
        }))
    }

    /// Queue a follow-up task.
    pub fn add_job(&mut self, task: Box<dyn Task>) {
        self.jobs.push(task);
    }

    pub(crate) fn take_jobs(&mut self) -> Vec<Box<dyn Task>> {
        std::mem::take(&mut self.jobs)
    }

    pub(crate) fn watermark(&self) -> Watermark {
        Watermark {
            statements: self.statements.len(),
            globals: self.global_statements.len(),
            variables: self.variables.len(),
            jobs: self.jobs.len(),
        }
    }

    /// Add a `-D` style compiler flag.
    pub fn add_build_flag(&mut self, flag: impl Into<String>) {
        self.build_flags.insert(flag.into());
    }

    /// Add a platformio library dependency.
    pub fn add_library(&mut self, lib: impl Into<String>) {
        self.lib_deps.insert(lib.into());
    }

    /// Add a line to the include block.
    pub fn add_include(&mut self, line: impl Into<String>) {
        let line = line.into();
        if !self.includes.contains(&line) {
            self.includes.push(line);
        }
    }

    /// Statements in emission order.
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Global statements in emission order.
    #[must_use]
    pub fn global_statements(&self) -> &[Statement] {
        &self.global_statements
    }

    /// Declared variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }

    /// Harvested build flags, sorted.
    #[must_use]
    pub fn build_flags(&self) -> &BTreeSet<String> {
        &self.build_flags
    }

    /// Harvested library dependencies, sorted.
    #[must_use]
    pub fn lib_deps(&self) -> &BTreeSet<String> {
        &self.lib_deps
    }

    /// Include lines in insertion order.
    #[must_use]
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// How often each variable is referenced after its declaration.
    #[must_use]
    pub fn usage_counts(&self) -> FxHashMap<SmolStr, usize> {
        let mut counts: FxHashMap<SmolStr, usize> = self
            .variables
            .keys()
            .map(|name| (name.clone(), 0))
            .collect();
        for statement in self.statements.iter().chain(&self.global_statements) {
            match statement {
                Statement::Expression(expr) => {
                    expr.visit_vars(&mut |var| {
                        *counts.entry(var.name.clone()).or_insert(0) += 1;
                    });
                    expr.visit_raw(&mut |text| count_raw_references(text, &mut counts));
                }
                Statement::Raw(text) => count_raw_references(text, &mut counts),
                Statement::Comment(_) => {}
            }
        }
        counts
    }

    /// Rendered `setup()` body: one statement per line, no indentation.
    #[must_use]
    pub fn main_section(&self) -> String {
        let usages = if self.simplify {
            Some(self.usage_counts())
        } else {
            None
        };
        let mut lines = Vec::with_capacity(self.statements.len());
        for statement in &self.statements {
            let rendered = match (statement, &usages) {
                (Statement::Expression(Expression::Assignment(assignment)), Some(usages))
                    if usages.get(&assignment.name).copied().unwrap_or(0) == 0 =>
                {
                    if !assignment.rhs.has_side_effects() {
                        continue;
                    }
                    Statement::Expression((*assignment.rhs).clone()).to_string()
                }
                _ => statement.to_string(),
            };
            lines.push(rendered.trim_end().to_string());
        }
        let mut out = lines.join("\n");
        out.push_str("\n\n");
        out
    }

    /// Rendered global section.
    #[must_use]
    pub fn global_section(&self) -> String {
        let mut out = self
            .global_statements
            .iter()
            .map(|statement| statement.to_string().trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        out
    }
}

/// Count whole-identifier occurrences of declared names in verbatim code.
fn count_raw_references(text: &str, counts: &mut FxHashMap<SmolStr, usize>) {
    for word in text.split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_')) {
        if let Some(count) = counts.get_mut(word) {
            *count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pointer_id(name: &str, ty: &str) -> Id {
        Id::declaration(Some(name), Some(ClassRef::new(ty)))
    }

    #[test]
    fn declarations_render_value_and_pointer_forms() {
        let mut ctx = CodegenContext::new();
        let app = Expression::global("App");
        ctx.declare_variable(
            &pointer_id("make", "Application::MakeGPIOBinarySensor"),
            app.clone().method("make_gpio_binary_sensor", vec!["door".into(), 4.into()]),
        )
        .unwrap();
        ctx.declare_pointer(&pointer_id("client", "mqtt::MQTTClientComponent"), app.method("init_mqtt", vec![]))
            .unwrap();
        assert_eq!(
            ctx.main_section(),
            "Application::MakeGPIOBinarySensor make = App.make_gpio_binary_sensor(\"door\", 4);\n\
             mqtt::MQTTClientComponent *client = App.init_mqtt();\n\n"
        );
    }

    #[test]
    fn redeclaration_is_rejected() {
        let mut ctx = CodegenContext::new();
        let id = pointer_id("x", "int");
        ctx.declare_pointer(&id, 1.into()).unwrap();
        let err = ctx.declare_pointer(&id, 2.into()).unwrap_err();
        assert!(matches!(err, CodegenError::Redeclared(name) if name == "x"));
    }

    #[test]
    fn unresolved_ids_cannot_be_declared() {
        let mut ctx = CodegenContext::new();
        let id = Id::declaration(None, Some(ClassRef::new("Foo")));
        assert!(matches!(
            ctx.declare_pointer(&id, 1.into()),
            Err(CodegenError::Unresolved(_))
        ));
    }

    #[test]
    fn usage_counts_follow_references() {
        let mut ctx = CodegenContext::new();
        let a = ctx
            .declare_pointer(&pointer_id("a", "A"), Expression::global("App").method("make_a", vec![]))
            .unwrap();
        ctx.declare_pointer(&pointer_id("b", "B"), Expression::global("App").method("make_b", vec![]))
            .unwrap();
        ctx.add(a.clone().method("set_x", vec![1.into()]));
        ctx.add(a.method("set_y", vec![2.into()]));
        let counts = ctx.usage_counts();
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 0);
    }

    #[test]
    fn simplify_drops_unused_declarations_but_keeps_calls() {
        let mut ctx = CodegenContext::new().with_simplify(true);
        let app = Expression::global("App");
        ctx.declare_pointer(&pointer_id("unused", "A"), app.clone().method("make_a", vec![]))
            .unwrap();
        ctx.declare_pointer(&pointer_id("literal", "int"), 5.into()).unwrap();
        let used = ctx
            .declare_pointer(&pointer_id("used", "B"), app.method("make_b", vec![]))
            .unwrap();
        ctx.add(used.method("setup", vec![]));
        assert_eq!(
            ctx.main_section(),
            "App.make_a();\nB *used = App.make_b();\nused->setup();\n\n"
        );
    }

    #[test]
    fn simplify_keeps_variables_only_used_in_raw_code() {
        let mut ctx = CodegenContext::new().with_simplify(true);
        let app = Expression::global("App");
        ctx.declare_pointer(&pointer_id("sensor", "S"), app.clone().method("make_s", vec![]))
            .unwrap();
        ctx.declare_pointer(&pointer_id("out", "O"), app.clone().method("make_o", vec![]))
            .unwrap();
        ctx.declare_pointer(&pointer_id("sensor_2", "S"), app.method("make_s2", vec![]))
            .unwrap();
        ctx.add(Statement::Raw("sensor->publish_state(1);".to_string()));
        ctx.add(Expression::global("register").call(vec![Expression::raw("out")]));
        let counts = ctx.usage_counts();
        assert_eq!(counts["sensor"], 1);
        assert_eq!(counts["out"], 1);
        assert_eq!(counts["sensor_2"], 0);
        assert_eq!(
            ctx.main_section(),
            "S *sensor = App.make_s();\nO *out = App.make_o();\nApp.make_s2();\n\
             sensor->publish_state(1);\nregister(out);\n\n"
        );
    }

    #[test]
    fn lambdas_bind_declared_variables() {
        let mut ctx = CodegenContext::new();
        ctx.declare_pointer(&pointer_id("temp", "Sensor"), Expression::global("App").method("make", vec![]))
            .unwrap();
        let lambda = Lambda::new("return id(temp).state > id(limit);");
        let missing = ctx
            .process_lambda(&lambda, vec![], None)
            .unwrap_err();
        assert_eq!(missing.as_str(), "limit");

        ctx.declare_variable(&pointer_id("limit", "float"), 20.5.into()).unwrap();
        let expr = ctx.process_lambda(&lambda, vec![], Some(ClassRef::new("bool"))).unwrap();
        assert_eq!(
            expr.to_string(),
            "[=]() -> bool {\n  return temp->state > limit;\n}"
        );
    }
}
