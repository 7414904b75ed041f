//! Shared helpers for scheduler tests.
#![allow(dead_code, unused_imports)]

pub use esphomeyaml_codegen::{
    require, task, ClassRef, CodegenContext, CodegenError, Expression, Id, Scheduler, Step,
};

pub fn decl(name: &str, ty: &str) -> Id {
    Id::declaration(Some(name), Some(ClassRef::new(ty)))
}

pub fn reference(name: &str) -> Id {
    Id::reference(Some(name), None)
}

/// Task that declares `name` as `T *name = App.make_<name>();`.
pub fn producer(name: &'static str, ty: &'static str) -> Box<dyn esphomeyaml_codegen::Task> {
    task(name, vec![name.into()], move |ctx| {
        let rhs = Expression::global("App").method(&format!("make_{name}"), vec![]);
        ctx.declare_pointer(&decl(name, ty), rhs)?;
        Ok(Step::Done)
    })
}

/// Task that declares `name` after it has looked up `needs`.
pub fn dependent_producer(
    name: &'static str,
    needs: &'static str,
) -> Box<dyn esphomeyaml_codegen::Task> {
    task(name, vec![name.into()], move |ctx| {
        let parent = require!(ctx.variable(&reference(needs)));
        ctx.declare_pointer(&decl(name, "Child"), parent.method("make_child", vec![]))?;
        Ok(Step::Done)
    })
}

pub fn run(tasks: Vec<Box<dyn esphomeyaml_codegen::Task>>) -> Result<CodegenContext, CodegenError> {
    let mut scheduler = Scheduler::new();
    for t in tasks {
        scheduler.push(t);
    }
    let mut ctx = CodegenContext::new();
    scheduler.run(&mut ctx)?;
    Ok(ctx)
}
