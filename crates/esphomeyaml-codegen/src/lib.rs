//! `esphomeyaml-codegen` - C++ code model and generation scheduling.
//!
//! Validated configuration is turned into a flat list of C++ statements
//! for the firmware's `setup()`:
//!
//! - **Expressions**: typed model of the emitted C++ ([`Expression`])
//! - **Identifiers**: manual and generated variable names ([`IdAllocator`])
//! - **Lambdas**: `!lambda` bodies with `id(...)` substitution
//! - **Scheduler**: runs component tasks so that every variable is declared
//!   before it is used
//!
//! # Example
//!
//! ```ignore
//! use esphomeyaml_codegen::{task, require, CodegenContext, Scheduler, Step};
//!
//! let mut scheduler = Scheduler::new();
//! scheduler.push(task("consumer", vec![], move |ctx| {
//!     let sensor = require!(ctx.variable(&sensor_id));
//!     ctx.add(sensor.method("set_name", vec!["Door".into()]));
//!     Ok(Step::Done)
//! }));
//! let mut ctx = CodegenContext::new();
//! scheduler.run(&mut ctx)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod error;
pub mod expr;
pub mod id;
pub mod lambda;
pub mod scheduler;
pub mod statement;
pub mod types;

pub use context::{CodegenContext, Variable};
pub use error::CodegenError;
pub use expr::{cpp_string_escape, Assignment, Expression, MemberOp, VarRef};
pub use id::{validate_id_name, Id, IdAllocator, IdError};
pub use lambda::{Lambda, LambdaExpression, LambdaPart};
pub use scheduler::{emit_task, task, Halt, Scheduler, Step, Task};
pub use statement::Statement;
pub use types::{builtin, ClassRef, Namespace};
