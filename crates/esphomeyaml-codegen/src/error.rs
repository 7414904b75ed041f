//! Code generation errors.

use smol_str::SmolStr;
use thiserror::Error;

use crate::id::IdError;

/// Fatal error while turning validated configuration into statements.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CodegenError {
    /// No pending task declares the requested identifier.
    #[error("Couldn't find ID '{id}' requested by {task}: no component declares it")]
    MissingProducer { id: SmolStr, task: SmolStr },
    /// Several pending tasks claim the same identifier.
    #[error("ID '{id}' is declared by more than one component: {tasks}")]
    AmbiguousProducer { id: SmolStr, tasks: String },
    /// Waiting for the identifier would never finish.
    #[error("Circular dependency detected while waiting for ID '{id}': {chain}")]
    Cycle { id: SmolStr, chain: String },
    /// A task declared a variable that already exists.
    #[error("ID {0} is already registered")]
    Redeclared(SmolStr),
    /// A declaration was emitted for an identifier that never got a name.
    #[error("ID of type {0} was never resolved")]
    Unresolved(SmolStr),
    /// A task emitted code and then suspended; resuming it would emit twice.
    #[error("{task} emitted code before waiting for ID '{id}'")]
    PartialStep { task: SmolStr, id: SmolStr },
    /// A task keeps waiting for a variable that is already declared.
    #[error("{task} is waiting for ID '{id}' which is already declared")]
    Stalled { task: SmolStr, id: SmolStr },
    /// Invalid identifier.
    #[error(transparent)]
    Id(#[from] IdError),
    /// Component specific failure.
    #[error("{0}")]
    Other(String),
}
