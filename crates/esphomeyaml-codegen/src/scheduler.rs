//! Dependency-driven ordering of code generation tasks.
//!
//! Every component entry becomes a [`Task`]. Tasks run in queue order; when
//! one needs a variable that is not declared yet it returns
//! [`Step::Need`] and the scheduler runs the single pending task that
//! declares it before retrying. A task is restarted from scratch after a
//! suspension, so it must look up everything it needs before it emits any
//! code. Emitting and then suspending is reported as
//! [`CodegenError::PartialStep`].

use std::collections::VecDeque;

use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::context::CodegenContext;
use crate::error::CodegenError;
use crate::id::Id;

/// Outcome of running a task once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The task finished.
    Done,
    /// The task needs this variable; nothing was emitted.
    Need(Id),
}

/// Unit of code generation.
pub trait Task {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Variables this task declares.
    fn declares(&self) -> Vec<SmolStr>;

    /// Run the task. May be called again after returning [`Step::Need`].
    fn step(&mut self, ctx: &mut CodegenContext) -> Result<Step, CodegenError>;
}

/// Task backed by a closure.
pub struct FnTask<F> {
    name: SmolStr,
    declares: Vec<SmolStr>,
    run: F,
}

impl<F> Task for FnTask<F>
where
    F: FnMut(&mut CodegenContext) -> Result<Step, CodegenError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn declares(&self) -> Vec<SmolStr> {
        self.declares.clone()
    }

    fn step(&mut self, ctx: &mut CodegenContext) -> Result<Step, CodegenError> {
        (self.run)(ctx)
    }
}

/// Box a closure as a task.
pub fn task<F>(name: impl Into<SmolStr>, declares: Vec<SmolStr>, run: F) -> Box<dyn Task>
where
    F: FnMut(&mut CodegenContext) -> Result<Step, CodegenError> + 'static,
{
    Box::new(FnTask {
        name: name.into(),
        declares,
        run,
    })
}

/// Early exit from an emitting function: either a variable is missing or
/// generation failed.
#[derive(Debug)]
pub enum Halt {
    /// Suspend until this variable is declared.
    Need(Id),
    /// Abort the run.
    Error(CodegenError),
}

impl From<Id> for Halt {
    fn from(id: Id) -> Self {
        Halt::Need(id)
    }
}

impl From<CodegenError> for Halt {
    fn from(err: CodegenError) -> Self {
        Halt::Error(err)
    }
}

impl Halt {
    /// Convert the outcome of an emitting function into a scheduler step.
    pub fn into_step(result: Result<(), Halt>) -> Result<Step, CodegenError> {
        match result {
            Ok(()) => Ok(Step::Done),
            Err(Halt::Need(id)) => Ok(Step::Need(id)),
            Err(Halt::Error(err)) => Err(err),
        }
    }
}

/// Box an emitting closure as a task. Inside the closure `?` suspends on a
/// missing variable and aborts on errors.
pub fn emit_task<F>(name: impl Into<SmolStr>, declares: Vec<SmolStr>, mut run: F) -> Box<dyn Task>
where
    F: FnMut(&mut CodegenContext) -> Result<(), Halt> + 'static,
{
    task(name, declares, move |ctx| Halt::into_step(run(ctx)))
}

/// Unwrap a lookup or suspend the current task until the missing variable
/// is declared.
///
/// ```ignore
/// let sensor = require!(ctx.variable(&config.sensor_id));
/// ```
#[macro_export]
macro_rules! require {
    ($lookup:expr) => {
        match $lookup {
            Ok(value) => value,
            Err(id) => return Ok($crate::scheduler::Step::Need(id)),
        }
    };
}

/// FIFO of pending tasks plus the stack of suspended ones.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Option<Box<dyn Task>>>,
    queue: VecDeque<usize>,
}

impl Scheduler {
    /// Empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to the queue.
    pub fn push(&mut self, task: Box<dyn Task>) {
        self.tasks.push(Some(task));
        self.queue.push_back(self.tasks.len() - 1);
    }

    /// Number of tasks not yet finished.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Run until every task, including jobs spawned along the way, is done.
    pub fn run(&mut self, ctx: &mut CodegenContext) -> Result<(), CodegenError> {
        while let Some(first) = self.queue.pop_front() {
            let mut stack = vec![first];
            while let Some(&top) = stack.last() {
                let Some(task) = self.tasks[top].as_mut() else {
                    stack.pop();
                    continue;
                };
                trace!("Running {}", task.name());
                let before = ctx.watermark();
                let step = task.step(ctx)?;
                match step {
                    Step::Done => {
                        stack.pop();
                        self.tasks[top] = None;
                        self.enqueue_jobs(ctx);
                    }
                    Step::Need(id) => {
                        let name = SmolStr::new(task.name());
                        if ctx.watermark() != before {
                            return Err(CodegenError::PartialStep {
                                task: name,
                                id: SmolStr::new(id.as_str()),
                            });
                        }
                        let producer = self.producer_for(&stack, &name, &id, ctx)?;
                        debug!("{name} waits for {id}, running {} first", self.task_name(producer));
                        self.queue.retain(|&idx| idx != producer);
                        stack.push(producer);
                    }
                }
            }
        }
        Ok(())
    }

    fn enqueue_jobs(&mut self, ctx: &mut CodegenContext) {
        for job in ctx.take_jobs() {
            self.push(job);
        }
    }

    fn task_name(&self, idx: usize) -> &str {
        self.tasks[idx].as_ref().map_or("", |task| task.name())
    }

    fn declares(&self, idx: usize, id: &Id) -> bool {
        self.tasks[idx]
            .as_ref()
            .is_some_and(|task| task.declares().iter().any(|name| name == id.as_str()))
    }

    fn producer_for(
        &self,
        stack: &[usize],
        waiting: &SmolStr,
        id: &Id,
        ctx: &CodegenContext,
    ) -> Result<usize, CodegenError> {
        let id_name = SmolStr::new(id.as_str());
        if ctx.lookup(id.as_str()).is_some() {
            return Err(CodegenError::Stalled {
                task: waiting.clone(),
                id: id_name,
            });
        }
        if let Some(pos) = stack.iter().position(|&idx| self.declares(idx, id)) {
            let chain = stack[pos..]
                .iter()
                .map(|&idx| self.task_name(idx))
                .chain(std::iter::once(self.task_name(stack[pos])))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(CodegenError::Cycle { id: id_name, chain });
        }
        let producers: Vec<usize> = self
            .queue
            .iter()
            .copied()
            .filter(|&idx| self.declares(idx, id))
            .collect();
        match producers.as_slice() {
            [] => Err(CodegenError::MissingProducer {
                id: id_name,
                task: waiting.clone(),
            }),
            [single] => Ok(*single),
            many => Err(CodegenError::AmbiguousProducer {
                id: id_name,
                tasks: many
                    .iter()
                    .map(|&idx| self.task_name(idx))
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }
}
