//! Resumable execution contexts
//!
//! The runtime has no native stack switching: a suspendable execution
//! context is an explicit resumable-state object. A [`Fiber`] is one live
//! context: it reports its lifecycle status and is driven forward with
//! [`Fiber::resume`]. An [`EntryPoint`] is the rebindable callable a task
//! holds on to; each [`EntryPoint::spawn`] produces a fresh fiber running
//! that entry from the top.
//!
//! Most entry points are written as a step closure over captured state;
//! [`StepEntry`] adapts a factory of such closures into an `EntryPoint`.

use crate::task::TaskFailure;
use crate::value::Value;

/// Lifecycle status of a fiber
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FiberStatus {
    /// Created, never resumed
    Unstarted,
    /// Suspended at a yield point, resumable
    Suspended,
    /// Ran to completion
    Done,
    /// Raised a failure
    Errored,
}

/// Outcome of one resume step
#[derive(Debug)]
pub enum FiberPoll {
    /// The entry point returned; carries its result list
    Complete(Vec<Value>),
    /// The entry point suspended; carries the yielded value list
    Yield(Vec<Value>),
    /// The entry point raised a failure
    Fail(TaskFailure),
}

/// A live, resumable execution context
pub trait Fiber {
    /// Current lifecycle status
    fn status(&self) -> FiberStatus;

    /// Drive the context to its next yield, return or failure
    ///
    /// `args` become the entry point's arguments on the first resume and
    /// the value of the suspension expression on later ones.
    fn resume(&mut self, args: Vec<Value>) -> FiberPoll;
}

/// Error spawning a fresh execution context
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to spawn execution context: {message}")]
pub struct SpawnError {
    /// What went wrong while allocating or initializing the context
    pub message: String,
}

/// A rebindable entry point: a factory of fresh execution contexts
pub trait EntryPoint {
    /// Create a new fiber that will run this entry from the top
    fn spawn(&self) -> Result<Box<dyn Fiber>, SpawnError>;
}

/// One step of a step-closure entry point
#[derive(Debug)]
pub enum Step {
    /// Suspend, yielding these values
    Yield(Vec<Value>),
    /// Finish, returning these values
    Return(Vec<Value>),
    /// Raise a failure
    Fail(TaskFailure),
}

/// Entry point built from a closure factory
///
/// The factory runs once per spawn and returns the step closure that
/// becomes the fiber's body. State that must survive across yields lives
/// in the step closure's captures.
pub struct StepEntry<F> {
    factory: F,
}

impl<F, G> StepEntry<F>
where
    F: Fn() -> G,
    G: FnMut(Vec<Value>) -> Step + 'static,
{
    /// Wrap a factory of step closures
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F, G> EntryPoint for StepEntry<F>
where
    F: Fn() -> G,
    G: FnMut(Vec<Value>) -> Step + 'static,
{
    fn spawn(&self) -> Result<Box<dyn Fiber>, SpawnError> {
        Ok(Box::new(StepFiber {
            step: (self.factory)(),
            status: FiberStatus::Unstarted,
        }))
    }
}

/// Fiber driving a step closure
struct StepFiber<G> {
    step: G,
    status: FiberStatus,
}

impl<G> Fiber for StepFiber<G>
where
    G: FnMut(Vec<Value>) -> Step,
{
    fn status(&self) -> FiberStatus {
        self.status
    }

    fn resume(&mut self, args: Vec<Value>) -> FiberPoll {
        match self.status {
            FiberStatus::Unstarted | FiberStatus::Suspended => {}
            // resuming a finished context is a caller bug, not a panic
            FiberStatus::Done | FiberStatus::Errored => {
                self.status = FiberStatus::Errored;
                return FiberPoll::Fail(TaskFailure::internal(Value::from(
                    "cannot resume a finished execution context",
                )));
            }
        }

        match (self.step)(args) {
            Step::Yield(values) => {
                self.status = FiberStatus::Suspended;
                FiberPoll::Yield(values)
            }
            Step::Return(values) => {
                self.status = FiberStatus::Done;
                FiberPoll::Complete(values)
            }
            Step::Fail(failure) => {
                self.status = FiberStatus::Errored;
                FiberPoll::Fail(failure)
            }
        }
    }
}
