//! Suspendable task multiplexer
//!
//! A [`Task`] wraps one resumable execution context together with two
//! value channels: staged arguments for the next resume and the results
//! of the most recent call. A driver repeatedly invokes [`Task::call`],
//! branches on the returned [`CallStatus`], and drains results with
//! [`Task::getres`]. `call` never returns `Err`: every failure is a
//! status code plus a populated result channel, so a driver loop needs no
//! unwinding machinery.
//!
//! The task is strictly single-threaded: exactly one logical caller
//! drives it, nothing here locks, and `call` runs synchronously to the
//! entry point's next yield, return or failure.

use crate::channel::Channel;
use crate::fiber::{EntryPoint, Fiber, FiberPoll, FiberStatus, SpawnError};
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// No execution context; the next call creates one
    Unstarted,
    /// Context created, never resumed
    Idle,
    /// Currently inside a resume (transient)
    Running,
    /// Suspended at a yield point
    Yielded,
    /// Ran to completion
    Done,
    /// Last call failed
    Errored,
}

/// Failure class carried by a [`TaskFailure`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// Allocation failure
    Memory,
    /// Host runtime misbehavior (unexpected context condition)
    Internal,
    /// Entry point could not be loaded/parsed
    Syntax,
    /// Failure raised while the entry point ran
    Runtime,
}

impl FailureClass {
    fn label(self) -> &'static str {
        match self {
            FailureClass::Memory => "out of memory",
            FailureClass::Internal => "internal error",
            FailureClass::Syntax => "syntax error",
            FailureClass::Runtime => "runtime error",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status returned by every [`Task::call`]
///
/// The numeric codes are stable and exposed for caller branching.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CallStatus {
    /// The entry point returned
    Ok = 0,
    /// The entry point suspended
    Suspended = 1,
    /// Allocation failure (context creation or entry point)
    ErrMemory = 2,
    /// Internal failure in the execution machinery
    ErrInternal = 3,
    /// Entry point failed to load
    ErrSyntax = 4,
    /// Entry point raised at runtime
    ErrRuntime = 5,
}

impl CallStatus {
    /// Numeric status code
    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Whether this status is one of the error classes
    #[inline]
    pub const fn is_failure(self) -> bool {
        !matches!(self, CallStatus::Ok | CallStatus::Suspended)
    }
}

impl From<FailureClass> for CallStatus {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Memory => CallStatus::ErrMemory,
            FailureClass::Internal => CallStatus::ErrInternal,
            FailureClass::Syntax => CallStatus::ErrSyntax,
            FailureClass::Runtime => CallStatus::ErrRuntime,
        }
    }
}

/// One frame of a captured stack trace
#[derive(Debug, Clone, PartialEq)]
pub struct TraceFrame {
    /// Function or entry point name
    pub function: String,
    /// Source line, when known
    pub line: Option<u32>,
}

/// A failure raised by an entry point
///
/// Carries the error payload value, the failure class and the captured
/// call frames. The task moves the payload and the rendered trace text
/// into its result channel.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{class}: {payload}")]
pub struct TaskFailure {
    /// Failure class (selects the call status)
    pub class: FailureClass,
    /// The error payload value
    pub payload: Value,
    /// Captured frames, innermost first
    pub frames: Vec<TraceFrame>,
}

impl TaskFailure {
    /// Create a failure with the given class and payload
    pub fn new(class: FailureClass, payload: Value) -> Self {
        Self {
            class,
            payload,
            frames: Vec::new(),
        }
    }

    /// Allocation failure
    pub fn memory(payload: Value) -> Self {
        Self::new(FailureClass::Memory, payload)
    }

    /// Internal failure
    pub fn internal(payload: Value) -> Self {
        Self::new(FailureClass::Internal, payload)
    }

    /// Load/parse failure
    pub fn syntax(payload: Value) -> Self {
        Self::new(FailureClass::Syntax, payload)
    }

    /// Runtime failure
    pub fn runtime(payload: Value) -> Self {
        Self::new(FailureClass::Runtime, payload)
    }

    /// Append a trace frame (innermost first)
    pub fn with_frame(mut self, function: impl Into<String>, line: Option<u32>) -> Self {
        self.frames.push(TraceFrame {
            function: function.into(),
            line,
        });
        self
    }

    /// Render the captured trace as text
    ///
    /// The header line always renders, so the trace is never empty even
    /// when no frames were captured.
    pub fn render_trace(&self) -> String {
        let mut trace = format!("{}: {}", self.class, self.payload);
        for frame in &self.frames {
            match frame.line {
                Some(line) => {
                    trace.push_str(&format!("\n    at {} (line {})", frame.function, line))
                }
                None => trace.push_str(&format!("\n    at {}", frame.function)),
            }
        }
        trace
    }
}

/// A suspendable unit of cooperative work
pub struct Task {
    /// Rebindable entry point; every fresh context spawns from it
    entry: Arc<dyn EntryPoint>,
    /// Live execution context, if any
    fiber: Option<Box<dyn Fiber>>,
    /// Merge call-time arguments into staged ones on the next first resume
    append: bool,
    /// Arguments staged for the next resume
    args: Channel,
    /// Output of the most recent call
    results: Channel,
    /// Reported lifecycle state
    state: TaskState,
}

impl Task {
    /// Create a task bound to `entry`, staging `initial_args`
    ///
    /// The initial execution context is created eagerly; the task starts
    /// in [`TaskState::Idle`]. Context creation failure surfaces here
    /// rather than on the first call.
    pub fn new(
        append: bool,
        entry: Arc<dyn EntryPoint>,
        initial_args: Vec<Value>,
    ) -> Result<Self, SpawnError> {
        let fiber = entry.spawn()?;
        Ok(Self {
            entry,
            fiber: Some(fiber),
            append,
            args: Channel::from_values(initial_args),
            results: Channel::new(),
            state: TaskState::Idle,
        })
    }

    /// Current lifecycle state
    #[inline]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Number of staged pending arguments
    #[inline]
    pub fn pending_args(&self) -> usize {
        self.args.len()
    }

    /// Rebind the entry point and staging policy
    ///
    /// `initial_args` are appended to the staged arguments; the channel
    /// is never cleared here, so callers wanting replacement must drain
    /// it explicitly first. An existing context survives only if it is
    /// currently suspended; anything else is torn down and the task
    /// returns to [`TaskState::Unstarted`].
    pub fn init(
        &mut self,
        append: bool,
        entry: Arc<dyn EntryPoint>,
        initial_args: Vec<Value>,
    ) {
        self.entry = entry;
        self.append = append;
        self.args.push(initial_args);

        let keep = matches!(
            self.fiber.as_ref().map(|f| f.status()),
            Some(FiberStatus::Suspended)
        );
        if !keep {
            self.fiber = None;
            self.state = TaskState::Unstarted;
        }
    }

    /// Stage arguments for the next resume
    pub fn setarg(&mut self, values: impl IntoIterator<Item = Value>) {
        self.args.push(values);
    }

    /// Drain and return the results of the most recent call
    pub fn getres(&mut self) -> Vec<Value> {
        self.results.drain()
    }

    /// Drive the task to its next yield, return or failure
    ///
    /// Clears the result channel, resumes the context (creating one
    /// first when none is live), and reports the outcome as a status.
    /// After this returns, the result channel holds exactly this call's
    /// output: the full yielded/returned value list, or on failure the
    /// error payload followed by the rendered trace text.
    pub fn call(&mut self, args: Vec<Value>) -> CallStatus {
        self.results.set([]);

        let (mut fiber, resume_args) = match self.fiber.take() {
            // context suspended at a yield point: only the call-time
            // arguments flow in
            Some(f) if f.status() == FiberStatus::Suspended => (f, args),

            // context created but never resumed: load the entry point's
            // arguments
            Some(f) if f.status() == FiberStatus::Unstarted => {
                let resume_args = self.entry_args(args);
                (f, resume_args)
            }

            // No context, or a context in any other condition (finished,
            // errored, or otherwise unexpected): drop it and restart from
            // a fresh context. The restart is silent; callers observe a
            // re-entry from the top, never a hard fault.
            // TODO: decide whether an unexpected context condition should
            // surface as ErrInternal instead of restarting.
            _ => match self.entry.spawn() {
                Ok(f) => {
                    let resume_args = self.entry_args(args);
                    (f, resume_args)
                }
                Err(err) => {
                    // staged arguments are kept for a later retry
                    self.results.push([Value::from(err.message)]);
                    self.state = TaskState::Errored;
                    return CallStatus::ErrMemory;
                }
            },
        };

        self.state = TaskState::Running;
        match fiber.resume(resume_args) {
            FiberPoll::Complete(values) => {
                self.results.push(values);
                self.fiber = Some(fiber);
                self.state = TaskState::Done;
                CallStatus::Ok
            }
            FiberPoll::Yield(values) => {
                self.results.push(values);
                self.fiber = Some(fiber);
                self.state = TaskState::Yielded;
                CallStatus::Suspended
            }
            FiberPoll::Fail(failure) => {
                let trace = failure.render_trace();
                self.results.push([failure.payload, Value::from(trace)]);
                self.state = TaskState::Errored;
                failure.class.into()
            }
        }
    }

    /// Assemble the argument list for a first resume
    ///
    /// Drains the staged channel; call-time arguments are merged in only
    /// while the append flag is pending, and the flag is consumed by the
    /// first start that observes it.
    fn entry_args(&mut self, call_args: Vec<Value>) -> Vec<Value> {
        let mut resume_args = self.args.drain();
        if self.append {
            self.append = false;
            resume_args.extend(call_args);
        }
        resume_args
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("state", &self.state)
            .field("append", &self.append)
            .field("pending_args", &self.args.len())
            .field("results", &self.results.len())
            .finish()
    }
}
