//! Strand cooperative task core
//!
//! This crate provides the concurrency primitives for a single-threaded
//! cooperative task runtime:
//! - Suspendable tasks with a resume/yield/return/failure protocol
//! - Ordered value channels for argument/result marshalling
//! - A dense slot allocator for small integer task identifiers
//! - A binary value codec and monotonic clock helpers for drivers
//!
//! Everything is strictly single-threaded: one logical caller drives a
//! task at a time, so no type here locks or is `Send`-obligated. A
//! higher-level loop composes these pieces; this crate only supplies the
//! unit of suspension and its bookkeeping.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod clock;
pub mod codec;
pub mod fiber;
pub mod slot;
pub mod task;
pub mod value;

pub use channel::Channel;
pub use clock::Stopwatch;
pub use codec::CodecError;
pub use fiber::{EntryPoint, Fiber, FiberPoll, FiberStatus, SpawnError, Step, StepEntry};
pub use slot::{SlotError, SlotSet};
pub use task::{CallStatus, FailureClass, Task, TaskFailure, TaskState, TraceFrame};
pub use value::{Table, Value, ValueError};
