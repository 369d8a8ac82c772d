//! POSIX collaborators for the strand runtime
//!
//! Platform-specific plumbing a task driver composes with the core
//! primitives: currently the non-blocking byte pipe that entry points
//! poll between yields. Everything touching raw file descriptors lives
//! in this crate so the core stays platform-free.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(unix)]
pub mod pipe;

#[cfg(unix)]
pub use pipe::{pipe, PipeReader, PipeWriter, ReadOutcome, WriteOutcome};
