//! Monotonic clock helpers
//!
//! Deadline arithmetic for drivers that bound how long they keep
//! resuming a task: timestamps are nanoseconds on the monotonic clock,
//! measured from a process-wide epoch created at first use. Nothing here
//! preempts anything; a deadline only means something to a caller that
//! checks it between calls.

use once_cell::sync::Lazy;
use std::thread;
use std::time::{Duration, Instant};

/// Monotonic reference epoch, created once at first use
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Current monotonic time in nanoseconds since the process epoch
pub fn now_nanos() -> u64 {
    Instant::now().duration_since(*EPOCH).as_nanos() as u64
}

/// Non-negative milliseconds remaining until `deadline_nanos`
///
/// Reports zero once the deadline has passed.
pub fn remaining_millis(deadline_nanos: u64) -> u64 {
    deadline_nanos.saturating_sub(now_nanos()) / 1_000_000
}

/// Sleep the calling thread until `deadline_nanos`
///
/// Returns immediately when the deadline has already passed. Interrupted
/// sleeps are retried internally by the standard library, so there is no
/// error to report.
pub fn sleep_until(deadline_nanos: u64) {
    let remaining = deadline_nanos.saturating_sub(now_nanos());
    if remaining > 0 {
        thread::sleep(Duration::from_nanos(remaining));
    }
}

/// Elapsed-time measurement against the monotonic clock
#[derive(Debug, Copy, Clone)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start measuring now
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Reset the start point to now
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// Nanoseconds elapsed since the start point
    pub fn elapsed_nanos(&self) -> u64 {
        self.started.elapsed().as_nanos() as u64
    }
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::start()
    }
}
