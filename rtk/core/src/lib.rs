#![no_std]
#![forbid(unsafe_code)]

//! # RTK Core
//!
//! Vocabulary types shared by every crate of the RTK real-time kernel:
//! priorities and the ready bitmap, tick arithmetic, thread states and the
//! two error families the kernel distinguishes.
//!
//! Recoverable outcomes (pool exhaustion, semaphore saturation, timeouts) are
//! reported through [`KernelError`]. Misuse that would corrupt scheduler
//! invariants is described by [`Fatal`] and never returned to the caller;
//! the kernel halts through its panic hook instead.

pub mod priorities;
pub mod time;

pub use priorities::*;
pub use time::*;

/// RTK version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type used throughout the kernel crates
pub type KResult<T> = Result<T, KernelError>;

/// Lifecycle state of a kernel thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ThreadState {
    /// Initialised but not competing for the CPU.
    Stopped,
    /// Waiting in a ready list.
    Ready,
    /// The single thread currently executing.
    Running,
    /// Parked in a blocking object's wait list.
    Blocked,
    /// Terminal; removed from every list.
    Exited,
}

impl core::fmt::Display for ThreadState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Blocked => "blocked",
            Self::Exited => "exited",
        };
        f.write_str(name)
    }
}

/// Fixed-capacity kernel object families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resource {
    Thread,
    Semaphore,
    Mutex,
    Timer,
    Queue,
    Message,
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Thread => "thread",
            Self::Semaphore => "semaphore",
            Self::Mutex => "mutex",
            Self::Timer => "timer",
            Self::Queue => "message queue",
            Self::Message => "message",
        };
        f.write_str(name)
    }
}

/// Recoverable errors reported by kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KernelError {
    /// Semaphore already holds its maximum count.
    #[error("semaphore count saturated")]
    Saturated,
    /// A blocking call's deadline passed before it was signalled.
    #[error("blocking call timed out")]
    Timeout,
    /// A fixed-capacity pool has no free slot.
    #[error("{0} pool exhausted")]
    Exhausted(Resource),
    /// Priority outside the configured range.
    #[error("invalid priority {0}")]
    InvalidPriority(u8),
    /// Operation not permitted in the thread's current state.
    #[error("operation not permitted while thread is {0}")]
    InvalidState(ThreadState),
    /// Semaphore initial count larger than its maximum.
    #[error("initial count {initial} exceeds maximum {max}")]
    InvalidCount { initial: u16, max: u16 },
    /// Rejected kernel configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Invariant violations. The kernel halts rather than continuing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fatal {
    #[error("mutex recursion count overflow")]
    RecursionOverflow,
    #[error("no runnable thread")]
    NoRunnableThread,
    #[error("thread exited twice")]
    DoubleExit,
    #[error("mutex released by a thread that does not own it")]
    ReleaseUnowned,
    #[error("mutex released while unclaimed")]
    ReleaseUnclaimed,
    #[error("semaphore re-initialised with blocked waiters")]
    ReinitWithWaiters,
    #[error("blocking call from interrupt context")]
    BlockingInInterrupt,
    #[error("blocking call without a running thread")]
    NoCurrentThread,
    #[error("message is not owned by the caller")]
    MessageNotOwned,
    #[error("stale or out-of-range {0} handle")]
    InvalidHandle(Resource),
}

#[cfg(test)]
mod tests {
    use super::*;

    extern crate std;
    use std::string::ToString;

    #[test]
    fn errors_render_readable_messages() {
        assert_eq!(
            KernelError::Exhausted(Resource::Message).to_string(),
            "message pool exhausted"
        );
        assert_eq!(
            KernelError::InvalidCount { initial: 3, max: 2 }.to_string(),
            "initial count 3 exceeds maximum 2"
        );
        assert_eq!(
            KernelError::InvalidState(ThreadState::Running).to_string(),
            "operation not permitted while thread is running"
        );
        assert_eq!(Fatal::InvalidHandle(Resource::Timer).to_string(), "stale or out-of-range timer handle");
    }
}
