#![no_std]
#![forbid(unsafe_code)]

//! # RTK Kernel
//!
//! The concurrency core of a small preemptive real-time kernel: a
//! priority-preemptive scheduler with round-robin slicing inside a priority
//! band, the thread lifecycle, counting semaphores, recursive mutexes with
//! priority inheritance, a delta-list timer service, and message queues over a
//! fixed global message pool.
//!
//! All state lives in one [`Kernel`] value created at boot. Objects are named
//! by small copyable handles into arenas sized by [`KernelConfig`]; nothing is
//! allocated after [`Kernel::new`]. Context-switch mechanics belong to a
//! [`Port`].
//!
//! Blocking operations return [`nb::Result`]. `WouldBlock` means the calling
//! thread is now blocked: it must yield to the port and repeat the same call
//! when it next runs, which then reports the outcome.
//!
//! Misuse that would corrupt scheduler state (double exit, releasing a mutex
//! the caller does not own, recursion overflow, an empty run queue) is not
//! returned as an error. The kernel logs it, runs the configured panic hook
//! and panics.

extern crate alloc;

#[cfg(test)]
extern crate std;

mod blocking;
mod config;
mod kernel;
mod list;
mod message;
mod mutex;
mod port;
mod quantum;
mod scheduler;
mod semaphore;
mod shared;
mod thread;
mod timer;

#[cfg(test)]
mod tests;

pub use config::{KernelConfig, KernelConfigBuilder};
pub use kernel::Kernel;
pub use message::{Message, MessageHandle, QueueId};
pub use mutex::MutexId;
pub use port::Port;
pub use scheduler::SchedStatus;
pub use semaphore::SemaphoreId;
pub use shared::SharedKernel;
pub use thread::{ThreadConfig, ThreadHandle, THREAD_NAME_LEN};
pub use timer::{TimerCallback, TimerId};

pub use nb;
pub use rtk_core::{
    ms_to_ticks, priority, Fatal, KResult, KernelError, Priority, Resource, ThreadState, Tick,
    TimerMode,
};
pub use rtk_mem::PoolStats;
