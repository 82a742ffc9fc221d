//! # RTK POSIX Port
//!
//! Runs the RTK kernel on a hosted system for testing and simulation.
//!
//! Threads here are not separate OS threads. Each kernel thread owns a body
//! closure that the [`Simulator`] calls once per step while that thread is
//! current. A pending context switch is completed between steps, and every
//! `steps_per_tick` steps the simulated tick interrupt fires. The result is a
//! fully deterministic schedule that exercises the real kernel: priority
//! preemption, time slicing, timeouts and priority inheritance all behave as
//! on a target, only at step granularity.
//!
//! ```
//! use rtk_posix::{wait, SimConfig, Simulator, ThreadAction};
//! use rtk_kernel::{KernelConfig, Priority, ThreadConfig};
//!
//! let mut sim = Simulator::new(KernelConfig::default(), SimConfig::default()).unwrap();
//! let sem = sim.with_kernel(|k| k.create_semaphore(0, 1)).unwrap();
//!
//! let config = ThreadConfig::new(rtk_posix::leak_stack(512)).with_priority(Priority::new(2));
//! sim.spawn(config, move |ctx| {
//!     wait!(ctx.pend(sem)).ok();
//!     ThreadAction::Exit
//! })
//! .unwrap();
//!
//! sim.start();
//! sim.run_steps(10);
//! sim.with_kernel(|k| k.post(sem)).unwrap();
//! sim.run_steps(10);
//! ```

pub mod context;
pub mod port;
pub mod sim;
pub mod time;

pub use context::{ThreadAction, ThreadContext};
pub use port::{SimPort, ThreadBody};
pub use sim::{leak_stack, SimConfig, SimConfigBuilder, Simulator};
pub use time::{ClockTick, Ticker};

#[doc(hidden)]
pub use rtk_kernel::nb;

/// Evaluate a blocking kernel call inside a thread body.
///
/// On `WouldBlock` the thread is parked: the body returns
/// [`ThreadAction::Blocked`] and must repeat the same call when it runs
/// again. Otherwise evaluates to the call's `Result`.
#[macro_export]
macro_rules! wait {
    ($call:expr) => {
        match $call {
            Err($crate::nb::Error::WouldBlock) => return $crate::ThreadAction::Blocked,
            Err($crate::nb::Error::Other(err)) => Err(err),
            Ok(value) => Ok(value),
        }
    };
}
