//! Architecture port boundary.

use rtk_core::Tick;

use crate::thread::ThreadHandle;

/// The three capabilities the kernel needs from a target architecture.
///
/// A port is chosen statically through the `P: Port` parameter of
/// [`Kernel`](crate::Kernel). The kernel never swaps registers itself; it
/// only updates its notion of the next thread and asks the port for a
/// switch. The port finishes the job at its next safe point (typically on
/// interrupt exit) by calling [`Kernel::complete_switch`](crate::Kernel::complete_switch).
pub trait Port {
    /// The architecture's notion of a thread entry point.
    type Entry;

    /// Build the initial saved-context image for `thread` inside `stack`.
    ///
    /// `stack` has already been filled with the configured sentinel byte.
    /// Returns the number of bytes the initial frame occupies at the top of
    /// the region.
    fn init_stack(
        &mut self,
        thread: ThreadHandle,
        stack: &mut [u8],
        entry: Self::Entry,
        arg: usize,
    ) -> usize;

    /// Request a context switch at the next safe point.
    fn trigger_switch(&mut self);

    /// Monotonic tick reported by the target's time base.
    fn now(&self) -> Tick;
}
