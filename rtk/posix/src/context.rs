//! What a thread body sees while it runs.
//!
//! A body runs to completion on every step, so a thread that must block
//! partway through keeps its own progress in captured state and repeats the
//! blocking call on its next run:
//!
//! ```ignore
//! let mut claimed = false;
//! move |ctx| {
//!     if !claimed {
//!         wait!(ctx.claim(mutex)).ok();
//!         claimed = true;
//!     }
//!     // ... critical work ...
//!     ctx.release(mutex);
//!     claimed = false;
//!     ThreadAction::Continue
//! }
//! ```

use rtk_kernel::{
    nb, Kernel, KResult, KernelError, MessageHandle, MutexId, QueueId, SemaphoreId, ThreadHandle,
    Tick,
};

use crate::port::SimPort;

/// How a body's step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAction {
    /// Stay ready; run again when next scheduled.
    Continue,
    /// Move to the back of the priority band.
    Yield,
    /// A blocking call returned `WouldBlock`; the kernel has parked the thread.
    Blocked,
    /// Terminate the thread.
    Exit,
}

/// Kernel access for the running thread.
pub struct ThreadContext<'k> {
    kernel: &'k mut Kernel<SimPort>,
    thread: ThreadHandle,
    iteration: u64,
}

impl<'k> ThreadContext<'k> {
    pub(crate) fn new(kernel: &'k mut Kernel<SimPort>, thread: ThreadHandle, iteration: u64) -> Self {
        Self {
            kernel,
            thread,
            iteration,
        }
    }

    pub fn thread(&self) -> ThreadHandle {
        self.thread
    }

    /// How many times this thread's body has run before, starting at zero.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn ticks(&self) -> Tick {
        self.kernel.ticks()
    }

    /// The whole kernel API.
    pub fn kernel(&mut self) -> &mut Kernel<SimPort> {
        self.kernel
    }

    pub fn pend(&mut self, id: SemaphoreId) -> nb::Result<(), KernelError> {
        self.kernel.pend(id)
    }

    pub fn pend_timeout(&mut self, id: SemaphoreId, ms: u32) -> nb::Result<(), KernelError> {
        self.kernel.pend_timeout(id, ms)
    }

    pub fn post(&mut self, id: SemaphoreId) -> KResult<()> {
        self.kernel.post(id)
    }

    pub fn claim(&mut self, id: MutexId) -> nb::Result<(), KernelError> {
        self.kernel.claim(id)
    }

    pub fn claim_timeout(&mut self, id: MutexId, ms: u32) -> nb::Result<(), KernelError> {
        self.kernel.claim_timeout(id, ms)
    }

    pub fn release(&mut self, id: MutexId) {
        self.kernel.release(id);
    }

    pub fn sleep(&mut self, ms: u32) -> nb::Result<(), KernelError> {
        self.kernel.sleep(ms)
    }

    pub fn receive(&mut self, id: QueueId) -> nb::Result<MessageHandle, KernelError> {
        self.kernel.receive(id)
    }

    pub fn receive_timeout(
        &mut self,
        id: QueueId,
        ms: u32,
    ) -> nb::Result<MessageHandle, KernelError> {
        self.kernel.receive_timeout(id, ms)
    }

    /// Draw a message from the pool and fill it in.
    pub fn compose(&mut self, code: u16, data: usize) -> Option<MessageHandle> {
        let handle = self.kernel.pop_message()?;
        let message = self.kernel.message_mut(handle);
        message.set_code(code);
        message.set_data(data);
        Some(handle)
    }

    pub fn send(&mut self, id: QueueId, handle: MessageHandle) {
        self.kernel.send(id, handle);
    }
}
