//! Hosted port: thread bodies instead of register frames.

use rtk_kernel::{Port, ThreadHandle, Tick};

use crate::context::{ThreadAction, ThreadContext};

/// Code run each time a simulated thread is scheduled.
pub type ThreadBody = Box<dyn FnMut(&mut ThreadContext<'_>) -> ThreadAction + Send>;

/// Bytes of the simulated initial frame: the entry argument plus a marker.
pub const FRAME_SIZE: usize = 16;

const FRAME_MARKER: u64 = 0x5254_4B5F_4652_4D45;

/// Port that keeps each thread's body and records switch requests.
#[derive(Default)]
pub struct SimPort {
    bodies: Vec<Option<ThreadBody>>,
    switch_pending: bool,
    switch_requests: u64,
    now: Tick,
}

impl SimPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch requests raised since boot.
    pub fn switch_requests(&self) -> u64 {
        self.switch_requests
    }

    pub fn is_switch_pending(&self) -> bool {
        self.switch_pending
    }

    pub(crate) fn take_switch(&mut self) -> bool {
        core::mem::take(&mut self.switch_pending)
    }

    pub(crate) fn advance(&mut self) {
        self.now.increment();
    }

    pub(crate) fn take_body(&mut self, thread: ThreadHandle) -> Option<ThreadBody> {
        self.bodies.get_mut(thread.index()).and_then(Option::take)
    }

    pub(crate) fn restore_body(&mut self, thread: ThreadHandle, body: ThreadBody) {
        if let Some(slot) = self.bodies.get_mut(thread.index()) {
            // A body that re-initialised its own thread keeps the new one.
            if slot.is_none() {
                *slot = Some(body);
            }
        }
    }
}

impl Port for SimPort {
    type Entry = ThreadBody;

    fn init_stack(
        &mut self,
        thread: ThreadHandle,
        stack: &mut [u8],
        entry: Self::Entry,
        arg: usize,
    ) -> usize {
        let index = thread.index();
        if self.bodies.len() <= index {
            self.bodies.resize_with(index + 1, || None);
        }
        self.bodies[index] = Some(entry);

        let frame = FRAME_SIZE.min(stack.len());
        let top = stack.len() - frame;
        let mut image = [0u8; FRAME_SIZE];
        image[..8].copy_from_slice(&(arg as u64).to_le_bytes());
        image[8..].copy_from_slice(&FRAME_MARKER.to_le_bytes());
        stack[top..].copy_from_slice(&image[..frame]);
        frame
    }

    fn trigger_switch(&mut self) {
        self.switch_pending = true;
        self.switch_requests += 1;
    }

    fn now(&self) -> Tick {
        self.now
    }
}
