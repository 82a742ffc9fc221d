//! Round-robin time slicing.
//!
//! A single one-shot timer runs for whichever thread was last selected,
//! provided it shares its priority band with another ready thread. On expiry
//! that thread moves from the head to the tail of its band.

use log::trace;

use crate::port::Port;
use crate::thread::{Membership, ThreadHandle};
use crate::timer::TimerId;
use crate::Kernel;

pub(crate) struct QuantumManager {
    timer: TimerId,
    owner: Option<ThreadHandle>,
    active: bool,
}

impl QuantumManager {
    pub(crate) const fn new(timer: TimerId) -> Self {
        Self {
            timer,
            owner: None,
            active: false,
        }
    }
}

impl<P: Port> Kernel<P> {
    /// Arm or cancel the slice for the thread selected to run.
    pub(crate) fn update_quantum(&mut self, next: ThreadHandle) {
        let thread = self.thread(next);
        let (membership, ticks) = (thread.membership, thread.quantum);
        let shared = match membership {
            Membership::Ready(priority) => self.sched.band_len(priority) > 1,
            _ => false,
        };

        if !shared {
            self.cancel_quantum();
            return;
        }
        if self.quantum.active && self.quantum.owner == Some(next) {
            return;
        }

        self.quantum.owner = Some(next);
        self.quantum.active = true;
        self.arm_timer(self.quantum.timer, u32::from(ticks));
    }

    fn cancel_quantum(&mut self) {
        if self.quantum.active {
            self.disarm_timer(self.quantum.timer);
        }
        self.quantum.active = false;
        self.quantum.owner = None;
    }

    pub(crate) fn expire_quantum(&mut self) {
        self.quantum.active = false;
        let Some(owner) = self.quantum.owner else {
            return;
        };
        let membership = self.threads.lookup(owner.0).map(|thread| thread.membership);
        let Some(Membership::Ready(priority)) = membership else {
            return;
        };
        if self.sched.head_of(priority) == Some(owner.slot()) {
            trace!("quantum expired for {}", owner);
            self.sched.requeue(&mut self.thread_links, owner, priority);
        }
    }

    /// Whether a time slice is currently running, and for which thread.
    pub fn quantum_owner(&self) -> Option<ThreadHandle> {
        if self.quantum.active {
            self.quantum.owner
        } else {
            None
        }
    }
}
