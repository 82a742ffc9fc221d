//! Priority-preemptive scheduler.
//!
//! One ready list per priority plus a stopped list. The running thread stays
//! at the head of its ready list; `next` always names the head of the most
//! urgent non-empty list and is recomputed on every list change. Selecting a
//! thread never switches context by itself: when `next` differs from the
//! running thread the port is asked to switch, and the port later calls
//! [`Kernel::complete_switch`].

use log::trace;
use rtk_core::{Fatal, Priority, ReadySet, MAX_PRIORITIES};

use crate::list::{LinkTable, List};
use crate::port::Port;
use crate::thread::ThreadHandle;
use crate::Kernel;

/// Scheduler lock status for nested locking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SchedStatus {
    Unlocked,
    Locked,
}

impl SchedStatus {
    pub fn is_locked(self) -> bool {
        matches!(self, Self::Locked)
    }
}

pub(crate) struct Scheduler {
    ready: [List; MAX_PRIORITIES],
    ready_set: ReadySet,
    pub(crate) stopped: List,
    pub(crate) current: Option<ThreadHandle>,
    /// Slot of the most urgent ready thread.
    next: Option<u16>,
    locked: bool,
    pub(crate) started: bool,
    switches: u64,
}

impl Scheduler {
    pub(crate) const fn new() -> Self {
        Self {
            ready: [List::new(); MAX_PRIORITIES],
            ready_set: ReadySet::EMPTY,
            stopped: List::new(),
            current: None,
            next: None,
            locked: false,
            started: false,
            switches: 0,
        }
    }

    /// Append to the tail of the ready list for `priority`.
    pub(crate) fn add(&mut self, links: &mut LinkTable, thread: ThreadHandle, priority: Priority) {
        self.ready[priority.index()].push_back(links, thread.slot());
        self.ready_set.insert(priority);
        self.recompute();
    }

    pub(crate) fn remove(&mut self, links: &mut LinkTable, thread: ThreadHandle, priority: Priority) {
        let list = &mut self.ready[priority.index()];
        list.remove(links, thread.slot());
        if list.is_empty() {
            self.ready_set.remove(priority);
        }
        self.recompute();
    }

    /// Move `thread` to the tail of its band.
    pub(crate) fn requeue(&mut self, links: &mut LinkTable, thread: ThreadHandle, priority: Priority) {
        let list = &mut self.ready[priority.index()];
        list.remove(links, thread.slot());
        list.push_back(links, thread.slot());
        self.recompute();
    }

    pub(crate) fn head_of(&self, priority: Priority) -> Option<u16> {
        self.ready[priority.index()].head()
    }

    pub(crate) fn band_len(&self, priority: Priority) -> usize {
        self.ready[priority.index()].len()
    }

    pub(crate) fn next(&self) -> Option<u16> {
        self.next
    }

    fn recompute(&mut self) {
        self.next = self.ready_set.highest().and_then(|priority| self.head_of(priority));
    }
}

impl<P: Port> Kernel<P> {
    /// Select the most urgent ready thread without switching to it.
    ///
    /// Halts if nothing is ready; a system always keeps an idle thread.
    pub fn schedule(&mut self) -> ThreadHandle {
        self.sched.recompute();
        match self.sched.next {
            Some(slot) => self.handle_at(slot),
            None => self.fatal(Fatal::NoRunnableThread),
        }
    }

    /// Reselect and ask the port to switch if the choice changed.
    pub(crate) fn reschedule(&mut self) {
        if !self.sched.started {
            return;
        }

        let next = self.schedule();
        self.update_quantum(next);

        if Some(next) != self.sched.current && !self.sched.locked {
            trace!(
                "switch requested: {:?} -> {}",
                self.sched.current.map(ThreadHandle::index),
                next.index()
            );
            self.port.trigger_switch();
        }
    }

    /// Called by the port at its safe point: make the selected thread current.
    pub fn complete_switch(&mut self) -> Option<ThreadHandle> {
        let next = self.sched.next.map(|slot| self.handle_at(slot));
        if next.is_some() && next != self.sched.current && !self.sched.locked {
            self.sched.current = next;
            self.sched.switches += 1;
        }
        self.sched.current
    }

    /// The thread that owns the CPU.
    pub fn current_thread(&self) -> Option<ThreadHandle> {
        self.sched.current
    }

    /// The thread the scheduler has selected to run next.
    pub fn next_thread(&self) -> Option<ThreadHandle> {
        self.sched.next().map(|slot| self.handle_at(slot))
    }

    /// Number of completed context switches.
    pub fn context_switches(&self) -> u64 {
        self.sched.switches
    }

    /// Suppress switch requests until the matching unlock.
    pub fn lock_scheduler(&mut self) -> SchedStatus {
        let previous = if self.sched.locked {
            SchedStatus::Locked
        } else {
            SchedStatus::Unlocked
        };
        self.sched.locked = true;
        previous
    }

    /// Restore the status returned by [`lock_scheduler`](Self::lock_scheduler).
    pub fn unlock_scheduler(&mut self, previous: SchedStatus) {
        self.sched.locked = previous.is_locked();
        if !self.sched.locked {
            self.reschedule();
        }
    }

    pub fn is_scheduler_locked(&self) -> bool {
        self.sched.locked
    }
}
