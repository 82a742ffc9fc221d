//! Recursive mutexes with priority inheritance.
//!
//! While a thread waits on a mutex, the owner runs at no lower than the
//! waiter's effective priority, so a medium-priority thread cannot hold off a
//! high-priority waiter by starving the low-priority owner. A thread's
//! effective priority is always its base priority raised to the most urgent
//! waiter of any mutex it owns; it is recomputed whenever a waiter arrives,
//! times out, is stopped, or the mutex changes hands.

use core::cmp;

use log::debug;
use rtk_core::{Fatal, KResult, KernelError, Priority, Resource};
use rtk_mem::Key;

use crate::blocking::Blocker;
use crate::list::List;
use crate::port::Port;
use crate::thread::ThreadHandle;
use crate::Kernel;

/// Handle naming a mutex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MutexId(pub(crate) Key);

impl MutexId {
    pub(crate) const fn slot(self) -> u16 {
        self.0.index()
    }
}

pub(crate) struct Mutex {
    pub(crate) owner: Option<ThreadHandle>,
    pub(crate) recursion: u8,
    /// Most urgent effective priority among current waiters.
    pub(crate) max_waiter: Priority,
    pub(crate) waiters: List,
}

impl Mutex {
    const fn new() -> Self {
        Self {
            owner: None,
            recursion: 0,
            max_waiter: Priority::IDLE,
            waiters: List::new(),
        }
    }
}

impl<P: Port> Kernel<P> {
    pub fn create_mutex(&mut self) -> KResult<MutexId> {
        match self.mutexes.insert(Mutex::new()) {
            Ok(key) => Ok(MutexId(key)),
            Err(_) => {
                log::warn!("mutex pool exhausted");
                Err(KernelError::Exhausted(Resource::Mutex))
            }
        }
    }

    /// Return a mutex to the unclaimed state. Halts if threads are waiting.
    pub fn init_mutex(&mut self, id: MutexId) {
        if !self.mutex(id).waiters.is_empty() {
            self.fatal(Fatal::ReinitWithWaiters);
        }
        *self.mutex_mut(id) = Mutex::new();
    }

    /// Claim the mutex, blocking while another thread owns it.
    pub fn claim(&mut self, id: MutexId) -> nb::Result<(), KernelError> {
        self.claim_ticks(id, None)
    }

    /// Claim the mutex, giving up with [`KernelError::Timeout`] after `ms`.
    pub fn claim_timeout(&mut self, id: MutexId, ms: u32) -> nb::Result<(), KernelError> {
        let ticks = self.config.wait_ticks(ms);
        self.claim_ticks(id, Some(ticks))
    }

    fn claim_ticks(&mut self, id: MutexId, timeout: Option<u32>) -> nb::Result<(), KernelError> {
        let current = self.blocking_caller();
        let blocker = Blocker::Mutex(id);
        if let Some(outcome) = self.resume_wait(current, blocker) {
            return outcome;
        }
        if self.claim_as(current, id) {
            return Ok(());
        }

        let priority = self.thread(current).priority;
        let mutex = self.mutex_mut(id);
        mutex.max_waiter = cmp::max(mutex.max_waiter, priority);
        if let Some(owner) = mutex.owner {
            if priority > self.thread(owner).priority {
                debug!("{} inherits {} from {}", owner, priority, current);
                self.apply_priority(owner, priority);
            }
        }

        self.block_current(current, blocker, timeout);
        Err(nb::Error::WouldBlock)
    }

    /// Claim the mutex only if that needs no wait.
    pub fn try_claim(&mut self, id: MutexId) -> bool {
        match self.sched.current {
            Some(current) => self.claim_as(current, id),
            None => self.fatal(Fatal::NoCurrentThread),
        }
    }

    fn claim_as(&mut self, thread: ThreadHandle, id: MutexId) -> bool {
        let mutex = self.mutex(id);
        match mutex.owner {
            None => {
                let mutex = self.mutex_mut(id);
                mutex.owner = Some(thread);
                mutex.recursion = 1;
                true
            }
            Some(owner) if owner == thread => {
                if mutex.recursion == u8::MAX {
                    self.fatal(Fatal::RecursionOverflow);
                }
                self.mutex_mut(id).recursion += 1;
                true
            }
            Some(_) => false,
        }
    }

    /// Drop one level of ownership.
    ///
    /// The final release restores the owner's priority and hands the mutex
    /// to the most urgent waiter with a recursion count of one.
    pub fn release(&mut self, id: MutexId) {
        let Some(current) = self.sched.current else {
            self.fatal(Fatal::NoCurrentThread);
        };
        match self.mutex(id).owner {
            None => self.fatal(Fatal::ReleaseUnclaimed),
            Some(owner) if owner != current => self.fatal(Fatal::ReleaseUnowned),
            Some(_) => {}
        }

        let mutex = self.mutex_mut(id);
        mutex.recursion -= 1;
        if mutex.recursion > 0 {
            return;
        }
        self.hand_off(id, current);

        let restored = self.inherited_priority(current);
        if restored != self.thread(current).priority {
            debug!("{} restored to {}", current, restored);
            self.apply_priority(current, restored);
        }
        self.reschedule();
    }

    /// Pass an owned mutex to its most urgent waiter, or leave it unclaimed.
    fn hand_off(&mut self, id: MutexId, from: ThreadHandle) {
        let mutex = self.mutex_mut(id);
        mutex.owner = None;
        mutex.recursion = 0;

        if let Some(waiter) = self.wake_waiter(Blocker::Mutex(id)) {
            let mutex = self.mutex_mut(id);
            mutex.owner = Some(waiter);
            mutex.recursion = 1;
            debug!("mutex {} handed from {} to {}", id.slot(), from, waiter);
        }
        self.refresh_mutex(id);
    }

    /// Give up every mutex `thread` owns, whatever its recursion count.
    ///
    /// Used when a thread leaves the run queues for good or until restarted;
    /// the caller has already unlinked it and reschedules afterwards.
    pub(crate) fn surrender_mutexes(&mut self, thread: ThreadHandle) {
        loop {
            let owned = self
                .mutexes
                .iter()
                .find(|(_, mutex)| mutex.owner == Some(thread))
                .map(|(slot, _)| slot);
            let Some(id) = owned.and_then(|slot| self.mutexes.key(slot)).map(MutexId) else {
                break;
            };
            debug!("{} gives up mutex {}", thread, id.slot());
            self.hand_off(id, thread);
        }

        let thread = self.thread_mut(thread);
        thread.priority = thread.base_priority;
    }

    /// Recompute the waiter high-water mark and the owner's effective priority.
    pub(crate) fn refresh_mutex(&mut self, id: MutexId) {
        let top = self
            .top_waiter_priority(Blocker::Mutex(id))
            .unwrap_or(Priority::IDLE);
        let mutex = self.mutex_mut(id);
        mutex.max_waiter = top;
        if let Some(owner) = mutex.owner {
            let effective = self.inherited_priority(owner);
            self.apply_priority(owner, effective);
        }
    }

    /// Base priority raised to the most urgent waiter of any owned mutex.
    pub(crate) fn inherited_priority(&self, thread: ThreadHandle) -> Priority {
        let base = self.thread(thread).base_priority;
        self.mutexes
            .iter()
            .filter(|(_, mutex)| mutex.owner == Some(thread))
            .filter_map(|(_, mutex)| mutex.waiters.head())
            .filter_map(|head| self.threads.get(head).map(|waiter| waiter.priority))
            .fold(base, cmp::max)
    }

    pub fn mutex_owner(&self, id: MutexId) -> Option<ThreadHandle> {
        self.mutex(id).owner
    }

    pub fn is_mutex_claimed(&self, id: MutexId) -> bool {
        self.mutex(id).owner.is_some()
    }

    /// Outstanding claims held by the owner.
    pub fn mutex_recursion(&self, id: MutexId) -> u8 {
        self.mutex(id).recursion
    }

    pub fn mutex_waiters(&self, id: MutexId) -> usize {
        self.mutex(id).waiters.len()
    }

    /// Most urgent priority among the mutex's waiters.
    pub fn mutex_max_waiter_priority(&self, id: MutexId) -> Priority {
        self.mutex(id).max_waiter
    }
}
