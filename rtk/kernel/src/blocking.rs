//! Shared wait-list behaviour of semaphores, mutexes and message queues.
//!
//! Wait lists are ordered by effective priority, FIFO among equals. A thread
//! in a wait list is `Blocked` and in no ready list. Both ways out of a wait,
//! a signal and a timeout, run under the same `&mut Kernel`: whichever comes
//! first removes the thread from the wait list and cancels the other, so the
//! loser finds nothing to do.
//!
//! Blocking calls are resumable. The first call either completes or parks the
//! caller and returns [`nb::Error::WouldBlock`]; once the caller runs again
//! it repeats the call and receives the recorded outcome.

use log::trace;
use rtk_core::{Fatal, KernelError, Priority, Resource};

use crate::list::List;
use crate::mutex::MutexId;
use crate::port::Port;
use crate::semaphore::SemaphoreId;
use crate::thread::{Membership, ThreadHandle};
use crate::timer::TimerAction;
use crate::Kernel;

/// The object a blocked thread waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum Blocker {
    Semaphore(SemaphoreId),
    Mutex(MutexId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitOutcome {
    Signalled,
    TimedOut,
}

/// Progress of a thread's current blocking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitStatus {
    Idle,
    Waiting(Blocker),
    Completed(Blocker, WaitOutcome),
}

impl<P: Port> Kernel<P> {
    /// The running thread, for a call that may block.
    pub(crate) fn blocking_caller(&self) -> ThreadHandle {
        if self.in_interrupt {
            self.fatal(Fatal::BlockingInInterrupt);
        }
        match self.sched.current {
            Some(current) => current,
            None => self.fatal(Fatal::NoCurrentThread),
        }
    }

    /// Consume the outcome of an earlier call on `blocker`, if there is one.
    ///
    /// `None` means the caller should start a fresh attempt.
    pub(crate) fn resume_wait(
        &mut self,
        thread: ThreadHandle,
        blocker: Blocker,
    ) -> Option<nb::Result<(), KernelError>> {
        let thread = self.thread_mut(thread);
        match thread.wait {
            WaitStatus::Waiting(_) => Some(Err(nb::Error::WouldBlock)),
            WaitStatus::Completed(done, outcome) if done == blocker => {
                thread.wait = WaitStatus::Idle;
                Some(match outcome {
                    WaitOutcome::Signalled => Ok(()),
                    WaitOutcome::TimedOut => Err(nb::Error::Other(KernelError::Timeout)),
                })
            }
            _ => {
                thread.wait = WaitStatus::Idle;
                None
            }
        }
    }

    /// Park the running thread on `blocker`, optionally arming its timeout.
    pub(crate) fn block_current(
        &mut self,
        thread: ThreadHandle,
        blocker: Blocker,
        timeout: Option<u32>,
    ) {
        let record = self.thread_mut(thread);
        let membership = record.membership;
        let timer = record.timer;
        record.wait = WaitStatus::Waiting(blocker);
        record.timed_out = false;

        if let Membership::Ready(priority) = membership {
            self.sched.remove(&mut self.thread_links, thread, priority);
        }
        self.enqueue_waiter(thread, blocker);

        if let Some(ticks) = timeout {
            self.timer_mut(timer.slot()).action = TimerAction::WaitTimeout(thread);
            self.arm_timer(timer, ticks);
        }
        trace!("{} blocked on {:?} (timeout {:?})", thread, blocker, timeout);

        self.reschedule();
    }

    /// Release the most urgent waiter on `blocker`. The caller reschedules.
    pub(crate) fn wake_waiter(&mut self, blocker: Blocker) -> Option<ThreadHandle> {
        let head = self.wait_list(blocker).head()?;
        let thread = self.handle_at(head);
        self.remove_waiter(thread, blocker);

        let record = self.thread_mut(thread);
        let timer = record.timer;
        let priority = record.priority;
        record.wait = WaitStatus::Completed(blocker, WaitOutcome::Signalled);
        record.membership = Membership::Ready(priority);

        self.disarm_timer(timer);
        self.sched.add(&mut self.thread_links, thread, priority);
        trace!("{} woken by {:?}", thread, blocker);
        Some(thread)
    }

    /// Timer expiry for a timed wait. A no-op if the wait already ended.
    pub(crate) fn expire_wait(&mut self, thread: ThreadHandle) {
        let record = self.thread(thread);
        let (wait, membership, priority) = (record.wait, record.membership, record.priority);
        let WaitStatus::Waiting(blocker) = wait else {
            return;
        };
        if membership != Membership::Blocked(blocker) {
            return;
        }

        self.remove_waiter(thread, blocker);
        let record = self.thread_mut(thread);
        record.wait = WaitStatus::Completed(blocker, WaitOutcome::TimedOut);
        record.timed_out = true;
        record.membership = Membership::Ready(priority);
        self.sched.add(&mut self.thread_links, thread, priority);
        trace!("{} timed out on {:?}", thread, blocker);

        if let Blocker::Mutex(mutex) = blocker {
            self.refresh_mutex(mutex);
        }
    }

    /// Abandon a wait without an outcome. The caller sets the new membership.
    pub(crate) fn cancel_wait(&mut self, thread: ThreadHandle) {
        let membership = self.thread(thread).membership;
        let Membership::Blocked(blocker) = membership else {
            return;
        };
        self.remove_waiter(thread, blocker);
        self.thread_mut(thread).wait = WaitStatus::Idle;

        if let Blocker::Mutex(mutex) = blocker {
            self.refresh_mutex(mutex);
        }
    }

    /// Insert by effective priority, behind waiters of equal priority.
    pub(crate) fn enqueue_waiter(&mut self, thread: ThreadHandle, blocker: Blocker) {
        let priority = self.thread(thread).priority;
        self.thread_mut(thread).membership = Membership::Blocked(blocker);
        self.validate_blocker(blocker);

        let Self {
            threads,
            thread_links,
            semaphores,
            mutexes,
            ..
        } = self;
        let list = match blocker {
            Blocker::Semaphore(id) => semaphores.lookup_mut(id.0).map(|s| &mut s.waiters),
            Blocker::Mutex(id) => mutexes.lookup_mut(id.0).map(|m| &mut m.waiters),
        };
        if let Some(list) = list {
            let before = list.iter(thread_links).find(|&index| {
                threads
                    .get(index)
                    .map_or(true, |waiter| waiter.priority < priority)
            });
            list.insert_before(thread_links, before, thread.slot());
        }
    }

    pub(crate) fn remove_waiter(&mut self, thread: ThreadHandle, blocker: Blocker) {
        self.validate_blocker(blocker);
        let Self {
            thread_links,
            semaphores,
            mutexes,
            ..
        } = self;
        let list = match blocker {
            Blocker::Semaphore(id) => semaphores.lookup_mut(id.0).map(|s| &mut s.waiters),
            Blocker::Mutex(id) => mutexes.lookup_mut(id.0).map(|m| &mut m.waiters),
        };
        if let Some(list) = list {
            list.remove(thread_links, thread.slot());
        }
    }

    /// Effective priority of the most urgent waiter, if any.
    pub(crate) fn top_waiter_priority(&self, blocker: Blocker) -> Option<Priority> {
        let head = self.wait_list(blocker).head()?;
        self.threads.get(head).map(|waiter| waiter.priority)
    }

    pub(crate) fn wait_list(&self, blocker: Blocker) -> &List {
        match blocker {
            Blocker::Semaphore(id) => &self.semaphore(id).waiters,
            Blocker::Mutex(id) => &self.mutex(id).waiters,
        }
    }

    fn validate_blocker(&self, blocker: Blocker) {
        let present = match blocker {
            Blocker::Semaphore(id) => self.semaphores.is_live(id.0),
            Blocker::Mutex(id) => self.mutexes.is_live(id.0),
        };
        if !present {
            let resource = match blocker {
                Blocker::Semaphore(_) => Resource::Semaphore,
                Blocker::Mutex(_) => Resource::Mutex,
            };
            self.fatal(Fatal::InvalidHandle(resource));
        }
    }
}
