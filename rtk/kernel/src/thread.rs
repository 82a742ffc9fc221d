//! Thread control blocks and the thread lifecycle.
//!
//! ```text
//!            init             start
//!   (slot) ───────▶ Stopped ─────────▶ Ready ◀──────▶ Running
//!                     ▲  ▲               │  ▲    switch    │
//!                     │  └──── stop ─────┤  │              │ pend/claim/
//!                     │                  │  └── signal ── Blocked ◀┘ receive/sleep
//!                     │                  ▼     timeout
//!                     └──── reinit ── Exited ◀── exit (from any live state)
//! ```

use core::fmt;

use heapless::String;
use log::debug;
use rtk_core::{Fatal, KResult, KernelError, Priority, Resource, ThreadState, TimerMode};
use rtk_mem::Key;

use crate::blocking::{Blocker, WaitStatus};
use crate::port::Port;
use crate::semaphore::{Semaphore, SemaphoreId};
use crate::timer::{Timer, TimerAction, TimerId};
use crate::Kernel;

/// Longest thread name kept by the kernel.
pub const THREAD_NAME_LEN: usize = 16;

/// Handle naming a thread.
///
/// Carries the generation of its slot: once the thread is reclaimed the
/// handle no longer resolves, even after the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ThreadHandle(pub(crate) Key);

impl ThreadHandle {
    /// Slot number, stable for the thread's lifetime. Ports key per-thread
    /// state by it.
    pub const fn index(self) -> usize {
        self.0.index() as usize
    }

    pub(crate) const fn slot(self) -> u16 {
        self.0.index()
    }
}

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0.index())
    }
}

/// Parameters for a new thread.
pub struct ThreadConfig {
    name: Option<&'static str>,
    priority: Priority,
    stack: &'static mut [u8],
    quantum: Option<u16>,
}

impl ThreadConfig {
    /// A thread that runs on `stack` at the idle priority.
    pub fn new(stack: &'static mut [u8]) -> Self {
        Self {
            name: None,
            priority: Priority::IDLE,
            stack,
            quantum: None,
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Round-robin slice in ticks; the kernel default applies otherwise.
    pub fn with_quantum(mut self, ticks: u16) -> Self {
        self.quantum = Some(ticks);
        self
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }
}

/// Which scheduling list holds a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Membership {
    Stopped,
    Ready(Priority),
    Blocked(Blocker),
    Exited,
}

pub(crate) struct Thread {
    pub(crate) id: u32,
    name: Option<String<THREAD_NAME_LEN>>,
    stack: &'static mut [u8],
    frame_size: usize,
    arg: usize,
    pub(crate) base_priority: Priority,
    pub(crate) priority: Priority,
    pub(crate) membership: Membership,
    pub(crate) quantum: u16,
    pub(crate) wait: WaitStatus,
    pub(crate) timed_out: bool,
    started: bool,
    pub(crate) timer: TimerId,
    pub(crate) sleep: SemaphoreId,
}

impl Thread {
    fn name_from(name: Option<&'static str>) -> Option<String<THREAD_NAME_LEN>> {
        name.map(|name| {
            let mut owned = String::new();
            for ch in name.chars() {
                if owned.push(ch).is_err() {
                    break;
                }
            }
            owned
        })
    }
}

impl<P: Port> Kernel<P> {
    /// Create a thread on the stopped list.
    ///
    /// The stack is filled with the configured sentinel and the port builds
    /// the initial frame for `entry(arg)`.
    pub fn init_thread(
        &mut self,
        config: ThreadConfig,
        entry: P::Entry,
        arg: usize,
    ) -> KResult<ThreadHandle> {
        self.check_thread_config(&config)?;
        if self.threads.is_full() {
            log::warn!("thread pool exhausted");
            return Err(KernelError::Exhausted(Resource::Thread));
        }

        let sleep = self
            .semaphores
            .insert(Semaphore::binary())
            .map_err(|_| KernelError::Exhausted(Resource::Semaphore))?;
        let timer = match self.timers.insert(Timer::new(TimerAction::Idle, TimerMode::OneShot, 0)) {
            Ok(timer) => timer,
            Err(_) => {
                self.semaphores.remove(sleep.index());
                return Err(KernelError::Exhausted(Resource::Timer));
            }
        };

        let thread = Thread {
            id: 0,
            name: None,
            stack: config.stack,
            frame_size: 0,
            arg,
            base_priority: config.priority,
            priority: config.priority,
            membership: Membership::Exited,
            quantum: 0,
            wait: WaitStatus::Idle,
            timed_out: false,
            started: false,
            timer: TimerId(timer),
            sleep: SemaphoreId(sleep),
        };
        let handle = match self.threads.insert(thread) {
            Ok(key) => ThreadHandle(key),
            Err(_) => {
                self.timers.remove(timer.index());
                self.semaphores.remove(sleep.index());
                return Err(KernelError::Exhausted(Resource::Thread));
            }
        };

        self.prepare(handle, config.name, config.priority, config.quantum, entry, arg);
        Ok(handle)
    }

    /// Reuse the slot of an exited or never-started thread.
    pub fn reinit_thread(
        &mut self,
        handle: ThreadHandle,
        config: ThreadConfig,
        entry: P::Entry,
        arg: usize,
    ) -> KResult<()> {
        self.check_thread_config(&config)?;
        self.release_slot(handle)?;

        let thread = self.thread(handle);
        let (timer, sleep) = (thread.timer, thread.sleep);
        self.disarm_timer(timer);
        self.semaphore_mut(sleep).reset(0, 1);

        let thread = self.thread_mut(handle);
        thread.stack = config.stack;
        thread.arg = arg;
        thread.base_priority = config.priority;
        thread.priority = config.priority;
        thread.wait = WaitStatus::Idle;
        thread.timed_out = false;
        thread.started = false;

        self.prepare(handle, config.name, config.priority, config.quantum, entry, arg);
        Ok(())
    }

    /// Free the slot of an exited or never-started thread and hand back its stack.
    pub fn reclaim_thread(&mut self, handle: ThreadHandle) -> KResult<&'static mut [u8]> {
        self.release_slot(handle)?;

        let Some(thread) = self.threads.remove(handle.slot()) else {
            self.fatal(Fatal::InvalidHandle(Resource::Thread));
        };
        self.disarm_timer(thread.timer);
        self.timers.remove(thread.timer.slot());
        self.semaphores.remove(thread.sleep.slot());
        debug!("{} reclaimed", handle);
        Ok(thread.stack)
    }

    /// Take an exited or never-started thread off every list.
    fn release_slot(&mut self, handle: ThreadHandle) -> KResult<()> {
        let thread = self.thread(handle);
        let (membership, started) = (thread.membership, thread.started);
        match membership {
            Membership::Exited => Ok(()),
            Membership::Stopped if !started => {
                self.sched.stopped.remove(&mut self.thread_links, handle.slot());
                self.thread_mut(handle).membership = Membership::Exited;
                Ok(())
            }
            _ => Err(KernelError::InvalidState(self.thread_state(handle))),
        }
    }

    fn check_thread_config(&self, config: &ThreadConfig) -> KResult<()> {
        self.check_priority(config.priority)?;
        if config.stack.is_empty() {
            return Err(KernelError::InvalidConfig("thread stack is empty"));
        }
        if config.quantum == Some(0) {
            return Err(KernelError::InvalidConfig("thread quantum must be non-zero"));
        }
        Ok(())
    }

    fn prepare(
        &mut self,
        handle: ThreadHandle,
        name: Option<&'static str>,
        priority: Priority,
        quantum: Option<u16>,
        entry: P::Entry,
        arg: usize,
    ) {
        let id = self.next_thread_id;
        self.next_thread_id = self.next_thread_id.wrapping_add(1);
        let quantum = quantum.unwrap_or(self.config.default_quantum);
        let fill = self.config.stack_fill;
        let hook = self.config.panic_hook;

        let Self {
            threads,
            port,
            sched,
            thread_links,
            ..
        } = self;
        let Some(thread) = threads.lookup_mut(handle.0) else {
            crate::kernel::halt(hook, Fatal::InvalidHandle(Resource::Thread));
        };

        thread.id = id;
        thread.name = Thread::name_from(name);
        thread.quantum = quantum;
        thread.stack.fill(fill);
        thread.frame_size = port.init_stack(handle, &mut thread.stack[..], entry, arg);
        thread.membership = Membership::Stopped;
        sched.stopped.push_back(thread_links, handle.slot());

        debug!(
            "{} initialised: id={} priority={} stack={}B",
            handle,
            id,
            priority.raw(),
            thread.stack.len()
        );
    }

    /// Stopped → Ready. Reschedules if the kernel is running.
    pub fn start_thread(&mut self, handle: ThreadHandle) -> KResult<()> {
        let thread = self.thread_mut(handle);
        if thread.membership != Membership::Stopped {
            return Err(KernelError::InvalidState(self.thread_state(handle)));
        }
        thread.started = true;
        let priority = thread.priority;
        thread.membership = Membership::Ready(priority);

        self.sched.stopped.remove(&mut self.thread_links, handle.slot());
        self.sched.add(&mut self.thread_links, handle, priority);
        debug!("{} started at {}", handle, priority);

        self.reschedule();
        Ok(())
    }

    /// {Ready, Running, Blocked} → Stopped, abandoning any wait in progress.
    pub fn stop_thread(&mut self, handle: ThreadHandle) -> KResult<()> {
        let membership = self.thread(handle).membership;
        match membership {
            Membership::Stopped => return Ok(()),
            Membership::Exited => return Err(KernelError::InvalidState(ThreadState::Exited)),
            _ => {}
        }

        self.detach(handle);
        self.thread_mut(handle).membership = Membership::Stopped;
        self.sched.stopped.push_back(&mut self.thread_links, handle.slot());
        debug!("{} stopped", handle);

        self.reschedule();
        Ok(())
    }

    /// Terminate a thread. Exiting an already exited thread halts the kernel.
    pub fn exit_thread(&mut self, handle: ThreadHandle) {
        let membership = self.thread(handle).membership;
        match membership {
            Membership::Exited => self.fatal(Fatal::DoubleExit),
            Membership::Stopped => self.sched.stopped.remove(&mut self.thread_links, handle.slot()),
            _ => self.detach(handle),
        }
        self.thread_mut(handle).membership = Membership::Exited;
        debug!("{} exited", handle);

        self.reschedule();
    }

    /// Remove a live thread from its ready or wait list, cancel its timer and
    /// release the mutexes it holds.
    ///
    /// This includes a mutex handed over by a release the thread has not yet
    /// observed.
    fn detach(&mut self, handle: ThreadHandle) {
        let thread = self.thread(handle);
        let (timer, membership) = (thread.timer, thread.membership);
        match membership {
            Membership::Ready(priority) => self.sched.remove(&mut self.thread_links, handle, priority),
            Membership::Blocked(_) => self.cancel_wait(handle),
            Membership::Stopped | Membership::Exited => {}
        }
        self.disarm_timer(timer);
        self.thread_mut(handle).wait = WaitStatus::Idle;
        self.surrender_mutexes(handle);
    }

    /// Block the running thread for at least `ms` milliseconds.
    pub fn sleep(&mut self, ms: u32) -> nb::Result<(), KernelError> {
        let ticks = self.config.wait_ticks(ms);
        self.sleep_ticks(ticks)
    }

    /// Block the running thread for `ticks` ticks.
    ///
    /// Arms the thread's private timer to post its private semaphore, then
    /// pends on that semaphore.
    pub fn sleep_ticks(&mut self, ticks: u32) -> nb::Result<(), KernelError> {
        let current = self.blocking_caller();
        let thread = self.thread(current);
        let (timer, sleep) = (thread.timer, thread.sleep);

        let resuming = match thread.wait {
            WaitStatus::Waiting(_) => true,
            WaitStatus::Completed(blocker, _) => blocker == Blocker::Semaphore(sleep),
            WaitStatus::Idle => false,
        };
        if !resuming {
            self.timer_mut(timer.slot()).action = TimerAction::PostSemaphore(sleep);
            self.arm_timer(timer, ticks);
        }
        self.pend_ticks(sleep, None)
    }

    /// Set the base priority. An inherited boost above it is kept.
    pub fn set_priority(&mut self, handle: ThreadHandle, priority: Priority) -> KResult<()> {
        self.check_priority(priority)?;
        if self.thread(handle).membership == Membership::Exited {
            return Err(KernelError::InvalidState(ThreadState::Exited));
        }

        self.thread_mut(handle).base_priority = priority;
        let effective = self.inherited_priority(handle);
        self.apply_priority(handle, effective);
        self.reschedule();
        Ok(())
    }

    /// Move a thread to `priority`, repositioning it in whichever list holds it.
    pub(crate) fn apply_priority(&mut self, handle: ThreadHandle, priority: Priority) {
        let thread = self.thread_mut(handle);
        if thread.priority == priority {
            return;
        }
        let membership = thread.membership;
        thread.priority = priority;

        match membership {
            Membership::Ready(old) => {
                self.sched.remove(&mut self.thread_links, handle, old);
                self.thread_mut(handle).membership = Membership::Ready(priority);
                self.sched.add(&mut self.thread_links, handle, priority);
            }
            Membership::Blocked(blocker) => {
                self.remove_waiter(handle, blocker);
                self.enqueue_waiter(handle, blocker);
            }
            Membership::Stopped | Membership::Exited => {}
        }
    }

    /// Rotate the running thread to the tail of its priority band.
    pub fn yield_now(&mut self) {
        let Some(current) = self.sched.current else {
            return;
        };
        let membership = self.thread(current).membership;
        if let Membership::Ready(priority) = membership {
            self.sched.requeue(&mut self.thread_links, current, priority);
            self.reschedule();
        }
    }

    pub fn thread_state(&self, handle: ThreadHandle) -> ThreadState {
        match self.thread(handle).membership {
            Membership::Stopped => ThreadState::Stopped,
            Membership::Ready(_) if self.sched.current == Some(handle) => ThreadState::Running,
            Membership::Ready(_) => ThreadState::Ready,
            Membership::Blocked(_) => ThreadState::Blocked,
            Membership::Exited => ThreadState::Exited,
        }
    }

    /// Unused stack bytes: the run of sentinel bytes at the low end.
    pub fn stack_slack(&self, handle: ThreadHandle) -> usize {
        let fill = self.config.stack_fill;
        self.thread(handle)
            .stack
            .iter()
            .take_while(|&&byte| byte == fill)
            .count()
    }

    pub fn stack_size(&self, handle: ThreadHandle) -> usize {
        self.thread(handle).stack.len()
    }

    /// Bytes of the initial frame the port wrote.
    pub fn initial_frame_size(&self, handle: ThreadHandle) -> usize {
        self.thread(handle).frame_size
    }

    /// Monotonic identity assigned at (re)initialisation.
    pub fn thread_id(&self, handle: ThreadHandle) -> u32 {
        self.thread(handle).id
    }

    pub fn thread_name(&self, handle: ThreadHandle) -> Option<&str> {
        self.thread(handle).name.as_deref()
    }

    pub fn thread_arg(&self, handle: ThreadHandle) -> usize {
        self.thread(handle).arg
    }

    /// Base priority.
    pub fn thread_priority(&self, handle: ThreadHandle) -> Priority {
        self.thread(handle).base_priority
    }

    /// Effective priority, including any inherited boost.
    pub fn thread_current_priority(&self, handle: ThreadHandle) -> Priority {
        self.thread(handle).priority
    }

    pub fn set_quantum(&mut self, handle: ThreadHandle, ticks: u16) -> KResult<()> {
        if ticks == 0 {
            return Err(KernelError::InvalidConfig("thread quantum must be non-zero"));
        }
        self.thread_mut(handle).quantum = ticks;
        Ok(())
    }

    pub fn quantum(&self, handle: ThreadHandle) -> u16 {
        self.thread(handle).quantum
    }

    /// Whether the thread's last timed wait ended by expiry.
    pub fn thread_timed_out(&self, handle: ThreadHandle) -> bool {
        self.thread(handle).timed_out
    }
}
