//! The kernel context value.

use log::{debug, error, trace, warn};
use rtk_core::{Fatal, KResult, KernelError, Priority, Resource, Tick};
use rtk_mem::Slab;

use crate::config::KernelConfig;
use crate::list::{LinkTable, List};
use crate::message::{Message, MessageQueue};
use crate::mutex::{Mutex, MutexId};
use crate::port::Port;
use crate::quantum::QuantumManager;
use crate::scheduler::Scheduler;
use crate::semaphore::{Semaphore, SemaphoreId};
use crate::thread::{Thread, ThreadHandle};
use crate::timer::{Timer, TimerAction, TimerId};

/// All scheduler, thread, primitive and timer state of one system.
///
/// There is exactly one `Kernel` per system. Every mutating operation takes
/// `&mut self`: holding the exclusive borrow is holding the critical
/// section. Share it between thread and interrupt context through
/// [`SharedKernel`](crate::SharedKernel).
pub struct Kernel<P: Port> {
    pub(crate) config: KernelConfig,
    pub(crate) port: P,
    pub(crate) sched: Scheduler,
    pub(crate) threads: Slab<Thread>,
    pub(crate) thread_links: LinkTable,
    pub(crate) next_thread_id: u32,
    pub(crate) semaphores: Slab<Semaphore>,
    pub(crate) user_semaphores: usize,
    pub(crate) mutexes: Slab<Mutex>,
    pub(crate) timers: Slab<Timer<P>>,
    pub(crate) timer_links: LinkTable,
    pub(crate) timer_list: List,
    pub(crate) user_timers: usize,
    pub(crate) quantum: QuantumManager,
    pub(crate) messages: Slab<Message>,
    pub(crate) message_links: LinkTable,
    pub(crate) queues: Slab<MessageQueue>,
    pub(crate) ticks: Tick,
    pub(crate) in_interrupt: bool,
}

impl<P: Port> Kernel<P> {
    /// Validate `config` and allocate every arena.
    pub fn new(config: KernelConfig, port: P) -> KResult<Self> {
        config.validate()?;

        let timer_capacity = config.timer_capacity();
        let mut timers = Slab::with_capacity(timer_capacity);
        let quantum_timer = timers
            .insert(Timer::new(TimerAction::Quantum, rtk_core::TimerMode::OneShot, 0))
            .map_err(|_| KernelError::Exhausted(Resource::Timer))?;

        debug!(
            "kernel '{}' booting: {} priorities, {} threads, {} timers",
            config.name, config.priorities, config.max_threads, timer_capacity
        );

        Ok(Self {
            port,
            sched: Scheduler::new(),
            threads: Slab::with_capacity(config.max_threads),
            thread_links: LinkTable::with_capacity(config.max_threads),
            next_thread_id: 0,
            semaphores: Slab::with_capacity(config.semaphore_capacity()),
            user_semaphores: 0,
            mutexes: Slab::with_capacity(config.max_mutexes),
            timers,
            timer_links: LinkTable::with_capacity(timer_capacity),
            timer_list: List::new(),
            user_timers: 0,
            quantum: QuantumManager::new(TimerId(quantum_timer)),
            messages: Slab::with_capacity(config.message_pool_size),
            message_links: LinkTable::with_capacity(config.message_pool_size),
            queues: Slab::with_capacity(config.max_queues),
            ticks: Tick::ZERO,
            in_interrupt: false,
            config,
        })
    }

    /// Begin scheduling and return the first thread to run.
    ///
    /// The port resumes that thread's initial frame. Halts if no thread is
    /// ready. Once started, further calls only return the running thread.
    pub fn start(&mut self) -> ThreadHandle {
        if self.sched.started {
            if let Some(current) = self.sched.current {
                warn!("kernel '{}' already started", self.config.name);
                return current;
            }
        }
        let first = self.schedule();
        self.sched.started = true;
        self.sched.current = Some(first);
        self.update_quantum(first);
        debug!("kernel '{}' started with thread {}", self.config.name, first.index());
        first
    }

    pub fn is_started(&self) -> bool {
        self.sched.started
    }

    /// Tick interrupt entry point.
    ///
    /// Advances the timer service, fires expired timers in interrupt context
    /// and requests a switch if the outcome changed the next thread.
    pub fn tick(&mut self) {
        self.ticks.increment();
        trace!("{}", self.ticks);

        self.in_interrupt = true;
        self.process_timers();
        self.in_interrupt = false;

        self.reschedule();
    }

    /// Ticks processed since boot.
    pub fn ticks(&self) -> Tick {
        self.ticks
    }

    /// The port's monotonic time base.
    pub fn now(&self) -> Tick {
        self.port.now()
    }

    /// Whether the caller is running inside the tick interrupt.
    pub fn in_interrupt(&self) -> bool {
        self.in_interrupt
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Halt on an invariant violation.
    pub fn fatal(&self, reason: Fatal) -> ! {
        halt(self.config.panic_hook, reason)
    }

    pub(crate) fn check_priority(&self, priority: Priority) -> KResult<()> {
        if priority.is_within(self.config.priorities) {
            Ok(())
        } else {
            Err(KernelError::InvalidPriority(priority.raw()))
        }
    }

    pub(crate) fn thread(&self, handle: ThreadHandle) -> &Thread {
        match self.threads.lookup(handle.0) {
            Some(thread) => thread,
            None => self.fatal(Fatal::InvalidHandle(Resource::Thread)),
        }
    }

    pub(crate) fn thread_mut(&mut self, handle: ThreadHandle) -> &mut Thread {
        let hook = self.config.panic_hook;
        match self.threads.lookup_mut(handle.0) {
            Some(thread) => thread,
            None => halt(hook, Fatal::InvalidHandle(Resource::Thread)),
        }
    }

    /// Handle of the thread occupying `slot`, as found in a scheduling list.
    pub(crate) fn handle_at(&self, slot: u16) -> ThreadHandle {
        match self.threads.key(slot) {
            Some(key) => ThreadHandle(key),
            None => self.fatal(Fatal::InvalidHandle(Resource::Thread)),
        }
    }

    pub(crate) fn timer_mut(&mut self, index: u16) -> &mut Timer<P> {
        let hook = self.config.panic_hook;
        match self.timers.get_mut(index) {
            Some(timer) => timer,
            None => halt(hook, Fatal::InvalidHandle(Resource::Timer)),
        }
    }

    pub(crate) fn semaphore(&self, id: SemaphoreId) -> &Semaphore {
        match self.semaphores.lookup(id.0) {
            Some(semaphore) => semaphore,
            None => self.fatal(Fatal::InvalidHandle(Resource::Semaphore)),
        }
    }

    pub(crate) fn semaphore_mut(&mut self, id: SemaphoreId) -> &mut Semaphore {
        let hook = self.config.panic_hook;
        match self.semaphores.lookup_mut(id.0) {
            Some(semaphore) => semaphore,
            None => halt(hook, Fatal::InvalidHandle(Resource::Semaphore)),
        }
    }

    pub(crate) fn mutex(&self, id: MutexId) -> &Mutex {
        match self.mutexes.lookup(id.0) {
            Some(mutex) => mutex,
            None => self.fatal(Fatal::InvalidHandle(Resource::Mutex)),
        }
    }

    pub(crate) fn mutex_mut(&mut self, id: MutexId) -> &mut Mutex {
        let hook = self.config.panic_hook;
        match self.mutexes.lookup_mut(id.0) {
            Some(mutex) => mutex,
            None => halt(hook, Fatal::InvalidHandle(Resource::Mutex)),
        }
    }
}

/// Log, run the panic hook and stop.
pub(crate) fn halt(hook: Option<fn(&Fatal)>, reason: Fatal) -> ! {
    error!("kernel panic: {}", reason);
    if let Some(hook) = hook {
        hook(&reason);
    }
    panic!("kernel panic: {reason}");
}
