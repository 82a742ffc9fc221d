//! Kernel configuration.

use core::fmt;

use rtk_core::{Fatal, KernelError, KResult, MAX_PRIORITIES};

/// Capacities and defaults fixed at boot.
///
/// Every arena is sized from these values when the kernel is created; no
/// allocation happens afterwards.
#[derive(Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Number of priority levels, `1..=32`.
    pub priorities: u8,
    pub max_threads: usize,
    pub max_semaphores: usize,
    pub max_mutexes: usize,
    /// User timers; the per-thread and quantum timers are reserved on top.
    pub max_timers: usize,
    pub max_queues: usize,
    pub message_pool_size: usize,
    /// Round-robin slice in ticks for threads that do not set their own.
    pub default_quantum: u16,
    pub tick_period_ms: u32,
    /// Sentinel byte written over a thread's stack at initialisation.
    pub stack_fill: u8,
    /// Called with the reason just before the kernel halts.
    pub panic_hook: Option<fn(&Fatal)>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "RTK",
            priorities: 8,
            max_threads: 16,
            max_semaphores: 16,
            max_mutexes: 8,
            max_timers: 8,
            max_queues: 4,
            message_pool_size: 8,
            default_quantum: 4,
            tick_period_ms: 1,
            stack_fill: 0xFF,
            panic_hook: None,
        }
    }
}

impl fmt::Debug for KernelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelConfig")
            .field("name", &self.name)
            .field("priorities", &self.priorities)
            .field("max_threads", &self.max_threads)
            .field("max_semaphores", &self.max_semaphores)
            .field("max_mutexes", &self.max_mutexes)
            .field("max_timers", &self.max_timers)
            .field("max_queues", &self.max_queues)
            .field("message_pool_size", &self.message_pool_size)
            .field("default_quantum", &self.default_quantum)
            .field("tick_period_ms", &self.tick_period_ms)
            .field("stack_fill", &self.stack_fill)
            .field("panic_hook", &self.panic_hook.is_some())
            .finish()
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }

    /// Reject configurations the kernel cannot boot with.
    pub fn validate(&self) -> KResult<()> {
        if self.priorities == 0 || self.priorities as usize > MAX_PRIORITIES {
            return Err(KernelError::InvalidConfig("priorities must be within 1..=32"));
        }
        if self.max_threads == 0 {
            return Err(KernelError::InvalidConfig("at least one thread slot is required"));
        }
        if self.tick_period_ms == 0 {
            return Err(KernelError::InvalidConfig("tick period must be non-zero"));
        }
        if self.default_quantum == 0 {
            return Err(KernelError::InvalidConfig("default quantum must be non-zero"));
        }
        if self.semaphore_capacity() > rtk_mem::MAX_SLOTS
            || self.timer_capacity() > rtk_mem::MAX_SLOTS
            || self.message_pool_size > rtk_mem::MAX_SLOTS
        {
            return Err(KernelError::InvalidConfig("object counts exceed the handle range"));
        }
        Ok(())
    }

    /// Semaphore slots: user semaphores plus one sleep semaphore per thread
    /// and one gate per message queue.
    pub(crate) fn semaphore_capacity(&self) -> usize {
        self.max_semaphores + self.max_threads + self.max_queues
    }

    /// Timer slots: user timers plus one per thread and the quantum timer.
    pub(crate) fn timer_capacity(&self) -> usize {
        self.max_timers + self.max_threads + 1
    }

    /// Milliseconds to ticks, rounding up.
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        rtk_core::ms_to_ticks(ms, self.tick_period_ms)
    }

    /// Ticks to arm for a timed wait or sleep of `ms` milliseconds.
    ///
    /// The caller sits somewhere inside the current tick period, so the
    /// first tick to arrive is not a full period and is not counted.
    pub fn wait_ticks(&self, ms: u32) -> u32 {
        ms.div_ceil(self.tick_period_ms).saturating_add(1)
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    /// Sets the kernel name.
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the number of priority levels.
    pub fn priorities(mut self, levels: u8) -> Self {
        self.config.priorities = levels;
        self
    }

    pub fn max_threads(mut self, max: usize) -> Self {
        self.config.max_threads = max;
        self
    }

    pub fn max_semaphores(mut self, max: usize) -> Self {
        self.config.max_semaphores = max;
        self
    }

    pub fn max_mutexes(mut self, max: usize) -> Self {
        self.config.max_mutexes = max;
        self
    }

    pub fn max_timers(mut self, max: usize) -> Self {
        self.config.max_timers = max;
        self
    }

    pub fn max_queues(mut self, max: usize) -> Self {
        self.config.max_queues = max;
        self
    }

    /// Sets the number of messages in the global pool.
    pub fn message_pool_size(mut self, size: usize) -> Self {
        self.config.message_pool_size = size;
        self
    }

    /// Sets the default round-robin quantum in ticks.
    pub fn default_quantum(mut self, ticks: u16) -> Self {
        self.config.default_quantum = ticks;
        self
    }

    pub fn tick_period_ms(mut self, period: u32) -> Self {
        self.config.tick_period_ms = period;
        self
    }

    pub fn stack_fill(mut self, fill: u8) -> Self {
        self.config.stack_fill = fill;
        self
    }

    /// Sets the hook invoked before a kernel panic.
    pub fn panic_hook(mut self, hook: fn(&Fatal)) -> Self {
        self.config.panic_hook = Some(hook);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> KernelConfig {
        self.config
    }
}
