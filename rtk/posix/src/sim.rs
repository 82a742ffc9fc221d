//! Deterministic step-driven simulator.

use log::{debug, trace};
use rtk_kernel::{
    Kernel, KResult, KernelConfig, KernelError, Priority, SharedKernel, ThreadConfig,
    ThreadHandle,
};

use crate::context::{ThreadAction, ThreadContext};
use crate::port::{SimPort, ThreadBody};

/// Allocate a stack that lives for the rest of the process.
pub fn leak_stack(size: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; size].into_boxed_slice())
}

fn idle_body(_: &mut ThreadContext<'_>) -> ThreadAction {
    ThreadAction::Continue
}

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Body steps between two tick interrupts.
    pub steps_per_tick: u64,
    pub idle_priority: Priority,
    pub idle_stack_size: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            steps_per_tick: 100,
            idle_priority: Priority::IDLE,
            idle_stack_size: 256,
        }
    }
}

impl SimConfig {
    pub fn builder() -> SimConfigBuilder {
        SimConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct SimConfigBuilder {
    config: SimConfig,
}

impl SimConfigBuilder {
    pub fn steps_per_tick(mut self, steps: u64) -> Self {
        self.config.steps_per_tick = steps;
        self
    }

    pub fn idle_priority(mut self, priority: Priority) -> Self {
        self.config.idle_priority = priority;
        self
    }

    pub fn idle_stack_size(mut self, size: usize) -> Self {
        self.config.idle_stack_size = size;
        self
    }

    pub fn build(self) -> SimConfig {
        self.config
    }
}

/// A kernel plus the loop that plays the CPU.
///
/// Each step runs the current thread's body once. After every
/// `steps_per_tick` steps the simulated clock advances and the kernel's tick
/// handler runs. A switch requested during the step is completed before the
/// next one.
pub struct Simulator {
    kernel: SharedKernel<SimPort>,
    config: SimConfig,
    idle: ThreadHandle,
    steps: u64,
    iterations: Vec<u64>,
}

impl Simulator {
    /// Boot a kernel with an idle thread already started.
    pub fn new(kernel_config: KernelConfig, config: SimConfig) -> KResult<Self> {
        if config.steps_per_tick == 0 {
            return Err(KernelError::InvalidConfig("steps_per_tick must be non-zero"));
        }

        let mut kernel = Kernel::new(kernel_config, SimPort::new())?;
        let idle_config = ThreadConfig::new(leak_stack(config.idle_stack_size))
            .with_name("idle")
            .with_priority(config.idle_priority);
        let idle = kernel.init_thread(idle_config, Box::new(idle_body), 0)?;
        kernel.start_thread(idle)?;

        Ok(Self {
            kernel: SharedKernel::new(kernel),
            config,
            idle,
            steps: 0,
            iterations: Vec::new(),
        })
    }

    /// Create and start a thread running `body`.
    pub fn spawn<F>(&mut self, config: ThreadConfig, body: F) -> KResult<ThreadHandle>
    where
        F: FnMut(&mut ThreadContext<'_>) -> ThreadAction + Send + 'static,
    {
        let thread = self.create(config, body)?;
        self.kernel.with(|kernel| kernel.start_thread(thread))?;
        Ok(thread)
    }

    /// Create a thread left in the stopped state.
    pub fn create<F>(&mut self, config: ThreadConfig, body: F) -> KResult<ThreadHandle>
    where
        F: FnMut(&mut ThreadContext<'_>) -> ThreadAction + Send + 'static,
    {
        let body: ThreadBody = Box::new(body);
        self.kernel.with(|kernel| kernel.init_thread(config, body, 0))
    }

    /// Start scheduling. Returns the first thread to run.
    pub fn start(&mut self) -> ThreadHandle {
        let first = self.kernel.with(Kernel::start);
        debug!("simulation started with {}", first);
        first
    }

    /// Run one body step, then the tick and switch that follow it.
    ///
    /// Returns the thread that ran, if any.
    pub fn step(&mut self) -> Option<ThreadHandle> {
        let ran = self.run_current();
        self.steps += 1;

        let tick = self.steps % self.config.steps_per_tick == 0;
        self.kernel.with(|kernel| {
            if tick {
                kernel.port_mut().advance();
                kernel.tick();
            }
            if kernel.port_mut().take_switch() {
                let previous = kernel.current_thread();
                let next = kernel.complete_switch();
                if next != previous {
                    trace!("switched {:?} -> {:?}", previous, next);
                }
            }
        });
        ran
    }

    fn run_current(&mut self) -> Option<ThreadHandle> {
        let iterations = &mut self.iterations;
        self.kernel.with(|kernel| {
            let thread = kernel.current_thread()?;
            let mut body = kernel.port_mut().take_body(thread)?;

            let index = thread.index();
            if iterations.len() <= index {
                iterations.resize(index + 1, 0);
            }
            let iteration = iterations[index];
            iterations[index] += 1;

            let action = body(&mut ThreadContext::new(kernel, thread, iteration));
            kernel.port_mut().restore_body(thread, body);

            match action {
                ThreadAction::Continue | ThreadAction::Blocked => {}
                ThreadAction::Yield => kernel.yield_now(),
                ThreadAction::Exit => kernel.exit_thread(thread),
            }
            Some(thread)
        })
    }

    pub fn run_steps(&mut self, steps: u64) {
        for _ in 0..steps {
            self.step();
        }
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        self.run_steps(ticks * self.config.steps_per_tick);
    }

    /// Run until `done` holds or `max_steps` have passed. Returns whether it held.
    pub fn run_until(&mut self, max_steps: u64, mut done: impl FnMut(&mut Kernel<SimPort>) -> bool) -> bool {
        for _ in 0..max_steps {
            if self.kernel.with(&mut done) {
                return true;
            }
            self.step();
        }
        self.kernel.with(done)
    }

    pub fn with_kernel<R>(&self, f: impl FnOnce(&mut Kernel<SimPort>) -> R) -> R {
        self.kernel.with(f)
    }

    pub fn idle_thread(&self) -> ThreadHandle {
        self.idle
    }

    /// Times `thread`'s body has run.
    pub fn iterations(&self, thread: ThreadHandle) -> u64 {
        self.iterations.get(thread.index()).copied().unwrap_or(0)
    }

    pub fn idle_steps(&self) -> u64 {
        self.iterations(self.idle)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn into_kernel(self) -> Kernel<SimPort> {
        self.kernel.into_inner()
    }
}
