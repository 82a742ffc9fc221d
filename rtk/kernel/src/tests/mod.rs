//! Scenario tests driven through a recording port.
//!
//! No code actually runs on the test threads. A test plays each thread's part
//! by calling kernel operations while that thread is current, then completes
//! the requested switch by hand the way a port would on interrupt exit.

mod scheduler;
mod timer;

use std::boxed::Box;
use std::vec;
use std::vec::Vec;

use crate::{Kernel, KernelConfig, Port, Priority, ThreadConfig, ThreadHandle, Tick};

/// Bytes of fake register frame written at the top of each stack.
pub(crate) const FRAME_SIZE: usize = 32;

pub(crate) const STACK_SIZE: usize = 256;

#[derive(Default)]
pub(crate) struct TestPort {
    pub(crate) switch_requests: usize,
    pub(crate) frames: Vec<(ThreadHandle, usize)>,
    pub(crate) now: Tick,
}

impl Port for TestPort {
    type Entry = fn(usize);

    fn init_stack(
        &mut self,
        thread: ThreadHandle,
        stack: &mut [u8],
        _entry: Self::Entry,
        arg: usize,
    ) -> usize {
        let frame = FRAME_SIZE.min(stack.len());
        let top = stack.len() - frame;
        stack[top..].fill(0);
        self.frames.push((thread, arg));
        frame
    }

    fn trigger_switch(&mut self) {
        self.switch_requests += 1;
    }

    fn now(&self) -> Tick {
        self.now
    }
}

pub(crate) fn entry(_arg: usize) {}

pub(crate) fn stack(size: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; size].into_boxed_slice())
}

pub(crate) fn kernel() -> Kernel<TestPort> {
    kernel_with(KernelConfig::default())
}

pub(crate) fn kernel_with(config: KernelConfig) -> Kernel<TestPort> {
    match Kernel::new(config, TestPort::default()) {
        Ok(kernel) => kernel,
        Err(err) => panic!("kernel rejected test config: {err}"),
    }
}

/// Initialise a stopped thread.
pub(crate) fn create(kernel: &mut Kernel<TestPort>, priority: u8) -> ThreadHandle {
    let config = ThreadConfig::new(stack(STACK_SIZE)).with_priority(Priority::new(priority));
    kernel.init_thread(config, entry, 0).unwrap()
}

/// Initialise and start a thread.
pub(crate) fn spawn(kernel: &mut Kernel<TestPort>, priority: u8) -> ThreadHandle {
    let thread = create(kernel, priority);
    kernel.start_thread(thread).unwrap();
    thread
}

/// Kernel with an idle thread at priority 0 plus `priorities`, already started.
pub(crate) fn booted(priorities: &[u8]) -> (Kernel<TestPort>, ThreadHandle, Vec<ThreadHandle>) {
    let mut kernel = kernel();
    let idle = spawn(&mut kernel, 0);
    let threads = priorities
        .iter()
        .map(|&priority| spawn(&mut kernel, priority))
        .collect();
    kernel.start();
    (kernel, idle, threads)
}

/// Complete a pending switch and return the new current thread.
pub(crate) fn switch(kernel: &mut Kernel<TestPort>) -> ThreadHandle {
    kernel.complete_switch().unwrap()
}

pub(crate) fn ticks(kernel: &mut Kernel<TestPort>, count: u32) {
    for _ in 0..count {
        kernel.tick();
    }
}
