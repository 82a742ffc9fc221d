//! Tests for driving the kernel through a critical section

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use rtk_kernel::{
    Kernel, KernelConfig, Port, SharedKernel, ThreadConfig, ThreadHandle, Tick, TimerId,
    TimerMode,
};

#[derive(Default)]
struct CountingPort {
    switches: usize,
}

impl Port for CountingPort {
    type Entry = fn(usize);

    fn init_stack(&mut self, _: ThreadHandle, _: &mut [u8], _: Self::Entry, _: usize) -> usize {
        0
    }

    fn trigger_switch(&mut self) {
        self.switches += 1;
    }

    fn now(&self) -> Tick {
        Tick::ZERO
    }
}

fn entry(_: usize) {}

static FIRED: AtomicUsize = AtomicUsize::new(0);

fn on_timer(_: &mut Kernel<CountingPort>, _: TimerId, _: usize) {
    FIRED.fetch_add(1, Ordering::SeqCst);
}

fn booted() -> SharedKernel<CountingPort> {
    let mut kernel = Kernel::new(KernelConfig::default(), CountingPort::default()).unwrap();
    let stack = Box::leak(vec![0u8; 128].into_boxed_slice());
    let idle = kernel.init_thread(ThreadConfig::new(stack), entry, 0).unwrap();
    kernel.start_thread(idle).unwrap();
    kernel.start();
    SharedKernel::new(kernel)
}

#[test]
fn ticks_from_another_thread_reach_timers() {
    let shared = Arc::new(booted());
    let timer = shared
        .with(|kernel| kernel.create_timer(TimerMode::Periodic, on_timer, 0))
        .unwrap();
    shared.with(|kernel| kernel.start_timer(timer, 5));

    let ticker = {
        let shared = Arc::clone(&shared);
        thread::spawn(move || {
            for _ in 0..50 {
                shared.tick();
            }
        })
    };
    ticker.join().unwrap();

    assert_eq!(shared.with(|kernel| kernel.ticks()), Tick::new(50));
    assert_eq!(FIRED.load(Ordering::SeqCst), 10);
}

#[test]
fn into_inner_returns_kernel_state() {
    let shared = booted();
    shared.tick();
    shared.tick();
    let kernel = shared.into_inner();
    assert_eq!(kernel.ticks(), Tick::new(2));
    assert_eq!(kernel.port().switches, 0);
}
