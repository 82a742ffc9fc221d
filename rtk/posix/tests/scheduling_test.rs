//! Scheduling behaviour of the kernel under the hosted simulator

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rtk_kernel::{KernelConfig, Priority, ThreadConfig, ThreadState};
use rtk_posix::{leak_stack, SimConfig, Simulator, ThreadAction};

fn simulator() -> Simulator {
    Simulator::new(KernelConfig::default(), SimConfig::default()).unwrap()
}

fn counting(counter: &Arc<AtomicU64>) -> impl FnMut(&mut rtk_posix::ThreadContext<'_>) -> ThreadAction {
    let counter = Arc::clone(counter);
    move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
        ThreadAction::Continue
    }
}

fn config(priority: u8) -> ThreadConfig {
    ThreadConfig::new(leak_stack(512)).with_priority(Priority::new(priority))
}

#[test]
fn equal_priority_threads_share_cpu_evenly() {
    let mut sim = simulator();
    let counters: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    for counter in &counters {
        sim.spawn(config(1), counting(counter)).unwrap();
    }

    sim.start();
    sim.run_ticks(300);

    let counts: Vec<u64> = counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
    let max = *counts.iter().max().unwrap();
    let min = *counts.iter().min().unwrap();
    assert!(min > 0);
    assert!((max - min) * 100 <= max, "uneven round robin: {counts:?}");
    assert_eq!(sim.idle_steps(), 0);
}

#[test]
fn quantum_lengths_set_cpu_share() {
    let mut sim = simulator();
    let counters: Vec<_> = (0..3).map(|_| Arc::new(AtomicU64::new(0))).collect();
    for (quantum, counter) in (1..=3).zip(&counters) {
        sim.spawn(config(2).with_quantum(quantum), counting(counter))
            .unwrap();
    }

    sim.start();
    sim.run_ticks(600);

    let counts: Vec<u64> = counters.iter().map(|c| c.load(Ordering::Relaxed)).collect();
    let unit = counts[0] as f64;
    assert!((counts[1] as f64 / unit - 2.0).abs() < 0.02, "{counts:?}");
    assert!((counts[2] as f64 / unit - 3.0).abs() < 0.03, "{counts:?}");
}

#[test]
fn higher_priority_thread_starves_lower_until_it_sleeps() {
    let mut sim = simulator();
    let low_count = Arc::new(AtomicU64::new(0));
    let low = sim.spawn(config(1), counting(&low_count)).unwrap();

    let mut slept = false;
    let high = sim
        .spawn(config(3), move |ctx| {
            if ctx.iteration() < 50 {
                return ThreadAction::Continue;
            }
            if !slept {
                rtk_posix::wait!(ctx.sleep(5)).ok();
                slept = true;
            }
            ThreadAction::Exit
        })
        .unwrap();

    sim.start();
    sim.run_steps(50);
    assert_eq!(low_count.load(Ordering::Relaxed), 0);

    sim.run_ticks(10);
    assert_eq!(sim.with_kernel(|k| k.thread_state(high)), ThreadState::Exited);
    assert!(low_count.load(Ordering::Relaxed) > 0);
    assert_eq!(sim.with_kernel(|k| k.thread_state(low)), ThreadState::Running);
}

#[test]
fn yield_hands_cpu_to_band_peer() {
    let mut sim = simulator();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
    for name in ["a", "b"] {
        let order = Arc::clone(&order);
        sim.spawn(config(2), move |_| {
            order.lock().push(name);
            ThreadAction::Yield
        })
        .unwrap();
    }

    sim.start();
    sim.run_steps(4);
    assert_eq!(*order.lock(), ["a", "b", "a", "b"]);
}
