use crate::tests::{booted, spawn, switch, ticks};
use crate::{SchedStatus, ThreadState};

#[test]
fn start_selects_most_urgent_ready_thread() {
    let (kernel, idle, threads) = booted(&[1, 4, 2]);
    assert_eq!(kernel.current_thread(), Some(threads[1]));
    assert_eq!(kernel.thread_state(threads[1]), ThreadState::Running);
    assert_eq!(kernel.thread_state(idle), ThreadState::Ready);
    assert!(kernel.is_started());
}

#[test]
fn second_start_returns_running_thread() {
    let (mut kernel, _idle, threads) = booted(&[1]);
    let runner = threads[0];
    let urgent = spawn(&mut kernel, 3);
    assert_eq!(kernel.next_thread(), Some(urgent));

    assert_eq!(kernel.start(), runner);
    assert_eq!(kernel.current_thread(), Some(runner));
    assert_eq!(kernel.context_switches(), 0);
    assert_eq!(switch(&mut kernel), urgent);
}

#[test]
fn equal_priority_threads_rotate_on_quantum_expiry() {
    let (mut kernel, _idle, threads) = booted(&[2, 2]);
    let (first, second) = (threads[0], threads[1]);
    assert_eq!(kernel.quantum_owner(), Some(first));

    ticks(&mut kernel, 3);
    assert_eq!(kernel.next_thread(), Some(first));

    kernel.tick();
    assert_eq!(switch(&mut kernel), second);
    assert_eq!(kernel.quantum_owner(), Some(second));

    ticks(&mut kernel, 4);
    assert_eq!(switch(&mut kernel), first);
    assert_eq!(kernel.context_switches(), 2);
}

#[test]
fn per_thread_quantum_sets_slice_length() {
    let (mut kernel, _idle, threads) = booted(&[2, 2]);
    let (first, second) = (threads[0], threads[1]);
    kernel.set_quantum(second, 1).unwrap();

    ticks(&mut kernel, 4);
    assert_eq!(switch(&mut kernel), second);
    kernel.tick();
    assert_eq!(switch(&mut kernel), first);
}

#[test]
fn lone_thread_in_band_runs_without_quantum() {
    let (mut kernel, _idle, threads) = booted(&[2]);
    assert_eq!(kernel.quantum_owner(), None);

    ticks(&mut kernel, 20);
    assert_eq!(kernel.current_thread(), Some(threads[0]));
    assert_eq!(kernel.port().switch_requests, 0);
}

#[test]
fn quantum_follows_the_band_that_runs() {
    let (mut kernel, _idle, threads) = booted(&[1, 1, 3]);
    let top = threads[2];
    assert_eq!(kernel.current_thread(), Some(top));
    assert_eq!(kernel.quantum_owner(), None);

    let sem = kernel.create_semaphore(0, 1).unwrap();
    assert!(kernel.pend(sem).is_err());
    assert_eq!(switch(&mut kernel), threads[0]);
    assert_eq!(kernel.quantum_owner(), Some(threads[0]));

    kernel.post(sem).unwrap();
    assert_eq!(switch(&mut kernel), top);
    assert_eq!(kernel.quantum_owner(), None);
}

#[test]
fn preemption_cancels_running_quantum() {
    let (mut kernel, _idle, threads) = booted(&[2, 2]);
    ticks(&mut kernel, 2);

    let high = spawn(&mut kernel, 5);
    assert_eq!(switch(&mut kernel), high);
    ticks(&mut kernel, 10);
    assert_eq!(kernel.current_thread(), Some(high));

    kernel.exit_thread(high);
    assert_eq!(switch(&mut kernel), threads[0]);
}

#[test]
fn locked_scheduler_defers_switch_until_unlock() {
    let (mut kernel, _idle, threads) = booted(&[1]);
    let low = threads[0];

    let status = kernel.lock_scheduler();
    assert_eq!(status, SchedStatus::Unlocked);
    assert!(kernel.is_scheduler_locked());

    let requests = kernel.port().switch_requests;
    let high = spawn(&mut kernel, 3);
    assert_eq!(kernel.port().switch_requests, requests);
    assert_eq!(kernel.next_thread(), Some(high));
    assert_eq!(switch(&mut kernel), low);

    kernel.unlock_scheduler(status);
    assert!(!kernel.is_scheduler_locked());
    assert_eq!(kernel.port().switch_requests, requests + 1);
    assert_eq!(switch(&mut kernel), high);
}

#[test]
fn nested_lock_restores_previous_status() {
    let (mut kernel, _idle, _threads) = booted(&[1]);
    let outer = kernel.lock_scheduler();
    let inner = kernel.lock_scheduler();
    assert_eq!(inner, SchedStatus::Locked);

    kernel.unlock_scheduler(inner);
    assert!(kernel.is_scheduler_locked());
    kernel.unlock_scheduler(outer);
    assert!(!kernel.is_scheduler_locked());
}

#[test]
fn threads_before_start_only_queue() {
    let mut kernel = crate::tests::kernel();
    spawn(&mut kernel, 0);
    spawn(&mut kernel, 3);
    assert_eq!(kernel.port().switch_requests, 0);
    assert_eq!(kernel.current_thread(), None);
}
