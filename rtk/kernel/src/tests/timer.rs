use std::cell::RefCell;
use std::vec;
use std::vec::Vec;

use crate::tests::{booted, kernel, kernel_with, switch, ticks, TestPort};
use crate::{Kernel, KernelConfig, KernelError, Resource, SemaphoreId, TimerId, TimerMode};

std::thread_local! {
    static FIRED: RefCell<Vec<(u64, usize)>> = RefCell::new(Vec::new());
}

fn record(kernel: &mut Kernel<TestPort>, _timer: TimerId, data: usize) {
    assert!(kernel.in_interrupt());
    let at = kernel.ticks().raw();
    FIRED.with(|fired| fired.borrow_mut().push((at, data)));
}

fn fired() -> Vec<(u64, usize)> {
    FIRED.with(|fired| fired.borrow().clone())
}

#[test]
fn timers_fire_in_expiry_order() {
    let mut kernel = kernel();
    let a = kernel.create_timer(TimerMode::OneShot, record, 1).unwrap();
    let b = kernel.create_timer(TimerMode::OneShot, record, 2).unwrap();
    let c = kernel.create_timer(TimerMode::OneShot, record, 3).unwrap();
    let d = kernel.create_timer(TimerMode::OneShot, record, 4).unwrap();

    kernel.start_timer(a, 5);
    kernel.start_timer(b, 3);
    kernel.start_timer(c, 5);
    kernel.start_timer(d, 1);
    assert_eq!(kernel.timer_remaining(a), Some(5));
    assert_eq!(kernel.timer_remaining(b), Some(3));
    assert_eq!(kernel.timer_remaining(c), Some(5));
    assert_eq!(kernel.timer_remaining(d), Some(1));

    ticks(&mut kernel, 5);
    assert_eq!(fired(), vec![(1, 4), (3, 2), (5, 1), (5, 3)]);
    assert_eq!(kernel.armed_timers(), 0);
    assert_eq!(kernel.timer_remaining(a), None);
}

#[test]
fn periodic_timer_repeats_until_stopped() {
    let mut kernel = kernel();
    let timer = kernel.create_timer(TimerMode::Periodic, record, 9).unwrap();
    kernel.start_timer(timer, 2);

    ticks(&mut kernel, 7);
    assert_eq!(fired(), vec![(2, 9), (4, 9), (6, 9)]);
    assert!(kernel.is_timer_armed(timer));
    assert_eq!(kernel.timer_remaining(timer), Some(1));

    kernel.stop_timer(timer);
    assert!(!kernel.is_timer_armed(timer));
    ticks(&mut kernel, 4);
    assert_eq!(fired().len(), 3);
}

#[test]
fn stopping_a_timer_keeps_later_expiries() {
    let mut kernel = kernel();
    let a = kernel.create_timer(TimerMode::OneShot, record, 1).unwrap();
    let b = kernel.create_timer(TimerMode::OneShot, record, 2).unwrap();
    let c = kernel.create_timer(TimerMode::OneShot, record, 3).unwrap();
    kernel.start_timer(a, 2);
    kernel.start_timer(b, 4);
    kernel.start_timer(c, 6);

    kernel.stop_timer(b);
    assert_eq!(kernel.timer_remaining(c), Some(6));

    ticks(&mut kernel, 6);
    assert_eq!(fired(), vec![(2, 1), (6, 3)]);
}

#[test]
fn zero_tick_timer_fires_on_next_tick() {
    let mut kernel = kernel();
    let timer = kernel.create_timer(TimerMode::OneShot, record, 5).unwrap();
    kernel.start_timer(timer, 0);
    assert_eq!(kernel.timer_remaining(timer), Some(1));

    kernel.tick();
    assert_eq!(fired(), vec![(1, 5)]);
}

#[test]
fn restart_rearms_with_last_interval() {
    let mut kernel = kernel();
    let timer = kernel.create_timer(TimerMode::OneShot, record, 0).unwrap();
    kernel.start_timer(timer, 3);
    ticks(&mut kernel, 2);

    kernel.restart_timer(timer);
    assert_eq!(kernel.timer_remaining(timer), Some(3));
    ticks(&mut kernel, 2);
    assert!(fired().is_empty());
    kernel.tick();
    assert_eq!(fired(), vec![(5, 0)]);
}

#[test]
fn millisecond_start_rounds_up_to_ticks() {
    let mut kernel = kernel_with(KernelConfig::builder().tick_period_ms(10).build());
    let timer = kernel.create_timer(TimerMode::OneShot, record, 0).unwrap();
    kernel.start_timer_ms(timer, 25);
    assert_eq!(kernel.timer_remaining(timer), Some(3));
}

#[test]
fn timer_pool_exhaustion_is_reported() {
    let mut kernel = kernel_with(KernelConfig::builder().max_timers(1).build());
    let timer = kernel.create_timer(TimerMode::OneShot, record, 0).unwrap();
    assert_eq!(
        kernel.create_timer(TimerMode::OneShot, record, 0),
        Err(KernelError::Exhausted(Resource::Timer))
    );

    kernel.destroy_timer(timer);
    assert!(kernel.create_timer(TimerMode::OneShot, record, 0).is_ok());
}

#[test]
#[should_panic(expected = "stale or out-of-range timer handle")]
fn destroyed_timer_handle_does_not_reach_its_successor() {
    let mut kernel = kernel_with(KernelConfig::builder().max_timers(1).build());
    let stale = kernel.create_timer(TimerMode::OneShot, record, 1).unwrap();
    kernel.destroy_timer(stale);

    let fresh = kernel.create_timer(TimerMode::OneShot, record, 2).unwrap();
    assert_ne!(fresh, stale);
    kernel.start_timer(stale, 2);
}

fn semaphore_in(kernel: &Kernel<TestPort>, data: usize) -> SemaphoreId {
    SemaphoreId(kernel.semaphores.key(data as u16).unwrap())
}

fn post_data(kernel: &mut Kernel<TestPort>, _timer: TimerId, data: usize) {
    let sem = semaphore_in(kernel, data);
    let _ = kernel.post(sem);
}

#[test]
fn callback_post_wakes_blocked_thread() {
    let (mut kernel, idle, threads) = booted(&[2]);
    let sem = kernel.create_semaphore(0, 1).unwrap();
    let timer = kernel
        .create_timer(TimerMode::OneShot, post_data, usize::from(sem.slot()))
        .unwrap();
    kernel.start_timer(timer, 3);

    assert!(kernel.pend(sem).is_err());
    assert_eq!(switch(&mut kernel), idle);
    ticks(&mut kernel, 3);
    assert_eq!(switch(&mut kernel), threads[0]);
    assert_eq!(kernel.pend(sem), Ok(()));
}

fn pend_data(kernel: &mut Kernel<TestPort>, _timer: TimerId, data: usize) {
    let sem = semaphore_in(kernel, data);
    let _ = kernel.pend(sem);
}

#[test]
#[should_panic(expected = "blocking call from interrupt context")]
fn blocking_in_callback_is_fatal() {
    let (mut kernel, _idle, _threads) = booted(&[2]);
    let sem = kernel.create_semaphore(0, 1).unwrap();
    let timer = kernel
        .create_timer(TimerMode::OneShot, pend_data, usize::from(sem.slot()))
        .unwrap();
    kernel.start_timer(timer, 1);
    kernel.tick();
}
