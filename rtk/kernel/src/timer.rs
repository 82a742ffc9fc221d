//! Software timer service.
//!
//! Armed timers sit in one list sorted by expiry, each storing only the ticks
//! remaining after its predecessor expires. A tick decrements the head alone;
//! every timer whose delta reaches zero is unlinked and fired in interrupt
//! context. Periodic timers are re-armed with their interval before their
//! action runs.

use log::{debug, trace, warn};
use rtk_core::{Fatal, KResult, KernelError, Resource, TimerMode};
use rtk_mem::Key;

use crate::port::Port;
use crate::semaphore::SemaphoreId;
use crate::thread::ThreadHandle;
use crate::Kernel;

/// Handle naming a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub(crate) Key);

impl TimerId {
    pub(crate) const fn slot(self) -> u16 {
        self.0.index()
    }
}

/// Timer callback, run in interrupt context. It must not block.
pub type TimerCallback<P> = fn(&mut Kernel<P>, TimerId, usize);

pub(crate) enum TimerAction<P: Port> {
    Idle,
    Callback(TimerCallback<P>),
    PostSemaphore(SemaphoreId),
    WaitTimeout(ThreadHandle),
    Quantum,
}

impl<P: Port> Clone for TimerAction<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: Port> Copy for TimerAction<P> {}

pub(crate) struct Timer<P: Port> {
    pub(crate) action: TimerAction<P>,
    data: usize,
    mode: TimerMode,
    interval: u32,
    delta: u32,
    armed: bool,
}

impl<P: Port> Timer<P> {
    pub(crate) fn new(action: TimerAction<P>, mode: TimerMode, data: usize) -> Self {
        Self {
            action,
            data,
            mode,
            interval: 0,
            delta: 0,
            armed: false,
        }
    }
}

impl<P: Port> Kernel<P> {
    /// Link `id` into the sorted list to expire `ticks` from now.
    ///
    /// A zero-tick request expires on the next tick. Re-arming an armed
    /// timer restarts it.
    pub(crate) fn arm_timer(&mut self, id: TimerId, ticks: u32) {
        self.disarm_timer(id);

        let ticks = ticks.max(1);
        let mut remaining = ticks;
        let mut before = None;
        for index in self.timer_list.iter(&self.timer_links) {
            let Some(timer) = self.timers.get(index) else {
                continue;
            };
            if remaining < timer.delta {
                before = Some(index);
                break;
            }
            remaining -= timer.delta;
        }

        if let Some(next) = before {
            self.timer_mut(next).delta -= remaining;
        }
        let timer = self.timer_mut(id.slot());
        timer.interval = ticks;
        timer.delta = remaining;
        timer.armed = true;
        self.timer_list.insert_before(&mut self.timer_links, before, id.slot());
    }

    /// Unlink `id`, folding its delta into its successor.
    pub(crate) fn disarm_timer(&mut self, id: TimerId) {
        let timer = self.timer_mut(id.slot());
        if !timer.armed {
            return;
        }
        timer.armed = false;
        let delta = timer.delta;

        if let Some(next) = self.timer_links.next(id.slot()) {
            self.timer_mut(next).delta += delta;
        }
        self.timer_list.remove(&mut self.timer_links, id.slot());
    }

    /// Advance the timer list by one tick and fire what expired.
    pub(crate) fn process_timers(&mut self) {
        if let Some(head) = self.timer_list.head() {
            let timer = self.timer_mut(head);
            timer.delta = timer.delta.saturating_sub(1);
        }

        while let Some(head) = self.timer_list.head() {
            let id = self.timer_at(head);
            let timer = self.timer_mut(head);
            if timer.delta > 0 {
                break;
            }
            timer.armed = false;
            let (action, data, mode, interval) = (timer.action, timer.data, timer.mode, timer.interval);
            self.timer_list.remove(&mut self.timer_links, head);

            if mode.is_periodic() {
                self.arm_timer(id, interval);
            }
            self.fire(id, action, data);
        }
    }

    fn timer_at(&self, slot: u16) -> TimerId {
        match self.timers.key(slot) {
            Some(key) => TimerId(key),
            None => self.fatal(Fatal::InvalidHandle(Resource::Timer)),
        }
    }

    fn fire(&mut self, id: TimerId, action: TimerAction<P>, data: usize) {
        match action {
            TimerAction::Idle => {}
            TimerAction::Callback(callback) => {
                trace!("timer {} fired", id.slot());
                callback(self, id, data);
            }
            TimerAction::PostSemaphore(semaphore) => {
                if self.post(semaphore).is_err() {
                    warn!("timer {} post dropped", id.slot());
                }
            }
            TimerAction::WaitTimeout(thread) => self.expire_wait(thread),
            TimerAction::Quantum => self.expire_quantum(),
        }
    }

    fn user_timer(&self, id: TimerId) -> &Timer<P> {
        match self.timers.lookup(id.0) {
            Some(timer) if matches!(timer.action, TimerAction::Callback(_)) => timer,
            _ => self.fatal(Fatal::InvalidHandle(Resource::Timer)),
        }
    }

    /// Allocate a user timer. It stays idle until started.
    pub fn create_timer(
        &mut self,
        mode: TimerMode,
        callback: TimerCallback<P>,
        data: usize,
    ) -> KResult<TimerId> {
        if self.user_timers >= self.config.max_timers {
            warn!("timer pool exhausted");
            return Err(KernelError::Exhausted(Resource::Timer));
        }
        let key = self
            .timers
            .insert(Timer::new(TimerAction::Callback(callback), mode, data))
            .map_err(|_| KernelError::Exhausted(Resource::Timer))?;
        self.user_timers += 1;
        Ok(TimerId(key))
    }

    /// Stop and free a user timer.
    pub fn destroy_timer(&mut self, id: TimerId) {
        self.user_timer(id);
        self.disarm_timer(id);
        self.timers.remove(id.slot());
        self.user_timers -= 1;
    }

    /// Arm a user timer to fire after `ticks` (and every `ticks` if periodic).
    pub fn start_timer(&mut self, id: TimerId, ticks: u32) {
        self.user_timer(id);
        debug!("timer {} armed for {} ticks", id.slot(), ticks);
        self.arm_timer(id, ticks);
    }

    pub fn start_timer_ms(&mut self, id: TimerId, ms: u32) {
        let ticks = self.config.ms_to_ticks(ms);
        self.start_timer(id, ticks);
    }

    /// Re-arm with the last interval.
    pub fn restart_timer(&mut self, id: TimerId) {
        let interval = self.user_timer(id).interval;
        self.arm_timer(id, interval);
    }

    pub fn stop_timer(&mut self, id: TimerId) {
        self.user_timer(id);
        self.disarm_timer(id);
    }

    pub fn is_timer_armed(&self, id: TimerId) -> bool {
        self.user_timer(id).armed
    }

    /// Ticks until the timer fires, or `None` when idle.
    pub fn timer_remaining(&self, id: TimerId) -> Option<u32> {
        if !self.user_timer(id).armed {
            return None;
        }
        let mut total = 0;
        for index in self.timer_list.iter(&self.timer_links) {
            total += self.timers.get(index).map_or(0, |timer| timer.delta);
            if index == id.slot() {
                return Some(total);
            }
        }
        None
    }

    /// Number of armed timers, internal ones included.
    pub fn armed_timers(&self) -> usize {
        self.timer_list.len()
    }
}
