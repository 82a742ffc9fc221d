//! Wall-clock tick source for hosted runs.
//!
//! The simulator ticks on step counts. When a kernel should instead follow
//! real time, a [`Ticker`] thread calls its tick handler at a fixed rate,
//! sleeping to absolute deadlines so the rate does not drift.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;
use parking_lot::Mutex;
use rtk_kernel::{Port, SharedKernel};

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Highest supported tick rate.
pub const MAX_TICK_RATE_HZ: u32 = 10_000;

/// Tick rate configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    rate_hz: u32,
}

impl ClockTick {
    /// # Panics
    ///
    /// If `rate_hz` is zero or above [`MAX_TICK_RATE_HZ`].
    pub fn new(rate_hz: u32) -> Self {
        assert!(rate_hz > 0, "tick rate must be greater than 0");
        assert!(rate_hz <= MAX_TICK_RATE_HZ, "tick rate too high (max 10kHz)");
        Self { rate_hz }
    }

    /// Matching rate for a kernel's `tick_period_ms`.
    pub fn from_period_ms(period_ms: u32) -> Self {
        Self::new(1000 / period_ms.clamp(1, 1000))
    }

    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(NSEC_PER_SEC / u64::from(self.rate_hz))
    }
}

/// Background thread invoking a tick handler at a fixed rate.
///
/// Stops when [`stop`](Self::stop) is called or the ticker is dropped.
pub struct Ticker {
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Ticker {
    pub fn start<F>(clock: ClockTick, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));
        let period = clock.period();

        let handle = {
            let running = Arc::clone(&running);
            let ticks = Arc::clone(&ticks);
            thread::spawn(move || {
                let mut next_tick = Instant::now();
                while running.load(Ordering::Relaxed) {
                    next_tick += period;
                    let now = Instant::now();
                    if next_tick > now {
                        thread::sleep(next_tick - now);
                    }
                    on_tick();
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            })
        };
        debug!("ticker started at {} Hz", clock.rate_hz());

        Self {
            running,
            ticks,
            thread: Mutex::new(Some(handle)),
        }
    }

    /// Drive `kernel`'s tick handler from the ticker thread.
    pub fn drive<P>(clock: ClockTick, kernel: Arc<SharedKernel<P>>) -> Self
    where
        P: Port + Send + 'static,
    {
        Self::start(clock, move || kernel.tick())
    }

    /// Ticks delivered so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it to finish its current tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use rtk_kernel::{Kernel, KernelConfig, TimerId, TimerMode};

    use super::*;
    use crate::port::SimPort;

    static FIRED: AtomicU64 = AtomicU64::new(0);

    fn count_expiry(_kernel: &mut Kernel<SimPort>, _timer: TimerId, _data: usize) {
        FIRED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn clock_tick_period() {
        assert_eq!(ClockTick::new(100).period(), Duration::from_millis(10));
        assert_eq!(ClockTick::new(1000).period(), Duration::from_micros(1000));
        assert_eq!(ClockTick::from_period_ms(10).rate_hz(), 100);
    }

    #[test]
    #[should_panic(expected = "tick rate must be greater than 0")]
    fn zero_rate_is_rejected() {
        ClockTick::new(0);
    }

    #[test]
    fn ticker_delivers_roughly_the_requested_rate() {
        let counted = Arc::new(AtomicU64::new(0));
        let ticker = {
            let counted = Arc::clone(&counted);
            Ticker::start(ClockTick::new(100), move || {
                counted.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        ticker.stop();
        assert!(!ticker.is_running());

        let count = counted.load(Ordering::SeqCst);
        assert_eq!(count, ticker.ticks());
        assert!((5..=15).contains(&count), "expected ~10 ticks, got {count}");
    }

    #[test]
    fn driven_kernel_follows_the_clock() {
        let mut kernel = Kernel::new(KernelConfig::default(), SimPort::new()).unwrap();
        let timer = kernel
            .create_timer(TimerMode::Periodic, count_expiry, 0)
            .unwrap();
        kernel.start_timer(timer, 5);
        let kernel = Arc::new(SharedKernel::new(kernel));

        let ticker = Ticker::drive(ClockTick::new(1000), Arc::clone(&kernel));
        thread::sleep(Duration::from_millis(50));
        ticker.stop();

        let delivered = ticker.ticks();
        assert!(delivered > 0);
        assert_eq!(kernel.with(|k| k.ticks().raw()), delivered);
        assert_eq!(FIRED.load(Ordering::SeqCst), delivered / 5);
    }
}
