//! Counting semaphores.

use log::{trace, warn};
use rtk_core::{Fatal, KResult, KernelError, Resource};

use rtk_mem::Key;

use crate::blocking::Blocker;
use crate::list::List;
use crate::port::Port;
use crate::Kernel;

/// Handle naming a semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SemaphoreId(pub(crate) Key);

impl SemaphoreId {
    pub(crate) const fn slot(self) -> u16 {
        self.0.index()
    }
}

pub(crate) struct Semaphore {
    pub(crate) count: u16,
    pub(crate) max: u16,
    pub(crate) waiters: List,
}

impl Semaphore {
    pub(crate) const fn new(initial: u16, max: u16) -> Self {
        Self {
            count: initial,
            max,
            waiters: List::new(),
        }
    }

    /// Empty binary semaphore, used for sleeps.
    pub(crate) const fn binary() -> Self {
        Self::new(0, 1)
    }

    pub(crate) fn reset(&mut self, initial: u16, max: u16) {
        self.count = initial;
        self.max = max;
    }
}

fn check_counts(initial: u16, max: u16) -> KResult<()> {
    if max == 0 || initial > max {
        return Err(KernelError::InvalidCount { initial, max });
    }
    Ok(())
}

impl<P: Port> Kernel<P> {
    /// Allocate a semaphore holding `initial` of at most `max` tokens.
    pub fn create_semaphore(&mut self, initial: u16, max: u16) -> KResult<SemaphoreId> {
        check_counts(initial, max)?;
        if self.user_semaphores >= self.config.max_semaphores {
            warn!("semaphore pool exhausted");
            return Err(KernelError::Exhausted(Resource::Semaphore));
        }
        let id = self.alloc_semaphore(initial, max)?;
        self.user_semaphores += 1;
        Ok(id)
    }

    pub(crate) fn alloc_semaphore(&mut self, initial: u16, max: u16) -> KResult<SemaphoreId> {
        self.semaphores
            .insert(Semaphore::new(initial, max))
            .map(SemaphoreId)
            .map_err(|_| KernelError::Exhausted(Resource::Semaphore))
    }

    /// Reset the counts of an existing semaphore.
    ///
    /// Halts if any thread is blocked on it.
    pub fn init_semaphore(&mut self, id: SemaphoreId, initial: u16, max: u16) -> KResult<()> {
        check_counts(initial, max)?;
        if !self.semaphore(id).waiters.is_empty() {
            self.fatal(Fatal::ReinitWithWaiters);
        }
        self.semaphore_mut(id).reset(initial, max);
        Ok(())
    }

    /// Signal the semaphore.
    ///
    /// With waiters, the token goes straight to the most urgent one and the
    /// count is unchanged. Otherwise the count is incremented, or
    /// [`KernelError::Saturated`] is returned with no state change when it
    /// already equals the maximum. Safe from interrupt context.
    pub fn post(&mut self, id: SemaphoreId) -> KResult<()> {
        if self.wake_waiter(Blocker::Semaphore(id)).is_some() {
            self.reschedule();
            return Ok(());
        }

        let semaphore = self.semaphore_mut(id);
        if semaphore.count >= semaphore.max {
            warn!("semaphore {} saturated at {}", id.slot(), semaphore.max);
            return Err(KernelError::Saturated);
        }
        semaphore.count += 1;
        trace!("semaphore {} posted, count {}", id.slot(), semaphore.count);
        Ok(())
    }

    /// Take a token, blocking the running thread until one is posted.
    pub fn pend(&mut self, id: SemaphoreId) -> nb::Result<(), KernelError> {
        self.pend_ticks(id, None)
    }

    /// Take a token, giving up with [`KernelError::Timeout`] after `ms`.
    pub fn pend_timeout(&mut self, id: SemaphoreId, ms: u32) -> nb::Result<(), KernelError> {
        let ticks = self.config.wait_ticks(ms);
        self.pend_ticks(id, Some(ticks))
    }

    pub(crate) fn pend_ticks(
        &mut self,
        id: SemaphoreId,
        timeout: Option<u32>,
    ) -> nb::Result<(), KernelError> {
        let current = self.blocking_caller();
        let blocker = Blocker::Semaphore(id);
        if let Some(outcome) = self.resume_wait(current, blocker) {
            return outcome;
        }

        if self.try_pend(id) {
            return Ok(());
        }
        self.block_current(current, blocker, timeout);
        Err(nb::Error::WouldBlock)
    }

    /// Take a token if one is available. Never blocks.
    pub fn try_pend(&mut self, id: SemaphoreId) -> bool {
        let semaphore = self.semaphore_mut(id);
        if semaphore.count > 0 {
            semaphore.count -= 1;
            true
        } else {
            false
        }
    }

    pub fn semaphore_count(&self, id: SemaphoreId) -> u16 {
        self.semaphore(id).count
    }

    pub fn semaphore_max(&self, id: SemaphoreId) -> u16 {
        self.semaphore(id).max
    }

    /// Number of threads blocked on the semaphore.
    pub fn semaphore_waiters(&self, id: SemaphoreId) -> usize {
        self.semaphore(id).waiters.len()
    }
}
