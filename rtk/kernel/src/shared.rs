//! Sharing the kernel between thread and interrupt context.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::port::Port;
use crate::Kernel;

/// The kernel behind a global critical section.
///
/// On a single-core target the critical-section implementation masks
/// interrupts; hosted builds enable this crate's `std` feature to pull in the
/// `std` implementation. Calls must not nest: re-entering
/// [`with`](Self::with) from inside the closure panics.
pub struct SharedKernel<P: Port> {
    inner: Mutex<RefCell<Kernel<P>>>,
}

impl<P: Port> SharedKernel<P> {
    pub const fn new(kernel: Kernel<P>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(kernel)),
        }
    }

    /// Run `f` with exclusive access to the kernel.
    pub fn with<R>(&self, f: impl FnOnce(&mut Kernel<P>) -> R) -> R {
        critical_section::with(|cs| {
            let mut kernel = self.inner.borrow_ref_mut(cs);
            f(&mut kernel)
        })
    }

    /// Tick interrupt entry point.
    pub fn tick(&self) {
        self.with(Kernel::tick);
    }

    pub fn into_inner(self) -> Kernel<P> {
        self.inner.into_inner().into_inner()
    }
}
