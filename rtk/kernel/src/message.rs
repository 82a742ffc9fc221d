//! Message pool and message queues.
//!
//! Messages come from one global fixed-size pool. At any moment a message is
//! either free in the pool, held by the thread that popped it, or pending in
//! exactly one queue. A queue pairs a counting semaphore with a FIFO of
//! pending messages: sending appends then posts, receiving pends then takes
//! the head.

use log::{trace, warn};
use rtk_core::{Fatal, KResult, KernelError, Resource};
use rtk_mem::{Key, PoolStats};

use crate::list::List;
use crate::port::Port;
use crate::semaphore::SemaphoreId;
use crate::Kernel;

/// Handle naming a message drawn from the pool.
///
/// Valid until the message is pushed back; a handle kept past that never
/// names the message that later reuses its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageHandle(pub(crate) Key);

impl MessageHandle {
    pub(crate) const fn slot(self) -> u16 {
        self.0.index()
    }
}

/// Handle naming a message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueId(pub(crate) Key);

impl QueueId {
    pub(crate) const fn slot(self) -> u16 {
        self.0.index()
    }
}

/// A small code plus an opaque word of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Message {
    code: u16,
    data: usize,
    queued: Option<QueueId>,
}

impl Message {
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn set_code(&mut self, code: u16) {
        self.code = code;
    }

    pub fn data(&self) -> usize {
        self.data
    }

    pub fn set_data(&mut self, data: usize) {
        self.data = data;
    }

    /// The queue this message is pending in, if any.
    pub fn queue(&self) -> Option<QueueId> {
        self.queued
    }
}

pub(crate) struct MessageQueue {
    gate: SemaphoreId,
    pending: List,
}

impl<P: Port> Kernel<P> {
    /// Take a message from the global pool, or `None` if it is exhausted.
    pub fn pop_message(&mut self) -> Option<MessageHandle> {
        match self.messages.insert(Message::default()) {
            Ok(key) => Some(MessageHandle(key)),
            Err(_) => {
                warn!("message pool exhausted");
                None
            }
        }
    }

    /// Return a message to the pool. Halts if it is free or still queued.
    pub fn push_message(&mut self, handle: MessageHandle) {
        if !self.owns_message(handle) {
            self.fatal(Fatal::MessageNotOwned);
        }
        self.messages.remove(handle.slot());
    }

    /// Live and not pending in any queue.
    fn owns_message(&self, handle: MessageHandle) -> bool {
        matches!(self.messages.lookup(handle.0), Some(message) if message.queued.is_none())
    }

    pub fn message(&self, handle: MessageHandle) -> &Message {
        match self.messages.lookup(handle.0) {
            Some(message) => message,
            None => self.fatal(Fatal::InvalidHandle(Resource::Message)),
        }
    }

    pub fn message_mut(&mut self, handle: MessageHandle) -> &mut Message {
        let hook = self.config.panic_hook;
        match self.messages.lookup_mut(handle.0) {
            Some(message) => message,
            None => crate::kernel::halt(hook, Fatal::InvalidHandle(Resource::Message)),
        }
    }

    pub fn message_pool_stats(&self) -> PoolStats {
        self.messages.stats()
    }

    pub fn create_queue(&mut self) -> KResult<QueueId> {
        if self.queues.is_full() {
            warn!("message queue pool exhausted");
            return Err(KernelError::Exhausted(Resource::Queue));
        }
        let gate = self.alloc_semaphore(0, u16::MAX)?;
        let queue = MessageQueue {
            gate,
            pending: List::new(),
        };
        match self.queues.insert(queue) {
            Ok(key) => Ok(QueueId(key)),
            Err(_) => {
                self.semaphores.remove(gate.slot());
                Err(KernelError::Exhausted(Resource::Queue))
            }
        }
    }

    fn queue(&self, id: QueueId) -> &MessageQueue {
        match self.queues.lookup(id.0) {
            Some(queue) => queue,
            None => self.fatal(Fatal::InvalidHandle(Resource::Queue)),
        }
    }

    /// Append a message and wake the most urgent receiver.
    ///
    /// The sender gives up the message; sending a free or already queued
    /// message halts the kernel.
    pub fn send(&mut self, id: QueueId, handle: MessageHandle) {
        let gate = self.queue(id).gate;
        if !self.owns_message(handle) {
            self.fatal(Fatal::MessageNotOwned);
        }
        if let Some(message) = self.messages.lookup_mut(handle.0) {
            message.queued = Some(id);
        }

        let hook = self.config.panic_hook;
        let Some(queue) = self.queues.lookup_mut(id.0) else {
            crate::kernel::halt(hook, Fatal::InvalidHandle(Resource::Queue));
        };
        queue.pending.push_back(&mut self.message_links, handle.slot());
        trace!("message {} sent to queue {}", handle.slot(), id.slot());

        if self.post(gate).is_err() {
            warn!("queue {} gate saturated", id.slot());
        }
    }

    /// Take the oldest message, blocking the running thread while the queue is empty.
    pub fn receive(&mut self, id: QueueId) -> nb::Result<MessageHandle, KernelError> {
        let gate = self.queue(id).gate;
        self.pend(gate)?;
        Ok(self.take_pending(id))
    }

    /// As [`receive`](Self::receive), giving up with [`KernelError::Timeout`] after `ms`.
    pub fn receive_timeout(
        &mut self,
        id: QueueId,
        ms: u32,
    ) -> nb::Result<MessageHandle, KernelError> {
        let gate = self.queue(id).gate;
        self.pend_timeout(gate, ms)?;
        Ok(self.take_pending(id))
    }

    /// Take the oldest message without blocking.
    pub fn try_receive(&mut self, id: QueueId) -> Option<MessageHandle> {
        let gate = self.queue(id).gate;
        if self.try_pend(gate) {
            Some(self.take_pending(id))
        } else {
            None
        }
    }

    fn take_pending(&mut self, id: QueueId) -> MessageHandle {
        let hook = self.config.panic_hook;
        let popped = self
            .queues
            .lookup_mut(id.0)
            .and_then(|queue| queue.pending.pop_front(&mut self.message_links));
        let Some(key) = popped.and_then(|slot| self.messages.key(slot)) else {
            crate::kernel::halt(hook, Fatal::InvalidHandle(Resource::Message));
        };
        if let Some(message) = self.messages.lookup_mut(key) {
            message.queued = None;
        }
        MessageHandle(key)
    }

    /// Messages pending in the queue.
    pub fn queue_len(&self, id: QueueId) -> usize {
        self.queue(id).pending.len()
    }

    /// Threads blocked receiving from the queue.
    pub fn queue_receivers(&self, id: QueueId) -> usize {
        self.semaphore_waiters(self.queue(id).gate)
    }
}
