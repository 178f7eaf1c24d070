//! Bounded FIFO handoff queue.
//!
//! The closed flag and the items share one mutex, so an enqueue can never
//! land in a queue that is concurrently being closed. Free slots are handed
//! out by a fair semaphore, so blocked enqueuers are admitted in the order
//! they arrived and a later caller cannot overtake them. Dequeuers park on a
//! `Notify` with the lock released.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::{Notify, Semaphore};

/// Returned by [`HandoffQueue::dequeue`] once the queue is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("handoff queue is closed")]
pub struct QueueClosed;

/// Returned by [`HandoffQueue::enqueue`] once the queue is closed. Hands the
/// rejected item back to the caller.
pub struct EnqueueError<T>(pub T);

impl<T> fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueError").finish_non_exhaustive()
    }
}

impl<T> fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("handoff queue is closed")
    }
}

impl<T> std::error::Error for EnqueueError<T> {}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct HandoffQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    /// One permit per free slot.
    slots: Semaphore,
    readable: Notify,
}

impl<T> HandoffQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            capacity,
            slots: Semaphore::new(capacity),
            readable: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `item`, waiting while the queue is full.
    ///
    /// Waiting callers get a slot in the order they called. Fails without
    /// waiting once the queue is closed, returning the item.
    pub async fn enqueue(&self, item: T) -> Result<(), EnqueueError<T>> {
        let Ok(slot) = self.slots.acquire().await else {
            return Err(EnqueueError(item));
        };
        // The slot is returned by the dequeue that frees it.
        slot.forget();

        let mut state = self.lock();
        if state.closed {
            return Err(EnqueueError(item));
        }
        state.items.push_back(item);
        drop(state);
        self.readable.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting while the queue is empty.
    ///
    /// Fails without waiting once the queue is closed.
    pub async fn dequeue(&self) -> Result<T, QueueClosed> {
        loop {
            let readable = self.readable.notified();
            tokio::pin!(readable);
            readable.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueClosed);
                }
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.slots.add_permits(1);
                    return Ok(item);
                }
            }

            readable.await;
        }
    }

    /// Close the queue and wake every waiter.
    ///
    /// Returns the items still queued if this call performed the close, or
    /// `None` if the queue was already closed. The caller drops the drained
    /// items outside the lock.
    pub fn close(&self) -> Option<Vec<T>> {
        let drained = {
            let mut state = self.lock();
            if state.closed {
                return None;
            }
            state.closed = true;
            state.items.drain(..).collect()
        };
        self.slots.close();
        self.readable.notify_waiters();
        Some(drained)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
