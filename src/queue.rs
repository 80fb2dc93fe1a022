use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{NetError, PushError};


/// A thread-safe FIFO queue with a blocking [MessageQueue::wait].
///
/// It serves two purposes: connections use it as their outbound buffer, and applications use it
///  to hand received messages from network I/O over to application threads.
///
/// All operations take the same lock, so each operation is atomic with respect to the others.
///  `wait` sleeps on a condition variable that is signalled by every push, and on wakeup it
///  re-checks for emptiness since another consumer may have drained the queue first.
///
/// [MessageQueue::close] releases blocked consumers on teardown. An optional capacity turns the
///  queue into a bounded queue that refuses pushes when full, giving producers backpressure.
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    capacity: Option<usize>,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        MessageQueue::new()
    }
}

impl<T> MessageQueue<T> {
    /// an unbounded queue
    pub fn new() -> MessageQueue<T> {
        MessageQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            capacity: None,
        }
    }

    /// NB: a capacity of 0 refuses all pushes
    pub fn bounded(capacity: usize) -> MessageQueue<T> {
        MessageQueue {
            capacity: Some(capacity),
            ..MessageQueue::new()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap()
    }

    fn push(&self, item: T, front: bool) -> Result<usize, PushError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(PushError::Closed(item));
        }
        if let Some(capacity) = self.capacity {
            if state.items.len() >= capacity {
                trace!("queue is full at {} entries", capacity);
                return Err(PushError::Full(item));
            }
        }

        if front {
            state.items.push_front(item);
        }
        else {
            state.items.push_back(item);
        }
        let len = state.items.len();
        drop(state);

        self.not_empty.notify_one();
        Ok(len)
    }

    /// Returns the queue's length after the push
    pub fn push_front(&self, item: T) -> Result<usize, PushError<T>> {
        self.push(item, true)
    }

    /// Returns the queue's length after the push
    pub fn push_back(&self, item: T) -> Result<usize, PushError<T>> {
        self.push(item, false)
    }

    pub fn pop_front(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    pub fn pop_back(&self) -> Option<T> {
        self.lock().items.pop_back()
    }

    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn clear(&self) {
        self.lock().items.clear();
    }

    /// Blocks the calling thread until the queue is non-empty.
    ///
    /// Returns an error if the queue is closed and empty. Items that were pushed before the queue
    ///  was closed are still returned, so a consumer can drain the queue after closing.
    pub fn wait(&self) -> Result<(), NetError> {
        let mut state = self.lock();
        loop {
            if !state.items.is_empty() {
                return Ok(());
            }
            if state.closed {
                return Err(NetError::QueueClosed);
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Like [MessageQueue::wait], but gives up after `timeout`. Returns `true` if the queue is
    ///  non-empty.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool, NetError> {
        let deadline = Instant::now() + timeout;

        let mut state = self.lock();
        loop {
            if !state.items.is_empty() {
                return Ok(true);
            }
            if state.closed {
                return Err(NetError::QueueClosed);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            state = self.not_empty.wait_timeout(state, deadline - now).unwrap().0;
        }
    }

    /// Shuts the queue down: further pushes are refused, and threads blocked in `wait` are
    ///  released once the queue is empty.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            debug!("closing queue with {} remaining entries", state.items.len());
            state.closed = true;
        }
        drop(state);
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

impl<T: Clone> MessageQueue<T> {
    pub fn front(&self) -> Option<T> {
        self.lock().items.front().cloned()
    }

    pub fn back(&self) -> Option<T> {
        self.lock().items.back().cloned()
    }
}
