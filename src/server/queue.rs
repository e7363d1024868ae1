use crate::limits::WaitStrategy;
use crossbeam::queue::ArrayQueue;
use tokio::{task::yield_now, time::sleep as tokio_sleep};

/// Fixed-capacity FIFO handoff between the acceptor and the worker pool.
///
/// Both sides poll: [`push`](Self::push) parks with the configured
/// [`WaitStrategy`] until a slot frees up, [`pop`](Self::pop) until an item
/// arrives. Neither operation fails or gives up; production only stops at
/// process termination. Every pushed item is popped exactly once.
#[derive(Debug)]
pub(crate) struct ConnQueue<T> {
    slots: ArrayQueue<T>,
    wait: WaitStrategy,
}

impl<T> ConnQueue<T> {
    /// # Panics
    ///
    /// Panics when `capacity` is zero; a zero-slot queue is a configuration
    /// error caught at startup.
    #[inline]
    pub(crate) fn new(capacity: usize, wait: WaitStrategy) -> Self {
        Self {
            slots: ArrayQueue::new(capacity),
            wait,
        }
    }

    /// Enqueues `item`, waiting as long as it takes for a free slot.
    pub(crate) async fn push(&self, item: T) {
        let mut item = item;

        loop {
            match self.slots.push(item) {
                Ok(()) => return,
                Err(rejected) => item = rejected,
            }
            self.wait().await;
        }
    }

    /// Dequeues the oldest item, waiting as long as it takes for one.
    pub(crate) async fn pop(&self) -> T {
        loop {
            if let Some(item) = self.slots.pop() {
                return item;
            }
            self.wait().await;
        }
    }

    #[inline]
    async fn wait(&self) {
        match &self.wait {
            WaitStrategy::Yield => yield_now().await,
            WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
        }
    }
}
