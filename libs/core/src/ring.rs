//! Interrupt-to-main-loop handoff queue.
//!
//! Thin wrapper around the lock-free SPSC queue in `heapless`. Interrupt
//! handlers push bytes or events with [`Ring::put`], the main loop drains
//! with [`Ring::get`]. A full queue drops the new element instead of
//! blocking; the producer side keeps a running drop count so the main loop
//! can notice overruns.
//!
//! Frozen rule: `put` never blocks and never overwrites queued data. The
//! queue holds at most `N - 1` elements so that full and empty remain
//! distinguishable by index comparison alone.

use heapless::spsc::{Consumer, Producer, Queue};

pub struct Ring<T, const N: usize> {
    queue: Queue<T, N>,
    dropped: u32,
}

impl<T, const N: usize> Ring<T, N> {
    pub const fn new() -> Self {
        Ring {
            queue: Queue::new(),
            dropped: 0,
        }
    }

    /// Enqueues `item`, returning `false` (and counting a drop) when full.
    pub fn put(&mut self, item: T) -> bool {
        match self.queue.enqueue(item) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.wrapping_add(1);
                false
            }
        }
    }

    pub fn get(&mut self) -> Option<T> {
        self.queue.dequeue()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Usable capacity, one less than `N`.
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of elements rejected by `put` since construction.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Splits into lock-free ends for use across the interrupt boundary.
    ///
    /// Drop accounting only covers the owned [`Ring::put`] path; a split
    /// producer reports rejection through its own `Result`.
    pub fn split(&mut self) -> (Producer<'_, T, N>, Consumer<'_, T, N>) {
        self.queue.split()
    }
}

impl<T, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
