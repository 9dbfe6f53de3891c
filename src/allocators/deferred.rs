//! Frame-deferred free queue.
//!
//! The GPU may still read a region for a few frames after the CPU side is
//! done with it. Frees are queued with the frame they were issued in and
//! applied once that frame is known to have completed. Any thread may push;
//! the owner drains.

use crossbeam_queue::SegQueue;

/// A pending deferred free.
struct DeferredFree<A> {
    item: A,
    frame: u64,
}

/// Lock-free queue of frees waiting for a frame to retire.
pub struct DeferredFreeQueue<A> {
    queue: SegQueue<DeferredFree<A>>,
}

impl<A> DeferredFreeQueue<A> {
    /// Create a new deferred free queue.
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    /// Queue `item` to be released once `frame` has completed.
    pub fn push(&self, item: A, frame: u64) {
        self.queue.push(DeferredFree { item, frame });
    }

    /// Hand every entry whose frame is `<= completed` to `f`.
    ///
    /// Entries for later frames go back on the queue. Entries pushed while
    /// draining are left for the next call. Returns the number released.
    pub fn drain_retired(&self, completed: u64, mut f: impl FnMut(A)) -> usize {
        let pending = self.queue.len();
        let mut released = 0;

        for _ in 0..pending {
            let Some(entry) = self.queue.pop() else {
                break;
            };
            if entry.frame <= completed {
                f(entry.item);
                released += 1;
            } else {
                self.queue.push(entry);
            }
        }

        released
    }

    /// Check if there are pending frees.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get approximate number of pending frees.
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

impl<A> Default for DeferredFreeQueue<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> std::fmt::Debug for DeferredFreeQueue<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredFreeQueue")
            .field("pending", &self.len())
            .finish()
    }
}
