//! Lock-free SPSC ring buffer
//!
//! Bounded single-producer single-consumer queue carrying plain-data items
//! between the control thread and the audio thread. Both queue directions
//! (commands in, events out) are instances of this ring.
//!
//! Design:
//! - Power-of-two capacity with one sentinel slot, so a ring created with
//!   capacity `N` holds at most `N - 1` items and full/empty are
//!   distinguishable from the indices alone.
//! - `head` is owned by the producer, `tail` by the consumer. Each index
//!   lives on its own cache line to avoid false sharing between threads.
//! - Producer publishes slot writes with a release store on `head`; the
//!   consumer observes them with an acquire load. The consumer side is
//!   symmetric on `tail`.
//! - Push and pop never allocate, never block, and never spin. A full queue
//!   is a back-pressure signal returned to the caller.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Index on its own cache line (the atomic equivalent of `alignas(64)`).
#[repr(align(64))]
struct PaddedIndex(AtomicUsize);

struct Shared<T> {
    buf: Box<[UnsafeCell<T>]>,
    mask: usize,

    /// Producer-owned write index
    head: PaddedIndex,

    /// Consumer-owned read index
    tail: PaddedIndex,
}

// The UnsafeCell slots are only written by the producer before the head
// advances and only read by the consumer before the tail advances, so the
// acquire/release pairing on the indices makes shared access sound.
unsafe impl<T: Send> Send for Shared<T> {}
unsafe impl<T: Send> Sync for Shared<T> {}

impl<T> Shared<T> {
    #[inline]
    fn len(&self) -> usize {
        let h = self.head.0.load(Ordering::Acquire);
        let t = self.tail.0.load(Ordering::Acquire);
        h.wrapping_sub(t) & self.mask
    }
}

/// Bounded lock-free SPSC ring buffer of trivially copyable items.
///
/// Split into [`Producer`] and [`Consumer`] halves before use; each half can
/// move to its own thread, and the type system enforces the single-producer
/// single-consumer contract.
pub struct SpscRing<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy + Default> SpscRing<T> {
    /// Create a ring with the given slot count.
    ///
    /// `capacity` must be a power of two and at least 2. One slot is the
    /// sentinel, so the usable capacity is `capacity - 1`.
    pub fn new(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two() && capacity >= 2,
            "SpscRing capacity must be a power of two >= 2"
        );

        let buf: Box<[UnsafeCell<T>]> = (0..capacity)
            .map(|_| UnsafeCell::new(T::default()))
            .collect();

        Self {
            shared: Arc::new(Shared {
                buf,
                mask: capacity - 1,
                head: PaddedIndex(AtomicUsize::new(0)),
                tail: PaddedIndex(AtomicUsize::new(0)),
            }),
        }
    }

    /// Split into producer and consumer halves.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let producer = Producer {
            shared: Arc::clone(&self.shared),
        };
        let consumer = Consumer {
            shared: self.shared,
        };
        (producer, consumer)
    }

    /// Usable capacity (slot count minus the sentinel).
    pub fn capacity(&self) -> usize {
        self.shared.buf.len() - 1
    }

    /// Rewind both indices. Only possible before splitting, so no thread can
    /// be mid-operation.
    pub fn reset(&mut self) {
        self.shared.head.0.store(0, Ordering::Relaxed);
        self.shared.tail.0.store(0, Ordering::Relaxed);
    }
}

/// Producer half (exactly one thread may own this).
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Producer<T> {
    /// Push one item. Returns `false` iff the ring is full.
    #[inline]
    pub fn try_push(&mut self, item: T) -> bool {
        let shared = &*self.shared;
        let head = shared.head.0.load(Ordering::Relaxed);
        let next = (head + 1) & shared.mask;
        if next == shared.tail.0.load(Ordering::Acquire) {
            return false; // full
        }
        unsafe {
            *shared.buf[head].get() = item;
        }
        shared.head.0.store(next, Ordering::Release);
        true
    }

    /// Push a batch of items. Returns the number actually pushed; the
    /// unaccepted tail is left with the caller.
    pub fn push_slice(&mut self, items: &[T]) -> usize {
        let mut pushed = 0;
        for item in items {
            if !self.try_push(*item) {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Usable capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.shared.buf.len() - 1
    }
}

/// Consumer half (exactly one thread may own this).
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> Consumer<T> {
    /// Pop one item. Returns `None` iff the ring is empty.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let shared = &*self.shared;
        let tail = shared.tail.0.load(Ordering::Relaxed);
        if tail == shared.head.0.load(Ordering::Acquire) {
            return None; // empty
        }
        let item = unsafe { *shared.buf[tail].get() };
        shared.tail.0.store((tail + 1) & shared.mask, Ordering::Release);
        Some(item)
    }

    /// Pop up to `out.len()` items into `out`. Returns the count popped.
    pub fn pop_slice(&mut self, out: &mut [T]) -> usize {
        let mut popped = 0;
        for slot in out.iter_mut() {
            match self.try_pop() {
                Some(item) => {
                    *slot = item;
                    popped += 1;
                }
                None => break,
            }
        }
        popped
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.shared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.shared.buf.len() - 1
    }
}
