//! Bounded lock-free SPSC queue for superpage offsets.
//!
//! A fixed ring of `slots` entries with separate read and write indices, one
//! slot always left empty so that `read == write` means empty and
//! `write + 1 == read` means full. Usable capacity is therefore `slots - 1`.
//!
//! The queue is split into a [`QueueProducer`] and a [`QueueConsumer`] at
//! construction. Both operations take `&mut self`, so a single producer and
//! a single consumer are enforced by ownership.
//!
//! ## Memory ordering
//!
//! - The producer writes the slot, then publishes `write` with `Release`.
//! - The consumer observes `write` with `Acquire`, reads the slot, then
//!   publishes `read` with `Release`.
//! - The producer observes `read` with `Acquire` before reusing a slot.
//!
//! This pairing is what transfers ownership of a superpage offset from one
//! pipeline stage to the next.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Cache line size for index padding
pub const CACHE_LINE_SIZE: usize = 64;

#[repr(align(64))]
struct CachePadded<T>(T);

struct Ring<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    read: CachePadded<AtomicUsize>,
    write: CachePadded<AtomicUsize>,
}

// SAFETY: a slot is only touched by the side that currently owns it, and
// ownership moves through the Acquire/Release index pair.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    #[inline]
    fn next(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slots.len() {
            0
        } else {
            next
        }
    }

    fn len(&self) -> usize {
        let write = self.write.0.load(Ordering::Acquire);
        let read = self.read.0.load(Ordering::Acquire);
        if write >= read {
            write - read
        } else {
            self.slots.len() - read + write
        }
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut read = *self.read.0.get_mut();
        let write = *self.write.0.get_mut();
        while read != write {
            // SAFETY: slots in [read, write) hold initialized values.
            unsafe { self.slots[read].get_mut().assume_init_drop() };
            read = self.next(read);
        }
    }
}

/// Writing half of a superpage queue.
pub struct QueueProducer<T> {
    ring: Arc<Ring<T>>,
}

/// Reading half of a superpage queue.
pub struct QueueConsumer<T> {
    ring: Arc<Ring<T>>,
}

/// Create a queue with `slots` ring entries, of which `slots - 1` are usable.
///
/// # Panics
///
/// Panics if `slots < 2`.
pub fn superpage_queue<T: Send>(slots: usize) -> (QueueProducer<T>, QueueConsumer<T>) {
    assert!(slots >= 2, "queue needs at least 2 slots, got {slots}");
    let slots: Vec<UnsafeCell<MaybeUninit<T>>> =
        (0..slots).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
    let ring = Arc::new(Ring {
        slots: slots.into_boxed_slice(),
        read: CachePadded(AtomicUsize::new(0)),
        write: CachePadded(AtomicUsize::new(0)),
    });
    (
        QueueProducer { ring: ring.clone() },
        QueueConsumer { ring },
    )
}

impl<T> QueueProducer<T> {
    /// Enqueue a value. Returns it back if the queue is full.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        let ring = &*self.ring;
        let current = ring.write.0.load(Ordering::Relaxed);
        let next = ring.next(current);
        if next == ring.read.0.load(Ordering::Acquire) {
            return Err(value);
        }
        // SAFETY: `current` is outside [read, write), the consumer will not
        // touch it until `write` is published below.
        unsafe { (*ring.slots[current].get()).write(value) };
        ring.write.0.store(next, Ordering::Release);
        Ok(())
    }

    /// Approximate number of queued values.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the queue looked empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of values the queue can hold.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len() - 1
    }
}

impl<T> QueueConsumer<T> {
    /// Dequeue the oldest value, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<T> {
        let ring = &*self.ring;
        let current = ring.read.0.load(Ordering::Relaxed);
        if current == ring.write.0.load(Ordering::Acquire) {
            return None;
        }
        // SAFETY: `current` is in [read, write) and was published by the
        // producer's Release store.
        let value = unsafe { (*ring.slots[current].get()).assume_init_read() };
        ring.read.0.store(ring.next(current), Ordering::Release);
        Some(value)
    }

    /// Approximate number of queued values.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether the queue looked empty at the time of the call.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of values the queue can hold.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len() - 1
    }

    /// Pop everything currently queued.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.len());
        while let Some(value) = self.pop() {
            out.push(value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;

    #[test]
    fn test_queue_fifo() {
        let (mut tx, mut rx) = superpage_queue::<usize>(4);
        assert!(rx.pop().is_none());
        tx.push(10).unwrap();
        tx.push(20).unwrap();
        assert_eq!(rx.pop(), Some(10));
        tx.push(30).unwrap();
        assert_eq!(rx.pop(), Some(20));
        assert_eq!(rx.pop(), Some(30));
        assert!(rx.pop().is_none());
    }

    #[test]
    fn test_queue_capacity_law() {
        let k = 5;
        let (mut tx, mut rx) = superpage_queue::<usize>(k + 1);
        assert_eq!(tx.capacity(), k);
        for i in 0..k {
            tx.push(i).unwrap();
        }
        assert_eq!(tx.len(), k);

        // Overflow fails and hands the value back without corrupting state
        assert_eq!(tx.push(99), Err(99));
        assert_eq!(tx.push(100), Err(100));
        assert_eq!(rx.len(), k);

        assert_eq!(rx.drain(), (0..k).collect::<Vec<_>>());
        assert!(rx.is_empty());
    }

    #[test]
    fn test_queue_wraparound() {
        let (mut tx, mut rx) = superpage_queue::<usize>(3);
        for round in 0..100 {
            tx.push(round * 2).unwrap();
            tx.push(round * 2 + 1).unwrap();
            assert!(tx.push(0).is_err());
            assert_eq!(rx.pop(), Some(round * 2));
            assert_eq!(rx.pop(), Some(round * 2 + 1));
            assert_eq!(rx.len(), 0);
        }
    }

    #[test]
    fn test_queue_drops_remaining_values() {
        let marker = Arc::new(());
        {
            let (mut tx, _rx) = superpage_queue::<Arc<()>>(4);
            tx.push(marker.clone()).unwrap();
            tx.push(marker.clone()).unwrap();
            assert_eq!(Arc::strong_count(&marker), 3);
        }
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    #[should_panic(expected = "at least 2 slots")]
    fn test_queue_too_small() {
        let _ = superpage_queue::<usize>(1);
    }

    #[test]
    fn test_queue_cross_thread_order() {
        const COUNT: usize = 100_000;
        let (mut tx, mut rx) = superpage_queue::<usize>(17);

        let producer = thread::spawn(move || {
            let mut next = 0;
            while next < COUNT {
                if tx.push(next).is_ok() {
                    next += 1;
                } else {
                    std::hint::spin_loop();
                }
            }
        });

        let mut expected = 0;
        while expected < COUNT {
            if let Some(value) = rx.pop() {
                assert_eq!(value, expected);
                expected += 1;
            } else {
                std::hint::spin_loop();
            }
        }
        producer.join().unwrap();
        assert!(rx.is_empty());
    }

    #[test]
    fn test_index_padding() {
        assert_eq!(std::mem::align_of::<CachePadded<AtomicUsize>>(), CACHE_LINE_SIZE);
    }

    proptest! {
        #[test]
        fn prop_queue_matches_vecdeque(ops in prop::collection::vec(prop::option::of(0usize..1000), 0..200)) {
            let (mut tx, mut rx) = superpage_queue::<usize>(8);
            let mut model = std::collections::VecDeque::new();
            for op in ops {
                match op {
                    Some(value) => {
                        let accepted = tx.push(value).is_ok();
                        prop_assert_eq!(accepted, model.len() < 7);
                        if accepted {
                            model.push_back(value);
                        }
                    }
                    None => {
                        prop_assert_eq!(rx.pop(), model.pop_front());
                    }
                }
                prop_assert_eq!(rx.len(), model.len());
            }
        }
    }
}
