//! Lock-Free Single-Producer Single-Consumer (SPSC) Ring Buffer
//!
//! Slot-oriented API: the producer populates the slot returned by
//! [`Producer::next_to_write`] in place and publishes it with
//! [`Producer::update_write_index`]; the consumer inspects
//! [`Consumer::next_to_read`] and releases it with
//! [`Consumer::update_read_index`]. Tidak ada Mutex, tidak ada alokasi
//! setelah inisialisasi.
//!
//! The SPSC contract is enforced by ownership: [`RingBuffer::split`] hands
//! out exactly one producer and one consumer, neither of which is `Clone`.
//!
//! There is no backpressure. The capacity must be sized so a burst never
//! outruns the consumer; writing into a full buffer is fatal.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::fatal;

/// Padding untuk cache line isolation (64 bytes pada x86-64)
#[repr(C, align(64))]
struct CacheLinePadded<T> {
    value: T,
}

impl<T> CacheLinePadded<T> {
    const fn new(value: T) -> Self {
        Self { value }
    }
}

/// Fixed-capacity circular buffer shared by one producer and one consumer.
#[repr(C)]
pub struct RingBuffer<T> {
    // Producer side - only the producer stores here
    write_index: CacheLinePadded<AtomicUsize>,
    // Consumer side - only the consumer stores here
    read_index: CacheLinePadded<AtomicUsize>,
    // Published element count, the only field both sides modify
    count: CacheLinePadded<AtomicUsize>,
    slots: Box<[UnsafeCell<T>]>,
}

// SAFETY: RingBuffer aman untuk Send/Sync karena:
// - Hanya satu producer (menulis write_index dan slot di write_index)
// - Hanya satu consumer (menulis read_index)
// - count dipublish dengan Release dan dibaca dengan Acquire
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T: Default> RingBuffer<T> {
    /// Pre-allocates `capacity` default-initialized slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");

        let slots: Vec<UnsafeCell<T>> = (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();

        Self {
            write_index: CacheLinePadded::new(AtomicUsize::new(0)),
            read_index: CacheLinePadded::new(AtomicUsize::new(0)),
            count: CacheLinePadded::new(AtomicUsize::new(0)),
            slots: slots.into_boxed_slice(),
        }
    }
}

impl<T> RingBuffer<T> {
    /// Hand out the producer and consumer ends.
    pub fn split(self) -> (Producer<T>, Consumer<T>) {
        let ring = Arc::new(self);
        (
            Producer {
                ring: Arc::clone(&ring),
            },
            Consumer { ring },
        )
    }

    /// Number of published, unread elements.
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.count.value.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline(always)]
    fn advance(&self, index: usize) -> usize {
        let next = index + 1;
        if next == self.slots.len() {
            0
        } else {
            next
        }
    }
}

/// Writing end of a [`RingBuffer`].
pub struct Producer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> Producer<T> {
    /// Slot at the write index, for in-place population.
    ///
    /// Calling this again before [`update_write_index`](Self::update_write_index)
    /// returns the same slot. Fatal if the buffer is full.
    #[inline(always)]
    pub fn next_to_write(&mut self) -> &mut T {
        let capacity = self.ring.capacity();
        if self.ring.count.value.load(Ordering::Acquire) >= capacity {
            fatal(format!(
                "ring buffer full (capacity {}), consumer is not keeping up",
                capacity
            ));
        }
        let index = self.ring.write_index.value.load(Ordering::Relaxed);

        // SAFETY: same argument as try_next_to_write, count < capacity
        unsafe { &mut *self.ring.slots[index].get() }
    }

    /// Like [`next_to_write`](Self::next_to_write) but returns `None` when full.
    #[inline(always)]
    pub fn try_next_to_write(&mut self) -> Option<&mut T> {
        if self.ring.count.value.load(Ordering::Acquire) >= self.ring.capacity() {
            return None;
        }
        let index = self.ring.write_index.value.load(Ordering::Relaxed);

        // SAFETY: the slot at write_index lies outside [read_index, read_index + count)
        // because count < capacity, so the consumer never touches it. &mut self
        // guarantees no other producer-side reference is alive.
        Some(unsafe { &mut *self.ring.slots[index].get() })
    }

    /// Publish the slot returned by [`next_to_write`](Self::next_to_write).
    #[inline(always)]
    pub fn update_write_index(&mut self) {
        if self.ring.count.value.load(Ordering::Acquire) >= self.ring.capacity() {
            fatal("update_write_index() on a full ring buffer");
        }
        let index = self.ring.write_index.value.load(Ordering::Relaxed);
        self.ring
            .write_index
            .value
            .store(self.ring.advance(index), Ordering::Relaxed);

        // Release: the slot write above is visible before the consumer sees the new count
        self.ring.count.value.fetch_add(1, Ordering::AcqRel);
    }

    /// Move `value` into the next slot and publish it.
    #[inline(always)]
    pub fn push(&mut self, value: T) {
        *self.next_to_write() = value;
        self.update_write_index();
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Reading end of a [`RingBuffer`].
pub struct Consumer<T> {
    ring: Arc<RingBuffer<T>>,
}

impl<T> Consumer<T> {
    /// Oldest published element, or `None` when empty. Does not consume.
    #[inline(always)]
    pub fn next_to_read(&self) -> Option<&T> {
        if self.ring.count.value.load(Ordering::Acquire) == 0 {
            return None;
        }
        let index = self.ring.read_index.value.load(Ordering::Relaxed);

        // SAFETY: count > 0 was observed with Acquire, so the producer's write
        // to this slot happened-before and the producer will not touch it until
        // update_read_index releases it.
        Some(unsafe { &*self.ring.slots[index].get() })
    }

    /// Release the element returned by [`next_to_read`](Self::next_to_read).
    ///
    /// Fatal if the buffer is empty.
    #[inline(always)]
    pub fn update_read_index(&mut self) {
        if self.ring.count.value.load(Ordering::Acquire) == 0 {
            fatal(format!(
                "read an invalid element in thread {:?}",
                std::thread::current().id()
            ));
        }
        let index = self.ring.read_index.value.load(Ordering::Relaxed);
        self.ring
            .read_index
            .value
            .store(self.ring.advance(index), Ordering::Relaxed);

        // Release: the read above completes before the producer may reuse the slot
        self.ring.count.value.fetch_sub(1, Ordering::AcqRel);
    }

    /// Copy out the oldest element and release its slot.
    #[inline(always)]
    pub fn pop(&mut self) -> Option<T>
    where
        T: Clone,
    {
        let value = self.next_to_read()?.clone();
        self.update_read_index();
        Some(value)
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.ring.size()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_basic_write_read() {
        let (mut tx, mut rx) = RingBuffer::<u64>::with_capacity(16).split();

        assert!(rx.next_to_read().is_none());

        *tx.next_to_write() = 42;
        // Not visible until published
        assert!(rx.next_to_read().is_none());
        tx.update_write_index();

        assert_eq!(rx.next_to_read(), Some(&42));
        assert_eq!(rx.size(), 1);
        rx.update_read_index();
        assert!(rx.is_empty());
    }

    #[test]
    fn test_size_after_writes() {
        let (mut tx, rx) = RingBuffer::<u32>::with_capacity(8).split();
        for i in 0..5 {
            tx.push(i);
        }
        assert_eq!(tx.size(), 5);
        assert_eq!(rx.size(), 5);
    }

    #[test]
    fn test_read_empty_does_not_mutate() {
        let (mut tx, rx) = RingBuffer::<u32>::with_capacity(4).split();
        for _ in 0..3 {
            assert!(rx.next_to_read().is_none());
        }
        assert_eq!(rx.size(), 0);

        tx.push(7);
        assert_eq!(rx.next_to_read(), Some(&7));
        assert_eq!(rx.next_to_read(), Some(&7));
    }

    #[test]
    #[should_panic(expected = "read an invalid element")]
    fn test_update_read_index_on_empty_is_fatal() {
        let (_tx, mut rx) = RingBuffer::<u32>::with_capacity(4).split();
        rx.update_read_index();
    }

    #[test]
    fn test_full_buffer() {
        let (mut tx, mut rx) = RingBuffer::<u64>::with_capacity(4).split();

        for i in 1..=4 {
            tx.push(i);
        }
        assert!(tx.try_next_to_write().is_none());

        assert_eq!(rx.pop(), Some(1));
        assert!(tx.try_next_to_write().is_some());
        tx.push(5);
        assert_eq!(rx.size(), 4);
    }

    #[test]
    #[should_panic(expected = "ring buffer full (capacity 2)")]
    fn test_write_into_full_buffer_is_fatal() {
        let (mut tx, _rx) = RingBuffer::<u64>::with_capacity(2).split();
        tx.push(1);
        tx.push(2);
        tx.push(3);
    }

    #[test]
    fn test_next_to_write_same_slot_until_published() {
        let (mut tx, mut rx) = RingBuffer::<u64>::with_capacity(2).split();
        *tx.next_to_write() = 1;
        *tx.next_to_write() += 10;
        tx.update_write_index();
        tx.push(2);

        assert_eq!(rx.pop(), Some(11));
        // Slot freed by the pop is handed out after wraparound
        *tx.next_to_write() = 3;
        tx.update_write_index();
        assert_eq!(rx.pop(), Some(2));
        assert_eq!(rx.pop(), Some(3));
    }

    #[test]
    fn test_wraparound() {
        let (mut tx, mut rx) = RingBuffer::<u64>::with_capacity(4).split();

        // Fill and drain multiple times to test wraparound
        for round in 0..10 {
            for i in 0..4 {
                tx.push(round * 4 + i);
            }
            for i in 0..4 {
                assert_eq!(rx.pop(), Some(round * 4 + i));
            }
        }
    }

    #[test]
    fn test_cross_thread_fifo() {
        const COUNT: u64 = 100_000;
        let (mut tx, mut rx) = RingBuffer::<u64>::with_capacity(1024).split();

        let producer = std::thread::spawn(move || {
            for i in 0..COUNT {
                loop {
                    if let Some(slot) = tx.try_next_to_write() {
                        *slot = i;
                        tx.update_write_index();
                        break;
                    }
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

    proptest! {
        // Interleave writes and drains, never exceeding capacity
        #[test]
        fn prop_fifo_order(ops in proptest::collection::vec(any::<bool>(), 1..200)) {
            const CAP: usize = 16;
            let (mut tx, mut rx) = RingBuffer::<u32>::with_capacity(CAP).split();
            let mut written = Vec::new();
            let mut read = Vec::new();
            let mut next = 0u32;

            for write in ops {
                if write && tx.size() < CAP {
                    tx.push(next);
                    written.push(next);
                    next += 1;
                } else if let Some(v) = rx.pop() {
                    read.push(v);
                }
            }
            while let Some(v) = rx.pop() {
                read.push(v);
            }
            prop_assert_eq!(read, written);
        }
    }
}
