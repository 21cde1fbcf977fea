//! Fixed-capacity object pool
//!
//! All slots are allocated and default-initialized once, at construction.
//! After that `allocate` and `deallocate` never touch the heap allocator, so
//! a pool sized for worst-case load gives allocation without jitter.
//!
//! Handles are plain indices tagged with the owning pool's id. They are not
//! `Clone`, and `deallocate` consumes them, so a released slot cannot be
//! reached through a stale handle.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU32, Ordering};

use super::fatal;

static NEXT_POOL_ID: AtomicU32 = AtomicU32::new(1);

struct Slot<T> {
    value: T,
    is_free: bool,
}

/// Exclusive handle to a live object in a [`Pool`].
#[must_use = "dropping a PoolHandle leaks its slot until the pool is dropped"]
pub struct PoolHandle<T> {
    pool_id: u32,
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PoolHandle<T> {
    /// Slot index backing this handle.
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.index
    }
}

impl<T> fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("pool_id", &self.pool_id)
            .field("index", &self.index)
            .finish()
    }
}

/// Arena of `N` slots with a circular free-slot search.
///
/// # Example
/// ```
/// use kairos::core::Pool;
///
/// let mut pool: Pool<u64> = Pool::with_capacity(4);
/// let handle = pool.allocate(42);
/// assert_eq!(*pool.get(&handle), 42);
/// pool.deallocate(handle);
/// assert_eq!(pool.available(), 4);
/// ```
pub struct Pool<T> {
    id: u32,
    slots: Box<[Slot<T>]>,
    // Search for a free slot starts here
    next_free: usize,
    in_use: usize,
}

impl<T: Default> Pool<T> {
    /// Pre-allocate `capacity` default-initialized free slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be non-zero");

        let slots: Vec<Slot<T>> = (0..capacity)
            .map(|_| Slot {
                value: T::default(),
                is_free: true,
            })
            .collect();

        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            slots: slots.into_boxed_slice(),
            next_free: 0,
            in_use: 0,
        }
    }

    /// Place `value` into the next free slot.
    ///
    /// Amortized O(1), worst case O(N). Fatal if every slot is in use.
    pub fn allocate(&mut self, value: T) -> PoolHandle<T> {
        let index = self.find_free();
        let slot = &mut self.slots[index];
        slot.value = value;
        slot.is_free = false;
        self.in_use += 1;

        self.next_free = (index + 1) % self.slots.len();

        PoolHandle {
            pool_id: self.id,
            index,
            _marker: PhantomData,
        }
    }

    /// Release the slot behind `handle`, dropping its value.
    ///
    /// Fatal if the handle belongs to another pool, is out of range, or
    /// refers to a slot that is already free.
    pub fn deallocate(&mut self, handle: PoolHandle<T>) {
        let index = self.checked_index(&handle);
        if self.slots[index].is_free {
            fatal(format!("expected in-use slot at index {}", index));
        }
        let slot = &mut self.slots[index];
        slot.value = T::default();
        slot.is_free = true;
        self.in_use -= 1;
    }
}

impl<T> Pool<T> {
    #[inline(always)]
    pub fn get(&self, handle: &PoolHandle<T>) -> &T {
        let index = self.checked_index(handle);
        &self.slots[index].value
    }

    #[inline(always)]
    pub fn get_mut(&mut self, handle: &PoolHandle<T>) -> &mut T {
        let index = self.checked_index(handle);
        &mut self.slots[index].value
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.slots.len() - self.in_use
    }

    pub fn is_exhausted(&self) -> bool {
        self.in_use == self.slots.len()
    }

    fn find_free(&self) -> usize {
        let len = self.slots.len();
        let start = self.next_free;
        let mut index = start;
        loop {
            if self.slots[index].is_free {
                return index;
            }
            index += 1;
            if index == len {
                index = 0;
            }
            if index == start {
                fatal(format!("memory pool out of space (capacity {})", len));
            }
        }
    }

    fn checked_index(&self, handle: &PoolHandle<T>) -> usize {
        if handle.pool_id != self.id || handle.index >= self.slots.len() {
            fatal(format!(
                "element at index {} does not belong to this memory pool",
                handle.index
            ));
        }
        handle.index
    }
}
