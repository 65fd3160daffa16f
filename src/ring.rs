//! Lock-free single-producer single-consumer sample queue.
//!
//! Bridges the real-time audio callback (producer) and the visualization
//! loop (consumer): the producer never blocks or allocates, the consumer
//! reads at its own pace. Synchronization is a pair of monotonically
//! increasing 64-bit counters with acquire/release ordering; a release
//! store of `write_pos` publishes the slots written before it, and the
//! consumer's acquire load observes them. Occupancy is the wrapping
//! difference `write_pos - read_pos`, which stays valid across counter
//! wrap (at 48 kHz a 64-bit counter wraps after millions of years).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Fixed-capacity SPSC ring buffer for trivially copyable values.
///
/// Capacity is rounded up to the next power of two so slot indexing is a
/// single mask. All operations take `&self`; the contract is role-based:
/// exactly one thread calls the producer operations and exactly one thread
/// calls the consumer operations. `len`, `available`, `is_empty`, and
/// `is_full` are safe from any thread and return momentarily-true values.
pub struct RingBuffer<T> {
    storage: Box<[UnsafeCell<T>]>,
    mask: u64,
    write_pos: CachePadded<AtomicU64>,
    read_pos: CachePadded<AtomicU64>,
}

// SAFETY: slot accesses are disjoint between the single producer (writes
// slots in [read_pos + capacity) it owns until publishing write_pos) and the
// single consumer (reads slots below write_pos it observed via acquire).
// T: Copy means values cross threads by bitwise copy only.
unsafe impl<T: Copy + Send> Sync for RingBuffer<T> {}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates a buffer holding at least `min_capacity` elements.
    /// A request of 0 is rounded up to 1.
    pub fn new(min_capacity: usize) -> Self {
        let capacity = min_capacity.max(1).next_power_of_two();
        let storage: Box<[UnsafeCell<T>]> =
            (0..capacity).map(|_| UnsafeCell::new(T::default())).collect();

        Self {
            storage,
            mask: capacity as u64 - 1,
            write_pos: CachePadded::new(AtomicU64::new(0)),
            read_pos: CachePadded::new(AtomicU64::new(0)),
        }
    }
}

impl<T: Copy> RingBuffer<T> {
    /// Buffer capacity, always a power of two.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Number of elements available for reading. Safe from any thread.
    pub fn len(&self) -> usize {
        let w = self.write_pos.load(Ordering::Acquire);
        let r = self.read_pos.load(Ordering::Acquire);
        w.wrapping_sub(r) as usize
    }

    /// Free space available for writing.
    pub fn available(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    #[inline]
    fn slot(&self, pos: u64) -> *mut T {
        self.storage[(pos & self.mask) as usize].get()
    }

    // Producer operations (call from the audio thread only).

    /// Writes a single element. Returns `false` if the buffer is full.
    /// Wait-free: suitable for real-time callbacks.
    pub fn try_push(&self, value: T) -> bool {
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Acquire);

        if w.wrapping_sub(r) as usize >= self.capacity() {
            return false;
        }

        // SAFETY: slot `w` is unpublished; only this producer touches it.
        unsafe { *self.slot(w) = value };
        self.write_pos.store(w.wrapping_add(1), Ordering::Release);
        true
    }

    /// Writes the prefix of `data` that fits. Returns the count written.
    pub fn try_push_slice(&self, data: &[T]) -> usize {
        let w = self.write_pos.load(Ordering::Relaxed);
        let r = self.read_pos.load(Ordering::Acquire);
        let free = self.capacity() - w.wrapping_sub(r) as usize;
        let to_write = free.min(data.len());

        for (i, &value) in data[..to_write].iter().enumerate() {
            // SAFETY: slots [w, w + to_write) are unpublished producer territory.
            unsafe { *self.slot(w.wrapping_add(i as u64)) = value };
        }

        self.write_pos.store(w.wrapping_add(to_write as u64), Ordering::Release);
        to_write
    }

    /// Always writes, discarding the oldest element if the buffer was full.
    ///
    /// Producer-only, and additionally assumes no consumer is running
    /// concurrently: it advances `read_pos` past overwritten data, so a
    /// concurrent reader may observe either pre- or post-overwrite state.
    pub fn push_overwrite(&self, value: T) {
        let w = self.write_pos.load(Ordering::Relaxed);
        // SAFETY: single producer; the slot is either unpublished or being
        // abandoned by the read_pos advance below.
        unsafe { *self.slot(w) = value };
        self.write_pos.store(w.wrapping_add(1), Ordering::Release);

        let r = self.read_pos.load(Ordering::Relaxed);
        let occupied = w.wrapping_add(1).wrapping_sub(r) as usize;
        if occupied > self.capacity() {
            let new_read = w.wrapping_add(1).wrapping_sub(self.capacity() as u64);
            self.read_pos.store(new_read, Ordering::Release);
        }
    }

    // Consumer operations (call from the visualization thread only).

    /// Reads a single element, or `None` if the buffer is empty.
    pub fn try_pop(&self) -> Option<T> {
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);

        if r == w {
            return None;
        }

        // SAFETY: slot `r` was published by the acquire-observed write_pos.
        let value = unsafe { *self.slot(r) };
        self.read_pos.store(r.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Reads up to `out.len()` elements. Returns the count read.
    pub fn try_pop_slice(&self, out: &mut [T]) -> usize {
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);
        let available = w.wrapping_sub(r) as usize;
        let to_read = available.min(out.len());

        for (i, slot) in out[..to_read].iter_mut().enumerate() {
            // SAFETY: slots [r, r + to_read) are published and owned by the consumer.
            *slot = unsafe { *self.slot(r.wrapping_add(i as u64)) };
        }

        self.read_pos.store(r.wrapping_add(to_read as u64), Ordering::Release);
        to_read
    }

    /// Copies up to `out.len()` elements without consuming them.
    pub fn peek(&self, out: &mut [T]) -> usize {
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);
        let available = w.wrapping_sub(r) as usize;
        let to_copy = available.min(out.len());

        for (i, slot) in out[..to_copy].iter_mut().enumerate() {
            // SAFETY: same published range as try_pop_slice; read_pos is untouched.
            *slot = unsafe { *self.slot(r.wrapping_add(i as u64)) };
        }

        to_copy
    }

    /// Advances the read position by up to `count`. Returns the count discarded.
    pub fn discard(&self, count: usize) -> usize {
        let r = self.read_pos.load(Ordering::Relaxed);
        let w = self.write_pos.load(Ordering::Acquire);
        let available = w.wrapping_sub(r) as usize;
        let to_discard = available.min(count);

        self.read_pos.store(r.wrapping_add(to_discard as u64), Ordering::Release);
        to_discard
    }

    /// Discards everything currently readable.
    pub fn clear(&self) {
        let w = self.write_pos.load(Ordering::Acquire);
        self.read_pos.store(w, Ordering::Release);
    }
}
