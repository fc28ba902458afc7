//! A fixed-capacity FIFO ring buffer.
//!
//! Indexing uses plain `% CAPACITY`, not a power-of-two mask, so `CAPACITY`
//! need not be a power of two. The read and write cursors are unbounded
//! counters (mirroring the donor codebase's console ring, which indexes with
//! `buf[r % buf.len()]`); `used` is their wrapping difference.

#![cfg_attr(not(test), no_std)]

/// A fixed-capacity FIFO of `CAPACITY` elements of type `T`.
///
/// The buffer itself is not thread-safe. Callers that feed it from an
/// interrupt context supply `lock`/`unlock` hooks; every method that
/// mutates the cursors runs inside that critical section. When both hooks
/// are `None`, the buffer may only be driven from a single context.
pub struct RingBuffer<T, const CAPACITY: usize> {
    buf: [T; CAPACITY],
    rd: usize,
    wr: usize,
    lock: Option<fn()>,
    unlock: Option<fn()>,
}

impl<T, const CAPACITY: usize> RingBuffer<T, CAPACITY>
where
    T: Copy + Default,
{
    /// Creates an empty buffer.
    ///
    /// `lock`/`unlock` are invoked in pairs around every cursor mutation;
    /// pass `None` for both when the buffer is only ever touched from one
    /// context.
    ///
    /// # Panics
    ///
    /// Panics if `CAPACITY` is zero.
    #[must_use]
    pub fn new(lock: Option<fn()>, unlock: Option<fn()>) -> Self {
        assert!(CAPACITY > 0, "ring buffer capacity must be non-zero");
        Self {
            buf: [T::default(); CAPACITY],
            rd: 0,
            wr: 0,
            lock,
            unlock,
        }
    }

    fn with_lock<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        if let Some(lock) = self.lock {
            lock();
        }
        let result = f(self);
        if let Some(unlock) = self.unlock {
            unlock();
        }
        result
    }

    /// Total element capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Number of elements currently queued.
    #[must_use]
    pub fn used(&self) -> usize {
        self.wr.wrapping_sub(self.rd)
    }

    /// Free element slots.
    #[must_use]
    pub fn free(&self) -> usize {
        CAPACITY - self.used()
    }

    /// True when `used() == 0`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// True when `used() == CAPACITY`.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.used() == CAPACITY
    }

    /// Appends `min(src.len(), free())` elements; returns the count written.
    pub fn add(&mut self, src: &[T]) -> usize {
        self.with_lock(|this| {
            let n = src.len().min(this.free());
            for (i, value) in src.iter().take(n).enumerate() {
                let idx = (this.wr + i) % CAPACITY;
                this.buf[idx] = *value;
            }
            this.wr = this.wr.wrapping_add(n);
            n
        })
    }

    /// Removes `min(dst.len(), used())` elements into `dst`; returns the count.
    pub fn get(&mut self, dst: &mut [T]) -> usize {
        self.with_lock(|this| {
            let n = this.peek_locked(dst);
            this.rd = this.rd.wrapping_add(n);
            n
        })
    }

    /// Copies `min(dst.len(), used())` elements without advancing the read
    /// cursor; returns the count copied.
    pub fn peek(&mut self, dst: &mut [T]) -> usize {
        self.with_lock(|this| this.peek_locked(dst))
    }

    fn peek_locked(&self, dst: &mut [T]) -> usize {
        let n = dst.len().min(self.used());
        for (i, slot) in dst.iter_mut().take(n).enumerate() {
            *slot = self.buf[(self.rd + i) % CAPACITY];
        }
        n
    }

    /// Advances the read cursor by `min(n, used())` without copying; returns
    /// the amount actually advanced.
    pub fn advance_rd(&mut self, n: usize) -> usize {
        self.with_lock(|this| {
            let n = n.min(this.used());
            this.rd = this.rd.wrapping_add(n);
            n
        })
    }

    /// Advances the write cursor by `min(n, free())` without copying; returns
    /// the amount actually advanced.
    pub fn advance_wr(&mut self, n: usize) -> usize {
        self.with_lock(|this| {
            let n = n.min(this.free());
            this.wr = this.wr.wrapping_add(n);
            n
        })
    }
}
