// src/spinlock.rs

use std::sync::atomic::{AtomicU32, Ordering};

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

/// A spin-lock whose state word lives wherever the struct is placed, which
/// for the ring buffer is inside the shared segment header. Every process
/// that maps the segment sees the same word, so the lock excludes across
/// address spaces, not just threads.
///
/// No timeout, no fairness, no priority inheritance. Hold it only for a
/// single push or pop.
#[repr(transparent)]
pub struct SpinLock {
    word: AtomicU32,
}

/// RAII guard returned by [`SpinLock::lock`]. Releases on drop, so every
/// exit path out of a critical section, including early rejection returns,
/// unlocks exactly once.
pub struct SpinGuard<'a> {
    lock: &'a SpinLock,
}

impl SpinLock {
    /// A new, unlocked lock. Placement in shared memory happens by writing
    /// the containing header in place.
    pub fn new() -> Self {
        SpinLock {
            word: AtomicU32::new(UNLOCKED),
        }
    }

    /// Reset to the unlocked state. The owner calls this exactly once while
    /// initializing the header, before any peer can attach.
    pub fn init(&self) {
        self.word.store(UNLOCKED, Ordering::Release);
    }

    /// Busy-wait until the lock is acquired.
    pub fn lock(&self) -> SpinGuard<'_> {
        loop {
            match self.word.compare_exchange_weak(
                UNLOCKED,
                LOCKED,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return SpinGuard { lock: self },
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Try to acquire without spinning.
    pub fn try_lock(&self) -> Option<SpinGuard<'_>> {
        self.word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SpinGuard { lock: self })
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        // Release ordering: all writes inside the critical section become
        // visible before the lock word reads as free.
        self.lock.word.store(UNLOCKED, Ordering::Release);
    }
}

// Compile-time check: the lock is exactly the one u32 word the header
// reserves for it.
const _: () = {
    assert!(std::mem::size_of::<SpinLock>() == 4);
    assert!(std::mem::align_of::<SpinLock>() == 4);
};
