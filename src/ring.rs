// src/ring.rs

use std::ptr::NonNull;
use std::sync::atomic::{fence, Ordering};

use crate::error::{SegmentError, WouldOverflow, WouldUnderflow};
use crate::layout::{FLAG_FENCE, FLAG_POW2, FLAG_SPINLOCK, RingHeader};
use crate::spinlock::SpinGuard;

/// Maximum payload capacity in bytes. Keeps index arithmetic inside u32
/// even after power-of-two rounding.
pub const MAX_CAPACITY: u32 = 1 << 31;

/// How push/pop exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// No lock. Safe only under strict single-producer/single-consumer
    /// discipline: one side mutates `tail`, the other mutates `head`.
    #[default]
    Unsynchronized,
    /// Every push and pop takes the in-segment spin-lock. Permits multiple
    /// producers or consumers at the cost of serializing all operations.
    SpinLocked,
}

/// How indices advance past the wrap boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexMode {
    /// `(index + len) % capacity`, any capacity.
    #[default]
    PlainModulo,
    /// `(index + len) & (capacity - 1)`. Capacity is rounded up to the next
    /// power of two once, at creation.
    PowerOfTwoMask,
}

/// Ring modes, chosen by the owner at creation and stored in the header so
/// peers inherit them on attach. One binary supports every combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RingConfig {
    pub sync: SyncMode,
    pub index: IndexMode,
    /// Issue a full fence between the payload copy and the index update, so
    /// the other side can never observe an advanced index before the bytes.
    pub fenced: bool,
}

impl RingConfig {
    /// Encode into header flag bits.
    pub fn to_flags(self) -> u32 {
        let mut flags = 0;
        if self.sync == SyncMode::SpinLocked {
            flags |= FLAG_SPINLOCK;
        }
        if self.index == IndexMode::PowerOfTwoMask {
            flags |= FLAG_POW2;
        }
        if self.fenced {
            flags |= FLAG_FENCE;
        }
        flags
    }

    /// Decode from header flag bits.
    pub fn from_flags(flags: u32) -> Self {
        RingConfig {
            sync: if flags & FLAG_SPINLOCK != 0 {
                SyncMode::SpinLocked
            } else {
                SyncMode::Unsynchronized
            },
            index: if flags & FLAG_POW2 != 0 {
                IndexMode::PowerOfTwoMask
            } else {
                IndexMode::PlainModulo
            },
            fenced: flags & FLAG_FENCE != 0,
        }
    }

    /// The authoritative capacity for a requested payload size: validated,
    /// and rounded up once if the mask mode is selected. Never recomputed
    /// after creation.
    pub fn resolve_capacity(self, requested: u32) -> Result<u32, SegmentError> {
        if requested == 0 || requested > MAX_CAPACITY {
            return Err(SegmentError::InvalidCapacity(requested));
        }
        match self.index {
            IndexMode::PlainModulo => Ok(requested),
            IndexMode::PowerOfTwoMask => Ok(requested.next_power_of_two()),
        }
    }
}

/// Circular byte store over a mapped header and payload region.
///
/// Both operations are non-blocking: a full push or empty pop returns a
/// rejection immediately and callers spin or back off themselves (see
/// [`crate::backoff`]). A rejected call performs zero mutation.
///
/// In `Unsynchronized` mode the safety argument is role separation: only the
/// producing side ever stores `tail`, only the consuming side ever stores
/// `head`. Two unsynchronized producers (or consumers) on one ring is
/// undefined and outside all guarantees; use `SpinLocked` for that.
pub struct RingBuffer<'seg> {
    header: &'seg RingHeader,
    payload: NonNull<u8>,
    capacity: u32,
    flags: u32,
}

// Safety: index state is atomic and payload access follows the role (or
// lock) discipline documented above, across threads as across processes.
unsafe impl Send for RingBuffer<'_> {}
unsafe impl Sync for RingBuffer<'_> {}

impl<'seg> RingBuffer<'seg> {
    /// # Safety
    /// - `header` must be fully initialized (magic published by the owner)
    /// - `payload` must point to `header.capacity` valid bytes that live in
    ///   the same mapping as `header` and outlive `'seg`
    pub unsafe fn from_raw(header: &'seg RingHeader, payload: NonNull<u8>) -> Self {
        RingBuffer {
            header,
            payload,
            capacity: header.capacity,
            flags: header.flags,
        }
    }

    /// Total payload bytes. At most `capacity - 1` are usable at once; one
    /// byte of slack is always preserved so `head == tail` is unambiguously
    /// empty.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The modes this ring was created with.
    pub fn config(&self) -> RingConfig {
        RingConfig::from_flags(self.flags)
    }

    /// Current read index. Diagnostic; may be stale the moment it returns.
    pub fn head(&self) -> u32 {
        self.header.head.load(Ordering::Acquire)
    }

    /// Current write index. Diagnostic; may be stale the moment it returns.
    pub fn tail(&self) -> u32 {
        self.header.tail.load(Ordering::Acquire)
    }

    /// Bytes currently buffered. Lock-free even in `SpinLocked` mode; under
    /// concurrent push/pop the value can be transiently stale, which callers
    /// handle by retrying.
    pub fn used(&self) -> u32 {
        let head = self.header.head.load(Ordering::Acquire);
        let tail = self.header.tail.load(Ordering::Acquire);
        used(head, tail, self.capacity)
    }

    /// Bytes that can still be pushed (the slack byte already excluded).
    pub fn free(&self) -> u32 {
        self.capacity - self.used() - 1
    }

    /// Whether the ring currently holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.used() == 0
    }

    /// Copy `bytes` into the ring.
    ///
    /// Rejects with [`WouldOverflow`], touching nothing, unless strictly
    /// more than `bytes.len()` free bytes remain. A record as large as the
    /// whole capacity can therefore never be pushed. Zero-length pushes
    /// trivially succeed without touching indices.
    pub fn push(&self, bytes: &[u8]) -> Result<(), WouldOverflow> {
        if bytes.is_empty() {
            return Ok(());
        }
        if bytes.len() >= self.capacity as usize {
            return Err(WouldOverflow);
        }
        let len = bytes.len() as u32;

        let _guard = self.maybe_lock();

        // tail is owned by this side; head is the other side's index.
        let tail = self.header.tail.load(Ordering::Relaxed);
        let head = self.header.head.load(Ordering::Acquire);
        if self.capacity - used(head, tail, self.capacity) <= len {
            return Err(WouldOverflow);
        }

        // At most two copies: up to the wrap boundary, then the remainder
        // from offset 0.
        let first = len.min(self.capacity - tail);
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.payload.as_ptr().add(tail as usize),
                first as usize,
            );
            if len > first {
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr().add(first as usize),
                    self.payload.as_ptr(),
                    (len - first) as usize,
                );
            }
        }

        if self.flags & FLAG_FENCE != 0 {
            fence(Ordering::SeqCst);
        }

        self.header
            .tail
            .store(self.advance(tail, len), Ordering::Release);
        Ok(())
    }

    /// Copy exactly `out.len()` bytes out of the ring.
    ///
    /// Rejects with [`WouldUnderflow`], touching nothing, if fewer bytes are
    /// buffered. Zero-length pops trivially succeed.
    pub fn pop(&self, out: &mut [u8]) -> Result<(), WouldUnderflow> {
        if out.is_empty() {
            return Ok(());
        }
        if out.len() >= self.capacity as usize {
            return Err(WouldUnderflow);
        }
        let len = out.len() as u32;

        let _guard = self.maybe_lock();

        // head is owned by this side; tail is the other side's index.
        let head = self.header.head.load(Ordering::Relaxed);
        let tail = self.header.tail.load(Ordering::Acquire);
        if used(head, tail, self.capacity) < len {
            return Err(WouldUnderflow);
        }

        let first = len.min(self.capacity - head);
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.payload.as_ptr().add(head as usize),
                out.as_mut_ptr(),
                first as usize,
            );
            if len > first {
                std::ptr::copy_nonoverlapping(
                    self.payload.as_ptr(),
                    out.as_mut_ptr().add(first as usize),
                    (len - first) as usize,
                );
            }
        }

        if self.flags & FLAG_FENCE != 0 {
            fence(Ordering::SeqCst);
        }

        self.header
            .head
            .store(self.advance(head, len), Ordering::Release);
        Ok(())
    }

    fn advance(&self, index: u32, len: u32) -> u32 {
        if self.flags & FLAG_POW2 != 0 {
            (index + len) & (self.capacity - 1)
        } else {
            (index + len) % self.capacity
        }
    }

    fn maybe_lock(&self) -> Option<SpinGuard<'_>> {
        if self.flags & FLAG_SPINLOCK != 0 {
            Some(self.header.lock.lock())
        } else {
            None
        }
    }
}

/// Wraparound-aware occupancy. Indices never reach `capacity`, and a push is
/// only admitted while it leaves slack, so `used` is always in
/// `[0, capacity - 1]`.
fn used(head: u32, tail: u32, capacity: u32) -> u32 {
    if head <= tail {
        tail - head
    } else {
        capacity - (head - tail)
    }
}
