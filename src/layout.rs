// src/layout.rs

use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::spinlock::SpinLock;

/// Magic number for segment validation. Doubles as a layout version tag:
/// bump the trailing digit if the header layout ever changes.
pub const MAGIC: u64 = u64::from_le_bytes(*b"SHMRING1");

/// Fixed length of the segment name stored in the header, including the
/// NUL padding. Names must be shorter than this.
pub const SHM_NAME_LEN: usize = 60;

/// Size of the header in bytes. The payload region starts at this offset.
pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeader>();

/// Header flag: push/pop take the in-segment spin-lock.
pub const FLAG_SPINLOCK: u32 = 1 << 0;

/// Header flag: capacity is a power of two, index advance uses a mask.
pub const FLAG_POW2: u32 = 1 << 1;

/// Header flag: a full fence is issued between the payload copy and the
/// index publication on both push and pop.
pub const FLAG_FENCE: u32 = 1 << 2;

/// Ring buffer header. Lives at offset 0 of the shared segment; the payload
/// bytes follow immediately after.
///
/// `head` is mutated only by the consuming side, `tail` only by the producing
/// side. `capacity`, `flags`, and `name` are written once by the owner before
/// `magic` is published and are read-only afterwards.
#[repr(C, align(64))]
pub struct RingHeader {
    /// Segment name, NUL-padded. Kept in-segment so teardown can unlink by
    /// name without out-of-band state.
    pub name: [u8; SHM_NAME_LEN],
    /// Next byte to read. Always in `[0, capacity)`.
    pub head: AtomicU32,
    /// Next byte to write. Always in `[0, capacity)`.
    pub tail: AtomicU32,
    /// Total payload bytes. Fixed at creation.
    pub capacity: u32,
    /// Mode bits (FLAG_*). Fixed at creation.
    pub flags: u32,
    /// Cross-process mutual exclusion word (FLAG_SPINLOCK mode only).
    pub lock: SpinLock,
    _pad: [u8; 40],
    /// Published last by the owner, with release ordering. A peer must not
    /// read any other field until it observes MAGIC here.
    pub magic: AtomicU64,
}

impl RingHeader {
    /// Construct a zeroed header value. Only used by in-process test
    /// harnesses; real headers are initialized in place inside a mapping.
    pub fn zeroed() -> Self {
        RingHeader {
            name: [0; SHM_NAME_LEN],
            head: AtomicU32::new(0),
            tail: AtomicU32::new(0),
            capacity: 0,
            flags: 0,
            lock: SpinLock::new(),
            _pad: [0; 40],
            magic: AtomicU64::new(0),
        }
    }

    /// The segment name with NUL padding stripped.
    pub fn name_str(&self) -> &str {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(SHM_NAME_LEN);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

// Compile-time layout checks. The header is exactly two cache lines and the
// atomics land on naturally aligned offsets.
const _: () = {
    assert!(std::mem::size_of::<RingHeader>() == 128);
    assert!(std::mem::align_of::<RingHeader>() == 64);
    assert!(std::mem::offset_of!(RingHeader, head) == 60);
    assert!(std::mem::offset_of!(RingHeader, tail) == 64);
    assert!(std::mem::offset_of!(RingHeader, magic) % 8 == 0);
};
