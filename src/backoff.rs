// src/backoff.rs

use crate::error::{WouldOverflow, WouldUnderflow};
use crate::ring::RingBuffer;

/// Spin counts before escalating. Doubling spins up to 2^SPIN_LIMIT, then
/// yields to the scheduler.
const SPIN_LIMIT: u32 = 6;

/// Bounded backoff for callers retrying a rejected push or pop.
///
/// The core is deliberately non-blocking (backpressure is the caller
/// re-issuing the call); this is the optional layer above it for callers
/// that prefer not to burn a core at full speed.
pub struct Backoff {
    step: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Backoff { step: 0 }
    }

    /// Wait a little, escalating from busy spins to scheduler yields.
    pub fn snooze(&mut self) {
        if self.step <= SPIN_LIMIT {
            for _ in 0..(1 << self.step) {
                std::hint::spin_loop();
            }
            self.step += 1;
        } else {
            std::thread::yield_now();
        }
    }

    /// Back to the cheapest wait. Call after a successful operation.
    pub fn reset(&mut self) {
        self.step = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry a push with backoff until it succeeds or `max_attempts` rejections
/// have been absorbed. `None` retries forever.
pub fn push_with_retry(
    ring: &RingBuffer<'_>,
    bytes: &[u8],
    max_attempts: Option<u64>,
) -> Result<(), WouldOverflow> {
    let mut backoff = Backoff::new();
    let mut attempts = 0u64;
    loop {
        match ring.push(bytes) {
            Ok(()) => return Ok(()),
            Err(WouldOverflow) => {
                attempts += 1;
                if let Some(max) = max_attempts {
                    if attempts >= max {
                        return Err(WouldOverflow);
                    }
                }
                backoff.snooze();
            }
        }
    }
}

/// Retry a pop with backoff until it succeeds or `max_attempts` rejections
/// have been absorbed. `None` retries forever.
pub fn pop_with_retry(
    ring: &RingBuffer<'_>,
    out: &mut [u8],
    max_attempts: Option<u64>,
) -> Result<(), WouldUnderflow> {
    let mut backoff = Backoff::new();
    let mut attempts = 0u64;
    loop {
        match ring.pop(out) {
            Ok(()) => return Ok(()),
            Err(WouldUnderflow) => {
                attempts += 1;
                if let Some(max) = max_attempts {
                    if attempts >= max {
                        return Err(WouldUnderflow);
                    }
                }
                backoff.snooze();
            }
        }
    }
}
