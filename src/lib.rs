pub mod backoff;
pub mod error;
pub mod layout;
pub mod ring;
pub mod segment;
pub mod spinlock;

pub use backoff::{Backoff, pop_with_retry, push_with_retry};
pub use error::{SegmentError, WouldOverflow, WouldUnderflow};
pub use layout::{HEADER_SIZE, RingHeader, SHM_NAME_LEN};
pub use ring::{IndexMode, RingBuffer, RingConfig, SyncMode};
pub use segment::{HANDSHAKE_TIMEOUT, Role, Segment};
pub use spinlock::{SpinGuard, SpinLock};

#[cfg(test)]
mod proptests;
