// src/error.rs

use std::fmt;
use std::io;

/// Fatal segment-lifecycle failures.
///
/// These indicate an unrecoverable environment problem (permissions, OS
/// resource limits, a peer that never showed up). The manager does not
/// retry and leaves no partial state attached.
#[derive(Debug)]
pub enum SegmentError {
    /// `shm_open` failed.
    Open(io::Error),
    /// `ftruncate` to the segment size failed.
    Resize(io::Error),
    /// `mmap` failed.
    Map(io::Error),
    /// `munmap` failed.
    Unmap(io::Error),
    /// `shm_unlink` failed.
    Unlink(io::Error),
    /// The owner never published a valid header within the attach deadline.
    HandshakeTimedOut,
    /// The segment header carries an unknown magic/version word.
    BadMagic(u64),
    /// Requested payload capacity is zero or exceeds the supported maximum.
    InvalidCapacity(u32),
    /// Segment name is empty, contains NUL, or does not fit the header field.
    InvalidName,
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::Open(e) => write!(f, "shm_open failed: {}", e),
            SegmentError::Resize(e) => write!(f, "ftruncate failed: {}", e),
            SegmentError::Map(e) => write!(f, "mmap failed: {}", e),
            SegmentError::Unmap(e) => write!(f, "munmap failed: {}", e),
            SegmentError::Unlink(e) => write!(f, "shm_unlink failed: {}", e),
            SegmentError::HandshakeTimedOut => {
                write!(f, "timed out waiting for the owner to publish the segment")
            }
            SegmentError::BadMagic(v) => {
                write!(f, "segment has unknown magic {:#018x}", v)
            }
            SegmentError::InvalidCapacity(c) => {
                write!(f, "invalid payload capacity {}", c)
            }
            SegmentError::InvalidName => write!(f, "invalid segment name"),
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SegmentError::Open(e)
            | SegmentError::Resize(e)
            | SegmentError::Map(e)
            | SegmentError::Unmap(e)
            | SegmentError::Unlink(e) => Some(e),
            _ => None,
        }
    }
}

/// A push was rejected because it would leave less than one byte of slack.
///
/// Not a failure: the expected steady-state signal under backpressure. The
/// rejected push performed zero mutation; retry after the consumer drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldOverflow;

/// A pop was rejected because fewer bytes than requested are buffered.
///
/// Like [`WouldOverflow`], a retry signal rather than an error. The rejected
/// pop performed zero mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WouldUnderflow;

impl fmt::Display for WouldOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring buffer has insufficient free space")
    }
}

impl fmt::Display for WouldUnderflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring buffer has insufficient buffered data")
    }
}
