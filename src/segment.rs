// src/segment.rs

use std::ffi::CString;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::error::SegmentError;
use crate::layout::{HEADER_SIZE, MAGIC, RingHeader, SHM_NAME_LEN};
use crate::ring::{RingBuffer, RingConfig};

/// How long an attach waits for the owner to create, size, and publish the
/// segment before giving up.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which side of the segment lifecycle this process plays.
///
/// Exactly one logical owner creates and later unlinks the segment; any
/// number of peers attach and detach without ever unlinking. Roles are
/// explicit parameters of the API, never inferred from process identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Peer,
}

/// A mapped view of a named shared-memory ring segment.
///
/// Dropping a `Segment` unmaps it from this address space only; other
/// processes' views are unaffected. Removing the name from the OS namespace
/// is the explicit owner act [`Segment::destroy`], never implicit, so a
/// crashing peer cannot tear the segment down under the owner.
#[derive(Debug)]
pub struct Segment {
    ptr: NonNull<u8>,
    len: usize,
    role: Role,
}

// Safety: Segment is a shared mapping; all cross-view mutation goes through
// the atomics in the header.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create the named segment, size it for `header + capacity` payload
    /// bytes, and initialize the header. Owner role.
    ///
    /// The magic word is published last, with release ordering; peers block
    /// in [`Segment::attach`] until they observe it, which replaces any
    /// sleep-based startup ordering. If a stale object with this name
    /// survives from a crashed run it is re-initialized from scratch.
    pub fn create(name: &str, payload_capacity: u32, config: RingConfig) -> Result<Self, SegmentError> {
        let capacity = config.resolve_capacity(payload_capacity)?;
        let c_name = c_name(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600) };
        if fd < 0 {
            return Err(SegmentError::Open(io::Error::last_os_error()));
        }

        let len = HEADER_SIZE + capacity as usize;
        if unsafe { libc::ftruncate(fd, len as libc::off_t) } < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(fd) };
            return Err(SegmentError::Resize(err));
        }

        let ptr = map(fd, len)?;
        // The mapping keeps the object alive; the fd is not needed again.
        unsafe { libc::close(fd) };

        let header = ptr.as_ptr() as *mut RingHeader;
        unsafe {
            // Invalidate first in case this name survived a crashed owner.
            (*header).magic.store(0, Ordering::Relaxed);

            let name_field = &mut (*header).name;
            *name_field = [0; SHM_NAME_LEN];
            name_field[..name.len()].copy_from_slice(name.as_bytes());
            (*header).capacity = capacity;
            (*header).flags = config.to_flags();
            (*header).head.store(0, Ordering::Relaxed);
            (*header).tail.store(0, Ordering::Relaxed);
            (*header).lock.init();

            // Publish: peers spin on this load before touching anything else.
            (*header).magic.store(MAGIC, Ordering::Release);
        }

        tracing::debug!(name, capacity, flags = config.to_flags(), "created ring segment");
        Ok(Segment {
            ptr,
            len,
            role: Role::Owner,
        })
    }

    /// Attach to a segment some owner has created (or is about to create).
    /// Peer role.
    ///
    /// Waits, bounded by [`HANDSHAKE_TIMEOUT`], through the three stages an
    /// owner goes through: the name exists, the object has its final size,
    /// the magic is published. Attaching never resets header fields; the
    /// ring modes are read from the header, not passed in.
    pub fn attach(name: &str) -> Result<Self, SegmentError> {
        let c_name = c_name(name)?;
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;

        let fd = loop {
            let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
            if fd >= 0 {
                break fd;
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(SegmentError::Open(err));
            }
            if Instant::now() >= deadline {
                return Err(SegmentError::HandshakeTimedOut);
            }
            std::thread::yield_now();
        };

        // The owner's ftruncate is a single call, so once the object is at
        // least header-sized it has its final size.
        let len = loop {
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            if unsafe { libc::fstat(fd, &mut st) } < 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(SegmentError::Open(err));
            }
            let size = st.st_size as usize;
            if size >= HEADER_SIZE {
                break size;
            }
            if Instant::now() >= deadline {
                unsafe { libc::close(fd) };
                return Err(SegmentError::HandshakeTimedOut);
            }
            std::thread::yield_now();
        };

        let ptr = map(fd, len)?;
        unsafe { libc::close(fd) };

        let header = unsafe { &*(ptr.as_ptr() as *const RingHeader) };
        loop {
            let magic = header.magic.load(Ordering::Acquire);
            if magic == MAGIC {
                break;
            }
            if Instant::now() >= deadline {
                let err = if magic == 0 {
                    SegmentError::HandshakeTimedOut
                } else {
                    SegmentError::BadMagic(magic)
                };
                unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
                return Err(err);
            }
            std::hint::spin_loop();
        }

        // Fail loudly if the header's claimed capacity extends past the
        // mapping (stale name truncated by a racing re-create): pushing
        // through such a view would fault instead of erroring.
        if HEADER_SIZE + header.capacity as usize > len {
            let capacity = header.capacity;
            unsafe { libc::munmap(ptr.as_ptr().cast(), len) };
            return Err(SegmentError::InvalidCapacity(capacity));
        }
        tracing::debug!(name, capacity = header.capacity, "attached to ring segment");
        Ok(Segment {
            ptr,
            len,
            role: Role::Peer,
        })
    }

    /// Role-dispatching convenience: owner creates, peer attaches. Peers
    /// ignore `payload_capacity` and `config`; the authoritative values
    /// live in the header the owner wrote.
    pub fn create_or_attach(
        name: &str,
        payload_capacity: u32,
        config: RingConfig,
        role: Role,
    ) -> Result<Self, SegmentError> {
        match role {
            Role::Owner => Self::create(name, payload_capacity, config),
            Role::Peer => Self::attach(name),
        }
    }

    /// The role this view was opened with.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The header at the start of the mapping.
    pub fn header(&self) -> &RingHeader {
        unsafe { &*(self.ptr.as_ptr() as *const RingHeader) }
    }

    /// A ring buffer view over this mapping.
    pub fn ring(&self) -> RingBuffer<'_> {
        unsafe {
            RingBuffer::from_raw(
                self.header(),
                NonNull::new_unchecked(self.ptr.as_ptr().add(HEADER_SIZE)),
            )
        }
    }

    /// Unmap this view; if this process is the owner, also remove the name
    /// from the OS namespace so no future process can attach.
    ///
    /// Unlinking does not disturb peers that are still mapped; their views
    /// stay valid until they detach. After the owner's destroy, creating the
    /// same name again is a fresh creation with zeroed indices.
    pub fn destroy(self) -> Result<(), SegmentError> {
        let role = self.role;
        // Teardown by the name stored in-segment, read before unmapping.
        let name = self.header().name_str().to_owned();
        let (ptr, len) = (self.ptr, self.len);
        std::mem::forget(self);

        if unsafe { libc::munmap(ptr.as_ptr().cast(), len) } < 0 {
            return Err(SegmentError::Unmap(io::Error::last_os_error()));
        }

        if role == Role::Owner {
            let c_name = c_name(&name)?;
            if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
                return Err(SegmentError::Unlink(io::Error::last_os_error()));
            }
            tracing::debug!(name = %name, "unlinked ring segment");
        } else {
            tracing::debug!(name = %name, "detached from ring segment");
        }
        Ok(())
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Detach only. The name outlives this view unless the owner calls
        // destroy() explicitly.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

fn c_name(name: &str) -> Result<CString, SegmentError> {
    if name.is_empty() || name.len() >= SHM_NAME_LEN {
        return Err(SegmentError::InvalidName);
    }
    CString::new(name).map_err(|_| SegmentError::InvalidName)
}

fn map(fd: libc::c_int, len: usize) -> Result<NonNull<u8>, SegmentError> {
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        let err = io::Error::last_os_error();
        unsafe { libc::close(fd) };
        return Err(SegmentError::Map(err));
    }
    Ok(NonNull::new(ptr as *mut u8).unwrap())
}
