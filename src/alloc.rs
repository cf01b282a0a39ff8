//! Aligned buffer allocation and the per-handle free list.
//!
//! Transform buffers must start on a cache-line boundary so that the
//! SIMD engines can use aligned loads. Freed buffers of the right size
//! are cached on a small per-handle free list instead of going back to
//! the OS on every [`Residue`] drop.
//!
//! [`Residue`]: crate::Residue

use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    ops::{Deref, DerefMut},
};

use parking_lot::Mutex;

use crate::Error;

// ======================================================================
// CONST - CRATE

/// Alignment of all transform buffers, in bytes.
pub(crate) const BUFFER_ALIGN: usize = 64;

// Freed buffers beyond this many are really freed.
const FREE_LIST_MAX: usize = 16;

// ======================================================================
// AlignedAllocator - CRATE

/// Source of aligned allocations.
///
/// The large-pages path of the original design is a platform concern;
/// this trait is the seam where such an implementation would plug in.
pub(crate) trait AlignedAllocator: Send + Sync {
    fn alloc_f64(&self, len: usize) -> Result<AlignedBuf, Error>;
}

// ======================================================================
// SystemAligned - CRATE

/// Default allocator: `std::alloc` with explicit cache-line alignment.
pub(crate) struct SystemAligned;

impl AlignedAllocator for SystemAligned {
    fn alloc_f64(&self, len: usize) -> Result<AlignedBuf, Error> {
        AlignedBuf::new(len)
    }
}

// ======================================================================
// AlignedBuf - CRATE

/// Owned, zero-initialized, 64-byte-aligned `f64` buffer.
pub(crate) struct AlignedBuf {
    ptr: *mut f64,
    len: usize,
}

// The buffer is plain memory owned by this struct.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl AlignedBuf {
    pub(crate) fn new(len: usize) -> Result<Self, Error> {
        let bytes = len
            .checked_mul(std::mem::size_of::<f64>())
            .ok_or(Error::Malloc { bytes: usize::MAX })?;
        let layout = Layout::from_size_align(bytes.max(BUFFER_ALIGN), BUFFER_ALIGN)
            .map_err(|_| Error::Malloc { bytes })?;

        // SAFETY: layout has non-zero size and valid alignment.
        let ptr = unsafe { alloc_zeroed(layout) } as *mut f64;
        if ptr.is_null() {
            return Err(Error::Malloc { bytes });
        }

        Ok(Self { ptr, len })
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn zero(&mut self) {
        self.fill(0.0);
    }
}

impl Deref for AlignedBuf {
    type Target = [f64];
    fn deref(&self) -> &[f64] {
        // SAFETY: `ptr` is valid for `len` f64:s for the lifetime of self.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [f64] {
        // SAFETY: as above, and we have exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        let bytes = self.len * std::mem::size_of::<f64>();
        let layout = Layout::from_size_align(bytes.max(BUFFER_ALIGN), BUFFER_ALIGN).unwrap();
        // SAFETY: `ptr` was allocated with this exact layout.
        unsafe { dealloc(self.ptr as *mut u8, layout) };
    }
}

// ======================================================================
// BufferPool - CRATE

/// Free list of transform buffers, shared by a handle and its clones.
pub(crate) struct BufferPool {
    buffer_len: usize,
    free: Mutex<Vec<AlignedBuf>>,
    allocator: SystemAligned,
}

impl BufferPool {
    pub(crate) fn new(buffer_len: usize) -> Self {
        Self {
            buffer_len,
            free: Mutex::new(Vec::new()),
            allocator: SystemAligned,
        }
    }

    pub(crate) fn buffer_len(&self) -> usize {
        self.buffer_len
    }

    /// Takes a zeroed buffer from the free list, or allocates a new one.
    pub(crate) fn take(&self) -> Result<AlignedBuf, Error> {
        if let Some(mut buf) = self.free.lock().pop() {
            buf.zero();
            return Ok(buf);
        }
        self.allocator.alloc_f64(self.buffer_len)
    }

    /// Returns a buffer to the free list, really freeing it if the list
    /// is full or the buffer has the wrong size.
    pub(crate) fn put(&self, buf: AlignedBuf) {
        if buf.len() != self.buffer_len {
            return;
        }
        let mut free = self.free.lock();
        if free.len() < FREE_LIST_MAX {
            free.push(buf);
        }
    }

    /// Drops all cached buffers.
    pub(crate) fn clear(&self) {
        self.free.lock().clear();
    }
}

// ======================================================================
// TESTS
