use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::AtomicU32;

use super::layout::{FBOX_ALIGNMENT, HEADER_SIZE};
use super::Buffer::FboxBuffer;
use super::Header::HeaderSlot;

impl FboxBuffer {
    /// Create a view over an existing fast box.
    ///
    /// # Safety
    /// `base` must point to `size` bytes of memory that stays mapped for the
    /// lifetime of the view and every copy of it, aligned to `FBOX_ALIGNMENT`.
    pub unsafe fn new(base: NonNull<u8>, size: u32) -> Self {
        debug_assert_eq!(base.as_ptr() as usize % FBOX_ALIGNMENT as usize, 0);
        debug_assert!(size >= 2 * FBOX_ALIGNMENT);
        Self { base, size }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// The consumer's published read cursor at offset 0.
    #[inline]
    pub fn cursor_word(&self) -> &AtomicU32 {
        unsafe { &*(self.base.as_ptr() as *const AtomicU32) }
    }

    /// Header at byte `offset`. `offset` is a multiple of 8 and leaves room
    /// for a full header.
    #[inline]
    pub fn header(&self, offset: u32) -> &HeaderSlot {
        debug_assert!(offset % 8 == 0 && offset + HEADER_SIZE <= self.size);
        unsafe { &*(self.base.as_ptr().add(offset as usize) as *const HeaderSlot) }
    }

    /// Copy `src` into the box at `offset`.
    ///
    /// # Safety
    /// `offset + src.len()` must not exceed the box size and no reader may be
    /// entitled to the destination bytes.
    #[inline]
    pub unsafe fn write_bytes(&self, offset: u32, src: &[u8]) {
        debug_assert!(offset as usize + src.len() <= self.size as usize);
        ptr::copy_nonoverlapping(src.as_ptr(), self.base.as_ptr().add(offset as usize), src.len());
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// # Safety
    /// The range must be inside the box and the writer must not modify it for
    /// the lifetime of the returned slice.
    #[inline]
    pub unsafe fn bytes(&self, offset: u32, len: u32) -> &[u8] {
        debug_assert!(offset as u64 + len as u64 <= self.size as u64);
        slice::from_raw_parts(self.base.as_ptr().add(offset as usize), len as usize)
    }

    /// Snapshot `dst.len()` bytes at `offset`. The writer may be overwriting
    /// the same bytes concurrently; the snapshot can then be torn.
    ///
    /// # Safety
    /// The range must be inside the box.
    #[inline]
    pub unsafe fn copy_out(&self, offset: u32, dst: &mut [u8]) {
        debug_assert!(offset as usize + dst.len() <= self.size as usize);
        ptr::copy_nonoverlapping(self.base.as_ptr().add(offset as usize), dst.as_mut_ptr(), dst.len());
    }

    /// Zero the whole box. Only the owning writer calls this, before the box
    /// is announced to the peer.
    pub fn zero(&self) {
        unsafe { ptr::write_bytes(self.base.as_ptr(), 0, self.size as usize) };
    }
}
