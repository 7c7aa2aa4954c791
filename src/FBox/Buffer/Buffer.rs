// View over one fast box mapped into this process.

use std::ptr::NonNull;

/// A fast box: `size` bytes of shared memory starting at `base`.
///
/// This struct is NOT stored in shared memory. It is a transient view that the
/// owning writer (sender process) or reader (receiver process) keeps next to
/// its private cursors.
///
/// ### Layout
/// - bytes `0..4`: consumer-published read cursor (reliable policy)
/// - bytes `4..32`: reserved
/// - bytes `32..size`: records or fixed slots, each starting with a header
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FboxBuffer {
    /// Start of the fast box, aligned to `FBOX_ALIGNMENT`.
    pub(crate) base: NonNull<u8>,

    /// Total size in bytes, including the reserved prefix.
    pub(crate) size: u32,
}

unsafe impl Send for FboxBuffer {}
unsafe impl Sync for FboxBuffer {}
