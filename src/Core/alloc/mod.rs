use crate::Core::SharedMemory::{SharedMemoryBackend, SEGMENT_ALIGNMENT};
use crate::FBox::Buffer::layout::FBOX_ALIGNMENT;
use crossbeam_utils::CachePadded;
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, Ordering};
mod debug;
mod getters;

// Use parking_lot's Mutex for better performance
use parking_lot::Mutex;

const MAGIC_NUMBER: u64 = 0x464258505F504F4C; // "FBXP_POL"
const LAYOUT_VERSION: u32 = 1;

/// Header written at the start of a pool segment so a peer mapping the same
/// segment can check what it is looking at.
#[repr(C, align(128))]
pub struct PoolHeader {
    pub magic: u64,
    pub version: u32,
    /// Size of one fast box in bytes.
    pub block_size: u32,
    /// Number of fast boxes carved out of the segment.
    pub block_count: u32,
    pub reserved: u32,
}

/// One fixed-size fast-box block handed out by a pool.
///
/// Not `Clone`: a block is owned by exactly one endpoint until released.
pub struct FboxBlock {
    ptr: NonNull<u8>,
    index: u32,
    size: u32,
}

unsafe impl Send for FboxBlock {}

impl FboxBlock {
    /// Wrap memory the caller manages itself.
    ///
    /// # Safety
    /// `ptr` must be valid for `size` bytes, aligned to `FBOX_ALIGNMENT`, and
    /// stay mapped for as long as any fast box built from this block exists.
    pub unsafe fn from_raw(ptr: NonNull<u8>, index: u32, size: u32) -> Self {
        Self { ptr, index, size }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn size(&self) -> u32 {
        self.size
    }
}

/// Source of fast-box memory.
pub trait FboxPool: Send + Sync {
    /// Hand out one block, or `None` when the pool is exhausted.
    fn acquire(&self) -> Option<FboxBlock>;

    /// Return a block previously obtained from `acquire`.
    fn release(&self, block: FboxBlock);

    /// Size of every block this pool hands out.
    fn block_size(&self) -> u32;
}

/// Count of fast boxes a peer is still willing to accept from us.
///
/// `#[repr(C)]` so it can live in the peer's shared control area; the
/// in-process tests keep it behind an `Arc`.
#[repr(C)]
pub struct PeerCredits {
    available: CachePadded<AtomicI32>,
}

impl PeerCredits {
    pub fn new(available: i32) -> Self {
        Self {
            available: CachePadded::new(AtomicI32::new(available)),
        }
    }

    /// Take one credit. Undoes the decrement and returns false when the peer
    /// is saturated.
    pub fn try_take(&self) -> bool {
        if self.available.fetch_sub(1, Ordering::AcqRel) - 1 >= 0 {
            true
        } else {
            self.available.fetch_add(1, Ordering::AcqRel);
            false
        }
    }

    pub fn give_back(&self) {
        self.available.fetch_add(1, Ordering::AcqRel);
    }

    pub fn available(&self) -> i32 {
        self.available.load(Ordering::Acquire)
    }
}

/// Fixed-size block pool carved out of one shared memory segment.
pub struct ShmFboxPool {
    shm: Box<dyn SharedMemoryBackend>,
    header: *mut PoolHeader,
    segment_id: u32,
    block_size: u32,
    block_count: u32,
    blocks_offset: usize,
    free: Mutex<Vec<u32>>, // free block indices, lowest index on top
}

impl ShmFboxPool {
    /// Offset of the first block from the segment base.
    pub fn blocks_offset() -> usize {
        let header = std::mem::size_of::<PoolHeader>();
        (header + SEGMENT_ALIGNMENT - 1) & !(SEGMENT_ALIGNMENT - 1)
    }

    /// Segment bytes needed for `count` blocks of `block_size`.
    pub fn required_size(block_size: u32, count: u32) -> usize {
        Self::blocks_offset() + block_size as usize * count as usize
    }

    /// Lay a pool over `shm`, taking as many blocks as fit (at most `max_blocks`).
    pub fn new(
        shm: Box<dyn SharedMemoryBackend>,
        segment_id: u32,
        block_size: u32,
        max_blocks: u32,
    ) -> io::Result<Self> {
        if block_size == 0 || block_size as usize % FBOX_ALIGNMENT as usize != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "ShmFboxPool::new(): block size {} is not a non-zero multiple of {}",
                    block_size, FBOX_ALIGNMENT
                ),
            ));
        }

        let blocks_offset = Self::blocks_offset();
        if shm.size() < blocks_offset + block_size as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "ShmFboxPool::new(): segment too small for one block.\n\
                    ├─ Segment size: {}\n\
                    ├─ Header size:  {}\n\
                    ╰─ Block size:   {}",
                    shm.size(),
                    blocks_offset,
                    block_size
                ),
            ));
        }

        let header_ptr = shm.as_ptr() as *mut PoolHeader;
        if (header_ptr as usize) % SEGMENT_ALIGNMENT != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Shared memory not properly aligned",
            ));
        }

        let fit = ((shm.size() - blocks_offset) / block_size as usize).min(u32::MAX as usize) as u32;
        let block_count = fit.min(max_blocks);

        unsafe {
            std::ptr::write(
                header_ptr,
                PoolHeader {
                    magic: MAGIC_NUMBER,
                    version: LAYOUT_VERSION,
                    block_size,
                    block_count,
                    reserved: 0,
                },
            );
        }

        Ok(Self {
            shm,
            header: header_ptr,
            segment_id,
            block_size,
            block_count,
            blocks_offset,
            free: Mutex::new((0..block_count).rev().collect()),
        })
    }

    /// Check the header of a segment created by a peer and return
    /// `(block_size, block_count)`.
    pub fn verify_segment(shm: &dyn SharedMemoryBackend) -> io::Result<(u32, u32)> {
        if shm.size() < std::mem::size_of::<PoolHeader>() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Shared memory too small for pool header",
            ));
        }

        let header = unsafe { &*(shm.as_ptr() as *const PoolHeader) };
        if header.magic != MAGIC_NUMBER {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "Invalid magic number - segment does not hold a fast-box pool",
            ));
        }
        if header.version != LAYOUT_VERSION {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unsupported pool layout version {}", header.version),
            ));
        }

        Ok((header.block_size, header.block_count))
    }

    fn block_ptr(&self, index: u32) -> NonNull<u8> {
        let offset = self.blocks_offset + index as usize * self.block_size as usize;
        // in bounds: index < block_count, checked at construction
        unsafe { NonNull::new_unchecked(self.shm.as_ptr().add(offset)) }
    }
}

impl FboxPool for ShmFboxPool {
    fn acquire(&self) -> Option<FboxBlock> {
        let index = self.free.lock().pop()?;
        Some(FboxBlock {
            ptr: self.block_ptr(index),
            index,
            size: self.block_size,
        })
    }

    fn release(&self, block: FboxBlock) {
        debug_assert_eq!(block.ptr, self.block_ptr(block.index));
        let mut free = self.free.lock();
        debug_assert!(!free.contains(&block.index), "fast box released twice");
        free.push(block.index);
    }

    fn block_size(&self) -> u32 {
        self.block_size
    }
}

// Implement Send + Sync since the free list is behind a mutex and the header
// is only written during construction.
unsafe impl Send for ShmFboxPool {}
unsafe impl Sync for ShmFboxPool {}
