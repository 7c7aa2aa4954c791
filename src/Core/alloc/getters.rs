use super::*;

/// Read-only accessors for ShmFboxPool
///
/// These are for monitoring and for handing the segment to an address
/// translator; none of them touch the free list except the counters.
impl ShmFboxPool {
    /// Get a reference to the underlying shared memory backend
    pub fn shm(&self) -> &dyn SharedMemoryBackend {
        &*self.shm
    }

    /// Get the raw pointer to the PoolHeader
    pub fn header_ptr(&self) -> *const PoolHeader {
        self.header
    }

    /// Id this segment is registered under for relocatable addressing
    pub fn segment_id(&self) -> u32 {
        self.segment_id
    }

    /// Number of blocks carved out of the segment
    pub fn total_blocks(&self) -> u32 {
        self.block_count
    }

    /// Number of blocks currently available to `acquire`
    pub fn free_blocks(&self) -> u32 {
        self.free.lock().len() as u32
    }

    /// Check the magic number in the header
    pub fn is_initialized(&self) -> bool {
        // Safety: the header pointer is valid for the lifetime of the pool
        unsafe { !self.header.is_null() && (*self.header).magic == super::MAGIC_NUMBER }
    }
}
