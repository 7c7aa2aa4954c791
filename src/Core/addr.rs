// Relocatable addresses: a pointer into shared memory expressed as
// (segment id, byte offset) so it means the same thing in every process
// that maps the segment, wherever the mapping landed.

use parking_lot::RwLock;
use std::fmt;

/// Packed `segment << 32 | offset`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RelativeAddr(pub u64);

impl RelativeAddr {
    pub const fn new(segment: u32, offset: u32) -> Self {
        Self(((segment as u64) << 32) | offset as u64)
    }

    pub const fn segment(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    pub const fn to_bits(self) -> u64 {
        self.0
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for RelativeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RelativeAddr({}:{:#x})", self.segment(), self.offset())
    }
}

/// Conversion between process-local pointers and relocatable addresses.
pub trait AddressTranslator: Send + Sync {
    /// `None` when `local` is not inside any known segment.
    fn to_relocatable(&self, local: *const u8) -> Option<RelativeAddr>;

    /// `None` when the segment is unknown or the offset is out of range.
    fn to_local(&self, addr: RelativeAddr) -> Option<*mut u8>;
}

#[derive(Debug, Clone, Copy)]
struct SegmentEntry {
    id: u32,
    base: usize,
    size: usize,
}

/// Table of segments mapped into this process, keyed by segment id.
#[derive(Default)]
pub struct SegmentTable {
    segments: RwLock<Vec<SegmentEntry>>,
}

impl SegmentTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where segment `id` is mapped locally. Re-registering an id
    /// replaces the previous mapping.
    pub fn register(&self, id: u32, base: *const u8, size: usize) {
        let mut segments = self.segments.write();
        segments.retain(|s| s.id != id);
        segments.push(SegmentEntry {
            id,
            base: base as usize,
            size,
        });
    }

    pub fn unregister(&self, id: u32) -> bool {
        let mut segments = self.segments.write();
        let before = segments.len();
        segments.retain(|s| s.id != id);
        segments.len() != before
    }

    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.read().is_empty()
    }
}

impl AddressTranslator for SegmentTable {
    fn to_relocatable(&self, local: *const u8) -> Option<RelativeAddr> {
        let addr = local as usize;
        self.segments
            .read()
            .iter()
            .find(|s| addr >= s.base && addr < s.base + s.size)
            .and_then(|s| u32::try_from(addr - s.base).ok().map(|off| RelativeAddr::new(s.id, off)))
    }

    fn to_local(&self, addr: RelativeAddr) -> Option<*mut u8> {
        self.segments
            .read()
            .iter()
            .find(|s| s.id == addr.segment())
            .filter(|s| (addr.offset() as usize) < s.size)
            .map(|s| (s.base + addr.offset() as usize) as *mut u8)
    }
}

impl fmt::Debug for SegmentTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_segment_table(self.segments.read().iter().map(|s| (s.id, s.base, s.size)), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_segment_and_offset() {
        let addr = RelativeAddr::new(7, 0x1234);
        assert_eq!(addr.segment(), 7);
        assert_eq!(addr.offset(), 0x1234);
        assert_eq!(addr.to_bits(), (7u64 << 32) | 0x1234);
    }

    #[test]
    fn translates_both_ways() {
        let backing = vec![0u8; 256];
        let table = SegmentTable::new();
        table.register(3, backing.as_ptr(), backing.len());

        let inner = unsafe { backing.as_ptr().add(96) };
        let rel = table.to_relocatable(inner).expect("inside segment");
        assert_eq!(rel, RelativeAddr::new(3, 96));
        assert_eq!(table.to_local(rel), Some(inner as *mut u8));

        assert!(table.to_local(RelativeAddr::new(3, 256)).is_none());
        assert!(table.to_local(RelativeAddr::new(4, 0)).is_none());
        assert!(table.to_relocatable(unsafe { backing.as_ptr().add(256) }).is_none());

        assert!(table.unregister(3));
        assert!(table.to_local(rel).is_none());
        assert!(table.is_empty());
    }
}
