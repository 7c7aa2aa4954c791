// Fast-box message header: {size: u32, tag: u16, seq: u16} in 8 bytes.
//
// tag and seq share one 32-bit word so that on any platform they are loaded
// and stored together; size sits in the other word. A producer writes size
// before the tag/seq word, and clears tag/seq before touching size, so a
// reader that sees a valid tag/seq also sees the size written with it.

use std::sync::atomic::{fence, AtomicU32, Ordering};

use super::layout::{TAG_FRAG, TAG_INVALID, TAG_SKIP};

/// Which memory-ordering points a header access uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FenceMode {
    /// Release on publish, acquire on read.
    #[default]
    Full,
    /// Plain relaxed accesses with no ordering points. A reader may observe a
    /// tag/seq word before the payload it guards.
    Relaxed,
}

/// Decoded header value.
#[repr(C, align(8))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FboxHeader {
    /// Bytes following the header.
    pub size: u32,
    pub tag: u16,
    pub seq: u16,
}

impl FboxHeader {
    pub const fn new(tag: u16, seq: u16, size: u32) -> Self {
        Self { size, tag, seq }
    }

    /// First word as stored: the size.
    #[inline]
    pub const fn value0(&self) -> u32 {
        self.size
    }

    /// Second word as stored: tag and seq packed in memory order.
    #[inline]
    pub fn value1(&self) -> u32 {
        let t = self.tag.to_ne_bytes();
        let s = self.seq.to_ne_bytes();
        u32::from_ne_bytes([t[0], t[1], s[0], s[1]])
    }

    #[inline]
    pub fn from_words(value0: u32, value1: u32) -> Self {
        let b = value1.to_ne_bytes();
        Self {
            size: value0,
            tag: u16::from_ne_bytes([b[0], b[1]]),
            seq: u16::from_ne_bytes([b[2], b[3]]),
        }
    }

    /// The whole header as one 64-bit word, bytes in wire order.
    #[inline]
    pub fn to_bits(&self) -> u64 {
        let v0 = self.value0().to_ne_bytes();
        let v1 = self.value1().to_ne_bytes();
        u64::from_ne_bytes([v0[0], v0[1], v0[2], v0[3], v1[0], v1[1], v1[2], v1[3]])
    }

    #[inline]
    pub fn from_bits(bits: u64) -> Self {
        let b = bits.to_ne_bytes();
        Self::from_words(
            u32::from_ne_bytes([b[0], b[1], b[2], b[3]]),
            u32::from_ne_bytes([b[4], b[5], b[6], b[7]]),
        )
    }

    /// Has a producer ever written this header?
    #[inline]
    pub const fn is_present(&self) -> bool {
        self.tag != TAG_INVALID
    }

    #[inline]
    pub const fn is_frag(&self) -> bool {
        self.tag == TAG_FRAG
    }

    #[inline]
    pub const fn is_skip(&self) -> bool {
        self.tag == TAG_SKIP
    }
}

/// Signed distance from `expected` to `observed` in the wrapping 16-bit
/// sequence space. Negative means `observed` is older.
#[inline]
pub const fn sequence_delta(observed: u16, expected: u16) -> i16 {
    observed.wrapping_sub(expected) as i16
}

/// Pack a header into its two stored words.
pub fn encode(tag: u16, seq: u16, size: u32) -> (u32, u32) {
    let header = FboxHeader::new(tag, seq, size);
    (header.value0(), header.value1())
}

/// Unpack two stored words.
pub fn decode(words: (u32, u32)) -> FboxHeader {
    FboxHeader::from_words(words.0, words.1)
}

/// A header as it sits in shared memory.
#[repr(C, align(8))]
pub struct HeaderSlot {
    value0: AtomicU32,
    value1: AtomicU32,
}

impl HeaderSlot {
    /// Publish `header`. Everything the caller wrote before this call (the
    /// payload) is visible to a `FenceMode::Full` reader that sees the tag.
    #[inline]
    pub fn write(&self, header: FboxHeader, fences: FenceMode) {
        match fences {
            FenceMode::Full => {
                self.value1.store(0, Ordering::Relaxed);
                fence(Ordering::Release);
                self.value0.store(header.value0(), Ordering::Relaxed);
                self.value1.store(header.value1(), Ordering::Release);
            }
            FenceMode::Relaxed => {
                self.value1.store(0, Ordering::Relaxed);
                self.value0.store(header.value0(), Ordering::Relaxed);
                self.value1.store(header.value1(), Ordering::Relaxed);
            }
        }
    }

    /// Load tag/seq first, then size.
    #[inline]
    pub fn read(&self, fences: FenceMode) -> FboxHeader {
        let order = match fences {
            FenceMode::Full => Ordering::Acquire,
            FenceMode::Relaxed => Ordering::Relaxed,
        };
        let value1 = self.value1.load(order);
        let value0 = self.value0.load(Ordering::Relaxed);
        FboxHeader::from_words(value0, value1)
    }

    /// Reset to the never-written state.
    #[inline]
    pub fn clear(&self) {
        self.value1.store(0, Ordering::Relaxed);
        self.value0.store(0, Ordering::Relaxed);
    }
}
