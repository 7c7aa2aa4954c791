//! Wire layout of a fast box.
//!
//! ```text
//! offset 0        4                  32
//!        ┌────────┬──────────────────┬──────────────────────────────────┐
//!        │ cursor │ reserved         │ records (reliable) / slots (ovw) │
//!        └────────┴──────────────────┴──────────────────────────────────┘
//! ```
//!
//! The cursor word is the consumer's published read position (reliable
//! policy only). Every record is an 8-byte header followed by its payload.

/// Alignment of every reliable record and size of the reserved prefix.
pub const FBOX_ALIGNMENT: u32 = 32;
pub const FBOX_ALIGNMENT_MASK: u32 = FBOX_ALIGNMENT - 1;

/// Extra headers the reliable reader examines per endpoint per poll.
/// The reader loop runs `0..=POLL_COUNT`, so up to 32 records.
pub const POLL_COUNT: u32 = 31;

/// Low 31 bits of a cursor are the byte offset, the top bit is the wrap flag.
pub const FBOX_OFFSET_MASK: u32 = 0x7fff_ffff;
pub const FBOX_HB_MASK: u32 = 0x8000_0000;

/// Bytes of the packed `{size, tag, seq}` header.
pub const HEADER_SIZE: u32 = 8;

/// Never written by a producer. Reads as "nothing here yet".
pub const TAG_INVALID: u16 = 0;
/// Payload is a relocatable pointer to a generic-path fragment.
pub const TAG_FRAG: u16 = 0xfe;
/// Reliable only: nothing valid until the buffer end, wrap to the start.
pub const TAG_SKIP: u16 = 0xff;

/// Slot geometry of the overwrite ring as deployed.
pub const OVERWRITE_SLOTS: u32 = 4;
pub const OVERWRITE_SLOT_SIZE: u32 = 32;

/// Is the wrap flag set on this cursor?
#[inline]
pub const fn offset_hbs(cursor: u32) -> bool {
    cursor & FBOX_HB_MASK != 0
}

/// Byte offset part of a cursor.
#[inline]
pub const fn offset_of(cursor: u32) -> u32 {
    cursor & FBOX_OFFSET_MASK
}

/// Rebuild a cursor from its flag and offset.
#[inline]
pub const fn make_cursor(hbs: bool, offset: u32) -> u32 {
    ((hbs as u32) << 31) | offset
}

/// Round a header+payload size up to a whole number of records.
#[inline]
pub const fn record_size(payload_size: u32) -> u32 {
    (payload_size + HEADER_SIZE + FBOX_ALIGNMENT_MASK) & !FBOX_ALIGNMENT_MASK
}

/// Contiguous bytes the writer may use starting at `end`.
///
/// `start` and `end` are offsets with the wrap flag stripped; `hbm` says
/// whether the two wrap flags match. With matching flags the reader is on the
/// same lap, so everything from `end` to the buffer end is free. With
/// differing flags the writer has lapped the reader and may only fill up to
/// `start`; `start == end` then means full.
///
/// The `+ !hbm` nudges the differing-flags case so `start == end` picks the
/// `start - end` branch (zero). It relies on `start` never being exactly
/// `end - 1`, which holds because both offsets are multiples of the record
/// alignment.
#[inline]
pub const fn buffer_free(start: u32, end: u32, hbm: bool, size: u32) -> u32 {
    if start + (!hbm as u32) > end {
        start - end
    } else {
        size - end
    }
}
