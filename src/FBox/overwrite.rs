//! Overwrite fast box: N fixed slots, slot = seq mod N.
//!
//! The writer never checks for room and never waits; it lands every message
//! in the slot its sequence number selects, replacing whatever the reader did
//! not get to. The reader only looks at the slot for the sequence it expects
//! and uses the signed sequence delta to tell new data from a slot it has
//! already consumed.
//!
//! The read side takes no ordering point unless configured with
//! `FenceMode::Full`. On weakly ordered CPUs a reader may then pair a fresh
//! tag/seq word with an older payload; this is the accepted price of a
//! zero-overhead fast path and `poll` does not try to detect it.

use log::trace;

use crate::error::{FboxError, Result};
use crate::FBox::dispatch::Record;
use crate::FBox::Buffer::layout::{FBOX_ALIGNMENT, HEADER_SIZE};
use crate::FBox::Buffer::Header::{sequence_delta, FboxHeader, FenceMode};
use crate::FBox::Buffer::FboxBuffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SlotGeometry {
    slots: u32,
    slot_size: u32,
}

impl SlotGeometry {
    #[inline]
    fn offset(&self, seq: u16) -> u32 {
        FBOX_ALIGNMENT + (seq as u32 % self.slots) * self.slot_size
    }

    #[inline]
    fn capacity(&self) -> u32 {
        self.slot_size - HEADER_SIZE
    }
}

/// Sender side of an overwrite fast box.
pub struct OverwriteWriter {
    buffer: FboxBuffer,
    geometry: SlotGeometry,
    seq: u16,
}

impl OverwriteWriter {
    /// Take over a freshly zeroed box with `slots` slots of `slot_size` bytes.
    pub fn new(buffer: FboxBuffer, slots: u32, slot_size: u32) -> Self {
        debug_assert!(FBOX_ALIGNMENT + slots * slot_size <= buffer.size());
        Self {
            buffer,
            geometry: SlotGeometry { slots, slot_size },
            seq: 0,
        }
    }

    pub fn buffer(&self) -> &FboxBuffer {
        &self.buffer
    }

    pub fn seq(&self) -> u16 {
        self.seq
    }

    /// Largest `header + payload` one slot holds.
    pub fn max_message(&self) -> u32 {
        self.geometry.capacity()
    }

    /// Overwrite the next slot. Only fails when the message cannot fit in a
    /// slot at all.
    pub fn write(&mut self, tag: u16, header: &[u8], payload: &[u8]) -> bool {
        let size = header.len() + payload.len();
        if size > self.geometry.capacity() as usize {
            return false;
        }

        let dst = self.geometry.offset(self.seq);
        unsafe {
            self.buffer.write_bytes(dst + HEADER_SIZE, header);
            self.buffer
                .write_bytes(dst + HEADER_SIZE + header.len() as u32, payload);
        }

        self.buffer
            .header(dst)
            .write(FboxHeader::new(tag, self.seq, size as u32), FenceMode::Full);
        self.seq = self.seq.wrapping_add(1);
        true
    }
}

/// Receiver side of an overwrite fast box.
pub struct OverwriteReader {
    buffer: FboxBuffer,
    geometry: SlotGeometry,
    fences: FenceMode,
    seq: u16,
    // payload snapshot; the writer may reuse the slot while a handler runs
    scratch: Vec<u8>,
}

impl OverwriteReader {
    pub fn new(buffer: FboxBuffer, slots: u32, slot_size: u32, fences: FenceMode) -> Self {
        let geometry = SlotGeometry { slots, slot_size };
        Self {
            buffer,
            geometry,
            fences,
            seq: 0,
            scratch: vec![0u8; geometry.capacity() as usize],
        }
    }

    pub fn buffer(&self) -> &FboxBuffer {
        &self.buffer
    }

    pub fn seq(&self) -> u16 {
        self.seq
    }

    pub fn fences(&self) -> FenceMode {
        self.fences
    }

    /// Look at the slot for the expected sequence. Returns `Some(dropped)`
    /// when a message was handed to `on_record`, where `dropped` counts the
    /// messages overwritten before we got to them, or `None` when the slot is
    /// empty or already consumed.
    pub fn poll<F>(&mut self, mut on_record: F) -> Result<Option<u16>>
    where
        F: FnMut(Record<'_>) -> Result<()>,
    {
        let offset = self.geometry.offset(self.seq);
        let hdr = self.buffer.header(offset).read(self.fences);

        if !hdr.is_present() {
            return Ok(None);
        }

        let delta = sequence_delta(hdr.seq, self.seq);
        if delta < 0 {
            return Ok(None);
        }

        // skip markers belong to the append ring; a slot never carries one
        if hdr.is_skip() || hdr.size > self.geometry.capacity() {
            return Err(FboxError::Corrupt {
                offset,
                size: hdr.size,
                capacity: self.buffer.size(),
            });
        }

        self.seq = hdr.seq.wrapping_add(1);

        trace!(
            "got frag with header {{.tag = {}, .size = {}, .seq = {}}} from slot offset {} ({} dropped)",
            hdr.tag,
            hdr.size,
            hdr.seq,
            offset,
            delta
        );

        let payload = &mut self.scratch[..hdr.size as usize];
        unsafe { self.buffer.copy_out(offset + HEADER_SIZE, payload) };

        on_record(Record {
            tag: hdr.tag,
            seq: hdr.seq,
            payload,
        })?;

        Ok(Some(delta as u16))
    }
}
