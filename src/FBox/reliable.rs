//! Reliable fast box: an append ring with backpressure.
//!
//! The writer owns `end`, the reader owns `start`; both carry a wrap flag in
//! the top bit. The reader publishes its `start` to the cursor word at offset
//! 0 after each poll, and the writer only re-reads it when its cached copy says
//! the ring is too full. Nothing is ever overwritten before it has been read:
//! a send that does not fit is declined and goes down the generic path.

use std::sync::atomic::Ordering;

use log::{debug, trace};

use crate::error::{FboxError, Result};
use crate::FBox::dispatch::Record;
use crate::FBox::Buffer::layout::{
    buffer_free, make_cursor, offset_hbs, offset_of, record_size, FBOX_ALIGNMENT, HEADER_SIZE, TAG_SKIP,
};
use crate::FBox::Buffer::Header::{sequence_delta, FboxHeader, FenceMode};
use crate::FBox::Buffer::FboxBuffer;

/// Sender side of a reliable fast box.
pub struct ReliableWriter {
    buffer: FboxBuffer,
    /// Last consumer cursor we read from the box.
    start: u32,
    end: u32,
    seq: u16,
}

impl ReliableWriter {
    /// Take over a freshly zeroed box.
    pub fn new(buffer: FboxBuffer) -> Self {
        buffer.cursor_word().store(FBOX_ALIGNMENT, Ordering::Release);
        buffer.header(FBOX_ALIGNMENT).clear();

        Self {
            buffer,
            start: FBOX_ALIGNMENT,
            end: FBOX_ALIGNMENT,
            seq: 0,
        }
    }

    pub fn buffer(&self) -> &FboxBuffer {
        &self.buffer
    }

    /// Sequence number the next record will carry.
    pub fn seq(&self) -> u16 {
        self.seq
    }

    /// `(start, end)` cursors including their wrap flags.
    pub fn cursors(&self) -> (u32, u32) {
        (self.start, self.end)
    }

    /// Largest `header + payload` this box accepts. Bigger messages would
    /// starve the ring.
    pub fn max_message(&self) -> u32 {
        self.buffer.size() >> 2
    }

    /// Append one message. Returns false when it is too large or the ring has
    /// no room; the caller then uses the generic path.
    pub fn write(&mut self, tag: u16, header: &[u8], payload: &[u8]) -> bool {
        let fbox_size = self.buffer.size();
        let size = header.len() + payload.len();
        if size > self.max_message() as usize {
            return false;
        }
        let size = size as u32;

        let mut hbs = offset_hbs(self.end);
        let mut hbm = offset_hbs(self.start) == hbs;
        let mut start = offset_of(self.start);
        let mut end = offset_of(self.end);
        let mut free = buffer_free(start, end, hbm, fbox_size);

        let rec = record_size(size);

        if free < rec {
            // refresh our view of how far the reader got
            self.start = self.buffer.cursor_word().load(Ordering::Acquire);
            start = offset_of(self.start);
            hbm = offset_hbs(self.start) == hbs;
            free = buffer_free(start, end, hbm, fbox_size);

            trace!(
                "fast box low on space for {} bytes: start {:#x}, end {:#x}, hbm {}, free {}",
                rec,
                start,
                end,
                hbm,
                free
            );

            // tail of the buffer is too short: mark it skipped and retry at the front
            if free > 0 && free < rec && start <= end {
                debug!("record of {} bytes does not fit in the last {} bytes, wrapping", rec, free);
                self.buffer.header(end).write(
                    FboxHeader::new(TAG_SKIP, self.seq, free - HEADER_SIZE),
                    FenceMode::Full,
                );
                self.seq = self.seq.wrapping_add(1);

                end = FBOX_ALIGNMENT;
                hbs = !hbs;
                hbm = !hbm;
                free = buffer_free(start, end, hbm, fbox_size);
            }

            if free < rec {
                self.end = make_cursor(hbs, end);
                return false;
            }
        }

        let dst = end;
        unsafe {
            self.buffer.write_bytes(dst + HEADER_SIZE, header);
            self.buffer
                .write_bytes(dst + HEADER_SIZE + header.len() as u32, payload);
        }

        end = dst + rec;
        if end == fbox_size {
            hbs = !hbs;
            end = FBOX_ALIGNMENT;
        } else if free > rec {
            // the reader stops on this header until the next record lands
            self.buffer.header(end).clear();
        }

        self.buffer
            .header(dst)
            .write(FboxHeader::new(tag, self.seq, size), FenceMode::Full);
        self.seq = self.seq.wrapping_add(1);

        self.end = make_cursor(hbs, end);
        true
    }
}

/// Receiver side of a reliable fast box.
pub struct ReliableReader {
    buffer: FboxBuffer,
    start: u32,
    seq: u16,
}

impl ReliableReader {
    pub fn new(buffer: FboxBuffer) -> Self {
        Self {
            buffer,
            start: FBOX_ALIGNMENT,
            seq: 0,
        }
    }

    pub fn buffer(&self) -> &FboxBuffer {
        &self.buffer
    }

    /// Sequence number expected next.
    pub fn seq(&self) -> u16 {
        self.seq
    }

    /// Read cursor including its wrap flag.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Consume up to `poll_count + 1` records, handing every message (and
    /// fragment forward) to `on_record` in order. Returns the number of
    /// records consumed, skip markers included.
    ///
    /// Progress made before an error is still published to the writer.
    pub fn poll<F>(&mut self, poll_count: u32, mut on_record: F) -> Result<u32>
    where
        F: FnMut(Record<'_>) -> Result<()>,
    {
        let fbox_size = self.buffer.size();
        let mut start = offset_of(self.start);
        let mut hbs = offset_hbs(self.start);
        let mut consumed = 0u32;
        let mut outcome = Ok(());

        for _ in 0..=poll_count {
            let hdr = self.buffer.header(start).read(FenceMode::Full);

            if !hdr.is_present() || sequence_delta(hdr.seq, self.seq) < 0 {
                break;
            }

            if start as u64 + HEADER_SIZE as u64 + hdr.size as u64 > fbox_size as u64 {
                outcome = Err(FboxError::Corrupt {
                    offset: start,
                    size: hdr.size,
                    capacity: fbox_size,
                });
                break;
            }

            // a gap here means earlier records were superseded; catch up
            self.seq = hdr.seq.wrapping_add(1);
            consumed += 1;

            trace!(
                "got frag with header {{.tag = {}, .size = {}, .seq = {}}} from offset {}",
                hdr.tag,
                hdr.size,
                hdr.seq,
                start
            );

            if !hdr.is_skip() {
                let payload = unsafe { self.buffer.bytes(start + HEADER_SIZE, hdr.size) };
                let record = Record {
                    tag: hdr.tag,
                    seq: hdr.seq,
                    payload,
                };
                if let Err(e) = on_record(record) {
                    start = advance(start, hdr.size, fbox_size, &mut hbs);
                    outcome = Err(e);
                    break;
                }
            }

            start = advance(start, hdr.size, fbox_size, &mut hbs);
        }

        if consumed > 0 {
            trace!("left off at offset {} (hbs: {})", start, hbs);
            self.start = make_cursor(hbs, start);
            self.buffer.cursor_word().store(self.start, Ordering::Release);
        }

        outcome.map(|_| consumed)
    }
}

#[inline]
fn advance(start: u32, size: u32, fbox_size: u32, hbs: &mut bool) -> u32 {
    let next = start + record_size(size);
    if next == fbox_size {
        *hbs = !*hbs;
        FBOX_ALIGNMENT
    } else {
        next
    }
}
