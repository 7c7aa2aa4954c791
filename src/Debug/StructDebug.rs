use std::fmt;
use std::sync::atomic::Ordering;

use crate::Core::alloc::{FboxBlock, ShmFboxPool};
use crate::FBox::endpoint::{Endpoint, FboxReader, FboxWriter};
use crate::FBox::Buffer::layout::{offset_hbs, offset_of};
use crate::FBox::Buffer::FboxBuffer;
use crate::FBox::FboxContext;

/// Debug function for ShmFboxPool
///
/// Shows:
/// - Header pointer location
/// - Segment id and block geometry
/// - Free block count (takes the free-list lock briefly)
pub fn debug_fbox_pool(pool: &ShmFboxPool, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShmFboxPool")
        .field("shm", &"<opaque>")
        .field("header", &format_args!("{:p}", pool.header_ptr()))
        .field("segment_id", &pool.segment_id())
        .field("block_size", &crate::Core::alloc::FboxPool::block_size(pool))
        .field("blocks", &format_args!("{}/{} free", pool.free_blocks(), pool.total_blocks()))
        .field("initialized", &pool.is_initialized())
        .finish()
}

pub fn debug_fbox_block(block: &FboxBlock, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FboxBlock")
        .field("index", &block.index())
        .field("ptr", &format_args!("0x{:x}", block.as_ptr() as usize))
        .field("size", &block.size())
        .finish()
}

pub fn debug_segment_table<I>(segments: I, f: &mut fmt::Formatter<'_>) -> fmt::Result
where
    I: Iterator<Item = (u32, usize, usize)>,
{
    let mut list = f.debug_list();
    for (id, base, size) in segments {
        list.entry(&format_args!("segment {} @ 0x{:x} ({} bytes)", id, base, size));
    }
    list.finish()
}

/// Debug function for FboxBuffer
///
/// Reads only the consumer cursor word; payload bytes are never touched.
pub fn debug_fbox_buffer(buffer: &FboxBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let cursor = buffer.cursor_word().load(Ordering::Relaxed);
    f.debug_struct("FboxBuffer")
        .field("base", &format_args!("0x{:x}", buffer.as_ptr() as usize))
        .field("size", &buffer.size())
        .field("cursor", &format_args!("{:#x} (hbs: {})", offset_of(cursor), offset_hbs(cursor)))
        .finish()
}

pub fn debug_endpoint(endpoint: &Endpoint, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let outbound = endpoint.outbound_writer().map(|w| match w {
        FboxWriter::Reliable(w) => format!("reliable seq {} cursors {:x?}", w.seq(), w.cursors()),
        FboxWriter::Overwrite(w) => format!("overwrite seq {}", w.seq()),
    });
    let inbound = endpoint.inbound_reader().map(|r| match r {
        FboxReader::Reliable(r) => format!("reliable seq {} start {:#x}", r.seq(), r.start()),
        FboxReader::Overwrite(r) => format!("overwrite seq {} ({:?})", r.seq(), r.fences()),
    });
    f.debug_struct("Endpoint")
        .field("id", &endpoint.id())
        .field("send_count", &endpoint.send_count())
        .field("credits", &endpoint.credits().available())
        .field("outbound", &outbound)
        .field("inbound", &inbound)
        .finish()
}

pub fn debug_fbox_context(ctx: &FboxContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FboxContext")
        .field("config", ctx.config())
        .field("endpoints", &ctx.endpoints())
        .field("fbox_in_endpoints", &ctx.fbox_in_endpoints())
        .field("table", ctx.dispatch_table())
        .finish_non_exhaustive()
}
