// Layout conformance tests for the bytes two processes share.
// These tests assert sizes, alignments, and field offsets for the fast-box
// header and the pool header. They also print the observed values to aid
// debugging when a mismatch occurs on a given platform.
use memoffset::offset_of;
use shm_fastbox::Core::alloc::{PeerCredits, PoolHeader, ShmFboxPool};
use shm_fastbox::FBox::Buffer::{FboxHeader, HeaderSlot};
use std::mem::{align_of, size_of};

#[test]
fn test_fbox_header_layout() {
    let size = size_of::<FboxHeader>();
    let align = align_of::<FboxHeader>();
    let off_size = offset_of!(FboxHeader, size);
    let off_tag = offset_of!(FboxHeader, tag);
    let off_seq = offset_of!(FboxHeader, seq);

    println!(
        "FboxHeader => size: {size}, align: {align}, offsets: [size:{off_size}, tag:{off_tag}, seq:{off_seq}]"
    );

    assert_eq!(size, 8);
    assert_eq!(align, 8);
    assert_eq!(off_size, 0);
    assert_eq!(off_tag, 4);
    assert_eq!(off_seq, 6);

    // the struct and its two stored words describe the same bytes
    let h = FboxHeader::new(0xab, 0x1234, 0xdead_beef);
    let raw: [u8; 8] = unsafe { std::mem::transmute(h) };
    assert_eq!(raw, h.to_bits().to_ne_bytes());
}

#[test]
fn test_header_slot_layout() {
    assert_eq!(size_of::<HeaderSlot>(), 8);
    assert_eq!(align_of::<HeaderSlot>(), 8);
}

#[test]
fn test_pool_header_layout() {
    let size = size_of::<PoolHeader>();
    let align = align_of::<PoolHeader>();
    let off_magic = offset_of!(PoolHeader, magic);
    let off_version = offset_of!(PoolHeader, version);
    let off_block_size = offset_of!(PoolHeader, block_size);
    let off_block_count = offset_of!(PoolHeader, block_count);

    println!(
        "PoolHeader => size: {size}, align: {align}, offsets: [magic:{off_magic}, version:{off_version}, block_size:{off_block_size}, block_count:{off_block_count}]"
    );

    assert_eq!(align, 128);
    assert_eq!(size, 128);
    assert_eq!(off_magic, 0);
    assert_eq!(off_version, 8);
    assert_eq!(off_block_size, 12);
    assert_eq!(off_block_count, 16);
    assert_eq!(ShmFboxPool::blocks_offset(), 128);
}

#[test]
fn test_peer_credits_own_a_cache_line() {
    assert_eq!(size_of::<PeerCredits>(), align_of::<PeerCredits>());
}
