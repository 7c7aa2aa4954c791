// Header codec and cursor arithmetic.
// Run with: cargo test --test header

use proptest::prelude::*;
use shm_fastbox::FBox::Buffer::layout::{
    buffer_free, make_cursor, offset_hbs, offset_of, record_size, FBOX_ALIGNMENT, TAG_FRAG,
    TAG_INVALID, TAG_SKIP,
};
use shm_fastbox::FBox::Buffer::Header::{decode, encode, sequence_delta};
use shm_fastbox::FBox::Buffer::FboxHeader;

proptest! {
    #[test]
    fn prop_header_words_round_trip(tag: u16, seq: u16, size: u32) {
        let h = decode(encode(tag, seq, size));
        prop_assert_eq!(h, FboxHeader::new(tag, seq, size));
        prop_assert_eq!(FboxHeader::from_bits(h.to_bits()), h);
        prop_assert_eq!(h.is_present(), tag != TAG_INVALID);
    }

    #[test]
    fn prop_cursor_keeps_flag_and_offset(hbs: bool, offset in 0u32..0x8000_0000) {
        let c = make_cursor(hbs, offset);
        prop_assert_eq!(offset_hbs(c), hbs);
        prop_assert_eq!(offset_of(c), offset);
    }

    #[test]
    fn prop_sequence_delta_is_wrapping_distance(expected: u16, ahead in 0u16..0x8000) {
        prop_assert_eq!(sequence_delta(expected.wrapping_add(ahead), expected), ahead as i16);
        if ahead > 0 {
            prop_assert!(sequence_delta(expected.wrapping_sub(ahead), expected) < 0);
        }
    }

    // Model a ring of `slots` aligned records: the reader is `used` records
    // behind the writer. buffer_free must report exactly the contiguous run
    // the writer may fill next.
    #[test]
    fn prop_buffer_free_matches_ring_model(
        slots in 2u32..64,
        reader in 0u32..64,
        used_frac in 0u32..=100,
    ) {
        let size = FBOX_ALIGNMENT * (slots + 1);
        let reader = reader % slots;
        let used = used_frac * slots / 100;

        let start = FBOX_ALIGNMENT * (reader + 1);
        let writer = reader + used;
        let end = FBOX_ALIGNMENT * (writer % slots + 1);
        // flags differ once the writer has wrapped past the buffer end
        let hbm = writer < slots;

        let expected = if hbm { size - end } else { start - end };
        prop_assert_eq!(buffer_free(start, end, hbm, size), expected);
    }
}

#[test]
fn test_control_tags() {
    assert!(!decode(encode(TAG_INVALID, 7, 16)).is_present());
    assert!(decode(encode(TAG_FRAG, 0, 8)).is_frag());
    assert!(decode(encode(TAG_SKIP, 0, 0)).is_skip());
    assert!(!decode(encode(0xfd, 0, 0)).is_skip());
}

#[test]
fn test_record_size_rounds_to_alignment() {
    assert_eq!(record_size(0), 32);
    assert_eq!(record_size(4), 32);
    assert_eq!(record_size(24), 32);
    assert_eq!(record_size(25), 64);
    assert_eq!(record_size(1024), 1056);
}

#[test]
fn test_buffer_free_cases() {
    // same lap: everything to the end
    assert_eq!(buffer_free(64, 128, true, 256), 128);
    // writer lapped: up to the reader
    assert_eq!(buffer_free(128, 64, false, 256), 64);
    // writer lapped and caught up: full
    assert_eq!(buffer_free(64, 64, false, 256), 0);
    // same lap, empty ring
    assert_eq!(buffer_free(64, 64, true, 256), 192);
}
