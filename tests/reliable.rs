// End-to-end tests of the reliable fast box: promotion through the generic
// path, then lossless in-order delivery through the ring.
// Run with: cargo test --test reliable -- --nocapture

mod common;

use common::{recorder, Pair, Received};
use shm_fastbox::Core::addr::RelativeAddr;
use shm_fastbox::FBox::reliable::{ReliableReader, ReliableWriter};
use shm_fastbox::FBox::Buffer::layout::FBOX_ALIGNMENT;
use shm_fastbox::FBox::Buffer::{FboxBuffer, FboxHeader, FenceMode};
use shm_fastbox::{FboxConfig, FboxError, SendPath};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

fn config() -> FboxConfig {
    FboxConfig::builder().with_threshold(4).build().unwrap()
}

#[test]
fn test_first_message_after_promotion() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(5, recorder(&log)).unwrap();

    assert_eq!(pair.send(5, &[], &[0xAA, 0xBB, 0xCC, 0xDD]), SendPath::Fast);

    let status = pair.receiver.poll().unwrap();
    println!("poll status: {:?}", status);
    assert_eq!(status.records, 1);
    assert_eq!(status.delivered, 1);

    let got = log.lock();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0], (5, 0, vec![0xAA, 0xBB, 0xCC, 0xDD]));
    assert_eq!(pair.receiver.endpoint(pair.from_sender).unwrap().inbound_seq(), Some(1));
}

#[test]
fn test_header_and_payload_arrive_as_one_segment() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(9, recorder(&log)).unwrap();

    assert_eq!(pair.send(9, b"hdr:", b"body"), SendPath::Fast);
    pair.receiver.poll().unwrap();

    assert_eq!(log.lock()[0].2, b"hdr:body".to_vec());
}

#[test]
fn test_promotion_happens_on_threshold_send() {
    let mut pair = Pair::new(config());

    for i in 1..=4 {
        let path = pair.send(1, &[], b"x");
        println!("send {} went {:?}", i, path);
        assert_eq!(path, SendPath::Generic { announced: i == 4 });
    }

    let ep = pair.sender.endpoint(pair.to_receiver).unwrap();
    assert!(ep.is_promoted());
    assert_eq!(pair.pool.free_blocks(), 3);
    assert_eq!(pair.credits.available(), pair.sender.config().fbox_max - 1);
    assert_eq!(pair.receiver.fbox_in_endpoints(), &[pair.from_sender]);

    // fifth send takes the fast path
    assert_eq!(pair.send(1, &[], b"x"), SendPath::Fast);
}

#[test]
fn test_fifo_across_many_wraps() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(7, recorder(&log)).unwrap();

    let mut sent = 0u32;
    let mut fallbacks = 0;
    for round in 0..200u32 {
        // payload sizes vary so records straddle the buffer end differently
        for k in 0..5u32 {
            let len = ((round * 7 + k * 13) % 200) as usize;
            let payload: Vec<u8> = (0..len).map(|b| (sent as usize + b) as u8).collect();
            let mut msg = sent.to_le_bytes().to_vec();
            msg.extend_from_slice(&payload);
            match pair.send(7, &[], &msg) {
                SendPath::Fast => sent += 1,
                SendPath::Generic { .. } => fallbacks += 1,
            }
        }
        pair.receiver.poll().unwrap();
    }
    while pair.receiver.poll().unwrap().processed() {}

    println!("{} fast sends, {} generic fallbacks", sent, fallbacks);
    let got = log.lock();
    assert_eq!(got.len() as u32, sent);
    for (i, (_, _, bytes)) in got.iter().enumerate() {
        let n = u32::from_le_bytes(bytes[..4].try_into().unwrap());
        assert_eq!(n, i as u32, "fast-box messages must arrive in send order");
        for (b, v) in bytes[4..].iter().enumerate() {
            assert_eq!(*v, (n as usize + b) as u8);
        }
    }
}

#[test]
fn test_sequence_wraps_without_loss_or_replay() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(7, recorder(&log)).unwrap();

    // more messages than the u16 sequence space, small box so it fills often
    let total = 70_000u32;
    let mut declined = 0u32;
    for i in 0..total {
        while pair.send(7, &[], &i.to_le_bytes()) != SendPath::Fast {
            declined += 1;
            assert!(pair.receiver.poll().unwrap().processed());
        }
    }
    while pair.receiver.poll().unwrap().processed() {}

    let got = log.lock();
    println!("delivered {} ({} declined sends)", got.len(), declined);
    assert_eq!(got.len() as u32, total);
    for (i, (_, _, bytes)) in got.iter().enumerate() {
        assert_eq!(u32::from_le_bytes(bytes[..4].try_into().unwrap()), i as u32);
    }
    let wraps = got.windows(2).filter(|w| w[1].1 < w[0].1).count();
    assert!(wraps >= 1, "sequence numbers never wrapped");
}

#[test]
fn test_corrupt_header_is_reported_after_earlier_records() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(7, recorder(&log)).unwrap();
    assert_eq!(pair.send(7, &[], b"ok"), SendPath::Fast);

    // next record lands right behind the first one
    let seq = pair.sender.endpoint(pair.to_receiver).unwrap().outbound_seq().unwrap();
    let inbound = pair.receiver.endpoint(pair.from_sender).unwrap().inbound_buffer().unwrap();
    inbound
        .header(2 * FBOX_ALIGNMENT)
        .write(FboxHeader::new(7, seq, 8192), FenceMode::Full);

    let err = pair.receiver.poll().unwrap_err();
    println!("poll error: {}", err);
    assert!(matches!(err, FboxError::Corrupt { offset, size: 8192, .. } if offset == 2 * FBOX_ALIGNMENT));
    assert_eq!(log.lock().len(), 1);

    // the first record was consumed and published to the writer
    let inbound = pair.receiver.endpoint(pair.from_sender).unwrap().inbound_buffer().unwrap();
    assert_eq!(inbound.cursor_word().load(Ordering::Acquire), 2 * FBOX_ALIGNMENT);
}

#[test]
fn test_full_ring_declines_then_recovers() {
    let config = FboxConfig::builder()
        .with_threshold(1)
        .with_fbox_size(256)
        .build()
        .unwrap();
    let mut pair = Pair::new(config);
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(3, recorder(&log)).unwrap();

    // 256 byte box, 32 byte records: 7 fit behind the reserved prefix
    let mut fast = 0;
    for i in 0..10u8 {
        if pair.send(3, &[], &[i; 8]) == SendPath::Fast {
            fast += 1;
        }
    }
    assert_eq!(fast, 7);
    assert_eq!(pair.sender_path.sends.lock().len(), 3);

    let status = pair.receiver.poll().unwrap();
    assert_eq!(status.delivered, 7);
    assert_eq!(pair.send(3, &[], &[42; 8]), SendPath::Fast);
}

#[test]
fn test_oversized_message_falls_back() {
    let mut pair = Pair::new(config());
    pair.promote();

    let max = pair.sender.config().reliable_max_message() as usize;
    assert_eq!(pair.send(2, &[], &vec![0u8; max]), SendPath::Fast);
    assert_eq!(pair.send(2, &[], &vec![0u8; max + 1]), SendPath::Generic { announced: false });
    assert_eq!(pair.sender_path.sends.lock()[0].bytes.len(), max + 1);
}

#[test]
fn test_escape_record_forwarded_to_generic_path() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(0x10, recorder(&log)).unwrap();

    // a descriptor living somewhere inside the shared segment
    let frag = RelativeAddr::new(0, 64);
    assert!(pair.sender.send_escape(pair.to_receiver, frag).unwrap());

    let status = pair.receiver.poll().unwrap();
    assert_eq!(status.forwarded, 1);
    assert_eq!(status.delivered, 0);
    assert!(log.lock().is_empty());
    assert_eq!(*pair.receiver_path.frags.lock(), vec![(pair.from_sender, frag)]);
}

#[test]
fn test_escape_without_fast_box_is_declined() {
    let mut pair = Pair::new(config());
    assert!(!pair
        .sender
        .send_escape(pair.to_receiver, RelativeAddr::new(0, 64))
        .unwrap());
}

#[test]
fn test_unregistered_tag_is_counted_and_dropped() {
    let mut pair = Pair::new(config());
    pair.promote();

    pair.send(0x33, &[], b"nobody listens");
    let status = pair.receiver.poll().unwrap();
    assert_eq!(status.records, 1);
    assert_eq!(status.unhandled, 1);
    assert!(!pair.receiver.poll().unwrap().processed());
}

#[test]
fn test_poll_budget_per_endpoint() {
    let mut pair = Pair::new(config());
    pair.promote();

    let log = Received::default();
    pair.receiver.register_handler(4, recorder(&log)).unwrap();

    for _ in 0..40 {
        assert_eq!(pair.send(4, &[], &[1]), SendPath::Fast);
    }

    // one poll looks at POLL_COUNT + 1 headers
    assert_eq!(pair.receiver.poll().unwrap().delivered, 32);
    assert_eq!(pair.receiver.poll().unwrap().delivered, 8);
}

#[test]
fn test_release_returns_block_and_credit() {
    let mut pair = Pair::new(config());
    pair.promote();
    let credits = pair.credits.available();

    assert!(pair.sender.release_fbox(pair.to_receiver).unwrap());
    assert!(!pair.sender.release_fbox(pair.to_receiver).unwrap());
    assert_eq!(pair.pool.free_blocks(), 4);
    assert_eq!(pair.credits.available(), credits + 1);
}

struct Backing {
    ptr: *mut u8,
    layout: std::alloc::Layout,
}

unsafe impl Send for Backing {}
unsafe impl Sync for Backing {}

impl Backing {
    fn new(size: usize) -> Self {
        let layout = std::alloc::Layout::from_size_align(size, 128).unwrap();
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self { ptr, layout }
    }

    fn buffer(&self) -> FboxBuffer {
        unsafe { FboxBuffer::new(std::ptr::NonNull::new(self.ptr).unwrap(), self.layout.size() as u32) }
    }
}

impl Drop for Backing {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr, self.layout) };
    }
}

#[test]
fn test_threaded_spsc_is_lossless() {
    const MESSAGES: u32 = 50_000;

    let backing = Arc::new(Backing::new(4096));
    let buffer = backing.buffer();
    let mut writer = ReliableWriter::new(buffer);
    let mut reader = ReliableReader::new(buffer);

    let producer = {
        let backing = backing.clone();
        thread::spawn(move || {
            let _backing = backing;
            let mut rng = fastrand::Rng::with_seed(7);
            let mut declined = 0u64;
            for i in 0..MESSAGES {
                let len = rng.usize(0..=200);
                let mut msg = i.to_le_bytes().to_vec();
                msg.resize(4 + len, i as u8);
                while !writer.write(1, &[], &msg) {
                    declined += 1;
                    std::hint::spin_loop();
                }
            }
            declined
        })
    };

    let mut next = 0u32;
    while next < MESSAGES {
        reader
            .poll(31, |record| {
                let n = u32::from_le_bytes(record.payload[..4].try_into().unwrap());
                assert_eq!(n, next);
                assert!(record.payload[4..].iter().all(|&b| b == n as u8));
                next += 1;
                Ok(())
            })
            .unwrap();
    }

    let declined = producer.join().unwrap();
    println!("received {} messages, writer was declined {} times", next, declined);
}
