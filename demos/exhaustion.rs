// In demos/exhaustion.rs
//
// The overwrite ring never pushes back: a sender blasts messages into a
// 4-slot fast box without the receiver reading, then the receiver reads the
// newest one and reports how many were overwritten. Ctrl+C stops the blast.
// Counts of 32768 and above outrun the 16-bit sequence and read as stale.
//
// cargo run --example exhaustion -- 30000
use shm_fastbox::Core::addr::{RelativeAddr, SegmentTable};
use shm_fastbox::Core::alloc::ShmFboxPool;
use shm_fastbox::Core::create_anonymous_shared_memory;
use shm_fastbox::FBox::{EndpointId, FboxAnnouncement, GenericPath};
use shm_fastbox::{FboxConfig, FboxContext, FboxPolicy, SendPath};
use std::env;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Announcements(Mutex<Option<FboxAnnouncement>>);

impl GenericPath for Announcements {
    fn send(
        &self,
        _endpoint: EndpointId,
        _tag: u16,
        _header: &[u8],
        _payload: &[u8],
        announcement: Option<FboxAnnouncement>,
    ) -> shm_fastbox::Result<()> {
        if announcement.is_some() {
            *self.0.lock().unwrap() = announcement;
        }
        Ok(())
    }

    fn handle_frag(&self, _: EndpointId, _: NonNull<u8>, _: RelativeAddr) -> shm_fastbox::Result<()> {
        Ok(())
    }
}

fn main() -> shm_fastbox::Result<()> {
    let args: Vec<String> = env::args().collect();
    let num_messages: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(30_000);

    let config = FboxConfig::builder()
        .with_policy(FboxPolicy::Overwrite)
        .with_threshold(1)
        .build()?;
    let shm = create_anonymous_shared_memory(ShmFboxPool::required_size(config.fbox_size, 1))?;
    let pool = Arc::new(ShmFboxPool::new(shm, 0, config.fbox_size, 1)?);
    let segments = Arc::new(SegmentTable::new());
    segments.register(0, pool.shm().as_ptr(), pool.shm().size());

    let path = Arc::new(Announcements::default());
    let mut sender = FboxContext::new(config.clone(), pool.clone(), segments.clone(), path.clone())?;
    let mut receiver = FboxContext::new(config, pool.clone(), segments, path.clone())?;
    let to_receiver = sender.add_endpoint(sender.new_peer_credits());
    let from_sender = receiver.add_endpoint(receiver.new_peer_credits());

    receiver.register_handler(1, |d| {
        let n = u64::from_le_bytes(d.segment.try_into().unwrap_or([0; 8]));
        println!("Receiver: got message {} (seq {})", n, d.seq);
    })?;

    sender.send(to_receiver, 2, &[], b"hello")?;
    let announcement = path.0.lock().unwrap().take();
    let Some(announcement) = announcement else {
        eprintln!("Sender: no fast box was announced");
        return Ok(());
    };
    receiver.setup_fbox_recv(from_sender, announcement.base)?;

    let keep_alive = Arc::new(AtomicBool::new(true));
    let keep_alive_for_handler = Arc::clone(&keep_alive);

    // Handle Ctrl+C to stop early
    ctrlc::set_handler(move || {
        keep_alive_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    let start = std::time::Instant::now();
    let mut sent = 0u64;
    while sent < num_messages && keep_alive.load(Ordering::SeqCst) {
        match sender.send(to_receiver, 1, &[], &sent.to_le_bytes())? {
            SendPath::Fast => sent += 1,
            SendPath::Generic { .. } => unreachable!("overwrite sends within a slot never fall back"),
        }
        if sent % 10_000 == 0 {
            println!("Sender: Sent {} messages...", sent);
        }
    }
    println!("Sender: {} messages in {:.2?}, never blocked", sent, start.elapsed());

    let status = receiver.poll()?;
    if status.processed() {
        println!(
            "Receiver: {} delivered, {} overwritten before they were read",
            status.delivered, status.dropped
        );
    } else {
        // sequence numbers are 16 bits: a writer more than 32767 messages
        // ahead of the reader looks like an old slot
        println!("Receiver: newest slot looks stale after {} overwrites, nothing delivered", sent);
    }

    sender.release_fbox(to_receiver)?;
    Ok(())
}
