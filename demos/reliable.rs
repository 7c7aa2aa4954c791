// In demos/reliable.rs
//
// Stop-and-wait delivery over the reliable ring: one sender context, one
// receiver context, a shared pool. Every message carries "number:sha256" and
// the receiver checks both the order and the hash.
//
// cargo run --example reliable -- 1000
use sha2::{Digest, Sha256};
use shm_fastbox::Core::addr::{RelativeAddr, SegmentTable};
use shm_fastbox::Core::alloc::ShmFboxPool;
use shm_fastbox::Core::create_anonymous_shared_memory;
use shm_fastbox::FBox::{EndpointId, FboxAnnouncement, GenericPath};
use shm_fastbox::{FboxConfig, FboxContext, SendPath};
use std::env;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Generic path of the demo: remembers the last announcement.
#[derive(Default)]
struct Announcements {
    last: Mutex<Option<FboxAnnouncement>>,
    generic_sends: AtomicU64,
}

impl GenericPath for Announcements {
    fn send(
        &self,
        _endpoint: EndpointId,
        _tag: u16,
        _header: &[u8],
        _payload: &[u8],
        announcement: Option<FboxAnnouncement>,
    ) -> shm_fastbox::Result<()> {
        self.generic_sends.fetch_add(1, Ordering::Relaxed);
        if announcement.is_some() {
            *self.last.lock().unwrap() = announcement;
        }
        Ok(())
    }

    fn handle_frag(&self, _: EndpointId, _: NonNull<u8>, _: RelativeAddr) -> shm_fastbox::Result<()> {
        Ok(())
    }
}

fn hash(i: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("message_{}", i).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn main() -> shm_fastbox::Result<()> {
    let args: Vec<String> = env::args().collect();
    let num_messages: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1000);

    let config = FboxConfig::builder().with_threshold(1).build()?;
    let shm = create_anonymous_shared_memory(ShmFboxPool::required_size(config.fbox_size, 2))?;
    let pool = Arc::new(ShmFboxPool::new(shm, 0, config.fbox_size, 2)?);
    let segments = Arc::new(SegmentTable::new());
    segments.register(0, pool.shm().as_ptr(), pool.shm().size());

    let path = Arc::new(Announcements::default());
    let mut sender = FboxContext::new(config.clone(), pool.clone(), segments.clone(), path.clone())?;
    let mut receiver = FboxContext::new(config, pool.clone(), segments, path.clone())?;

    let to_receiver = sender.add_endpoint(sender.new_peer_credits());
    let from_sender = receiver.add_endpoint(receiver.new_peer_credits());

    let next = Arc::new(AtomicU64::new(0));
    {
        let next = next.clone();
        receiver.register_handler(1, move |d| {
            let message = String::from_utf8_lossy(d.segment);
            let (num, digest) = message.split_once(':').unwrap_or(("?", ""));
            let expected = next.fetch_add(1, Ordering::Relaxed);
            assert_eq!(num, expected.to_string(), "out of order");
            assert_eq!(digest, hash(expected as usize), "payload corrupted");
        })?;
    }

    // first message promotes the endpoint; map the box on the other side
    println!("Sender: promoting endpoint {}", to_receiver);
    sender.send(to_receiver, 2, &[], b"hello")?;
    let announcement = path.last.lock().unwrap().take();
    match announcement {
        Some(a) => receiver.setup_fbox_recv(from_sender, a.base)?,
        None => {
            eprintln!("Sender: no fast box was announced");
            return Ok(());
        }
    }

    let start = std::time::Instant::now();
    for i in 0..num_messages {
        let message = format!("{}:{}", i, hash(i));
        match sender.send(to_receiver, 1, &[], message.as_bytes())? {
            SendPath::Fast => {}
            SendPath::Generic { .. } => {
                eprintln!("Message {} fell back to the generic path", i);
                break;
            }
        }
        // stop and wait: the receiver drains before the next send
        while !receiver.poll()?.processed() {
            std::hint::spin_loop();
        }
        if (i + 1) % 100 == 0 {
            println!("--- Delivered {} messages ---", i + 1);
        }
    }

    let elapsed = start.elapsed();
    let delivered = next.load(Ordering::Relaxed);
    println!("Delivered {} messages in {:.2?}", delivered, elapsed);
    println!(
        "Average: {:.2} messages/second",
        delivered as f64 / elapsed.as_secs_f64()
    );
    if delivered as usize == num_messages {
        println!("All messages received in order with valid hashes");
    }

    sender.release_fbox(to_receiver)?;
    Ok(())
}
