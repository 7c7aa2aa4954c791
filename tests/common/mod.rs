// Shared fixtures for the integration tests: a generic path that records what
// it is handed, and a sender/receiver pair of contexts sharing one pool.
#![allow(dead_code)]

use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;
use shm_fastbox::Core::addr::{RelativeAddr, SegmentTable};
use shm_fastbox::Core::alloc::{PeerCredits, ShmFboxPool};
use shm_fastbox::Core::create_anonymous_shared_memory;
use shm_fastbox::FBox::{Delivery, EndpointId, FboxAnnouncement, GenericPath};
use shm_fastbox::{FboxConfig, FboxContext, Result, SendPath};

/// One message handed to the generic path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericSend {
    pub endpoint: EndpointId,
    pub tag: u16,
    pub bytes: Vec<u8>,
    pub announcement: Option<FboxAnnouncement>,
}

/// Generic path stand-in that remembers everything.
#[derive(Default)]
pub struct RecordingPath {
    pub sends: Mutex<Vec<GenericSend>>,
    pub frags: Mutex<Vec<(EndpointId, RelativeAddr)>>,
}

impl GenericPath for RecordingPath {
    fn send(
        &self,
        endpoint: EndpointId,
        tag: u16,
        header: &[u8],
        payload: &[u8],
        announcement: Option<FboxAnnouncement>,
    ) -> Result<()> {
        self.sends.lock().push(GenericSend {
            endpoint,
            tag,
            bytes: [header, payload].concat(),
            announcement,
        });
        Ok(())
    }

    fn handle_frag(&self, endpoint: EndpointId, _frag: NonNull<u8>, addr: RelativeAddr) -> Result<()> {
        self.frags.lock().push((endpoint, addr));
        Ok(())
    }
}

/// What a handler saw: (tag, seq, bytes).
pub type Received = Arc<Mutex<Vec<(u16, u16, Vec<u8>)>>>;

/// Handler that appends every delivery to `log`.
pub fn recorder(log: &Received) -> impl Fn(&Delivery<'_>) + Send + Sync + 'static {
    let log = log.clone();
    move |d: &Delivery<'_>| log.lock().push((d.tag, d.seq, d.segment.to_vec()))
}

/// Pool of `blocks` fast boxes in segment 0, registered in a fresh table.
pub fn pool(block_size: u32, blocks: u32) -> (Arc<ShmFboxPool>, Arc<SegmentTable>) {
    let shm = create_anonymous_shared_memory(ShmFboxPool::required_size(block_size, blocks)).unwrap();
    let pool = ShmFboxPool::new(shm, 0, block_size, blocks).unwrap();
    let segments = SegmentTable::new();
    segments.register(0, pool.shm().as_ptr(), pool.shm().size());
    (Arc::new(pool), Arc::new(segments))
}

/// Sender and receiver in one address space. `sender` talks to the receiver
/// through endpoint `to_receiver`; the receiver knows the sender as
/// `from_sender`.
pub struct Pair {
    pub sender: FboxContext,
    pub receiver: FboxContext,
    pub sender_path: Arc<RecordingPath>,
    pub receiver_path: Arc<RecordingPath>,
    pub pool: Arc<ShmFboxPool>,
    pub segments: Arc<SegmentTable>,
    pub credits: Arc<PeerCredits>,
    pub to_receiver: EndpointId,
    pub from_sender: EndpointId,
}

impl Pair {
    pub fn new(config: FboxConfig) -> Self {
        Self::with_pool(config, 4)
    }

    pub fn with_pool(config: FboxConfig, blocks: u32) -> Self {
        let (pool, segments) = self::pool(config.fbox_size, blocks);
        let sender_path = Arc::new(RecordingPath::default());
        let receiver_path = Arc::new(RecordingPath::default());

        let mut sender =
            FboxContext::new(config.clone(), pool.clone(), segments.clone(), sender_path.clone()).unwrap();
        let mut receiver =
            FboxContext::new(config, pool.clone(), segments.clone(), receiver_path.clone()).unwrap();

        let credits = sender.new_peer_credits();
        let to_receiver = sender.add_endpoint(credits.clone());
        let from_sender = receiver.add_endpoint(receiver.new_peer_credits());

        Self {
            sender,
            receiver,
            sender_path,
            receiver_path,
            pool,
            segments,
            credits,
            to_receiver,
            from_sender,
        }
    }

    /// Send through the sender and, if that send announced a fast box, map
    /// it on the receiver the way the generic path would.
    pub fn send(&mut self, tag: u16, header: &[u8], payload: &[u8]) -> SendPath {
        let path = self.sender.send(self.to_receiver, tag, header, payload).unwrap();
        if let SendPath::Generic { announced: true } = path {
            let announcement = self
                .sender_path
                .sends
                .lock()
                .last()
                .and_then(|s| s.announcement)
                .unwrap();
            self.receiver
                .setup_fbox_recv(self.from_sender, announcement.base)
                .unwrap();
        }
        path
    }

    /// Drive the sender until its endpoint is promoted and mapped.
    pub fn promote(&mut self) {
        let threshold = self.sender.config().fbox_threshold;
        for _ in 0..threshold {
            self.send(1, &[], b"warmup");
        }
        assert!(self.sender.endpoint(self.to_receiver).unwrap().is_promoted());
        self.sender_path.sends.lock().clear();
    }
}
