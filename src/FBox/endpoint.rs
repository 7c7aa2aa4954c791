use std::sync::Arc;

use crate::Core::alloc::{FboxBlock, PeerCredits};
use crate::FBox::dispatch::EndpointId;
use crate::FBox::overwrite::{OverwriteReader, OverwriteWriter};
use crate::FBox::promotion::PromotionGate;
use crate::FBox::reliable::{ReliableReader, ReliableWriter};
use crate::FBox::Buffer::FboxBuffer;

/// Writer for whichever policy the run uses.
pub enum FboxWriter {
    Reliable(ReliableWriter),
    Overwrite(OverwriteWriter),
}

impl FboxWriter {
    #[inline]
    pub fn write(&mut self, tag: u16, header: &[u8], payload: &[u8]) -> bool {
        match self {
            Self::Reliable(w) => w.write(tag, header, payload),
            Self::Overwrite(w) => w.write(tag, header, payload),
        }
    }

    pub fn seq(&self) -> u16 {
        match self {
            Self::Reliable(w) => w.seq(),
            Self::Overwrite(w) => w.seq(),
        }
    }

    pub fn buffer(&self) -> &FboxBuffer {
        match self {
            Self::Reliable(w) => w.buffer(),
            Self::Overwrite(w) => w.buffer(),
        }
    }
}

/// Reader for whichever policy the run uses.
pub enum FboxReader {
    Reliable(ReliableReader),
    Overwrite(OverwriteReader),
}

impl FboxReader {
    pub fn seq(&self) -> u16 {
        match self {
            Self::Reliable(r) => r.seq(),
            Self::Overwrite(r) => r.seq(),
        }
    }

    pub fn buffer(&self) -> &FboxBuffer {
        match self {
            Self::Reliable(r) => r.buffer(),
            Self::Overwrite(r) => r.buffer(),
        }
    }
}

/// Our outbound fast box and the pool block backing it.
pub(crate) struct Outbound {
    pub(crate) block: FboxBlock,
    pub(crate) writer: FboxWriter,
}

/// Directed relationship with one peer process.
///
/// Owns at most one outbound fast box (memory from our pool, written by us)
/// and references at most one inbound fast box (the peer's memory, mapped
/// here, read by us).
pub struct Endpoint {
    pub(crate) id: EndpointId,
    pub(crate) credits: Arc<PeerCredits>,
    pub(crate) gate: PromotionGate,
    pub(crate) outbound: Option<Outbound>,
    pub(crate) inbound: Option<FboxReader>,
}

impl Endpoint {
    pub(crate) fn new(id: EndpointId, credits: Arc<PeerCredits>, threshold: usize) -> Self {
        Self {
            id,
            credits,
            gate: PromotionGate::new(threshold),
            outbound: None,
            inbound: None,
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Does this endpoint send through a fast box?
    pub fn is_promoted(&self) -> bool {
        self.outbound.is_some()
    }

    /// Generic-path sends counted towards promotion.
    pub fn send_count(&self) -> usize {
        self.gate.send_count()
    }

    pub fn outbound_buffer(&self) -> Option<&FboxBuffer> {
        self.outbound.as_ref().map(|o| o.writer.buffer())
    }

    pub fn outbound_seq(&self) -> Option<u16> {
        self.outbound.as_ref().map(|o| o.writer.seq())
    }

    pub fn outbound_writer(&self) -> Option<&FboxWriter> {
        self.outbound.as_ref().map(|o| &o.writer)
    }

    pub fn inbound_buffer(&self) -> Option<&FboxBuffer> {
        self.inbound.as_ref().map(FboxReader::buffer)
    }

    /// Sequence the reader expects next.
    pub fn inbound_seq(&self) -> Option<u16> {
        self.inbound.as_ref().map(FboxReader::seq)
    }

    pub fn inbound_reader(&self) -> Option<&FboxReader> {
        self.inbound.as_ref()
    }

    pub fn credits(&self) -> &Arc<PeerCredits> {
        &self.credits
    }
}
